//! Seams between sessions and the broker connection.

use protocol::{Notification, Reply, Request, Scenario};

use crate::error::TransportResult;

/// Receiver of every notification a connection delivers, in arrival order.
///
/// The sink runs on the connection's dispatch thread, never on the thread
/// that opened the connection.
pub type NotificationSink = Box<dyn FnMut(Notification) + Send + 'static>;

/// Which kind of broker session a connection opens.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionKind {
    /// Full backup.
    Backup,
    /// Incremental backup.
    IncrementalBackup,
    /// Any restore.
    Restore,
}

impl SessionKind {
    /// Request that initializes this kind of session on the broker.
    #[must_use]
    pub const fn init_request(self) -> Request {
        match self {
            Self::Backup => Request::InitBackupSession,
            Self::IncrementalBackup => Request::InitIncrementalBackupSession,
            Self::Restore => Request::InitRestoreSession,
        }
    }

    /// Direction the session moves data in.
    #[must_use]
    pub const fn scenario(self) -> Scenario {
        match self {
            Self::Backup | Self::IncrementalBackup => Scenario::Backup,
            Self::Restore => Scenario::Restore,
        }
    }
}

/// An open, initialized broker session.
pub trait Transport: Send + Sync {
    /// Sends `request` and waits for its reply.
    ///
    /// A reply with a nonzero status is returned as
    /// [`TransportError::Broker`](crate::TransportError::Broker).
    fn call(&self, request: Request) -> TransportResult<Reply>;

    /// Whether the peer is still reachable and the connection unreleased.
    fn is_alive(&self) -> bool;

    /// Tears the connection down. Calling it again does nothing.
    fn release(&self);
}

/// Opens broker connections.
pub trait Connector: Send + Sync {
    /// Connects, binds `sink` and initializes a session of `kind`.
    fn connect(&self, kind: SessionKind, sink: NotificationSink) -> TransportResult<Box<dyn Transport>>;

    /// Checks that the broker is reachable without opening a session.
    fn probe(&self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ServiceCode;

    #[test]
    fn init_request_matches_kind() {
        assert_eq!(SessionKind::Backup.init_request().code(), ServiceCode::InitBackupSession);
        assert_eq!(
            SessionKind::IncrementalBackup.init_request().code(),
            ServiceCode::InitIncrementalBackupSession
        );
        assert_eq!(SessionKind::Restore.init_request().code(), ServiceCode::InitRestoreSession);
    }

    #[test]
    fn incremental_backup_is_backup_scenario() {
        assert_eq!(SessionKind::IncrementalBackup.scenario(), Scenario::Backup);
    }
}
