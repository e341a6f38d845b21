use std::io;
use std::path::PathBuf;

use protocol::{EnvelopeError, ErrCode, PayloadError, ServiceCode};
use thiserror::Error;

/// Result alias for broker calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures talking to the broker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker socket could not be reached.
    #[error("backup service unreachable at {}: {source}", path.display())]
    Unreachable {
        /// Socket path that was tried.
        path: PathBuf,
        /// Underlying connect error.
        #[source]
        source: io::Error,
    },
    /// The broker went away while the call was outstanding or before it was sent.
    #[error("connection to the backup service was lost")]
    Disconnected,
    /// The connection was released by this process.
    #[error("session connection already released")]
    Released,
    /// Reading or writing the socket failed.
    #[error("socket i/o failed: {0}")]
    Io(#[from] io::Error),
    /// A frame header was invalid.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The broker answered with a nonzero status.
    #[error("backup service rejected {code} with error {err_code}")]
    Broker {
        /// Request that was rejected.
        code: ServiceCode,
        /// Status the broker returned.
        err_code: ErrCode,
    },
}

impl TransportError {
    /// Whether the error means the connection can no longer be used.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Released)
    }
}
