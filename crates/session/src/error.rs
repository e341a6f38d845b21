use std::io;
use std::path::PathBuf;

use caps::CapsError;
use protocol::{ErrCode, ServiceCode};
use thiserror::Error;
use transport::TransportError;

/// Result alias for session operations.
pub type OperationResult<T> = Result<T, OperationError>;

/// A recoverable failure of one operation.
///
/// During setup it aborts the session and reaches the caller; inside a
/// notification it is logged and only the affected file or bundle fails.
/// Losing the broker is not reported through this type; see
/// [`ReleaseCause::ConnectionLost`](crate::ReleaseCause::ConnectionLost).
#[derive(Debug, Error)]
pub enum OperationError {
    /// An argument, file name or lookup was unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A local file operation failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// Path concerned.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The broker answered a request with a nonzero status.
    #[error("backup service rejected {code} with error {err_code}")]
    Protocol {
        /// Request that was rejected.
        code: ServiceCode,
        /// Broker status.
        err_code: ErrCode,
    },
    /// The capability file or a bundle index could not be used.
    #[error(transparent)]
    Capability(#[from] CapsError),
    /// The exchange with the broker failed below the request level.
    #[error("broker exchange failed: {0}")]
    Transport(#[source] TransportError),
    /// A call was attempted on a connection that is gone.
    #[error("connection to the backup service is gone")]
    ConnectionLost,
}

impl OperationError {
    /// Shorthand for [`OperationError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Negated platform or broker code for this failure.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -libc::EINVAL,
            Self::Io { source, .. }
            | Self::Transport(
                TransportError::Io(source) | TransportError::Unreachable { source, .. },
            ) => negated_errno(source),
            Self::Protocol { err_code, .. } => negated_code(*err_code),
            Self::Capability(err) => err.raw_os_error().filter(|code| *code > 0).map_or(-libc::EINVAL, |code| -code),
            Self::Transport(_) => -libc::EPROTO,
            Self::ConnectionLost => -libc::EPIPE,
        }
    }
}

impl From<TransportError> for OperationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Broker { code, err_code } => Self::Protocol { code, err_code },
            TransportError::Disconnected | TransportError::Released => Self::ConnectionLost,
            other => Self::Transport(other),
        }
    }
}

fn negated_errno(err: &io::Error) -> i32 {
    -err.raw_os_error().filter(|code| *code > 0).unwrap_or(libc::EIO)
}

/// Negates a status code; codes that cannot be negated map to `-EIO`.
pub(crate) fn negated_code(code: ErrCode) -> i32 {
    match code.checked_abs() {
        Some(0) | None => -libc::EIO,
        Some(magnitude) => -magnitude,
    }
}
