use std::collections::BTreeMap;
use std::fmt;

use protocol::{BundleName, ErrCode};

use crate::error::negated_code;

/// Why a session's wait was released ahead of normal completion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReleaseCause {
    /// The broker reported that the whole task ended abnormally.
    Aborted(ErrCode),
    /// The broker connection died. Only the connection monitor raises this.
    ConnectionLost,
}

/// Terminal result of one session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionOutcome {
    /// Every bundle finished without error.
    Success,
    /// The session completed but some bundles failed, with their codes.
    PartialFailure(BTreeMap<BundleName, ErrCode>),
    /// The broker aborted the whole task.
    Aborted(ErrCode),
    /// The broker went away before the session completed.
    ConnectionLost,
}

impl SessionOutcome {
    /// Whether every bundle succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Result code: zero on success, a negated errno or broker code otherwise.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PartialFailure(_) => -libc::EIO,
            Self::Aborted(code) => negated_code(*code),
            Self::ConnectionLost => -libc::EPIPE,
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::PartialFailure(failed) => {
                f.write_str("failed bundles:")?;
                for (bundle, code) in failed {
                    write!(f, " {bundle} ({code})")?;
                }
                Ok(())
            }
            Self::Aborted(code) => write!(f, "aborted by the backup service with error {code}"),
            Self::ConnectionLost => f.write_str("backup service died"),
        }
    }
}
