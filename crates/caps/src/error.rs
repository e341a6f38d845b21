use std::io;

use thiserror::Error;

/// Result type for capability store operations.
pub type CapsResult<T> = Result<T, CapsError>;

/// Errors raised while reading or writing capability data.
#[derive(Debug, Error)]
pub enum CapsError {
    /// Reading or writing a file failed.
    #[error("failed to {action} {target}: {source}")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// File concerned.
        target: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The document was not valid JSON of the expected shape.
    #[error("malformed {what}: {source}")]
    Json {
        /// Document kind.
        what: &'static str,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// A bundle name cannot be used to build a path.
    #[error("invalid bundle name {0:?}")]
    InvalidBundleName(String),
}

impl CapsError {
    pub(crate) fn io(action: &'static str, target: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            action,
            target: target.into(),
            source,
        }
    }

    /// Platform error number behind an I/O failure.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            Self::Json { .. } | Self::InvalidBundleName(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_keeps_errno() {
        let err = CapsError::io("open", "caps.json", io::Error::from_raw_os_error(2));
        assert_eq!(err.raw_os_error(), Some(2));
        assert!(err.to_string().starts_with("failed to open caps.json"));
    }

    #[test]
    fn invalid_name_display() {
        let err = CapsError::InvalidBundleName("../etc".into());
        assert_eq!(err.to_string(), "invalid bundle name \"../etc\"");
        assert_eq!(err.raw_os_error(), None);
    }
}
