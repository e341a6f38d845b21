use ::core::fmt;
use ::core::str::FromStr;

use thiserror::Error;

use super::error::EnvelopeError;

/// Notifications the broker sends back over the session channel.
///
/// File-ready, sub-task and task codes exist once per direction; the client
/// folds each pair into one notification kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum ReverseCode {
    /// A backed-up file is ready to be received.
    BackupOnFileReady = 0,
    /// A bundle started backing up.
    BackupOnSubTaskStarted = 1,
    /// A bundle finished backing up.
    BackupOnSubTaskFinished = 2,
    /// Every bundle of the backup session finished.
    BackupOnTaskFinished = 3,
    /// A bundle started restoring.
    RestoreOnSubTaskStarted = 4,
    /// A bundle finished restoring.
    RestoreOnSubTaskFinished = 5,
    /// Every bundle of the restore session finished.
    RestoreOnTaskFinished = 6,
    /// The broker granted a descriptor for a file to restore.
    RestoreOnFileReady = 7,
    /// A bundle reported a free-form result.
    OnResultReport = 8,
    /// A bundle reported progress information.
    OnProcessInfo = 9,
}

/// Error returned when parsing a reverse code from its mnemonic fails.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("unknown reverse code name: \"{invalid_name}\"")]
pub struct ParseReverseCodeError {
    invalid_name: String,
}

impl ParseReverseCodeError {
    /// Creates a parse error that records the invalid mnemonic.
    #[must_use]
    pub fn new(invalid_name: &str) -> Self {
        Self {
            invalid_name: invalid_name.to_owned(),
        }
    }

    /// Returns the mnemonic that failed to parse.
    #[must_use]
    pub fn invalid_name(&self) -> &str {
        &self.invalid_name
    }
}

impl ReverseCode {
    /// Returns the numeric representation expected on the wire.
    #[must_use]
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to construct a [`ReverseCode`] from its on-the-wire numeric representation.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::BackupOnFileReady),
            1 => Some(Self::BackupOnSubTaskStarted),
            2 => Some(Self::BackupOnSubTaskFinished),
            3 => Some(Self::BackupOnTaskFinished),
            4 => Some(Self::RestoreOnSubTaskStarted),
            5 => Some(Self::RestoreOnSubTaskFinished),
            6 => Some(Self::RestoreOnTaskFinished),
            7 => Some(Self::RestoreOnFileReady),
            8 => Some(Self::OnResultReport),
            9 => Some(Self::OnProcessInfo),
            _ => None,
        }
    }

    /// Every code, ordered by numeric value.
    pub const ALL: [Self; 10] = [
        Self::BackupOnFileReady,
        Self::BackupOnSubTaskStarted,
        Self::BackupOnSubTaskFinished,
        Self::BackupOnTaskFinished,
        Self::RestoreOnSubTaskStarted,
        Self::RestoreOnSubTaskFinished,
        Self::RestoreOnTaskFinished,
        Self::RestoreOnFileReady,
        Self::OnResultReport,
        Self::OnProcessInfo,
    ];

    /// Returns the mnemonic used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BackupOnFileReady => "backup-on-file-ready",
            Self::BackupOnSubTaskStarted => "backup-on-sub-task-started",
            Self::BackupOnSubTaskFinished => "backup-on-sub-task-finished",
            Self::BackupOnTaskFinished => "backup-on-task-finished",
            Self::RestoreOnSubTaskStarted => "restore-on-sub-task-started",
            Self::RestoreOnSubTaskFinished => "restore-on-sub-task-finished",
            Self::RestoreOnTaskFinished => "restore-on-task-finished",
            Self::RestoreOnFileReady => "restore-on-file-ready",
            Self::OnResultReport => "on-result-report",
            Self::OnProcessInfo => "on-process-info",
        }
    }

    /// Reports whether the code belongs to the backup direction.
    #[must_use]
    pub const fn is_backup(self) -> bool {
        matches!(
            self,
            Self::BackupOnFileReady
                | Self::BackupOnSubTaskStarted
                | Self::BackupOnSubTaskFinished
                | Self::BackupOnTaskFinished
        )
    }
}

impl fmt::Display for ReverseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ReverseCode {
    type Error = EnvelopeError;

    fn try_from(value: u8) -> Result<Self, EnvelopeError> {
        Self::from_u8(value).ok_or(EnvelopeError::UnknownReverseCode(value))
    }
}

impl FromStr for ReverseCode {
    type Err = ParseReverseCodeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.name() == name)
            .ok_or_else(|| ParseReverseCodeError::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_is_dense() {
        for (index, code) in ReverseCode::ALL.iter().enumerate() {
            assert_eq!(ReverseCode::from_u8(index as u8), Some(*code));
        }
    }

    #[test]
    fn direction_split() {
        let backup = ReverseCode::ALL.into_iter().filter(|c| c.is_backup()).count();
        assert_eq!(backup, 4);
        assert!(!ReverseCode::RestoreOnFileReady.is_backup());
        assert!(!ReverseCode::OnProcessInfo.is_backup());
    }
}
