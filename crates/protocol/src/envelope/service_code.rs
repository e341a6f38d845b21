use ::core::fmt;
use ::core::str::FromStr;

use thiserror::Error;

use super::error::EnvelopeError;

/// Requests a client may send to the broker.
///
/// The numeric values are stable; they are the low part of the request tag
/// (see [`super::REQUEST_BASE`]). Codes marked "agent side only" belong to the
/// extension agent's channel and are never produced by this client, but they
/// keep their slots so the numbering matches the broker's table.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum ServiceCode {
    /// Opens a restore session bound to the caller's reverse channel.
    InitRestoreSession = 0,
    /// Opens a full backup session bound to the caller's reverse channel.
    InitBackupSession = 1,
    /// Requests a descriptor for the device capability file.
    GetLocalCapabilities = 2,
    /// Tells the broker a restored file (or container) is fully written.
    PublishFile = 3,
    /// Extension agent reports a produced file (agent side only).
    AppFileReady = 4,
    /// Extension agent reports completion (agent side only).
    AppDone = 5,
    /// Reports a free-form result string for the session.
    ResultReport = 6,
    /// Starts processing the appended bundles.
    Start = 7,
    /// Requests the remote handle for one staged restore file.
    GetFileName = 8,
    /// Adds bundles to a restore session, with the capability file attached.
    AppendBundlesRestoreSession = 9,
    /// Adds bundles to a backup session.
    AppendBundlesBackupSession = 10,
    /// Declares that no further bundles will be appended.
    Finish = 11,
    /// Tears the session down on the broker side.
    ReleaseSession = 12,
    /// Requests a capability file scoped to incremental baselines.
    GetLocalCapabilitiesIncremental = 13,
    /// Opens an incremental backup session.
    InitIncrementalBackupSession = 14,
    /// Adds bundles with their baselines to an incremental backup session.
    AppendBundlesIncrementalBackupSession = 15,
    /// Incremental counterpart of `PublishFile`.
    PublishIncrementalFile = 16,
    /// Extension agent reports an incremental file (agent side only).
    AppIncrementalFileReady = 17,
    /// Extension agent reports incremental completion (agent side only).
    AppIncrementalDone = 18,
    /// Requests the remote handle for one staged incremental file.
    GetIncrementalFileName = 19,
    /// Queries broker-side metadata for one bundle.
    GetBackupInfo = 20,
}

/// Error returned when parsing a service code from its mnemonic fails.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("unknown service code name: \"{invalid_name}\"")]
pub struct ParseServiceCodeError {
    invalid_name: String,
}

impl ParseServiceCodeError {
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

impl ServiceCode {
    /// Returns the numeric representation expected on the wire.
    #[must_use]
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to construct a [`ServiceCode`] from its on-the-wire numeric representation.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::InitRestoreSession),
            1 => Some(Self::InitBackupSession),
            2 => Some(Self::GetLocalCapabilities),
            3 => Some(Self::PublishFile),
            4 => Some(Self::AppFileReady),
            5 => Some(Self::AppDone),
            6 => Some(Self::ResultReport),
            7 => Some(Self::Start),
            8 => Some(Self::GetFileName),
            9 => Some(Self::AppendBundlesRestoreSession),
            10 => Some(Self::AppendBundlesBackupSession),
            11 => Some(Self::Finish),
            12 => Some(Self::ReleaseSession),
            13 => Some(Self::GetLocalCapabilitiesIncremental),
            14 => Some(Self::InitIncrementalBackupSession),
            15 => Some(Self::AppendBundlesIncrementalBackupSession),
            16 => Some(Self::PublishIncrementalFile),
            17 => Some(Self::AppIncrementalFileReady),
            18 => Some(Self::AppIncrementalDone),
            19 => Some(Self::GetIncrementalFileName),
            20 => Some(Self::GetBackupInfo),
            _ => None,
        }
    }

    /// Every code, ordered by numeric value.
    pub const ALL: [Self; 21] = [
        Self::InitRestoreSession,
        Self::InitBackupSession,
        Self::GetLocalCapabilities,
        Self::PublishFile,
        Self::AppFileReady,
        Self::AppDone,
        Self::ResultReport,
        Self::Start,
        Self::GetFileName,
        Self::AppendBundlesRestoreSession,
        Self::AppendBundlesBackupSession,
        Self::Finish,
        Self::ReleaseSession,
        Self::GetLocalCapabilitiesIncremental,
        Self::InitIncrementalBackupSession,
        Self::AppendBundlesIncrementalBackupSession,
        Self::PublishIncrementalFile,
        Self::AppIncrementalFileReady,
        Self::AppIncrementalDone,
        Self::GetIncrementalFileName,
        Self::GetBackupInfo,
    ];

    /// Returns the mnemonic used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InitRestoreSession => "init-restore-session",
            Self::InitBackupSession => "init-backup-session",
            Self::GetLocalCapabilities => "get-local-capabilities",
            Self::PublishFile => "publish-file",
            Self::AppFileReady => "app-file-ready",
            Self::AppDone => "app-done",
            Self::ResultReport => "result-report",
            Self::Start => "start",
            Self::GetFileName => "get-file-name",
            Self::AppendBundlesRestoreSession => "append-bundles-restore-session",
            Self::AppendBundlesBackupSession => "append-bundles-backup-session",
            Self::Finish => "finish",
            Self::ReleaseSession => "release-session",
            Self::GetLocalCapabilitiesIncremental => "get-local-capabilities-incremental",
            Self::InitIncrementalBackupSession => "init-incremental-backup-session",
            Self::AppendBundlesIncrementalBackupSession => "append-bundles-incremental-backup-session",
            Self::PublishIncrementalFile => "publish-incremental-file",
            Self::AppIncrementalFileReady => "app-incremental-file-ready",
            Self::AppIncrementalDone => "app-incremental-done",
            Self::GetIncrementalFileName => "get-incremental-file-name",
            Self::GetBackupInfo => "get-backup-info",
        }
    }

    /// Reports whether the code belongs to the extension agent's channel.
    #[must_use]
    pub const fn is_agent_only(self) -> bool {
        matches!(
            self,
            Self::AppFileReady | Self::AppDone | Self::AppIncrementalFileReady | Self::AppIncrementalDone
        )
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ServiceCode {
    type Error = EnvelopeError;

    fn try_from(value: u8) -> Result<Self, EnvelopeError> {
        Self::from_u8(value).ok_or(EnvelopeError::UnknownServiceCode(value))
    }
}

impl FromStr for ServiceCode {
    type Err = ParseServiceCodeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.name() == name)
            .ok_or_else(|| ParseServiceCodeError::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_is_dense() {
        for (index, code) in ServiceCode::ALL.iter().enumerate() {
            assert_eq!(usize::from(code.as_u8()), index);
        }
        assert_eq!(ServiceCode::from_u8(ServiceCode::ALL.len() as u8), None);
    }

    #[test]
    fn parses_mnemonic() {
        assert_eq!("get-file-name".parse::<ServiceCode>(), Ok(ServiceCode::GetFileName));
        let err = "getFileName".parse::<ServiceCode>().unwrap_err();
        assert_eq!(err.invalid_name(), "getFileName");
    }

    #[test]
    fn agent_codes_are_flagged() {
        let agent: Vec<_> = ServiceCode::ALL.into_iter().filter(|c| c.is_agent_only()).collect();
        assert_eq!(agent.len(), 4);
        assert!(!ServiceCode::PublishFile.is_agent_only());
    }

    #[test]
    fn try_from_rejects_unknown() {
        assert_eq!(ServiceCode::try_from(200), Err(EnvelopeError::UnknownServiceCode(200)));
    }
}
