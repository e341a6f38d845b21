//! Value types shared by requests, replies and notifications.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one application taking part in a session.
///
/// The type does not constrain its contents. Callers that build filesystem
/// paths from a name must reject names containing `/` themselves.
pub type BundleName = String;

/// Status code reported by the broker; zero means success.
pub type ErrCode = i32;

/// The success [`ErrCode`].
pub const ERR_OK: ErrCode = 0;

/// Identifies one file within one bundle's transfer.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Bundle the file belongs to.
    pub owner: BundleName,
    /// File name inside the bundle; empty for the bundle's container.
    pub file_name: String,
    /// Broker-assigned sequence number.
    #[serde(rename = "sn", default)]
    pub sequence_number: u32,
}

impl FileInfo {
    /// Creates a file record.
    pub fn new(owner: impl Into<BundleName>, file_name: impl Into<String>, sequence_number: u32) -> Self {
        Self {
            owner: owner.into(),
            file_name: file_name.into(),
            sequence_number,
        }
    }

    /// The record naming `owner`'s container rather than one of its files.
    pub fn container(owner: impl Into<BundleName>) -> Self {
        Self::new(owner, String::new(), 0)
    }

    /// Reports whether this record names the bundle container.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.file_name.is_empty()
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_container() {
            write!(f, "{}/<container>#{}", self.owner, self.sequence_number)
        } else {
            write!(f, "{}/{}#{}", self.owner, self.file_name, self.sequence_number)
        }
    }
}

/// Baseline timestamp of one bundle in an incremental operation.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalData {
    /// Bundle the baseline belongs to.
    pub bundle_name: BundleName,
    /// Epoch time of the last incremental backup.
    pub last_incremental_time: i64,
}

impl IncrementalData {
    /// Creates a baseline entry.
    pub fn new(bundle_name: impl Into<BundleName>, last_incremental_time: i64) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            last_incremental_time,
        }
    }
}

/// How the broker should treat appended restore bundles.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestoreType {
    /// Data is still to be pushed by this client after the append.
    #[default]
    WaitSend,
    /// Data is already in place on the broker side.
    Ready,
}

impl RestoreType {
    /// Maps the command-line flag (`true` means data ready).
    #[must_use]
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "true" => Some(Self::Ready),
            "false" => Some(Self::WaitSend),
            _ => None,
        }
    }
}

/// Direction of a session.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scenario {
    /// Data flows from applications to the backup store.
    Backup,
    /// Data flows from the backup store to applications.
    Restore,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_info_uses_short_sequence_key() {
        let info = FileInfo::new("com.example.notes", "data.tar", 7);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"owner": "com.example.notes", "fileName": "data.tar", "sn": 7})
        );
    }

    #[test]
    fn container_record_has_empty_name() {
        let info = FileInfo::container("com.example.notes");
        assert!(info.is_container());
        assert_eq!(info.to_string(), "com.example.notes/<container>#0");
    }

    #[test]
    fn restore_type_flag_mapping() {
        assert_eq!(RestoreType::from_flag("true"), Some(RestoreType::Ready));
        assert_eq!(RestoreType::from_flag("false"), Some(RestoreType::WaitSend));
        assert_eq!(RestoreType::from_flag("yes"), None);
    }

    #[test]
    fn incremental_data_field_names() {
        let data: IncrementalData =
            serde_json::from_str(r#"{"bundleName":"a","lastIncrementalTime":1700000000}"#).unwrap();
        assert_eq!(data, IncrementalData::new("a", 1_700_000_000));
    }
}
