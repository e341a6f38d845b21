use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use protocol::{BundleName, RestoreType};

/// One bundle entry of the capability file.
///
/// Fields the broker adds beyond the four this tool reasons about are kept in
/// `extra` so a read-modify-write cycle does not drop them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    /// Bundle name.
    pub name: BundleName,
    /// Whether an install payload must be installed before restoring data.
    #[serde(default)]
    pub need_to_install: bool,
    /// Numeric version of the data's application.
    #[serde(default)]
    pub version_code: u32,
    /// Human-readable version of the data's application.
    #[serde(default)]
    pub version_name: String,
    /// Fields not interpreted by this tool.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BundleInfo {
    /// Creates an entry with no install requirement.
    pub fn new(name: impl Into<BundleName>, version_code: u32, version_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            need_to_install: false,
            version_code,
            version_name: version_name.into(),
            extra: Map::new(),
        }
    }
}

/// The whole capability document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFile {
    /// Name of the system that produced the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_full_name: Option<String>,
    /// Device class that produced the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Per-bundle entries.
    #[serde(default)]
    pub bundle_infos: Vec<BundleInfo>,
    /// Top-level fields not interpreted by this tool.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CapabilityFile {
    /// Finds the entry for `name`.
    #[must_use]
    pub fn bundle(&self, name: &str) -> Option<&BundleInfo> {
        self.bundle_infos.iter().find(|info| info.name == name)
    }
}

/// Version fields written for bundles without a prior entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionDefaults {
    /// Version code.
    pub version_code: u32,
    /// Version name.
    pub version_name: &'static str,
}

impl VersionDefaults {
    /// Defaults for ordinary restores.
    pub const DEFAULT: Self = Self {
        version_code: 0,
        version_name: "0.0.0.0",
    };

    /// Defaults marking data cloned from another device.
    pub const CLONE: Self = Self {
        version_code: 0,
        version_name: "99.99.99.999",
    };

    /// Defaults for an asynchronous restore of the given type.
    #[must_use]
    pub const fn for_restore_type(restore_type: RestoreType) -> Self {
        match restore_type {
            RestoreType::Ready => Self::DEFAULT,
            RestoreType::WaitSend => Self::CLONE,
        }
    }
}
