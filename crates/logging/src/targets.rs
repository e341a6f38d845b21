//! crates/logging/src/targets.rs
//! Tracing targets used across the workspace.

use std::fmt;

/// Target for session lifecycle, notifications and completion accounting.
pub const SESSION: &str = "backup::session";
/// Target for whole-file transfers between descriptors.
pub const TRANSFER: &str = "backup::transfer";
/// Target for broker framing, requests and death detection.
pub const IPC: &str = "backup::ipc";
/// Target for capability-file and index handling.
pub const CAPS: &str = "backup::caps";

/// Subsystems that can be tuned independently.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LogTarget {
    /// Session state machine and tracker.
    Session,
    /// Transfer channel.
    Transfer,
    /// Broker connection.
    Ipc,
    /// Capability store.
    Caps,
}

impl LogTarget {
    /// Every target, in filter order.
    pub const ALL: [Self; 4] = [Self::Session, Self::Transfer, Self::Ipc, Self::Caps];

    /// Returns the tracing target string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => SESSION,
            Self::Transfer => TRANSFER,
            Self::Ipc => IPC,
            Self::Caps => CAPS,
        }
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_share_prefix() {
        for target in LogTarget::ALL {
            assert!(target.as_str().starts_with("backup::"));
        }
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(LogTarget::Ipc.to_string(), IPC);
    }
}
