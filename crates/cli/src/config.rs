//! Process configuration: broker socket and staging roots.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use session::StagingLayout;

/// Default path of the broker's listening socket.
pub const DEFAULT_SOCKET: &str = "/run/backup_sa/backup_sa.sock";
/// Default root for full backup and restore staging.
pub const DEFAULT_RECEIVE_DIR: &str = "/data/backup/received/";
/// Default root for incremental staging.
pub const DEFAULT_INCREMENTAL_RECEIVE_DIR: &str = "/data/backup/incrementalreceived/";
/// Default directory holding `<bundle>.hap` install payloads.
pub const DEFAULT_INSTALL_DIR: &str = "/data/backup/install/";

/// Overrides [`DEFAULT_SOCKET`].
pub const SOCKET_ENV: &str = "BACKUP_TOOL_SOCKET";
/// Overrides [`DEFAULT_RECEIVE_DIR`].
pub const RECEIVE_DIR_ENV: &str = "BACKUP_TOOL_RECEIVE_DIR";
/// Overrides [`DEFAULT_INCREMENTAL_RECEIVE_DIR`].
pub const INCREMENTAL_RECEIVE_DIR_ENV: &str = "BACKUP_TOOL_INCREMENTAL_RECEIVE_DIR";
/// Overrides [`DEFAULT_INSTALL_DIR`].
pub const INSTALL_DIR_ENV: &str = "BACKUP_TOOL_INSTALL_DIR";

/// Where the tool finds the broker and stages data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolConfig {
    /// Broker socket.
    pub socket: PathBuf,
    /// Staging roots handed to every session.
    pub layout: StagingLayout,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_SOCKET),
            layout: StagingLayout::new(DEFAULT_RECEIVE_DIR, DEFAULT_INCREMENTAL_RECEIVE_DIR, DEFAULT_INSTALL_DIR),
        }
    }
}

impl ToolConfig {
    /// Defaults with the process environment's overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key))
    }

    /// Defaults with overrides taken from `lookup`. Unset or empty values keep
    /// the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let pick = |key: &str, default: &str| -> PathBuf {
            lookup(key)
                .filter(|value| !value.is_empty())
                .map_or_else(|| PathBuf::from(default), PathBuf::from)
        };
        Self {
            socket: pick(SOCKET_ENV, DEFAULT_SOCKET),
            layout: StagingLayout::new(
                pick(RECEIVE_DIR_ENV, DEFAULT_RECEIVE_DIR),
                pick(INCREMENTAL_RECEIVE_DIR_ENV, DEFAULT_INCREMENTAL_RECEIVE_DIR),
                pick(INSTALL_DIR_ENV, DEFAULT_INSTALL_DIR),
            ),
        }
    }

    /// Configuration rooted under `base`, with the socket at `socket`.
    ///
    /// Mirrors the production tree: `received/`, `incrementalreceived/` and
    /// `install/` below `base`.
    pub fn rooted(base: &Path, socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            layout: StagingLayout::new(
                base.join("received"),
                base.join("incrementalreceived"),
                base.join("install"),
            ),
        }
    }
}
