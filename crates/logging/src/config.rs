//! crates/logging/src/config.rs
//! Verbosity configuration mapping `-v` counts to per-target levels.

use std::fmt;

use crate::targets::LogTarget;

/// Maximum level emitted for one target.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Verbosity {
    /// Warnings and errors only.
    #[default]
    Warn,
    /// Lifecycle milestones.
    Info,
    /// Per-notification and per-command detail.
    Debug,
    /// Frame-level detail.
    Trace,
}

impl Verbosity {
    /// Returns the `EnvFilter` level keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-target verbosity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerbosityConfig {
    /// Session lifecycle level.
    pub session: Verbosity,
    /// Transfer channel level.
    pub transfer: Verbosity,
    /// Broker connection level.
    pub ipc: Verbosity,
    /// Capability store level.
    pub caps: Verbosity,
}

impl VerbosityConfig {
    /// Create a configuration from the number of `-v` flags.
    ///
    /// Level 0 reports session milestones only, 1 raises every target to info,
    /// 2 to debug and 3 or more to trace.
    pub fn from_verbose_level(level: u8) -> Self {
        match level {
            0 => Self {
                session: Verbosity::Info,
                ..Self::default()
            },
            1 => Self::uniform(Verbosity::Info),
            2 => Self::uniform(Verbosity::Debug),
            _ => Self::uniform(Verbosity::Trace),
        }
    }

    /// Every target at the same level.
    pub const fn uniform(level: Verbosity) -> Self {
        Self {
            session: level,
            transfer: level,
            ipc: level,
            caps: level,
        }
    }

    /// Level configured for `target`.
    pub const fn level(&self, target: LogTarget) -> Verbosity {
        match target {
            LogTarget::Session => self.session,
            LogTarget::Transfer => self.transfer,
            LogTarget::Ipc => self.ipc,
            LogTarget::Caps => self.caps,
        }
    }

    /// Sets the level for one target.
    pub fn set_level(&mut self, target: LogTarget, level: Verbosity) {
        let slot = match target {
            LogTarget::Session => &mut self.session,
            LogTarget::Transfer => &mut self.transfer,
            LogTarget::Ipc => &mut self.ipc,
            LogTarget::Caps => &mut self.caps,
        };
        *slot = level;
    }

    /// Renders the configuration as `EnvFilter` directives.
    ///
    /// Events outside the `backup::` targets stay at `warn`.
    pub fn directives(&self) -> String {
        let mut out = String::from("warn");
        for target in LogTarget::ALL {
            out.push(',');
            out.push_str(target.as_str());
            out.push('=');
            out.push_str(self.level(target).as_str());
        }
        out
    }
}
