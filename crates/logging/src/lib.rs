#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` owns the diagnostic plumbing shared by every `backup_tool` crate:
//! the tracing targets each subsystem logs under, the verbosity configuration
//! derived from repeated `-v` flags, and installation of the process-wide
//! `tracing-subscriber` formatter.
//!
//! # Design
//!
//! Subsystems never construct filters themselves. They log through the
//! per-target macros ([`trace_session!`], [`trace_transfer!`], [`trace_ipc!`],
//! [`trace_caps!`]) or through the plain `tracing` macros with one of the
//! [`targets`] constants, and the binary calls [`init`] once with a
//! [`VerbosityConfig`]. The `BACKUP_TOOL_LOG` environment variable replaces the
//! verbosity-derived filter when it is set.
//!
//! # Examples
//!
//! ```
//! use logging::{LogTarget, Verbosity, VerbosityConfig};
//!
//! let config = VerbosityConfig::from_verbose_level(2);
//! assert_eq!(config.level(LogTarget::Transfer), Verbosity::Debug);
//! assert!(config.directives().contains("backup::session=debug"));
//! ```

mod config;
mod subscriber;
pub mod targets;
mod tracing_macros;

pub use config::{Verbosity, VerbosityConfig};
pub use subscriber::{LOG_ENV, init};
pub use targets::LogTarget;
