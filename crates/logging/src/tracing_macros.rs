//! crates/logging/src/tracing_macros.rs
//! Convenience macros binding tracing events to the workspace targets.

/// Emit a session trace at debug level.
///
/// # Example
/// ```ignore
/// trace_session!(bundle = %name, "bundle finished");
/// ```
#[macro_export]
macro_rules! trace_session {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "backup::session", $($arg)*);
    };
}

/// Emit a transfer trace at debug level.
///
/// # Example
/// ```ignore
/// trace_transfer!(bytes = copied, "whole-file copy complete");
/// ```
#[macro_export]
macro_rules! trace_transfer {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "backup::transfer", $($arg)*);
    };
}

/// Emit a broker connection trace at trace level.
///
/// # Example
/// ```ignore
/// trace_ipc!(code = ?code, len, "frame received");
/// ```
#[macro_export]
macro_rules! trace_ipc {
    ($($arg:tt)*) => {
        ::tracing::trace!(target: "backup::ipc", $($arg)*);
    };
}

/// Emit a capability store trace at debug level.
///
/// # Example
/// ```ignore
/// trace_caps!(entries = infos.len(), "capability file persisted");
/// ```
#[macro_export]
macro_rules! trace_caps {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "backup::caps", $($arg)*);
    };
}
