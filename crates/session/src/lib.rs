//! Backup and restore sessions against the backup broker.
//!
//! Each operation opens a broker connection through a
//! [`transport::Connector`], registers a session in a [`SessionRegistry`],
//! submits its bundles and blocks until the [`CompletionTracker`] releases.
//! Notifications from the broker reach the session through the registry, so a
//! connection never holds the session itself.
//!
//! | Operation | Entry point |
//! |-----------|-------------|
//! | full backup | [`run_backup`] |
//! | incremental backup | [`run_incremental_backup`] |
//! | full restore | [`run_restore`] |
//! | asynchronous restore | [`run_restore_async`] |
//! | incremental restore | [`run_incremental_restore`] |
//!
//! Setup failures return an [`OperationError`]. Once a session is waiting,
//! its result is a [`SessionOutcome`]; failures of single files or bundles
//! are folded into it instead of ending the wait early. Only the death of the
//! broker releases a session before the broker says it is done.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod backup;
mod connection;
mod driver;
mod error;
mod handler;
mod incremental_backup;
mod incremental_restore;
mod layout;
mod outcome;
mod registry;
mod restore;
mod restore_async;
mod tracker;

pub use backup::{BackupOptions, run_backup};
pub use driver::SessionEnv;
pub use error::{OperationError, OperationResult};
pub use handler::NotificationHandler;
pub use incremental_backup::{IncrementalBackupOptions, run_incremental_backup};
pub use incremental_restore::{IncrementalRestoreOptions, run_incremental_restore};
pub use layout::{
    INSTALL_SENTINEL, MANAGE_JSON_REQUEST_PATH, NamePolicy, StagingLayout, validate_bundle_name, validate_file_name,
};
pub use outcome::{ReleaseCause, SessionOutcome};
pub use registry::{SessionId, SessionRegistry};
pub use restore::{RestoreOptions, run_restore};
pub use restore_async::{RestoreAsyncOptions, run_restore_async};
pub use tracker::{CompletionTracker, FileClaim, RecordOutcome};
