//! Full backup: the broker pushes each bundle's files, the tool stores them.

use std::path::PathBuf;

use caps::{BundleIndex, MANAGE_JSON};
use logging::trace_transfer;
use protocol::{BundleName, Request};
use transport::SessionKind;

use crate::driver::{
    FileDelivery, ReadyFile, SessionCore, SessionEnv, SessionState, first_occurrences, open_capability_file,
    receive_into,
};
use crate::error::{OperationError, OperationResult};
use crate::layout::{INSTALL_SENTINEL, NamePolicy, create_private_dir, validate_bundle_name, validate_file_name};
use crate::outcome::SessionOutcome;

/// Arguments of a full backup.
#[derive(Clone, Debug, Default)]
pub struct BackupOptions {
    /// Capability file, created when missing.
    pub cap_file: PathBuf,
    /// Bundles to back up.
    pub bundles: Vec<BundleName>,
    /// Fill the capability file from the broker first.
    pub is_local: bool,
}

struct BackupDelivery;

impl FileDelivery for BackupDelivery {
    fn on_file_ready(&self, session: &SessionCore, mut file: ReadyFile) -> OperationResult<()> {
        let owner = file.info.owner.clone();
        let name = file.info.file_name.clone();
        validate_bundle_name(&owner)?;
        validate_file_name(&name, NamePolicy::Alphanumeric)?;
        if name == INSTALL_SENTINEL {
            return Err(OperationError::invalid("install payloads are not received by backups"));
        }
        let data = file.take_data()?;

        let path = session.layout().staged_file(&owner, &name);
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }
        session.with_claim(&owner, &name, || {
            receive_into(&path, data)?;
            if name == MANAGE_JSON {
                let index = BundleIndex::load_path(&path)?;
                trace_transfer!(bundle = %owner, files = index.len(), "bundle index received");
                session.tracker().set_expected(&owner, index.len());
                return Ok(());
            }
            session
                .tracker()
                .record_file_sent(&owner, &name, || Ok::<(), OperationError>(()))
                .map(drop)
        })
    }
}

/// Backs up `options.bundles` into the receive root.
pub fn run_backup(env: &SessionEnv, options: &BackupOptions) -> OperationResult<SessionOutcome> {
    let bundles = first_occurrences(&options.bundles, String::as_str);
    for bundle in &bundles {
        validate_bundle_name(bundle)?;
    }
    create_private_dir(env.layout.receive_root())?;
    let cap_file = open_capability_file(&options.cap_file, true)?;

    let session = SessionCore::open(env, SessionKind::Backup, Box::new(BackupDelivery))?;
    if options.is_local {
        let mut reply = session.call(Request::GetLocalCapabilities)?;
        let capabilities = reply
            .take_fd()
            .ok_or_else(|| OperationError::invalid("capability reply carried no descriptor"))?;
        fast_io::send_whole_file(cap_file, capabilities.into())
            .map_err(|err| OperationError::io("write", &options.cap_file, err))?;
    } else {
        drop(cap_file);
    }

    session.transition(SessionState::Submitting);
    session.tracker().expect_bundles(bundles.len());
    for bundle in &bundles {
        session.tracker().begin_bundle(bundle, None);
    }
    session.call(Request::AppendBundlesBackup {
        bundle_names: bundles.clone(),
    })?;
    session.start()?;
    Ok(session.wait())
}
