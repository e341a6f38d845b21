//! Incremental backup: files arrive with manifests under per-baseline directories.

use std::path::PathBuf;

use caps::{BundleIndex, MANAGE_JSON};
use logging::{targets, trace_transfer};
use protocol::{IncrementalData, Request};
use transport::SessionKind;

use crate::driver::{
    Baselines, FileDelivery, ReadyFile, SessionCore, SessionEnv, SessionState, first_occurrences, receive_into,
};
use crate::error::{OperationError, OperationResult};
use crate::layout::{
    INSTALL_SENTINEL, NamePolicy, create_private_dir, create_private_file, open_staged, validate_bundle_name,
    validate_file_name,
};
use crate::outcome::SessionOutcome;

/// Arguments of an incremental backup.
#[derive(Clone, Debug, Default)]
pub struct IncrementalBackupOptions {
    /// Capability file, recreated from the broker's answer.
    pub cap_file: PathBuf,
    /// Bundles with the time of their previous backup.
    pub bundles: Vec<IncrementalData>,
}

struct IncrementalBackupDelivery {
    baselines: Baselines,
}

impl FileDelivery for IncrementalBackupDelivery {
    fn on_file_ready(&self, session: &SessionCore, mut file: ReadyFile) -> OperationResult<()> {
        let owner = file.info.owner.clone();
        let name = file.info.file_name.clone();
        validate_bundle_name(&owner)?;
        validate_file_name(&name, NamePolicy::NoSeparator)?;
        if name == INSTALL_SENTINEL {
            return Err(OperationError::invalid("install payloads are not received by backups"));
        }
        let time = self.baselines.time_of(&owner)?;
        let data = file.take_data()?;
        let manifest = file.manifest.take();

        let layout = session.layout();
        let data_path = layout.incremental_file(&owner, time, &name);
        let manifest_path = layout.incremental_manifest(&owner, time, &name);
        create_private_dir(&layout.incremental_data_dir(&owner, time))?;
        create_private_dir(&layout.incremental_manifest_dir(&owner, time))?;

        session.with_claim(&owner, &name, || {
            receive_into(&data_path, data)?;
            if let Some(manifest) = manifest {
                receive_into(&manifest_path, manifest)?;
            }
            if name != MANAGE_JSON {
                return session
                    .tracker()
                    .record_file_sent(&owner, &name, || Ok::<(), OperationError>(()))
                    .map(drop);
            }
            if manifest_path.is_file() {
                let bundle_manifest = layout.bundle_manifest(&owner);
                let source = open_staged(&manifest_path)?;
                fast_io::send_whole_file(create_private_file(&bundle_manifest)?, source)
                    .map_err(|err| OperationError::io("write", &bundle_manifest, err))?;
            }
            let index = BundleIndex::load_path(&data_path)?;
            trace_transfer!(bundle = %owner, files = index.len(), "bundle index received");
            session.tracker().set_expected(&owner, index.len());
            Ok(())
        })
    }
}

/// Backs up `options.bundles` relative to their baselines.
pub fn run_incremental_backup(env: &SessionEnv, options: &IncrementalBackupOptions) -> OperationResult<SessionOutcome> {
    let bundles = first_occurrences(&options.bundles, |entry| entry.bundle_name.as_str());
    for entry in &bundles {
        validate_bundle_name(&entry.bundle_name)?;
    }
    create_private_dir(env.layout.incremental_root())?;
    let cap_file = create_private_file(&options.cap_file)?;

    let delivery = IncrementalBackupDelivery {
        baselines: Baselines::new(&bundles),
    };
    let session = SessionCore::open(env, SessionKind::IncrementalBackup, Box::new(delivery))?;

    let mut reply = session.call(Request::GetLocalCapabilitiesIncremental {
        bundles: bundles.clone(),
    })?;
    match reply.take_fd() {
        Some(capabilities) => {
            fast_io::send_whole_file(cap_file, capabilities.into())
                .map_err(|err| OperationError::io("write", &options.cap_file, err))?;
        }
        None => {
            tracing::warn!(target: targets::SESSION, path = %options.cap_file.display(), "no incremental capabilities received");
        }
    }

    session.transition(SessionState::Submitting);
    for entry in &bundles {
        create_private_dir(&env.layout.incremental_bundle_dir(&entry.bundle_name))?;
    }
    session.tracker().expect_bundles(bundles.len());
    for entry in &bundles {
        session.tracker().begin_bundle(&entry.bundle_name, None);
    }
    session.call(Request::AppendBundlesIncrementalBackup { bundles })?;
    Ok(session.wait())
}
