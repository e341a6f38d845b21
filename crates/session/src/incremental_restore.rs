//! Incremental restore: staged baseline files and their manifests are pushed
//! into descriptors the broker hands out.

use std::io;
use std::os::fd::OwnedFd;
use std::path::PathBuf;

use logging::targets;
use protocol::{FileInfo, IncrementalData, Request, RestoreType};
use transport::SessionKind;

use crate::driver::{
    Baselines, FileDelivery, ReadyFile, SessionCore, SessionEnv, SessionState, first_occurrences, open_capability_file,
    send_staged,
};
use crate::error::{OperationError, OperationResult};
use crate::layout::{NamePolicy, regular_files, validate_bundle_name, validate_file_name};
use crate::outcome::SessionOutcome;

/// Arguments of an incremental restore.
#[derive(Clone, Debug, Default)]
pub struct IncrementalRestoreOptions {
    /// Existing capability file passed to the broker as is.
    pub cap_file: PathBuf,
    /// Bundles with the baseline their staged data belongs to.
    pub bundles: Vec<IncrementalData>,
    /// Append bundles one at a time.
    pub dep_mode: bool,
}

struct IncrementalRestoreDelivery {
    baselines: Baselines,
}

impl FileDelivery for IncrementalRestoreDelivery {
    fn on_file_ready(&self, session: &SessionCore, mut file: ReadyFile) -> OperationResult<()> {
        let owner = file.info.owner.clone();
        let name = file.info.file_name.clone();
        validate_bundle_name(&owner)?;
        validate_file_name(&name, NamePolicy::NoSeparator)?;
        let time = self.baselines.time_of(&owner)?;
        let data = file.take_data()?;
        let manifest = file.manifest.take();
        let sn = file.info.sequence_number;

        let layout = session.layout();
        let data_path = layout.incremental_file(&owner, time, &name);
        let manifest_path = layout.incremental_manifest(&owner, time, &name);
        session.with_claim(&owner, &name, || {
            send_staged(&data_path, data)?;
            if let Some(manifest) = manifest
                && manifest_path.is_file()
            {
                send_staged(&manifest_path, manifest)?;
            }
            session
                .tracker()
                .record_file_sent(&owner, &name, || {
                    session
                        .call(Request::PublishIncrementalFile {
                            file_info: FileInfo::new(owner.as_str(), "", sn),
                        })
                        .map(drop)
                })
                .map(drop)
        })
    }
}

fn append(session: &SessionCore, capabilities: OwnedFd, bundle_names: Vec<String>) -> OperationResult<()> {
    session
        .call(Request::AppendBundlesRestore {
            capabilities,
            bundle_names,
            restore_type: RestoreType::WaitSend,
            user_id: None,
        })
        .map(drop)
}

/// Restores `options.bundles` from their incremental staging directories.
pub fn run_incremental_restore(
    env: &SessionEnv,
    options: &IncrementalRestoreOptions,
) -> OperationResult<SessionOutcome> {
    let bundles = first_occurrences(&options.bundles, |entry| entry.bundle_name.as_str());
    for entry in &bundles {
        validate_bundle_name(&entry.bundle_name)?;
    }
    let cap_file = open_capability_file(&options.cap_file, false)?;
    let names: Vec<String> = bundles.iter().map(|entry| entry.bundle_name.clone()).collect();

    let delivery = IncrementalRestoreDelivery {
        baselines: Baselines::new(&bundles),
    };
    let session = SessionCore::open(env, SessionKind::Restore, Box::new(delivery))?;
    session.transition(SessionState::Submitting);
    session.tracker().expect_bundles(bundles.len());

    let mut staged = Vec::new();
    for entry in &bundles {
        let dir = env.layout.incremental_data_dir(&entry.bundle_name, entry.last_incremental_time);
        let files = match regular_files(&dir) {
            Ok(files) => files,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(target: targets::SESSION, bundle = %entry.bundle_name, path = %dir.display(), "no staged data, bundle skipped");
                continue;
            }
            Err(err) => return Err(OperationError::io("list", &dir, err)),
        };
        session.tracker().begin_bundle(&entry.bundle_name, Some(files.len()));
        staged.push((&entry.bundle_name, files));
    }

    if options.dep_mode {
        drop(cap_file);
        for name in names {
            let capabilities = open_capability_file(&options.cap_file, false)?;
            append(&session, capabilities.into(), vec![name])?;
        }
    } else {
        append(&session, cap_file.into(), names)?;
    }

    for (bundle, files) in &staged {
        for file_name in files {
            session.call(Request::GetIncrementalFileName {
                bundle_name: (*bundle).clone(),
                file_name: file_name.clone(),
            })?;
        }
    }
    Ok(session.wait())
}
