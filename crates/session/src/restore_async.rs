//! Asynchronous restore: bundles are appended with a restore type and user,
//! and data is requested bundle by bundle from each staged index.

use std::os::fd::OwnedFd;
use std::path::PathBuf;

use caps::{BundleIndex, MANAGE_JSON, MergeContext, VersionDefaults};
use logging::targets;
use protocol::{BundleName, FileInfo, Request, RestoreType};
use transport::SessionKind;

use crate::driver::{FileDelivery, ReadyFile, SessionCore, SessionEnv, SessionState, first_occurrences};
use crate::error::OperationResult;
use crate::layout::{MANAGE_JSON_REQUEST_PATH, NamePolicy, open_staged, validate_bundle_name, validate_file_name};
use crate::outcome::SessionOutcome;
use crate::restore::{granted_sequence, merge_capability_file, send_and_publish};

/// Arguments of an asynchronous restore.
#[derive(Clone, Debug, Default)]
pub struct RestoreAsyncOptions {
    /// Existing capability file, merged in place.
    pub cap_file: PathBuf,
    /// Bundles to restore.
    pub bundles: Vec<BundleName>,
    /// Whether the data is already in place on the broker side.
    pub restore_type: RestoreType,
    /// User the bundles are restored for.
    pub user_id: i32,
}

struct RestoreAsyncDelivery;

impl RestoreAsyncDelivery {
    /// Index requests travel under their in-bundle path; everything else by name.
    fn local_name(file_name: &str) -> &str {
        if file_name.contains(MANAGE_JSON) {
            MANAGE_JSON
        } else {
            file_name
        }
    }

    fn deliver(session: &SessionCore, info: FileInfo, destination: OwnedFd) -> OperationResult<()> {
        validate_bundle_name(&info.owner)?;
        let name = Self::local_name(&info.file_name).to_owned();
        validate_file_name(&name, NamePolicy::NoSeparator)?;
        let source = session.layout().staged_file(&info.owner, &name);
        send_and_publish(session, info, &name, &source, destination)
    }
}

impl FileDelivery for RestoreAsyncDelivery {
    fn on_file_ready(&self, session: &SessionCore, mut file: ReadyFile) -> OperationResult<()> {
        let destination = file.take_data()?;
        Self::deliver(session, file.info, destination)
    }
}

/// Asks for one file; a grant carried by the reply is served at once,
/// otherwise the file is served when its file-ready notification arrives.
fn request_file(session: &SessionCore, bundle: &str, file_name: &str) -> OperationResult<()> {
    let mut reply = session.call(Request::GetFileName {
        bundle_name: bundle.to_owned(),
        file_name: file_name.to_owned(),
    })?;
    let Some(destination) = reply.take_fd() else {
        return Ok(());
    };
    let delivered = granted_sequence(&reply, bundle, file_name)
        .and_then(|sn| RestoreAsyncDelivery::deliver(session, FileInfo::new(bundle, file_name, sn), destination));
    if let Err(err) = delivered {
        tracing::warn!(target: targets::SESSION, bundle, file = file_name, error = %err, "file transfer failed");
        session.tracker().record_failure(bundle, err.code());
    }
    Ok(())
}

/// Restores `options.bundles` for `options.user_id`.
pub fn run_restore_async(env: &SessionEnv, options: &RestoreAsyncOptions) -> OperationResult<SessionOutcome> {
    let bundles = first_occurrences(&options.bundles, String::as_str);
    for bundle in &bundles {
        validate_bundle_name(bundle)?;
    }
    let context = MergeContext::new(
        env.layout.install_root(),
        VersionDefaults::for_restore_type(options.restore_type),
    );
    merge_capability_file(&options.cap_file, &bundles, &context)?;

    let session = SessionCore::open(env, SessionKind::Restore, Box::new(RestoreAsyncDelivery))?;
    session.transition(SessionState::Submitting);
    session.tracker().expect_bundles(bundles.len());

    let mut requests = Vec::new();
    if options.restore_type == RestoreType::WaitSend {
        for bundle in &bundles {
            let dir = env.layout.bundle_dir(bundle);
            if !dir.is_dir() {
                tracing::warn!(target: targets::SESSION, bundle = %bundle, path = %dir.display(), "no staged data, bundle skipped");
                continue;
            }
            let index = BundleIndex::load_path(&dir.join(MANAGE_JSON))?;
            let files: Vec<String> = index
                .files()
                .filter(|name| *name != MANAGE_JSON)
                .map(str::to_owned)
                .collect();
            session.tracker().begin_bundle(bundle, Some(files.len() + 1));
            requests.push((bundle, files));
        }
    }

    session.call(Request::AppendBundlesRestore {
        capabilities: OwnedFd::from(open_staged(&options.cap_file)?),
        bundle_names: bundles.clone(),
        restore_type: options.restore_type,
        user_id: Some(options.user_id),
    })?;

    for (bundle, files) in &requests {
        request_file(&session, bundle, MANAGE_JSON_REQUEST_PATH)?;
        for file_name in files {
            request_file(&session, bundle, file_name)?;
        }
    }
    Ok(session.wait())
}
