//! Full restore: staged files are pushed into descriptors granted by the broker.

use std::io;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use caps::{MergeContext, VersionDefaults};
use logging::trace_caps;
use protocol::{BundleName, FileHandleValue, FileInfo, Reply, Request, RestoreType};
use transport::SessionKind;

use crate::driver::{
    FileDelivery, ReadyFile, SessionCore, SessionEnv, SessionState, first_occurrences, open_capability_file,
    send_staged,
};
use crate::error::{OperationError, OperationResult};
use crate::layout::{NamePolicy, open_staged, regular_files, validate_bundle_name, validate_file_name};
use crate::outcome::SessionOutcome;

/// Arguments of a full restore.
#[derive(Clone, Debug, Default)]
pub struct RestoreOptions {
    /// Capability file, filled from the broker and merged before use.
    pub cap_file: PathBuf,
    /// Bundles to restore.
    pub bundles: Vec<BundleName>,
}

struct RestoreDelivery;

impl FileDelivery for RestoreDelivery {
    fn on_file_ready(&self, session: &SessionCore, mut file: ReadyFile) -> OperationResult<()> {
        validate_bundle_name(&file.info.owner)?;
        validate_file_name(&file.info.file_name, NamePolicy::Alphanumeric)?;
        let destination = file.take_data()?;
        let source = session.layout().staged_file(&file.info.owner, &file.info.file_name);
        let name = file.info.file_name.clone();
        send_and_publish(session, file.info, &name, &source, destination)
    }
}

/// Sequence number carried by a file handle grant.
pub(crate) fn granted_sequence(reply: &Reply, bundle: &str, name: &str) -> OperationResult<u32> {
    reply
        .value_as::<FileHandleValue>()
        .map(|value| value.sn)
        .map_err(|err| OperationError::invalid(format!("invalid file handle for {bundle}/{name}: {err}")))
}

/// Sends `source` into `destination`, publishes the file and counts it as
/// `record_as` for its bundle. The bundle's container is published when its
/// last expected file is counted.
pub(crate) fn send_and_publish(
    session: &SessionCore,
    info: FileInfo,
    record_as: &str,
    source: &Path,
    destination: OwnedFd,
) -> OperationResult<()> {
    let owner = info.owner.clone();
    session.with_claim(&owner, record_as, || {
        send_staged(source, destination)?;
        session.call(Request::PublishFile { file_info: info })?;
        session
            .tracker()
            .record_file_sent(&owner, record_as, || {
                session
                    .call(Request::PublishFile {
                        file_info: FileInfo::container(owner.clone()),
                    })
                    .map(drop)
            })
            .map(drop)
    })
}

/// Rewrites the capability file so it describes exactly `bundles`.
pub(crate) fn merge_capability_file(
    path: &Path,
    bundles: &[BundleName],
    context: &MergeContext,
) -> OperationResult<()> {
    let file = open_capability_file(path, false)?;
    let mut document = caps::load(&file)?;
    document.bundle_infos = caps::merge(&document.bundle_infos, bundles, false, context)?;
    caps::persist(&file, &document)?;
    trace_caps!(path = %path.display(), bundles = document.bundle_infos.len(), "capability file merged");
    Ok(())
}

fn staged_files(session_env: &SessionEnv, bundle: &str) -> OperationResult<Vec<String>> {
    let dir = session_env.layout.bundle_dir(bundle);
    let files = match regular_files(&dir) {
        Ok(files) => files,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(OperationError::invalid(format!("no staged data for {bundle}")));
        }
        Err(err) => return Err(OperationError::io("list", &dir, err)),
    };
    if files.is_empty() {
        return Err(OperationError::invalid(format!("staged data for {bundle} is empty")));
    }
    Ok(files)
}

/// Restores `options.bundles` from the receive root.
pub fn run_restore(env: &SessionEnv, options: &RestoreOptions) -> OperationResult<SessionOutcome> {
    let bundles = first_occurrences(&options.bundles, String::as_str);
    let mut staged = Vec::with_capacity(bundles.len());
    for bundle in &bundles {
        validate_bundle_name(bundle)?;
        staged.push((bundle, staged_files(env, bundle)?));
    }
    let cap_file = open_capability_file(&options.cap_file, true)?;

    let session = SessionCore::open(env, SessionKind::Restore, Box::new(RestoreDelivery))?;
    let mut reply = session.call(Request::GetLocalCapabilities)?;
    let capabilities = reply
        .take_fd()
        .ok_or_else(|| OperationError::invalid("capability reply carried no descriptor"))?;
    fast_io::send_whole_file(cap_file, capabilities.into())
        .map_err(|err| OperationError::io("write", &options.cap_file, err))?;
    let context = MergeContext::new(env.layout.install_root(), VersionDefaults::DEFAULT);
    merge_capability_file(&options.cap_file, &bundles, &context)?;

    session.transition(SessionState::Submitting);
    session.tracker().expect_bundles(bundles.len());
    for (bundle, files) in &staged {
        session.tracker().begin_bundle(bundle, Some(files.len()));
    }
    session.call(Request::AppendBundlesRestore {
        capabilities: OwnedFd::from(open_staged(&options.cap_file)?),
        bundle_names: bundles.clone(),
        restore_type: RestoreType::WaitSend,
        user_id: None,
    })?;

    for (bundle, files) in &staged {
        for name in files {
            let mut reply = session.call(Request::GetFileName {
                bundle_name: (*bundle).clone(),
                file_name: name.clone(),
            })?;
            let destination = reply
                .take_fd()
                .ok_or_else(|| OperationError::invalid(format!("invalid file handle for {bundle}/{name}")))?;
            let sn = granted_sequence(&reply, bundle, name)?;
            let source = env.layout.staged_file(bundle, name);
            send_and_publish(&session, FileInfo::new(bundle.as_str(), name.as_str(), sn), name, &source, destination)?;
        }
    }

    session.start()?;
    Ok(session.wait())
}
