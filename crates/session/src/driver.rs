//! Shared session machinery: opening, notification dispatch and waiting.
//!
//! Every session kind is a [`SessionCore`] with a kind-specific
//! [`FileDelivery`]. The core owns the connection and the completion tracker,
//! applies the bundle and task notifications itself and hands file-ready
//! notifications to the delivery.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::ops::Deref;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use logging::{targets, trace_session, trace_transfer};
use protocol::{BundleName, ERR_OK, ErrCode, FileInfo, IncrementalData, Notification, Reply, Request};
use transport::{Connector, SessionKind};

use crate::connection::ConnectionHandle;
use crate::error::{OperationError, OperationResult};
use crate::handler::NotificationHandler;
use crate::layout::{StagingLayout, create_private_file, open_staged};
use crate::outcome::{ReleaseCause, SessionOutcome};
use crate::registry::{SessionId, SessionRegistry};
use crate::tracker::{CompletionTracker, FileClaim};

/// What every operation needs from its surroundings.
#[derive(Clone)]
pub struct SessionEnv {
    /// Opens broker connections.
    pub connector: Arc<dyn Connector>,
    /// Arena the sessions are registered in.
    pub registry: Arc<SessionRegistry>,
    /// Staging roots.
    pub layout: StagingLayout,
}

impl SessionEnv {
    /// Bundles the three collaborators.
    pub fn new(connector: Arc<dyn Connector>, registry: Arc<SessionRegistry>, layout: StagingLayout) -> Self {
        Self {
            connector,
            registry,
            layout,
        }
    }
}

impl fmt::Debug for SessionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEnv")
            .field("registry", &self.registry)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a session, for logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SessionState {
    /// Connection open, nothing appended yet.
    Initialized,
    /// Bundles are being appended and files requested.
    Submitting,
    /// Waiting for the broker to finish.
    AwaitingCompletion,
    /// Released; no further work.
    Terminated,
}

/// A file-ready notification that passed the status check.
#[derive(Debug)]
pub(crate) struct ReadyFile {
    pub(crate) info: FileInfo,
    pub(crate) data: Option<OwnedFd>,
    pub(crate) manifest: Option<OwnedFd>,
}

impl ReadyFile {
    /// The data descriptor, which the kind requires.
    pub(crate) fn take_data(&mut self) -> OperationResult<OwnedFd> {
        self.data.take().ok_or_else(|| {
            OperationError::invalid(format!(
                "no descriptor for {}/{}",
                self.info.owner, self.info.file_name
            ))
        })
    }
}

/// Kind-specific handling of file-ready notifications.
pub(crate) trait FileDelivery: Send + Sync {
    fn on_file_ready(&self, session: &SessionCore, file: ReadyFile) -> OperationResult<()>;
}

/// One session: connection, tracker and the kind's delivery.
pub(crate) struct SessionCore {
    id: SessionId,
    kind: SessionKind,
    connection: ConnectionHandle,
    tracker: CompletionTracker,
    layout: StagingLayout,
    delivery: Box<dyn FileDelivery>,
    state: Mutex<SessionState>,
}

impl SessionCore {
    /// Connects a session of `kind` and registers it.
    ///
    /// The returned guard releases the connection and unregisters the session
    /// when dropped.
    pub(crate) fn open(
        env: &SessionEnv,
        kind: SessionKind,
        delivery: Box<dyn FileDelivery>,
    ) -> OperationResult<OpenSession> {
        let id = env.registry.reserve();
        let registry = Arc::downgrade(&env.registry);
        let sink: transport::NotificationSink = Box::new(move |notification: Notification| {
            if let Some(registry) = registry.upgrade() {
                registry.deliver(id, notification);
            }
        });

        let transport = match env.connector.connect(kind, sink) {
            Ok(transport) => transport,
            Err(err) => {
                env.registry.remove(id);
                return Err(err.into());
            }
        };

        let core = Arc::new(Self {
            id,
            kind,
            connection: ConnectionHandle::new(transport),
            tracker: CompletionTracker::new(),
            layout: env.layout.clone(),
            delivery,
            state: Mutex::new(SessionState::Initialized),
        });
        trace_session!(session = %id, ?kind, "session opened");
        env.registry.install(id, Arc::clone(&core) as Arc<dyn NotificationHandler>);

        Ok(OpenSession {
            core,
            registry: Arc::clone(&env.registry),
        })
    }

    pub(crate) const fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    pub(crate) const fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    pub(crate) fn call(&self, request: Request) -> OperationResult<Reply> {
        self.connection.call(request)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transition(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            trace_session!(session = %self.id, from = ?*state, to = ?next, "session state");
            *state = next;
        }
    }

    /// Sends `Start`.
    pub(crate) fn start(&self) -> OperationResult<()> {
        self.call(Request::Start).map(drop)
    }

    /// Blocks until the tracker releases and reports the outcome.
    pub(crate) fn wait(&self) -> SessionOutcome {
        self.transition(SessionState::AwaitingCompletion);
        let outcome = self.tracker.wait();
        self.transition(SessionState::Terminated);
        if outcome.is_success() {
            tracing::info!(target: targets::SESSION, session = %self.id, "session completed");
        } else {
            tracing::info!(target: targets::SESSION, session = %self.id, %outcome, "session ended");
        }
        outcome
    }

    /// Runs `work` for a file unless another path already claimed it.
    ///
    /// A failed transfer gives the claim back.
    pub(crate) fn with_claim(
        &self,
        owner: &str,
        file: &str,
        work: impl FnOnce() -> OperationResult<()>,
    ) -> OperationResult<()> {
        if self.tracker.claim_file(owner, file) == FileClaim::AlreadyClaimed {
            trace_transfer!(owner, file, "file already handled");
            return Ok(());
        }
        work().inspect_err(|_| self.tracker.abandon_file(owner, file))
    }

    fn on_file_ready(&self, info: FileInfo, data: Option<OwnedFd>, manifest: Option<OwnedFd>, err_code: ErrCode) {
        let owner = info.owner.clone();
        if err_code != ERR_OK {
            tracing::warn!(target: targets::SESSION, session = %self.id, bundle = %owner, file = %info.file_name, err_code, "broker reported a failed file");
            self.tracker.record_failure(&owner, err_code);
            return;
        }
        let file_name = info.file_name.clone();
        let ready = ReadyFile { info, data, manifest };
        if let Err(err) = self.delivery.on_file_ready(self, ready) {
            tracing::warn!(target: targets::SESSION, session = %self.id, bundle = %owner, file = %file_name, error = %err, "file transfer failed");
            self.tracker.record_failure(&owner, err.code());
        }
    }
}

impl NotificationHandler for SessionCore {
    fn handle(&self, notification: Notification) {
        if self.connection.is_dead() {
            trace_session!(session = %self.id, notification = notification.name(), "notification after service death dropped");
            return;
        }
        trace_session!(session = %self.id, notification = notification.name(), bundle = ?notification.bundle_name(), "notification");
        match notification {
            Notification::FileReady {
                file_info,
                data,
                manifest,
                err_code,
            } => self.on_file_ready(file_info, data, manifest, err_code),
            Notification::BundleStarted { err_code, bundle_name } => {
                if err_code != ERR_OK {
                    tracing::warn!(target: targets::SESSION, session = %self.id, bundle = %bundle_name, err_code, "bundle failed to start");
                    self.tracker.bundle_start_failed(&bundle_name, err_code);
                }
            }
            Notification::BundleFinished { err_code, bundle_name } => {
                self.tracker.bundle_finished(&bundle_name, err_code);
            }
            Notification::AllBundlesFinished { err_code } => {
                self.tracker.all_bundles_finished(err_code);
            }
            Notification::ResultReport { bundle_name, result } => {
                tracing::info!(target: targets::SESSION, session = %self.id, bundle = %bundle_name, %result, "result report");
            }
            Notification::ProcessInfo { bundle_name, info } => {
                tracing::info!(target: targets::SESSION, session = %self.id, bundle = %bundle_name, %info, "process info");
            }
            Notification::ServiceDied => {
                tracing::warn!(target: targets::SESSION, session = %self.id, kind = ?self.kind, "backup service died");
                self.connection.mark_dead();
                self.tracker.force_release(ReleaseCause::ConnectionLost);
            }
        }
    }
}

impl fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCore")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// A registered session that is torn down when dropped.
#[derive(Debug)]
pub(crate) struct OpenSession {
    core: Arc<SessionCore>,
    registry: Arc<SessionRegistry>,
}

impl Deref for OpenSession {
    type Target = SessionCore;

    fn deref(&self) -> &SessionCore {
        &self.core
    }
}

impl Drop for OpenSession {
    fn drop(&mut self) {
        self.core.transition(SessionState::Terminated);
        self.core.connection.release();
        self.registry.remove(self.core.id);
    }
}

/// Copies a staged file into a broker descriptor.
pub(crate) fn send_staged(source: &Path, destination: OwnedFd) -> OperationResult<u64> {
    let staged = open_staged(source)?;
    let sent = fast_io::send_whole_file(File::from(destination), staged)
        .map_err(|err| OperationError::io("send", source, err))?;
    trace_transfer!(path = %source.display(), bytes = sent, "staged file sent");
    Ok(sent)
}

/// Copies a broker descriptor into a newly created private file.
pub(crate) fn receive_into(destination: &Path, source: OwnedFd) -> OperationResult<u64> {
    let target = create_private_file(destination)?;
    let received = fast_io::send_whole_file(target, File::from(source))
        .map_err(|err| OperationError::io("receive", destination, err))?;
    trace_transfer!(path = %destination.display(), bytes = received, "file received");
    Ok(received)
}

/// Opens the capability file for reading and writing, optionally creating it.
pub(crate) fn open_capability_file(path: &Path, create: bool) -> OperationResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(create)
        .mode(0o600)
        .open(path)
        .map_err(|err| OperationError::io("open", path, err))
}

/// Keeps the first entry for every key, in order.
pub(crate) fn first_occurrences<T: Clone>(items: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(key(*item).to_owned()))
        .cloned()
        .collect()
}

/// Baseline time of every bundle in an incremental session.
#[derive(Clone, Debug, Default)]
pub(crate) struct Baselines(BTreeMap<BundleName, i64>);

impl Baselines {
    pub(crate) fn new(entries: &[IncrementalData]) -> Self {
        Self(
            entries
                .iter()
                .map(|entry| (entry.bundle_name.clone(), entry.last_incremental_time))
                .collect(),
        )
    }

    /// Baseline of `bundle`; a bundle outside the session is an invalid argument.
    pub(crate) fn time_of(&self, bundle: &str) -> OperationResult<i64> {
        self.0
            .get(bundle)
            .copied()
            .ok_or_else(|| OperationError::invalid(format!("bundle {bundle} is not part of this session")))
    }
}
