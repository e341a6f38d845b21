//! In-memory broker shared by the session scenario tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use protocol::{ErrCode, FileInfo, Notification, Reply, Request, RestoreType, ServiceCode};
use serde_json::Value;
use session::{SessionEnv, SessionRegistry, StagingLayout};
use tempfile::TempDir;
use transport::{Connector, NotificationSink, SessionKind, Transport, TransportError, TransportResult};

/// One request as the broker saw it.
#[derive(Clone, Debug)]
pub struct Call {
    pub code: ServiceCode,
    pub bundles: Vec<String>,
    pub file: Option<String>,
    pub file_info: Option<FileInfo>,
    pub restore_type: Option<RestoreType>,
    pub user_id: Option<i32>,
}

impl Call {
    fn from_request(request: &Request) -> Self {
        let mut call = Self {
            code: request.code(),
            bundles: Vec::new(),
            file: None,
            file_info: None,
            restore_type: None,
            user_id: None,
        };
        match request {
            Request::GetFileName { bundle_name, file_name }
            | Request::GetIncrementalFileName { bundle_name, file_name } => {
                call.bundles = vec![bundle_name.clone()];
                call.file = Some(file_name.clone());
            }
            Request::PublishFile { file_info } | Request::PublishIncrementalFile { file_info } => {
                call.file_info = Some(file_info.clone());
            }
            Request::AppendBundlesRestore {
                bundle_names,
                restore_type,
                user_id,
                ..
            } => {
                call.bundles.clone_from(bundle_names);
                call.restore_type = Some(*restore_type);
                call.user_id = *user_id;
            }
            Request::AppendBundlesBackup { bundle_names } => call.bundles.clone_from(bundle_names),
            Request::AppendBundlesIncrementalBackup { bundles } | Request::GetLocalCapabilitiesIncremental { bundles } => {
                call.bundles = bundles.iter().map(|entry| entry.bundle_name.clone()).collect();
            }
            _ => {}
        }
        call
    }
}

/// What the broker does with one request.
pub struct Response {
    reply: Reply,
    notifications: Vec<Notification>,
    die: bool,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            reply: Reply::ok(0),
            notifications: Vec::new(),
            die: false,
        }
    }

    pub fn error(err_code: ErrCode) -> Self {
        Self {
            reply: Reply::error(0, err_code),
            ..Self::ok()
        }
    }

    pub fn fd(mut self, fd: impl Into<OwnedFd>) -> Self {
        self.reply = self.reply.with_fd(fd.into());
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.reply = self.reply.with_value(value);
        self
    }

    /// Notification delivered before the reply returns.
    pub fn then(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    /// The broker dies after answering, before any queued notification.
    pub fn die(mut self) -> Self {
        self.die = true;
        self
    }
}

type Script = Box<dyn Fn(&Request) -> Response + Send + Sync>;

struct Inner {
    script: Script,
    calls: Mutex<Vec<Call>>,
    kinds: Mutex<Vec<SessionKind>>,
    sink: Mutex<Option<NotificationSink>>,
    queue: Mutex<VecDeque<Notification>>,
    delivering: AtomicBool,
    dead: AtomicBool,
    releases: AtomicUsize,
    reachable: bool,
}

/// Scripted broker implementing [`Connector`].
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Broker {
    pub fn new(script: impl Fn(&Request) -> Response + Send + Sync + 'static) -> Self {
        Self::build(Box::new(script), true)
    }

    pub fn unreachable() -> Self {
        Self::build(Box::new(|_| Response::ok()), false)
    }

    fn build(script: Script, reachable: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                script,
                calls: Mutex::new(Vec::new()),
                kinds: Mutex::new(Vec::new()),
                sink: Mutex::new(None),
                queue: Mutex::new(VecDeque::new()),
                delivering: AtomicBool::new(false),
                dead: AtomicBool::new(false),
                releases: AtomicUsize::new(0),
                reachable,
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn codes(&self) -> Vec<ServiceCode> {
        self.calls().into_iter().map(|call| call.code).collect()
    }

    pub fn calls_with(&self, code: ServiceCode) -> Vec<Call> {
        self.calls().into_iter().filter(|call| call.code == code).collect()
    }

    pub fn kinds(&self) -> Vec<SessionKind> {
        self.inner.kinds.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// Delivers notifications one at a time, like a single dispatch thread.
    fn emit(&self, notifications: Vec<Notification>) {
        self.inner.queue.lock().unwrap().extend(notifications);
        if self.inner.delivering.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let next = self.inner.queue.lock().unwrap().pop_front();
            let Some(notification) = next else { break };
            if let Some(sink) = self.inner.sink.lock().unwrap().as_mut() {
                sink(notification);
            }
        }
        self.inner.delivering.store(false, Ordering::SeqCst);
    }

    fn call(&self, request: Request) -> TransportResult<Reply> {
        if self.inner.dead.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        let code = request.code();
        self.inner.calls.lock().unwrap().push(Call::from_request(&request));
        let response = (self.inner.script)(&request);
        let mut notifications = response.notifications;
        if response.die {
            self.inner.dead.store(true, Ordering::SeqCst);
            notifications.insert(0, Notification::ServiceDied);
        }
        self.emit(notifications);
        if response.reply.err_code != 0 {
            return Err(TransportError::Broker {
                code,
                err_code: response.reply.err_code,
            });
        }
        Ok(response.reply)
    }
}

struct BrokerTransport {
    broker: Broker,
    released: AtomicBool,
}

impl Transport for BrokerTransport {
    fn call(&self, request: Request) -> TransportResult<Reply> {
        if self.released.load(Ordering::SeqCst) {
            return Err(TransportError::Released);
        }
        self.broker.call(request)
    }

    fn is_alive(&self) -> bool {
        !self.released.load(Ordering::SeqCst) && !self.broker.inner.dead.load(Ordering::SeqCst)
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.broker.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Connector for Broker {
    fn connect(&self, kind: SessionKind, sink: NotificationSink) -> TransportResult<Box<dyn Transport>> {
        self.probe()?;
        self.inner.kinds.lock().unwrap().push(kind);
        *self.inner.sink.lock().unwrap() = Some(sink);
        self.call(kind.init_request())?;
        Ok(Box::new(BrokerTransport {
            broker: self.clone(),
            released: AtomicBool::new(false),
        }))
    }

    fn probe(&self) -> TransportResult<()> {
        if self.inner.reachable {
            Ok(())
        } else {
            Err(TransportError::Unreachable {
                path: PathBuf::from("/nonexistent/broker.sock"),
                source: std::io::Error::from_raw_os_error(libc::ECONNREFUSED),
            })
        }
    }
}

/// Staging roots under one temporary directory, plus a directory standing in
/// for the broker's side of every descriptor.
pub struct Fixture {
    pub dir: TempDir,
    pub layout: StagingLayout,
    pub registry: Arc<SessionRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StagingLayout::new(
            dir.path().join("received"),
            dir.path().join("incrementalreceived"),
            dir.path().join("install"),
        );
        fs::create_dir_all(dir.path().join("remote")).unwrap();
        Self {
            dir,
            layout,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn env(&self, broker: &Broker) -> SessionEnv {
        SessionEnv::new(Arc::new(broker.clone()), Arc::clone(&self.registry), self.layout.clone())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.path("remote")
    }

    /// Writes `contents` at `relative`, creating parents.
    pub fn stage(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }
}

/// A readable descriptor over `contents`, backed by a file in `dir`.
pub fn source_fd(dir: &Path, name: &str, contents: &str) -> OwnedFd {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    File::open(path).unwrap().into()
}

/// A writable descriptor for `dir/name`.
pub fn destination_fd(dir: &Path, name: &str) -> OwnedFd {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(dir.join(name))
        .unwrap()
        .into()
}

pub fn file_ready(owner: &str, name: &str, data: Option<OwnedFd>, manifest: Option<OwnedFd>) -> Notification {
    Notification::FileReady {
        file_info: FileInfo::new(owner, name, 0),
        data,
        manifest,
        err_code: 0,
    }
}

pub fn started(bundle: &str, err_code: ErrCode) -> Notification {
    Notification::BundleStarted {
        err_code,
        bundle_name: bundle.to_owned(),
    }
}

pub fn finished(bundle: &str, err_code: ErrCode) -> Notification {
    Notification::BundleFinished {
        err_code,
        bundle_name: bundle.to_owned(),
    }
}

pub fn all_finished(err_code: ErrCode) -> Notification {
    Notification::AllBundlesFinished { err_code }
}

/// Runs `operation` on another thread and fails the test if it does not return.
pub fn bounded<T: Send + 'static>(operation: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(operation());
    });
    rx.recv_timeout(Duration::from_secs(20))
        .expect("operation did not finish")
}
