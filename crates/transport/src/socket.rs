//! Unix socket connection to the broker.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use logging::{targets, trace_ipc};
use protocol::{Frame, FrameKind, Notification, Reply, Request};

use crate::connection::{Connector, NotificationSink, SessionKind, Transport};
use crate::error::{TransportError, TransportResult};
use crate::wire;

type Waiter = Sender<TransportResult<Reply>>;

/// Opens connections to the broker's listening socket.
#[derive(Clone, Debug)]
pub struct SocketConnector {
    path: PathBuf,
}

impl SocketConnector {
    /// Connector for the socket at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Socket path this connector dials.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> TransportResult<UnixStream> {
        UnixStream::connect(&self.path).map_err(|source| TransportError::Unreachable {
            path: self.path.clone(),
            source,
        })
    }
}

impl Connector for SocketConnector {
    fn connect(&self, kind: SessionKind, sink: NotificationSink) -> TransportResult<Box<dyn Transport>> {
        let stream = self.open()?;
        let transport = SocketTransport::spawn(stream, sink)?;
        transport.call(kind.init_request())?;
        tracing::debug!(target: targets::IPC, ?kind, path = %self.path.display(), "broker session initialized");
        Ok(Box::new(transport))
    }

    fn probe(&self) -> TransportResult<()> {
        let stream = self.open()?;
        drop(stream);
        trace_ipc!(path = %self.path.display(), "broker reachable");
        Ok(())
    }
}

struct Shared {
    writer: Mutex<UnixStream>,
    pending: DashMap<u64, Waiter>,
    next_seq: AtomicU64,
    alive: AtomicBool,
    released: AtomicBool,
}

impl Shared {
    fn writer(&self) -> MutexGuard<'_, UnixStream> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, frame: Frame) -> TransportResult<()> {
        let writer = self.writer();
        wire::send_frame(&writer, frame)
    }

    fn lost(&self) -> TransportError {
        if self.released.load(Ordering::SeqCst) {
            TransportError::Released
        } else {
            TransportError::Disconnected
        }
    }

    fn fail_pending(&self) {
        self.pending.retain(|seq, waiter| {
            trace_ipc!(seq = *seq, "failing call on closed connection");
            let _ = waiter.send(Err(self.lost()));
            false
        });
    }
}

/// A broker session carried over a connected Unix stream.
///
/// Dropping the transport releases it.
pub struct SocketTransport {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SocketTransport {
    /// Starts the reader and dispatch threads on an already connected stream.
    ///
    /// No session-init request is sent; [`SocketConnector::connect`] does that.
    pub fn spawn(stream: UnixStream, sink: NotificationSink) -> TransportResult<Self> {
        let reader_stream = stream.try_clone()?;
        let shared = Arc::new(Shared {
            writer: Mutex::new(stream),
            pending: DashMap::new(),
            next_seq: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            released: AtomicBool::new(false),
        });

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        thread::Builder::new()
            .name("backup-ipc-dispatch".into())
            .spawn(move || dispatch(&events_rx, sink))?;

        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name("backup-ipc-reader".into())
            .spawn(move || read_loop(&reader_stream, &reader_shared, &events_tx))?;

        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }

    fn send_release(&self) {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        let sent = Request::Release
            .into_frame(seq)
            .map_err(TransportError::from)
            .and_then(|frame| self.shared.send(frame));
        match sent {
            Ok(()) => trace_ipc!(seq, "release sent"),
            Err(err) => trace_ipc!(seq, error = %err, "release not delivered"),
        }
    }
}

impl Transport for SocketTransport {
    fn call(&self, request: Request) -> TransportResult<Reply> {
        let code = request.code();
        if self.shared.released.load(Ordering::SeqCst) {
            return Err(TransportError::Released);
        }
        if !self.shared.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        let frame = request.into_frame(seq)?;
        let (waiter, reply) = crossbeam_channel::bounded(1);
        self.shared.pending.insert(seq, waiter);

        // The reader marks the connection dead before draining `pending`, so
        // a call registered after the drain sees the flag here.
        if !self.shared.alive.load(Ordering::SeqCst) {
            self.shared.pending.remove(&seq);
            return Err(self.shared.lost());
        }
        if let Err(err) = self.shared.send(frame) {
            self.shared.pending.remove(&seq);
            return Err(if self.is_alive() { err } else { self.shared.lost() });
        }
        trace_ipc!(seq, %code, "request sent");

        let reply = reply.recv().map_err(|_| self.shared.lost())??;
        trace_ipc!(seq, %code, err_code = reply.err_code, "reply received");
        if !reply.is_ok() {
            return Err(TransportError::Broker {
                code,
                err_code: reply.err_code,
            });
        }
        Ok(reply)
    }

    fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst) && !self.shared.released.load(Ordering::SeqCst)
    }

    fn release(&self) {
        if self.shared.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.shared.alive.load(Ordering::SeqCst) {
            self.send_release();
        }
        if let Err(err) = self.shared.writer().shutdown(Shutdown::Both) {
            trace_ipc!(error = %err, "socket already shut down");
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader
            && handle.join().is_err()
        {
            tracing::warn!(target: targets::IPC, "broker reader thread panicked");
        }
        tracing::debug!(target: targets::IPC, "broker connection released");
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_loop(stream: &UnixStream, shared: &Shared, events: &Sender<Notification>) {
    loop {
        match wire::recv_frame(stream) {
            Ok(Some(frame)) => route(frame, shared, events),
            Ok(None) => break,
            Err(err) => {
                if !shared.released.load(Ordering::SeqCst) {
                    tracing::warn!(target: targets::IPC, error = %err, "broker connection failed");
                }
                break;
            }
        }
    }

    shared.alive.store(false, Ordering::SeqCst);
    shared.fail_pending();

    if shared.released.load(Ordering::SeqCst) {
        trace_ipc!("reader stopped after release");
    } else {
        tracing::warn!(target: targets::IPC, "backup service died");
        let _ = events.send(Notification::ServiceDied);
    }
}

fn route(frame: Frame, shared: &Shared, events: &Sender<Notification>) {
    let kind = frame.kind;
    match kind {
        FrameKind::Reply => match Reply::from_frame(frame) {
            Ok(reply) => match shared.pending.remove(&reply.seq) {
                Some((_, waiter)) => {
                    let _ = waiter.send(Ok(reply));
                }
                None => trace_ipc!(seq = reply.seq, "reply without a waiting call dropped"),
            },
            Err(err) => tracing::warn!(target: targets::IPC, error = %err, "undecodable reply dropped"),
        },
        FrameKind::Notification(_) => match Notification::from_frame(frame) {
            Ok(notification) => {
                let _ = events.send(notification);
            }
            Err(err) => {
                tracing::warn!(target: targets::IPC, %kind, error = %err, "undecodable notification dropped");
            }
        },
        FrameKind::Request(_) => {
            tracing::warn!(target: targets::IPC, %kind, "unexpected request from the backup service ignored");
        }
    }
}

fn dispatch(events: &Receiver<Notification>, mut sink: NotificationSink) {
    for notification in events {
        trace_ipc!(notification = notification.name(), "dispatching");
        sink(notification);
    }
}
