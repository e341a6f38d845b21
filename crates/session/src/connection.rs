//! The session's side of the broker connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use logging::trace_ipc;
use protocol::{Reply, Request};
use transport::Transport;

use crate::error::{OperationError, OperationResult};

/// A broker connection that remembers whether the broker died.
///
/// Once marked dead every call fails with [`OperationError::ConnectionLost`]
/// without reaching the transport.
pub(crate) struct ConnectionHandle {
    transport: Box<dyn Transport>,
    dead: AtomicBool,
    released: AtomicBool,
}

impl ConnectionHandle {
    pub(crate) fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            dead: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// Sends `request` and returns the successful reply.
    pub(crate) fn call(&self, request: Request) -> OperationResult<Reply> {
        if self.is_dead() {
            trace_ipc!(code = %request.code(), "call refused on dead connection");
            return Err(OperationError::ConnectionLost);
        }
        let code = request.code();
        trace_ipc!(%code, "calling broker");
        self.transport.call(request).map_err(|err| {
            if err.is_connection_lost() {
                self.mark_dead();
            }
            OperationError::from(err)
        })
    }

    /// Records that the broker went away.
    pub(crate) fn mark_dead(&self) {
        if !self.dead.swap(true, Ordering::AcqRel) {
            trace_ipc!("connection marked dead");
        }
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Tears the connection down once.
    pub(crate) fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        trace_ipc!(dead = self.is_dead(), "releasing connection");
        self.transport.release();
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("dead", &self.is_dead())
            .field("released", &self.released.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
