//! Owned frames: a header kind, a JSON payload and attached descriptors.

use std::os::fd::OwnedFd;

use crate::envelope::{EnvelopeError, FrameHeader, FrameKind, MAX_FDS_PER_FRAME};
use crate::error::{PayloadError, PayloadResult};

/// One message as it travels over the broker socket.
///
/// Descriptors are owned by the frame until a decoder moves them into the
/// typed message; dropping a frame closes whatever it still holds.
#[derive(Debug)]
pub struct Frame {
    /// Kind encoded in the header tag.
    pub kind: FrameKind,
    /// JSON payload bytes.
    pub payload: Vec<u8>,
    /// Descriptors passed alongside the payload, in payload order.
    pub fds: Vec<OwnedFd>,
}

impl Frame {
    /// Creates a frame without descriptors.
    #[must_use]
    pub const fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            fds: Vec::new(),
        }
    }

    /// Returns the header describing this frame.
    pub fn header(&self) -> Result<FrameHeader, EnvelopeError> {
        FrameHeader::new(self.kind, self.payload.len())
    }

    /// Moves out exactly `expected` descriptors, in order.
    pub(crate) fn take_fds(&mut self, expected: usize) -> PayloadResult<Vec<OwnedFd>> {
        if self.fds.len() != expected || expected > MAX_FDS_PER_FRAME {
            return Err(PayloadError::DescriptorCount {
                kind: self.kind,
                expected,
                actual: self.fds.len(),
            });
        }
        Ok(std::mem::take(&mut self.fds))
    }
}
