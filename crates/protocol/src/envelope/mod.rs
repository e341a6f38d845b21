mod constants;
mod error;
mod header;
mod reverse_code;
mod service_code;

pub use constants::{HEADER_LEN, MAX_FDS_PER_FRAME, MAX_PAYLOAD_LENGTH, NOTIFY_BASE, REPLY_TAG, REQUEST_BASE};
pub use error::EnvelopeError;
pub use header::{FrameHeader, FrameKind};
pub use reverse_code::{ParseReverseCodeError, ReverseCode};
pub use service_code::{ParseServiceCodeError, ServiceCode};

pub(crate) use constants::PAYLOAD_MASK;

#[cfg(test)]
mod tests;
