use thiserror::Error;

use super::constants::{HEADER_LEN, MAX_PAYLOAD_LENGTH};

/// Failures encountered while parsing or constructing frame headers.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EnvelopeError {
    /// Fewer than [`HEADER_LEN`] bytes were provided when attempting to encode or decode a header.
    #[error("frame header truncated: expected {HEADER_LEN} bytes, got {actual}")]
    TruncatedHeader {
        /// Number of bytes that were available when the operation began.
        actual: usize,
    },
    /// The tag byte matches neither the reply tag nor a request/notification range.
    #[error("frame header contained invalid tag byte {0}")]
    InvalidTag(u8),
    /// A request tag named a service code outside the known set.
    #[error("unknown service code {0}")]
    UnknownServiceCode(u8),
    /// A notification tag named a reverse code outside the known set.
    #[error("unknown reverse code {0}")]
    UnknownReverseCode(u8),
    /// The payload length exceeded the representable range.
    #[error("frame payload length {0} exceeds maximum {MAX_PAYLOAD_LENGTH}")]
    OversizedPayload(usize),
}
