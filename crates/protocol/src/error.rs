use thiserror::Error;

use crate::envelope::{EnvelopeError, FrameKind, ServiceCode};

/// Result alias for payload encoding and decoding.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Failures turning typed messages into frames and back.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Header could not be built or parsed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// Payload was not the JSON this frame kind expects.
    #[error("malformed {kind} payload: {source}")]
    Json {
        /// Frame kind being decoded or encoded.
        kind: FrameKind,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A field the frame kind requires was absent.
    #[error("{kind} payload is missing field `{field}`")]
    MissingField {
        /// Frame kind being decoded.
        kind: FrameKind,
        /// Missing JSON key.
        field: &'static str,
    },
    /// The number of attached descriptors does not match the payload.
    #[error("{kind} expects {expected} descriptor(s), frame carried {actual}")]
    DescriptorCount {
        /// Frame kind being decoded.
        kind: FrameKind,
        /// Descriptors the payload announced.
        expected: usize,
        /// Descriptors actually attached.
        actual: usize,
    },
    /// A frame of the wrong kind was handed to a decoder.
    #[error("unexpected {0}")]
    UnexpectedFrame(FrameKind),
    /// The request code is not one this surface issues.
    #[error("request {0} is not issued by clients")]
    UnsupportedRequest(ServiceCode),
    /// The notification exists only inside the client and has no wire form.
    #[error("service-died is synthesized locally and cannot be framed")]
    LocalOnly,
}

impl PayloadError {
    pub(crate) fn json(kind: FrameKind, source: serde_json::Error) -> Self {
        Self::Json { kind, source }
    }
}
