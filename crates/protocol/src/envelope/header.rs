use core::convert::TryFrom;
use core::fmt;

use super::PAYLOAD_MASK;
use super::constants::{HEADER_LEN, MAX_PAYLOAD_LENGTH, NOTIFY_BASE, REPLY_TAG, REQUEST_BASE};
use super::error::EnvelopeError;
use super::reverse_code::ReverseCode;
use super::service_code::ServiceCode;

/// What a frame carries, derived from its tag byte.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FrameKind {
    /// Client to broker command.
    Request(ServiceCode),
    /// Broker answer to an earlier request, matched by sequence number.
    Reply,
    /// Broker to client notification.
    Notification(ReverseCode),
}

impl FrameKind {
    /// Returns the tag byte for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Request(code) => REQUEST_BASE + code.as_u8(),
            Self::Reply => REPLY_TAG,
            Self::Notification(code) => NOTIFY_BASE + code.as_u8(),
        }
    }

    /// Decodes a tag byte.
    pub const fn from_tag(tag: u8) -> Result<Self, EnvelopeError> {
        if tag == REPLY_TAG {
            return Ok(Self::Reply);
        }
        if tag >= NOTIFY_BASE {
            let value = tag - NOTIFY_BASE;
            return match ReverseCode::from_u8(value) {
                Some(code) => Ok(Self::Notification(code)),
                None => Err(EnvelopeError::UnknownReverseCode(value)),
            };
        }
        if tag >= REQUEST_BASE {
            let value = tag - REQUEST_BASE;
            return match ServiceCode::from_u8(value) {
                Some(code) => Ok(Self::Request(code)),
                None => Err(EnvelopeError::UnknownServiceCode(value)),
            };
        }
        Err(EnvelopeError::InvalidTag(tag))
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(code) => write!(f, "request {code}"),
            Self::Reply => f.write_str("reply"),
            Self::Notification(code) => write!(f, "notification {code}"),
        }
    }
}

/// A fully decoded frame header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    kind: FrameKind,
    payload_len: u32,
}

impl FrameHeader {
    /// Creates a new header for `kind` with the provided payload length.
    pub const fn new(kind: FrameKind, payload_len: usize) -> Result<Self, EnvelopeError> {
        if payload_len > MAX_PAYLOAD_LENGTH as usize {
            return Err(EnvelopeError::OversizedPayload(payload_len));
        }

        Ok(Self {
            kind,
            payload_len: payload_len as u32,
        })
    }

    /// Parses a header from the beginning of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < HEADER_LEN {
            return Err(EnvelopeError::TruncatedHeader {
                actual: bytes.len(),
            });
        }

        let mut encoded = [0u8; HEADER_LEN];
        encoded.copy_from_slice(&bytes[..HEADER_LEN]);
        Self::from_raw(u32::from_le_bytes(encoded))
    }

    /// Constructs a header from the raw 32-bit representation used on the wire.
    #[must_use = "Discard the decoded header only after handling potential validation errors"]
    #[inline]
    pub const fn from_raw(raw: u32) -> Result<Self, EnvelopeError> {
        match FrameKind::from_tag((raw >> 24) as u8) {
            Ok(kind) => Ok(Self {
                kind,
                payload_len: raw & PAYLOAD_MASK,
            }),
            Err(err) => Err(err),
        }
    }

    /// Encodes this header into the little-endian format used on the wire.
    #[must_use]
    pub const fn encode(self) -> [u8; HEADER_LEN] {
        self.encode_raw().to_le_bytes()
    }

    /// Returns the raw 32-bit representation of this header.
    #[must_use]
    #[inline]
    pub const fn encode_raw(self) -> u32 {
        ((self.kind.tag() as u32) << 24) | (self.payload_len & PAYLOAD_MASK)
    }

    /// Returns the decoded frame kind.
    #[must_use]
    #[inline]
    pub const fn kind(self) -> FrameKind {
        self.kind
    }

    /// Returns the payload length encoded in the header.
    #[must_use]
    #[inline]
    pub const fn payload_len(self) -> usize {
        self.payload_len as usize
    }
}

impl TryFrom<[u8; HEADER_LEN]> for FrameHeader {
    type Error = EnvelopeError;

    #[inline]
    fn try_from(bytes: [u8; HEADER_LEN]) -> Result<Self, Self::Error> {
        Self::decode(&bytes)
    }
}

impl TryFrom<&[u8; HEADER_LEN]> for FrameHeader {
    type Error = EnvelopeError;

    #[inline]
    fn try_from(bytes: &[u8; HEADER_LEN]) -> Result<Self, Self::Error> {
        Self::decode(bytes)
    }
}
