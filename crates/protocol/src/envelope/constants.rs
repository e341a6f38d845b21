/// Number of bytes in an encoded frame header.
pub const HEADER_LEN: usize = 4;

/// Largest payload a single frame can carry (24-bit length field).
pub const MAX_PAYLOAD_LENGTH: u32 = 0x00FF_FFFF;

pub(crate) const PAYLOAD_MASK: u32 = 0x00FF_FFFF;

/// Tag carried by every reply frame.
pub const REPLY_TAG: u8 = 0x07;

/// Offset added to a [`super::ServiceCode`] to form a request tag.
pub const REQUEST_BASE: u8 = 0x20;

/// Offset added to a [`super::ReverseCode`] to form a notification tag.
pub const NOTIFY_BASE: u8 = 0x80;

/// Most descriptors attached to one frame.
pub const MAX_FDS_PER_FRAME: usize = 4;
