#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! The command surface shared by `backup_tool` and the backup broker.
//!
//! Every exchange with the broker is a frame: a four-byte little-endian header
//! whose high byte tags the frame (request, reply or notification, plus the
//! command code) and whose low 24 bits give the payload length, followed by a
//! JSON payload. Descriptors travel next to the header as ancillary data; this
//! crate only accounts for them, the socket layer moves them.
//!
//! - [`ServiceCode`] and [`ReverseCode`] are the closed, stable code sets.
//! - [`FrameHeader`] encodes and validates the header.
//! - [`Request`], [`Reply`] and [`Notification`] are the typed messages, each
//!   with `into_frame`/`from_frame`.
//!
//! # Examples
//!
//! ```
//! use protocol::{FrameHeader, FrameKind, Request, ServiceCode};
//!
//! let frame = Request::Start.into_frame(1).unwrap();
//! let header = frame.header().unwrap();
//! assert_eq!(header.kind(), FrameKind::Request(ServiceCode::Start));
//!
//! let decoded = FrameHeader::decode(&header.encode()).unwrap();
//! assert_eq!(decoded, header);
//! ```

mod envelope;
mod error;
mod frame;
mod notification;
mod reply;
mod request;
mod types;

pub use envelope::{
    EnvelopeError, FrameHeader, FrameKind, HEADER_LEN, MAX_FDS_PER_FRAME, MAX_PAYLOAD_LENGTH,
    NOTIFY_BASE, ParseReverseCodeError, ParseServiceCodeError, REPLY_TAG, REQUEST_BASE,
    ReverseCode, ServiceCode,
};
pub use error::{PayloadError, PayloadResult};
pub use frame::Frame;
pub use notification::Notification;
pub use reply::{FileHandleValue, Reply};
pub use request::Request;
pub use types::{BundleName, ERR_OK, ErrCode, FileInfo, IncrementalData, RestoreType, Scenario};
