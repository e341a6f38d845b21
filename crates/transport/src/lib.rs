#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `transport` connects a backup session to the broker. It owns the Unix
//! socket, moves descriptors across it as `SCM_RIGHTS` ancillary data,
//! matches replies to the requests that caused them and turns the broker's
//! disappearance into a single `ServiceDied` notification.
//!
//! # Design
//!
//! Sessions see two traits. A [`Connector`] opens a connection for a
//! [`SessionKind`] and hands every notification to a [`NotificationSink`]; the
//! resulting [`Transport`] issues requests and is released exactly once.
//! [`SocketConnector`] is the production implementation; tests substitute an
//! in-memory broker behind the same traits.
//!
//! A socket transport runs two threads. The reader thread is the only reader
//! of the socket: it completes pending calls by sequence number and queues
//! notifications. The dispatch thread drains that queue into the sink, so a
//! sink may issue requests of its own without stalling reply delivery.
//!
//! # Invariants
//!
//! - `ServiceDied` is delivered at most once per connection and never after
//!   [`Transport::release`].
//! - Once the peer is gone every outstanding and future call fails with
//!   [`TransportError::Disconnected`].
//! - Descriptors received with a frame are owned by that frame; undecodable
//!   frames close theirs on drop.

mod connection;
mod error;
mod socket;
pub mod wire;

pub use connection::{Connector, NotificationSink, SessionKind, Transport};
pub use error::{TransportError, TransportResult};
pub use socket::{SocketConnector, SocketTransport};
