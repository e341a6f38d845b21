//! Whole-file transfer primitives for backup sessions.
//!
//! Every transfer in a session moves one complete file between two descriptors
//! that are already open: a locally staged file and a descriptor granted by the
//! broker (or the reverse, when receiving a backup). This crate keeps those
//! moves in the kernel where it can.
//!
//! # Features
//!
//! - **Zero-copy whole-file transfer** using `sendfile` on Linux
//! - **Buffered fallback** when the descriptor pair does not support `sendfile`
//! - **Read-all helpers** for small control files (capability files, indexes)
//!
//! # Design Principles
//!
//! 1. **Ownership moves in** - [`send_whole_file`] consumes both descriptors and
//!    closes them before returning, on every path
//! 2. **Whole files only** - both sides are rewound first and the destination is
//!    truncated to what was written
//! 3. **Graceful fallback** - pipes, sockets and filesystems without `sendfile`
//!    support use a 256KB buffered copy

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

pub mod read_all;
pub mod sendfile;

pub use read_all::{read_all, read_to_string};
pub use sendfile::send_whole_file;
