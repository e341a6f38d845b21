//! Zero-copy whole-file transfer using `sendfile` syscall with automatic fallback.
//!
//! A session moves files between two descriptors it already holds: a staged file
//! on local disk and a descriptor the broker granted over IPC. This module copies
//! the complete source into the destination, using Linux's `sendfile` when the
//! descriptor pair supports it and a buffered read/write loop otherwise.
//!
//! # Platform Support
//!
//! - **Linux**: Uses `sendfile` with an explicit source offset
//! - **Other platforms**: Buffered read/write only
//!
//! # Performance Characteristics
//!
//! - For files < 64KB: Uses read/write directly (lower syscall overhead)
//! - For files >= 64KB: Attempts `sendfile` for zero-copy transfer
//! - Fallback path uses 256KB buffer for efficient bulk transfer
//! - Sends data in chunks up to ~2GB to avoid signal interruption
//!
//! # Example
//!
//! ```no_run
//! use std::fs::{File, OpenOptions};
//! use fast_io::sendfile::send_whole_file;
//!
//! # fn main() -> std::io::Result<()> {
//! let staged = File::open("/data/backup/received/com.example.notes/data.tar")?;
//! let granted = OpenOptions::new().write(true).open("/proc/self/fd/7")?;
//! let sent = send_whole_file(granted, staged)?;
//! println!("Sent {} bytes", sent);
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{self, Read, Write};

use logging::trace_transfer;
use rustix::fs::FileType;

use crate::read_all::rewind;

/// Minimum file size to attempt sendfile (below this, read/write is fine).
#[cfg(target_os = "linux")]
const SENDFILE_THRESHOLD: u64 = 64 * 1024; // 64KB

/// Maximum bytes per sendfile call (Linux limit to avoid signal interruption).
#[cfg(target_os = "linux")]
const SENDFILE_CHUNK_SIZE: usize = 0x7fff_f000; // ~2GB

/// Buffer size for the read/write fallback.
const FALLBACK_BUFFER_SIZE: usize = 256 * 1024;

/// Copies the entire contents of `source` into `destination`.
///
/// Both descriptors are rewound to offset zero first (unseekable descriptors
/// such as pipes are used from their current position). A regular source is
/// copied up to its size at the time of the call; any other source is read
/// until end of file. When `destination` is a regular file it is truncated to
/// the number of bytes written, so a previously longer file does not keep
/// stale trailing data.
///
/// Ownership of both descriptors moves into this call; they are closed when it
/// returns, whether or not the copy succeeded.
///
/// # Arguments
///
/// * `destination` - Descriptor receiving the data (typically granted by the broker)
/// * `source` - Descriptor providing the data
///
/// # Returns
///
/// The number of bytes written to `destination`.
///
/// # Errors
///
/// Returns an error if:
/// - Either descriptor cannot be rewound or inspected
/// - Reading from `source` or writing to `destination` fails
/// - Truncating `destination` fails
pub fn send_whole_file(destination: File, source: File) -> io::Result<u64> {
    rewind(&source)?;
    rewind(&destination)?;

    let copied = match regular_length(&source)? {
        Some(length) => {
            let copied = copy_contents(&source, &destination, length)?;
            trace_transfer!(bytes = copied, expected = length, "whole-file transfer complete");
            copied
        }
        None => {
            let copied = copy_via_readwrite(&source, &destination, u64::MAX)?;
            trace_transfer!(bytes = copied, "stream transfer complete");
            copied
        }
    };

    if regular_length(&destination)?.is_some() {
        rustix::fs::ftruncate(&destination, copied)?;
    }
    Ok(copied)
}

/// Size of `file` when it is a regular file, `None` for pipes, sockets and devices.
fn regular_length(file: &File) -> io::Result<Option<u64>> {
    let stat = rustix::fs::fstat(file)?;
    if FileType::from_raw_mode(stat.st_mode) != FileType::RegularFile {
        return Ok(None);
    }
    Ok(Some(u64::try_from(stat.st_size).unwrap_or(0)))
}

#[cfg(target_os = "linux")]
fn copy_contents(source: &File, destination: &File, length: u64) -> io::Result<u64> {
    if length >= SENDFILE_THRESHOLD {
        if let Some(sent) = try_sendfile(source, destination, length)? {
            return Ok(sent);
        }
        trace_transfer!(length, "sendfile unsupported for descriptor pair, using read/write");
    }
    copy_via_readwrite(source, destination, length)
}

#[cfg(not(target_os = "linux"))]
fn copy_contents(source: &File, destination: &File, length: u64) -> io::Result<u64> {
    copy_via_readwrite(source, destination, length)
}

/// Attempts zero-copy transfer via `sendfile` syscall.
///
/// Returns `Ok(None)` when the kernel rejects the descriptor pair before any
/// byte moved, so the caller can fall back to read/write. The source offset is
/// tracked explicitly; the source file position is not used.
#[cfg(target_os = "linux")]
fn try_sendfile(source: &File, destination: &File, length: u64) -> io::Result<Option<u64>> {
    use std::os::fd::AsRawFd;

    let src_fd = source.as_raw_fd();
    let dest_fd = destination.as_raw_fd();
    let mut offset: libc::off_t = 0;
    let mut total: u64 = 0;

    while total < length {
        let chunk = (length - total).min(SENDFILE_CHUNK_SIZE as u64) as usize;
        // SAFETY: both descriptors are valid for the lifetime of the borrowed
        // `File`s and `offset` is a live, exclusively borrowed off_t.
        let result = unsafe { libc::sendfile(dest_fd, src_fd, &mut offset, chunk) };

        if result < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR | libc::EAGAIN) => continue,
                Some(libc::EINVAL | libc::ENOSYS | libc::EOPNOTSUPP) if total == 0 => {
                    return Ok(None);
                }
                _ => return Err(err),
            }
        }
        if result == 0 {
            // Source shrank underneath us
            break;
        }

        total += result as u64;
    }

    Ok(Some(total))
}

/// Fallback: buffered read/write through userspace.
///
/// Stops after `length` bytes or at end of file, whichever comes first.
fn copy_via_readwrite(source: &File, destination: &File, length: u64) -> io::Result<u64> {
    let mut reader = source;
    let mut writer = destination;
    let mut buf = vec![0u8; FALLBACK_BUFFER_SIZE];
    let mut total: u64 = 0;
    let mut remaining = length;

    while remaining > 0 {
        let to_read = usize::try_from(remaining).unwrap_or(usize::MAX).min(buf.len());
        let n = match reader.read(&mut buf[..to_read]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
        remaining -= n as u64;
    }
    writer.flush()?;

    Ok(total)
}

#[cfg(test)]
mod tests;
