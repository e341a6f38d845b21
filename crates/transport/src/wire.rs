//! Frame I/O on a Unix stream socket with descriptor passing.
//!
//! A frame is written as its four header bytes, carrying the frame's
//! descriptors as one `SCM_RIGHTS` control message, followed by the payload.
//! Readers collect descriptors from every control message that arrives while
//! the header is being read.

use std::io::{self, Read, Write};
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::ptr;

use logging::trace_ipc;
use protocol::{Frame, FrameHeader, HEADER_LEN, MAX_FDS_PER_FRAME};

use crate::error::{TransportError, TransportResult};

/// Writes `frame` to `stream`.
///
/// The frame's descriptors are duplicated into the peer by the kernel and
/// closed locally once the header is sent.
pub fn send_frame(stream: &UnixStream, frame: Frame) -> TransportResult<()> {
    if frame.fds.len() > MAX_FDS_PER_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} descriptors exceed the per-frame limit", frame.fds.len()),
        )
        .into());
    }
    let header = frame.header()?;
    let raw: Vec<RawFd> = frame.fds.iter().map(AsRawFd::as_raw_fd).collect();

    let sent = send_with_fds(stream, &header.encode(), &raw)?;
    let mut writer = stream;
    if sent < HEADER_LEN {
        writer.write_all(&header.encode()[sent..])?;
    }
    writer.write_all(&frame.payload)?;

    trace_ipc!(kind = %frame.kind, len = frame.payload.len(), fds = raw.len(), "frame sent");
    Ok(())
}

/// Reads the next frame from `stream`.
///
/// Returns `Ok(None)` when the peer closed the connection on a frame
/// boundary; a close in the middle of a frame is an error.
pub fn recv_frame(stream: &UnixStream) -> TransportResult<Option<Frame>> {
    let mut header = [0_u8; HEADER_LEN];
    let mut fds = Vec::new();
    let mut filled = 0;

    while filled < HEADER_LEN {
        let read = recv_with_fds(stream, &mut header[filled..], &mut fds)?;
        if read == 0 {
            if filled == 0 && fds.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        filled += read;
    }

    let header = FrameHeader::decode(&header)?;
    let mut payload = vec![0_u8; header.payload_len()];
    let mut reader = stream;
    reader.read_exact(&mut payload)?;

    trace_ipc!(kind = %header.kind(), len = payload.len(), fds = fds.len(), "frame received");
    Ok(Some(Frame {
        kind: header.kind(),
        payload,
        fds,
    }))
}

fn control_space(count: usize) -> usize {
    let bytes = u32::try_from(count * mem::size_of::<libc::c_int>()).unwrap_or(u32::MAX);
    // SAFETY: CMSG_SPACE only performs arithmetic on its argument.
    unsafe { libc::CMSG_SPACE(bytes) as usize }
}

/// Control buffer aligned for `cmsghdr`.
fn control_buffer(count: usize) -> Vec<u64> {
    vec![0_u64; control_space(count).div_ceil(mem::size_of::<u64>())]
}

fn send_with_fds(stream: &UnixStream, bytes: &[u8], fds: &[RawFd]) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: bytes.as_ptr().cast_mut().cast(),
        iov_len: bytes.len(),
    };
    let mut control = control_buffer(fds.len());

    // SAFETY: msghdr is plain data; an all-zero value is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &raw mut iov;
    msg.msg_iovlen = 1;

    if !fds.is_empty() {
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = control_space(fds.len()) as _;
        let payload_len = u32::try_from(mem::size_of_val(fds)).unwrap_or(u32::MAX);

        // SAFETY: msg_control points at a zeroed buffer of CMSG_SPACE(len)
        // bytes aligned for cmsghdr, so the first header and its data area
        // of `payload_len` bytes are in bounds.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&raw const msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(payload_len) as _;
            ptr::copy_nonoverlapping(
                fds.as_ptr().cast::<u8>(),
                libc::CMSG_DATA(cmsg),
                mem::size_of_val(fds),
            );
        }
    }

    loop {
        // SAFETY: the socket descriptor is valid for the borrow of `stream`
        // and `msg` references live buffers for the duration of the call.
        let sent = unsafe { libc::sendmsg(stream.as_raw_fd(), &raw const msg, libc::MSG_NOSIGNAL) };
        if sent >= 0 {
            return Ok(sent.unsigned_abs());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn recv_with_fds(stream: &UnixStream, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    let mut control = control_buffer(MAX_FDS_PER_FRAME);

    // SAFETY: msghdr is plain data; an all-zero value is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &raw mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = control_space(MAX_FDS_PER_FRAME) as _;

    let received = loop {
        // SAFETY: the socket descriptor is valid for the borrow of `stream`;
        // `msg` points at `buf` and `control`, both live and writable.
        let received =
            unsafe { libc::recvmsg(stream.as_raw_fd(), &raw mut msg, libc::MSG_CMSG_CLOEXEC) };
        if received >= 0 {
            break received.unsigned_abs();
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    };

    // SAFETY: after a successful recvmsg the kernel has written
    // msg_controllen bytes of well-formed control messages into `control`;
    // CMSG_FIRSTHDR/CMSG_NXTHDR stay within that range and each SCM_RIGHTS
    // payload holds `cmsg_len - CMSG_LEN(0)` bytes of descriptors that this
    // process now owns.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&raw const msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg);
                let bytes = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                let count = bytes / mem::size_of::<libc::c_int>();
                for index in 0..count {
                    let raw = ptr::read_unaligned(data.cast::<libc::c_int>().add(index));
                    fds.push(OwnedFd::from_raw_fd(raw));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&raw const msg, cmsg);
        }
    }

    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "descriptor list truncated by the kernel",
        ));
    }
    Ok(received)
}
