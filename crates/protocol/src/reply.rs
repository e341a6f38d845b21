//! Broker answers to requests.

use std::os::fd::OwnedFd;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::FrameKind;
use crate::error::{PayloadError, PayloadResult};
use crate::frame::Frame;
use crate::types::{ERR_OK, ErrCode};

/// Answer to one request, matched to it by `seq`.
#[derive(Debug)]
pub struct Reply {
    /// Sequence number of the request being answered.
    pub seq: u64,
    /// Broker status; [`ERR_OK`] on success.
    pub err_code: ErrCode,
    /// Command-specific result value (`null` when the command returns nothing).
    pub value: Value,
    /// Descriptors granted with the reply.
    pub fds: Vec<OwnedFd>,
}

/// Value returned with a file handle grant.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileHandleValue {
    /// Sequence number the broker assigned to the file.
    pub sn: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody {
    seq: u64,
    #[serde(default)]
    err_code: ErrCode,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    fds: usize,
}

impl Reply {
    /// A successful reply with no value.
    #[must_use]
    pub const fn ok(seq: u64) -> Self {
        Self {
            seq,
            err_code: ERR_OK,
            value: Value::Null,
            fds: Vec::new(),
        }
    }

    /// A failed reply.
    #[must_use]
    pub const fn error(seq: u64, err_code: ErrCode) -> Self {
        Self {
            seq,
            err_code,
            value: Value::Null,
            fds: Vec::new(),
        }
    }

    /// Attaches a result value.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Attaches a descriptor.
    #[must_use]
    pub fn with_fd(mut self, fd: OwnedFd) -> Self {
        self.fds.push(fd);
        self
    }

    /// Reports whether the broker accepted the request.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.err_code == ERR_OK
    }

    /// Moves the first granted descriptor out of the reply.
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        if self.fds.is_empty() {
            None
        } else {
            Some(self.fds.remove(0))
        }
    }

    /// Deserializes the result value.
    pub fn value_as<T: DeserializeOwned>(&self) -> PayloadResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|err| PayloadError::json(FrameKind::Reply, err))
    }

    /// Encodes the reply.
    pub fn into_frame(self) -> PayloadResult<Frame> {
        let body = ReplyBody {
            seq: self.seq,
            err_code: self.err_code,
            value: self.value,
            fds: self.fds.len(),
        };
        let payload =
            serde_json::to_vec(&body).map_err(|err| PayloadError::json(FrameKind::Reply, err))?;
        let mut frame = Frame::new(FrameKind::Reply, payload);
        frame.header()?;
        frame.fds = self.fds;
        Ok(frame)
    }

    /// Decodes a reply frame.
    pub fn from_frame(mut frame: Frame) -> PayloadResult<Self> {
        if frame.kind != FrameKind::Reply {
            return Err(PayloadError::UnexpectedFrame(frame.kind));
        }
        let body: ReplyBody = serde_json::from_slice(&frame.payload)
            .map_err(|err| PayloadError::json(FrameKind::Reply, err))?;
        let fds = frame.take_fds(body.fds)?;
        Ok(Self {
            seq: body.seq,
            err_code: body.err_code,
            value: body.value,
            fds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_handle_value_round_trip_through_frame() {
        let reply = Reply::ok(3)
            .with_value(serde_json::json!({"sn": 12}))
            .with_fd(tempfile::tempfile().unwrap().into());

        let mut decoded = Reply::from_frame(reply.into_frame().unwrap()).unwrap();
        assert_eq!(decoded.seq, 3);
        assert!(decoded.is_ok());
        assert_eq!(decoded.value_as::<FileHandleValue>().unwrap().sn, 12);
        assert!(decoded.take_fd().is_some());
        assert!(decoded.take_fd().is_none());
    }

    #[test]
    fn error_reply_defaults() {
        let frame = Frame::new(FrameKind::Reply, br#"{"seq":8,"errCode":13900020}"#.to_vec());
        let reply = Reply::from_frame(frame).unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.err_code, 13_900_020);
        assert!(reply.value.is_null());
    }

    #[test]
    fn announced_descriptor_must_be_present() {
        let frame = Frame::new(FrameKind::Reply, br#"{"seq":1,"fds":1}"#.to_vec());
        assert!(matches!(
            Reply::from_frame(frame),
            Err(PayloadError::DescriptorCount {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }
}
