//! Client to broker commands.

use std::os::fd::OwnedFd;

use serde::{Deserialize, Serialize};

use crate::envelope::{FrameKind, ServiceCode};
use crate::error::{PayloadError, PayloadResult};
use crate::frame::Frame;
use crate::types::{BundleName, FileInfo, IncrementalData, RestoreType, Scenario};

/// A command this client can send to the broker.
#[derive(Debug)]
pub enum Request {
    /// Open a restore session.
    InitRestoreSession,
    /// Open a full backup session.
    InitBackupSession,
    /// Open an incremental backup session.
    InitIncrementalBackupSession,
    /// Ask for the device capability file.
    GetLocalCapabilities,
    /// Ask for a capability file covering the given baselines.
    GetLocalCapabilitiesIncremental {
        /// Bundles and their baselines.
        bundles: Vec<IncrementalData>,
    },
    /// Ask for the handle of one staged restore file.
    GetFileName {
        /// Owning bundle.
        bundle_name: BundleName,
        /// File inside the bundle.
        file_name: String,
    },
    /// Ask for the handle of one staged incremental file.
    GetIncrementalFileName {
        /// Owning bundle.
        bundle_name: BundleName,
        /// File inside the bundle.
        file_name: String,
    },
    /// Declare a restored file (or container) complete.
    PublishFile {
        /// File being published.
        file_info: FileInfo,
    },
    /// Incremental counterpart of [`Request::PublishFile`].
    PublishIncrementalFile {
        /// File being published.
        file_info: FileInfo,
    },
    /// Append bundles to a restore session.
    AppendBundlesRestore {
        /// Capability file describing the bundles.
        capabilities: OwnedFd,
        /// Bundles to restore.
        bundle_names: Vec<BundleName>,
        /// Whether data is pushed after the append.
        restore_type: RestoreType,
        /// Target user, when not the broker's default.
        user_id: Option<i32>,
    },
    /// Append bundles to a full backup session.
    AppendBundlesBackup {
        /// Bundles to back up.
        bundle_names: Vec<BundleName>,
    },
    /// Append bundles with baselines to an incremental backup session.
    AppendBundlesIncrementalBackup {
        /// Bundles and their baselines.
        bundles: Vec<IncrementalData>,
    },
    /// Start processing appended bundles.
    Start,
    /// No more bundles will be appended.
    Finish,
    /// Tear the session down.
    Release,
    /// Report a free-form result string.
    ResultReport {
        /// Result text.
        result: String,
        /// Session direction.
        scenario: Scenario,
    },
    /// Query broker metadata for a bundle.
    GetBackupInfo {
        /// Bundle queried.
        bundle_name: BundleName,
    },
}

#[derive(Serialize, Deserialize)]
struct RequestBody {
    seq: u64,
    #[serde(default)]
    args: RequestArgs,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RequestArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle_name: Option<BundleName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_info: Option<FileInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle_names: Option<Vec<BundleName>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundles: Option<Vec<IncrementalData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    restore_type: Option<RestoreType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<Scenario>,
}

fn required<T>(kind: FrameKind, field: &'static str, value: Option<T>) -> PayloadResult<T> {
    value.ok_or(PayloadError::MissingField { kind, field })
}

impl Request {
    /// Returns the service code this request travels under.
    #[must_use]
    pub const fn code(&self) -> ServiceCode {
        match self {
            Self::InitRestoreSession => ServiceCode::InitRestoreSession,
            Self::InitBackupSession => ServiceCode::InitBackupSession,
            Self::InitIncrementalBackupSession => ServiceCode::InitIncrementalBackupSession,
            Self::GetLocalCapabilities => ServiceCode::GetLocalCapabilities,
            Self::GetLocalCapabilitiesIncremental { .. } => {
                ServiceCode::GetLocalCapabilitiesIncremental
            }
            Self::GetFileName { .. } => ServiceCode::GetFileName,
            Self::GetIncrementalFileName { .. } => ServiceCode::GetIncrementalFileName,
            Self::PublishFile { .. } => ServiceCode::PublishFile,
            Self::PublishIncrementalFile { .. } => ServiceCode::PublishIncrementalFile,
            Self::AppendBundlesRestore { .. } => ServiceCode::AppendBundlesRestoreSession,
            Self::AppendBundlesBackup { .. } => ServiceCode::AppendBundlesBackupSession,
            Self::AppendBundlesIncrementalBackup { .. } => {
                ServiceCode::AppendBundlesIncrementalBackupSession
            }
            Self::Start => ServiceCode::Start,
            Self::Finish => ServiceCode::Finish,
            Self::Release => ServiceCode::ReleaseSession,
            Self::ResultReport { .. } => ServiceCode::ResultReport,
            Self::GetBackupInfo { .. } => ServiceCode::GetBackupInfo,
        }
    }

    /// Encodes the request under sequence number `seq`.
    pub fn into_frame(self, seq: u64) -> PayloadResult<Frame> {
        let kind = FrameKind::Request(self.code());
        let mut args = RequestArgs::default();
        let mut fds = Vec::new();

        match self {
            Self::InitRestoreSession
            | Self::InitBackupSession
            | Self::InitIncrementalBackupSession
            | Self::GetLocalCapabilities
            | Self::Start
            | Self::Finish
            | Self::Release => {}
            Self::GetLocalCapabilitiesIncremental { bundles }
            | Self::AppendBundlesIncrementalBackup { bundles } => args.bundles = Some(bundles),
            Self::GetFileName {
                bundle_name,
                file_name,
            }
            | Self::GetIncrementalFileName {
                bundle_name,
                file_name,
            } => {
                args.bundle_name = Some(bundle_name);
                args.file_name = Some(file_name);
            }
            Self::PublishFile { file_info } | Self::PublishIncrementalFile { file_info } => {
                args.file_info = Some(file_info);
            }
            Self::AppendBundlesRestore {
                capabilities,
                bundle_names,
                restore_type,
                user_id,
            } => {
                fds.push(capabilities);
                args.bundle_names = Some(bundle_names);
                args.restore_type = Some(restore_type);
                args.user_id = user_id;
            }
            Self::AppendBundlesBackup { bundle_names } => args.bundle_names = Some(bundle_names),
            Self::ResultReport { result, scenario } => {
                args.result = Some(result);
                args.scenario = Some(scenario);
            }
            Self::GetBackupInfo { bundle_name } => args.bundle_name = Some(bundle_name),
        }

        let payload = serde_json::to_vec(&RequestBody { seq, args })
            .map_err(|err| PayloadError::json(kind, err))?;
        let mut frame = Frame::new(kind, payload);
        frame.header()?;
        frame.fds = fds;
        Ok(frame)
    }

    /// Decodes a request frame into its sequence number and request.
    pub fn from_frame(mut frame: Frame) -> PayloadResult<(u64, Self)> {
        let kind = frame.kind;
        let FrameKind::Request(code) = kind else {
            return Err(PayloadError::UnexpectedFrame(kind));
        };
        let body: RequestBody =
            serde_json::from_slice(&frame.payload).map_err(|err| PayloadError::json(kind, err))?;
        let args = body.args;

        let expected_fds = usize::from(code == ServiceCode::AppendBundlesRestoreSession);
        let mut fds = frame.take_fds(expected_fds)?.into_iter();

        let request = match code {
            ServiceCode::InitRestoreSession => Self::InitRestoreSession,
            ServiceCode::InitBackupSession => Self::InitBackupSession,
            ServiceCode::InitIncrementalBackupSession => Self::InitIncrementalBackupSession,
            ServiceCode::GetLocalCapabilities => Self::GetLocalCapabilities,
            ServiceCode::GetLocalCapabilitiesIncremental => Self::GetLocalCapabilitiesIncremental {
                bundles: required(kind, "bundles", args.bundles)?,
            },
            ServiceCode::GetFileName => Self::GetFileName {
                bundle_name: required(kind, "bundleName", args.bundle_name)?,
                file_name: required(kind, "fileName", args.file_name)?,
            },
            ServiceCode::GetIncrementalFileName => Self::GetIncrementalFileName {
                bundle_name: required(kind, "bundleName", args.bundle_name)?,
                file_name: required(kind, "fileName", args.file_name)?,
            },
            ServiceCode::PublishFile => Self::PublishFile {
                file_info: required(kind, "fileInfo", args.file_info)?,
            },
            ServiceCode::PublishIncrementalFile => Self::PublishIncrementalFile {
                file_info: required(kind, "fileInfo", args.file_info)?,
            },
            ServiceCode::AppendBundlesRestoreSession => Self::AppendBundlesRestore {
                capabilities: fds.next().ok_or(PayloadError::DescriptorCount {
                    kind,
                    expected: 1,
                    actual: 0,
                })?,
                bundle_names: required(kind, "bundleNames", args.bundle_names)?,
                restore_type: args.restore_type.unwrap_or_default(),
                user_id: args.user_id,
            },
            ServiceCode::AppendBundlesBackupSession => Self::AppendBundlesBackup {
                bundle_names: required(kind, "bundleNames", args.bundle_names)?,
            },
            ServiceCode::AppendBundlesIncrementalBackupSession => {
                Self::AppendBundlesIncrementalBackup {
                    bundles: required(kind, "bundles", args.bundles)?,
                }
            }
            ServiceCode::Start => Self::Start,
            ServiceCode::Finish => Self::Finish,
            ServiceCode::ReleaseSession => Self::Release,
            ServiceCode::ResultReport => Self::ResultReport {
                result: required(kind, "result", args.result)?,
                scenario: required(kind, "scenario", args.scenario)?,
            },
            ServiceCode::GetBackupInfo => Self::GetBackupInfo {
                bundle_name: required(kind, "bundleName", args.bundle_name)?,
            },
            ServiceCode::AppFileReady
            | ServiceCode::AppDone
            | ServiceCode::AppIncrementalFileReady
            | ServiceCode::AppIncrementalDone => return Err(PayloadError::UnsupportedRequest(code)),
        };

        Ok((body.seq, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};

    #[test]
    fn append_restore_carries_capability_descriptor() {
        let mut caps = tempfile::tempfile().unwrap();
        caps.write_all(b"{\"bundleInfos\":[]}").unwrap();
        let request = Request::AppendBundlesRestore {
            capabilities: caps.into(),
            bundle_names: vec!["a".into(), "b".into()],
            restore_type: RestoreType::Ready,
            user_id: Some(100),
        };

        let frame = request.into_frame(9).unwrap();
        assert_eq!(frame.fds.len(), 1);

        let (seq, decoded) = Request::from_frame(frame).unwrap();
        assert_eq!(seq, 9);
        let Request::AppendBundlesRestore {
            capabilities,
            bundle_names,
            restore_type,
            user_id,
        } = decoded
        else {
            panic!("wrong variant");
        };
        assert_eq!(bundle_names, ["a", "b"]);
        assert_eq!(restore_type, RestoreType::Ready);
        assert_eq!(user_id, Some(100));

        let mut file = std::fs::File::from(capabilities);
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        assert_eq!(text, "{\"bundleInfos\":[]}");
    }

    #[test]
    fn missing_field_is_reported() {
        let kind = FrameKind::Request(ServiceCode::GetFileName);
        let frame = Frame::new(kind, br#"{"seq":1,"args":{"bundleName":"a"}}"#.to_vec());

        let err = Request::from_frame(frame).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::MissingField {
                field: "fileName",
                ..
            }
        ));
    }

    #[test]
    fn stray_descriptor_is_rejected() {
        let frame = Request::Start.into_frame(1).unwrap();
        let mut frame = frame;
        frame.fds.push(tempfile::tempfile().unwrap().into());

        let err = Request::from_frame(frame).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::DescriptorCount {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn agent_codes_are_not_client_requests() {
        let kind = FrameKind::Request(ServiceCode::AppDone);
        let frame = Frame::new(kind, br#"{"seq":4}"#.to_vec());
        assert!(matches!(
            Request::from_frame(frame),
            Err(PayloadError::UnsupportedRequest(ServiceCode::AppDone))
        ));
    }

    #[test]
    fn reply_frame_is_not_a_request() {
        let frame = Frame::new(FrameKind::Reply, b"{}".to_vec());
        assert!(matches!(
            Request::from_frame(frame),
            Err(PayloadError::UnexpectedFrame(FrameKind::Reply))
        ));
    }
}
