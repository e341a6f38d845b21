//! Broker to client notifications.

use std::os::fd::OwnedFd;

use serde::{Deserialize, Serialize};

use crate::envelope::{FrameKind, ReverseCode};
use crate::error::{PayloadError, PayloadResult};
use crate::frame::Frame;
use crate::types::{BundleName, ERR_OK, ErrCode, FileInfo, Scenario};

/// An event delivered to a session.
///
/// Everything except [`Notification::ServiceDied`] arrives from the broker;
/// `ServiceDied` is raised locally by the connection when the broker goes away.
#[derive(Debug)]
pub enum Notification {
    /// A file can be transferred.
    ///
    /// For restores `data` is the broker-side destination; for backups it is
    /// the source to copy from. `manifest` accompanies incremental files.
    FileReady {
        /// File the descriptors belong to.
        file_info: FileInfo,
        /// Data descriptor.
        data: Option<OwnedFd>,
        /// Manifest descriptor for incremental transfers.
        manifest: Option<OwnedFd>,
        /// Broker status for this file.
        err_code: ErrCode,
    },
    /// A bundle started; a nonzero code means it failed before any exchange.
    BundleStarted {
        /// Broker status.
        err_code: ErrCode,
        /// Bundle concerned.
        bundle_name: BundleName,
    },
    /// A bundle finished, successfully or not.
    BundleFinished {
        /// Broker status.
        err_code: ErrCode,
        /// Bundle concerned.
        bundle_name: BundleName,
    },
    /// Every bundle of the session finished.
    AllBundlesFinished {
        /// Broker status; nonzero aborts the session.
        err_code: ErrCode,
    },
    /// Free-form result for one bundle.
    ResultReport {
        /// Bundle concerned.
        bundle_name: BundleName,
        /// Result text.
        result: String,
    },
    /// Progress information for one bundle.
    ProcessInfo {
        /// Bundle concerned.
        bundle_name: BundleName,
        /// Progress text.
        info: String,
    },
    /// The broker process is gone.
    ServiceDied,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NotificationBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    file_info: Option<FileInfo>,
    err_code: ErrCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle_name: Option<BundleName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<String>,
    has_data: bool,
    has_manifest: bool,
}

impl Notification {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FileReady { .. } => "file-ready",
            Self::BundleStarted { .. } => "bundle-started",
            Self::BundleFinished { .. } => "bundle-finished",
            Self::AllBundlesFinished { .. } => "all-bundles-finished",
            Self::ResultReport { .. } => "result-report",
            Self::ProcessInfo { .. } => "process-info",
            Self::ServiceDied => "service-died",
        }
    }

    /// Bundle the notification concerns, if any.
    #[must_use]
    pub fn bundle_name(&self) -> Option<&str> {
        match self {
            Self::FileReady { file_info, .. } => Some(&file_info.owner),
            Self::BundleStarted { bundle_name, .. }
            | Self::BundleFinished { bundle_name, .. }
            | Self::ResultReport { bundle_name, .. }
            | Self::ProcessInfo { bundle_name, .. } => Some(bundle_name),
            Self::AllBundlesFinished { .. } | Self::ServiceDied => None,
        }
    }

    /// Encodes the notification using the reverse codes for `scenario`.
    pub fn into_frame(self, scenario: Scenario) -> PayloadResult<Frame> {
        let backup = scenario == Scenario::Backup;
        let pick = |backup_code, restore_code| if backup { backup_code } else { restore_code };
        let mut body = NotificationBody::default();
        let mut fds = Vec::new();

        let code = match self {
            Self::FileReady {
                file_info,
                data,
                manifest,
                err_code,
            } => {
                body.file_info = Some(file_info);
                body.err_code = err_code;
                body.has_data = data.is_some();
                body.has_manifest = manifest.is_some();
                fds.extend(data);
                fds.extend(manifest);
                pick(ReverseCode::BackupOnFileReady, ReverseCode::RestoreOnFileReady)
            }
            Self::BundleStarted {
                err_code,
                bundle_name,
            } => {
                body.err_code = err_code;
                body.bundle_name = Some(bundle_name);
                pick(ReverseCode::BackupOnSubTaskStarted, ReverseCode::RestoreOnSubTaskStarted)
            }
            Self::BundleFinished {
                err_code,
                bundle_name,
            } => {
                body.err_code = err_code;
                body.bundle_name = Some(bundle_name);
                pick(ReverseCode::BackupOnSubTaskFinished, ReverseCode::RestoreOnSubTaskFinished)
            }
            Self::AllBundlesFinished { err_code } => {
                body.err_code = err_code;
                pick(ReverseCode::BackupOnTaskFinished, ReverseCode::RestoreOnTaskFinished)
            }
            Self::ResultReport {
                bundle_name,
                result,
            } => {
                body.bundle_name = Some(bundle_name);
                body.result = Some(result);
                ReverseCode::OnResultReport
            }
            Self::ProcessInfo { bundle_name, info } => {
                body.bundle_name = Some(bundle_name);
                body.info = Some(info);
                ReverseCode::OnProcessInfo
            }
            Self::ServiceDied => return Err(PayloadError::LocalOnly),
        };

        let kind = FrameKind::Notification(code);
        let payload = serde_json::to_vec(&body).map_err(|err| PayloadError::json(kind, err))?;
        let mut frame = Frame::new(kind, payload);
        frame.header()?;
        frame.fds = fds;
        Ok(frame)
    }

    /// Decodes a notification frame.
    pub fn from_frame(mut frame: Frame) -> PayloadResult<Self> {
        let kind = frame.kind;
        let FrameKind::Notification(code) = kind else {
            return Err(PayloadError::UnexpectedFrame(kind));
        };
        let body: NotificationBody =
            serde_json::from_slice(&frame.payload).map_err(|err| PayloadError::json(kind, err))?;
        let bundle = |value: Option<BundleName>| {
            value.ok_or(PayloadError::MissingField {
                kind,
                field: "bundleName",
            })
        };

        let notification = match code {
            ReverseCode::BackupOnFileReady | ReverseCode::RestoreOnFileReady => {
                let expected = usize::from(body.has_data) + usize::from(body.has_manifest);
                let mut fds = frame.take_fds(expected)?.into_iter();
                let data = if body.has_data { fds.next() } else { None };
                let manifest = if body.has_manifest { fds.next() } else { None };
                Self::FileReady {
                    file_info: body.file_info.ok_or(PayloadError::MissingField {
                        kind,
                        field: "fileInfo",
                    })?,
                    data,
                    manifest,
                    err_code: body.err_code,
                }
            }
            ReverseCode::BackupOnSubTaskStarted | ReverseCode::RestoreOnSubTaskStarted => {
                frame.take_fds(0)?;
                Self::BundleStarted {
                    err_code: body.err_code,
                    bundle_name: bundle(body.bundle_name)?,
                }
            }
            ReverseCode::BackupOnSubTaskFinished | ReverseCode::RestoreOnSubTaskFinished => {
                frame.take_fds(0)?;
                Self::BundleFinished {
                    err_code: body.err_code,
                    bundle_name: bundle(body.bundle_name)?,
                }
            }
            ReverseCode::BackupOnTaskFinished | ReverseCode::RestoreOnTaskFinished => {
                frame.take_fds(0)?;
                Self::AllBundlesFinished {
                    err_code: body.err_code,
                }
            }
            ReverseCode::OnResultReport => {
                frame.take_fds(0)?;
                Self::ResultReport {
                    bundle_name: bundle(body.bundle_name)?,
                    result: body.result.unwrap_or_default(),
                }
            }
            ReverseCode::OnProcessInfo => {
                frame.take_fds(0)?;
                Self::ProcessInfo {
                    bundle_name: bundle(body.bundle_name)?,
                    info: body.info.unwrap_or_default(),
                }
            }
        };

        Ok(notification)
    }

    /// Reports whether the notification carries a failure code.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        match self {
            Self::FileReady { err_code, .. }
            | Self::BundleStarted { err_code, .. }
            | Self::BundleFinished { err_code, .. }
            | Self::AllBundlesFinished { err_code } => *err_code != ERR_OK,
            Self::ResultReport { .. } | Self::ProcessInfo { .. } => false,
            Self::ServiceDied => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_file_ready_keeps_descriptor_order() {
        use std::io::{Read, Seek, SeekFrom, Write};

        let mut data = tempfile::tempfile().unwrap();
        data.write_all(b"data").unwrap();
        let mut manifest = tempfile::tempfile().unwrap();
        manifest.write_all(b"manifest").unwrap();

        let notification = Notification::FileReady {
            file_info: FileInfo::new("a", "x.tar", 2),
            data: Some(data.into()),
            manifest: Some(manifest.into()),
            err_code: 0,
        };
        let frame = notification.into_frame(Scenario::Restore).unwrap();
        assert_eq!(frame.kind, FrameKind::Notification(ReverseCode::RestoreOnFileReady));

        let Notification::FileReady {
            data, manifest, ..
        } = Notification::from_frame(frame).unwrap()
        else {
            panic!("wrong variant");
        };
        let read_back = |fd: Option<OwnedFd>| {
            let mut file = std::fs::File::from(fd.unwrap());
            file.seek(SeekFrom::Start(0)).unwrap();
            let mut out = String::new();
            file.read_to_string(&mut out).unwrap();
            out
        };
        assert_eq!(read_back(data), "data");
        assert_eq!(read_back(manifest), "manifest");
    }

    #[test]
    fn backup_and_restore_codes_fold_together() {
        for scenario in [Scenario::Backup, Scenario::Restore] {
            let frame = Notification::BundleFinished {
                err_code: -1,
                bundle_name: "a".into(),
            }
            .into_frame(scenario)
            .unwrap();
            let decoded = Notification::from_frame(frame).unwrap();
            assert!(matches!(
                decoded,
                Notification::BundleFinished { err_code: -1, ref bundle_name } if bundle_name == "a"
            ));
            assert!(decoded.is_error());
        }
    }

    #[test]
    fn service_died_has_no_wire_form() {
        assert!(matches!(
            Notification::ServiceDied.into_frame(Scenario::Backup),
            Err(PayloadError::LocalOnly)
        ));
    }

    #[test]
    fn sub_task_without_bundle_is_rejected() {
        let kind = FrameKind::Notification(ReverseCode::RestoreOnSubTaskStarted);
        let frame = Frame::new(kind, br#"{"errCode":0}"#.to_vec());
        assert!(matches!(
            Notification::from_frame(frame),
            Err(PayloadError::MissingField {
                field: "bundleName",
                ..
            })
        ));
    }
}
