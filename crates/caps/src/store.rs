//! Load, merge and persist operations on the capability file.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use logging::trace_caps;
use protocol::BundleName;

use crate::bundle_info::{BundleInfo, CapabilityFile, VersionDefaults};
use crate::error::{CapsError, CapsResult};

const CAPABILITY_FILE: &str = "capability file";

/// Inputs to [`merge`] that come from the environment rather than the file.
#[derive(Clone, Debug)]
pub struct MergeContext {
    /// Directory holding `<bundle>.hap` install payloads.
    pub install_root: PathBuf,
    /// Version fields for bundles without usable prior data.
    pub defaults: VersionDefaults,
}

impl MergeContext {
    /// Creates a context.
    pub fn new(install_root: impl Into<PathBuf>, defaults: VersionDefaults) -> Self {
        Self {
            install_root: install_root.into(),
            defaults,
        }
    }
}

/// Path of the install payload for `bundle` under `install_root`.
pub fn install_payload_path(install_root: &Path, bundle: &str) -> PathBuf {
    install_root.join(format!("{bundle}.hap"))
}

/// Reads the capability document from an open descriptor.
///
/// An empty file is the empty document.
pub fn load(file: &File) -> CapsResult<CapabilityFile> {
    let text = fast_io::read_to_string(file).map_err(|err| CapsError::io("read", CAPABILITY_FILE, err))?;
    parse(&text)
}

/// Reads the capability document at `path`; a missing file is the empty document.
pub fn load_path(path: &Path) -> CapsResult<CapabilityFile> {
    match File::open(path) {
        Ok(file) => load(&file),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            trace_caps!(path = %path.display(), "no capability file, starting empty");
            Ok(CapabilityFile::default())
        }
        Err(err) => Err(CapsError::io("open", path.display().to_string(), err)),
    }
}

fn parse(text: &str) -> CapsResult<CapabilityFile> {
    if text.trim().is_empty() {
        return Ok(CapabilityFile::default());
    }
    let caps: CapabilityFile = serde_json::from_str(text).map_err(|source| CapsError::Json {
        what: CAPABILITY_FILE,
        source,
    })?;
    trace_caps!(entries = caps.bundle_infos.len(), "capability file loaded");
    Ok(caps)
}

/// Builds the entries for `requested`, in request order, from `existing`.
///
/// With `preserve_version_info == false` a matching existing entry contributes
/// its version fields and everything else is recomputed; without a match the
/// context defaults apply. With `preserve_version_info == true` a matching
/// entry is carried over unchanged. `need_to_install` is recomputed from the
/// install payload whenever the entry is not carried over. Duplicate requests
/// collapse onto their first occurrence.
pub fn merge(
    existing: &[BundleInfo],
    requested: &[BundleName],
    preserve_version_info: bool,
    context: &MergeContext,
) -> CapsResult<Vec<BundleInfo>> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(requested.len());

    for name in requested {
        if name.is_empty() || name.contains('/') {
            return Err(CapsError::InvalidBundleName(name.clone()));
        }
        if !seen.insert(name.as_str()) {
            continue;
        }

        let prior = existing.iter().find(|info| &info.name == name);
        let entry = match prior {
            Some(info) if preserve_version_info => info.clone(),
            Some(info) => BundleInfo {
                need_to_install: has_install_payload(context, name),
                ..BundleInfo::new(name.clone(), info.version_code, info.version_name.clone())
            },
            None => BundleInfo {
                need_to_install: has_install_payload(context, name),
                ..BundleInfo::new(
                    name.clone(),
                    context.defaults.version_code,
                    context.defaults.version_name,
                )
            },
        };
        merged.push(entry);
    }

    trace_caps!(requested = requested.len(), merged = merged.len(), preserve_version_info, "bundle list merged");
    Ok(merged)
}

fn has_install_payload(context: &MergeContext, bundle: &str) -> bool {
    install_payload_path(&context.install_root, bundle).is_file()
}

/// Overwrites the open capability file with `caps`.
///
/// The file is truncated and rewritten from offset zero, so persisting the
/// same document twice leaves identical bytes.
pub fn persist(file: &File, caps: &CapabilityFile) -> CapsResult<()> {
    let mut text = serde_json::to_string_pretty(caps).map_err(|source| CapsError::Json {
        what: CAPABILITY_FILE,
        source,
    })?;
    text.push('\n');

    let write = || -> io::Result<()> {
        let mut writer = file;
        file.set_len(0)?;
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(text.as_bytes())?;
        writer.flush()
    };
    write().map_err(|err| CapsError::io("write", CAPABILITY_FILE, err))?;

    trace_caps!(entries = caps.bundle_infos.len(), bytes = text.len(), "capability file persisted");
    Ok(())
}

/// Creates (mode 0600) or overwrites the capability file at `path`.
pub fn persist_path(path: &Path, caps: &CapabilityFile) -> CapsResult<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
        .map_err(|err| CapsError::io("open", path.display().to_string(), err))?;
    persist(&file, caps)
}
