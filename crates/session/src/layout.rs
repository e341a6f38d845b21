//! Staging directory layout and name validation.
//!
//! Data exchanged with the broker is staged under three roots:
//!
//! - `<receive>/<bundle>/<file>` for full backups and restores,
//! - `<incremental>/<bundle>/<time>/incremental/<file>` with the companion
//!   `<incremental>/<bundle>/<time>/manifest/<file>.rp` for incremental ones,
//! - `<install>/<bundle>.hap` for install payloads, requested through
//!   [`INSTALL_SENTINEL`].

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::error::{OperationError, OperationResult};

/// File name the broker uses to request a bundle's install payload.
pub const INSTALL_SENTINEL: &str = "/data/storage/el2/restore/bundle.hap";

/// Name under which an asynchronous restore requests a bundle's index.
pub const MANAGE_JSON_REQUEST_PATH: &str = "data/storage/el2/backup/restore/manage.json";

/// Which file names a session kind accepts from the broker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NamePolicy {
    /// Only `[0-9A-Za-z_.]`, as full backups and restores produce.
    Alphanumeric,
    /// Anything without a path separator.
    NoSeparator,
}

/// Checks a file name announced by the broker.
///
/// [`INSTALL_SENTINEL`] is always accepted. Every other name must be
/// non-empty, must not be `.` or `..` and must satisfy `policy`; a `/` is
/// rejected under both policies.
pub fn validate_file_name(name: &str, policy: NamePolicy) -> OperationResult<()> {
    if name == INSTALL_SENTINEL {
        return Ok(());
    }
    if name.is_empty() || name == "." || name == ".." {
        return Err(OperationError::invalid(format!("file name {name:?} is not valid")));
    }
    let acceptable = match policy {
        NamePolicy::Alphanumeric => name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.'),
        NamePolicy::NoSeparator => !name.contains('/'),
    };
    if acceptable {
        Ok(())
    } else {
        Err(OperationError::invalid(format!("file name {name:?} is not valid")))
    }
}

/// Checks a bundle name before it becomes a path component.
pub fn validate_bundle_name(name: &str) -> OperationResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(OperationError::invalid(format!("bundle name {name:?} is not valid")));
    }
    Ok(())
}

/// Roots of the staging tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagingLayout {
    receive_root: PathBuf,
    incremental_root: PathBuf,
    install_root: PathBuf,
}

impl StagingLayout {
    /// Layout rooted at the three given directories.
    pub fn new(
        receive_root: impl Into<PathBuf>,
        incremental_root: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            receive_root: receive_root.into(),
            incremental_root: incremental_root.into(),
            install_root: install_root.into(),
        }
    }

    /// Root for full backup and restore data.
    #[must_use]
    pub fn receive_root(&self) -> &Path {
        &self.receive_root
    }

    /// Root for incremental data.
    #[must_use]
    pub fn incremental_root(&self) -> &Path {
        &self.incremental_root
    }

    /// Root holding install payloads.
    #[must_use]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// `<receive>/<bundle>`
    #[must_use]
    pub fn bundle_dir(&self, bundle: &str) -> PathBuf {
        self.receive_root.join(bundle)
    }

    /// `<receive>/<bundle>/<file>`, or the install payload for [`INSTALL_SENTINEL`].
    #[must_use]
    pub fn staged_file(&self, bundle: &str, file: &str) -> PathBuf {
        if file == INSTALL_SENTINEL {
            return self.install_payload(bundle);
        }
        self.bundle_dir(bundle).join(file)
    }

    /// `<incremental>/<bundle>`
    #[must_use]
    pub fn incremental_bundle_dir(&self, bundle: &str) -> PathBuf {
        self.incremental_root.join(bundle)
    }

    /// `<incremental>/<bundle>/<time>/incremental`
    #[must_use]
    pub fn incremental_data_dir(&self, bundle: &str, time: i64) -> PathBuf {
        self.incremental_bundle_dir(bundle).join(time.to_string()).join("incremental")
    }

    /// `<incremental>/<bundle>/<time>/manifest`
    #[must_use]
    pub fn incremental_manifest_dir(&self, bundle: &str, time: i64) -> PathBuf {
        self.incremental_bundle_dir(bundle).join(time.to_string()).join("manifest")
    }

    /// Data file of an incremental transfer, or the install payload for [`INSTALL_SENTINEL`].
    #[must_use]
    pub fn incremental_file(&self, bundle: &str, time: i64, file: &str) -> PathBuf {
        if file == INSTALL_SENTINEL {
            return self.install_payload(bundle);
        }
        self.incremental_data_dir(bundle, time).join(file)
    }

    /// `<incremental>/<bundle>/<time>/manifest/<file>.rp`
    ///
    /// The name is appended rather than joined, so [`INSTALL_SENTINEL`] nests
    /// under the manifest directory instead of replacing it.
    #[must_use]
    pub fn incremental_manifest(&self, bundle: &str, time: i64, file: &str) -> PathBuf {
        let mut path = self.incremental_manifest_dir(bundle, time).into_os_string();
        path.push("/");
        path.push(file);
        path.push(".rp");
        PathBuf::from(path)
    }

    /// `<incremental>/<bundle>/manifest.rp`, the bundle-level manifest.
    #[must_use]
    pub fn bundle_manifest(&self, bundle: &str) -> PathBuf {
        self.incremental_bundle_dir(bundle).join("manifest.rp")
    }

    /// `<install>/<bundle>.hap`
    #[must_use]
    pub fn install_payload(&self, bundle: &str) -> PathBuf {
        caps::install_payload_path(&self.install_root, bundle)
    }
}

/// Creates `dir` and missing parents with mode 0700.
pub(crate) fn create_private_dir(dir: &Path) -> OperationResult<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|err| OperationError::io("create", dir, err))
}

/// Opens `path` for writing, truncating or creating it with mode 0600.
pub(crate) fn create_private_file(path: &Path) -> OperationResult<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|err| OperationError::io("create", path, err))
}

/// Opens a staged file for reading.
pub(crate) fn open_staged(path: &Path) -> OperationResult<File> {
    File::open(path).map_err(|err| OperationError::io("open", path, err))
}

/// Names of the regular files directly inside `dir`, sorted.
pub(crate) fn regular_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StagingLayout {
        StagingLayout::new("/r", "/i", "/h")
    }

    #[test]
    fn separator_is_rejected_under_every_policy() {
        for policy in [NamePolicy::Alphanumeric, NamePolicy::NoSeparator] {
            assert!(validate_file_name("a/b", policy).is_err());
            assert!(validate_file_name("../etc", policy).is_err());
            assert!(validate_file_name("/abs", policy).is_err());
        }
    }

    #[test]
    fn install_sentinel_is_always_accepted() {
        for policy in [NamePolicy::Alphanumeric, NamePolicy::NoSeparator] {
            assert!(validate_file_name(INSTALL_SENTINEL, policy).is_ok());
        }
    }

    #[test]
    fn alphanumeric_policy_is_strict() {
        assert!(validate_file_name("part_1.tar", NamePolicy::Alphanumeric).is_ok());
        assert!(validate_file_name("part-1.tar", NamePolicy::Alphanumeric).is_err());
        assert!(validate_file_name("part-1 .tar", NamePolicy::NoSeparator).is_ok());
    }

    #[test]
    fn dot_names_and_empty_are_rejected() {
        for name in ["", ".", ".."] {
            assert!(validate_file_name(name, NamePolicy::NoSeparator).is_err());
            assert!(validate_bundle_name(name).is_err());
        }
        assert!(validate_bundle_name("com.example/notes").is_err());
        assert!(validate_bundle_name("com.example.notes").is_ok());
    }

    #[test]
    fn paths_follow_the_staging_convention() {
        let layout = layout();
        assert_eq!(layout.staged_file("b", "f"), Path::new("/r/b/f"));
        assert_eq!(layout.incremental_file("b", 1700, "f"), Path::new("/i/b/1700/incremental/f"));
        assert_eq!(layout.incremental_manifest("b", 1700, "f"), Path::new("/i/b/1700/manifest/f.rp"));
        assert_eq!(layout.bundle_manifest("b"), Path::new("/i/b/manifest.rp"));
    }

    #[test]
    fn sentinel_resolves_to_install_payload() {
        let layout = layout();
        assert_eq!(layout.staged_file("b", INSTALL_SENTINEL), Path::new("/h/b.hap"));
        assert_eq!(layout.incremental_file("b", 1, INSTALL_SENTINEL), Path::new("/h/b.hap"));
    }

    #[test]
    fn sentinel_manifest_stays_under_manifest_dir() {
        let layout = layout();
        let manifest = layout.incremental_manifest("b", 1, INSTALL_SENTINEL);
        assert!(manifest.starts_with(layout.incremental_manifest_dir("b", 1)), "{}", manifest.display());
        assert_eq!(manifest, Path::new("/i/b/1/manifest/data/storage/el2/restore/bundle.hap.rp"));
    }

    #[test]
    fn regular_files_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.tar"), b"b").unwrap();
        fs::write(dir.path().join("a.tar"), b"a").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(regular_files(dir.path()).unwrap(), ["a.tar", "b.tar"]);
    }
}
