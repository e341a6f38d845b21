use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::Path;

use serde::Deserialize;

use logging::trace_caps;

use crate::error::{CapsError, CapsResult};

/// File name of a bundle's index inside its backup.
pub const MANAGE_JSON: &str = "manage.json";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    file_name: String,
}

/// Set of file names listed by a bundle index.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BundleIndex {
    files: BTreeSet<String>,
}

impl BundleIndex {
    /// Parses a JSON array of `{"fileName": ...}` objects.
    ///
    /// Empty input is an empty index. Entries carry other fields the tool
    /// ignores.
    pub fn from_json(text: &str) -> CapsResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let entries: Vec<IndexEntry> = serde_json::from_str(text).map_err(|source| CapsError::Json {
            what: "bundle index",
            source,
        })?;
        let files: BTreeSet<String> = entries.into_iter().map(|entry| entry.file_name).collect();
        trace_caps!(files = files.len(), "bundle index parsed");
        Ok(Self { files })
    }

    /// Reads the index from an open descriptor.
    pub fn load(file: &File) -> CapsResult<Self> {
        let text = fast_io::read_to_string(file).map_err(|err| CapsError::io("read", MANAGE_JSON, err))?;
        Self::from_json(&text)
    }

    /// Reads the index at `path`; a missing file is an empty index.
    pub fn load_path(path: &Path) -> CapsResult<Self> {
        match File::open(path) {
            Ok(file) => Self::load(&file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(CapsError::io("open", path.display().to_string(), err)),
        }
    }

    /// Listed file names in sorted order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Whether `file_name` is listed.
    #[must_use]
    pub fn contains(&self, file_name: &str) -> bool {
        self.files.contains(file_name)
    }

    /// Number of distinct listed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
