//! Capability file and bundle index handling.
//!
//! The capability file is a JSON document describing, per bundle, whether an
//! install payload accompanies the data and which version the data came from.
//! Sessions read it, merge it against the bundles requested on the command
//! line and write it back before talking to the broker. The bundle index
//! (`manage.json`) lists the files a bundle's backup consists of.
//!
//! # Examples
//!
//! ```
//! use caps::{BundleInfo, CapabilityFile, MergeContext, VersionDefaults, merge};
//!
//! let existing = vec![BundleInfo::new("com.example.notes", 7, "2.1.0")];
//! let context = MergeContext::new("/nonexistent/install", VersionDefaults::DEFAULT);
//! let requested = vec!["com.example.notes".to_owned(), "com.example.mail".to_owned()];
//! let merged = merge(&existing, &requested, false, &context).unwrap();
//!
//! assert_eq!(merged[0].version_name, "2.1.0");
//! assert_eq!(merged[1].version_name, "0.0.0.0");
//! assert!(!merged[1].need_to_install);
//! # let _ = CapabilityFile::default();
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod bundle_info;
mod error;
mod index;
mod store;

pub use bundle_info::{BundleInfo, CapabilityFile, VersionDefaults};
pub use error::{CapsError, CapsResult};
pub use index::{BundleIndex, MANAGE_JSON};
pub use store::{MergeContext, install_payload_path, load, load_path, merge, persist, persist_path};
