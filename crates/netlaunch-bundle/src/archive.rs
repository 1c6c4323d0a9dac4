//! In-memory view of a bundle archive.
//!
//! Bundles are gzip-compressed tarballs. Reading one guards against:
//! - Path traversal (`../` components) and absolute paths
//! - Links, devices and other non-regular entries
//! - Excessive entry counts and decompressed sizes
//! - Ambiguous duplicate paths

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{BundleError, BundleResult};
use crate::index::{BundleIndex, INDEX_PATH};

/// Directory holding bundle metadata. Entries below it are never signed.
pub const META_DIR: &str = "META-INF/";

/// Suffixes of entries that are themselves bundles.
pub const NESTED_SUFFIXES: [&str; 2] = [".jar", ".bundle"];

/// Size and count limits applied while reading an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Maximum total decompressed size in bytes.
    pub max_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 500_000_000,
        }
    }
}

/// A fully read bundle.
#[derive(Debug, Clone)]
pub struct BundleArchive {
    path: PathBuf,
    entries: BTreeMap<String, Arc<[u8]>>,
}

impl BundleArchive {
    /// Read the bundle at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if the file cannot be read, or any archive
    /// validation error from [`BundleArchive::from_bytes`].
    pub fn open(path: impl AsRef<Path>, limits: ArchiveLimits) -> BundleResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| BundleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut archive = Self::from_bytes(&data, limits)?;
        archive.path = path.to_path_buf();
        Ok(archive)
    }

    /// Decode a bundle from gzip-compressed tar bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for undecodable data, unsafe entries, duplicate paths
    /// or exceeded limits.
    pub fn from_bytes(data: &[u8], limits: ArchiveLimits) -> BundleResult<Self> {
        let mut archive = Archive::new(GzDecoder::new(data));
        let mut entries = BTreeMap::new();
        let mut entry_count = 0usize;
        let mut total_size: u64 = 0;

        let iter = archive
            .entries()
            .map_err(|e| BundleError::archive(format!("failed to read archive entries: {e}")))?;

        for entry_result in iter {
            let mut entry = entry_result
                .map_err(|e| BundleError::archive(format!("failed to read archive entry: {e}")))?;

            entry_count = entry_count.saturating_add(1);
            if entry_count > limits.max_entries {
                return Err(BundleError::LimitExceeded {
                    message: format!("more than {} entries", limits.max_entries),
                });
            }

            let entry_type = entry.header().entry_type();
            let entry_path = entry
                .path()
                .map_err(|e| BundleError::archive(format!("failed to read entry path: {e}")))?
                .into_owned();

            if !is_safe_entry_type(entry_type) {
                return Err(BundleError::UnsafeEntryType {
                    entry_type: format!("{entry_type:?}"),
                    path: entry_path.display().to_string(),
                });
            }
            let name = normalize_entry_path(&entry_path)?;
            if !entry_type.is_file() {
                continue;
            }

            let size = entry
                .header()
                .size()
                .map_err(|e| BundleError::archive(format!("failed to read entry size: {e}")))?;
            total_size = total_size.saturating_add(size);
            if total_size > limits.max_bytes {
                return Err(BundleError::LimitExceeded {
                    message: format!("more than {} decompressed bytes", limits.max_bytes),
                });
            }

            let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
            entry
                .read_to_end(&mut data)
                .map_err(|e| BundleError::archive(format!("failed to read {name}: {e}")))?;

            if entries.insert(name.clone(), Arc::from(data)).is_some() {
                return Err(BundleError::DuplicateEntry { path: name });
            }
        }

        Ok(Self {
            path: PathBuf::new(),
            entries,
        })
    }

    /// Local path the bundle was read from (empty for in-memory bundles).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Contents of entry `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<[u8]>> {
        self.entries.get(name)
    }

    /// Whether entry `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of file entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle has no file entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries covered by signatures: every file outside `META-INF/`.
    pub fn signable_entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .filter(|(name, _)| is_signable(name))
            .map(|(name, data)| (name.as_str(), &data[..]))
    }

    /// Entries that are themselves bundles.
    pub fn nested_bundles(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .filter(|(name, _)| NESTED_SUFFIXES.iter().any(|s| name.ends_with(s)))
            .map(|(name, data)| (name.as_str(), &data[..]))
    }

    /// Entries whose names end in one of `suffixes`.
    pub fn entries_with_suffix<'a>(
        &'a self,
        suffixes: &'a [String],
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> {
        self.entries
            .iter()
            .filter(move |(name, _)| suffixes.iter().any(|s| name.ends_with(s.as_str())))
            .map(|(name, data)| (name.as_str(), &data[..]))
    }

    /// Parse `META-INF/INDEX.LIST`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InvalidIndex`] if the index is present but malformed.
    pub fn index(&self) -> BundleResult<Option<BundleIndex>> {
        self.get(INDEX_PATH)
            .map(|data| {
                let text = std::str::from_utf8(data).map_err(|e| BundleError::InvalidIndex {
                    message: format!("not UTF-8: {e}"),
                })?;
                BundleIndex::parse(text)
            })
            .transpose()
    }
}

/// Whether `name` is covered by bundle signatures.
#[must_use]
pub fn is_signable(name: &str) -> bool {
    !name.starts_with(META_DIR)
}

/// Regular files and directories only, plus the metadata headers tar emits
/// for long names.
fn is_safe_entry_type(entry_type: tar::EntryType) -> bool {
    matches!(
        entry_type,
        tar::EntryType::Regular
            | tar::EntryType::Directory
            | tar::EntryType::GNULongName
            | tar::EntryType::XHeader
            | tar::EntryType::XGlobalHeader
    )
}

/// Reject escaping paths and join the remaining components with `/`.
fn normalize_entry_path(path: &Path) -> BundleResult<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {},
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(BundleError::PathTraversal {
                    path: path.display().to_string(),
                });
            },
        }
    }
    if parts.is_empty() {
        return Err(BundleError::archive("entry with empty path"));
    }
    Ok(parts.join("/"))
}
