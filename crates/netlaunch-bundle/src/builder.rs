//! Building and signing bundle archives.
//!
//! Used by publishing tools and by tests to produce real signed bundles.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use netlaunch_crypto::{Digest, PublisherKey};

use crate::archive::is_signable;
use crate::error::{BundleError, BundleResult};
use crate::index::{BundleIndex, INDEX_PATH, IndexEntry};
use crate::signature_block::{SIGNATURE_PATH, SignatureBlock};

/// Assembles a bundle, optionally signing it.
///
/// # Example
///
/// ```
/// use netlaunch_bundle::{ArchiveLimits, BundleArchive, BundleBuilder, BundleSigning, SignatureVerifier};
/// use netlaunch_crypto::PublisherKey;
///
/// let publisher = PublisherKey::generate();
/// let bytes = BundleBuilder::new()
///     .entry("com/example/App.class", b"bytes".to_vec())
///     .sign_with(&publisher)
///     .to_bytes()
///     .unwrap();
///
/// let archive = BundleArchive::from_bytes(&bytes, ArchiveLimits::default()).unwrap();
/// assert!(matches!(SignatureVerifier::inspect(&archive), BundleSigning::Signed { .. }));
/// ```
#[derive(Default)]
pub struct BundleBuilder<'k> {
    entries: BTreeMap<String, Vec<u8>>,
    index: Vec<IndexEntry>,
    signers: Vec<&'k PublisherKey>,
    unsigned_extras: BTreeMap<String, Vec<u8>>,
}

impl<'k> BundleBuilder<'k> {
    /// An empty, unsigned bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file entry.
    #[must_use]
    pub fn entry(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.entries.insert(path.into(), data);
        self
    }

    /// Add a class entry under its slash-separated path.
    #[must_use]
    pub fn class(self, name: &str, data: Vec<u8>) -> Self {
        let path = format!("{}.class", name.replace('.', "/"));
        self.entry(path, data)
    }

    /// Declare that `bundle` holds the given package prefixes.
    #[must_use]
    pub fn index_entry(mut self, bundle: impl Into<String>, prefixes: &[&str]) -> Self {
        self.index.push(IndexEntry {
            bundle: bundle.into(),
            prefixes: prefixes.iter().map(|p| (*p).to_string()).collect(),
        });
        self
    }

    /// Sign with `key`. May be called more than once for co-signed bundles.
    #[must_use]
    pub fn sign_with(mut self, key: &'k PublisherKey) -> Self {
        self.signers.push(key);
        self
    }

    /// Add an entry that is written after signing and therefore not covered
    /// by the signature block.
    #[must_use]
    pub fn unsigned_entry(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.unsigned_extras.insert(path.into(), data);
        self
    }

    /// Encode the bundle as gzip-compressed tar bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or signing fails.
    pub fn to_bytes(&self) -> BundleResult<Vec<u8>> {
        let mut files: BTreeMap<String, Vec<u8>> = self.entries.clone();

        if !self.index.is_empty() {
            let index = BundleIndex::new(self.index.clone());
            files.insert(INDEX_PATH.to_string(), index.render().into_bytes());
        }

        if !self.signers.is_empty() {
            let digests = files
                .iter()
                .filter(|(path, _)| is_signable(path))
                .map(|(path, data)| (path.clone(), Digest::of_entry(data)))
                .collect();
            let mut block = SignatureBlock::new(digests);
            for key in &self.signers {
                block.sign(key);
            }
            files.insert(SIGNATURE_PATH.to_string(), block.render()?.into_bytes());
        }

        for (path, data) in &self.unsigned_extras {
            files.insert(path.clone(), data.clone());
        }

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in &files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            builder
                .append_data(&mut header, path, data.as_slice())
                .map_err(|e| BundleError::archive(format!("failed to append {path}: {e}")))?;
        }
        let encoder = builder
            .into_inner()
            .map_err(|e| BundleError::archive(format!("failed to finish tar: {e}")))?;
        encoder
            .finish()
            .map_err(|e| BundleError::archive(format!("failed to finish gzip: {e}")))
    }

    /// Write the bundle to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> BundleResult<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let io_err = |source| BundleError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut file = std::fs::File::create(path).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)
    }
}
