//! Publishers the user has already chosen to trust.
//!
//! A trusted publisher skips the untrusted-signer prompt. The on-disk form
//! is one hex or base64 public key per line; `#` starts a comment.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::error::{CryptoError, CryptoResult};
use crate::publisher::PublisherId;

/// Set of trusted publisher identities.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    publishers: BTreeSet<PublisherId>,
}

impl TrustStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the line-oriented trust file format.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidTrustEntry`] for the first bad line.
    pub fn parse(content: &str) -> CryptoResult<Self> {
        let mut store = Self::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let id = PublisherId::from_hex(line)
                .or_else(|_| PublisherId::from_base64(line))
                .map_err(|e| CryptoError::InvalidTrustEntry {
                    line: index.saturating_add(1),
                    reason: e.to_string(),
                })?;
            store.trust(id);
        }
        Ok(store)
    }

    /// Load a trust file. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] for unreadable files and
    /// [`CryptoError::InvalidTrustEntry`] for malformed lines.
    pub fn load(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "trust store not found, starting empty");
                return Ok(Self::new());
            },
            Err(e) => return Err(CryptoError::IoError(e.to_string())),
        };
        let store = Self::parse(&content)?;
        debug!(path = %path.display(), count = store.len(), "loaded trust store");
        Ok(store)
    }

    /// Add a publisher. Returns `false` if it was already trusted.
    pub fn trust(&mut self, id: PublisherId) -> bool {
        self.publishers.insert(id)
    }

    /// Whether `id` is trusted.
    #[must_use]
    pub fn is_trusted(&self, id: &PublisherId) -> bool {
        self.publishers.contains(id)
    }

    /// Whether any of `ids` is trusted.
    pub fn trusts_any<'a>(&self, ids: impl IntoIterator<Item = &'a PublisherId>) -> bool {
        ids.into_iter().any(|id| self.is_trusted(id))
    }

    /// Trusted publishers in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PublisherId> {
        self.publishers.iter()
    }

    /// Number of trusted publishers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublisherKey;

    #[test]
    fn test_parse_mixed_encodings_and_comments() {
        let a = PublisherKey::generate().id();
        let b = PublisherKey::generate().id();
        let content = format!(
            "# trusted publishers\n{}\n\n{}  # build server\n",
            a.to_hex(),
            b.to_base64()
        );
        let store = TrustStore::parse(&content).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.is_trusted(&a));
        assert!(store.is_trusted(&b));
    }

    #[test]
    fn test_parse_reports_line() {
        let err = TrustStore::parse("# header\nnot-a-key\n").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidTrustEntry { line: 2, .. }));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(dir.path().join("absent")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted");
        let id = PublisherKey::generate().id();
        std::fs::write(&path, id.to_hex()).unwrap();
        let store = TrustStore::load(&path).unwrap();
        assert!(store.trusts_any([&id]));
    }

    #[test]
    fn test_trust_is_idempotent() {
        let mut store = TrustStore::new();
        let id = PublisherKey::generate().id();
        assert!(store.trust(id));
        assert!(!store.trust(id));
        assert_eq!(store.len(), 1);
    }
}
