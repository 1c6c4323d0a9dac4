//! The `META-INF/SIGNATURE.toml` block.
//!
//! ```toml
//! version = 1
//!
//! [entries]
//! "com/example/App.class" = "<hex blake3>"
//!
//! [[signers]]
//! public_key = "<base64 ed25519 key>"
//! signature = "<base64 signature over the digest manifest>"
//! ```
//!
//! Every signer signs the same canonical manifest: the sorted
//! `path\0digest\n` lines derived under [`MANIFEST_DOMAIN`].

use std::collections::BTreeMap;

use netlaunch_crypto::{Digest, MANIFEST_DOMAIN, PublisherId, PublisherKey, Signature};
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, BundleResult};

/// Path of the signature block inside a bundle.
pub const SIGNATURE_PATH: &str = "META-INF/SIGNATURE.toml";

/// Current block format version.
pub const BLOCK_VERSION: u32 = 1;

/// One signer's entry in the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntry {
    /// The signer's public key.
    pub public_key: PublisherId,
    /// Signature over the canonical manifest.
    pub signature: Signature,
}

/// Parsed signature block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Format version.
    pub version: u32,
    /// Digest of every signed entry.
    pub entries: BTreeMap<String, Digest>,
    /// Signers, in the order they signed.
    #[serde(default)]
    pub signers: Vec<SignerEntry>,
}

impl SignatureBlock {
    /// An unsigned block over `entries`.
    #[must_use]
    pub fn new(entries: BTreeMap<String, Digest>) -> Self {
        Self {
            version: BLOCK_VERSION,
            entries,
            signers: Vec::new(),
        }
    }

    /// Parse the TOML block.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::SignatureBlock`] for non-UTF-8 data, invalid TOML
    /// or an unsupported version.
    pub fn parse(data: &[u8]) -> BundleResult<Self> {
        let text = std::str::from_utf8(data).map_err(|e| BundleError::SignatureBlock {
            message: format!("not UTF-8: {e}"),
        })?;
        let block: Self = toml::from_str(text).map_err(|e| BundleError::SignatureBlock {
            message: e.to_string(),
        })?;
        if block.version != BLOCK_VERSION {
            return Err(BundleError::SignatureBlock {
                message: format!("unsupported block version {}", block.version),
            });
        }
        Ok(block)
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::SignatureBlock`] if serialization fails.
    pub fn render(&self) -> BundleResult<String> {
        toml::to_string(self).map_err(|e| BundleError::SignatureBlock {
            message: e.to_string(),
        })
    }

    /// The bytes every signer signs.
    #[must_use]
    pub fn manifest_digest(&self) -> Digest {
        let mut manifest = Vec::new();
        for (path, digest) in &self.entries {
            manifest.extend_from_slice(path.as_bytes());
            manifest.push(0);
            manifest.extend_from_slice(digest.to_hex().as_bytes());
            manifest.push(b'\n');
        }
        Digest::with_domain(MANIFEST_DOMAIN, &manifest)
    }

    /// Append a signature by `key`.
    pub fn sign(&mut self, key: &PublisherKey) {
        let signature = key.sign(self.manifest_digest().as_bytes());
        self.signers.push(SignerEntry {
            public_key: key.id(),
            signature,
        });
    }
}
