//! Netlaunch Bundle - Signed bundle archives.
//!
//! This crate provides:
//! - Safe reading of gzip tar bundles with traversal and size guards
//! - The `META-INF/SIGNATURE.toml` signature block
//! - The `META-INF/INDEX.LIST` bundle index
//! - Per-bundle signature inspection and bundle-set trust classification
//! - A builder for producing (optionally signed) bundles
//!
//! # Example
//!
//! ```
//! use netlaunch_bundle::{ArchiveLimits, BundleArchive, BundleBuilder, SignatureVerifier};
//! use netlaunch_core::TrustState;
//! use netlaunch_crypto::PublisherKey;
//! use url::Url;
//!
//! let publisher = PublisherKey::generate();
//! let bytes = BundleBuilder::new()
//!     .class("com.example.App", b"bytes".to_vec())
//!     .sign_with(&publisher)
//!     .to_bytes()
//!     .unwrap();
//! let archive = BundleArchive::from_bytes(&bytes, ArchiveLimits::default()).unwrap();
//!
//! let mut verifier = SignatureVerifier::new();
//! verifier.add(Url::parse("https://apps.example.com/app.jar").unwrap(), &archive);
//! assert_eq!(verifier.report().state, TrustState::Full);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod archive;
pub mod builder;
pub mod error;
pub mod index;
pub mod signature_block;
pub mod verifier;

pub use archive::{ArchiveLimits, BundleArchive, META_DIR, NESTED_SUFFIXES, is_signable};
pub use builder::BundleBuilder;
pub use error::{BundleError, BundleResult};
pub use index::{BundleIndex, INDEX_PATH, IndexEntry};
pub use signature_block::{SIGNATURE_PATH, SignatureBlock, SignerEntry};
pub use verifier::{
    BundleSigning, PartialCause, SignatureVerifier, SigningDefect, VerificationReport, classify,
};
