//! Netlaunch Crypto - Publisher keys and bundle signatures.
//!
//! This crate provides:
//! - Ed25519 publisher keys with zeroize-on-drop secrets
//! - Publisher identities used as signer identity in trust decisions
//! - Domain-separated BLAKE3 digests for bundle entries
//! - A trusted-publisher store
//!
//! # Example
//!
//! ```
//! use netlaunch_crypto::{Digest, PublisherKey, TrustStore};
//!
//! let publisher = PublisherKey::generate();
//! let digest = Digest::of_entry(b"class bytes");
//! let signature = publisher.sign(digest.as_bytes());
//! assert!(publisher.id().verify(digest.as_bytes(), &signature).is_ok());
//!
//! let mut trusted = TrustStore::new();
//! trusted.trust(publisher.id());
//! assert!(trusted.is_trusted(&publisher.id()));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod digest;
mod error;
mod publisher;
mod signature;
mod trust_store;

pub use digest::{Digest, ENTRY_DOMAIN, MANIFEST_DOMAIN};
pub use error::{CryptoError, CryptoResult};
pub use publisher::{PublisherId, PublisherKey};
pub use signature::Signature;
pub use trust_store::TrustStore;
