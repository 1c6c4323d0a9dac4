//! Prelude module - commonly used types for convenient import.
//!
//! Use `use netlaunch_crypto::prelude::*;` to import all essential types.

pub use crate::{CryptoError, CryptoResult};

pub use crate::{Digest, PublisherId, PublisherKey, Signature, TrustStore};
