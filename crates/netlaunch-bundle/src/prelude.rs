//! Prelude module - commonly used types for convenient import.
//!
//! Use `use netlaunch_bundle::prelude::*;` to import all essential types.

// Errors
pub use crate::{BundleError, BundleResult};

// Archives
pub use crate::{ArchiveLimits, BundleArchive, BundleBuilder, BundleIndex};

// Verification
pub use crate::{BundleSigning, PartialCause, SignatureVerifier, VerificationReport};
