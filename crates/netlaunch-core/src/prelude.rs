//! Prelude module - commonly used types for convenient import.
//!
//! Use `use netlaunch_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{LaunchError, LaunchResult, ViolationKind};

// Descriptors
pub use crate::{BundleDescriptor, ExtensionRef, LaunchDescriptor, ManifestAttributes};

// Levels
pub use crate::{CooperationKey, SecurityLevel, TrustState};

// Collaborators
pub use crate::{
    CallerContext, DescriptorSource, FetchPolicy, ParentResolver, ResourceFetcher, TrustPrompt,
    TrustRequest,
};
