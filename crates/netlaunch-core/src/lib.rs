//! Netlaunch Core - Shared types and collaborator traits for the bundle loader.
//!
//! This crate provides:
//! - The launch error taxonomy ([`LaunchError`], [`ViolationKind`])
//! - Descriptor input types ([`LaunchDescriptor`], [`BundleDescriptor`])
//! - Manifest attributes and codebase matchers
//! - Security and trust levels
//! - Collaborator traits for fetching, prompting and descriptor loading
//! - Explicit caller context for privileged operations
//!
//! # Example
//!
//! ```
//! use netlaunch_core::{BundleDescriptor, LaunchDescriptor, SecurityLevel};
//! use url::Url;
//!
//! let codebase = Url::parse("https://apps.example.com/editor/").unwrap();
//! let descriptor = LaunchDescriptor::new(
//!     codebase.join("editor.jnlp").unwrap(),
//!     "editor",
//!     codebase.clone(),
//! )
//! .with_security(SecurityLevel::Full)
//! .with_bundle(BundleDescriptor::eager(codebase.join("editor.jar").unwrap()).as_main())
//! .with_bundle(BundleDescriptor::lazy(codebase.join("spell.jar").unwrap()).with_part("spell"));
//!
//! assert_eq!(descriptor.bundles.len(), 2);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod collaborator;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod types;

pub use collaborator::{
    DenyAllPrompt, DescriptorSource, FetchPolicy, ParentResolver, ResourceFetcher,
    SignerPromptReason, TrustPrompt, TrustRequest,
};
pub use context::{CallerContext, ContextGuard};
pub use descriptor::{BundleDescriptor, DownloadKind, ExtensionRef, LaunchDescriptor, PackageHint};
pub use error::{LaunchError, LaunchResult, ViolationKind, lock_poisoned};
pub use manifest::{CodebaseMatcher, ManifestAttributes, PermissionsAttribute};
pub use types::{CooperationKey, PartTag, SecurityLevel, TrustState, VersionConstraint};

pub use url::Url;
