//! Traits implemented by the surrounding launcher.
//!
//! The loader never parses descriptors, talks to the network or shows
//! dialogs itself; it calls through these seams instead.

use std::path::PathBuf;

use url::Url;

use crate::descriptor::LaunchDescriptor;
use crate::error::LaunchResult;
use crate::types::{CooperationKey, VersionConstraint};

/// How a fetch may use the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPolicy {
    /// The fetcher may cache and reuse the download.
    Cached,
    /// Fetch on demand without caching or prefetching.
    Uncached,
}

/// Materializes remote bundles as local files.
///
/// `fetch` must block until the file is local (or fail). Implementations may
/// satisfy it from a background prefetch.
pub trait ResourceFetcher: Send + Sync {
    /// Return a local path holding the bundle at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LaunchError::FetchFailure`] when the bundle cannot be
    /// materialized.
    fn fetch(
        &self,
        location: &Url,
        version: Option<&VersionConstraint>,
        policy: FetchPolicy,
    ) -> LaunchResult<PathBuf>;

    /// Hint that `location` will probably be needed soon.
    fn prefetch(&self, _location: &Url, _version: Option<&VersionConstraint>) {}
}

/// A confirmation the user has to give before a launch proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustRequest {
    /// Some bundles are signed and some are not, or signers disagree.
    PartiallySigned {
        /// Descriptor being launched.
        descriptor: Url,
        /// Whether the signed bundles agree on a signer.
        consistent: bool,
    },
    /// A signer is not among the trusted publishers, or a merge mixes trust states.
    UntrustedSigner {
        /// Descriptor being launched.
        descriptor: Url,
        /// Key id of the signer, when one exists.
        signer: Option<String>,
        /// Why the prompt is shown.
        reason: SignerPromptReason,
    },
    /// The `permissions` manifest attribute is absent.
    MissingPermissionsAttribute {
        /// Descriptor being launched.
        descriptor: Url,
    },
    /// Resources are loaded from outside the codebase and document base.
    NonCodebaseResources {
        /// Descriptor being launched.
        descriptor: Url,
        /// Offending resource locations.
        resources: Vec<Url>,
        /// Whether an allowable-codebase attribute covered them.
        covered: bool,
    },
}

/// Context for a [`TrustRequest::UntrustedSigner`] prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerPromptReason {
    /// The common signer is not a trusted publisher.
    UnknownPublisher,
    /// A signed loader is being merged with an unsigned one.
    MergeDowngrade,
}

impl TrustRequest {
    /// Short name of the request kind, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PartiallySigned { .. } => "partially-signed",
            Self::UntrustedSigner { .. } => "untrusted-signer",
            Self::MissingPermissionsAttribute { .. } => "missing-permissions-attribute",
            Self::NonCodebaseResources { .. } => "non-codebase-resources",
        }
    }
}

/// Asks the user to confirm a trust decision.
///
/// Returning `false` is a fatal abort for the check that asked.
pub trait TrustPrompt: Send + Sync {
    /// Present `request` and return the user's answer.
    fn confirm(&self, request: &TrustRequest) -> bool;
}

/// Prompt that declines everything. Suitable for headless launches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPrompt;

impl TrustPrompt for DenyAllPrompt {
    fn confirm(&self, request: &TrustRequest) -> bool {
        tracing::warn!(kind = request.kind(), "Trust prompt declined (headless)");
        false
    }
}

/// Resolves extension references into descriptors.
pub trait DescriptorSource: Send + Sync {
    /// Load the descriptor at `location` for the family `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LaunchError::Descriptor`] or a fetch failure.
    fn load(
        &self,
        location: &Url,
        version: Option<&VersionConstraint>,
        key: &CooperationKey,
    ) -> LaunchResult<LaunchDescriptor>;
}

/// The platform loader consulted before the bundle search path.
pub trait ParentResolver: Send + Sync {
    /// Return class bytes if the platform provides `name`.
    fn find_class(&self, name: &str) -> Option<Vec<u8>>;

    /// Return resource bytes if the platform provides `name`.
    fn find_resource(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}
