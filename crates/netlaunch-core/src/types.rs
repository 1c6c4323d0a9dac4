//! Identifier and level types used throughout netlaunch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity shared by a main descriptor and its extensions.
///
/// Every descriptor in a cooperating family maps to the same key, and the
/// registry keeps one loader per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CooperationKey(String);

impl CooperationKey {
    /// Create a key from any string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CooperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CooperationKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Name of a group of bundles activated together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartTag(String);

impl PartTag {
    /// Create a part tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The raw tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque version constraint handed through to the fetcher.
///
/// Matching versions is the fetch layer's job; the loader only forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionConstraint(String);

impl VersionConstraint {
    /// Wrap a version string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The raw constraint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested security level, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityLevel {
    /// Minimal baseline scoped to the codebase origin.
    #[default]
    Sandbox,
    /// Restricted-elevated set (clipboard, files, any host).
    Restricted,
    /// Unrestricted.
    Full,
}

impl SecurityLevel {
    /// Whether this level grants more than the sandbox.
    #[must_use]
    pub fn is_elevated(self) -> bool {
        self > Self::Sandbox
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandbox => write!(f, "sandbox"),
            Self::Restricted => write!(f, "restricted"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Signature consistency across a bundle set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustState {
    /// No bundle is signed.
    None,
    /// Some bundles are signed, or signers disagree, or a signature is broken.
    Partial,
    /// Every bundle is signed by one consistent identity.
    Full,
}

impl TrustState {
    /// Whether at least one bundle carried a usable signature.
    #[must_use]
    pub fn is_signed(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Partial => write!(f, "partial"),
            Self::Full => write!(f, "full"),
        }
    }
}
