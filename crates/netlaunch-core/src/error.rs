//! Launch error taxonomy shared by every netlaunch crate.

use std::fmt;

use thiserror::Error;

/// The check that rejected a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Declared level requests elevation but the bundles are not fully trusted.
    ElevationWithoutTrust,
    /// The user declined a partially-signed bundle set.
    PartialSigningDeclined,
    /// The user declined an untrusted or downgraded signer.
    UntrustedSignerDeclined,
    /// The `trusted_only` attribute is asserted but not satisfied.
    TrustedOnlyMismatch,
    /// The `permissions` attribute contradicts the declared level.
    PermissionsAttributeMismatch,
    /// The `permissions` attribute is missing and policy rejects that.
    MissingPermissionsAttribute,
    /// The `codebase` attribute does not match the codebase origin.
    CodebaseAttributeMismatch,
    /// A resource lies outside the codebase and the allowable-codebase matcher.
    AllowableCodebaseMismatch,
    /// The user declined resources loaded from outside the codebase.
    NonCodebaseResourcesDeclined,
    /// The main class is not one of the declared entry points.
    EntryPointMismatch,
    /// A cross-loader operation was requested by a caller lacking full trust.
    UntrustedCaller,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ElevationWithoutTrust => "elevation-without-trust",
            Self::PartialSigningDeclined => "partial-signing-declined",
            Self::UntrustedSignerDeclined => "untrusted-signer-declined",
            Self::TrustedOnlyMismatch => "trusted-only-mismatch",
            Self::PermissionsAttributeMismatch => "permissions-attribute-mismatch",
            Self::MissingPermissionsAttribute => "missing-permissions-attribute",
            Self::CodebaseAttributeMismatch => "codebase-attribute-mismatch",
            Self::AllowableCodebaseMismatch => "allowable-codebase-mismatch",
            Self::NonCodebaseResourcesDeclined => "non-codebase-resources-declined",
            Self::EntryPointMismatch => "entry-point-mismatch",
            Self::UntrustedCaller => "untrusted-caller",
        };
        f.write_str(name)
    }
}

/// Errors produced while constructing loaders or resolving classes.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A security check rejected the launch.
    #[error("security violation ({kind}): {message}")]
    SecurityViolation {
        /// Which check failed.
        kind: ViolationKind,
        /// Human-readable detail.
        message: String,
    },

    /// A bundle could not be materialized locally.
    #[error("failed to fetch {location}: {message}")]
    FetchFailure {
        /// Remote location of the bundle.
        location: String,
        /// Cause reported by the fetcher or reader.
        message: String,
    },

    /// The resolution chain was exhausted.
    #[error("class not found: {name}")]
    ClassNotFound {
        /// The requested class name.
        name: String,
    },

    /// Native extraction or nested bundle expansion failed.
    #[error("staging failed: {message}")]
    StagingFailure {
        /// Failure detail.
        message: String,
    },

    /// Extension descriptors reference each other.
    #[error("extension cycle detected: {}", chain.join(" -> "))]
    ExtensionCycle {
        /// Descriptor locations forming the cycle, in discovery order.
        chain: Vec<String>,
    },

    /// An extension descriptor could not be obtained.
    #[error("descriptor error for {location}: {message}")]
    Descriptor {
        /// Descriptor location.
        location: String,
        /// Failure detail.
        message: String,
    },

    /// Internal invariant failure (poisoned lock and similar).
    #[error("internal error: {0}")]
    Internal(String),
}

impl LaunchError {
    /// Build a [`LaunchError::SecurityViolation`].
    #[must_use]
    pub fn violation(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self::SecurityViolation {
            kind,
            message: message.into(),
        }
    }

    /// Build a [`LaunchError::FetchFailure`].
    #[must_use]
    pub fn fetch(location: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::FetchFailure {
            location: location.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error terminates a launch when raised during construction.
    ///
    /// Staging failures and missing classes never do.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ClassNotFound { .. } | Self::StagingFailure { .. }
        )
    }

    /// The violation kind, if this is a security violation.
    #[must_use]
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            Self::SecurityViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for launch operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Map a poisoned lock into [`LaunchError::Internal`].
pub fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> LaunchError {
    LaunchError::Internal("lock poisoned".to_string())
}
