//! The frozen outcome of permission resolution.

use std::collections::BTreeSet;

use netlaunch_bundle::BundleSigning;
use netlaunch_core::{SecurityLevel, TrustState};
use netlaunch_crypto::PublisherId;
use url::Url;

use crate::baseline;
use crate::permission::Permission;
use crate::set::{EffectivePermissions, PermissionSet};

/// Security context of one loader.
///
/// Everything but the runtime grants is fixed at construction.
#[derive(Debug)]
pub struct SecurityDescriptor {
    declared: Option<SecurityLevel>,
    level: SecurityLevel,
    origin: Url,
    trust: TrustState,
    signers: BTreeSet<PublisherId>,
    permissions: PermissionSet,
}

impl SecurityDescriptor {
    /// Freeze a resolved security context.
    #[must_use]
    pub fn new(
        declared: Option<SecurityLevel>,
        level: SecurityLevel,
        origin: Url,
        trust: TrustState,
        signers: BTreeSet<PublisherId>,
    ) -> Self {
        let permissions = PermissionSet::new(baseline::for_level(level, &origin));
        Self {
            declared,
            level,
            origin,
            trust,
            signers,
            permissions,
        }
    }

    /// A sandboxed descriptor for unsigned code from `origin`.
    #[must_use]
    pub fn sandbox(origin: Url) -> Self {
        Self::new(None, SecurityLevel::Sandbox, origin, TrustState::None, BTreeSet::new())
    }

    /// Level the descriptor asked for, if it asked.
    #[must_use]
    pub fn declared(&self) -> Option<SecurityLevel> {
        self.declared
    }

    /// Level the application actually runs at.
    #[must_use]
    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    /// Whether the application runs at the sandbox level.
    #[must_use]
    pub fn is_sandboxed(&self) -> bool {
        self.level == SecurityLevel::Sandbox
    }

    /// Codebase origin the baseline is scoped to.
    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Trust state computed at construction.
    #[must_use]
    pub fn trust_state(&self) -> TrustState {
        self.trust
    }

    /// Signers whose code receives the elevated level.
    #[must_use]
    pub fn signers(&self) -> &BTreeSet<PublisherId> {
        &self.signers
    }

    /// The baseline plus runtime grants.
    #[must_use]
    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Live view of effective permissions.
    #[must_use]
    pub fn effective(&self) -> EffectivePermissions<'_> {
        self.permissions.effective()
    }

    /// Append a runtime grant.
    pub fn grant(&self, permission: Permission) -> bool {
        self.permissions.grant(permission)
    }

    /// Level given to code from a bundle with `signing`.
    ///
    /// Only bundles signed by one of this loader's signers share an elevated
    /// level; everything else is sandboxed.
    #[must_use]
    pub fn level_for(&self, signing: &BundleSigning) -> SecurityLevel {
        if self.level.is_elevated() && signing.is_signed_by_any(&self.signers) {
            self.level
        } else {
            SecurityLevel::Sandbox
        }
    }
}
