//! Baseline plus append-only runtime grants.
//!
//! The baseline is frozen when the set is created. Grants can only be
//! appended. Effective permissions are never materialized: every query walks
//! `baseline ∪ grants` as it is at that moment, so a later query always sees
//! a superset of an earlier one.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::permission::Permission;

/// A frozen baseline with runtime grants appended over time.
pub struct PermissionSet {
    baseline: Vec<Permission>,
    grants: RwLock<Vec<Permission>>,
}

impl PermissionSet {
    /// A set with the given baseline and no grants.
    #[must_use]
    pub fn new(baseline: Vec<Permission>) -> Self {
        Self {
            baseline,
            grants: RwLock::new(Vec::new()),
        }
    }

    /// The frozen baseline.
    #[must_use]
    pub fn baseline(&self) -> &[Permission] {
        &self.baseline
    }

    /// Append a runtime grant. Grants already implied are skipped.
    ///
    /// Returns `true` if the grant was recorded.
    pub fn grant(&self, permission: Permission) -> bool {
        let mut grants = self.grants.write().unwrap_or_else(PoisonError::into_inner);
        let covered = self
            .baseline
            .iter()
            .chain(grants.iter())
            .any(|held| held.implies(&permission));
        if covered {
            return false;
        }
        debug!(permission = %permission, "Runtime permission granted");
        grants.push(permission);
        true
    }

    /// A live view over `baseline ∪ grants`.
    ///
    /// The view locks the grants only while reading a single entry, so grants
    /// can be made while it is alive. A walk started later sees them.
    #[must_use]
    pub fn effective(&self) -> EffectivePermissions<'_> {
        EffectivePermissions {
            baseline: &self.baseline,
            grants: &self.grants,
        }
    }

    /// Whether any held permission implies `permission`.
    #[must_use]
    pub fn implies(&self, permission: &Permission) -> bool {
        self.effective().implies(permission)
    }

    /// Number of runtime grants so far.
    #[must_use]
    pub fn grant_count(&self) -> usize {
        self.grants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionSet")
            .field("baseline", &self.baseline)
            .field("grants", &self.grant_count())
            .finish()
    }
}

/// Borrowed, lock-free view over a [`PermissionSet`].
///
/// Grants are append-only, so index `i` always names the same grant once it
/// exists. Walks read one index at a time and stop at the first missing one.
pub struct EffectivePermissions<'a> {
    baseline: &'a [Permission],
    grants: &'a RwLock<Vec<Permission>>,
}

impl EffectivePermissions<'_> {
    // A poisoned guard still holds a valid prefix of the grants.
    fn grant_at(&self, index: usize) -> Option<Permission> {
        self.grants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Baseline entries first, then grants in the order they were made.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.baseline
            .iter()
            .cloned()
            .chain((0..).map_while(move |index| self.grant_at(index)))
    }

    /// Whether any entry implies `permission`.
    #[must_use]
    pub fn implies(&self, permission: &Permission) -> bool {
        if self.baseline.iter().any(|held| held.implies(permission)) {
            return true;
        }
        let mut index = 0usize;
        loop {
            let grants = self.grants.read().unwrap_or_else(PoisonError::into_inner);
            match grants.get(index) {
                Some(held) if held.implies(permission) => return true,
                Some(_) => index = index.saturating_add(1),
                None => return false,
            }
        }
    }

    /// Total number of entries at the moment of the call.
    #[must_use]
    pub fn len(&self) -> usize {
        let grants = self.grants.read().unwrap_or_else(PoisonError::into_inner).len();
        self.baseline.len().saturating_add(grants)
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the entries out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Permission> {
        self.iter().collect()
    }
}
