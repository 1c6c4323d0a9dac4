//! Bundles declared but not yet attached to a loader.
//!
//! The pool only shrinks. A group leaves the pool when it is handed out for
//! activation, whether or not activation then succeeds, and its locations
//! are remembered as consumed so nothing fetches them again.

use std::collections::HashSet;

use netlaunch_core::{BundleDescriptor, PartTag};
use url::Url;

/// Pending bundles, partitioned by part tag.
#[derive(Debug, Default)]
pub struct ActivationPool {
    pending: Vec<BundleDescriptor>,
    consumed: HashSet<Url>,
}

impl ActivationPool {
    /// A pool holding `bundles` in declaration order.
    #[must_use]
    pub fn new(bundles: impl IntoIterator<Item = BundleDescriptor>) -> Self {
        Self {
            pending: bundles.into_iter().collect(),
            consumed: HashSet::new(),
        }
    }

    /// Number of pending bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether `location` is still pending.
    #[must_use]
    pub fn contains(&self, location: &Url) -> bool {
        self.pending.iter().any(|b| b.location() == location)
    }

    /// Claim a location outside the static pool (index lookups).
    ///
    /// Returns `false` if it was pending or already claimed.
    pub fn claim(&mut self, location: &Url) -> bool {
        !self.contains(location) && self.consumed.insert(location.clone())
    }

    /// Remove the first pending bundle and everything sharing its part.
    pub fn pop_group(&mut self) -> Vec<BundleDescriptor> {
        let Some(first) = self.pending.first() else {
            return Vec::new();
        };
        match first.part().cloned() {
            Some(part) => self.take_part(&part),
            None => {
                let bundle = self.pending.remove(0);
                self.consumed.insert(bundle.location().clone());
                vec![bundle]
            },
        }
    }

    /// Remove every pending bundle tagged `part`.
    pub fn take_part(&mut self, part: &PartTag) -> Vec<BundleDescriptor> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|b| b.part() == Some(part));
        self.pending = kept;
        self.consumed
            .extend(taken.iter().map(|b| b.location().clone()));
        taken
    }
}
