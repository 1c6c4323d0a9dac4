//! Path-based fallback that fetches entries straight from codebase URLs.

use std::sync::{PoisonError, RwLock};

use netlaunch_core::{FetchPolicy, LaunchResult, ResourceFetcher};
use tracing::{debug, trace};
use url::Url;

/// Ordered codebase URLs consulted after the bundle search path.
#[derive(Debug, Default)]
pub struct CodebaseFallback {
    bases: RwLock<Vec<Url>>,
}

impl CodebaseFallback {
    /// A fallback with no codebases; it finds nothing until enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `base`. Returns `false` if it was already present.
    pub fn enable(&self, base: Url) -> LaunchResult<bool> {
        let mut bases = self.bases.write().map_err(netlaunch_core::lock_poisoned)?;
        if bases.contains(&base) {
            return Ok(false);
        }
        debug!(codebase = %base, "Codebase fallback enabled");
        bases.push(base);
        Ok(true)
    }

    /// Whether any codebase is registered.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self
            .bases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Registered codebases in order.
    #[must_use]
    pub fn bases(&self) -> Vec<Url> {
        self.bases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch `path` from the first codebase that serves it.
    ///
    /// Fetches are uncached. Failures only mean "not here".
    pub fn find(&self, fetcher: &dyn ResourceFetcher, path: &str) -> Option<(Url, Vec<u8>)> {
        for base in self.bases() {
            let Ok(location) = base.join(path) else {
                continue;
            };
            let local = match fetcher.fetch(&location, None, FetchPolicy::Uncached) {
                Ok(local) => local,
                Err(e) => {
                    trace!(location = %location, error = %e, "Not in codebase");
                    continue;
                },
            };
            match std::fs::read(&local) {
                Ok(bytes) => return Some((location, bytes)),
                Err(e) => {
                    debug!(location = %location, error = %e, "Unreadable codebase entry");
                },
            }
        }
        None
    }
}
