//! Loader behaviour derived from the `[loader]` configuration section.

use std::path::PathBuf;

use netlaunch_bundle::ArchiveLimits;
use netlaunch_config::LoaderSection;
pub use netlaunch_config::VerifyScope;

/// Knobs controlling how a [`crate::BundleLoader`] fetches and activates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoaderSettings {
    /// Activate whole parts of the initial bundles during construction.
    pub strict: bool,
    /// Check bundle signatures. When off every bundle counts as unsigned.
    pub verify_signatures: bool,
    /// Which bundles are fetched and verified during construction.
    pub verify_scope: VerifyScope,
    /// Register the codebase fallback at construction.
    pub enable_codebase: bool,
    /// Expand bundles nested inside activated bundles.
    pub nested_bundles: bool,
    /// Entry suffixes staged as native libraries.
    pub native_suffixes: Vec<String>,
    /// Parent of native scratch directories; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    /// Limits applied when reading any bundle.
    pub limits: ArchiveLimits,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self::from(&LoaderSection::default())
    }
}

impl From<&LoaderSection> for LoaderSettings {
    fn from(section: &LoaderSection) -> Self {
        Self {
            strict: section.strict,
            verify_signatures: section.verify_signatures,
            verify_scope: section.verify_scope,
            enable_codebase: section.enable_codebase,
            nested_bundles: section.nested_bundles,
            native_suffixes: section.native_suffixes.clone(),
            scratch_root: section.scratch_root.as_ref().map(PathBuf::from),
            limits: ArchiveLimits {
                max_entries: section.max_bundle_entries,
                max_bytes: section.max_bundle_bytes,
            },
        }
    }
}
