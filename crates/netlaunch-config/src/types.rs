//! Configuration types for netlaunch.
//!
//! Types here have no dependencies on other netlaunch crates. Consuming
//! crates convert them into their domain types. Every struct implements
//! [`Default`] so that a bare `[section]` header produces a working
//! configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bundle loading behaviour.
    pub loader: LoaderSection,
    /// Trust decisions and manifest attribute checks.
    pub security: SecuritySection,
    /// Log output.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// LoaderSection
// ---------------------------------------------------------------------------

/// Which bundles are fetched and verified before the loader is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyScope {
    /// Eager bundles, the main bundle, and (in strict mode) their parts.
    #[default]
    Initial,
    /// Every declared bundle.
    All,
}

/// Bundle loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    /// Activate whole parts of the initial bundles up front.
    pub strict: bool,
    /// Check bundle signatures. When off, every bundle counts as unsigned.
    pub verify_signatures: bool,
    /// Which bundles are verified at construction.
    pub verify_scope: VerifyScope,
    /// Fall back to fetching classes relative to the codebase.
    pub enable_codebase: bool,
    /// Expand bundles nested inside activated bundles.
    pub nested_bundles: bool,
    /// Entry suffixes treated as native libraries.
    pub native_suffixes: Vec<String>,
    /// Parent directory for native scratch directories. `None` uses the
    /// system temp directory.
    pub scratch_root: Option<String>,
    /// Maximum number of entries in a single bundle.
    pub max_bundle_entries: usize,
    /// Maximum decompressed size of a single bundle in bytes.
    pub max_bundle_bytes: u64,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            strict: false,
            verify_signatures: true,
            verify_scope: VerifyScope::Initial,
            enable_codebase: false,
            nested_bundles: true,
            native_suffixes: vec![
                ".so".to_owned(),
                ".dylib".to_owned(),
                ".dll".to_owned(),
                ".jnilib".to_owned(),
            ],
            scratch_root: None,
            max_bundle_entries: 10_000,
            max_bundle_bytes: 500_000_000,
        }
    }
}

// ---------------------------------------------------------------------------
// SecuritySection
// ---------------------------------------------------------------------------

/// What to do with an application that lacks a `permissions` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsignedPolicy {
    /// Refuse to launch.
    Deny,
    /// Ask the user.
    Ask,
    /// Launch and log.
    #[default]
    Allow,
}

/// Security configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    /// Manifest attribute checks to run: `"all"`, `"none"`, or any of
    /// `"trusted"`, `"codebase"`, `"permissions"`, `"alac"`, `"entry_point"`.
    pub attribute_checks: Vec<String>,
    /// Handling of a missing `permissions` attribute.
    pub unsigned_policy: UnsignedPolicy,
    /// Ask before running code signed by a publisher not in
    /// `trusted_publishers`.
    pub prompt_untrusted_signers: bool,
    /// Publisher keys (hex or base64) trusted without a prompt.
    pub trusted_publishers: Vec<String>,
    /// Fail when a signed application's `codebase` attribute does not match.
    pub strict_codebase_attribute: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            attribute_checks: vec!["all".to_owned()],
            unsigned_policy: UnsignedPolicy::Allow,
            prompt_untrusted_signers: false,
            trusted_publishers: Vec::new(),
            strict_codebase_attribute: false,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["netlaunch_loader=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
