//! What resolution hands back: classes, resources and their code sources.

use std::collections::BTreeSet;
use std::sync::Arc;

use netlaunch_bundle::BundleSigning;
use netlaunch_core::SecurityLevel;
use netlaunch_crypto::PublisherId;
use url::Url;

/// Security identity of the bundle a class came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSource {
    /// Remote (or synthetic nested) location of the bundle.
    pub location: Url,
    /// Signature status observed when the bundle was attached.
    pub signing: BundleSigning,
    /// Level code from this bundle runs at.
    pub level: SecurityLevel,
}

impl CodeSource {
    /// Unsigned sandboxed code, as served by the codebase fallback.
    #[must_use]
    pub fn sandboxed(location: Url) -> Self {
        Self {
            location,
            signing: BundleSigning::Unsigned,
            level: SecurityLevel::Sandbox,
        }
    }

    /// The same code source under another location (nested bundles).
    #[must_use]
    pub fn relocated(&self, location: Url) -> Self {
        Self {
            location,
            ..self.clone()
        }
    }

    /// Signers of the bundle, empty unless fully signed.
    #[must_use]
    pub fn signers(&self) -> BTreeSet<PublisherId> {
        self.signing.signers().cloned().unwrap_or_default()
    }
}

/// A resolved class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    /// Dotted class name.
    pub name: String,
    /// Class bytes.
    pub bytes: Arc<[u8]>,
    /// Bundle the class came from; `None` for the parent loader.
    pub source: Option<CodeSource>,
}

impl LoadedClass {
    /// Location of the defining bundle.
    #[must_use]
    pub fn location(&self) -> Option<&Url> {
        self.source.as_ref().map(|s| &s.location)
    }

    /// Level the class runs at. Parent classes are platform code.
    #[must_use]
    pub fn level(&self) -> SecurityLevel {
        self.source
            .as_ref()
            .map_or(SecurityLevel::Full, |s| s.level)
    }

    /// Whether the parent loader supplied this class.
    #[must_use]
    pub fn is_from_parent(&self) -> bool {
        self.source.is_none()
    }
}

/// A resolved resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Slash-separated resource path.
    pub name: String,
    /// Content.
    pub bytes: Arc<[u8]>,
    /// Where it was found; `None` for the parent loader.
    pub location: Option<Url>,
}

/// Entry path of dotted class `name` (`a.b.C` to `a/b/C.class`).
#[must_use]
pub fn class_path(name: &str) -> String {
    format!("{}.class", name.replace('.', "/"))
}
