//! Typed descriptor input produced by the parsing collaborator.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::manifest::ManifestAttributes;
use crate::types::{CooperationKey, PartTag, SecurityLevel, VersionConstraint};

/// When a bundle is fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    /// Fetched and activated during loader construction.
    #[default]
    Eager,
    /// Fetched only when a resolution needs it.
    Lazy,
}

/// One downloadable bundle.
///
/// Immutable once built; loaders share it behind `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleDescriptor {
    location: Url,
    version: Option<VersionConstraint>,
    part: Option<PartTag>,
    download: DownloadKind,
    main: bool,
    native: bool,
}

impl BundleDescriptor {
    /// An eager bundle at `location`.
    #[must_use]
    pub fn eager(location: Url) -> Self {
        Self {
            location,
            version: None,
            part: None,
            download: DownloadKind::Eager,
            main: false,
            native: false,
        }
    }

    /// A lazy bundle at `location`.
    #[must_use]
    pub fn lazy(location: Url) -> Self {
        Self {
            download: DownloadKind::Lazy,
            ..Self::eager(location)
        }
    }

    /// Assign the bundle to a part.
    #[must_use]
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(PartTag::new(part));
        self
    }

    /// Attach a version constraint.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(VersionConstraint::new(version));
        self
    }

    /// Mark as the main bundle.
    #[must_use]
    pub fn as_main(mut self) -> Self {
        self.main = true;
        self
    }

    /// Mark as carrying native code.
    #[must_use]
    pub fn as_native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Remote location.
    #[must_use]
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Version constraint, if any.
    #[must_use]
    pub fn version(&self) -> Option<&VersionConstraint> {
        self.version.as_ref()
    }

    /// Part tag, if any.
    #[must_use]
    pub fn part(&self) -> Option<&PartTag> {
        self.part.as_ref()
    }

    /// Eager or lazy.
    #[must_use]
    pub fn download(&self) -> DownloadKind {
        self.download
    }

    /// Whether this bundle is fetched during construction.
    #[must_use]
    pub fn is_eager(&self) -> bool {
        self.download == DownloadKind::Eager
    }

    /// Whether this is the main bundle.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.main
    }

    /// Whether this bundle carries native code.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.native
    }
}

/// Reference to a nested extension descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionRef {
    /// Where the extension descriptor lives.
    pub location: Url,
    /// Optional version constraint.
    pub version: Option<VersionConstraint>,
}

impl ExtensionRef {
    /// Reference an extension without a version constraint.
    #[must_use]
    pub fn new(location: Url) -> Self {
        Self {
            location,
            version: None,
        }
    }
}

/// Declares which part holds a class or package.
///
/// `name` is either an exact class name or a `prefix.*` package pattern;
/// a recursive pattern also covers subpackages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageHint {
    /// Class name or `package.*` pattern.
    pub name: String,
    /// Part holding the matching classes.
    pub part: PartTag,
    /// Whether `package.*` also covers subpackages.
    pub recursive: bool,
}

impl PackageHint {
    /// Hint that `name` lives in `part`.
    #[must_use]
    pub fn new(name: impl Into<String>, part: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            part: PartTag::new(part),
            recursive: false,
        }
    }

    /// Cover subpackages too.
    #[must_use]
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Whether the dotted class name `class` is covered.
    #[must_use]
    pub fn covers(&self, class: &str) -> bool {
        if self.name == class {
            return true;
        }
        let Some(package) = self.name.strip_suffix('*') else {
            return false;
        };
        let Some(rest) = class.strip_prefix(package) else {
            return false;
        };
        !rest.is_empty() && (self.recursive || !rest.contains('.'))
    }
}

/// A fully parsed launch descriptor.
///
/// Two descriptors are the same launch when they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    /// Location the descriptor itself was loaded from.
    pub source: Url,
    /// Cooperation key of the launch family.
    pub key: CooperationKey,
    /// Bundles in declaration order.
    pub bundles: Vec<BundleDescriptor>,
    /// Declared level; `None` means sandbox without an explicit request.
    pub security: Option<SecurityLevel>,
    /// Codebase origin all bundles are expected to live under.
    pub codebase: Url,
    /// Document base, when the launch is embedded in a page.
    pub document_base: Option<Url>,
    /// Extension descriptors, in declaration order.
    pub extensions: Vec<ExtensionRef>,
    /// Manifest attributes taken from the main bundle.
    pub manifest: ManifestAttributes,
    /// Main class, if declared.
    pub main_class: Option<String>,
    /// Package-to-part hints used to pick the part to activate on a miss.
    pub packages: Vec<PackageHint>,
}

impl LaunchDescriptor {
    /// Create a descriptor with no bundles.
    #[must_use]
    pub fn new(source: Url, key: impl Into<CooperationKey>, codebase: Url) -> Self {
        Self {
            source,
            key: key.into(),
            bundles: Vec::new(),
            security: None,
            codebase,
            document_base: None,
            extensions: Vec::new(),
            manifest: ManifestAttributes::default(),
            main_class: None,
            packages: Vec::new(),
        }
    }

    /// Append a bundle.
    #[must_use]
    pub fn with_bundle(mut self, bundle: BundleDescriptor) -> Self {
        self.bundles.push(bundle);
        self
    }

    /// Declare a security level.
    #[must_use]
    pub fn with_security(mut self, level: SecurityLevel) -> Self {
        self.security = Some(level);
        self
    }

    /// Append an extension reference.
    #[must_use]
    pub fn with_extension(mut self, extension: ExtensionRef) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Set manifest attributes.
    #[must_use]
    pub fn with_manifest(mut self, manifest: ManifestAttributes) -> Self {
        self.manifest = manifest;
        self
    }

    /// Set the main class.
    #[must_use]
    pub fn with_main_class(mut self, class: impl Into<String>) -> Self {
        self.main_class = Some(class.into());
        self
    }

    /// Declare that classes matching `hint` live in its part.
    #[must_use]
    pub fn with_package(mut self, hint: PackageHint) -> Self {
        self.packages.push(hint);
        self
    }

    /// Part hinted for the dotted class name `class`.
    #[must_use]
    pub fn hinted_part(&self, class: &str) -> Option<&PartTag> {
        self.packages
            .iter()
            .find(|hint| hint.covers(class))
            .map(|hint| &hint.part)
    }

    /// Set the document base.
    #[must_use]
    pub fn with_document_base(mut self, base: Url) -> Self {
        self.document_base = Some(base);
        self
    }

    /// Effective declared level (sandbox when unspecified).
    #[must_use]
    pub fn declared_level(&self) -> SecurityLevel {
        self.security.unwrap_or_default()
    }

    /// Replace the key, used when an extension joins its parent's family.
    #[must_use]
    pub fn rekeyed(mut self, key: CooperationKey) -> Self {
        self.key = key;
        self
    }
}
