//! Manifest attributes that constrain how a signed application may run.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::{LaunchError, LaunchResult};

/// Value of the `permissions` manifest attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionsAttribute {
    /// `sandbox`
    Sandbox,
    /// `all-permissions`
    AllPermissions,
}

impl FromStr for PermissionsAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "all-permissions" => Ok(Self::AllPermissions),
            other => Err(format!("unknown permissions attribute '{other}'")),
        }
    }
}

/// Manifest attributes read from the main bundle.
///
/// Every attribute is optional; absent attributes skip their check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAttributes {
    /// `Trusted-Only`
    pub trusted_only: Option<bool>,
    /// `Codebase`
    pub codebase: Option<CodebaseMatcher>,
    /// `Permissions`
    pub permissions: Option<PermissionsAttribute>,
    /// `Application-Library-Allowable-Codebase`
    pub allowable_codebase: Option<CodebaseMatcher>,
    /// `Entry-Point`
    pub entry_points: Option<Vec<String>>,
}

/// Matches URLs against a list of codebase patterns.
///
/// A pattern is either a host glob (`*.example.com`), matching any scheme,
/// port and path on that host, or a full URL glob (`https://cdn.example.com/lib/*`).
#[derive(Clone)]
pub struct CodebaseMatcher {
    patterns: Vec<String>,
    compiled: Vec<CompiledPattern>,
}

#[derive(Clone)]
enum CompiledPattern {
    Host(GlobMatcher),
    Url(GlobMatcher),
}

impl CodebaseMatcher {
    /// Compile a whitespace-separated pattern list, as written in a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Descriptor`] if a pattern is not a valid glob.
    pub fn parse(list: &str) -> LaunchResult<Self> {
        Self::new(list.split_whitespace().map(str::to_string).collect())
    }

    /// Compile a list of patterns.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Descriptor`] if a pattern is not a valid glob.
    pub fn new(patterns: Vec<String>) -> LaunchResult<Self> {
        let compiled = patterns
            .iter()
            .map(|p| compile(p))
            .collect::<LaunchResult<Vec<_>>>()?;
        Ok(Self { patterns, compiled })
    }

    /// The source patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether any pattern covers `url`.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let full = url_key(url);
        self.compiled.iter().any(|pattern| match pattern {
            CompiledPattern::Host(glob) => glob.is_match(&host),
            CompiledPattern::Url(glob) => glob.is_match(&full),
        })
    }
}

fn compile(pattern: &str) -> LaunchResult<CompiledPattern> {
    let invalid = |e: globset::Error| LaunchError::Descriptor {
        location: pattern.to_string(),
        message: format!("invalid codebase pattern: {e}"),
    };
    let matcher = Glob::new(&pattern.to_ascii_lowercase())
        .map_err(invalid)?
        .compile_matcher();
    if pattern.contains("://") {
        Ok(CompiledPattern::Url(matcher))
    } else {
        Ok(CompiledPattern::Host(matcher))
    }
}

/// `scheme://host[:port]/path` without query or fragment, lowercased.
fn url_key(url: &Url) -> String {
    let mut key = format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or_default()
    );
    if let Some(port) = url.port() {
        let _ = write!(key, ":{port}");
    }
    key.push_str(url.path());
    key.to_ascii_lowercase()
}

impl fmt::Debug for CodebaseMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CodebaseMatcher")
            .field(&self.patterns)
            .finish()
    }
}

impl PartialEq for CodebaseMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.patterns == other.patterns
    }
}

impl Eq for CodebaseMatcher {}

impl Serialize for CodebaseMatcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.patterns.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CodebaseMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let patterns = Vec::<String>::deserialize(deserializer)?;
        Self::new(patterns).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_permissions_attribute_parse() {
        assert_eq!(
            "all-permissions".parse::<PermissionsAttribute>().unwrap(),
            PermissionsAttribute::AllPermissions
        );
        assert_eq!(
            " Sandbox ".parse::<PermissionsAttribute>().unwrap(),
            PermissionsAttribute::Sandbox
        );
        assert!("everything".parse::<PermissionsAttribute>().is_err());
    }

    #[test]
    fn test_host_pattern() {
        let m = CodebaseMatcher::parse("*.example.com other.org").unwrap();
        assert!(m.matches(&url("https://cdn.example.com/lib/a.jar")));
        assert!(m.matches(&url("http://other.org:8080/x")));
        assert!(!m.matches(&url("https://example.net/a.jar")));
    }

    #[test]
    fn test_url_pattern() {
        let m = CodebaseMatcher::parse("https://cdn.example.com/lib/*").unwrap();
        assert!(m.matches(&url("https://cdn.example.com/lib/a.jar")));
        assert!(!m.matches(&url("http://cdn.example.com/lib/a.jar")));
        assert!(!m.matches(&url("https://cdn.example.com/other/a.jar")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(CodebaseMatcher::parse("[unclosed").is_err());
    }

    #[test]
    fn test_serde_roundtrip_preserves_patterns() {
        let m = CodebaseMatcher::parse("*.a.com b.com").unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: CodebaseMatcher = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
        assert!(back.matches(&url("https://x.a.com/")));
    }
}
