//! Bundle index (`META-INF/INDEX.LIST`).
//!
//! An index tells the loader which other bundles hold which packages, so a
//! miss can be satisfied by fetching exactly one more bundle. Format:
//!
//! ```text
//! Index-Version: 1.0
//!
//! lib/extra.jar
//! com/example/extra
//! com/example/extra/impl
//!
//! other.jar
//! org/other
//! ```

use std::fmt::Write as _;

use crate::error::{BundleError, BundleResult};

/// Path of the index inside a bundle.
pub const INDEX_PATH: &str = "META-INF/INDEX.LIST";

/// One bundle named by an index and the package prefixes it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Bundle name, relative to the indexing bundle's location.
    pub bundle: String,
    /// Package paths (`com/example`) or exact resource paths.
    pub prefixes: Vec<String>,
}

/// Parsed bundle index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleIndex {
    entries: Vec<IndexEntry>,
}

impl BundleIndex {
    /// Build an index from entries.
    #[must_use]
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Parse the textual index format.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InvalidIndex`] if the version header is missing
    /// or a bundle block names an unsafe path.
    pub fn parse(text: &str) -> BundleResult<Self> {
        let mut lines = text.lines().map(str::trim_end);
        let header = lines.next().unwrap_or_default();
        if !header.to_ascii_lowercase().contains("index-version") {
            return Err(BundleError::InvalidIndex {
                message: format!("missing version header, found '{header}'"),
            });
        }

        let mut entries = Vec::new();
        let mut current: Option<IndexEntry> = None;
        for line in lines {
            if line.trim().is_empty() {
                entries.extend(current.take());
                continue;
            }
            match current.as_mut() {
                Some(entry) => entry.prefixes.push(line.trim().trim_end_matches('/').to_string()),
                None => {
                    let bundle = line.trim();
                    if bundle.starts_with('/') || bundle.split('/').any(|p| p == "..") {
                        return Err(BundleError::InvalidIndex {
                            message: format!("unsafe bundle name '{bundle}'"),
                        });
                    }
                    current = Some(IndexEntry {
                        bundle: bundle.to_string(),
                        prefixes: Vec::new(),
                    });
                },
            }
        }
        entries.extend(current);
        Ok(Self { entries })
    }

    /// Render in the textual index format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("Index-Version: 1.0\n");
        for entry in &self.entries {
            out.push('\n');
            let _ = writeln!(out, "{}", entry.bundle);
            for prefix in &entry.prefixes {
                let _ = writeln!(out, "{prefix}");
            }
        }
        out
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Whether the index names no bundles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bundles claiming `path` (a slash-separated class or resource path).
    ///
    /// Matches the containing package first, then the exact path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Vec<&str> {
        let package = path.rsplit_once('/').map(|(pkg, _)| pkg);
        let mut found: Vec<&str> = Vec::new();
        for entry in &self.entries {
            let claims = entry
                .prefixes
                .iter()
                .any(|p| Some(p.as_str()) == package || p == path);
            if claims && !found.contains(&entry.bundle.as_str()) {
                found.push(&entry.bundle);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Index-Version: 1.0\n\nlib/extra.jar\ncom/example/extra\ncom/example/extra/impl\n\nother.jar\norg/other\nlogo.png\n";

    #[test]
    fn test_parse() {
        let index = BundleIndex::parse(SAMPLE).unwrap();
        assert_eq!(index.entries().len(), 2);
        assert_eq!(index.entries()[0].bundle, "lib/extra.jar");
        assert_eq!(index.entries()[1].prefixes, vec!["org/other", "logo.png"]);
    }

    #[test]
    fn test_lookup_by_package() {
        let index = BundleIndex::parse(SAMPLE).unwrap();
        assert_eq!(
            index.lookup("com/example/extra/impl/Widget"),
            vec!["lib/extra.jar"]
        );
        assert_eq!(index.lookup("org/other/Thing"), vec!["other.jar"]);
        assert!(index.lookup("com/example/Other").is_empty());
    }

    #[test]
    fn test_lookup_exact_resource() {
        let index = BundleIndex::parse(SAMPLE).unwrap();
        assert_eq!(index.lookup("logo.png"), vec!["other.jar"]);
    }

    #[test]
    fn test_render_roundtrip() {
        let index = BundleIndex::parse(SAMPLE).unwrap();
        assert_eq!(BundleIndex::parse(&index.render()).unwrap(), index);
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            BundleIndex::parse("lib/extra.jar\ncom/x\n"),
            Err(BundleError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_unsafe_bundle_name() {
        let text = "Index-Version: 1.0\n\n../../etc/passwd\ncom/x\n";
        assert!(BundleIndex::parse(text).is_err());
    }
}
