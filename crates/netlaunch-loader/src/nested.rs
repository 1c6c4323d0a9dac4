//! Expansion of bundles carried inside other bundles.
//!
//! Nested entries are written next to the outer bundle's local copy, under
//! `<local>.nested/`, and attached under the synthetic location
//! `<outer location>!/<entry name>`.

use std::path::{Path, PathBuf};

use netlaunch_bundle::{ArchiveLimits, BundleArchive};
use netlaunch_core::{LaunchError, LaunchResult};
use tracing::{debug, warn};
use url::Url;

/// A nested bundle ready to attach.
#[derive(Debug)]
pub struct NestedBundle {
    /// Synthetic location.
    pub location: Url,
    /// Where it was written.
    pub local: PathBuf,
    /// Its contents.
    pub archive: BundleArchive,
}

/// Expand every nested bundle in `archive`. Failures are logged and skipped.
pub fn expand(
    location: &Url,
    local: &Path,
    archive: &BundleArchive,
    limits: ArchiveLimits,
) -> Vec<NestedBundle> {
    let mut expanded = Vec::new();
    for (name, data) in archive.nested_bundles() {
        match expand_one(location, local, name, data, limits) {
            Ok(nested) => {
                debug!(bundle = %location, nested = %nested.location, "Expanded nested bundle");
                expanded.push(nested);
            },
            Err(e) => warn!(bundle = %location, entry = name, error = %e, "Skipping nested bundle"),
        }
    }
    expanded
}

fn expand_one(
    location: &Url,
    local: &Path,
    name: &str,
    data: &[u8],
    limits: ArchiveLimits,
) -> LaunchResult<NestedBundle> {
    let staging = |message: String| LaunchError::StagingFailure { message };

    let target = nested_dir(local).join(local_name(name));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| staging(format!("failed to create {}: {e}", parent.display())))?;
    }
    std::fs::write(&target, data)
        .map_err(|e| staging(format!("failed to write {}: {e}", target.display())))?;

    let archive = BundleArchive::open(&target, limits)
        .map_err(|e| staging(format!("unreadable nested bundle {name}: {e}")))?;
    let synthetic = Url::parse(&format!("{location}!/{name}"))
        .map_err(|e| staging(format!("bad nested location for {name}: {e}")))?;

    Ok(NestedBundle {
        location: synthetic,
        local: target,
        archive,
    })
}

/// Directory nested bundles of the bundle at `local` are written to.
#[must_use]
pub fn nested_dir(local: &Path) -> PathBuf {
    let mut dir = local.as_os_str().to_owned();
    dir.push(".nested");
    PathBuf::from(dir)
}

/// Local file name for entry `name`; names containing `..` are hex-encoded.
fn local_name(name: &str) -> String {
    if name.contains("..") {
        hex::encode(name)
    } else {
        name.to_owned()
    }
}
