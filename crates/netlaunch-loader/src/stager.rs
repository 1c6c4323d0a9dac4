//! Native library extraction into a loader-private scratch directory.
//!
//! Staging never fails an activation: every error is logged and the entry
//! is skipped. The scratch directory is created on first use and removed
//! by [`NativeCodeStager::destroy`] or when the stager is dropped.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use netlaunch_bundle::BundleArchive;
use netlaunch_core::{LaunchError, LaunchResult};
use tempfile::TempDir;
use tracing::{debug, warn};
use url::Url;

/// Prefix of every scratch directory.
pub const SCRATCH_PREFIX: &str = "netlaunch-native-";

#[derive(Debug, Default)]
enum Scratch {
    #[default]
    Unused,
    Active(TempDir),
    Destroyed,
}

/// Copies native payloads out of activated bundles.
#[derive(Debug)]
pub struct NativeCodeStager {
    suffixes: Vec<String>,
    scratch_root: Option<PathBuf>,
    scratch: Mutex<Scratch>,
}

impl NativeCodeStager {
    /// A stager recognizing `suffixes`, creating its directory under
    /// `scratch_root` (or the system temp dir).
    #[must_use]
    pub fn new(suffixes: Vec<String>, scratch_root: Option<PathBuf>) -> Self {
        Self {
            suffixes,
            scratch_root,
            scratch: Mutex::new(Scratch::Unused),
        }
    }

    /// Extract every native entry of `archive`. Returns how many were staged.
    pub fn stage(&self, location: &Url, archive: &BundleArchive) -> usize {
        let mut staged: usize = 0;
        for (name, data) in archive.entries_with_suffix(&self.suffixes) {
            match self.stage_entry(name, data) {
                Ok(path) => {
                    debug!(bundle = %location, entry = name, path = %path.display(), "Staged native library");
                    staged = staged.saturating_add(1);
                },
                Err(e) => {
                    warn!(bundle = %location, entry = name, error = %e, "Skipping native library");
                },
            }
        }
        staged
    }

    fn stage_entry(&self, name: &str, data: &[u8]) -> LaunchResult<PathBuf> {
        let file_name = library_file_component(name).ok_or_else(|| LaunchError::StagingFailure {
            message: format!("unsafe native entry name '{name}'"),
        })?;
        let dir = self.directory_or_create()?;
        let target = dir.join(file_name);
        std::fs::write(&target, data).map_err(|e| LaunchError::StagingFailure {
            message: format!("failed to write {}: {e}", target.display()),
        })?;
        Ok(target)
    }

    fn directory_or_create(&self) -> LaunchResult<PathBuf> {
        let mut scratch = self.scratch.lock().map_err(netlaunch_core::lock_poisoned)?;
        match &*scratch {
            Scratch::Active(dir) => return Ok(dir.path().to_path_buf()),
            Scratch::Destroyed => {
                return Err(LaunchError::StagingFailure {
                    message: "loader has been destroyed".to_owned(),
                });
            },
            Scratch::Unused => {},
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| LaunchError::StagingFailure {
                    message: format!("failed to create scratch root {}: {e}", root.display()),
                })?;
                builder.tempdir_in(root)
            },
            None => builder.tempdir(),
        }
        .map_err(|e| LaunchError::StagingFailure {
            message: format!("failed to create scratch directory: {e}"),
        })?;
        restrict_permissions(dir.path())?;

        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "Created native scratch directory");
        *scratch = Scratch::Active(dir);
        Ok(path)
    }

    /// The scratch directory, if one has been created.
    #[must_use]
    pub fn directory(&self) -> Option<PathBuf> {
        match &*self.scratch.lock().ok()? {
            Scratch::Active(dir) => Some(dir.path().to_path_buf()),
            _ => None,
        }
    }

    /// Path of the staged library for `name`, using the platform naming
    /// convention (`libfoo.so`, `libfoo.dylib`, `foo.dll`).
    #[must_use]
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        let path = self.directory()?.join(library_file_name(name));
        path.is_file().then_some(path)
    }

    /// Remove the scratch directory. Later calls do nothing, and nothing is
    /// staged afterwards.
    pub fn destroy(&self) {
        let Ok(mut scratch) = self.scratch.lock() else {
            return;
        };
        if let Scratch::Active(dir) = std::mem::replace(&mut *scratch, Scratch::Destroyed) {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove native scratch directory");
            } else {
                debug!(path = %path.display(), "Removed native scratch directory");
            }
        }
    }
}

/// Platform file name of native library `name`.
#[must_use]
pub fn library_file_name(name: &str) -> String {
    format!(
        "{}{name}{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// Final path component of an entry, rejecting traversal and empty names.
fn library_file_component(name: &str) -> Option<&str> {
    if name.split('/').any(|c| c == "..") {
        return None;
    }
    let file = name.rsplit('/').next()?;
    (!file.is_empty() && file != ".").then_some(file)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> LaunchResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
        LaunchError::StagingFailure {
            message: format!("failed to restrict {}: {e}", path.display()),
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> LaunchResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlaunch_bundle::{ArchiveLimits, BundleBuilder};

    fn suffixes() -> Vec<String> {
        vec![".so".to_owned(), ".dylib".to_owned(), ".dll".to_owned()]
    }

    fn archive(entries: &[(&str, &[u8])]) -> BundleArchive {
        let builder = entries
            .iter()
            .fold(BundleBuilder::new(), |b, (name, data)| b.entry(*name, data.to_vec()));
        BundleArchive::from_bytes(&builder.to_bytes().unwrap(), ArchiveLimits::default()).unwrap()
    }

    fn location() -> Url {
        Url::parse("https://h/native.jar").unwrap()
    }

    #[test]
    fn test_stage_and_find() {
        let root = tempfile::tempdir().unwrap();
        let stager = NativeCodeStager::new(suffixes(), Some(root.path().to_path_buf()));
        let lib = library_file_name("codec");
        let archive = archive(&[
            (&format!("lib/linux/{lib}"), b"ELF"),
            ("com/example/Codec.class", b"class"),
        ]);

        assert_eq!(stager.stage(&location(), &archive), 1);
        let dir = stager.directory().unwrap();
        assert!(dir.starts_with(root.path()));
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(SCRATCH_PREFIX)
        );
        let found = stager.find_library("codec").unwrap();
        assert_eq!(std::fs::read(found).unwrap(), b"ELF");
        assert!(stager.find_library("missing").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_scratch_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let stager = NativeCodeStager::new(suffixes(), None);
        stager.stage(&location(), &archive(&[("libx.so", b"x")]));
        let mode = std::fs::metadata(stager.directory().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_no_native_entries_creates_nothing() {
        let stager = NativeCodeStager::new(suffixes(), None);
        assert_eq!(stager.stage(&location(), &archive(&[("a.txt", b"a")])), 0);
        assert!(stager.directory().is_none());
    }

    #[test]
    fn test_destroy_is_idempotent_and_final() {
        let stager = NativeCodeStager::new(suffixes(), None);
        stager.stage(&location(), &archive(&[("libx.so", b"x")]));
        let dir = stager.directory().unwrap();
        stager.destroy();
        assert!(!dir.exists());
        stager.destroy();
        assert_eq!(stager.stage(&location(), &archive(&[("liby.so", b"y")])), 0);
        assert!(stager.directory().is_none());
    }

    #[test]
    fn test_unwritable_root_is_swallowed() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let stager = NativeCodeStager::new(suffixes(), Some(file));
        assert_eq!(stager.stage(&location(), &archive(&[("libx.so", b"x")])), 0);
    }

    #[test]
    fn test_library_file_component() {
        assert_eq!(library_file_component("a/b/libx.so"), Some("libx.so"));
        assert_eq!(library_file_component("libx.so"), Some("libx.so"));
        assert_eq!(library_file_component("a/../libx.so"), None);
        assert_eq!(library_file_component("dir/"), None);
    }
}
