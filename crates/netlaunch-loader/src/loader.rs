//! The security-scoped bundle loader.
//!
//! A loader owns the bundles of one launch descriptor. Construction fetches
//! and verifies the initial bundles and freezes a [`SecurityDescriptor`];
//! everything else is activated on demand, one part at a time, when a class
//! cannot be found among the bundles already attached.
//!
//! Class resolution walks [`CLASS_STAGES`] in order over the provider list
//! (this loader followed by its peers, depth-first). Resource resolution
//! walks [`RESOURCE_STAGES`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use netlaunch_bundle::{BundleArchive, BundleIndex, BundleSigning, SignatureVerifier, classify};
use netlaunch_core::{
    BundleDescriptor, CallerContext, FetchPolicy, LaunchDescriptor, LaunchError, LaunchResult,
    ParentResolver, PartTag, ResourceFetcher, SecurityLevel, TrustState, VersionConstraint,
    ViolationKind, lock_poisoned,
};
use netlaunch_security::{
    EffectivePermissions, Permission, PermissionResolver, SecurityDescriptor, baseline,
};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::class::{CodeSource, LoadedClass, Resource, class_path};
use crate::codebase::CodebaseFallback;
use crate::environment::LoaderEnvironment;
use crate::nested;
use crate::pool::ActivationPool;
use crate::settings::{LoaderSettings, VerifyScope};
use crate::stager::{NativeCodeStager, library_file_name};

/// One step of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Classes already resolved by any provider.
    Defined,
    /// The platform loader.
    Parent,
    /// Bundles already attached to any provider.
    SearchPath,
    /// Entries fetched relative to registered codebases.
    Codebase,
    /// Activation of pending parts.
    Lazy,
    /// On-demand fetch of bundles named by a bundle index.
    Index,
}

/// Stage order for classes.
pub const CLASS_STAGES: [Stage; 6] = [
    Stage::Defined,
    Stage::Parent,
    Stage::SearchPath,
    Stage::Codebase,
    Stage::Lazy,
    Stage::Index,
];

/// Stage order for resources. Resources never use the index, and only fall
/// back to the codebase when nothing else has them.
pub const RESOURCE_STAGES: [Stage; 4] = [
    Stage::Parent,
    Stage::SearchPath,
    Stage::Lazy,
    Stage::Codebase,
];

/// A bundle on the search path.
#[derive(Debug, Clone)]
struct AttachedBundle {
    location: Url,
    archive: Arc<BundleArchive>,
    source: CodeSource,
}

/// An index found in an attached bundle; names resolve against `base`.
#[derive(Debug, Clone)]
struct IndexRecord {
    base: Url,
    index: BundleIndex,
}

/// A bundle materialized locally and inspected.
struct Fetched {
    location: Url,
    local: PathBuf,
    archive: BundleArchive,
    signing: BundleSigning,
}

/// An entry found on a search path.
struct Hit {
    bytes: Arc<[u8]>,
    source: CodeSource,
}

/// Which pending groups a lazy step may activate.
#[derive(Debug, Clone, Copy)]
enum Activation<'a> {
    /// Only the part hinted for this class.
    Hinted(&'a str),
    /// Pending groups in declaration order.
    Any,
}

/// Class and resource resolution for one launch descriptor.
pub struct BundleLoader {
    id: Uuid,
    descriptor: LaunchDescriptor,
    fetcher: Arc<dyn ResourceFetcher>,
    parent: Option<Arc<dyn ParentResolver>>,
    settings: LoaderSettings,
    security: SecurityDescriptor,
    peers: Vec<Arc<BundleLoader>>,
    pool: Mutex<ActivationPool>,
    search_path: RwLock<Vec<AttachedBundle>>,
    code_sources: RwLock<HashMap<Url, CodeSource>>,
    defined: RwLock<HashMap<String, LoadedClass>>,
    indexes: RwLock<Vec<IndexRecord>>,
    native_dirs: RwLock<Vec<PathBuf>>,
    codebase: CodebaseFallback,
    stager: NativeCodeStager,
    activations: AtomicUsize,
    destroyed: AtomicBool,
}

impl BundleLoader {
    /// Build a loader for `descriptor` whose peers are `peers`.
    ///
    /// Fetches and verifies the initial bundles, resolves permissions
    /// (prompting where policy asks), attaches the initial bundles and
    /// activates parts until the main class is found.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::FetchFailure`] if an initial bundle cannot be
    /// fetched or read, and [`LaunchError::SecurityViolation`] if permission
    /// resolution rejects the launch.
    pub fn new(
        descriptor: LaunchDescriptor,
        env: &LoaderEnvironment,
        peers: Vec<Arc<BundleLoader>>,
    ) -> LaunchResult<Self> {
        let settings = env.settings.clone();
        let initial = initial_bundles(&descriptor, settings.strict);
        let is_initial = |bundle: &BundleDescriptor| {
            initial.iter().any(|i| i.location() == bundle.location())
        };

        let mut fetched = Vec::new();
        for bundle in &descriptor.bundles {
            if settings.verify_scope == VerifyScope::All || is_initial(bundle) {
                fetched.push(fetch_bundle(
                    env.fetcher.as_ref(),
                    bundle.location(),
                    bundle.version(),
                    FetchPolicy::Cached,
                    &settings,
                )?);
            }
        }
        for bundle in descriptor.bundles.iter().filter(|b| !is_initial(b)) {
            env.fetcher.prefetch(bundle.location(), bundle.version());
        }

        let report = classify(
            fetched
                .iter()
                .map(|f| (f.location.clone(), f.signing.clone()))
                .collect(),
        );
        let security =
            PermissionResolver::new(&env.policy, env.prompt.as_ref()).resolve(&descriptor, &report)?;

        let mut pool =
            ActivationPool::new(descriptor.bundles.iter().filter(|b| !is_initial(b)).cloned());
        for bundle in &initial {
            pool.claim(bundle.location());
        }

        let loader = Self {
            id: Uuid::new_v4(),
            fetcher: Arc::clone(&env.fetcher),
            parent: env.parent.clone(),
            stager: NativeCodeStager::new(
                settings.native_suffixes.clone(),
                settings.scratch_root.clone(),
            ),
            settings,
            security,
            peers,
            pool: Mutex::new(pool),
            search_path: RwLock::new(Vec::new()),
            code_sources: RwLock::new(HashMap::new()),
            defined: RwLock::new(HashMap::new()),
            indexes: RwLock::new(Vec::new()),
            native_dirs: RwLock::new(Vec::new()),
            codebase: CodebaseFallback::new(),
            activations: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            descriptor,
        };

        for bundle in fetched.into_iter().filter(|f| {
            initial.iter().any(|i| i.location() == &f.location)
        }) {
            loader.attach(bundle)?;
        }

        if let Some(main) = loader.descriptor.main_class.clone() {
            loader.find_main_class(&main)?;
        }
        if loader.settings.enable_codebase {
            loader.enable_codebase()?;
        }

        info!(
            loader = %loader.id,
            descriptor = %loader.descriptor.source,
            key = %loader.descriptor.key,
            trust = %loader.security.trust_state(),
            level = %loader.security.level(),
            attached = loader.search_path().len(),
            pending = loader.pool_len(),
            "Bundle loader created"
        );
        Ok(loader)
    }

    /// Resolve dotted class `name` through [`CLASS_STAGES`].
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::ClassNotFound`] when every stage misses, and
    /// [`LaunchError::Internal`] on a poisoned lock.
    pub fn resolve_class(&self, name: &str) -> LaunchResult<LoadedClass> {
        let providers = self.providers();
        let path = class_path(name);
        for stage in CLASS_STAGES {
            if let Some(class) = self.class_stage(stage, name, &path, &providers)? {
                debug!(loader = %self.id, class = name, stage = ?stage, "Class resolved");
                self.defined
                    .write()
                    .map_err(lock_poisoned)?
                    .entry(name.to_owned())
                    .or_insert_with(|| class.clone());
                return Ok(class);
            }
        }
        debug!(loader = %self.id, class = name, "Class not found");
        Err(LaunchError::ClassNotFound {
            name: name.to_owned(),
        })
    }

    fn class_stage(
        &self,
        stage: Stage,
        name: &str,
        path: &str,
        providers: &[&BundleLoader],
    ) -> LaunchResult<Option<LoadedClass>> {
        let found = |hit: Hit| LoadedClass {
            name: name.to_owned(),
            bytes: hit.bytes,
            source: Some(hit.source),
        };
        match stage {
            Stage::Defined => {
                for provider in providers {
                    let defined = provider.defined.read().map_err(lock_poisoned)?;
                    if let Some(class) = defined.get(name) {
                        return Ok(Some(class.clone()));
                    }
                }
                Ok(None)
            },
            Stage::Parent => Ok(self
                .parent
                .as_ref()
                .and_then(|parent| parent.find_class(name))
                .map(|bytes| LoadedClass {
                    name: name.to_owned(),
                    bytes: Arc::from(bytes),
                    source: None,
                })),
            Stage::SearchPath => Ok(attached_in(providers, path)?.map(found)),
            Stage::Codebase => Ok(self.codebase_in(providers, path).map(found)),
            Stage::Lazy => Ok(lazy_in(providers, path, Some(name))?.map(found)),
            Stage::Index => {
                for provider in providers {
                    if let Some(hit) = provider.activate_from_index(path)? {
                        return Ok(Some(found(hit)));
                    }
                }
                Ok(None)
            },
        }
    }

    /// Resolve resource `name` through [`RESOURCE_STAGES`].
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Internal`] on a poisoned lock.
    pub fn resolve_resource(&self, name: &str) -> LaunchResult<Option<Resource>> {
        let providers = self.providers();
        for stage in RESOURCE_STAGES {
            let hit = match stage {
                Stage::Parent => {
                    if let Some(bytes) = self.parent.as_ref().and_then(|p| p.find_resource(name)) {
                        return Ok(Some(Resource {
                            name: name.to_owned(),
                            bytes: Arc::from(bytes),
                            location: None,
                        }));
                    }
                    None
                },
                Stage::SearchPath => attached_in(&providers, name)?,
                Stage::Lazy => lazy_in(&providers, name, None)?,
                Stage::Codebase => self.codebase_in(&providers, name),
                Stage::Defined | Stage::Index => None,
            };
            if let Some(hit) = hit {
                return Ok(Some(Resource {
                    name: name.to_owned(),
                    bytes: hit.bytes,
                    location: Some(hit.source.location),
                }));
            }
        }
        Ok(None)
    }

    /// Every copy of resource `name` visible without activation: the
    /// parent's, then each attached bundle's. The codebase is consulted only
    /// when nothing else has it.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Internal`] on a poisoned lock.
    pub fn resolve_resources(&self, name: &str) -> LaunchResult<Vec<Resource>> {
        let mut found = Vec::new();
        if let Some(bytes) = self.parent.as_ref().and_then(|p| p.find_resource(name)) {
            found.push(Resource {
                name: name.to_owned(),
                bytes: Arc::from(bytes),
                location: None,
            });
        }
        for provider in self.providers() {
            let search_path = provider.search_path.read().map_err(lock_poisoned)?;
            for bundle in search_path.iter() {
                if let Some(bytes) = bundle.archive.get(name)
                    && !found.iter().any(|r| r.location.as_ref() == Some(&bundle.location))
                {
                    found.push(Resource {
                        name: name.to_owned(),
                        bytes: Arc::clone(bytes),
                        location: Some(bundle.location.clone()),
                    });
                }
            }
        }
        if found.is_empty()
            && let Some(hit) = self.codebase_in(&self.providers(), name)
        {
            found.push(Resource {
                name: name.to_owned(),
                bytes: hit.bytes,
                location: Some(hit.source.location),
            });
        }
        Ok(found)
    }

    /// This loader followed by its peers, depth-first, without repeats.
    fn providers(&self) -> Vec<&BundleLoader> {
        let mut providers = Vec::new();
        self.collect_providers(&mut providers);
        providers
    }

    fn collect_providers<'a>(&'a self, providers: &mut Vec<&'a BundleLoader>) {
        if providers.iter().any(|p| p.id == self.id) {
            return;
        }
        providers.push(self);
        for peer in &self.peers {
            peer.collect_providers(providers);
        }
    }

    fn find_attached(&self, path: &str) -> LaunchResult<Option<Hit>> {
        let search_path = self.search_path.read().map_err(lock_poisoned)?;
        Ok(search_path.iter().find_map(|bundle| {
            bundle.archive.get(path).map(|bytes| Hit {
                bytes: Arc::clone(bytes),
                source: bundle.source.clone(),
            })
        }))
    }

    fn is_attached(&self, location: &Url) -> LaunchResult<bool> {
        Ok(self
            .search_path
            .read()
            .map_err(lock_poisoned)?
            .iter()
            .any(|b| &b.location == location))
    }

    fn codebase_in(&self, providers: &[&BundleLoader], path: &str) -> Option<Hit> {
        providers.iter().find_map(|provider| {
            provider
                .codebase
                .find(self.fetcher.as_ref(), path)
                .map(|(location, bytes)| Hit {
                    bytes: Arc::from(bytes),
                    source: CodeSource::sandboxed(location),
                })
        })
    }

    /// Activate pending groups until `path` is attached or nothing is left.
    ///
    /// The pool lock is held for the whole sequence. Waiters re-check the
    /// search path before activating anything themselves.
    fn activate_until(&self, path: &str, mode: Activation<'_>) -> LaunchResult<Option<Hit>> {
        let mut pool = self.pool.lock().map_err(lock_poisoned)?;
        loop {
            if let Some(hit) = self.find_attached(path)? {
                return Ok(Some(hit));
            }
            let group = match mode {
                Activation::Hinted(class) => match self.descriptor.hinted_part(class) {
                    Some(part) => pool.take_part(part),
                    None => Vec::new(),
                },
                Activation::Any => pool.pop_group(),
            };
            if group.is_empty() {
                return Ok(None);
            }
            self.activate_group(&group);
        }
    }

    /// Fetch and attach one group. A failed fetch aborts the whole group,
    /// which stays consumed.
    fn activate_group(&self, group: &[BundleDescriptor]) {
        self.activations.fetch_add(1, Ordering::SeqCst);
        let part = group.first().and_then(BundleDescriptor::part);
        info!(
            loader = %self.id,
            part = part.map(PartTag::as_str),
            bundles = group.len(),
            "Activating bundle group"
        );

        let mut fetched = Vec::with_capacity(group.len());
        for bundle in group {
            match fetch_bundle(
                self.fetcher.as_ref(),
                bundle.location(),
                bundle.version(),
                FetchPolicy::Cached,
                &self.settings,
            ) {
                Ok(f) => fetched.push(f),
                Err(e) => {
                    error!(
                        loader = %self.id,
                        bundle = %bundle.location(),
                        error = %e,
                        "Activation aborted, group will not be retried"
                    );
                    return;
                },
            }
        }
        for bundle in fetched {
            let location = bundle.location.clone();
            if let Err(e) = self.attach(bundle) {
                error!(loader = %self.id, bundle = %location, error = %e, "Failed to attach bundle");
            }
        }
    }

    /// Fetch bundles named by attached indexes for `path`, uncached.
    fn activate_from_index(&self, path: &str) -> LaunchResult<Option<Hit>> {
        let candidates: Vec<Url> = self
            .indexes
            .read()
            .map_err(lock_poisoned)?
            .iter()
            .flat_map(|record| {
                record
                    .index
                    .lookup(path)
                    .into_iter()
                    .filter_map(|name| record.base.join(name).ok())
            })
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut pool = self.pool.lock().map_err(lock_poisoned)?;
        for location in candidates {
            if self.is_attached(&location)? || !pool.claim(&location) {
                continue;
            }
            debug!(loader = %self.id, bundle = %location, entry = path, "Fetching indexed bundle");
            match fetch_bundle(
                self.fetcher.as_ref(),
                &location,
                None,
                FetchPolicy::Uncached,
                &self.settings,
            ) {
                Ok(bundle) => {
                    self.activations.fetch_add(1, Ordering::SeqCst);
                    self.attach(bundle)?;
                },
                Err(e) => {
                    warn!(loader = %self.id, bundle = %location, error = %e, "Indexed bundle unavailable");
                    continue;
                },
            }
            if let Some(hit) = self.find_attached(path)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Put a fetched bundle (and any bundles nested in it) on the search path.
    fn attach(&self, bundle: Fetched) -> LaunchResult<()> {
        let level = self.security.level_for(&bundle.signing);
        let source = CodeSource {
            location: bundle.location.clone(),
            signing: bundle.signing,
            level,
        };
        grant_read(&self.security, &bundle.local);
        self.stager.stage(&bundle.location, &bundle.archive);

        match bundle.archive.index() {
            Ok(Some(index)) => self.indexes.write().map_err(lock_poisoned)?.push(IndexRecord {
                base: bundle.location.clone(),
                index,
            }),
            Ok(None) => {},
            Err(e) => warn!(bundle = %bundle.location, error = %e, "Ignoring bundle index"),
        }

        let mut attached = Vec::new();
        if self.settings.nested_bundles {
            for inner in nested::expand(
                &bundle.location,
                &bundle.local,
                &bundle.archive,
                self.settings.limits,
            ) {
                grant_read(&self.security, &inner.local);
                self.stager.stage(&inner.location, &inner.archive);
                attached.push(AttachedBundle {
                    source: source.relocated(inner.location.clone()),
                    location: inner.location,
                    archive: Arc::new(inner.archive),
                });
            }
        }
        attached.insert(
            0,
            AttachedBundle {
                location: bundle.location,
                archive: Arc::new(bundle.archive),
                source,
            },
        );

        let mut search_path = self.search_path.write().map_err(lock_poisoned)?;
        let mut code_sources = self.code_sources.write().map_err(lock_poisoned)?;
        for entry in attached {
            debug!(
                loader = %self.id,
                bundle = %entry.location,
                level = %entry.source.level,
                "Bundle attached"
            );
            code_sources.insert(entry.location.clone(), entry.source.clone());
            search_path.push(entry);
        }
        Ok(())
    }

    fn find_main_class(&self, main: &str) -> LaunchResult<()> {
        let path = class_path(main);
        let found = self.find_attached(&path)?.is_some()
            || self.activate_until(&path, Activation::Hinted(main))?.is_some()
            || self.activate_until(&path, Activation::Any)?.is_some();
        if !found {
            warn!(loader = %self.id, main_class = main, "Main class not found in any bundle");
        }
        Ok(())
    }

    /// Register the descriptor's codebase as a fallback.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Internal`] on a poisoned lock.
    pub fn enable_codebase(&self) -> LaunchResult<bool> {
        self.codebase.enable(self.descriptor.codebase.clone())
    }

    /// Import `source`'s attached bundles, native directories, codebases and
    /// code sources. Repeated merges add nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::SecurityViolation`] with
    /// [`ViolationKind::UntrustedCaller`] unless `caller` is fully trusted.
    pub fn merge(&self, source: &BundleLoader, caller: &CallerContext) -> LaunchResult<()> {
        if !caller.is_fully_trusted() {
            return Err(LaunchError::violation(
                ViolationKind::UntrustedCaller,
                "only fully trusted callers may merge loaders",
            ));
        }
        if source.id == self.id {
            return Ok(());
        }

        // Never hold a lock on `self` while locking `source`.
        let imported = source.search_path.read().map_err(lock_poisoned)?.clone();
        let imported_sources = source.code_sources.read().map_err(lock_poisoned)?.clone();
        let imported_dirs = source.native_directories();
        let imported_bases = source.codebase.bases();
        let mut added: usize = 0;
        {
            let mut search_path = self.search_path.write().map_err(lock_poisoned)?;
            for bundle in imported {
                if !search_path.iter().any(|b| b.location == bundle.location) {
                    search_path.push(bundle);
                    added = added.saturating_add(1);
                }
            }
            let mut code_sources = self.code_sources.write().map_err(lock_poisoned)?;
            for (location, code_source) in imported_sources {
                code_sources.entry(location).or_insert(code_source);
            }
        }

        let own = self.stager.directory();
        {
            let mut native_dirs = self.native_dirs.write().map_err(lock_poisoned)?;
            for dir in imported_dirs {
                if own.as_ref() != Some(&dir) && !native_dirs.contains(&dir) {
                    native_dirs.push(dir);
                }
            }
        }

        for base in imported_bases {
            self.codebase.enable(base)?;
        }
        if self.settings.enable_codebase {
            self.codebase.enable(source.descriptor.codebase.clone())?;
        }

        info!(
            loader = %self.id,
            source = %source.id,
            bundles = added,
            "Merged loader"
        );
        Ok(())
    }

    /// Path of staged native library `name`, searching own then imported
    /// directories, then peers.
    #[must_use]
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        let file = library_file_name(name);
        self.providers().into_iter().find_map(|provider| {
            provider.native_directories().into_iter().find_map(|dir| {
                let path = dir.join(&file);
                path.is_file().then_some(path)
            })
        })
    }

    /// Own scratch directory (if created) followed by imported ones.
    #[must_use]
    pub fn native_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.stager.directory().into_iter().collect();
        dirs.extend(
            self.native_dirs
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned(),
        );
        dirs
    }

    /// Code source recorded for an attached bundle.
    #[must_use]
    pub fn code_source(&self, location: &Url) -> Option<CodeSource> {
        self.code_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
    }

    /// Permissions held by code from the bundle at `location`.
    ///
    /// Code running at the loader's level gets the effective set; anything
    /// else gets the baseline of its own level.
    #[must_use]
    pub fn permissions_for(&self, location: &Url) -> Vec<Permission> {
        let level = self
            .code_source(location)
            .map_or(SecurityLevel::Sandbox, |source| source.level);
        if level == self.security.level() {
            self.security.effective().to_vec()
        } else {
            baseline::for_level(level, self.security.origin())
        }
    }

    /// Live view of `baseline ∪ grants`.
    #[must_use]
    pub fn effective_permissions(&self) -> EffectivePermissions<'_> {
        self.security.effective()
    }

    /// Append a runtime grant. Returns `false` if it was already held.
    pub fn add_permission(&self, permission: Permission) -> bool {
        self.security.grant(permission)
    }

    /// Release the native scratch directory. Later calls do nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stager.destroy();
        info!(loader = %self.id, "Bundle loader destroyed");
    }

    /// Whether [`BundleLoader::destroy`] has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Unique identifier of this loader.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The descriptor this loader was built from.
    #[must_use]
    pub fn descriptor(&self) -> &LaunchDescriptor {
        &self.descriptor
    }

    /// The frozen security context.
    #[must_use]
    pub fn security(&self) -> &SecurityDescriptor {
        &self.security
    }

    /// Trust state computed at construction.
    #[must_use]
    pub fn trust_state(&self) -> TrustState {
        self.security.trust_state()
    }

    /// Peer loaders in declaration order.
    #[must_use]
    pub fn peers(&self) -> &[Arc<BundleLoader>] {
        &self.peers
    }

    /// Number of bundles still pending activation.
    #[must_use]
    pub fn pool_len(&self) -> usize {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Locations on the search path, in attach order.
    #[must_use]
    pub fn search_path(&self) -> Vec<Url> {
        self.search_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|b| b.location.clone())
            .collect()
    }

    /// Number of group activations and index fetches so far.
    #[must_use]
    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for BundleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleLoader")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor.source.as_str())
            .field("level", &self.security.level())
            .field("trust", &self.security.trust_state())
            .field("peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}

/// First attached entry for `path` across `providers`.
fn attached_in(providers: &[&BundleLoader], path: &str) -> LaunchResult<Option<Hit>> {
    for provider in providers {
        if let Some(hit) = provider.find_attached(path)? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

/// Lazy step across `providers`: hinted parts first, then declaration order.
fn lazy_in(
    providers: &[&BundleLoader],
    path: &str,
    class: Option<&str>,
) -> LaunchResult<Option<Hit>> {
    if let Some(class) = class {
        for provider in providers {
            if let Some(hit) = provider.activate_until(path, Activation::Hinted(class))? {
                return Ok(Some(hit));
            }
        }
    }
    for provider in providers {
        if let Some(hit) = provider.activate_until(path, Activation::Any)? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

/// Eager and main bundles, or the first bundle if there are none. Strict
/// mode adds every bundle sharing a part with them.
#[must_use]
pub fn initial_bundles(descriptor: &LaunchDescriptor, strict: bool) -> Vec<BundleDescriptor> {
    let mut initial: Vec<&BundleDescriptor> = descriptor
        .bundles
        .iter()
        .filter(|b| b.is_eager() || b.is_main())
        .collect();
    if initial.is_empty()
        && let Some(first) = descriptor.bundles.first()
    {
        initial.push(first);
    }
    if strict {
        let parts: Vec<_> = initial.iter().filter_map(|b| b.part()).collect();
        initial = descriptor
            .bundles
            .iter()
            .filter(|b| {
                initial.iter().any(|i| i.location() == b.location())
                    || b.part().is_some_and(|p| parts.contains(&p))
            })
            .collect();
    }
    initial.into_iter().cloned().collect()
}

fn fetch_bundle(
    fetcher: &dyn ResourceFetcher,
    location: &Url,
    version: Option<&VersionConstraint>,
    policy: FetchPolicy,
    settings: &LoaderSettings,
) -> LaunchResult<Fetched> {
    let local = fetcher.fetch(location, version, policy)?;
    let archive = BundleArchive::open(&local, settings.limits)
        .map_err(|e| LaunchError::fetch(location, e.to_string()))?;
    let signing = if settings.verify_signatures {
        SignatureVerifier::inspect(&archive)
    } else {
        BundleSigning::Unsigned
    };
    Ok(Fetched {
        location: location.clone(),
        local,
        archive,
        signing,
    })
}

fn grant_read(security: &SecurityDescriptor, local: &Path) {
    security.grant(Permission::FileRead(local.display().to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlaunch_bundle::BundleBuilder;
    use netlaunch_core::{DescriptorSource, PackageHint, TrustPrompt};
    use netlaunch_test::{
        BundleFixture, MockDescriptorSource, MockFetcher, MockParent, MockTrustPrompt,
        TestPublisher, class_bytes,
    };

    const CODEBASE: &str = "https://apps.example.com/editor/";

    fn env(fixture: &BundleFixture, prompt: Arc<MockTrustPrompt>) -> LoaderEnvironment {
        let descriptors: Arc<dyn DescriptorSource> = Arc::new(MockDescriptorSource::new());
        let prompt: Arc<dyn TrustPrompt> = prompt;
        LoaderEnvironment::new(fixture.fetcher(), prompt, descriptors)
    }

    fn descriptor(fixture: &BundleFixture) -> LaunchDescriptor {
        LaunchDescriptor::new(fixture.url("editor.jnlp"), "editor", fixture.codebase().clone())
    }

    fn unsigned_loader(fixture: &BundleFixture, descriptor: LaunchDescriptor) -> BundleLoader {
        BundleLoader::new(descriptor, &env(fixture, Arc::new(MockTrustPrompt::declining())), Vec::new())
            .unwrap()
    }

    #[test]
    fn test_initial_bundles() {
        let fixture = BundleFixture::new(CODEBASE);
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::lazy(fixture.url("a.jar")).with_part("p"))
            .with_bundle(BundleDescriptor::eager(fixture.url("main.jar")).with_part("p"))
            .with_bundle(BundleDescriptor::lazy(fixture.url("b.jar")));

        let lenient = initial_bundles(&d, false);
        assert_eq!(lenient.len(), 1);
        assert_eq!(lenient[0].location(), &fixture.url("main.jar"));

        let strict = initial_bundles(&d, true);
        assert_eq!(strict.len(), 2);

        let lazy_only = descriptor(&fixture)
            .with_bundle(BundleDescriptor::lazy(fixture.url("x.jar")))
            .with_bundle(BundleDescriptor::lazy(fixture.url("y.jar")));
        let first = initial_bundles(&lazy_only, false);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].location(), &fixture.url("x.jar"));
        assert!(initial_bundles(&descriptor(&fixture), true).is_empty());
    }

    #[test]
    fn test_construction_attaches_initial_and_prefetches_rest() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let spell = fixture.unsigned("spell.jar", &["com.editor.spell.Checker"]);
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::eager(main.clone()).as_main())
            .with_bundle(BundleDescriptor::lazy(spell.clone()).with_part("spell"))
            .with_main_class("com.editor.Main");

        let loader = unsigned_loader(&fixture, d);
        assert_eq!(loader.search_path(), vec![main]);
        assert_eq!(loader.pool_len(), 1);
        assert_eq!(loader.activation_count(), 0);
        assert_eq!(fixture.fetcher().prefetched(), vec![spell.clone()]);
        assert_eq!(fixture.fetcher().fetch_count(&spell), 0);
        assert_eq!(loader.trust_state(), TrustState::None);
    }

    #[test]
    fn test_missing_initial_bundle_is_fatal() {
        let fixture = BundleFixture::new(CODEBASE);
        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(fixture.url("gone.jar")));
        let result =
            BundleLoader::new(d, &env(&fixture, Arc::new(MockTrustPrompt::declining())), Vec::new());
        assert!(matches!(result, Err(LaunchError::FetchFailure { .. })));
    }

    #[test]
    fn test_lazy_activation_uses_hints() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let p1 = fixture.unsigned("p1.jar", &["com.editor.one.A"]);
        let p2 = fixture.unsigned("p2.jar", &["com.editor.two.B"]);
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::eager(main))
            .with_bundle(BundleDescriptor::lazy(p1.clone()).with_part("one"))
            .with_bundle(BundleDescriptor::lazy(p2.clone()).with_part("two"))
            .with_package(PackageHint::new("com.editor.one.*", "one"))
            .with_package(PackageHint::new("com.editor.two.*", "two"));
        let loader = unsigned_loader(&fixture, d);

        let class = loader.resolve_class("com.editor.two.B").unwrap();
        assert_eq!(class.location(), Some(&p2));
        assert_eq!(&*class.bytes, class_bytes("com.editor.two.B").as_slice());
        assert_eq!(loader.activation_count(), 1);
        assert_eq!(fixture.fetcher().fetch_count(&p1), 0);

        loader.resolve_class("com.editor.two.B").unwrap();
        assert_eq!(loader.activation_count(), 1);
    }

    #[test]
    fn test_lazy_activation_without_hints_walks_declaration_order() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let p1 = fixture.unsigned("p1.jar", &["com.editor.one.A"]);
        let p2 = fixture.unsigned("p2.jar", &["com.editor.two.B"]);
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::eager(main))
            .with_bundle(BundleDescriptor::lazy(p1).with_part("one"))
            .with_bundle(BundleDescriptor::lazy(p2).with_part("two"));
        let loader = unsigned_loader(&fixture, d);

        loader.resolve_class("com.editor.two.B").unwrap();
        assert_eq!(loader.activation_count(), 2);
        assert_eq!(loader.pool_len(), 0);
        assert!(matches!(
            loader.resolve_class("com.editor.Missing"),
            Err(LaunchError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn test_failed_activation_consumes_group() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let broken = fixture.unsigned("broken.jar", &["com.editor.x.X"]);
        fixture.fetcher().fail(broken.clone());
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::eager(main))
            .with_bundle(BundleDescriptor::lazy(broken.clone()).with_part("x"));
        let loader = unsigned_loader(&fixture, d);

        assert!(matches!(
            loader.resolve_class("com.editor.x.X"),
            Err(LaunchError::ClassNotFound { .. })
        ));
        assert!(loader.resolve_class("com.editor.Main").is_ok());
        assert!(loader.resolve_class("com.editor.x.X").is_err());
        assert_eq!(fixture.fetcher().fetch_count(&broken), 1);
    }

    #[test]
    fn test_parent_is_consulted_before_bundles() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main", "java.util.List"]);
        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(main));
        let env = env(&fixture, Arc::new(MockTrustPrompt::declining()))
            .with_parent(Arc::new(MockParent::new().with_class("java.util.List", b"platform".to_vec())));
        let loader = BundleLoader::new(d, &env, Vec::new()).unwrap();

        let list = loader.resolve_class("java.util.List").unwrap();
        assert!(list.is_from_parent());
        assert_eq!(&*list.bytes, b"platform");
        assert!(!loader.resolve_class("com.editor.Main").unwrap().is_from_parent());
    }

    #[test]
    fn test_index_fetches_uncached_once() {
        let fixture = BundleFixture::new(CODEBASE);
        let extra = fixture.unsigned("lib/extra.jar", &["com.extra.Tool"]);
        let main = fixture.write(
            "main.jar",
            &BundleBuilder::new()
                .class("com.editor.Main", class_bytes("com.editor.Main"))
                .index_entry("lib/extra.jar", &["com/extra"]),
        );
        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(main));
        let loader = unsigned_loader(&fixture, d);

        let tool = loader.resolve_class("com.extra.Tool").unwrap();
        assert_eq!(tool.location(), Some(&extra));
        let log = fixture.fetcher().fetch_log();
        assert!(log.contains(&(extra.clone(), FetchPolicy::Uncached)));

        assert!(loader.resolve_class("com.extra.Missing").is_err());
        assert_eq!(fixture.fetcher().fetch_count(&extra), 1);
    }

    #[test]
    fn test_resources_skip_index_and_use_codebase_last() {
        let fixture = BundleFixture::new(CODEBASE);
        let _extra = fixture.write(
            "lib/extra.jar",
            &BundleBuilder::new().entry("com/extra/logo.png", b"png".to_vec()),
        );
        let main = fixture.write(
            "main.jar",
            &BundleBuilder::new()
                .entry("config/app.toml", b"bundled".to_vec())
                .index_entry("lib/extra.jar", &["com/extra"]),
        );
        let loose = fixture.path("loose.txt");
        std::fs::write(&loose, b"from codebase").unwrap();
        fixture.fetcher().serve(fixture.url("docs/readme.txt"), &loose);

        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(main.clone()));
        let loader = unsigned_loader(&fixture, d);
        loader.enable_codebase().unwrap();

        let bundled = loader.resolve_resource("config/app.toml").unwrap().unwrap();
        assert_eq!(bundled.location, Some(main));
        assert!(loader.resolve_resource("com/extra/logo.png").unwrap().is_none());

        let remote = loader.resolve_resource("docs/readme.txt").unwrap().unwrap();
        assert_eq!(&*remote.bytes, b"from codebase");
        assert_eq!(loader.resolve_resources("docs/readme.txt").unwrap().len(), 1);
    }

    #[test]
    fn test_codebase_classes_are_sandboxed() {
        let fixture = BundleFixture::new(CODEBASE);
        let publisher = TestPublisher::new();
        let main = fixture.signed("main.jar", &publisher, &["com.editor.Main"]);
        let loose = fixture.path("Loose.class");
        std::fs::write(&loose, b"loose").unwrap();
        fixture.fetcher().serve(fixture.url("com/editor/Loose.class"), &loose);

        let d = descriptor(&fixture)
            .with_security(SecurityLevel::Full)
            .with_bundle(BundleDescriptor::eager(main));
        let mut env = env(&fixture, Arc::new(MockTrustPrompt::declining()));
        env.settings.enable_codebase = true;
        let loader = BundleLoader::new(d, &env, Vec::new()).unwrap();

        let class = loader.resolve_class("com.editor.Loose").unwrap();
        assert_eq!(class.level(), SecurityLevel::Sandbox);
        assert_eq!(loader.trust_state(), TrustState::Full);
        assert_eq!(
            loader.resolve_class("com.editor.Main").unwrap().level(),
            SecurityLevel::Full
        );
    }

    #[test]
    fn test_nested_bundles_inherit_code_source() {
        let fixture = BundleFixture::new(CODEBASE);
        let inner = BundleBuilder::new()
            .class("com.inner.Helper", class_bytes("com.inner.Helper"))
            .to_bytes()
            .unwrap();
        let main = fixture.write(
            "main.jar",
            &BundleBuilder::new()
                .class("com.editor.Main", class_bytes("com.editor.Main"))
                .entry("lib/inner.jar", inner),
        );
        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(main.clone()));
        let loader = unsigned_loader(&fixture, d);

        let helper = loader.resolve_class("com.inner.Helper").unwrap();
        let nested = Url::parse(&format!("{main}!/lib/inner.jar")).unwrap();
        assert_eq!(helper.location(), Some(&nested));
        assert_eq!(
            loader.code_source(&nested).map(|s| s.level),
            loader.code_source(&main).map(|s| s.level)
        );
        assert_eq!(loader.activation_count(), 0);
    }

    #[test]
    fn test_natives_staged_and_destroyed() {
        let fixture = BundleFixture::new(CODEBASE);
        let lib = library_file_name("codec");
        let main = fixture.write(
            "main.jar",
            &BundleBuilder::new()
                .class("com.editor.Main", class_bytes("com.editor.Main"))
                .entry(format!("native/{lib}"), b"ELF".to_vec()),
        );
        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(main).as_native());
        let loader = unsigned_loader(&fixture, d);

        let path = loader.find_library("codec").unwrap();
        assert!(path.is_file());
        loader.destroy();
        loader.destroy();
        assert!(loader.is_destroyed());
        assert!(!path.exists());
        assert!(loader.find_library("codec").is_none());
    }

    #[test]
    fn test_attach_grants_read_access() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let d = descriptor(&fixture).with_bundle(BundleDescriptor::eager(main));
        let loader = unsigned_loader(&fixture, d);
        let local = fixture.path("main.jar").display().to_string();
        assert!(
            loader
                .effective_permissions()
                .implies(&Permission::FileRead(local))
        );
    }

    #[test]
    fn test_lazy_activation_while_permission_view_is_held() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let extra = fixture.unsigned("extra.jar", &["com.editor.extra.X"]);
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::eager(main))
            .with_bundle(BundleDescriptor::lazy(extra).with_part("extra"));
        let loader = unsigned_loader(&fixture, d);

        let view = loader.effective_permissions();
        let before = view.len();
        loader.resolve_class("com.editor.extra.X").unwrap();

        let local = fixture.path("extra.jar").display().to_string();
        assert!(view.implies(&Permission::FileRead(local)));
        assert_eq!(view.len(), before.saturating_add(1));
    }

    #[test]
    fn test_opposite_merges_run_concurrently() {
        let fixture = BundleFixture::new(CODEBASE);
        let a = fixture.unsigned("a.jar", &["com.a.A"]);
        let b = fixture.unsigned("b.jar", &["com.b.B"]);
        let left = Arc::new(unsigned_loader(
            &fixture,
            descriptor(&fixture).with_bundle(BundleDescriptor::eager(a)),
        ));
        let right = Arc::new(unsigned_loader(
            &fixture,
            LaunchDescriptor::new(fixture.url("other.jnlp"), "editor", fixture.codebase().clone())
                .with_bundle(BundleDescriptor::eager(b)),
        ));

        let handles: Vec<_> = [(Arc::clone(&left), Arc::clone(&right)), (right, left)]
            .into_iter()
            .map(|(target, source)| {
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        target.merge(&source, &CallerContext::System).unwrap();
                    }
                    target
                })
            })
            .collect();
        for handle in handles {
            let target = handle.join().unwrap();
            assert_eq!(target.search_path().len(), 2);
            assert!(target.resolve_class("com.a.A").is_ok());
            assert!(target.resolve_class("com.b.B").is_ok());
        }
    }

    #[test]
    fn test_merge_requires_trusted_caller_and_is_idempotent() {
        let fixture = BundleFixture::new(CODEBASE);
        let a = fixture.unsigned("a.jar", &["com.a.A"]);
        let b = fixture.unsigned("b.jar", &["com.b.B"]);
        let target = unsigned_loader(&fixture, descriptor(&fixture).with_bundle(BundleDescriptor::eager(a)));
        let source = unsigned_loader(
            &fixture,
            LaunchDescriptor::new(fixture.url("other.jnlp"), "editor", fixture.codebase().clone())
                .with_bundle(BundleDescriptor::eager(b.clone())),
        );

        let sandboxed = CallerContext::application("editor".into(), SecurityLevel::Sandbox);
        let denied = target.merge(&source, &sandboxed).unwrap_err();
        assert_eq!(denied.violation_kind(), Some(ViolationKind::UntrustedCaller));

        target.merge(&source, &CallerContext::System).unwrap();
        target.merge(&source, &CallerContext::System).unwrap();
        assert_eq!(target.search_path().len(), 2);
        assert!(target.code_source(&b).is_some());
        assert!(target.resolve_class("com.b.B").is_ok());
    }

    #[test]
    fn test_peers_are_searched_after_self() {
        let fixture = BundleFixture::new(CODEBASE);
        let ext = fixture.unsigned("ext.jar", &["com.ext.Plugin", "com.shared.Util"]);
        let main = fixture.unsigned("main.jar", &["com.editor.Main", "com.shared.Util"]);
        let peer = Arc::new(unsigned_loader(
            &fixture,
            LaunchDescriptor::new(fixture.url("ext.jnlp"), "editor", fixture.codebase().clone())
                .with_bundle(BundleDescriptor::eager(ext.clone())),
        ));
        let env = env(&fixture, Arc::new(MockTrustPrompt::declining()));
        let loader = BundleLoader::new(
            descriptor(&fixture).with_bundle(BundleDescriptor::eager(main.clone())),
            &env,
            vec![Arc::clone(&peer)],
        )
        .unwrap();

        assert_eq!(loader.resolve_class("com.shared.Util").unwrap().location(), Some(&main));
        assert_eq!(loader.resolve_class("com.ext.Plugin").unwrap().location(), Some(&ext));
        assert_eq!(loader.peers().len(), 1);
    }

    #[test]
    fn test_concurrent_resolution_activates_once() {
        let fixture = BundleFixture::new(CODEBASE);
        let main = fixture.unsigned("main.jar", &["com.editor.Main"]);
        let slow = fixture.unsigned("slow.jar", &["com.editor.slow.S"]);
        let fetcher = Arc::new(MockFetcher::new().with_delay(std::time::Duration::from_millis(20)));
        fetcher.serve(main.clone(), fixture.path("main.jar"));
        fetcher.serve(slow.clone(), fixture.path("slow.jar"));
        let env = LoaderEnvironment::new(
            fetcher,
            Arc::new(MockTrustPrompt::declining()),
            Arc::new(MockDescriptorSource::new()),
        );
        let d = descriptor(&fixture)
            .with_bundle(BundleDescriptor::eager(main))
            .with_bundle(BundleDescriptor::lazy(slow).with_part("slow"));
        let loader = Arc::new(BundleLoader::new(d, &env, Vec::new()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                std::thread::spawn(move || loader.resolve_class("com.editor.slow.S").is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(loader.activation_count(), 1);
    }

    #[test]
    fn test_stage_orders() {
        assert_eq!(CLASS_STAGES.first(), Some(&Stage::Defined));
        assert_eq!(CLASS_STAGES.last(), Some(&Stage::Index));
        assert!(!RESOURCE_STAGES.contains(&Stage::Index));
        assert_eq!(RESOURCE_STAGES.last(), Some(&Stage::Codebase));
    }
}
