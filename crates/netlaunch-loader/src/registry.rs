//! Cooperation-key to loader registry.
//!
//! One loader per [`CooperationKey`]. Entries are replaced (never evicted)
//! when a different descriptor joins a family, and the replacement imports
//! everything the previous loader had attached. Construction is
//! all-or-nothing: a failed launch restores the entry it started from.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use netlaunch_core::{
    CallerContext, CooperationKey, ExtensionRef, LaunchDescriptor, LaunchError, LaunchResult,
    SignerPromptReason, TrustRequest, TrustState, ViolationKind, lock_poisoned,
};
use netlaunch_crypto::PublisherId;
use netlaunch_telemetry::LaunchSpan;
use tracing::{debug, info, warn};
use url::Url;

use crate::environment::LoaderEnvironment;
use crate::loader::BundleLoader;

/// State threaded through one top-level construction and its extensions.
#[derive(Debug, Default)]
pub struct ConstructionScope {
    held: Vec<CooperationKey>,
    chain: Vec<Url>,
    downgrade: Option<bool>,
    span: Option<LaunchSpan>,
}

impl ConstructionScope {
    /// An empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys whose construction lock this scope holds.
    #[must_use]
    pub fn held(&self) -> &[CooperationKey] {
        &self.held
    }

    /// Descriptor locations currently under construction, outermost first.
    #[must_use]
    pub fn chain(&self) -> &[Url] {
        &self.chain
    }

    /// The answer to the downgrade prompt, once asked.
    #[must_use]
    pub fn downgrade_answer(&self) -> Option<bool> {
        self.downgrade
    }

    fn check_cycle(&self, location: &Url) -> LaunchResult<()> {
        if !self.chain.contains(location) {
            return Ok(());
        }
        let chain: Vec<String> = self
            .chain
            .iter()
            .chain(std::iter::once(location))
            .map(Url::to_string)
            .collect();
        warn!(chain = ?chain, "Extension cycle detected");
        Err(LaunchError::ExtensionCycle { chain })
    }
}

/// Loaders by cooperation key.
pub struct LoaderRegistry {
    env: LoaderEnvironment,
    entries: RwLock<HashMap<CooperationKey, Arc<BundleLoader>>>,
    key_locks: Mutex<HashMap<CooperationKey, Arc<Mutex<()>>>>,
}

impl LoaderRegistry {
    /// An empty registry building loaders from `env`.
    #[must_use]
    pub fn new(env: LoaderEnvironment) -> Self {
        Self {
            env,
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The environment loaders are built from.
    #[must_use]
    pub fn environment(&self) -> &LoaderEnvironment {
        &self.env
    }

    /// The loader for `descriptor`'s key, building (and merging) as needed.
    ///
    /// An entry whose descriptor equals `descriptor` is returned unchanged.
    /// Otherwise a new loader is built, extensions are resolved under the
    /// same key, the previous entry is merged in, and the new loader
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`ViolationKind::UntrustedCaller`] unless the thread's
    /// [`CallerContext`] is fully trusted, [`LaunchError::ExtensionCycle`]
    /// for self-referencing extensions, and any construction error. On error
    /// the entry for the key is left as it was.
    pub fn get_or_create(&self, descriptor: LaunchDescriptor) -> LaunchResult<Arc<BundleLoader>> {
        let mut scope = ConstructionScope::new();
        self.get_or_create_in(descriptor, &mut scope, &CallerContext::current())
    }

    /// [`LoaderRegistry::get_or_create`] within an existing scope, on behalf
    /// of an explicit `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`ViolationKind::UntrustedCaller`] unless `caller` is fully
    /// trusted. Otherwise see [`LoaderRegistry::get_or_create`].
    pub fn get_or_create_in(
        &self,
        descriptor: LaunchDescriptor,
        scope: &mut ConstructionScope,
        caller: &CallerContext,
    ) -> LaunchResult<Arc<BundleLoader>> {
        if !caller.is_fully_trusted() {
            return Err(LaunchError::violation(
                ViolationKind::UntrustedCaller,
                "only fully trusted callers may create loaders",
            ));
        }
        scope.check_cycle(&descriptor.source)?;
        let key = descriptor.key.clone();
        if scope.held.contains(&key) {
            return self.build(descriptor, scope, caller);
        }

        let lock = self.key_lock(&key)?;
        let _held = lock.lock().map_err(lock_poisoned)?;
        let snapshot = self.get(&key);
        scope.held.push(key.clone());
        let result = self.build(descriptor, scope, caller);
        scope.held.retain(|k| k != &key);

        if let Err(e) = &result {
            warn!(key = %key, error = %e, "Launch failed, restoring registry entry");
            let mut entries = self.entries.write().map_err(lock_poisoned)?;
            match snapshot {
                Some(previous) => entries.insert(key, previous),
                None => entries.remove(&key),
            };
        }
        result
    }

    fn build(
        &self,
        descriptor: LaunchDescriptor,
        scope: &mut ConstructionScope,
        caller: &CallerContext,
    ) -> LaunchResult<Arc<BundleLoader>> {
        let base = self.get(&descriptor.key);
        if let Some(existing) = &base
            && existing.descriptor() == &descriptor
        {
            debug!(key = %descriptor.key, loader = %existing.id(), "Reusing loader");
            return Ok(Arc::clone(existing));
        }

        let span = match &scope.span {
            Some(parent) => parent.child(descriptor.source.as_str()),
            None => LaunchSpan::new(descriptor.key.as_str(), descriptor.source.as_str()),
        };
        let _entered = span.clone().enter();
        let outer_span = scope.span.replace(span);
        scope.chain.push(descriptor.source.clone());

        let result = self.construct(descriptor, base, scope, caller);

        scope.chain.pop();
        scope.span = outer_span;
        result
    }

    fn construct(
        &self,
        descriptor: LaunchDescriptor,
        base: Option<Arc<BundleLoader>>,
        scope: &mut ConstructionScope,
        caller: &CallerContext,
    ) -> LaunchResult<Arc<BundleLoader>> {
        let key = descriptor.key.clone();
        let mut peers = Vec::with_capacity(descriptor.extensions.len());
        for extension in &descriptor.extensions {
            peers.push(self.extension(extension, &key, scope, caller)?);
        }

        let loader = Arc::new(BundleLoader::new(descriptor, &self.env, peers)?);

        let discovered = self.get(&key);
        let mut merged: Vec<uuid::Uuid> = vec![loader.id()];
        for other in [discovered, base].into_iter().flatten() {
            if merged.contains(&other.id()) {
                continue;
            }
            self.confirm_downgrade(&loader, &other, scope)?;
            loader.merge(&other, caller)?;
            merged.push(other.id());
        }

        self.entries
            .write()
            .map_err(lock_poisoned)?
            .insert(key.clone(), Arc::clone(&loader));
        info!(
            key = %key,
            loader = %loader.id(),
            descriptor = %loader.descriptor().source,
            merged = merged.len().saturating_sub(1),
            "Loader registered"
        );
        Ok(loader)
    }

    /// Resolve an extension under its parent's key.
    fn extension(
        &self,
        extension: &ExtensionRef,
        key: &CooperationKey,
        scope: &mut ConstructionScope,
        caller: &CallerContext,
    ) -> LaunchResult<Arc<BundleLoader>> {
        scope.check_cycle(&extension.location)?;
        if let Some(existing) = self.get(key)
            && existing.descriptor().source == extension.location
        {
            return Ok(existing);
        }
        let descriptor = self
            .env
            .descriptors
            .load(&extension.location, extension.version.as_ref(), key)?
            .rekeyed(key.clone());
        debug!(key = %key, extension = %extension.location, "Resolving extension");
        self.get_or_create_in(descriptor, scope, caller)
    }

    /// Ask once per construction before mixing a fully trusted loader with
    /// one that is not.
    fn confirm_downgrade(
        &self,
        loader: &BundleLoader,
        other: &BundleLoader,
        scope: &mut ConstructionScope,
    ) -> LaunchResult<()> {
        let full = |l: &BundleLoader| l.trust_state() == TrustState::Full;
        if full(loader) == full(other) {
            return Ok(());
        }
        let accepted = match scope.downgrade {
            Some(answer) => answer,
            None => {
                let signed = if full(loader) { loader } else { other };
                let request = TrustRequest::UntrustedSigner {
                    descriptor: loader.descriptor().source.clone(),
                    signer: signed
                        .security()
                        .signers()
                        .iter()
                        .next()
                        .map(PublisherId::to_hex),
                    reason: SignerPromptReason::MergeDowngrade,
                };
                let answer = self.env.prompt.confirm(&request);
                scope.downgrade = Some(answer);
                answer
            },
        };
        if accepted {
            Ok(())
        } else {
            Err(LaunchError::violation(
                ViolationKind::UntrustedSignerDeclined,
                format!(
                    "merging {} with {} loader was declined",
                    loader.descriptor().source,
                    other.trust_state()
                ),
            ))
        }
    }

    fn key_lock(&self, key: &CooperationKey) -> LaunchResult<Arc<Mutex<()>>> {
        let mut locks = self.key_locks.lock().map_err(lock_poisoned)?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    /// The loader registered for `key`.
    #[must_use]
    pub fn get(&self, key: &CooperationKey) -> Option<Arc<BundleLoader>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<CooperationKey> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Destroy every registered loader and its peers, and empty the registry.
    /// Returns how many entries were removed.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Internal`] on a poisoned lock.
    pub fn shutdown(&self) -> LaunchResult<usize> {
        let drained: Vec<_> = self
            .entries
            .write()
            .map_err(lock_poisoned)?
            .drain()
            .map(|(_, loader)| loader)
            .collect();
        for loader in &drained {
            loader.destroy();
            for peer in loader.peers() {
                peer.destroy();
            }
        }
        info!(loaders = drained.len(), "Loader registry shut down");
        Ok(drained.len())
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("keys", &self.keys())
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlaunch_core::{BundleDescriptor, SecurityLevel};
    use netlaunch_test::{BundleFixture, MockDescriptorSource, MockTrustPrompt, TestPublisher};

    const CODEBASE: &str = "https://apps.example.com/suite/";

    struct Harness {
        fixture: BundleFixture,
        prompt: Arc<MockTrustPrompt>,
        descriptors: Arc<MockDescriptorSource>,
        registry: LoaderRegistry,
    }

    fn harness(prompt: MockTrustPrompt) -> Harness {
        let fixture = BundleFixture::new(CODEBASE);
        let prompt = Arc::new(prompt);
        let descriptors = Arc::new(MockDescriptorSource::new());
        let env = LoaderEnvironment::new(
            fixture.fetcher(),
            Arc::clone(&prompt) as _,
            Arc::clone(&descriptors) as _,
        );
        Harness {
            fixture,
            prompt,
            descriptors,
            registry: LoaderRegistry::new(env),
        }
    }

    fn app(h: &Harness, name: &str, classes: &[&str]) -> LaunchDescriptor {
        let bundle = h.fixture.unsigned(&format!("{name}.jar"), classes);
        LaunchDescriptor::new(
            h.fixture.url(&format!("{name}.jnlp")),
            "suite",
            h.fixture.codebase().clone(),
        )
        .with_bundle(BundleDescriptor::eager(bundle))
    }

    #[test]
    fn test_same_descriptor_returns_same_loader() {
        let h = harness(MockTrustPrompt::declining());
        let d = app(&h, "main", &["com.suite.Main"]);
        let first = h.registry.get_or_create(d.clone()).unwrap();
        let second = h.registry.get_or_create(d).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.registry.keys(), vec![CooperationKey::new("suite")]);
    }

    #[test]
    fn test_different_descriptor_replaces_and_imports() {
        let h = harness(MockTrustPrompt::declining());
        let first = h.registry.get_or_create(app(&h, "one", &["com.one.A"])).unwrap();
        let second = h.registry.get_or_create(app(&h, "two", &["com.two.B"])).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(
            &h.registry.get(&CooperationKey::new("suite")).unwrap(),
            &second
        ));
        assert!(second.resolve_class("com.one.A").is_ok());
        assert!(first.resolve_class("com.two.B").is_err());
        assert_eq!(h.prompt.count(), 0);
    }

    #[test]
    fn test_extensions_join_parent_key() {
        let h = harness(MockTrustPrompt::declining());
        let lib_bundle = h.fixture.unsigned("lib.jar", &["com.lib.Util"]);
        let lib =
            LaunchDescriptor::new(h.fixture.url("lib.jnlp"), "lib", h.fixture.codebase().clone())
                .with_bundle(BundleDescriptor::eager(lib_bundle));
        h.descriptors.add(lib.clone());

        let main = app(&h, "main", &["com.suite.Main"])
            .with_extension(ExtensionRef::new(lib.source.clone()));
        let loader = h.registry.get_or_create(main.clone()).unwrap();

        assert_eq!(loader.peers().len(), 1);
        assert_eq!(loader.peers()[0].descriptor().key, CooperationKey::new("suite"));
        assert!(loader.resolve_class("com.lib.Util").is_ok());
        assert_eq!(h.registry.len(), 1);

        let again = h.registry.get_or_create(main).unwrap();
        assert!(Arc::ptr_eq(&loader, &again));
        assert_eq!(h.descriptors.load_count(&lib.source), 1);
    }

    #[test]
    fn test_extension_cycle_is_rejected() {
        let h = harness(MockTrustPrompt::declining());
        let a_url = h.fixture.url("a.jnlp");
        let b_url = h.fixture.url("b.jnlp");
        let b = LaunchDescriptor::new(b_url.clone(), "suite", h.fixture.codebase().clone())
            .with_extension(ExtensionRef::new(a_url.clone()));
        h.descriptors.add(b);
        let a = LaunchDescriptor::new(a_url.clone(), "suite", h.fixture.codebase().clone())
            .with_extension(ExtensionRef::new(b_url.clone()));

        match h.registry.get_or_create(a) {
            Err(LaunchError::ExtensionCycle { chain }) => {
                assert_eq!(
                    chain,
                    vec![a_url.to_string(), b_url.to_string(), a_url.to_string()]
                );
            },
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(h.registry.is_empty());
    }

    #[test]
    fn test_downgrade_prompt_once_and_rollback() {
        let h = harness(MockTrustPrompt::declining());
        let publisher = TestPublisher::new();
        let signed = h.fixture.signed("signed.jar", &publisher, &["com.signed.S"]);
        let trusted = LaunchDescriptor::new(
            h.fixture.url("signed.jnlp"),
            "suite",
            h.fixture.codebase().clone(),
        )
        .with_security(SecurityLevel::Full)
        .with_bundle(BundleDescriptor::eager(signed));
        let original = h.registry.get_or_create(trusted).unwrap();
        assert_eq!(original.trust_state(), TrustState::Full);

        let err = h
            .registry
            .get_or_create(app(&h, "plain", &["com.plain.P"]))
            .unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedSignerDeclined));
        assert_eq!(h.prompt.count_kind("untrusted-signer"), 1);
        assert!(Arc::ptr_eq(
            &h.registry.get(&CooperationKey::new("suite")).unwrap(),
            &original
        ));
    }

    #[test]
    fn test_untrusted_caller_rejected() {
        let h = harness(MockTrustPrompt::declining());
        let _ctx = CallerContext::application("suite".into(), SecurityLevel::Restricted).enter();
        let err = h
            .registry
            .get_or_create(app(&h, "main", &["com.suite.Main"]))
            .unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedCaller));
        assert!(h.registry.is_empty());
    }

    #[test]
    fn test_shutdown_destroys_loaders() {
        let h = harness(MockTrustPrompt::declining());
        let loader = h.registry.get_or_create(app(&h, "main", &["com.suite.Main"])).unwrap();
        assert_eq!(h.registry.shutdown().unwrap(), 1);
        assert!(loader.is_destroyed());
        assert!(h.registry.is_empty());
    }
}
