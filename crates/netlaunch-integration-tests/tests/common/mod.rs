//! Shared test harness for integration tests.

use std::sync::Arc;

use netlaunch_core::{BundleDescriptor, LaunchDescriptor, SecurityLevel};
use netlaunch_loader::{LoaderEnvironment, LoaderRegistry, LoaderSettings};
use netlaunch_security::SecurityPolicy;
use netlaunch_test::{BundleFixture, MockDescriptorSource, MockFetcher, MockTrustPrompt, TestPublisher};
use url::Url;

/// Codebase every harness serves its bundles under.
pub const CODEBASE: &str = "https://apps.example.com/office/";

/// A registry wired to mock collaborators and a temp-dir bundle fixture.
///
/// The fixture owns the temp directory; it is removed when the harness drops.
#[allow(dead_code)]
pub struct LaunchHarness {
    /// Bundles served under [`CODEBASE`].
    pub fixture: BundleFixture,
    /// Records every trust question.
    pub prompt: Arc<MockTrustPrompt>,
    /// Serves extension descriptors.
    pub descriptors: Arc<MockDescriptorSource>,
    /// The registry under test.
    pub registry: LoaderRegistry,
}

#[allow(dead_code)]
impl LaunchHarness {
    /// Default settings and policy.
    pub fn new(prompt: MockTrustPrompt) -> Self {
        Self::with(prompt, LoaderSettings::default(), SecurityPolicy::default())
    }

    /// Custom loader settings and trust policy.
    pub fn with(prompt: MockTrustPrompt, settings: LoaderSettings, policy: SecurityPolicy) -> Self {
        let fixture = BundleFixture::new(CODEBASE);
        let prompt = Arc::new(prompt);
        let descriptors = Arc::new(MockDescriptorSource::new());
        let env = LoaderEnvironment::new(
            fixture.fetcher(),
            Arc::clone(&prompt) as _,
            Arc::clone(&descriptors) as _,
        )
        .with_settings(settings)
        .with_policy(policy);
        Self {
            fixture,
            prompt,
            descriptors,
            registry: LoaderRegistry::new(env),
        }
    }

    /// The fetcher behind the fixture.
    pub fn fetcher(&self) -> Arc<MockFetcher> {
        self.fixture.fetcher()
    }

    /// Codebase URL.
    pub fn codebase(&self) -> Url {
        self.fixture.codebase().clone()
    }

    /// An empty descriptor at `<name>.jnlp` under `key`.
    pub fn descriptor(&self, name: &str, key: &str) -> LaunchDescriptor {
        LaunchDescriptor::new(self.fixture.url(&format!("{name}.jnlp")), key, self.codebase())
    }

    /// A descriptor at `<name>.jnlp` with one eager unsigned bundle holding `classes`.
    pub fn unsigned_app(&self, name: &str, key: &str, classes: &[&str]) -> LaunchDescriptor {
        let bundle = self.fixture.unsigned(&format!("{name}.jar"), classes);
        self.descriptor(name, key)
            .with_bundle(BundleDescriptor::eager(bundle).as_main())
    }

    /// A descriptor at `<name>.jnlp` requesting full trust with one eager
    /// bundle signed by `publisher`.
    pub fn signed_app(
        &self,
        name: &str,
        key: &str,
        publisher: &TestPublisher,
        classes: &[&str],
    ) -> LaunchDescriptor {
        let bundle = self.fixture.signed(&format!("{name}.jar"), publisher, classes);
        self.descriptor(name, key)
            .with_security(SecurityLevel::Full)
            .with_bundle(BundleDescriptor::eager(bundle).as_main())
    }
}
