//! Signed and unsigned bundle fixtures.

use std::path::PathBuf;
use std::sync::Arc;

use netlaunch_bundle::BundleBuilder;
use netlaunch_crypto::{PublisherId, PublisherKey};
use tempfile::TempDir;
use url::Url;

use crate::mocks::MockFetcher;

/// Bytes used as the body of a fixture class.
#[must_use]
pub fn class_bytes(name: &str) -> Vec<u8> {
    format!("class {name}").into_bytes()
}

/// A signing identity for fixtures.
pub struct TestPublisher {
    key: PublisherKey,
}

impl TestPublisher {
    /// A fresh random publisher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: PublisherKey::generate(),
        }
    }

    /// The publisher's key.
    #[must_use]
    pub fn key(&self) -> &PublisherKey {
        &self.key
    }

    /// The publisher's identity.
    #[must_use]
    pub fn id(&self) -> PublisherId {
        self.key.id()
    }
}

impl Default for TestPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Bundles written to a temp directory and served by a [`MockFetcher`]
/// under a fake remote codebase.
pub struct BundleFixture {
    dir: TempDir,
    codebase: Url,
    fetcher: Arc<MockFetcher>,
}

impl BundleFixture {
    /// A fixture serving bundles under `codebase`.
    ///
    /// # Panics
    ///
    /// Panics if `codebase` is not a URL or the temp directory cannot be created.
    #[must_use]
    pub fn new(codebase: &str) -> Self {
        Self {
            dir: TempDir::with_prefix("netlaunch-fixture-").expect("Failed to create temp directory"),
            codebase: Url::parse(codebase).expect("Invalid codebase URL"),
            fetcher: Arc::new(MockFetcher::new()),
        }
    }

    /// The remote codebase.
    #[must_use]
    pub fn codebase(&self) -> &Url {
        &self.codebase
    }

    /// The fetcher serving this fixture's bundles.
    #[must_use]
    pub fn fetcher(&self) -> Arc<MockFetcher> {
        Arc::clone(&self.fetcher)
    }

    /// Remote location of `name` under the codebase.
    ///
    /// # Panics
    ///
    /// Panics if `name` does not join onto the codebase.
    #[must_use]
    pub fn url(&self, name: &str) -> Url {
        self.codebase.join(name).expect("Invalid bundle name")
    }

    /// Local path a bundle named `name` is written to.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name.replace('/', "_"))
    }

    /// Write `builder` as `name`, serve it, and return its remote location.
    ///
    /// # Panics
    ///
    /// Panics if the bundle cannot be written.
    #[must_use]
    pub fn write(&self, name: &str, builder: &BundleBuilder<'_>) -> Url {
        let path = self.path(name);
        builder.write_to(&path).expect("Failed to write bundle");
        let location = self.url(name);
        self.fetcher.serve(location.clone(), path);
        location
    }

    /// Write a bundle holding `classes`, signed by `publisher`.
    #[must_use]
    pub fn signed(&self, name: &str, publisher: &TestPublisher, classes: &[&str]) -> Url {
        let builder = classes
            .iter()
            .fold(BundleBuilder::new(), |b, class| b.class(class, class_bytes(class)))
            .sign_with(publisher.key());
        self.write(name, &builder)
    }

    /// Write an unsigned bundle holding `classes`.
    #[must_use]
    pub fn unsigned(&self, name: &str, classes: &[&str]) -> Url {
        let builder = classes
            .iter()
            .fold(BundleBuilder::new(), |b, class| b.class(class, class_bytes(class)));
        self.write(name, &builder)
    }
}
