//! Mock collaborators for testing.
//!
//! All mocks use `std::sync::Mutex` internally and are shareable behind
//! `Arc` across resolver threads.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use netlaunch_core::{
    CooperationKey, DescriptorSource, FetchPolicy, LaunchDescriptor, LaunchError, LaunchResult,
    ParentResolver, ResourceFetcher, TrustPrompt, TrustRequest, VersionConstraint,
};
use url::Url;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// A fetcher serving local files from a location table.
///
/// Records every fetch (with its policy) and every prefetch hint. Locations
/// marked with [`MockFetcher::fail`] return a [`LaunchError::FetchFailure`].
#[derive(Debug, Default)]
pub struct MockFetcher {
    files: Mutex<HashMap<Url, PathBuf>>,
    failing: Mutex<HashSet<Url>>,
    log: Mutex<Vec<(Url, FetchPolicy)>>,
    prefetched: Mutex<Vec<Url>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    /// An empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` in every fetch, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `path` for `location`.
    pub fn serve(&self, location: Url, path: impl Into<PathBuf>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(location, path.into());
        }
    }

    /// Make fetches of `location` fail.
    pub fn fail(&self, location: Url) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(location);
        }
    }

    /// Number of fetches of `location`.
    #[must_use]
    pub fn fetch_count(&self, location: &Url) -> usize {
        self.log
            .lock()
            .map(|log| log.iter().filter(|(l, _)| l == location).count())
            .unwrap_or_default()
    }

    /// Total number of fetches.
    #[must_use]
    pub fn total_fetches(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or_default()
    }

    /// Every fetch in order, with its policy.
    #[must_use]
    pub fn fetch_log(&self) -> Vec<(Url, FetchPolicy)> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Locations passed to `prefetch`, in order.
    #[must_use]
    pub fn prefetched(&self) -> Vec<Url> {
        self.prefetched
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl ResourceFetcher for MockFetcher {
    fn fetch(
        &self,
        location: &Url,
        _version: Option<&VersionConstraint>,
        policy: FetchPolicy,
    ) -> LaunchResult<PathBuf> {
        if let Ok(mut log) = self.log.lock() {
            log.push((location.clone(), policy));
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(location))
            .unwrap_or_default();
        if failing {
            return Err(LaunchError::fetch(location, "injected failure"));
        }
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(location).cloned())
            .ok_or_else(|| LaunchError::fetch(location, "not found"))
    }

    fn prefetch(&self, location: &Url, _version: Option<&VersionConstraint>) {
        if let Ok(mut prefetched) = self.prefetched.lock() {
            prefetched.push(location.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// MockTrustPrompt
// ---------------------------------------------------------------------------

/// A prompt answering from a queue, then with a default.
#[derive(Debug)]
pub struct MockTrustPrompt {
    answers: Mutex<VecDeque<bool>>,
    default_answer: bool,
    requests: Mutex<Vec<TrustRequest>>,
}

impl MockTrustPrompt {
    /// A prompt that accepts everything.
    #[must_use]
    pub fn accepting() -> Self {
        Self::with_default(true)
    }

    /// A prompt that declines everything.
    #[must_use]
    pub fn declining() -> Self {
        Self::with_default(false)
    }

    fn with_default(default_answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            default_answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue an answer used before the default.
    #[must_use]
    pub fn then(self, answer: bool) -> Self {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer);
        }
        self
    }

    /// Every request seen, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TrustRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests seen.
    #[must_use]
    pub fn count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Number of requests of `kind` (see [`TrustRequest::kind`]).
    #[must_use]
    pub fn count_kind(&self, kind: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|req| req.kind() == kind).count())
            .unwrap_or_default()
    }
}

impl TrustPrompt for MockTrustPrompt {
    fn confirm(&self, request: &TrustRequest) -> bool {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(self.default_answer)
    }
}

// ---------------------------------------------------------------------------
// MockDescriptorSource
// ---------------------------------------------------------------------------

/// Serves extension descriptors from a table.
#[derive(Debug, Default)]
pub struct MockDescriptorSource {
    descriptors: Mutex<HashMap<Url, LaunchDescriptor>>,
    loads: Mutex<Vec<Url>>,
}

impl MockDescriptorSource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `descriptor` at its own source location.
    pub fn add(&self, descriptor: LaunchDescriptor) {
        if let Ok(mut d) = self.descriptors.lock() {
            d.insert(descriptor.source.clone(), descriptor);
        }
    }

    /// Number of loads of `location`.
    #[must_use]
    pub fn load_count(&self, location: &Url) -> usize {
        self.loads
            .lock()
            .map(|l| l.iter().filter(|u| *u == location).count())
            .unwrap_or_default()
    }
}

impl DescriptorSource for MockDescriptorSource {
    fn load(
        &self,
        location: &Url,
        _version: Option<&VersionConstraint>,
        _key: &CooperationKey,
    ) -> LaunchResult<LaunchDescriptor> {
        if let Ok(mut loads) = self.loads.lock() {
            loads.push(location.clone());
        }
        self.descriptors
            .lock()
            .ok()
            .and_then(|d| d.get(location).cloned())
            .ok_or_else(|| LaunchError::Descriptor {
                location: location.to_string(),
                message: "no such descriptor".to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// MockParent
// ---------------------------------------------------------------------------

/// A platform loader providing a fixed set of classes.
#[derive(Debug, Default)]
pub struct MockParent {
    classes: HashMap<String, Vec<u8>>,
}

impl MockParent {
    /// A parent providing nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide `name`.
    #[must_use]
    pub fn with_class(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.classes.insert(name.into(), bytes);
        self
    }
}

impl ParentResolver for MockParent {
    fn find_class(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.get(name).cloned()
    }
}
