//! Prelude module - commonly used test helpers.
//!
//! Use `use netlaunch_test::prelude::*;` to import all essential helpers.

// Mocks
pub use crate::{MockDescriptorSource, MockFetcher, MockParent, MockTrustPrompt};

// Fixtures
pub use crate::{BundleFixture, TestPublisher, class_bytes};

// Harness
pub use crate::{init_test_logging, setup_test_logging};
