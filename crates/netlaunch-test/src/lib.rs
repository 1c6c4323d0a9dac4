//! Netlaunch Test - Shared test utilities for the bundle loader.
//!
//! This crate provides mock collaborators and signed bundle fixtures that
//! can be used across netlaunch crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! netlaunch-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use netlaunch_test::{BundleFixture, MockTrustPrompt, TestPublisher};
//!
//! #[test]
//! fn test_signed_bundle() {
//!     let publisher = TestPublisher::new();
//!     let fixture = BundleFixture::new("https://apps.example.com/editor/");
//!     let main = fixture.signed("main.jar", &publisher, &["com.example.Main"]);
//!     let prompt = MockTrustPrompt::declining();
//!     // build a descriptor pointing at `main` and construct a loader
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
