//! Netlaunch Loader - Security-scoped lazy bundle loading.
//!
//! This crate provides:
//! - [`BundleLoader`]: staged class and resource resolution over the bundles
//!   of one launch descriptor, with lazy per-part activation
//! - [`LoaderRegistry`]: one loader per cooperation key, with extension
//!   resolution, merging and all-or-nothing construction
//! - [`NativeCodeStager`]: native library extraction into private scratch
//!   directories
//! - [`LoaderEnvironment`] and [`LoaderSettings`]: collaborators and knobs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use netlaunch_core::{BundleDescriptor, LaunchDescriptor};
//! use netlaunch_loader::prelude::*;
//! # fn collaborators() -> (
//! #     Arc<dyn netlaunch_core::ResourceFetcher>,
//! #     Arc<dyn netlaunch_core::TrustPrompt>,
//! #     Arc<dyn netlaunch_core::DescriptorSource>,
//! # ) { unimplemented!() }
//! # fn main() -> Result<(), netlaunch_core::LaunchError> {
//! let (fetcher, prompt, descriptors) = collaborators();
//! let registry = Arc::new(LoaderRegistry::new(LoaderEnvironment::new(
//!     fetcher,
//!     prompt,
//!     descriptors,
//! )));
//!
//! let codebase = url::Url::parse("https://apps.example.com/editor/").unwrap();
//! let source = codebase.join("editor.jnlp").unwrap();
//! let descriptor = LaunchDescriptor::new(source, "editor", codebase.clone())
//!     .with_bundle(BundleDescriptor::eager(codebase.join("editor.jar").unwrap()).as_main())
//!     .with_main_class("com.example.editor.Main");
//!
//! let loader = registry.get_or_create(descriptor)?;
//! let main = loader.resolve_class("com.example.editor.Main")?;
//! println!("{} from {:?}", main.name, main.location());
//! registry.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod class;
pub mod codebase;
pub mod environment;
pub mod loader;
pub mod nested;
pub mod pool;
pub mod registry;
pub mod settings;
pub mod stager;

pub use class::{CodeSource, LoadedClass, Resource, class_path};
pub use codebase::CodebaseFallback;
pub use environment::LoaderEnvironment;
pub use loader::{BundleLoader, CLASS_STAGES, RESOURCE_STAGES, Stage, initial_bundles};
pub use pool::ActivationPool;
pub use registry::{ConstructionScope, LoaderRegistry};
pub use settings::{LoaderSettings, VerifyScope};
pub use stager::{NativeCodeStager, SCRATCH_PREFIX, library_file_name};
