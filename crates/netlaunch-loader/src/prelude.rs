//! Prelude module - commonly used types for convenient import.
//!
//! Use `use netlaunch_loader::prelude::*;` to import all essential types.

// Loading
pub use crate::{BundleLoader, CodeSource, LoadedClass, Resource};

// Registry
pub use crate::{LoaderEnvironment, LoaderRegistry, LoaderSettings};

// Staging
pub use crate::NativeCodeStager;
