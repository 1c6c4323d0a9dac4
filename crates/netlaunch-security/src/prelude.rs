//! Prelude module - commonly used types for convenient import.
//!
//! Use `use netlaunch_security::prelude::*;` to import all essential types.

// Errors
pub use crate::{SecurityError, SecurityResult};

// Permissions
pub use crate::{EffectivePermissions, Permission, PermissionSet};

// Resolution
pub use crate::{AttributeCheck, AttributeChecks, PermissionResolver, SecurityDescriptor, SecurityPolicy};
