//! Netlaunch Security - Permission resolution for launched applications.
//!
//! This crate provides:
//! - Typed permissions with implication rules ([`Permission`])
//! - Baseline permission sets per security level ([`baseline`])
//! - Append-only runtime grants ([`PermissionSet`])
//! - The resolver turning trust state and manifest attributes into a
//!   [`SecurityDescriptor`]
//! - Admin policy ([`SecurityPolicy`]) built from configuration
//!
//! # Example
//!
//! ```
//! use netlaunch_security::{Permission, SecurityDescriptor};
//! use url::Url;
//!
//! let sd = SecurityDescriptor::sandbox(Url::parse("https://apps.example.com/").unwrap());
//! assert!(sd.effective().implies(&Permission::SocketConnect("apps.example.com:443".into())));
//! assert!(!sd.effective().implies(&Permission::Clipboard));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod attributes;
pub mod baseline;
pub mod descriptor;
pub mod error;
pub mod permission;
pub mod policy;
pub mod resolver;
pub mod set;

pub use attributes::{AttributeCheck, AttributeChecks};
pub use descriptor::SecurityDescriptor;
pub use error::{SecurityError, SecurityResult};
pub use permission::Permission;
pub use policy::{SecurityPolicy, UnsignedPolicy};
pub use resolver::{PermissionResolver, foreign_resources, same_origin};
pub use set::{EffectivePermissions, PermissionSet};
