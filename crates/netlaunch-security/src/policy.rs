//! Admin-configured knobs for the permission resolver.

use std::path::Path;

use netlaunch_config::SecuritySection;
pub use netlaunch_config::UnsignedPolicy;
use netlaunch_crypto::{PublisherId, TrustStore};

use crate::attributes::AttributeChecks;
use crate::error::{SecurityError, SecurityResult};

/// How the resolver treats attributes, signers and missing declarations.
///
/// # Example
///
/// ```
/// use netlaunch_security::{AttributeCheck, SecurityPolicy, UnsignedPolicy};
///
/// let policy = SecurityPolicy::default();
/// assert!(policy.attribute_checks.contains(AttributeCheck::TrustedOnly));
/// assert_eq!(policy.unsigned_policy, UnsignedPolicy::Allow);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    /// Manifest attribute checks that run.
    pub attribute_checks: AttributeChecks,
    /// Handling of a missing `permissions` attribute.
    pub unsigned_policy: UnsignedPolicy,
    /// Ask before running code whose signer is not in `trust_store`.
    pub prompt_untrusted_signers: bool,
    /// Publishers trusted without a prompt.
    pub trust_store: TrustStore,
    /// Treat a `codebase` attribute mismatch on a signed application as fatal.
    pub strict_codebase_attribute: bool,
}

impl SecurityPolicy {
    /// Build from the `[security]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown attribute check names or undecodable
    /// publisher keys.
    pub fn from_config(section: &SecuritySection) -> SecurityResult<Self> {
        let mut trust_store = TrustStore::new();
        for entry in &section.trusted_publishers {
            let id = PublisherId::from_hex(entry.trim())
                .or_else(|_| PublisherId::from_base64(entry.trim()))
                .map_err(|source| SecurityError::InvalidTrustedPublisher {
                    entry: entry.clone(),
                    source,
                })?;
            trust_store.trust(id);
        }

        Ok(Self {
            attribute_checks: AttributeChecks::from_names(&section.attribute_checks)?,
            unsigned_policy: section.unsigned_policy,
            prompt_untrusted_signers: section.prompt_untrusted_signers,
            trust_store,
            strict_codebase_attribute: section.strict_codebase_attribute,
        })
    }

    /// Merge in publishers from a trust file.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::TrustStore`] if the file is unreadable or
    /// malformed. A missing file adds nothing.
    pub fn with_trust_file(mut self, path: impl AsRef<Path>) -> SecurityResult<Self> {
        let extra = TrustStore::load(path)?;
        for id in extra.iter() {
            self.trust_store.trust(*id);
        }
        Ok(self)
    }

    /// Trust `id` without a prompt.
    #[must_use]
    pub fn trusting(mut self, id: PublisherId) -> Self {
        self.trust_store.trust(id);
        self
    }
}
