//! Collaborators and policy shared by every loader of a registry.

use std::fmt;
use std::sync::Arc;

use netlaunch_config::Config;
use netlaunch_core::{
    DescriptorSource, LaunchError, LaunchResult, ParentResolver, ResourceFetcher, TrustPrompt,
};
use netlaunch_security::SecurityPolicy;

use crate::settings::LoaderSettings;

/// Everything a loader needs from the outside world.
#[derive(Clone)]
pub struct LoaderEnvironment {
    /// Materializes remote bundles.
    pub fetcher: Arc<dyn ResourceFetcher>,
    /// Asks the user to confirm trust decisions.
    pub prompt: Arc<dyn TrustPrompt>,
    /// Loads extension descriptors.
    pub descriptors: Arc<dyn DescriptorSource>,
    /// Platform loader consulted before the bundle search path.
    pub parent: Option<Arc<dyn ParentResolver>>,
    /// Loader behaviour.
    pub settings: LoaderSettings,
    /// Trust policy.
    pub policy: SecurityPolicy,
}

impl LoaderEnvironment {
    /// An environment with default settings and policy.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        prompt: Arc<dyn TrustPrompt>,
        descriptors: Arc<dyn DescriptorSource>,
    ) -> Self {
        Self {
            fetcher,
            prompt,
            descriptors,
            parent: None,
            settings: LoaderSettings::default(),
            policy: SecurityPolicy::default(),
        }
    }

    /// Settings and policy taken from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Internal`] if the security section names an
    /// unknown attribute check or an undecodable publisher key.
    pub fn from_config(
        fetcher: Arc<dyn ResourceFetcher>,
        prompt: Arc<dyn TrustPrompt>,
        descriptors: Arc<dyn DescriptorSource>,
        config: &Config,
    ) -> LaunchResult<Self> {
        let policy = SecurityPolicy::from_config(&config.security)
            .map_err(|e| LaunchError::Internal(format!("invalid security policy: {e}")))?;
        Ok(Self::new(fetcher, prompt, descriptors)
            .with_settings(LoaderSettings::from(&config.loader))
            .with_policy(policy))
    }

    /// Consult `parent` before the bundle search path.
    #[must_use]
    pub fn with_parent(mut self, parent: Arc<dyn ParentResolver>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Replace the loader settings.
    #[must_use]
    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the trust policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SecurityPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Debug for LoaderEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderEnvironment")
            .field("parent", &self.parent.is_some())
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlaunch_config::{SecuritySection, UnsignedPolicy};
    use netlaunch_test::{MockDescriptorSource, MockFetcher, MockParent, MockTrustPrompt};

    fn collaborators() -> (
        Arc<dyn ResourceFetcher>,
        Arc<dyn TrustPrompt>,
        Arc<dyn DescriptorSource>,
    ) {
        (
            Arc::new(MockFetcher::new()),
            Arc::new(MockTrustPrompt::declining()),
            Arc::new(MockDescriptorSource::new()),
        )
    }

    #[test]
    fn test_from_config() {
        let (fetcher, prompt, descriptors) = collaborators();
        let mut config = Config::default();
        config.loader.strict = true;
        config.security.unsigned_policy = UnsignedPolicy::Deny;
        let env = LoaderEnvironment::from_config(fetcher, prompt, descriptors, &config).unwrap();
        assert!(env.settings.strict);
        assert_eq!(env.policy.unsigned_policy, UnsignedPolicy::Deny);
        assert!(env.parent.is_none());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let (fetcher, prompt, descriptors) = collaborators();
        let config = Config {
            security: SecuritySection {
                attribute_checks: vec!["bogus".to_owned()],
                ..SecuritySection::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            LoaderEnvironment::from_config(fetcher, prompt, descriptors, &config),
            Err(LaunchError::Internal(_))
        ));
    }

    #[test]
    fn test_with_parent() {
        let (fetcher, prompt, descriptors) = collaborators();
        let env = LoaderEnvironment::new(fetcher, prompt, descriptors)
            .with_parent(Arc::new(MockParent::new()));
        assert!(env.parent.is_some());
        assert!(format!("{env:?}").contains("parent: true"));
    }
}
