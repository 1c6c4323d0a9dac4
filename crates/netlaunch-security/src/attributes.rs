//! Selection of manifest attribute checks.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SecurityError;

/// One manifest attribute check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeCheck {
    /// `trusted_only` requires a fully trusted, fully privileged application.
    TrustedOnly,
    /// `codebase` must match the codebase origin.
    Codebase,
    /// `permissions` must agree with the declared level.
    Permissions,
    /// Foreign resources must match `allowable_codebase`.
    AllowableCodebase,
    /// The main class must be a declared entry point.
    EntryPoint,
}

impl AttributeCheck {
    /// Every check, in evaluation order.
    pub const ALL: [Self; 5] = [
        Self::TrustedOnly,
        Self::Codebase,
        Self::Permissions,
        Self::AllowableCodebase,
        Self::EntryPoint,
    ];

    /// Configuration name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TrustedOnly => "trusted",
            Self::Codebase => "codebase",
            Self::Permissions => "permissions",
            Self::AllowableCodebase => "alac",
            Self::EntryPoint => "entry_point",
        }
    }
}

impl fmt::Display for AttributeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeCheck {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| SecurityError::UnknownAttributeCheck(s.to_owned()))
    }
}

/// The set of checks that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChecks(BTreeSet<AttributeCheck>);

impl AttributeChecks {
    /// Every check enabled.
    #[must_use]
    pub fn all() -> Self {
        Self(AttributeCheck::ALL.into_iter().collect())
    }

    /// No checks enabled.
    #[must_use]
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse configuration names (`all`, `none`, or individual checks).
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::UnknownAttributeCheck`] for an unknown name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, SecurityError> {
        let mut set = BTreeSet::new();
        for name in names {
            match name.as_ref() {
                "all" => return Ok(Self::all()),
                "none" => {},
                other => {
                    set.insert(other.parse()?);
                },
            }
        }
        Ok(Self(set))
    }

    /// Whether `check` runs.
    #[must_use]
    pub fn contains(&self, check: AttributeCheck) -> bool {
        self.0.contains(&check)
    }

    /// Enable `check`.
    #[must_use]
    pub fn with(mut self, check: AttributeCheck) -> Self {
        self.0.insert(check);
        self
    }

    /// Disable `check`.
    #[must_use]
    pub fn without(mut self, check: AttributeCheck) -> Self {
        self.0.remove(&check);
        self
    }
}

impl Default for AttributeChecks {
    fn default() -> Self {
        Self::all()
    }
}
