//! Trust state + declared level + manifest attributes → security descriptor.
//!
//! # Check order
//!
//! 1. Partially signed? Ask once. Declined → fatal. Accepted with
//!    inconsistent signers → run sandboxed.
//! 2. Elevated declaration without full trust → fatal.
//! 3. Fully signed by an unknown publisher and signer prompts enabled? Ask.
//! 4. Manifest attribute checks, each enabled by the policy:
//!    trusted-only, codebase, permissions, allowable codebase, entry point.
//! 5. Freeze the baseline for the resulting level.
//!
//! Every failing step aborts the launch; nothing is partially applied.

use std::collections::BTreeSet;

use netlaunch_bundle::VerificationReport;
use netlaunch_core::{
    LaunchDescriptor, LaunchError, LaunchResult, PermissionsAttribute, SecurityLevel,
    SignerPromptReason, TrustPrompt, TrustRequest, TrustState, ViolationKind,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::attributes::AttributeCheck;
use crate::descriptor::SecurityDescriptor;
use crate::policy::{SecurityPolicy, UnsignedPolicy};

/// Decides the security context of a launch.
///
/// # Example
///
/// ```
/// use netlaunch_bundle::{BundleSigning, classify};
/// use netlaunch_core::{DenyAllPrompt, LaunchDescriptor, SecurityLevel, TrustState};
/// use netlaunch_security::{PermissionResolver, SecurityPolicy};
/// use url::Url;
///
/// let codebase = Url::parse("https://apps.example.com/").unwrap();
/// let descriptor = LaunchDescriptor::new(codebase.join("app.jnlp").unwrap(), "app", codebase.clone());
/// let report = classify(vec![(codebase.join("app.jar").unwrap(), BundleSigning::Unsigned)]);
///
/// let policy = SecurityPolicy::default();
/// let resolver = PermissionResolver::new(&policy, &DenyAllPrompt);
/// let security = resolver.resolve(&descriptor, &report).unwrap();
/// assert_eq!(security.trust_state(), TrustState::None);
/// assert_eq!(security.level(), SecurityLevel::Sandbox);
/// ```
pub struct PermissionResolver<'a> {
    policy: &'a SecurityPolicy,
    prompt: &'a dyn TrustPrompt,
}

/// Intermediate state threaded through the checks.
struct Resolution<'d> {
    descriptor: &'d LaunchDescriptor,
    report: &'d VerificationReport,
    /// Signed by one consistent identity, or accepted as such.
    trusted: bool,
    /// The user accepted a run in the sandbox.
    sandbox_chosen: bool,
    level: SecurityLevel,
}

impl Resolution<'_> {
    /// Any bundle carries a signature, valid or not.
    fn signed(&self) -> bool {
        self.report.state != TrustState::None
    }

    fn source(&self) -> &Url {
        &self.descriptor.source
    }
}

impl<'a> PermissionResolver<'a> {
    /// A resolver using `policy` and asking questions through `prompt`.
    #[must_use]
    pub fn new(policy: &'a SecurityPolicy, prompt: &'a dyn TrustPrompt) -> Self {
        Self { policy, prompt }
    }

    /// Resolve the security context for `descriptor` given its verified bundles.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::SecurityViolation`] naming the first failing
    /// check.
    pub fn resolve(
        &self,
        descriptor: &LaunchDescriptor,
        report: &VerificationReport,
    ) -> LaunchResult<SecurityDescriptor> {
        let requested = descriptor.declared_level();
        let mut r = Resolution {
            descriptor,
            report,
            trusted: report.state == TrustState::Full,
            sandbox_chosen: false,
            level: SecurityLevel::Sandbox,
        };

        self.check_partial_signing(&mut r, requested)?;
        Self::check_elevation(&r, requested)?;
        self.check_publisher(&r)?;

        r.level = if r.trusted && !r.sandbox_chosen {
            requested
        } else {
            SecurityLevel::Sandbox
        };

        let checks = &self.policy.attribute_checks;
        if checks.contains(AttributeCheck::TrustedOnly) {
            Self::check_trusted_only(&r)?;
        }
        if checks.contains(AttributeCheck::Codebase) {
            self.check_codebase(&r)?;
        }
        if checks.contains(AttributeCheck::Permissions) {
            self.check_permissions(&r)?;
        }
        if checks.contains(AttributeCheck::AllowableCodebase) {
            self.check_allowable_codebase(&r)?;
        }
        if checks.contains(AttributeCheck::EntryPoint) {
            Self::check_entry_point(&r)?;
        }

        let signers = if r.trusted {
            report.common_signers.clone()
        } else {
            BTreeSet::new()
        };
        info!(
            descriptor = %descriptor.source,
            trust = %report.state,
            level = %r.level,
            signers = signers.len(),
            "Resolved security descriptor"
        );
        Ok(SecurityDescriptor::new(
            descriptor.security,
            r.level,
            descriptor.codebase.clone(),
            report.state,
            signers,
        ))
    }

    fn ask(&self, request: &TrustRequest, kind: ViolationKind, declined: &str) -> LaunchResult<()> {
        debug!(request = request.kind(), "Requesting trust confirmation");
        if self.prompt.confirm(request) {
            Ok(())
        } else {
            warn!(request = request.kind(), "Trust confirmation declined");
            Err(LaunchError::violation(kind, declined))
        }
    }

    fn check_partial_signing(
        &self,
        r: &mut Resolution<'_>,
        requested: SecurityLevel,
    ) -> LaunchResult<()> {
        if r.report.state != TrustState::Partial {
            return Ok(());
        }
        let request = TrustRequest::PartiallySigned {
            descriptor: r.source().clone(),
            consistent: r.report.consistent,
        };
        self.ask(
            &request,
            ViolationKind::PartialSigningDeclined,
            &format!("partially signed application {} was declined", r.source()),
        )?;

        if r.report.consistent {
            r.trusted = true;
        } else {
            if requested.is_elevated() {
                warn!(
                    descriptor = %r.source(),
                    requested = %requested,
                    cause = ?r.report.partial_cause,
                    "Signers are inconsistent; running sandboxed despite elevated declaration"
                );
            }
            r.sandbox_chosen = true;
        }
        Ok(())
    }

    fn check_elevation(r: &Resolution<'_>, requested: SecurityLevel) -> LaunchResult<()> {
        if requested.is_elevated() && !r.trusted && !r.sandbox_chosen {
            return Err(LaunchError::violation(
                ViolationKind::ElevationWithoutTrust,
                format!(
                    "{} requests {requested} permissions but its bundles are {} signed",
                    r.source(),
                    r.report.state
                ),
            ));
        }
        Ok(())
    }

    fn check_publisher(&self, r: &Resolution<'_>) -> LaunchResult<()> {
        let signers = &r.report.common_signers;
        if r.report.state != TrustState::Full
            || !self.policy.prompt_untrusted_signers
            || signers.is_empty()
            || self.policy.trust_store.trusts_any(signers)
        {
            return Ok(());
        }
        let request = TrustRequest::UntrustedSigner {
            descriptor: r.source().clone(),
            signer: signers.iter().next().map(|id| id.to_hex()),
            reason: SignerPromptReason::UnknownPublisher,
        };
        self.ask(
            &request,
            ViolationKind::UntrustedSignerDeclined,
            &format!("signer of {} is not trusted", r.source()),
        )
    }

    fn check_trusted_only(r: &Resolution<'_>) -> LaunchResult<()> {
        if r.descriptor.manifest.trusted_only != Some(true) {
            return Ok(());
        }
        let fully_signed = r.report.state == TrustState::Full;
        let requests_matching = match r.descriptor.security {
            Some(SecurityLevel::Full) => r.level == SecurityLevel::Full,
            Some(SecurityLevel::Sandbox) => true,
            _ => false,
        };
        if fully_signed && requests_matching {
            return Ok(());
        }
        Err(LaunchError::violation(
            ViolationKind::TrustedOnlyMismatch,
            format!(
                "{} is trusted-only but is {} signed and requests {}",
                r.source(),
                r.report.state,
                r.descriptor
                    .security
                    .map_or_else(|| "no".to_owned(), |l| l.to_string())
            ),
        ))
    }

    fn check_codebase(&self, r: &Resolution<'_>) -> LaunchResult<()> {
        let codebase = &r.descriptor.codebase;
        if codebase.scheme() == "file" {
            debug!("Codebase is local; skipping codebase attribute check");
            return Ok(());
        }
        let Some(matcher) = &r.descriptor.manifest.codebase else {
            return Ok(());
        };
        if matcher.matches(codebase) {
            return Ok(());
        }
        error!(
            codebase = %codebase,
            attribute = ?matcher.patterns(),
            "Codebase attribute does not match codebase"
        );
        if self.policy.strict_codebase_attribute && r.signed() && r.level.is_elevated() {
            return Err(LaunchError::violation(
                ViolationKind::CodebaseAttributeMismatch,
                format!("codebase {codebase} is not allowed by the codebase attribute"),
            ));
        }
        Ok(())
    }

    fn check_permissions(&self, r: &Resolution<'_>) -> LaunchResult<()> {
        if r.sandbox_chosen {
            debug!("Sandbox run chosen; permissions attribute does not apply");
            return Ok(());
        }
        let Some(attribute) = r.descriptor.manifest.permissions else {
            return self.missing_permissions_attribute(r);
        };

        match (r.descriptor.security, attribute) {
            (Some(SecurityLevel::Full), PermissionsAttribute::Sandbox)
            | (Some(SecurityLevel::Sandbox), PermissionsAttribute::AllPermissions) => {
                Err(LaunchError::violation(
                    ViolationKind::PermissionsAttributeMismatch,
                    format!(
                        "permissions attribute is {attribute:?} but {} requests {}",
                        r.source(),
                        r.descriptor.declared_level()
                    ),
                ))
            },
            (None, PermissionsAttribute::Sandbox) if r.signed() => {
                warn!(descriptor = %r.source(), "Signed application asks for sandbox; forcing sandbox");
                Ok(())
            },
            (None, PermissionsAttribute::AllPermissions) if !r.signed() => {
                warn!(
                    descriptor = %r.source(),
                    "Unsigned application asks for all permissions; forcing sandbox"
                );
                Ok(())
            },
            _ => Ok(()),
        }
    }

    fn missing_permissions_attribute(&self, r: &Resolution<'_>) -> LaunchResult<()> {
        match self.policy.unsigned_policy {
            UnsignedPolicy::Deny => Err(LaunchError::violation(
                ViolationKind::MissingPermissionsAttribute,
                format!("{} has no permissions attribute", r.source()),
            )),
            UnsignedPolicy::Ask => self.ask(
                &TrustRequest::MissingPermissionsAttribute {
                    descriptor: r.source().clone(),
                },
                ViolationKind::MissingPermissionsAttribute,
                &format!("{} has no permissions attribute and was declined", r.source()),
            ),
            UnsignedPolicy::Allow => {
                debug!(descriptor = %r.source(), "No permissions attribute; continuing");
                Ok(())
            },
        }
    }

    fn check_allowable_codebase(&self, r: &Resolution<'_>) -> LaunchResult<()> {
        let foreign = foreign_resources(r.descriptor);
        if foreign.is_empty() {
            return Ok(());
        }
        debug!(count = foreign.len(), "Application uses non-codebase resources");

        // An unsigned manifest could claim anything.
        let matcher = if r.signed() {
            r.descriptor.manifest.allowable_codebase.as_ref()
        } else {
            None
        };

        let Some(matcher) = matcher else {
            let request = TrustRequest::NonCodebaseResources {
                descriptor: r.source().clone(),
                resources: foreign,
                covered: false,
            };
            self.ask(
                &request,
                ViolationKind::NonCodebaseResourcesDeclined,
                &format!("{} uses non-codebase resources and was declined", r.source()),
            )?;
            warn!(descriptor = %r.source(), "Non-codebase resources allowed by user");
            return Ok(());
        };

        if let Some(outside) = foreign.iter().find(|url| !matcher.matches(url)) {
            return Err(LaunchError::violation(
                ViolationKind::AllowableCodebaseMismatch,
                format!("resource {outside} is not covered by the allowable codebase attribute"),
            ));
        }

        if self.policy.unsigned_policy == UnsignedPolicy::Ask {
            let request = TrustRequest::NonCodebaseResources {
                descriptor: r.source().clone(),
                resources: foreign,
                covered: true,
            };
            self.ask(
                &request,
                ViolationKind::NonCodebaseResourcesDeclined,
                &format!("{} uses non-codebase resources and was declined", r.source()),
            )?;
        }
        info!(descriptor = %r.source(), "Non-codebase resources match allowable codebase");
        Ok(())
    }

    fn check_entry_point(r: &Resolution<'_>) -> LaunchResult<()> {
        if !r.signed() {
            return Ok(());
        }
        let (Some(main), Some(entry_points)) =
            (&r.descriptor.main_class, &r.descriptor.manifest.entry_points)
        else {
            return Ok(());
        };
        if entry_points.iter().any(|ep| ep == main) {
            return Ok(());
        }
        Err(LaunchError::violation(
            ViolationKind::EntryPointMismatch,
            format!(
                "main class {main} is not among the declared entry points {}",
                entry_points.join(", ")
            ),
        ))
    }
}

/// Locations a descriptor uses that are outside its codebase and document
/// base origins.
#[must_use]
pub fn foreign_resources(descriptor: &LaunchDescriptor) -> Vec<Url> {
    let home = |url: &Url| {
        same_origin(url, &descriptor.codebase)
            || descriptor
                .document_base
                .as_ref()
                .is_some_and(|base| same_origin(url, base))
    };

    let mut foreign: Vec<Url> = Vec::new();
    let used = std::iter::once(&descriptor.source)
        .chain(descriptor.extensions.iter().map(|e| &e.location))
        .chain(descriptor.bundles.iter().map(|b| b.location()));
    for url in used {
        if !home(url) && !foreign.contains(url) {
            foreign.push(url.clone());
        }
    }
    foreign
}

/// Scheme, host and port agree. All local files share one origin.
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    if a.scheme() == "file" && b.scheme() == "file" {
        return true;
    }
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}
