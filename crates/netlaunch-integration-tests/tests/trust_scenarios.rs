//! Integration tests for trust classification at loader construction.
//!
//! Each test builds real signed and unsigned bundles, launches them through
//! a loader registry, and checks which prompts were asked and what trust
//! results.

mod common;

use common::LaunchHarness;
use netlaunch_core::{
    BundleDescriptor, CooperationKey, LaunchError, ManifestAttributes, PermissionsAttribute,
    SecurityLevel, TrustRequest, TrustState, ViolationKind,
};
use netlaunch_loader::{LoaderSettings, VerifyScope};
use netlaunch_security::{Permission, SecurityPolicy, UnsignedPolicy, baseline};
use netlaunch_test::{MockTrustPrompt, TestPublisher};

/// Two eager bundles signed by `publisher` and a lazy "ext" part whose bundle
/// is signed by `ext_signer`, or unsigned when `None`.
fn office_suite(
    h: &LaunchHarness,
    publisher: &TestPublisher,
    ext_signer: Option<&TestPublisher>,
    level: SecurityLevel,
) -> netlaunch_core::LaunchDescriptor {
    let main = h.fixture.signed("main.jar", publisher, &["com.office.Main"]);
    let ui = h.fixture.signed("ui.jar", publisher, &["com.office.ui.Window"]);
    let ext = match ext_signer {
        Some(signer) => h.fixture.signed("ext.jar", signer, &["com.office.ext.Plugin"]),
        None => h.fixture.unsigned("ext.jar", &["com.office.ext.Plugin"]),
    };
    h.descriptor("office", "office")
        .with_security(level)
        .with_bundle(BundleDescriptor::eager(main).as_main())
        .with_bundle(BundleDescriptor::eager(ui))
        .with_bundle(BundleDescriptor::lazy(ext).with_part("ext"))
        .with_main_class("com.office.Main")
}

fn verify_all() -> LoaderSettings {
    LoaderSettings {
        verify_scope: VerifyScope::All,
        ..LoaderSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Fully signed
// ---------------------------------------------------------------------------

#[test]
fn test_fully_signed_elevated_launch() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let publisher = TestPublisher::new();
    let descriptor = office_suite(&h, &publisher, Some(&publisher), SecurityLevel::Restricted);
    let ext = h.fixture.url("ext.jar");

    let loader = h.registry.get_or_create(descriptor).unwrap();
    assert_eq!(loader.trust_state(), TrustState::Full);
    assert_eq!(loader.security().level(), SecurityLevel::Restricted);
    assert!(loader.security().signers().contains(&publisher.id()));
    assert_eq!(h.prompt.count(), 0);
    assert_eq!(
        loader.security().permissions().baseline(),
        baseline::restricted(&h.codebase()).as_slice()
    );
    assert!(loader.effective_permissions().implies(&Permission::Clipboard));

    let plugin = loader.resolve_class("com.office.ext.Plugin").unwrap();
    assert_eq!(plugin.location(), Some(&ext));
    assert_eq!(plugin.level(), SecurityLevel::Restricted);
    assert_eq!(loader.activation_count(), 1);
    assert_eq!(h.fetcher().fetch_count(&ext), 1);
}

#[test]
fn test_fully_signed_full_trust_holds_all() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let publisher = TestPublisher::new();
    let loader = h
        .registry
        .get_or_create(h.signed_app("tool", "tool", &publisher, &["com.tool.Main"]))
        .unwrap();
    assert_eq!(loader.security().level(), SecurityLevel::Full);
    assert!(loader.effective_permissions().implies(&Permission::All));
}

#[test]
fn test_untrusted_publisher_prompt_when_enabled() {
    let publisher = TestPublisher::new();
    let policy = SecurityPolicy {
        prompt_untrusted_signers: true,
        ..SecurityPolicy::default()
    };
    let h = LaunchHarness::with(MockTrustPrompt::declining(), LoaderSettings::default(), policy);
    let err = h
        .registry
        .get_or_create(h.signed_app("tool", "tool", &publisher, &["com.tool.Main"]))
        .unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedSignerDeclined));
    assert_eq!(h.prompt.count_kind("untrusted-signer"), 1);

    let trusting = SecurityPolicy {
        prompt_untrusted_signers: true,
        ..SecurityPolicy::default()
    }
    .trusting(publisher.id());
    let h = LaunchHarness::with(MockTrustPrompt::declining(), LoaderSettings::default(), trusting);
    assert!(
        h.registry
            .get_or_create(h.signed_app("tool", "tool", &publisher, &["com.tool.Main"]))
            .is_ok()
    );
    assert_eq!(h.prompt.count(), 0);
}

// ---------------------------------------------------------------------------
// Partially signed
// ---------------------------------------------------------------------------

#[test]
fn test_unsigned_lazy_part_outside_verification_set() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let publisher = TestPublisher::new();
    let loader = h
        .registry
        .get_or_create(office_suite(&h, &publisher, None, SecurityLevel::Restricted))
        .unwrap();

    assert_eq!(loader.trust_state(), TrustState::Full);
    assert_eq!(h.prompt.count(), 0);

    let plugin = loader.resolve_class("com.office.ext.Plugin").unwrap();
    assert_eq!(plugin.level(), SecurityLevel::Sandbox);
    let ext = h.fixture.url("ext.jar");
    assert!(!loader.permissions_for(&ext).contains(&Permission::Clipboard));
    assert!(
        loader
            .permissions_for(&h.fixture.url("main.jar"))
            .contains(&Permission::Clipboard)
    );
}

#[test]
fn test_unsigned_lazy_part_inside_verification_set_declined() {
    let h = LaunchHarness::with(
        MockTrustPrompt::declining(),
        verify_all(),
        SecurityPolicy::default(),
    );
    let publisher = TestPublisher::new();
    let err = h
        .registry
        .get_or_create(office_suite(&h, &publisher, None, SecurityLevel::Restricted))
        .unwrap_err();

    assert_eq!(err.violation_kind(), Some(ViolationKind::PartialSigningDeclined));
    assert_eq!(h.prompt.count(), 1);
    assert!(matches!(
        h.prompt.requests()[0],
        TrustRequest::PartiallySigned {
            consistent: true,
            ..
        }
    ));
    assert!(h.registry.is_empty());
    assert!(h.registry.get(&CooperationKey::new("office")).is_none());
}

#[test]
fn test_unsigned_lazy_part_inside_verification_set_accepted() {
    let h = LaunchHarness::with(
        MockTrustPrompt::accepting(),
        verify_all(),
        SecurityPolicy::default(),
    );
    let publisher = TestPublisher::new();
    let loader = h
        .registry
        .get_or_create(office_suite(&h, &publisher, None, SecurityLevel::Restricted))
        .unwrap();

    assert_eq!(loader.trust_state(), TrustState::Partial);
    assert_eq!(loader.security().level(), SecurityLevel::Restricted);
    assert_eq!(h.prompt.count(), 1);

    let plugin = loader.resolve_class("com.office.ext.Plugin").unwrap();
    assert_eq!(plugin.level(), SecurityLevel::Sandbox);
}

#[test]
fn test_inconsistent_signers_fall_back_to_sandbox() {
    let h = LaunchHarness::with(
        MockTrustPrompt::accepting(),
        verify_all(),
        SecurityPolicy::default(),
    );
    let x = TestPublisher::new();
    let y = TestPublisher::new();
    let loader = h
        .registry
        .get_or_create(office_suite(&h, &x, Some(&y), SecurityLevel::Restricted))
        .unwrap();

    assert_eq!(loader.trust_state(), TrustState::Partial);
    assert_eq!(loader.security().level(), SecurityLevel::Sandbox);
    assert_eq!(h.prompt.count_kind("partially-signed"), 1);
    assert!(!loader.effective_permissions().implies(&Permission::Clipboard));
}

// ---------------------------------------------------------------------------
// Unsigned
// ---------------------------------------------------------------------------

#[test]
fn test_unsigned_sandbox_launch() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let loader = h
        .registry
        .get_or_create(
            h.unsigned_app("viewer", "viewer", &["com.viewer.Main"])
                .with_security(SecurityLevel::Sandbox),
        )
        .unwrap();

    assert_eq!(loader.trust_state(), TrustState::None);
    assert_eq!(loader.security().level(), SecurityLevel::Sandbox);
    assert_eq!(h.prompt.count(), 0);
    assert_eq!(
        loader.security().permissions().baseline(),
        baseline::sandbox(&h.codebase()).as_slice()
    );
    assert!(
        loader
            .effective_permissions()
            .implies(&Permission::SocketConnect("apps.example.com".to_owned()))
    );
    assert!(
        !loader
            .effective_permissions()
            .implies(&Permission::SocketConnect("evil.example.net".to_owned()))
    );
}

#[test]
fn test_unsigned_elevation_is_fatal() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let err = h
        .registry
        .get_or_create(
            h.unsigned_app("viewer", "viewer", &["com.viewer.Main"])
                .with_security(SecurityLevel::Full),
        )
        .unwrap_err();
    assert!(matches!(err, LaunchError::SecurityViolation { .. }));
    assert_eq!(err.violation_kind(), Some(ViolationKind::ElevationWithoutTrust));
    assert_eq!(h.prompt.count(), 0);
}

// ---------------------------------------------------------------------------
// Manifest attributes
// ---------------------------------------------------------------------------

#[test]
fn test_permissions_attribute_contradiction_is_fatal() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let publisher = TestPublisher::new();
    let descriptor = h
        .signed_app("tool", "tool", &publisher, &["com.tool.Main"])
        .with_manifest(ManifestAttributes {
            permissions: Some(PermissionsAttribute::Sandbox),
            ..ManifestAttributes::default()
        });
    let err = h.registry.get_or_create(descriptor).unwrap_err();
    assert_eq!(
        err.violation_kind(),
        Some(ViolationKind::PermissionsAttributeMismatch)
    );
}

#[test]
fn test_trusted_only_requires_full_signing() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let descriptor = h
        .unsigned_app("viewer", "viewer", &["com.viewer.Main"])
        .with_manifest(ManifestAttributes {
            trusted_only: Some(true),
            ..ManifestAttributes::default()
        });
    let err = h.registry.get_or_create(descriptor).unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::TrustedOnlyMismatch));
}

#[test]
fn test_missing_permissions_attribute_under_ask_policy() {
    let policy = SecurityPolicy {
        unsigned_policy: UnsignedPolicy::Ask,
        ..SecurityPolicy::default()
    };
    let h = LaunchHarness::with(MockTrustPrompt::declining(), LoaderSettings::default(), policy);
    let err = h
        .registry
        .get_or_create(h.unsigned_app("viewer", "viewer", &["com.viewer.Main"]))
        .unwrap_err();
    assert_eq!(
        err.violation_kind(),
        Some(ViolationKind::MissingPermissionsAttribute)
    );
    assert_eq!(h.prompt.count_kind("missing-permissions-attribute"), 1);
}

#[test]
fn test_foreign_resources_prompt_once() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let cdn = h
        .fixture
        .write(
            "https://cdn.example.net/shared/util.jar",
            &netlaunch_bundle::BundleBuilder::new()
                .class("net.cdn.Util", netlaunch_test::class_bytes("net.cdn.Util")),
        );
    let descriptor = h
        .unsigned_app("viewer", "viewer", &["com.viewer.Main"])
        .with_bundle(BundleDescriptor::eager(cdn.clone()));

    let loader = h.registry.get_or_create(descriptor).unwrap();
    assert_eq!(h.prompt.count_kind("non-codebase-resources"), 1);
    assert_eq!(
        loader.resolve_class("net.cdn.Util").unwrap().location(),
        Some(&cdn)
    );
}

#[test]
fn test_verification_disabled_treats_everything_unsigned() {
    let settings = LoaderSettings {
        verify_signatures: false,
        ..LoaderSettings::default()
    };
    let h = LaunchHarness::with(MockTrustPrompt::declining(), settings, SecurityPolicy::default());
    let publisher = TestPublisher::new();
    let descriptor = h
        .signed_app("tool", "tool", &publisher, &["com.tool.Main"])
        .with_security(SecurityLevel::Sandbox);
    let loader = h.registry.get_or_create(descriptor).unwrap();
    assert_eq!(loader.trust_state(), TrustState::None);
    assert_eq!(h.prompt.count(), 0);
}
