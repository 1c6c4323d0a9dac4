//! Integration tests for the loader registry.
//!
//! Tests reuse of loaders across launches, replacement and import when a
//! family changes, trust downgrade confirmation, extension cycles, rollback
//! of failed launches and the caller checks guarding the registry.

mod common;

use std::sync::Arc;

use common::LaunchHarness;
use netlaunch_bundle::BundleBuilder;
use netlaunch_core::{
    BundleDescriptor, CallerContext, CooperationKey, ExtensionRef, LaunchError, SecurityLevel,
    SignerPromptReason, TrustRequest, TrustState, ViolationKind,
};
use netlaunch_loader::{ConstructionScope, library_file_name};
use netlaunch_test::{MockTrustPrompt, TestPublisher, class_bytes};

fn suite() -> CooperationKey {
    CooperationKey::new("suite")
}

// ---------------------------------------------------------------------------
// Reuse and replacement
// ---------------------------------------------------------------------------

#[test]
fn test_identical_relaunch_is_a_no_op() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let lazy = h.fixture.unsigned("lazy.jar", &["com.suite.lazy.L"]);
    let descriptor = h
        .unsigned_app("main", "suite", &["com.suite.Main"])
        .with_bundle(BundleDescriptor::lazy(lazy).with_part("lazy"));

    let first = h.registry.get_or_create(descriptor.clone()).unwrap();
    let pool = first.pool_len();
    let fetches = h.fetcher().total_fetches();

    let second = h.registry.get_or_create(descriptor).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.pool_len(), pool);
    assert_eq!(h.fetcher().total_fetches(), fetches);
    assert_eq!(h.registry.len(), 1);
}

#[test]
fn test_new_family_member_imports_previous_loader() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let lib = library_file_name("spell");
    let first_bundle = h.fixture.write(
        "writer.jar",
        &BundleBuilder::new()
            .class("com.suite.writer.Writer", class_bytes("com.suite.writer.Writer"))
            .entry(format!("native/{lib}"), b"\x7fELF".to_vec()),
    );
    let writer = h
        .descriptor("writer", "suite")
        .with_bundle(BundleDescriptor::eager(first_bundle.clone()).as_native());
    let first = h.registry.get_or_create(writer).unwrap();
    let staged = first.native_directories();
    assert_eq!(staged.len(), 1);

    let second = h
        .registry
        .get_or_create(h.unsigned_app("sheets", "suite", &["com.suite.sheets.Sheets"]))
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&h.registry.get(&suite()).unwrap(), &second));

    assert!(second.search_path().contains(&first_bundle));
    assert!(second.code_source(&first_bundle).is_some());
    assert!(second.native_directories().contains(&staged[0]));
    assert!(second.find_library("spell").is_some());
    assert_eq!(
        second.resolve_class("com.suite.writer.Writer").unwrap().location(),
        Some(&first_bundle)
    );

    // Import is one-directional.
    assert!(first.resolve_class("com.suite.sheets.Sheets").is_err());
    assert_eq!(h.prompt.count(), 0);
}

#[test]
fn test_extension_loaded_once_per_family() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let ext = h.unsigned_app("common", "common", &["com.common.Util"]);
    h.descriptors.add(ext.clone());
    let main = h
        .unsigned_app("main", "suite", &["com.suite.Main"])
        .with_extension(ExtensionRef::new(ext.source.clone()));

    let loader = h.registry.get_or_create(main.clone()).unwrap();
    assert_eq!(loader.peers().len(), 1);
    assert_eq!(loader.peers()[0].descriptor().key, suite());
    assert!(h.registry.get(&CooperationKey::new("common")).is_none());
    assert!(loader.resolve_class("com.common.Util").is_ok());

    h.registry.get_or_create(main).unwrap();
    assert_eq!(h.descriptors.load_count(&ext.source), 1);
}

// ---------------------------------------------------------------------------
// Trust downgrade
// ---------------------------------------------------------------------------

#[test]
fn test_downgrade_declined_aborts_launch() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let publisher = TestPublisher::new();
    let signed = h
        .registry
        .get_or_create(h.signed_app("signed", "suite", &publisher, &["com.suite.S"]))
        .unwrap();
    assert_eq!(signed.trust_state(), TrustState::Full);

    let err = h
        .registry
        .get_or_create(h.unsigned_app("plain", "suite", &["com.suite.P"]))
        .unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedSignerDeclined));
    assert_eq!(h.prompt.count(), 1);
    match &h.prompt.requests()[0] {
        TrustRequest::UntrustedSigner { signer, reason, .. } => {
            assert_eq!(*reason, SignerPromptReason::MergeDowngrade);
            assert_eq!(signer.as_deref(), Some(publisher.id().to_hex().as_str()));
        },
        other => panic!("unexpected request {other:?}"),
    }
    assert!(Arc::ptr_eq(&h.registry.get(&suite()).unwrap(), &signed));
}

#[test]
fn test_downgrade_accepted_merges() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let publisher = TestPublisher::new();
    let signed = h
        .registry
        .get_or_create(h.signed_app("signed", "suite", &publisher, &["com.suite.S"]))
        .unwrap();

    let plain = h
        .registry
        .get_or_create(h.unsigned_app("plain", "suite", &["com.suite.P"]))
        .unwrap();
    assert_eq!(h.prompt.count_kind("untrusted-signer"), 1);
    assert_eq!(plain.trust_state(), TrustState::None);
    assert!(plain.resolve_class("com.suite.S").is_ok());
    assert!(plain.search_path().contains(&h.fixture.url("signed.jar")));
    assert!(!Arc::ptr_eq(&signed, &plain));
}

#[test]
fn test_downgrade_asked_once_per_launch() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let publisher = TestPublisher::new();
    h.registry
        .get_or_create(h.unsigned_app("old", "suite", &["com.suite.Old"]))
        .unwrap();

    let ext = h.unsigned_app("ext", "ext", &["com.suite.ext.E"]);
    h.descriptors.add(ext.clone());
    let signed = h
        .signed_app("signed", "suite", &publisher, &["com.suite.S"])
        .with_extension(ExtensionRef::new(ext.source.clone()));

    let loader = h.registry.get_or_create(signed).unwrap();
    assert_eq!(loader.trust_state(), TrustState::Full);
    assert_eq!(h.prompt.count(), 1);
    assert!(loader.resolve_class("com.suite.Old").is_ok());
    assert!(loader.resolve_class("com.suite.ext.E").is_ok());
}

#[test]
fn test_scope_records_downgrade_answer() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let publisher = TestPublisher::new();
    h.registry
        .get_or_create(h.signed_app("signed", "suite", &publisher, &["com.suite.S"]))
        .unwrap();

    let mut scope = ConstructionScope::new();
    let result = h.registry.get_or_create_in(
        h.unsigned_app("plain", "suite", &["com.suite.P"]),
        &mut scope,
        &CallerContext::System,
    );
    assert!(result.is_err());
    assert_eq!(scope.downgrade_answer(), Some(false));
    assert!(scope.held().is_empty());
    assert!(scope.chain().is_empty());
}

// ---------------------------------------------------------------------------
// Cycles and rollback
// ---------------------------------------------------------------------------

#[test]
fn test_indirect_extension_cycle() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let a = h.fixture.url("a.jnlp");
    let b = h.fixture.url("b.jnlp");
    let c = h.fixture.url("c.jnlp");
    h.descriptors.add(
        h.unsigned_app("b", "other", &["com.b.B"])
            .with_extension(ExtensionRef::new(c.clone())),
    );
    h.descriptors.add(
        h.unsigned_app("c", "third", &["com.c.C"])
            .with_extension(ExtensionRef::new(a.clone())),
    );
    let root = h
        .unsigned_app("a", "suite", &["com.a.A"])
        .with_extension(ExtensionRef::new(b.clone()));

    match h.registry.get_or_create(root) {
        Err(LaunchError::ExtensionCycle { chain }) => assert_eq!(
            chain,
            vec![a.to_string(), b.to_string(), c.to_string(), a.to_string()]
        ),
        other => panic!("expected cycle, got {other:?}"),
    }
    assert!(h.registry.is_empty());
}

#[test]
fn test_self_extension_is_a_cycle() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let a = h.fixture.url("a.jnlp");
    let root = h
        .unsigned_app("a", "suite", &["com.a.A"])
        .with_extension(ExtensionRef::new(a.clone()));
    assert!(matches!(
        h.registry.get_or_create(root),
        Err(LaunchError::ExtensionCycle { .. })
    ));
}

#[test]
fn test_failed_launch_restores_previous_entry() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let original = h
        .registry
        .get_or_create(h.unsigned_app("main", "suite", &["com.suite.Main"]))
        .unwrap();

    let ext = h.unsigned_app("ext", "ext", &["com.suite.ext.E"]);
    h.descriptors.add(ext.clone());
    let missing = h.fixture.url("missing.jnlp");
    let broken = h
        .unsigned_app("next", "suite", &["com.suite.Next"])
        .with_extension(ExtensionRef::new(ext.source.clone()))
        .with_extension(ExtensionRef::new(missing));

    let err = h.registry.get_or_create(broken).unwrap_err();
    assert!(matches!(err, LaunchError::Descriptor { .. }));
    assert!(Arc::ptr_eq(&h.registry.get(&suite()).unwrap(), &original));
    assert_eq!(h.registry.len(), 1);
}

#[test]
fn test_missing_eager_bundle_is_fatal_and_registers_nothing() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let descriptor = h
        .descriptor("main", "suite")
        .with_bundle(BundleDescriptor::eager(h.fixture.url("gone.jar")));
    assert!(matches!(
        h.registry.get_or_create(descriptor),
        Err(LaunchError::FetchFailure { .. })
    ));
    assert!(h.registry.is_empty());
}

// ---------------------------------------------------------------------------
// Caller checks
// ---------------------------------------------------------------------------

#[test]
fn test_caller_context_is_thread_scoped() {
    let h = Arc::new(LaunchHarness::new(MockTrustPrompt::declining()));
    let descriptor = h.unsigned_app("main", "suite", &["com.suite.Main"]);

    let sandboxed = {
        let h = Arc::clone(&h);
        let descriptor = descriptor.clone();
        std::thread::spawn(move || {
            let _ctx =
                CallerContext::application(suite(), SecurityLevel::Sandbox).enter();
            h.registry.get_or_create(descriptor).map(|_| ())
        })
    };
    let err = sandboxed.join().unwrap().unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedCaller));
    assert!(h.registry.is_empty());

    assert!(h.registry.get_or_create(descriptor.clone()).is_ok());

    let _ctx = CallerContext::application(suite(), SecurityLevel::Full).enter();
    assert!(h.registry.get_or_create(descriptor).is_ok());
}

#[test]
fn test_untrusted_caller_cannot_merge() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let first = h
        .registry
        .get_or_create(h.unsigned_app("one", "suite", &["com.one.A"]))
        .unwrap();

    let mut scope = ConstructionScope::new();
    let caller = CallerContext::application(suite(), SecurityLevel::Restricted);
    let err = h
        .registry
        .get_or_create_in(
            h.unsigned_app("two", "suite", &["com.two.B"]),
            &mut scope,
            &caller,
        )
        .unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedCaller));
    assert!(Arc::ptr_eq(&h.registry.get(&suite()).unwrap(), &first));
}

#[test]
fn test_sandboxed_caller_cannot_create_through_scope() {
    let h = LaunchHarness::new(MockTrustPrompt::accepting());
    let mut scope = ConstructionScope::new();
    let caller = CallerContext::application(suite(), SecurityLevel::Sandbox);

    let err = h
        .registry
        .get_or_create_in(
            h.unsigned_app("one", "suite", &["com.one.A"]),
            &mut scope,
            &caller,
        )
        .unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::UntrustedCaller));
    assert!(h.registry.is_empty());
    assert!(scope.chain().is_empty());
    assert_eq!(h.prompt.count(), 0);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[test]
fn test_shutdown_destroys_every_loader() {
    let h = LaunchHarness::new(MockTrustPrompt::declining());
    let ext = h.unsigned_app("ext", "ext", &["com.ext.E"]);
    h.descriptors.add(ext.clone());
    let main = h
        .registry
        .get_or_create(
            h.unsigned_app("main", "suite", &["com.suite.Main"])
                .with_extension(ExtensionRef::new(ext.source.clone())),
        )
        .unwrap();
    let other = h
        .registry
        .get_or_create(h.unsigned_app("tool", "tool", &["com.tool.Main"]))
        .unwrap();

    assert_eq!(h.registry.shutdown().unwrap(), 2);
    assert!(main.is_destroyed());
    assert!(main.peers()[0].is_destroyed());
    assert!(other.is_destroyed());
    assert!(h.registry.is_empty());
    assert_eq!(h.registry.shutdown().unwrap(), 0);
}
