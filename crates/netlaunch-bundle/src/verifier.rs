//! Signature verification across a bundle set.
//!
//! Each bundle is inspected on its own, then the set is classified into a
//! [`TrustState`]. Nothing here fails: broken signatures are reported as
//! data and the permission resolver decides what to do with them.

use std::collections::BTreeSet;
use std::fmt;

use netlaunch_core::TrustState;
use netlaunch_crypto::{Digest, PublisherId};
use tracing::{debug, warn};
use url::Url;

use crate::archive::BundleArchive;
use crate::signature_block::{SIGNATURE_PATH, SignatureBlock};

/// Why a signature block could not be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningDefect {
    /// The block does not parse or has no signers.
    Malformed(String),
    /// A signable entry is missing from the block.
    UncoveredEntry(String),
    /// An entry's contents do not match its recorded digest.
    DigestMismatch(String),
    /// The block lists an entry the bundle does not contain.
    MissingEntry(String),
    /// A signer's signature does not verify.
    BadSignature(PublisherId),
}

impl fmt::Display for SigningDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed signature block: {reason}"),
            Self::UncoveredEntry(path) => write!(f, "entry not covered by signature: {path}"),
            Self::DigestMismatch(path) => write!(f, "digest mismatch for {path}"),
            Self::MissingEntry(path) => write!(f, "signed entry missing from bundle: {path}"),
            Self::BadSignature(id) => write!(f, "invalid signature by {id}"),
        }
    }
}

/// Signature status of a single bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSigning {
    /// No signature block.
    Unsigned,
    /// No signable entries and no block; neutral for classification.
    Trivial,
    /// Every signable entry is covered and every signer verifies.
    Signed {
        /// Identities that signed the bundle.
        signers: BTreeSet<PublisherId>,
    },
    /// A block exists but cannot be trusted.
    Broken {
        /// What is wrong with it.
        defect: SigningDefect,
    },
}

impl BundleSigning {
    /// Signers of a fully signed bundle.
    #[must_use]
    pub fn signers(&self) -> Option<&BTreeSet<PublisherId>> {
        match self {
            Self::Signed { signers } => Some(signers),
            _ => None,
        }
    }

    /// Whether any of `trusted` signed this bundle. Trivial bundles count as signed.
    #[must_use]
    pub fn is_signed_by_any(&self, trusted: &BTreeSet<PublisherId>) -> bool {
        match self {
            Self::Trivial => true,
            Self::Signed { signers } => !signers.is_disjoint(trusted),
            Self::Unsigned | Self::Broken { .. } => false,
        }
    }
}

/// Why a bundle set is only partially trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialCause {
    /// A signature block is broken.
    SigningError,
    /// Signed bundles do not share a signer.
    InconsistentSigners,
    /// Some bundles carry no signature.
    UnsignedBundles,
}

/// Classification of a bundle set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Overall trust state.
    pub state: TrustState,
    /// Signers shared by every signed bundle.
    pub common_signers: BTreeSet<PublisherId>,
    /// Whether signed bundles agree on a signer and no block is broken.
    pub consistent: bool,
    /// Why the state is partial, when it is.
    pub partial_cause: Option<PartialCause>,
    /// Per-bundle results in inspection order.
    pub bundles: Vec<(Url, BundleSigning)>,
}

impl VerificationReport {
    /// Signing status recorded for `location`.
    #[must_use]
    pub fn signing_of(&self, location: &Url) -> Option<&BundleSigning> {
        self.bundles
            .iter()
            .find(|(loc, _)| loc == location)
            .map(|(_, signing)| signing)
    }
}

/// Accumulates bundle signatures and classifies the set.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    bundles: Vec<(Url, BundleSigning)>,
}

impl SignatureVerifier {
    /// An empty verifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect `archive` and record the result under `location`.
    pub fn add(&mut self, location: Url, archive: &BundleArchive) -> &BundleSigning {
        let signing = Self::inspect(archive);
        match &signing {
            BundleSigning::Broken { defect } => {
                warn!(bundle = %location, %defect, "Bundle signature is broken");
            },
            other => debug!(bundle = %location, signing = ?other, "Inspected bundle signature"),
        }
        self.bundles.push((location, signing));
        let last = self.bundles.len().saturating_sub(1);
        &self.bundles[last].1
    }

    /// Number of bundles inspected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Whether nothing has been inspected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Classify everything added so far.
    #[must_use]
    pub fn report(&self) -> VerificationReport {
        classify(self.bundles.clone())
    }

    /// Signature status of a single bundle.
    #[must_use]
    pub fn inspect(archive: &BundleArchive) -> BundleSigning {
        let Some(block_bytes) = archive.get(SIGNATURE_PATH) else {
            return if archive.signable_entries().next().is_none() {
                BundleSigning::Trivial
            } else {
                BundleSigning::Unsigned
            };
        };

        let broken = |defect| BundleSigning::Broken { defect };

        let block = match SignatureBlock::parse(block_bytes) {
            Ok(block) => block,
            Err(e) => return broken(SigningDefect::Malformed(e.to_string())),
        };
        if block.signers.is_empty() {
            return broken(SigningDefect::Malformed("no signers".to_string()));
        }

        for (path, data) in archive.signable_entries() {
            match block.entries.get(path) {
                None => return broken(SigningDefect::UncoveredEntry(path.to_string())),
                Some(digest) if *digest != Digest::of_entry(data) => {
                    return broken(SigningDefect::DigestMismatch(path.to_string()));
                },
                Some(_) => {},
            }
        }
        if let Some(missing) = block.entries.keys().find(|p| !archive.contains(p)) {
            return broken(SigningDefect::MissingEntry(missing.clone()));
        }

        let manifest = block.manifest_digest();
        let mut signers = BTreeSet::new();
        for signer in &block.signers {
            if signer
                .public_key
                .verify(manifest.as_bytes(), &signer.signature)
                .is_err()
            {
                return broken(SigningDefect::BadSignature(signer.public_key));
            }
            signers.insert(signer.public_key);
        }
        BundleSigning::Signed { signers }
    }
}

/// Classify a bundle set.
///
/// A set without signable code (empty, or trivial bundles only) is FULL with
/// no common signers.
#[must_use]
pub fn classify(bundles: Vec<(Url, BundleSigning)>) -> VerificationReport {
    let mut unsigned = 0usize;
    let mut signed = 0usize;
    let mut broken = 0usize;
    let mut common: Option<BTreeSet<PublisherId>> = None;

    for (_, signing) in &bundles {
        match signing {
            BundleSigning::Trivial => {},
            BundleSigning::Unsigned => unsigned = unsigned.saturating_add(1),
            BundleSigning::Broken { .. } => broken = broken.saturating_add(1),
            BundleSigning::Signed { signers } => {
                signed = signed.saturating_add(1);
                common = Some(match common {
                    None => signers.clone(),
                    Some(acc) => acc.intersection(signers).copied().collect(),
                });
            },
        }
    }

    let common_signers = common.unwrap_or_default();
    let signers_agree = signed == 0 || !common_signers.is_empty();
    let consistent = broken == 0 && signers_agree;

    let (state, partial_cause) = if signed == 0 && broken == 0 {
        if unsigned == 0 {
            (TrustState::Full, None)
        } else {
            (TrustState::None, None)
        }
    } else if broken > 0 {
        (TrustState::Partial, Some(PartialCause::SigningError))
    } else if !signers_agree {
        (TrustState::Partial, Some(PartialCause::InconsistentSigners))
    } else if unsigned > 0 {
        (TrustState::Partial, Some(PartialCause::UnsignedBundles))
    } else {
        (TrustState::Full, None)
    };

    VerificationReport {
        state,
        common_signers,
        consistent,
        partial_cause,
        bundles,
    }
}
