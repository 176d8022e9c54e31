use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use vitrine_manifest::{IntegritySection, Manifest};

use crate::digest::{compute_manifest_hash, hash_asset};
use crate::error::{self, VerifyError};
use crate::parallel::hash_assets;

/// Anything verification can pull asset bytes from by container path.
pub trait AssetSource {
    type Error: fmt::Display;

    /// Bytes stored at `path`, or `None` when no such entry exists.
    fn read_asset(&mut self, path: &str) -> Result<Option<Vec<u8>>, Self::Error>;
}

impl<B: AsRef<[u8]>> AssetSource for BTreeMap<String, B> {
    type Error = Infallible;

    fn read_asset(&mut self, path: &str) -> Result<Option<Vec<u8>>, Infallible> {
        Ok(self.get(path).map(|b| b.as_ref().to_vec()))
    }
}

/// A single integrity finding. Never fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrityMismatchWarning {
    /// The manifest has no integrity section; nothing could be checked.
    NoIntegritySection,
    UnsupportedAlgorithm(String),
    AssetDigest {
        path: String,
        expected: String,
        actual: String,
    },
    AssetMissing {
        path: String,
    },
    AssetUnreadable {
        path: String,
        reason: String,
    },
    /// The declared aggregate does not match the declared per-file digests.
    InconsistentManifestHash {
        declared: String,
        recomputed: String,
    },
    /// The aggregate over the actual content differs from the declared one.
    ManifestHash {
        expected: String,
        actual: String,
    },
}

impl IntegrityMismatchWarning {
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::AssetDigest { path, .. }
            | Self::AssetMissing { path }
            | Self::AssetUnreadable { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for IntegrityMismatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIntegritySection => f.write_str("manifest has no integrity section"),
            Self::UnsupportedAlgorithm(algo) => write!(f, "unsupported hash algorithm '{algo}'"),
            Self::AssetDigest { path, expected, actual } => {
                write!(f, "digest mismatch for '{path}': expected {expected}, got {actual}")
            }
            Self::AssetMissing { path } => write!(f, "'{path}' is declared but absent"),
            Self::AssetUnreadable { path, reason } => write!(f, "'{path}' unreadable: {reason}"),
            Self::InconsistentManifestHash { declared, recomputed } => write!(
                f,
                "declared manifest hash {declared} does not match declared asset digests ({recomputed})"
            ),
            Self::ManifestHash { expected, actual } => {
                write!(f, "manifest hash mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

/// Outcome of [`verify`]. Advisory only; callers decide whether to block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MismatchReport {
    /// Paths whose content matched the declared digest.
    pub verified: Vec<String>,
    pub warnings: Vec<IntegrityMismatchWarning>,
}

impl MismatchReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Paths with any per-asset finding.
    pub fn mismatched_paths(&self) -> Vec<&str> {
        self.warnings.iter().filter_map(|w| w.path()).collect()
    }

    pub fn manifest_hash_mismatch(&self) -> bool {
        self.warnings.iter().any(|w| {
            matches!(
                w,
                IntegrityMismatchWarning::ManifestHash { .. }
                    | IntegrityMismatchWarning::InconsistentManifestHash { .. }
            )
        })
    }
}

/// Recompute every declared digest from `source` and compare.
///
/// Never mutates the manifest and never fails; every problem becomes a
/// warning in the report.
pub fn verify<S: AssetSource>(source: &mut S, manifest: &Manifest) -> MismatchReport {
    let mut report = MismatchReport::default();
    let Some(integrity) = preflight(manifest.integrity.as_ref(), &mut report) else {
        return report;
    };

    let outcomes = integrity
        .assets
        .keys()
        .map(|path| {
            let outcome = match fetch(source, path) {
                Fetched::Present(bytes) => Outcome::Hashed(hash_asset(&bytes)),
                Fetched::Absent(outcome) => outcome,
            };
            (path.clone(), outcome)
        })
        .collect();

    conclude(integrity, outcomes, &mut report);
    report
}

/// Declared assets pulled out of a source, not yet hashed.
///
/// [`verify`] in two halves: a synchronous [`read`](Self::read) and an async
/// [`verify`](Self::verify) on the blocking pool. Cancellation is checked
/// between entries in both.
#[derive(Debug, Default)]
pub struct DeclaredContent {
    integrity: Option<IntegritySection>,
    present: Vec<(String, Bytes)>,
    absent: BTreeMap<String, Outcome>,
}

impl DeclaredContent {
    /// Read every asset `manifest` declares a digest for.
    pub fn read<S: AssetSource>(
        source: &mut S,
        manifest: &Manifest,
        cancel: &CancellationToken,
    ) -> error::Result<Self> {
        let mut content = Self {
            integrity: manifest.integrity.clone(),
            ..Self::default()
        };
        let checkable = manifest.integrity.as_ref().filter(|i| i.uses_known_algorithm());
        let Some(integrity) = checkable else {
            return Ok(content);
        };

        for path in integrity.assets.keys() {
            if cancel.is_cancelled() {
                return Err(VerifyError::Cancelled);
            }
            match fetch(source, path) {
                Fetched::Present(bytes) => content.present.push((path.clone(), Bytes::from(bytes))),
                Fetched::Absent(outcome) => {
                    content.absent.insert(path.clone(), outcome);
                }
            }
        }
        Ok(content)
    }

    /// Hash what was read and compare against the declared digests.
    pub async fn verify(self, cancel: &CancellationToken) -> error::Result<MismatchReport> {
        let mut report = MismatchReport::default();
        let Some(integrity) = preflight(self.integrity.as_ref(), &mut report) else {
            return Ok(report);
        };

        let mut outcomes = self.absent;
        let digests = hash_assets(self.present, cancel).await?;
        outcomes.extend(digests.into_iter().map(|(path, digest)| (path, Outcome::Hashed(digest))));

        conclude(integrity, outcomes, &mut report);
        Ok(report)
    }
}

#[derive(Debug)]
enum Outcome {
    Hashed(String),
    Missing,
    Unreadable(String),
}

enum Fetched {
    Present(Vec<u8>),
    Absent(Outcome),
}

fn fetch<S: AssetSource>(source: &mut S, path: &str) -> Fetched {
    match source.read_asset(path) {
        Ok(Some(bytes)) => Fetched::Present(bytes),
        Ok(None) => Fetched::Absent(Outcome::Missing),
        Err(err) => Fetched::Absent(Outcome::Unreadable(err.to_string())),
    }
}

/// Section-level checks. Returns the section only if its assets can be checked.
fn preflight<'a>(
    integrity: Option<&'a IntegritySection>,
    report: &mut MismatchReport,
) -> Option<&'a IntegritySection> {
    let Some(integrity) = integrity else {
        report.warnings.push(IntegrityMismatchWarning::NoIntegritySection);
        return None;
    };
    if !integrity.uses_known_algorithm() {
        report
            .warnings
            .push(IntegrityMismatchWarning::UnsupportedAlgorithm(integrity.algorithm.clone()));
        return None;
    }

    let recomputed = compute_manifest_hash(integrity.assets.values().map(String::as_str));
    if !recomputed.eq_ignore_ascii_case(&integrity.manifest_hash) {
        report.warnings.push(IntegrityMismatchWarning::InconsistentManifestHash {
            declared: integrity.manifest_hash.clone(),
            recomputed,
        });
    }
    Some(integrity)
}

fn conclude(
    integrity: &IntegritySection,
    mut outcomes: BTreeMap<String, Outcome>,
    report: &mut MismatchReport,
) {
    // Aggregate over actual content; a path that cannot be read poisons it.
    let mut actual_digests = Vec::with_capacity(integrity.assets.len());
    let mut content_complete = true;

    for (path, expected) in &integrity.assets {
        match outcomes.remove(path).unwrap_or(Outcome::Missing) {
            Outcome::Hashed(actual) => {
                if actual.eq_ignore_ascii_case(expected) {
                    report.verified.push(path.clone());
                } else {
                    tracing::warn!(%path, %expected, %actual, "asset digest mismatch");
                    report.warnings.push(IntegrityMismatchWarning::AssetDigest {
                        path: path.clone(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                    });
                }
                actual_digests.push(actual);
            }
            Outcome::Missing => {
                tracing::warn!(%path, "declared asset is missing");
                report
                    .warnings
                    .push(IntegrityMismatchWarning::AssetMissing { path: path.clone() });
                content_complete = false;
            }
            Outcome::Unreadable(reason) => {
                tracing::warn!(%path, error = %reason, "declared asset is unreadable");
                report.warnings.push(IntegrityMismatchWarning::AssetUnreadable {
                    path: path.clone(),
                    reason,
                });
                content_complete = false;
            }
        }
    }

    let actual = compute_manifest_hash(actual_digests.iter().map(String::as_str));
    if !content_complete || !actual.eq_ignore_ascii_case(&integrity.manifest_hash) {
        report.warnings.push(IntegrityMismatchWarning::ManifestHash {
            expected: integrity.manifest_hash.clone(),
            actual,
        });
    }
}
