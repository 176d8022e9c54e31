use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extension::ExtensionMap;

/// Identifier of the only digest algorithm the format uses.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// Per-file digests plus the aggregate digest over them.
///
/// `manifest_hash` is the digest of the sorted, concatenated values of
/// `assets`; it can always be recomputed from `assets` alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegritySection {
    pub algorithm: String,
    pub manifest_hash: String,
    /// Container-relative path → lowercase hex digest.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extensions: ExtensionMap,
}

impl IntegritySection {
    pub fn new(manifest_hash: String, assets: BTreeMap<String, String>) -> Self {
        Self {
            algorithm: HASH_ALGORITHM.to_string(),
            manifest_hash,
            assets,
            extensions: ExtensionMap::new(),
        }
    }

    pub fn uses_known_algorithm(&self) -> bool {
        self.algorithm.eq_ignore_ascii_case(HASH_ALGORITHM)
            || self.algorithm.eq_ignore_ascii_case("sha256")
    }
}
