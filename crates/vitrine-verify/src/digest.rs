use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use vitrine_manifest::IntegritySection;

/// Lowercase hex SHA-256 of an asset's bytes as stored after decompression.
pub fn hash_asset(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Aggregate digest over a set of per-file digests.
///
/// Digest values are sorted ascending and concatenated without a separator;
/// the UTF-8 bytes of that string are hashed. Input order never matters.
pub fn compute_manifest_hash<'a, I>(digests: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = digests.into_iter().collect();
    sorted.sort_unstable();
    hash_asset(sorted.concat().as_bytes())
}

/// Integrity section for a complete `path → digest` map.
pub fn integrity_section(assets: BTreeMap<String, String>) -> IntegritySection {
    let manifest_hash = compute_manifest_hash(assets.values().map(String::as_str));
    IntegritySection::new(manifest_hash, assets)
}
