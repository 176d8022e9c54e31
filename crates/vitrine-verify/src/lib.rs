//! Integrity hashing and verification for Vitrine 3D archives.
//!
//! Every asset is hashed with SHA-256 as it exists after decompression. The
//! manifest's aggregate digest is the SHA-256 of the sorted, concatenated
//! per-file hex digests, so any reader can recompute it independently.
//!
//! # Example
//!
//! ```
//! use vitrine_verify::{compute_manifest_hash, hash_asset};
//!
//! let digest = hash_asset(b"hello world");
//! assert_eq!(digest, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
//! assert_eq!(compute_manifest_hash([digest.as_str()]), hash_asset(digest.as_bytes()));
//! ```

pub use self::digest::{compute_manifest_hash, hash_asset, integrity_section};
pub use self::error::{Result, VerifyError};
pub use self::parallel::hash_assets;
pub use self::report::{
    AssetSource, DeclaredContent, IntegrityMismatchWarning, MismatchReport, verify,
};

mod digest;
mod error;
mod parallel;
mod report;
