//! Vitrine: a self-describing archival container for 3D assets.
//!
//! An archive is a zip container holding `manifest.json` at its root plus
//! the asset files it describes. The manifest carries provenance, quality
//! and archival metadata, and a SHA-256 integrity section covering every
//! other file in the container.
//!
//! # Architecture
//!
//! - `sanitize.rs` - Entry name validation; every name crossing the container boundary
//! - `format.rs` - Container variants and compression selection
//! - `container/` - Zip read and write
//! - `reader.rs` - Open, validate, extract, verify
//! - `builder.rs` - Accumulate, validate, hash, pack
//!
//! The manifest model lives in [`vitrine_manifest`] and hashing in
//! [`vitrine_verify`]; both are re-exported here.
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use vitrine_archive::{ArchiveBuilder, ArchiveReader, AssetMetadata, ReaderOptions, Transform};
//!
//! # async fn run() -> vitrine_archive::Result<()> {
//! let mut builder = ArchiveBuilder::new("my-tool");
//! builder.set_project_title("Marble bust");
//! builder.add_asset("mesh", std::fs::read("bust.glb")?, Transform::default(), AssetMetadata::default())?;
//! let packed = builder.pack(&CancellationToken::new()).await?;
//!
//! let mut reader = ArchiveReader::open(packed.bytes, &ReaderOptions::default())?;
//! let mesh = reader.extract_asset("mesh_0").await?;
//! assert!(reader.verify(&CancellationToken::new()).await?.is_clean());
//! # let _ = mesh;
//! # Ok(())
//! # }
//! ```

pub use self::builder::{ASSET_DIR, ArchiveBuilder, AssetMetadata, BuilderState, PackedArchive};
pub use self::container::{ContainerHandle, ContainerWriter, EntryDescriptor};
pub use self::error::{Error, Result};
pub use self::format::{
    CONTAINER_MAGIC, CompressionHint, ContainerVariant, MANIFEST_NAME, Strategy,
    has_container_magic, is_precompressed,
};
pub use self::options::{PackOptions, Progress, ProgressCallback, ReaderOptions};
pub use self::reader::{ArchiveReader, ReaderState};
pub use self::sanitize::{FilenameSecurityError, MAX_NAME_LEN, Violation, is_safe_name, sanitize_name};

pub use tokio_util::sync::CancellationToken;
pub use vitrine_manifest::{
    self as manifest, Annotation, AssetType, Compatibility, ConformanceLevel, DataEntry, EntryKey,
    ExtensionMap, Manifest, Transform, ValidationReport, Vec3,
};
pub use vitrine_verify::{self as verify, IntegrityMismatchWarning, MismatchReport};

mod builder;
mod container;
mod error;
mod format;
mod options;
mod reader;
mod sanitize;
