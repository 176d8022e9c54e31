//! Manifest model for Vitrine 3D archives.
//!
//! # Architecture
//!
//! - `manifest.rs` - Root document, lenient parse and faithful serialize
//! - `extension.rs` - Verbatim storage for unrecognized fields
//! - `presence.rs` - Null and empty known fields kept across a save
//! - `entry.rs` - Data entries, entry keys, transforms
//! - `sections.rs` - Descriptive sections (project, provenance, ...)
//! - `validate.rs` - Conformance levels and validation reports
//! - `version.rs` - Format version and compatibility policy

pub use annotation::{Annotation, Vec3};
pub use entry::{AssetType, DataEntry, EntryKey, Transform};
pub use error::{Error, Result};
pub use extension::ExtensionMap;
pub use integrity::{HASH_ALGORITHM, IntegritySection};
pub use manifest::Manifest;
pub use sections::{
    ArchivalIds, ArchivalRecord, CaptureResolution, Creation, MaterialStandard,
    PhysicalDescription, Preservation, ProcessingStep, Project, Provenance, QualityMetrics,
    Relationships, Rights,
};
pub use validate::{ConformanceLevel, FieldIssue, ValidationReport, validate};
pub use version::{CURRENT_VERSION, Compatibility, FormatVersion, assess};

mod annotation;
mod entry;
mod error;
mod extension;
mod integrity;
mod manifest;
mod presence;
pub mod sections;
pub mod validate;
pub mod version;
