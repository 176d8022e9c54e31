use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use vitrine_manifest::{
    Annotation, ArchivalRecord, AssetType, ConformanceLevel, DataEntry, EntryKey, ExtensionMap,
    FieldIssue, Manifest, MaterialStandard, Preservation, Project, Provenance, QualityMetrics,
    Relationships, Transform, ValidationReport,
};
use vitrine_verify::{hash_assets, integrity_section};

use crate::container::ContainerWriter;
use crate::error::{Error, Result};
use crate::format::{CompressionHint, ContainerVariant, MANIFEST_NAME};
use crate::options::PackOptions;
use crate::sanitize::sanitize_name;

/// Directory registered assets are placed under.
pub const ASSET_DIR: &str = "assets";

/// Longest file extension carried over from an original file name.
const MAX_EXTENSION_LEN: usize = 10;

/// Lifecycle of an [`ArchiveBuilder`].
///
/// Any mutation returns the builder to `Accumulating` and drops computed
/// digests, so a packed archive never carries stale integrity data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderState {
    Empty,
    Accumulating,
    Validated,
    Hashed,
    Packed,
}

/// Descriptive fields recorded on a new [`DataEntry`].
#[derive(Clone, Debug, Default)]
pub struct AssetMetadata {
    pub original_name: Option<String>,
    pub created_by: Option<String>,
    pub created_by_version: Option<String>,
    pub source_notes: Option<String>,
    pub extensions: ExtensionMap,
}

impl AssetMetadata {
    pub fn original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    pub fn created_by(mut self, tool: impl Into<String>, version: Option<String>) -> Self {
        self.created_by = Some(tool.into());
        self.created_by_version = version;
        self
    }

    pub fn source_notes(mut self, notes: impl Into<String>) -> Self {
        self.source_notes = Some(notes.into());
        self
    }

    /// Extension of the original file name, if it is short and alphanumeric.
    fn extension(&self) -> Option<String> {
        let name = self.original_name.as_deref()?;
        let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let (stem, ext) = file.rsplit_once('.')?;
        let usable = !stem.is_empty()
            && !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_LEN
            && ext.chars().all(|c| c.is_ascii_alphanumeric());
        usable.then(|| ext.to_ascii_lowercase())
    }
}

/// Output of [`ArchiveBuilder::pack`].
#[derive(Clone, Debug)]
pub struct PackedArchive {
    pub bytes: Vec<u8>,
    /// The manifest exactly as written into the container.
    pub manifest: Manifest,
    pub variant: ContainerVariant,
}

impl PackedArchive {
    /// Conventional file name for this archive, e.g. `bust.a3z`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.variant.extension())
    }

    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path.as_ref(), &self.bytes).await?;
        Ok(())
    }
}

struct StagedFile {
    bytes: Bytes,
    hint: CompressionHint,
}

/// Accumulates assets and metadata, then packs them into a container.
pub struct ArchiveBuilder {
    draft: Manifest,
    files: BTreeMap<String, StagedFile>,
    /// Next index per asset type. Never decremented, so removed keys are
    /// not reused.
    counters: BTreeMap<String, u32>,
    options: PackOptions,
    state: BuilderState,
}

impl ArchiveBuilder {
    pub fn new(producer: impl Into<String>) -> Self {
        Self {
            draft: Manifest::new(producer),
            files: BTreeMap::new(),
            counters: BTreeMap::new(),
            options: PackOptions::default(),
            state: BuilderState::Empty,
        }
    }

    /// Seed a builder from an existing manifest and its container files.
    ///
    /// File names are sanitized; the manifest entry itself is ignored if
    /// present. Any integrity section is discarded.
    pub fn from_manifest(
        mut manifest: Manifest,
        files: impl IntoIterator<Item = (String, Bytes)>,
    ) -> Result<Self> {
        manifest.integrity = None;

        let mut staged = BTreeMap::new();
        for (name, bytes) in files {
            let name = sanitize_name(&name)?;
            if name == MANIFEST_NAME {
                continue;
            }
            staged.insert(
                name,
                StagedFile {
                    bytes,
                    hint: CompressionHint::Auto,
                },
            );
        }

        let mut counters = BTreeMap::new();
        for key in manifest.data_entries.keys() {
            if let Ok(key) = key.parse::<EntryKey>() {
                let next = counters.entry(key.asset_type.as_str().to_string()).or_insert(0);
                *next = (*next).max(key.index + 1);
            }
        }

        let state = if staged.is_empty() && manifest.data_entries.is_empty() {
            BuilderState::Empty
        } else {
            BuilderState::Accumulating
        };
        Ok(Self {
            draft: manifest,
            files: staged,
            counters,
            options: PackOptions::default(),
            state,
        })
    }

    pub fn with_options(mut self, options: PackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// The manifest as it currently stands.
    pub fn manifest(&self) -> &Manifest {
        &self.draft
    }

    /// Paths of every staged file, sorted.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Register an asset and return its entry key (`<type>_<index>`).
    ///
    /// The file is stored at `assets/<key>.<ext>`, where `ext` comes from
    /// the original file name when usable and from the asset type otherwise.
    pub fn add_asset(
        &mut self,
        asset_type: impl Into<AssetType>,
        bytes: impl Into<Bytes>,
        transform: Transform,
        metadata: AssetMetadata,
    ) -> Result<String> {
        let asset_type = asset_type.into();
        let index = self
            .counters
            .get(asset_type.as_str())
            .copied()
            .unwrap_or(0)
            .max(self.draft.next_index(&asset_type));
        let key = EntryKey::new(asset_type.clone(), index).to_string();

        let ext = metadata
            .extension()
            .unwrap_or_else(|| asset_type.default_extension().to_string());
        let path = sanitize_name(&format!("{ASSET_DIR}/{key}.{ext}"))?;
        if self.files.contains_key(&path) {
            return Err(Error::DuplicateEntry(path));
        }

        let entry = DataEntry {
            file_name: path.clone(),
            original_name: metadata.original_name,
            created_by: metadata.created_by,
            created_by_version: metadata.created_by_version,
            source_notes: metadata.source_notes,
            transform,
            extensions: metadata.extensions,
        };

        self.touch();
        self.files.insert(
            path.clone(),
            StagedFile {
                bytes: bytes.into(),
                hint: CompressionHint::Auto,
            },
        );
        self.draft.data_entries.insert(key.clone(), entry);
        self.counters
            .insert(asset_type.as_str().to_string(), index + 1);

        tracing::debug!(%key, %path, "asset registered");
        Ok(key)
    }

    /// Stage a supporting file that no data entry references.
    ///
    /// Returns the name the file is stored under, which is `path` after
    /// normalization: empty and `.` segments are dropped, so `"docs//a.txt"`
    /// is stored as `"docs/a.txt"` and a trailing `/` disappears. Use the
    /// returned name, not `path`, wherever the file is referenced.
    pub fn add_file(
        &mut self,
        path: &str,
        bytes: impl Into<Bytes>,
        hint: CompressionHint,
    ) -> Result<String> {
        let path = sanitize_name(path)?;
        if path == MANIFEST_NAME || self.files.contains_key(&path) {
            return Err(Error::DuplicateEntry(path));
        }
        self.touch();
        self.files.insert(
            path.clone(),
            StagedFile {
                bytes: bytes.into(),
                hint,
            },
        );
        Ok(path)
    }

    /// Remove an asset and its file. The key's index is not reused.
    pub fn remove_asset(&mut self, key: &str) -> Option<DataEntry> {
        let entry = self.draft.data_entries.remove(key)?;
        self.touch();
        if let Ok(path) = sanitize_name(&entry.file_name) {
            self.files.remove(&path);
        }
        Some(entry)
    }

    pub fn remove_file(&mut self, path: &str) -> bool {
        let Ok(path) = sanitize_name(path) else {
            return false;
        };
        let removed = self.files.remove(&path).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    pub fn set_project_title(&mut self, title: impl Into<String>) {
        self.touch();
        self.draft.project_mut().title = Some(title.into());
    }

    pub fn set_project(&mut self, project: Project) {
        self.touch();
        self.draft.project = Some(project);
    }

    pub fn set_producer_version(&mut self, version: impl Into<String>) {
        self.touch();
        self.draft.producer_version = Some(version.into());
    }

    pub fn set_relationships(&mut self, relationships: Relationships) {
        self.touch();
        self.draft.relationships = Some(relationships);
    }

    pub fn set_provenance(&mut self, provenance: Provenance) {
        self.touch();
        self.draft.provenance = Some(provenance);
    }

    pub fn set_quality_metrics(&mut self, metrics: QualityMetrics) {
        self.touch();
        self.draft.quality_metrics = Some(metrics);
    }

    pub fn set_archival_record(&mut self, record: ArchivalRecord) {
        self.touch();
        self.draft.archival_record = Some(record);
    }

    pub fn set_material_standard(&mut self, standard: MaterialStandard) {
        self.touch();
        self.draft.material_standard = Some(standard);
    }

    pub fn set_preservation(&mut self, preservation: Preservation) {
        self.touch();
        self.draft.preservation = Some(preservation);
    }

    /// Set an unrecognized root field, written verbatim.
    pub fn set_extension(&mut self, key: impl Into<String>, value: Value) {
        self.touch();
        self.draft.extensions.insert(key, value);
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<()> {
        if self.draft.annotation(&annotation.id).is_some() {
            return Err(Error::DuplicateAnnotation(annotation.id));
        }
        self.touch();
        self.draft.annotations.push(annotation);
        Ok(())
    }

    pub fn remove_annotation(&mut self, id: &str) -> Option<Annotation> {
        let position = self.draft.annotations.iter().position(|a| a.id == id)?;
        self.touch();
        Some(self.draft.annotations.remove(position))
    }

    /// Check the draft at Minimal level, including that every data entry's
    /// file has been staged.
    pub fn validate(&mut self) -> ValidationReport {
        let mut report = self.draft.validate(ConformanceLevel::Minimal);
        for (key, entry) in &self.draft.data_entries {
            let staged = sanitize_name(&entry.file_name)
                .map(|path| self.files.contains_key(&path))
                .unwrap_or(false);
            if !staged {
                report.push_required(FieldIssue::new(
                    format!("data_entries.{key}.file_name"),
                    ConformanceLevel::Minimal,
                    format!("'{}' was never added", entry.file_name),
                ));
            }
        }

        if report.passes_minimal() && self.state == BuilderState::Accumulating {
            self.state = BuilderState::Validated;
        }
        report
    }

    /// Validate, then hash every staged file on the blocking pool.
    pub async fn compute_hashes(&mut self, cancel: &CancellationToken) -> Result<()> {
        let report = self.validate();
        if !report.passes_minimal() {
            return Err(Error::ManifestValidation { report });
        }

        let assets = self
            .files
            .iter()
            .map(|(path, file)| (path.clone(), file.bytes.clone()))
            .collect();
        match hash_assets(assets, cancel).await {
            Ok(digests) => {
                let section = integrity_section(digests);
                tracing::debug!(manifest_hash = %section.manifest_hash, "assets hashed");
                self.draft.integrity = Some(section);
                self.state = BuilderState::Hashed;
                Ok(())
            }
            Err(err) => {
                self.revert();
                Err(err.into())
            }
        }
    }

    /// Produce the container.
    ///
    /// Digests are recomputed unless the builder is already `Hashed`, so a
    /// mutation after an earlier pack can never leave stale values behind.
    /// On cancellation or failure the builder returns to `Accumulating`.
    pub async fn pack(&mut self, cancel: &CancellationToken) -> Result<PackedArchive> {
        if self.options.include_integrity {
            if self.state != BuilderState::Hashed {
                self.compute_hashes(cancel).await?;
            }
        } else {
            self.draft.integrity = None;
            let report = self.validate();
            if !report.passes_minimal() {
                return Err(Error::ManifestValidation { report });
            }
        }

        let manifest_bytes = self.draft.to_vec().map_err(Error::ManifestSerialize)?;
        let variant = self.options.variant;
        let mut writer =
            ContainerWriter::new(variant).compression_level(self.options.compression_level);
        writer.add_entry(MANIFEST_NAME, manifest_bytes, CompressionHint::Auto)?;
        for (path, file) in &self.files {
            writer.add_entry(path, file.bytes.clone(), file.hint)?;
        }

        let on_progress = self.options.on_progress.clone();
        let task_cancel = cancel.clone();
        let joined = tokio::task::spawn_blocking(move || {
            writer.finalize(on_progress.as_ref(), &task_cancel)
        })
        .await;

        match joined {
            Ok(Ok(bytes)) => {
                self.state = BuilderState::Packed;
                tracing::info!(
                    size = bytes.len(),
                    files = self.files.len(),
                    %variant,
                    "archive packed"
                );
                Ok(PackedArchive {
                    bytes,
                    manifest: self.draft.clone(),
                    variant,
                })
            }
            Ok(Err(err)) => {
                self.revert();
                Err(err)
            }
            Err(join) => {
                self.revert();
                Err(Error::TaskFailed(join.to_string()))
            }
        }
    }

    fn touch(&mut self) {
        if self.draft.integrity.take().is_some() {
            tracing::trace!("integrity invalidated by mutation");
        }
        self.state = BuilderState::Accumulating;
    }

    fn revert(&mut self) {
        self.draft.integrity = None;
        self.state = BuilderState::Accumulating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_manifest::Vec3;

    fn builder() -> ArchiveBuilder {
        let mut builder = ArchiveBuilder::new("vitrine-test");
        builder.set_project_title("Test");
        builder
    }

    #[test]
    fn asset_keys_and_paths_are_deterministic() {
        let mut builder = builder();
        let mesh = builder
            .add_asset("mesh", b"a".to_vec(), Transform::default(), AssetMetadata::default())
            .unwrap();
        let scene = builder
            .add_asset(
                AssetType::Scene,
                b"b".to_vec(),
                Transform::default(),
                AssetMetadata::default().original_name("C:\\scans\\Bust.SPLAT"),
            )
            .unwrap();
        let mesh2 = builder
            .add_asset("mesh", b"c".to_vec(), Transform::default(), AssetMetadata::default())
            .unwrap();

        assert_eq!((mesh.as_str(), scene.as_str(), mesh2.as_str()), ("mesh_0", "scene_0", "mesh_1"));
        let manifest = builder.manifest();
        assert_eq!(manifest.data_entries["mesh_0"].file_name, "assets/mesh_0.glb");
        assert_eq!(manifest.data_entries["scene_0"].file_name, "assets/scene_0.splat");
        assert_eq!(
            builder.files().collect::<Vec<_>>(),
            vec!["assets/mesh_0.glb", "assets/mesh_1.glb", "assets/scene_0.splat"]
        );
    }

    #[test]
    fn unusable_original_extension_falls_back() {
        for name in ["noext", ".hidden", "weird.e x t", "long.abcdefghijk"] {
            let metadata = AssetMetadata::default().original_name(name);
            assert_eq!(metadata.extension(), None, "{name}");
        }
    }

    #[test]
    fn removed_index_is_not_reused() {
        let mut builder = builder();
        let key = builder
            .add_asset("mesh", b"a".to_vec(), Transform::default(), AssetMetadata::default())
            .unwrap();
        assert!(builder.remove_asset(&key).is_some());
        assert_eq!(builder.files().count(), 0);
        let next = builder
            .add_asset("mesh", b"b".to_vec(), Transform::default(), AssetMetadata::default())
            .unwrap();
        assert_eq!(next, "mesh_1");
    }

    #[test]
    fn state_machine() {
        let mut builder = ArchiveBuilder::new("vitrine-test");
        assert_eq!(builder.state(), BuilderState::Empty);

        builder.set_project_title("Test");
        assert_eq!(builder.state(), BuilderState::Accumulating);
        assert!(!builder.validate().passes_minimal());
        assert_eq!(builder.state(), BuilderState::Accumulating);

        builder
            .add_asset("mesh", b"a".to_vec(), Transform::default(), AssetMetadata::default())
            .unwrap();
        assert!(builder.validate().passes_minimal());
        assert_eq!(builder.state(), BuilderState::Validated);

        builder.set_extension("viewer", serde_json::json!({ "fov": 45 }));
        assert_eq!(builder.state(), BuilderState::Accumulating);
    }

    #[test]
    fn validate_reports_unstaged_entry_files() {
        let mut manifest = Manifest::new("vitrine-test");
        manifest.project = Some(Project::titled("Test"));
        manifest
            .data_entries
            .insert("mesh_0".into(), DataEntry::new("assets/mesh_0.glb"));
        let mut builder = ArchiveBuilder::from_manifest(manifest, Vec::new()).unwrap();

        let report = builder.validate();
        assert!(!report.passes_minimal());
        assert_eq!(report.missing_required[0].field, "data_entries.mesh_0.file_name");
    }

    #[test]
    fn seeded_counters_continue_after_existing_keys() {
        let mut manifest = Manifest::new("vitrine-test");
        manifest
            .data_entries
            .insert("mesh_3".into(), DataEntry::new("assets/mesh_3.glb"));
        let files = vec![("assets/mesh_3.glb".to_string(), Bytes::from_static(b"m"))];
        let mut builder = ArchiveBuilder::from_manifest(manifest, files).unwrap();
        let key = builder
            .add_asset("mesh", b"n".to_vec(), Transform::default(), AssetMetadata::default())
            .unwrap();
        assert_eq!(key, "mesh_4");
    }

    #[test]
    fn seeding_rejects_unsafe_file_names() {
        let files = vec![("../x".to_string(), Bytes::new())];
        assert!(matches!(
            ArchiveBuilder::from_manifest(Manifest::default(), files),
            Err(Error::FilenameSecurity(_))
        ));
    }

    #[test]
    fn duplicate_annotation_ids_are_rejected() {
        let mut builder = builder();
        let note = Annotation::new("a1", "Crack", Vec3::new(0.0, 1.0, 0.0));
        builder.add_annotation(note.clone()).unwrap();
        assert!(matches!(
            builder.add_annotation(note),
            Err(Error::DuplicateAnnotation(id)) if id == "a1"
        ));
        assert!(builder.remove_annotation("a1").is_some());
        assert!(builder.remove_annotation("a1").is_none());
    }

    #[test]
    fn supporting_files_cannot_shadow_the_manifest() {
        let mut builder = builder();
        assert!(matches!(
            builder.add_file("manifest.json", b"{}".to_vec(), CompressionHint::Auto),
            Err(Error::DuplicateEntry(_))
        ));
        assert_eq!(
            builder
                .add_file("docs//README.txt", b"hi".to_vec(), CompressionHint::Compress)
                .unwrap(),
            "docs/README.txt"
        );
    }

    #[test]
    fn staged_file_is_known_by_its_normalized_name() {
        let mut builder = builder();
        let stored = builder
            .add_file("docs/./notes/", b"n".to_vec(), CompressionHint::Auto)
            .unwrap();
        assert_eq!(stored, "docs/notes");
        assert!(builder.files().any(|f| f == stored));
        assert!(!builder.files().any(|f| f == "docs/./notes/"));
        assert!(matches!(
            builder.add_file("docs//notes", b"m".to_vec(), CompressionHint::Auto),
            Err(Error::DuplicateEntry(name)) if name == "docs/notes"
        ));
        assert!(builder.remove_file("docs/notes/"));
    }
}
