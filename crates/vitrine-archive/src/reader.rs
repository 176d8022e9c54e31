use std::path::Path;

use bytes::Bytes;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use vitrine_manifest::{Compatibility, EntryKey, Manifest, ValidationReport};
use vitrine_verify::{DeclaredContent, MismatchReport};

use crate::builder::ArchiveBuilder;
use crate::container::{ContainerHandle, EntryDescriptor};
use crate::error::{Error, Result};
use crate::format::MANIFEST_NAME;
use crate::options::ReaderOptions;
use crate::sanitize::sanitize_name;

/// Lifecycle of an [`ArchiveReader`].
///
/// `Unopened` and `ContainerOpen` are only ever observed inside
/// [`ArchiveReader::open`]; a reader that fails to reach `ManifestParsed` is
/// never handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    Unopened,
    ContainerOpen,
    ManifestParsed,
    AssetsAccessible,
    Disposed,
}

/// Read access to an existing archive.
pub struct ArchiveReader {
    container: Option<ContainerHandle>,
    manifest: Manifest,
    validation: ValidationReport,
    compatibility: Compatibility,
    state: ReaderState,
}

impl ArchiveReader {
    /// Open a container held in memory.
    ///
    /// Structural problems fail here: a non-zip payload, no root
    /// `manifest.json`, malformed manifest JSON, or a manifest missing
    /// Minimal-level fields. Unknown fields and newer versions do not.
    pub fn open(bytes: impl Into<Bytes>, options: &ReaderOptions) -> Result<Self> {
        let mut state = ReaderState::Unopened;
        let mut container = ContainerHandle::open(bytes)?;
        advance(&mut state, ReaderState::ContainerOpen);

        if !container.contains(MANIFEST_NAME) {
            return Err(Error::ManifestMissing);
        }
        let raw = container.read_entry(MANIFEST_NAME)?;
        let manifest = Manifest::from_slice(&raw).map_err(Error::ManifestParse)?;

        let compatibility = manifest.compatibility();
        if compatibility.degrades_to_optional() && options.refuse_foreign_major {
            return Err(Error::UnsupportedVersion(compatibility));
        }
        if compatibility.is_best_effort() {
            tracing::warn!(%compatibility, "reading manifest best-effort");
        }

        let mut validation = manifest.validate(options.conformance);
        if compatibility.degrades_to_optional() {
            validation = validation.relaxed();
        }
        if !validation.passes_minimal() {
            return Err(Error::ManifestValidation { report: validation });
        }
        for issue in &validation.missing_required {
            tracing::info!(field = %issue.field, level = %issue.level, "manifest below requested level");
        }
        advance(&mut state, ReaderState::ManifestParsed);

        tracing::debug!(
            entries = container.entries().len(),
            data_entries = manifest.data_entries.len(),
            "archive opened"
        );
        Ok(Self {
            container: Some(container),
            manifest,
            validation,
            compatibility,
            state,
        })
    }

    /// Read a container file and open it.
    pub async fn open_path(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Self::open(bytes, options)
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn compatibility(&self) -> &Compatibility {
        &self.compatibility
    }

    /// Every container entry, manifest included. Empty once disposed.
    pub fn entries(&self) -> &[EntryDescriptor] {
        self.container
            .as_ref()
            .map(ContainerHandle::entries)
            .unwrap_or_default()
    }

    /// Decompressed bytes of the asset registered under `key`.
    ///
    /// An entry kept verbatim because it did not decode is still readable
    /// when it names its file.
    pub async fn extract_asset(&mut self, key: &str) -> Result<Vec<u8>> {
        let file_name = match self.manifest.data_entries.get(key) {
            Some(entry) => entry.file_name.clone(),
            None => self
                .manifest
                .raw_entries
                .get(key)
                .and_then(|raw| raw.get("file_name"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::not_found(key))?,
        };
        self.extract_file(&file_name).await
    }

    /// Decompressed bytes of any container entry, by path.
    ///
    /// Decompression runs on the blocking pool.
    pub async fn extract_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut container = self.container.clone().ok_or(Error::Disposed)?;
        let name = path.to_string();
        let bytes = tokio::task::spawn_blocking(move || container.read_sanitized(&name))
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))??
            .ok_or_else(|| Error::not_found(path))?;
        advance(&mut self.state, ReaderState::AssetsAccessible);
        Ok(bytes)
    }

    /// The first thumbnail asset, if the manifest declares one.
    pub async fn thumbnail(&mut self) -> Result<Option<Vec<u8>>> {
        let key = self
            .manifest
            .data_entries
            .keys()
            .find(|key| EntryKey::type_of(key).is_thumbnail())
            .cloned();
        match key {
            Some(key) => self.extract_asset(&key).await.map(Some),
            None => Ok(None),
        }
    }

    /// Entry keys whose declared file is absent or unsafe.
    pub fn missing_assets(&self) -> Vec<String> {
        let Some(container) = self.container.as_ref() else {
            return self.manifest.data_entries.keys().cloned().collect();
        };
        self.manifest
            .data_entries
            .iter()
            .filter(|(_, entry)| match sanitize_name(&entry.file_name) {
                Ok(name) => !container.contains(&name) && !container.contains(&entry.file_name),
                Err(_) => true,
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Recompute every declared digest against the container content.
    ///
    /// Entries are decompressed on a blocking thread and hashed on the
    /// blocking pool; `cancel` is checked between entries in both phases.
    pub async fn verify(&self, cancel: &CancellationToken) -> Result<MismatchReport> {
        let mut container = self.container.clone().ok_or(Error::Disposed)?;
        let manifest = self.manifest.clone();
        let token = cancel.clone();
        let content = tokio::task::spawn_blocking(move || {
            DeclaredContent::read(&mut container, &manifest, &token)
        })
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))??;

        let report = content.verify(cancel).await?;
        if !report.is_clean() {
            tracing::warn!(warnings = report.warnings.len(), "integrity check found mismatches");
        }
        Ok(report)
    }

    /// Seed a builder with this archive's manifest and every non-manifest file.
    ///
    /// Entries with unsafe names are skipped. The old integrity section is
    /// dropped; the builder recomputes it when packing.
    pub fn into_builder(mut self) -> Result<ArchiveBuilder> {
        let mut container = self.container.take().ok_or(Error::Disposed)?;
        let names: Vec<String> = container
            .entries()
            .iter()
            .filter(|entry| !entry.is_dir && entry.name != MANIFEST_NAME)
            .map(|entry| entry.name.clone())
            .collect();

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            match container.read_sanitized(&name) {
                Ok(Some(bytes)) => files.push((name, Bytes::from(bytes))),
                Ok(None) => {}
                Err(Error::FilenameSecurity(err)) => {
                    tracing::warn!(error = %err, "skipping unsafe container entry");
                }
                Err(err) => return Err(err),
            }
        }

        self.state = ReaderState::Disposed;
        ArchiveBuilder::from_manifest(std::mem::take(&mut self.manifest), files)
    }

    /// Release the container. Idempotent.
    pub fn dispose(&mut self) {
        if self.container.take().is_some() {
            tracing::trace!("archive reader disposed");
        }
        self.state = ReaderState::Disposed;
    }
}

fn advance(state: &mut ReaderState, next: ReaderState) {
    if *state != ReaderState::Disposed {
        *state = next;
    }
}
