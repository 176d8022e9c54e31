use std::io::{Cursor, Write};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};
use crate::format::{CompressionHint, ContainerVariant, Strategy};
use crate::options::{Progress, ProgressCallback};
use crate::sanitize::sanitize_name;

struct PendingEntry {
    name: String,
    bytes: Bytes,
    hint: CompressionHint,
}

/// Collects entries, then writes them out in insertion order.
pub struct ContainerWriter {
    variant: ContainerVariant,
    compression_level: i64,
    entries: Vec<PendingEntry>,
}

impl ContainerWriter {
    pub fn new(variant: ContainerVariant) -> Self {
        Self {
            variant,
            compression_level: 6,
            entries: Vec::new(),
        }
    }

    pub fn compression_level(mut self, level: i64) -> Self {
        self.compression_level = level.clamp(0, 9);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue an entry. Names are sanitized; duplicates are refused.
    ///
    /// The entry is written under the normalized name returned by
    /// [`sanitize_name`], not the name as given.
    pub fn add_entry(
        &mut self,
        name: &str,
        bytes: impl Into<Bytes>,
        hint: CompressionHint,
    ) -> Result<()> {
        let name = sanitize_name(name)?;
        if self.entries.iter().any(|e| e.name == name) {
            return Err(Error::DuplicateEntry(name));
        }
        self.entries.push(PendingEntry {
            name,
            bytes: bytes.into(),
            hint,
        });
        Ok(())
    }

    /// Write every queued entry and return the finished container.
    ///
    /// Progress is reported once before the first entry and once after each
    /// one. Cancellation is checked between entries.
    pub fn finalize(
        self,
        on_progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let total_entries = self.entries.len();
        let total_bytes: u64 = self.entries.iter().map(|e| e.bytes.len() as u64).sum();
        let mut bytes_processed = 0u64;

        let report = |entries_written: usize, bytes_processed: u64, current_entry: Option<&str>| {
            if let Some(callback) = on_progress {
                callback(Progress {
                    entries_written,
                    total_entries,
                    bytes_processed,
                    total_bytes,
                    current_entry: current_entry.map(str::to_string),
                });
            }
        };
        report(0, 0, None);

        let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(total_bytes as usize + 1024)));
        for (index, entry) in self.entries.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(written = index, total = total_entries, "container write cancelled");
                return Err(Error::Cancelled);
            }

            let strategy = entry.hint.resolve(&entry.name, self.variant);
            let mut options = SimpleFileOptions::default()
                .compression_method(strategy.method())
                .unix_permissions(0o644)
                .large_file(entry.bytes.len() as u64 >= u64::from(u32::MAX));
            if strategy == Strategy::Deflate {
                options = options.compression_level(Some(self.compression_level));
            }

            let write_err = |source| Error::ContainerWrite {
                name: entry.name.clone(),
                source,
            };
            zip.start_file(entry.name.as_str(), options).map_err(write_err)?;
            zip.write_all(&entry.bytes)?;

            bytes_processed += entry.bytes.len() as u64;
            tracing::trace!(name = %entry.name, ?strategy, size = entry.bytes.len(), "entry written");
            report(index + 1, bytes_processed, Some(&entry.name));
        }

        let cursor = zip.finish().map_err(|source| Error::ContainerWrite {
            name: "<central directory>".to_string(),
            source,
        })?;
        Ok(cursor.into_inner())
    }
}
