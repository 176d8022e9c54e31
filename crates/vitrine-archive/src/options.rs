use std::sync::Arc;

use vitrine_manifest::ConformanceLevel;

use crate::format::ContainerVariant;

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// How strict [`crate::ArchiveReader::open`] is.
#[derive(Clone, Debug, Default)]
pub struct ReaderOptions {
    /// Level reported in the reader's validation report. Only Minimal gaps
    /// are ever fatal.
    pub conformance: ConformanceLevel,
    /// Fail with [`crate::Error::UnsupportedVersion`] instead of reading a
    /// foreign or unparseable format version best-effort.
    pub refuse_foreign_major: bool,
}

impl ReaderOptions {
    pub fn conformance(mut self, level: ConformanceLevel) -> Self {
        self.conformance = level;
        self
    }

    pub fn refuse_foreign_major(mut self, refuse: bool) -> Self {
        self.refuse_foreign_major = refuse;
        self
    }
}

#[derive(Clone)]
pub struct PackOptions {
    pub variant: ContainerVariant,
    /// Deflate level, 0-9.
    pub compression_level: i64,
    pub include_integrity: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            variant: ContainerVariant::default(),
            compression_level: 6,
            include_integrity: true,
            on_progress: None,
        }
    }
}

impl PackOptions {
    pub fn variant(mut self, variant: ContainerVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn compression_level(mut self, level: i64) -> Self {
        self.compression_level = level.clamp(0, 9);
        self
    }

    pub fn include_integrity(mut self, include: bool) -> Self {
        self.include_integrity = include;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

/// Snapshot emitted while a container is being written.
#[derive(Clone, Debug)]
pub struct Progress {
    pub entries_written: usize,
    pub total_entries: usize,
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub current_entry: Option<String>,
}

impl Progress {
    /// Completion in `0.0..=100.0`.
    pub fn percentage(&self) -> f32 {
        if self.total_bytes > 0 {
            (self.bytes_processed as f32 / self.total_bytes as f32) * 100.0
        } else if self.total_entries > 0 {
            (self.entries_written as f32 / self.total_entries as f32) * 100.0
        } else {
            100.0
        }
    }
}
