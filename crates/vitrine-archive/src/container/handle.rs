use std::io::{Cursor, Read};

use bytes::Bytes;
use vitrine_verify::AssetSource;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};
use crate::format::has_container_magic;
use crate::sanitize::sanitize_name;

/// Cap on up-front allocation; the declared size of an entry is untrusted.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Listing metadata for one container entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
    /// Whether the entry is stored without compression.
    pub stored: bool,
}

/// An opened container.
///
/// Cloning shares the underlying buffer and central directory.
#[derive(Clone)]
pub struct ContainerHandle {
    archive: ZipArchive<Cursor<Bytes>>,
    entries: Vec<EntryDescriptor>,
}

impl ContainerHandle {
    pub fn open(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if !has_container_magic(&bytes) {
            return Err(Error::container("missing zip signature"));
        }

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(Error::container)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(Error::container)?;
            entries.push(EntryDescriptor {
                name: file.name().to_string(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                is_dir: file.is_dir(),
                stored: file.compression() == zip::CompressionMethod::Stored,
            });
        }

        Ok(Self { archive, entries })
    }

    pub fn entries(&self) -> &[EntryDescriptor] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name && !e.is_dir)
    }

    /// Decompressed content of the entry stored under exactly `name`.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(Error::not_found(name)),
            Err(err) => return Err(Error::container(err)),
        };
        let mut buf = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Resolve `raw` through the sanitizer, then read it.
    ///
    /// The normalized name is tried first, then the raw one, so a producer
    /// that wrote `assets//x.glb` is still readable.
    pub fn read_sanitized(&mut self, raw: &str) -> Result<Option<Vec<u8>>> {
        let name = sanitize_name(raw)
            .inspect_err(|err| tracing::warn!(error = %err, "entry name rejected"))?;
        let stored = if self.contains(&name) {
            name
        } else if self.contains(raw) {
            raw.to_string()
        } else {
            return Ok(None);
        };
        self.read_entry(&stored).map(Some)
    }
}

impl AssetSource for ContainerHandle {
    type Error = Error;

    fn read_asset(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        self.read_sanitized(path)
    }
}
