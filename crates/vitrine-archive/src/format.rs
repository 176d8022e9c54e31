use std::fmt;
use std::path::Path;

use zip::CompressionMethod;

/// Local file header signature every container must start with.
pub const CONTAINER_MAGIC: [u8; 2] = *b"PK";

/// Name of the manifest entry at the container root.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Extensions whose payloads are already compressed; deflating them again
/// costs time and saves nothing.
const PRECOMPRESSED: &[&str] = &[
    "glb", "spz", "sog", "splat", "ksplat", "e57", "laz", "jpg", "jpeg", "png", "webp", "ktx2",
    "zip", "gz",
];

pub fn has_container_magic(data: &[u8]) -> bool {
    data.starts_with(&CONTAINER_MAGIC)
}

/// The two on-disk flavours of the same format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ContainerVariant {
    /// `.a3d`: entries stored unless a caller asks otherwise.
    Stored,
    /// `.a3z`: entries deflated unless already compressed.
    #[default]
    Compressed,
}

impl ContainerVariant {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Stored => "a3d",
            Self::Compressed => "a3z",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "a3d" => Some(Self::Stored),
            "a3z" => Some(Self::Compressed),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ContainerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// Per-entry compression request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressionHint {
    /// Let the variant and the file extension decide.
    #[default]
    Auto,
    Store,
    Compress,
}

/// What actually happens to an entry's bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Store,
    Deflate,
}

impl Strategy {
    pub(crate) fn method(self) -> CompressionMethod {
        match self {
            Self::Store => CompressionMethod::Stored,
            Self::Deflate => CompressionMethod::Deflated,
        }
    }
}

impl CompressionHint {
    pub fn resolve(self, name: &str, variant: ContainerVariant) -> Strategy {
        match (self, variant) {
            (Self::Store, _) => Strategy::Store,
            (Self::Compress, _) => Strategy::Deflate,
            (Self::Auto, ContainerVariant::Stored) => Strategy::Store,
            (Self::Auto, ContainerVariant::Compressed) if is_precompressed(name) => Strategy::Store,
            (Self::Auto, ContainerVariant::Compressed) => Strategy::Deflate,
        }
    }
}

pub fn is_precompressed(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| PRECOMPRESSED.contains(&ext.as_str()))
}
