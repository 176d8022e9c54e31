use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::extension::ExtensionMap;

/// Kind of asset named by the prefix of an entry key.
///
/// Prefixes this version does not know are kept as `Other` and treated as
/// opaque; they are never rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetType {
    Scene,
    Mesh,
    PointCloud,
    Thumbnail,
    Other(String),
}

impl AssetType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scene => "scene",
            Self::Mesh => "mesh",
            Self::PointCloud => "pointcloud",
            Self::Thumbnail => "thumbnail",
            Self::Other(prefix) => prefix,
        }
    }

    pub fn is_thumbnail(&self) -> bool {
        matches!(self, Self::Thumbnail)
    }

    /// File extension used when the caller gives no original file name.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Scene => "ply",
            Self::Mesh => "glb",
            Self::PointCloud => "e57",
            Self::Thumbnail => "jpg",
            Self::Other(_) => "bin",
        }
    }
}

impl From<&str> for AssetType {
    fn from(prefix: &str) -> Self {
        match prefix {
            "scene" => Self::Scene,
            "mesh" => Self::Mesh,
            "pointcloud" => Self::PointCloud,
            "thumbnail" => Self::Thumbnail,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `<type>_<index>` entry key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub asset_type: AssetType,
    pub index: u32,
}

impl EntryKey {
    pub fn new(asset_type: AssetType, index: u32) -> Self {
        Self { asset_type, index }
    }

    /// Asset type of a raw key, without requiring a numeric index.
    ///
    /// Keys that do not follow the convention at all are opaque.
    pub fn type_of(key: &str) -> AssetType {
        match key.rsplit_once('_') {
            Some((prefix, _)) if !prefix.is_empty() => AssetType::from(prefix),
            _ => AssetType::Other(key.to_string()),
        }
    }
}

impl FromStr for EntryKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, index) = s
            .rsplit_once('_')
            .ok_or_else(|| Error::InvalidEntryKey(s.to_string()))?;
        if prefix.is_empty() {
            return Err(Error::InvalidEntryKey(s.to_string()));
        }
        let index = index
            .parse::<u32>()
            .map_err(|_| Error::InvalidEntryKey(s.to_string()))?;
        Ok(Self::new(AssetType::from(prefix), index))
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.asset_type, self.index)
    }
}

/// Placement of an asset in the shared coordinate space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub position: [f64; 3],
    /// Euler angles in radians.
    #[serde(default)]
    pub rotation: [f64; 3],
    #[serde(default = "unit_scale")]
    pub scale: f64,
    #[serde(flatten)]
    pub extensions: ExtensionMap,
}

fn unit_scale() -> f64 {
    1.0
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: unit_scale(),
            extensions: ExtensionMap::new(),
        }
    }
}

impl Transform {
    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: [f64; 3]) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.position == [0.0; 3] && self.rotation == [0.0; 3] && self.scale == 1.0
    }
}

/// One asset described by the manifest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    /// Path relative to the container root.
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_notes: Option<String>,
    #[serde(default)]
    pub transform: Transform,
    #[serde(flatten)]
    pub extensions: ExtensionMap,
}

impl DataEntry {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}
