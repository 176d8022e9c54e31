use std::collections::BTreeMap;

use serde::de::{self, DeserializeOwned};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::annotation::Annotation;
use crate::entry::{AssetType, DataEntry, EntryKey};
use crate::error::{Error, Result};
use crate::extension::ExtensionMap;
use crate::integrity::IntegritySection;
use crate::presence::{self, Omitted, Segment};
use crate::sections::{
    ArchivalRecord, MaterialStandard, Preservation, Project, Provenance, QualityMetrics,
    Relationships,
};
use crate::validate::{self, ConformanceLevel, ValidationReport};
use crate::version::{self, CURRENT_VERSION, Compatibility};

/// Root metadata document of an archive.
///
/// Parsing is lenient: it only fails on malformed JSON. A recognized field
/// whose value does not fit the typed model is kept verbatim in
/// [`Manifest::extensions`] under its own key, so nothing is lost on save.
/// Data entries and annotations are decoded one at a time; one that does not
/// fit is kept verbatim in [`Manifest::raw_entries`] or
/// [`Manifest::raw_annotations`] and the rest still load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    pub format_version: Option<String>,
    pub producer: Option<String>,
    pub producer_version: Option<String>,
    /// RFC 3339 timestamp.
    pub creation_date: Option<String>,
    pub project: Option<Project>,
    pub relationships: Option<Relationships>,
    pub provenance: Option<Provenance>,
    pub quality_metrics: Option<QualityMetrics>,
    pub archival_record: Option<ArchivalRecord>,
    pub material_standard: Option<MaterialStandard>,
    pub preservation: Option<Preservation>,
    pub data_entries: BTreeMap<String, DataEntry>,
    /// Entries that could not be decoded, by key, exactly as read.
    pub raw_entries: BTreeMap<String, Value>,
    pub annotations: Vec<Annotation>,
    /// Annotations that could not be decoded, exactly as read. Written after
    /// the typed ones.
    pub raw_annotations: Vec<Value>,
    pub integrity: Option<IntegritySection>,
    pub extensions: ExtensionMap,
    /// Null or empty known fields from the source document.
    omitted: Vec<Omitted>,
}

impl Manifest {
    /// Empty manifest stamped with the current version and creation time.
    pub fn new(producer: impl Into<String>) -> Self {
        Self {
            format_version: Some(CURRENT_VERSION.to_string()),
            producer: Some(producer.into()),
            creation_date: Some(chrono::Utc::now().to_rfc3339()),
            ..Self::default()
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(Error::Parse)?;
        Self::from_value(value)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(Error::Parse)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(root) = value else {
            return Err(Error::NotAnObject);
        };

        let mut manifest = Self::default();
        let mut lenient = Lenient::default();

        // Iterating in document order keeps unknown fields in their original order.
        for (key, value) in root {
            match key.as_str() {
                "format_version" => manifest.format_version = lenient.field(key, value),
                "producer" => manifest.producer = lenient.field(key, value),
                "producer_version" => manifest.producer_version = lenient.field(key, value),
                "creation_date" => manifest.creation_date = lenient.field(key, value),
                "project" => manifest.project = lenient.field(key, value),
                "relationships" => manifest.relationships = lenient.field(key, value),
                "provenance" => manifest.provenance = lenient.field(key, value),
                "quality_metrics" => manifest.quality_metrics = lenient.field(key, value),
                "archival_record" => manifest.archival_record = lenient.field(key, value),
                "material_standard" => manifest.material_standard = lenient.field(key, value),
                "preservation" => manifest.preservation = lenient.field(key, value),
                "data_entries" => match value {
                    Value::Object(entries) => {
                        for (name, entry) in entries {
                            let path = vec![Segment::Key(key.clone()), Segment::Key(name.clone())];
                            match lenient.decode::<DataEntry>(path, &entry) {
                                Ok(typed) => {
                                    manifest.data_entries.insert(name, typed);
                                }
                                Err(err) => {
                                    tracing::warn!(entry = %name, error = %err, "data entry kept untyped");
                                    manifest.raw_entries.insert(name, entry);
                                }
                            }
                        }
                    }
                    other => lenient.keep(key, other, "expected an object"),
                },
                "annotations" => match value {
                    Value::Array(items) => {
                        for item in items {
                            let id = item.get("id").and_then(Value::as_str).unwrap_or_default();
                            let path = vec![Segment::Key(key.clone()), Segment::Id(id.to_string())];
                            match lenient.decode::<Annotation>(path, &item) {
                                Ok(typed) => manifest.annotations.push(typed),
                                Err(err) => {
                                    tracing::warn!(annotation = %id, error = %err, "annotation kept untyped");
                                    manifest.raw_annotations.push(item);
                                }
                            }
                        }
                    }
                    other => lenient.keep(key, other, "expected an array"),
                },
                "integrity" => manifest.integrity = lenient.field(key, value),
                _ => {
                    lenient.extensions.insert(key, value);
                }
            }
        }

        manifest.extensions = lenient.extensions.into();
        manifest.omitted = lenient.omitted;
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::Serialize)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(Error::Serialize)
    }

    /// The manifest as a JSON document, exactly as it would be written.
    pub fn to_value(&self) -> Result<Value> {
        self.document().map_err(Error::Serialize)
    }

    pub fn compatibility(&self) -> Compatibility {
        version::assess(self.format_version.as_deref())
    }

    pub fn validate(&self, level: ConformanceLevel) -> ValidationReport {
        validate::validate(self, level)
    }

    pub fn project_title(&self) -> Option<&str> {
        self.project.as_ref().and_then(|p| p.title.as_deref())
    }

    pub fn project_mut(&mut self) -> &mut Project {
        self.project.get_or_insert_with(Project::default)
    }

    pub fn entry(&self, key: &str) -> Option<&DataEntry> {
        self.data_entries.get(key)
    }

    /// Entries whose key prefix is `asset_type`, in key order.
    pub fn entries_of_type<'a>(
        &'a self,
        asset_type: &'a AssetType,
    ) -> impl Iterator<Item = (&'a String, &'a DataEntry)> + 'a {
        self.data_entries
            .iter()
            .filter(move |(key, _)| EntryKey::type_of(key) == *asset_type)
    }

    /// Whether at least one decoded entry is something other than a thumbnail.
    pub fn has_primary_asset(&self) -> bool {
        self.data_entries
            .keys()
            .any(|key| !EntryKey::type_of(key).is_thumbnail())
    }

    /// Lowest index not yet used by any `<asset_type>_<n>` entry, decoded or not.
    pub fn next_index(&self, asset_type: &AssetType) -> u32 {
        self.data_entries
            .keys()
            .chain(self.raw_entries.keys())
            .filter_map(|key| key.parse::<EntryKey>().ok())
            .filter(|key| key.asset_type == *asset_type)
            .map(|key| key.index + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn document(&self) -> serde_json::Result<Value> {
        let mut root = Map::new();

        macro_rules! field {
            ($key:literal, $value:expr) => {
                if let Some(value) = $value {
                    root.insert($key.to_string(), serde_json::to_value(value)?);
                }
            };
        }

        field!("format_version", &self.format_version);
        field!("producer", &self.producer);
        field!("producer_version", &self.producer_version);
        field!("creation_date", &self.creation_date);
        field!("project", &self.project);
        field!("relationships", &self.relationships);
        field!("provenance", &self.provenance);
        field!("quality_metrics", &self.quality_metrics);
        field!("archival_record", &self.archival_record);
        field!("material_standard", &self.material_standard);
        field!("preservation", &self.preservation);

        // An untyped fallback for a collection is emitted only while the typed side is empty.
        let entries_typed = !self.data_entries.is_empty() || !self.raw_entries.is_empty();
        if entries_typed || !self.extensions.contains_key("data_entries") {
            let mut entries = BTreeMap::new();
            for (key, entry) in &self.data_entries {
                entries.insert(key.as_str(), serde_json::to_value(entry)?);
            }
            for (key, raw) in &self.raw_entries {
                entries.entry(key.as_str()).or_insert_with(|| raw.clone());
            }
            let entries: Map<String, Value> =
                entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
            root.insert("data_entries".to_string(), Value::Object(entries));
        }

        let annotations_typed = !self.annotations.is_empty() || !self.raw_annotations.is_empty();
        if annotations_typed || !self.extensions.contains_key("annotations") {
            let mut items = Vec::with_capacity(self.annotations.len() + self.raw_annotations.len());
            for annotation in &self.annotations {
                items.push(serde_json::to_value(annotation)?);
            }
            items.extend(self.raw_annotations.iter().cloned());
            root.insert("annotations".to_string(), Value::Array(items));
        }

        field!("integrity", &self.integrity);

        for (key, value) in self.extensions.iter() {
            if !root.contains_key(key) {
                root.insert(key.clone(), value.clone());
            }
        }

        let mut document = Value::Object(root);
        presence::restore(&mut document, &self.omitted);
        Ok(document)
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.document()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Manifest::from_value(value).map_err(de::Error::custom)
    }
}

/// Parse-time state: root fields kept untyped and known keys to re-emit.
#[derive(Default)]
struct Lenient {
    extensions: Map<String, Value>,
    omitted: Vec<Omitted>,
}

impl Lenient {
    /// Decode a known root field, falling back to the extension map on shape mismatch.
    fn field<T: DeserializeOwned + Serialize>(&mut self, key: String, value: Value) -> Option<T> {
        if value.is_null() {
            self.extensions.insert(key, value);
            return None;
        }
        match self.decode(vec![Segment::Key(key.clone())], &value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                self.keep(key, value, err);
                None
            }
        }
    }

    fn decode<T: DeserializeOwned + Serialize>(
        &mut self,
        mut path: Vec<Segment>,
        value: &Value,
    ) -> serde_json::Result<T> {
        let typed = T::deserialize(value)?;
        let written = serde_json::to_value(&typed)?;
        presence::collect(value, &written, &mut path, &mut self.omitted);
        Ok(typed)
    }

    fn keep(&mut self, key: String, value: Value, reason: impl std::fmt::Display) {
        if !value.is_null() {
            tracing::warn!(field = %key, error = %reason, "manifest field kept untyped");
        }
        self.extensions.insert(key, value);
    }
}
