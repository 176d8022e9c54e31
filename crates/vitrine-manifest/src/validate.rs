//! Conformance-level validation.
//!
//! Validation never fails: it returns a [`ValidationReport`] listing what is
//! missing. Whether a gap is fatal is the caller's decision; by convention
//! only Minimal-level gaps make a manifest unusable.

use std::fmt;

use serde::Serialize;

use crate::entry::EntryKey;
use crate::manifest::Manifest;

/// Named bars of manifest completeness. Each level includes the ones below it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConformanceLevel {
    #[default]
    Minimal,
    Documented,
    Preservation,
}

impl fmt::Display for ConformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimal => "minimal",
            Self::Documented => "documented",
            Self::Preservation => "preservation",
        })
    }
}

/// One missing or unusable field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Dotted path into the manifest, e.g. `project.title`.
    pub field: String,
    /// The lowest level at which this field is expected.
    pub level: ConformanceLevel,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, level: ConformanceLevel, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.level, self.message)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub level: ConformanceLevel,
    pub missing_required: Vec<FieldIssue>,
    pub missing_recommended: Vec<FieldIssue>,
}

impl ValidationReport {
    /// No required field is missing at the requested level.
    pub fn is_valid(&self) -> bool {
        self.missing_required.is_empty()
    }

    /// No Minimal-level field is missing, regardless of the requested level.
    pub fn passes_minimal(&self) -> bool {
        !self
            .missing_required
            .iter()
            .any(|issue| issue.level == ConformanceLevel::Minimal)
    }

    /// Required issues at a given level only.
    pub fn required_at(&self, level: ConformanceLevel) -> impl Iterator<Item = &FieldIssue> {
        self.missing_required.iter().filter(move |i| i.level == level)
    }

    /// Fold every required gap into the recommended list.
    ///
    /// Used when a manifest's version is foreign and all fields are optional.
    pub fn relaxed(mut self) -> Self {
        self.missing_recommended.append(&mut self.missing_required);
        self
    }

    pub fn push_required(&mut self, issue: FieldIssue) {
        self.missing_required.push(issue);
    }

    fn require(&mut self, present: bool, field: &str, level: ConformanceLevel) {
        if !present {
            self.missing_required
                .push(FieldIssue::new(field, level, "required field is missing or empty"));
        }
    }

    fn recommend(&mut self, present: bool, field: &str, level: ConformanceLevel) {
        if !present {
            self.missing_recommended
                .push(FieldIssue::new(field, level, "recommended field is missing or empty"));
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing_required.is_empty() {
            return write!(f, "conforms to {} level", self.level);
        }
        let fields: Vec<_> = self.missing_required.iter().map(|i| i.field.as_str()).collect();
        write!(f, "missing required fields for {} level: {}", self.level, fields.join(", "))
    }
}

fn filled(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

/// Check `manifest` against `level` and every level below it.
pub fn validate(manifest: &Manifest, level: ConformanceLevel) -> ValidationReport {
    use ConformanceLevel::*;

    let mut report = ValidationReport {
        level,
        ..ValidationReport::default()
    };

    report.require(filled(manifest.format_version.as_deref()), "format_version", Minimal);
    report.require(filled(manifest.producer.as_deref()), "producer", Minimal);
    report.require(filled(manifest.project_title()), "project.title", Minimal);
    report.require(manifest.has_primary_asset(), "data_entries", Minimal);
    for (key, entry) in &manifest.data_entries {
        report.require(
            !entry.file_name.trim().is_empty(),
            &format!("data_entries.{key}.file_name"),
            Minimal,
        );
        if key.parse::<EntryKey>().is_err() {
            report.missing_recommended.push(FieldIssue::new(
                format!("data_entries.{key}"),
                Minimal,
                "entry key does not follow <type>_<index>",
            ));
        }
    }
    for key in manifest.raw_entries.keys() {
        report.missing_recommended.push(FieldIssue::new(
            format!("data_entries.{key}"),
            Minimal,
            "entry does not match the data entry shape and is kept verbatim",
        ));
    }
    for (position, raw) in manifest.raw_annotations.iter().enumerate() {
        let field = match raw.get("id").and_then(|id| id.as_str()) {
            Some(id) => format!("annotations.{id}"),
            None => format!("annotations[{position}]"),
        };
        report.missing_recommended.push(FieldIssue::new(
            field,
            Minimal,
            "annotation does not match the annotation shape and is kept verbatim",
        ));
    }
    report.recommend(filled(manifest.creation_date.as_deref()), "creation_date", Minimal);
    report.recommend(manifest.integrity.is_some(), "integrity", Minimal);

    if level >= Documented {
        let provenance = manifest.provenance.as_ref();
        let quality = manifest.quality_metrics.as_ref();
        let project = manifest.project.as_ref();

        report.require(
            filled(provenance.and_then(|p| p.capture_date.as_deref())),
            "provenance.capture_date",
            Documented,
        );
        report.require(
            filled(provenance.and_then(|p| p.capture_device.as_deref())),
            "provenance.capture_device",
            Documented,
        );
        report.require(
            filled(provenance.and_then(|p| p.operator.as_deref())),
            "provenance.operator",
            Documented,
        );
        report.require(
            filled(quality.and_then(|q| q.tier.as_deref())),
            "quality_metrics.tier",
            Documented,
        );
        report.require(
            filled(quality.and_then(|q| q.accuracy_grade.as_deref())),
            "quality_metrics.accuracy_grade",
            Documented,
        );
        report.recommend(
            filled(provenance.and_then(|p| p.location.as_deref())),
            "provenance.location",
            Documented,
        );
        report.recommend(
            provenance.is_some_and(|p| !p.processing_software.is_empty()),
            "provenance.processing_software",
            Documented,
        );
        report.recommend(
            filled(project.and_then(|p| p.description.as_deref())),
            "project.description",
            Documented,
        );
        report.recommend(
            filled(project.and_then(|p| p.license.as_deref())),
            "project.license",
            Documented,
        );
    }

    if level >= Preservation {
        let record = manifest.archival_record.as_ref();
        let preservation = manifest.preservation.as_ref();

        report.require(
            filled(record.and_then(|r| r.title.as_deref())),
            "archival_record.title",
            Preservation,
        );
        report.require(
            filled(
                record
                    .and_then(|r| r.creation.as_ref())
                    .and_then(|c| c.creator.as_deref()),
            ),
            "archival_record.creation.creator",
            Preservation,
        );
        report.require(
            filled(
                record
                    .and_then(|r| r.rights.as_ref())
                    .and_then(|r| r.copyright_status.as_deref()),
            ),
            "archival_record.rights.copyright_status",
            Preservation,
        );
        report.require(
            preservation.is_some_and(|p| !p.format_registry.is_empty()),
            "preservation.format_registry",
            Preservation,
        );
        report.recommend(
            filled(
                record
                    .and_then(|r| r.ids.as_ref())
                    .and_then(|ids| ids.accession_number.as_deref()),
            ),
            "archival_record.ids.accession_number",
            Preservation,
        );
        report.recommend(
            preservation.is_some_and(|p| !p.significant_properties.is_empty()),
            "preservation.significant_properties",
            Preservation,
        );
        report.recommend(
            manifest.material_standard.is_some(),
            "material_standard",
            Preservation,
        );
    }

    report
}
