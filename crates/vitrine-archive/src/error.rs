use std::io;

use vitrine_manifest::{Compatibility, ValidationReport};
use vitrine_verify::VerifyError;

use crate::sanitize::FilenameSecurityError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a valid archive container: {reason}")]
    ContainerFormat { reason: String },

    #[error("archive has no manifest.json at its root")]
    ManifestMissing,

    #[error("manifest could not be parsed: {0}")]
    ManifestParse(#[source] vitrine_manifest::Error),

    #[error("manifest could not be serialized: {0}")]
    ManifestSerialize(#[source] vitrine_manifest::Error),

    #[error("manifest is not usable: {report}")]
    ManifestValidation { report: ValidationReport },

    #[error("refusing manifest with {0}")]
    UnsupportedVersion(Compatibility),

    #[error(transparent)]
    FilenameSecurity(#[from] FilenameSecurityError),

    #[error("asset not found: {name}")]
    AssetNotFound { name: String },

    #[error("entry '{0}' already exists")]
    DuplicateEntry(String),

    #[error("annotation id '{0}' already exists")]
    DuplicateAnnotation(String),

    #[error("failed to write container entry '{name}': {source}")]
    ContainerWrite {
        name: String,
        source: zip::result::ZipError,
    },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("archive reader has been disposed")]
    Disposed,

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::AssetNotFound { name: name.into() }
    }

    pub(crate) fn container(reason: impl ToString) -> Self {
        Self::ContainerFormat {
            reason: reason.to_string(),
        }
    }
}

impl From<VerifyError> for Error {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Cancelled => Self::Cancelled,
            VerifyError::TaskFailed(msg) => Self::TaskFailed(msg),
            VerifyError::Io(err) => Self::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
