#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("manifest is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("manifest root must be a JSON object")]
    NotAnObject,

    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid format version '{0}'")]
    InvalidVersion(String),

    #[error("invalid entry key '{0}'")]
    InvalidEntryKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;
