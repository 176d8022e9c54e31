#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("hashing was cancelled")]
    Cancelled,

    #[error("hashing task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
