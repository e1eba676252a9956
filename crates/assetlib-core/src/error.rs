use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Asset already exists: {0}")]
    AlreadyExists(String),

    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    #[error("Dependency error: {0}")]
    DependencyError(String),

    #[error("Version error: {0}")]
    VersionError(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<crate::ValidationError> for AssetError {
    fn from(err: crate::ValidationError) -> Self {
        AssetError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;
