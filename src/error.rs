use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<csv::Error> for CacheError {
    fn from(err: csv::Error) -> Self {
        CacheError::Io(format!("CSV error: {}", err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialize(err.to_string())
    }
}

impl From<chrono::ParseError> for CacheError {
    fn from(err: chrono::ParseError) -> Self {
        CacheError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

// Alias for convenience
pub type Error = CacheError;
