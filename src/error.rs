use thiserror::Error;

/// Errors surfaced by the retrieval side of the system.
///
/// Generation never returns one of these to its caller; failed backend
/// attempts are folded into the fallback answer instead.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Index corruption: {0}")]
    IndexCorruption(String),

    #[error("Dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
