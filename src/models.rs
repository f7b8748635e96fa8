use serde::{Deserialize, Serialize};

/// A bounded slice of extracted document text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            chunk_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub exists: bool,
    pub document_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub documents: Vec<Chunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub processed: Vec<String>,
    pub failed: Vec<FailedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub vector_store: StoreStatus,
    pub model_status: String,
    pub current_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
