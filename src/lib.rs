//! Document question answering: a persisted inner-product vector store over
//! document chunks, plus multi-backend generation with a local fallback.

pub mod config;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod models;
pub mod query;
pub mod rag;

pub use error::{RagError, Result};
