use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::generation::GenerationManager;
use crate::models::{Chunk, QueryAnswer};
use crate::rag::RetrievalEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub context: String,
}

pub fn compose(query: &str, retrieved: &[Chunk]) -> ComposedPrompt {
    let context = retrieved
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Answer the question using the context below:\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
        context, query
    );
    ComposedPrompt { prompt, context }
}

pub async fn generate_answer(query: &str, retrieved: &[Chunk], generator: &GenerationManager) -> String {
    let ComposedPrompt { prompt, context } = compose(query, retrieved);
    generator.generate(&prompt, &context).await
}

/// Unique sources in first-seen order.
pub fn unique_sources(chunks: &[Chunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for chunk in chunks {
        if seen.insert(chunk.source.as_str()) {
            sources.push(chunk.source.clone());
        }
    }
    sources
}

/// Search, compose and generate for one user question.
pub struct QueryEngine {
    retrieval: Arc<RetrievalEngine>,
    generator: Arc<GenerationManager>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(retrieval: Arc<RetrievalEngine>, generator: Arc<GenerationManager>, top_k: usize) -> Self {
        Self {
            retrieval,
            generator,
            top_k,
        }
    }

    pub async fn answer(&self, query: &str) -> Result<QueryAnswer> {
        let documents = self.retrieval.similarity_search(query, self.top_k).await?;
        tracing::info!("Answering with {} retrieved chunks", documents.len());
        let answer = generate_answer(query, &documents, &self.generator).await;
        Ok(QueryAnswer {
            answer,
            sources: unique_sources(&documents),
            documents,
        })
    }
}
