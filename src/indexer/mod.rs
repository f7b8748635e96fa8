pub mod chunker;
pub mod extractor;
pub mod walker;

use crate::models::Chunk;
use self::chunker::Chunker;

/// Cut a document's text into `Chunk`s tagged with `source`.
pub fn build_chunks(text: &str, source: &str, chunker: &Chunker) -> Vec<Chunk> {
    chunker
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            source: source.to_string(),
            chunk_index,
        })
        .collect()
}
