pub mod embeddings;
pub mod store;
pub mod vector_index;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::models::{Chunk, StoreStatus};
use self::embeddings::EmbeddingProvider;
use self::store::ChunkStore;

/// Facade over the embedding provider and the persisted chunk store.
///
/// Writers (`add_documents`, `reset`) hold the write lock across embedding,
/// append and persist; searches share the read lock and so never see a
/// half-applied batch.
pub struct RetrievalEngine {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: RwLock<ChunkStore>,
    store_dir: PathBuf,
}

impl RetrievalEngine {
    /// Open the store under `store_dir`, validating any persisted state.
    pub fn open(store_dir: impl Into<PathBuf>, embeddings: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store_dir = store_dir.into();
        let store = ChunkStore::load(&store_dir, embeddings.dimension())?;
        Ok(Self {
            embeddings,
            store: RwLock::new(store),
            store_dir,
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut store = self.store.write().await;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.encode(&texts)?;
        check_vectors(&vectors, texts.len(), store.dim())?;

        let previous_len = store.len();
        let added = chunks.len();
        store.append_pair(chunks, &vectors)?;

        if let Err(e) = store.persist(&self.store_dir) {
            tracing::error!("Persist failed, rolling back {} chunks: {}", added, e);
            store.rollback_to(previous_len);
            return Err(e);
        }

        tracing::info!("Added {} chunks (store now holds {})", added, store.len());
        Ok(())
    }

    pub async fn similarity_search(&self, query: &str, top_k: usize) -> Result<Vec<Chunk>> {
        let store = self.store.read().await;
        if top_k == 0 || store.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embeddings.encode(&[query.to_string()])?;
        check_vectors(&vectors, 1, store.dim())?;

        let results = store.search(&vectors[0], top_k)?;
        tracing::debug!("Search returned {} of top {}", results.len(), top_k);
        Ok(results.into_iter().map(|(chunk, _)| chunk).collect())
    }

    /// Empty the store and delete its files. Safe to call repeatedly.
    ///
    /// Memory is cleared even when a file cannot be removed.
    pub async fn reset(&self) -> Result<()> {
        let mut store = self.store.write().await;
        let removed = ChunkStore::remove_files(&self.store_dir);
        store.clear();
        removed?;
        tracing::info!("Store at {} reset", self.store_dir.display());
        Ok(())
    }

    pub async fn status(&self) -> StoreStatus {
        let store = self.store.read().await;
        StoreStatus {
            exists: ChunkStore::exists_on_disk(&self.store_dir),
            document_count: store.len(),
        }
    }

    /// Snapshot of all stored chunks in insertion order.
    pub async fn chunks(&self) -> Vec<Chunk> {
        self.store.read().await.read_all().to_vec()
    }
}

/// Provider output must hold one vector per text, each of the store width.
fn check_vectors(vectors: &[Vec<f32>], expected: usize, dim: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "provider returned {} vectors for {} texts",
            vectors.len(),
            expected
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(RagError::Embedding(format!(
            "provider returned a {}-wide vector, store expects {}",
            bad.len(),
            dim
        )));
    }
    Ok(())
}
