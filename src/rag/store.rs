//! Index rows and chunk records held as one unit.
//!
//! `ChunkStore` is the only owner of the `FlatIpIndex` and the chunk list and
//! only exposes operations that touch both, so row `i` of the index always
//! belongs to `chunks[i]`. On disk the pair is `index.bin` + `meta.json`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::models::Chunk;

use super::vector_index::{FlatIpIndex, Hit};

pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "meta.json";

#[derive(Debug, Clone)]
pub struct ChunkStore {
    index: FlatIpIndex,
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new(dim: usize) -> Self {
        Self {
            index: FlatIpIndex::new(dim),
            chunks: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Append chunks and their vectors, both or neither.
    pub fn append_pair(&mut self, chunks: Vec<Chunk>, vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch: {} chunks but {} embeddings",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim()) {
            return Err(RagError::Embedding(format!(
                "Embedding has {} values, store expects {}",
                bad.len(),
                self.dim()
            )));
        }
        self.index.add(vectors)?;
        self.chunks.extend(chunks);
        Ok(())
    }

    /// Drop every row past `len`. Used to undo an append whose persist failed.
    pub(crate) fn rollback_to(&mut self, len: usize) {
        self.index.truncate(len);
        self.chunks.truncate(len);
    }

    pub fn read_all(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Search the index and map hits to chunk records, best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(Chunk, f32)>> {
        let hits = self.index.search(query, top_k)?;
        Ok(hits
            .into_iter()
            .filter_map(|Hit { index, score }| self.chunks.get(index).map(|c| (c.clone(), score)))
            .collect())
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.chunks.clear();
    }

    pub fn exists_on_disk(dir: &Path) -> bool {
        dir.join(INDEX_FILE).exists()
    }

    /// Load the pair from `dir`, or start empty when neither file exists.
    pub fn load(dir: &Path, dim: usize) -> Result<Self> {
        let index_path = dir.join(INDEX_FILE);
        let meta_path = dir.join(METADATA_FILE);

        match (index_path.exists(), meta_path.exists()) {
            (false, false) => {
                tracing::info!("No persisted store at {}, starting empty", dir.display());
                return Ok(Self::new(dim));
            }
            (true, false) | (false, true) => {
                return Err(RagError::IndexCorruption(format!(
                    "only one of {} and {} exists in {}",
                    INDEX_FILE,
                    METADATA_FILE,
                    dir.display()
                )));
            }
            (true, true) => {}
        }

        let index = FlatIpIndex::from_bytes(&fs::read(&index_path)?)?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&fs::read(&meta_path)?)
            .map_err(|e| RagError::IndexCorruption(format!("unreadable metadata: {}", e)))?;

        if index.len() != chunks.len() {
            return Err(RagError::IndexCorruption(format!(
                "index holds {} vectors but metadata holds {} chunks",
                index.len(),
                chunks.len()
            )));
        }
        if index.dim() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: index.dim(),
            });
        }

        tracing::info!("Loaded {} chunks from {}", chunks.len(), dir.display());
        Ok(Self { index, chunks })
    }

    /// Write both files through temp siblings and rename them into place.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let meta = serde_json::to_vec(&self.chunks)?;
        write_atomic(&dir.join(INDEX_FILE), &self.index.to_bytes())?;
        write_atomic(&dir.join(METADATA_FILE), &meta)?;
        tracing::debug!("Persisted {} chunks to {}", self.chunks.len(), dir.display());
        Ok(())
    }

    /// Remove persisted files. Missing files are not an error.
    /// Both removals are attempted; the first failure is returned.
    pub fn remove_files(dir: &Path) -> Result<()> {
        let mut first_err = None;
        for name in [INDEX_FILE, METADATA_FILE] {
            match fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = PathBuf::from(path);
    tmp.set_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<Chunk>, Vec<Vec<f32>>) {
        (
            vec![Chunk::new("alpha", "a.pdf", 0), Chunk::new("beta", "a.pdf", 1)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
    }

    #[test]
    fn test_append_pair_keeps_lengths_aligned() {
        let mut store = ChunkStore::new(2);
        let (chunks, vectors) = sample();
        store.append_pair(chunks, &vectors).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.index.len(), 2);
    }

    #[test]
    fn test_append_pair_count_mismatch_appends_nothing() {
        let mut store = ChunkStore::new(2);
        let (chunks, _) = sample();
        let err = store.append_pair(chunks, &[vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.is_empty());
        assert!(store.index.is_empty());
    }

    #[test]
    fn test_append_pair_bad_dimension_appends_nothing() {
        let mut store = ChunkStore::new(2);
        let err = store
            .append_pair(vec![Chunk::new("x", "s", 0)], &[vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.is_empty());
        assert!(store.index.is_empty());
    }

    #[test]
    fn test_rollback_to() {
        let mut store = ChunkStore::new(2);
        let (chunks, vectors) = sample();
        store.append_pair(chunks, &vectors).unwrap();
        store.rollback_to(1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.index.len(), 1);
        assert_eq!(store.read_all()[0].text, "alpha");
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ChunkStore::new(2);
        let (chunks, vectors) = sample();
        store.append_pair(chunks.clone(), &vectors).unwrap();
        store.persist(dir.path()).unwrap();

        assert!(ChunkStore::exists_on_disk(dir.path()));
        assert!(!dir.path().join("index.tmp").exists());

        let loaded = ChunkStore::load(dir.path(), 2).unwrap();
        assert_eq!(loaded.read_all(), chunks.as_slice());
        let hits = loaded.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].0.text, "beta");
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::load(&dir.path().join("absent"), 4).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dim(), 4);
    }

    #[test]
    fn test_load_length_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ChunkStore::new(2);
        let (chunks, vectors) = sample();
        store.append_pair(chunks.clone(), &vectors).unwrap();
        store.persist(dir.path()).unwrap();

        let short = serde_json::to_vec(&chunks[..1]).unwrap();
        fs::write(dir.path().join(METADATA_FILE), short).unwrap();

        let err = ChunkStore::load(dir.path(), 2).unwrap_err();
        assert!(matches!(err, RagError::IndexCorruption(_)));
    }

    #[test]
    fn test_load_lone_index_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        ChunkStore::new(2).persist(dir.path()).unwrap();
        fs::remove_file(dir.path().join(METADATA_FILE)).unwrap();
        let err = ChunkStore::load(dir.path(), 2).unwrap_err();
        assert!(matches!(err, RagError::IndexCorruption(_)));
    }

    #[test]
    fn test_load_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        ChunkStore::new(2).persist(dir.path()).unwrap();
        let err = ChunkStore::load(dir.path(), 3).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_remove_files_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        ChunkStore::new(2).persist(dir.path()).unwrap();
        ChunkStore::remove_files(dir.path()).unwrap();
        ChunkStore::remove_files(dir.path()).unwrap();
        assert!(!ChunkStore::exists_on_disk(dir.path()));
    }

    #[test]
    fn test_remove_files_attempts_both() {
        let dir = tempfile::tempdir().unwrap();
        ChunkStore::new(2).persist(dir.path()).unwrap();
        // A non-empty directory where the index file should be cannot be unlinked.
        let index_path = dir.path().join(INDEX_FILE);
        fs::remove_file(&index_path).unwrap();
        fs::create_dir(&index_path).unwrap();
        fs::write(index_path.join("pinned"), b"x").unwrap();

        assert!(ChunkStore::remove_files(dir.path()).is_err());
        assert!(!dir.path().join(METADATA_FILE).exists());
    }
}
