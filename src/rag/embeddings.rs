use std::path::{Path, PathBuf};

use fastembed::{InitOptionsUserDefined, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel};

use crate::error::{RagError, Result};

/// Maps text to fixed-dimension, unit-normalized vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Local ONNX sentence embedder backed by fastembed.
pub struct EmbeddingGenerator {
    model: TextEmbedding,
    dimension: usize,
}

fn read_model_file(model_dir: &Path, name: &str) -> Result<Vec<u8>> {
    std::fs::read(model_dir.join(name))
        .map_err(|e| RagError::Embedding(format!("Failed to read {}: {}", name, e)))
}

impl EmbeddingGenerator {
    pub fn new(model_dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let model_dir = model_dir.into();
        tracing::info!("Initializing embedding model from {}", model_dir.display());

        if !model_dir.exists() {
            return Err(RagError::Embedding(format!(
                "Model directory not found: {}",
                model_dir.display()
            )));
        }

        let user_model = UserDefinedEmbeddingModel {
            onnx_file: read_model_file(&model_dir, "model.onnx")?,
            tokenizer_files: TokenizerFiles {
                tokenizer_file: read_model_file(&model_dir, "tokenizer.json")?,
                config_file: read_model_file(&model_dir, "config.json")?,
                special_tokens_map_file: read_model_file(&model_dir, "special_tokens_map.json")?,
                tokenizer_config_file: read_model_file(&model_dir, "tokenizer_config.json")?,
            },
        };

        let model = TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::default())
            .map_err(|e| RagError::Embedding(format!("Failed to initialize embedding model: {}", e)))?;

        tracing::info!("Embedding model initialized ({} dims)", dimension);
        Ok(Self { model, dimension })
    }
}

impl EmbeddingProvider for EmbeddingGenerator {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        for embedding in embeddings.iter_mut() {
            l2_normalize(embedding);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
