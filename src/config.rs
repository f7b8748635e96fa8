use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_LLM_MODEL: &str = "microsoft/DialoGPT-large";

/// Process settings, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub hf_api_key: Option<String>,
    pub hf_api_base: String,
    pub hf_llm_model: String,
    pub vector_store_path: PathBuf,
    pub embedding_model_dir: PathBuf,
    pub embedding_dim: usize,
    pub bind_addr: String,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    /// Hard cap on the prompt sent to any backend, 1000 by default on purpose.
    /// With default `top_k` and `chunk_size` the cut lands inside the context,
    /// so backends usually never see the trailing question.
    pub max_prompt_chars: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_environment(Environment::default())
    }

    /// Build settings from an explicit environment source.
    pub fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("hf_api_base", DEFAULT_API_BASE)?
            .set_default("hf_llm_model", DEFAULT_LLM_MODEL)?
            .set_default("vector_store_path", "data/vector_index")?
            .set_default("embedding_model_dir", "models/bge-small-en-v1.5")?
            .set_default("embedding_dim", 384)?
            .set_default("bind_addr", "0.0.0.0:8000")?
            .set_default("top_k", 5)?
            .set_default("chunk_size", 1000)?
            .set_default("chunk_overlap", 200)?
            .set_default("max_retries", 2)?
            .set_default("request_timeout_secs", 30)?
            .set_default("max_prompt_chars", 1000)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// The generation credential, treating an empty value as missing.
    pub fn api_key(&self) -> Option<&str> {
        self.hf_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
