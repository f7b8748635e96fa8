#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use rag_qa::generation::backend::{ModelBackend, PayloadStyle};
use rag_qa::generation::retry::RetryPolicy;
use rag_qa::generation::{GenerationConfig, GenerationManager};
use rag_qa::rag::embeddings::{l2_normalize, EmbeddingProvider};
use rag_qa::{RagError, Result};

pub const TEST_DIM: usize = 256;

/// Bag-of-words embedder: each lowercase token hashes into one bucket.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dim];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % self.dim as u64) as usize] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Hashing embedder that can be switched into a failing state.
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
}

impl FlakyEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dim),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EmbeddingProvider for FlakyEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::Embedding("provider unreachable".to_string()));
        }
        self.inner.encode(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Returns one vector fewer than requested.
pub struct ShortEmbedder {
    inner: HashingEmbedder,
}

impl ShortEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dim),
        }
    }
}

impl EmbeddingProvider for ShortEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = self.inner.encode(texts)?;
        vectors.pop();
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Advertises `dim` but emits vectors one value wider.
pub struct WrongDimEmbedder {
    dim: usize,
}

impl WrongDimEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingProvider for WrongDimEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.1; self.dim + 1]).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// How a scripted backend answers every request.
#[derive(Debug, Clone)]
pub enum Behavior {
    Status(u16),
    /// 200 with `generated_text` = the received input followed by this suffix.
    Echo(&'static str),
    /// 200 with this raw body.
    Body(&'static str),
}

struct MockState {
    behaviors: HashMap<String, Behavior>,
    hits: Mutex<HashMap<String, usize>>,
}

/// Local inference server with one scripted route per backend name.
pub struct MockBackends {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockBackends {
    pub async fn spawn(behaviors: &[(&str, Behavior)]) -> Self {
        let state = Arc::new(MockState {
            behaviors: behaviors
                .iter()
                .map(|(name, b)| (name.to_string(), b.clone()))
                .collect(),
            hits: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/models/:name", post(infer))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/models/{}", self.base_url, name)
    }

    pub fn hits(&self, name: &str) -> usize {
        self.state.hits.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.hits.lock().unwrap().values().sum()
    }

    /// Raw-payload backends for `names`, in priority order.
    pub fn backends(&self, names: &[&str]) -> Vec<ModelBackend> {
        names
            .iter()
            .enumerate()
            .map(|(priority, name)| ModelBackend::new(*name, self.endpoint(name), PayloadStyle::Raw, priority))
            .collect()
    }
}

async fn infer(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    *state.hits.lock().unwrap().entry(name.clone()).or_insert(0) += 1;

    match state.behaviors.get(&name) {
        Some(Behavior::Status(code)) => StatusCode::from_u16(*code).unwrap().into_response(),
        Some(Behavior::Echo(suffix)) => {
            let input = body["inputs"].as_str().unwrap_or_default();
            Json(json!([{ "generated_text": format!("{}{}", input, suffix) }])).into_response()
        }
        Some(Behavior::Body(raw)) => (StatusCode::OK, raw.to_string()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts).with_base_delay(Duration::from_millis(5))
}

pub fn manager(api_key: Option<&str>, backends: Vec<ModelBackend>, retry: RetryPolicy) -> GenerationManager {
    GenerationManager::new(GenerationConfig {
        api_key: api_key.map(str::to_string),
        backends,
        retry,
        timeout: Duration::from_secs(5),
        max_prompt_chars: 1000,
    })
    .unwrap()
}
