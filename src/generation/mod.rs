//! Multi-backend text generation with a guaranteed local fallback.
//!
//! Backends are tried one at a time, the preferred one first and then the
//! rest in priority order. Each backend gets up to `RetryPolicy::max_attempts`
//! requests; only retryable outcomes (503, timeouts, connection failures)
//! lead to another request on the same backend. When every backend has
//! failed, `fallback::synthesize` produces the answer locally.

pub mod backend;
pub mod fallback;
pub mod retry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::Settings;
use crate::error::Result;
use self::backend::{AttemptOutcome, InferenceClient, ModelBackend};
use self::retry::RetryPolicy;

pub const CONFIGURATION_ERROR_MESSAGE: &str =
    "Configuration error: Hugging Face API key not found. Please set HF_API_KEY environment variable.";

/// Built-in backend order after the configured model.
pub const FALLBACK_MODELS: &[&str] = &[
    "microsoft/DialoGPT-large",
    "facebook/blenderbot-400M-distill",
    "google/flan-t5-base",
];

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub backends: Vec<ModelBackend>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub max_prompt_chars: usize,
}

impl GenerationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut names: Vec<&str> = vec![settings.hf_llm_model.as_str()];
        for name in FALLBACK_MODELS {
            if !names.contains(name) {
                names.push(name);
            }
        }

        let backends = names
            .into_iter()
            .enumerate()
            .map(|(priority, name)| ModelBackend::huggingface(&settings.hf_api_base, name, priority))
            .collect();

        Self {
            api_key: settings.api_key().map(str::to_string),
            backends,
            retry: RetryPolicy::new(settings.max_retries),
            timeout: settings.request_timeout(),
            max_prompt_chars: settings.max_prompt_chars,
        }
    }
}

/// One request made during a single `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub backend: String,
    pub retry_count: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerSource {
    Backend(String),
    Fallback,
    NotConfigured,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub text: String,
    pub source: AnswerSource,
    pub attempts: Vec<GenerationAttempt>,
}

pub struct GenerationManager {
    backends: Vec<ModelBackend>,
    client: Option<InferenceClient>,
    retry: RetryPolicy,
    max_prompt_chars: usize,
    preferred: AtomicUsize,
}

impl GenerationManager {
    pub fn new(mut config: GenerationConfig) -> Result<Self> {
        config.backends.sort_by_key(|b| b.priority);

        let client = match config.api_key.filter(|key| !key.trim().is_empty()) {
            Some(key) => Some(InferenceClient::new(key, config.timeout)?),
            None => {
                tracing::warn!("No generation credential configured; answers will be configuration errors");
                None
            }
        };

        Ok(Self {
            backends: config.backends,
            client,
            retry: config.retry,
            max_prompt_chars: config.max_prompt_chars,
            preferred: AtomicUsize::new(0),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Name of the backend tried first on the next call.
    pub fn current_backend(&self) -> Option<&str> {
        self.backends
            .get(self.preferred.load(Ordering::Relaxed))
            .map(|b| b.name.as_str())
    }

    /// Always returns usable, non-empty text.
    pub async fn generate(&self, prompt: &str, context: &str) -> String {
        self.generate_with_report(prompt, context).await.text
    }

    pub async fn generate_with_report(&self, prompt: &str, context: &str) -> GenerationReport {
        let client = match &self.client {
            Some(client) => client,
            None => {
                return GenerationReport {
                    text: CONFIGURATION_ERROR_MESSAGE.to_string(),
                    source: AnswerSource::NotConfigured,
                    attempts: Vec::new(),
                };
            }
        };

        let prompt = limit_prompt(prompt, self.max_prompt_chars);
        let mut attempts = Vec::new();

        for index in self.attempt_order() {
            let backend = &self.backends[index];
            if let Some(text) = self.try_backend(client, backend, &prompt, &mut attempts).await {
                let previous = self.preferred.swap(index, Ordering::Relaxed);
                if previous != index {
                    tracing::info!("Switched preferred backend to {}", backend.name);
                }
                return GenerationReport {
                    text,
                    source: AnswerSource::Backend(backend.name.clone()),
                    attempts,
                };
            }
        }

        tracing::warn!(
            "All {} backends failed after {} attempts; using local fallback",
            self.backends.len(),
            attempts.len()
        );
        GenerationReport {
            text: fallback::synthesize(&prompt, context),
            source: AnswerSource::Fallback,
            attempts,
        }
    }

    async fn try_backend(
        &self,
        client: &InferenceClient,
        backend: &ModelBackend,
        prompt: &str,
        attempts: &mut Vec<GenerationAttempt>,
    ) -> Option<String> {
        let mut attempt = 0;
        loop {
            let outcome = client.attempt(backend, prompt).await;
            tracing::debug!("Backend {} attempt {}: {}", backend.name, attempt, outcome);
            attempts.push(GenerationAttempt {
                backend: backend.name.clone(),
                retry_count: attempt,
                outcome: outcome.clone(),
            });

            match outcome {
                AttemptOutcome::Success(text) => return Some(text),
                AttemptOutcome::Retryable(_) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::info!("Backend {} not ready, retrying in {:?}", backend.name, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                AttemptOutcome::Retryable(reason) | AttemptOutcome::Terminal(reason) => {
                    tracing::warn!("Backend {} failed: {}", backend.name, reason);
                    return None;
                }
            }
        }
    }

    fn attempt_order(&self) -> Vec<usize> {
        let preferred = self.preferred.load(Ordering::Relaxed);
        let mut order = Vec::with_capacity(self.backends.len());
        if preferred < self.backends.len() {
            order.push(preferred);
        }
        order.extend((0..self.backends.len()).filter(|i| *i != preferred));
        order
    }
}

/// Trim and cut the prompt to `max_chars` characters, marking the cut with "...".
fn limit_prompt(prompt: &str, max_chars: usize) -> String {
    let prompt = prompt.trim();
    if prompt.chars().count() > max_chars {
        let cut: String = prompt.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        prompt.to_string()
    }
}
