use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const EMPTY_ANSWER_PLACEHOLDER: &str =
    "I understand your question, but I need more context to provide a specific answer.";

/// How a backend wants the prompt shaped before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStyle {
    Raw,
    TaskPrefix(&'static str),
}

/// Model-name fragment to payload style. First match wins; unlisted models are `Raw`.
const PAYLOAD_STYLES: &[(&str, PayloadStyle)] = &[
    ("flan-t5", PayloadStyle::TaskPrefix("Answer this question: ")),
    ("blenderbot", PayloadStyle::Raw),
];

pub fn payload_style_for(model_name: &str) -> PayloadStyle {
    let name = model_name.to_lowercase();
    PAYLOAD_STYLES
        .iter()
        .find(|(fragment, _)| name.contains(fragment))
        .map(|(_, style)| *style)
        .unwrap_or(PayloadStyle::Raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBackend {
    pub name: String,
    pub endpoint: String,
    pub style: PayloadStyle,
    pub priority: usize,
}

impl ModelBackend {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, style: PayloadStyle, priority: usize) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            style,
            priority,
        }
    }

    /// A Hugging Face inference backend at `{api_base}/models/{name}`.
    pub fn huggingface(api_base: &str, name: &str, priority: usize) -> Self {
        let endpoint = format!("{}/models/{}", api_base.trim_end_matches('/'), name);
        Self::new(name, endpoint, payload_style_for(name), priority)
    }

    pub fn render_input(&self, prompt: &str) -> String {
        match self.style {
            PayloadStyle::Raw => prompt.to_string(),
            PayloadStyle::TaskPrefix(prefix) => format!("{}{}", prefix, prompt),
        }
    }
}

/// Result of a single request against a single backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    /// Worth retrying the same backend (warming up, timed out, unreachable).
    Retryable(String),
    /// Move on to the next backend.
    Terminal(String),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success(_) => write!(f, "success"),
            AttemptOutcome::Retryable(reason) => write!(f, "retryable: {}", reason),
            AttemptOutcome::Terminal(reason) => write!(f, "terminal: {}", reason),
        }
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct InferenceItem {
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    translation_text: Option<String>,
}

/// Pull the answer out of a 200 body. `None` means the shape was unexpected.
pub fn extract_answer(body: &str, sent_input: &str, prompt: &str) -> Option<String> {
    let items: Vec<InferenceItem> = serde_json::from_str(body).ok()?;
    let first = items.into_iter().next()?;

    let answer = if let Some(generated) = first.generated_text {
        let stripped = generated
            .strip_prefix(sent_input)
            .or_else(|| generated.strip_prefix(prompt))
            .unwrap_or(generated.as_str());
        stripped.trim().to_string()
    } else {
        first.translation_text?
    };

    if answer.trim().is_empty() {
        Some(EMPTY_ANSWER_PLACEHOLDER.to_string())
    } else {
        Some(answer)
    }
}

/// Bearer-authenticated HTTP client for inference endpoints.
pub struct InferenceClient {
    client: Client,
    api_key: String,
}

impl InferenceClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key })
    }

    pub async fn attempt(&self, backend: &ModelBackend, prompt: &str) -> AttemptOutcome {
        let input = backend.render_input(prompt);

        let response = match self
            .client
            .post(&backend.endpoint)
            .bearer_auth(&self.api_key)
            .json(&InferenceRequest { inputs: &input })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return AttemptOutcome::Retryable(format!("transport: {}", e));
            }
            Err(e) => return AttemptOutcome::Terminal(format!("transport: {}", e)),
        };

        let status = response.status();
        match status {
            StatusCode::OK => match response.text().await {
                Ok(body) => match extract_answer(&body, &input, prompt) {
                    Some(answer) => AttemptOutcome::Success(answer),
                    None => AttemptOutcome::Terminal("unexpected response shape".to_string()),
                },
                Err(e) if e.is_timeout() => AttemptOutcome::Retryable(format!("reading body: {}", e)),
                Err(e) => AttemptOutcome::Terminal(format!("reading body: {}", e)),
            },
            StatusCode::SERVICE_UNAVAILABLE => AttemptOutcome::Retryable("model loading (503)".to_string()),
            other => AttemptOutcome::Terminal(format!("HTTP {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_table() {
        assert_eq!(
            payload_style_for("google/flan-t5-base"),
            PayloadStyle::TaskPrefix("Answer this question: ")
        );
        assert_eq!(payload_style_for("facebook/blenderbot-400M-distill"), PayloadStyle::Raw);
        assert_eq!(payload_style_for("microsoft/DialoGPT-large"), PayloadStyle::Raw);
    }

    #[test]
    fn test_huggingface_endpoint() {
        let backend = ModelBackend::huggingface("https://api.example.com/", "google/flan-t5-base", 3);
        assert_eq!(backend.endpoint, "https://api.example.com/models/google/flan-t5-base");
        assert_eq!(backend.render_input("Why?"), "Answer this question: Why?");
    }

    #[test]
    fn test_extract_strips_echoed_prompt() {
        let body = r#"[{"generated_text": "Question: hi\nAnswer: hello there"}]"#;
        let answer = extract_answer(body, "Question: hi\nAnswer:", "Question: hi\nAnswer:");
        assert_eq!(answer.as_deref(), Some("hello there"));
    }

    #[test]
    fn test_extract_strips_raw_prompt_when_template_not_echoed() {
        let body = r#"[{"generated_text": "Why?Because."}]"#;
        let answer = extract_answer(body, "Answer this question: Why?", "Why?");
        assert_eq!(answer.as_deref(), Some("Because."));
    }

    #[test]
    fn test_extract_empty_uses_placeholder() {
        let body = r#"[{"generated_text": "prompt"}]"#;
        let answer = extract_answer(body, "prompt", "prompt");
        assert_eq!(answer.as_deref(), Some(EMPTY_ANSWER_PLACEHOLDER));
    }

    #[test]
    fn test_extract_translation_text() {
        let body = r#"[{"translation_text": "Bonjour"}]"#;
        assert_eq!(extract_answer(body, "x", "x").as_deref(), Some("Bonjour"));
    }

    #[test]
    fn test_extract_empty_translation_uses_placeholder() {
        let body = r#"[{"translation_text": ""}]"#;
        assert_eq!(extract_answer(body, "x", "x").as_deref(), Some(EMPTY_ANSWER_PLACEHOLDER));
    }

    #[test]
    fn test_extract_unexpected_shapes() {
        assert!(extract_answer(r#"{"error": "boom"}"#, "x", "x").is_none());
        assert!(extract_answer("[]", "x", "x").is_none());
        assert!(extract_answer(r#"[{"label": "POSITIVE"}]"#, "x", "x").is_none());
        assert!(extract_answer("not json", "x", "x").is_none());
    }
}
