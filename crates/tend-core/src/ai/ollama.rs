//! Ollama backend implementation
//!
//! HTTP client for the Ollama `/api/generate` endpoint. Prompts come from the
//! prompt library so they can be overridden on disk.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::prompts::PromptLibrary;

use super::parsing::parse_suggestions;
use super::types::{ReasoningRequest, SuggestedInsight};
use super::{render_prompt, ReasoningBackend};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    prompts: Arc<Mutex<PromptLibrary>>,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompts: Arc::new(Mutex::new(PromptLibrary::new())),
        }
    }

    /// Same server, different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(Mutex::new(prompts));
        self
    }

    /// Create from `OLLAMA_HOST` / `OLLAMA_MODEL`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    format: &'static str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl ReasoningBackend for OllamaBackend {
    async fn suggest_insights(&self, request: &ReasoningRequest) -> Result<Vec<SuggestedInsight>> {
        let (system, prompt) = render_prompt(&self.prompts, request)?;

        let body = OllamaRequest {
            model: self.model.clone(),
            prompt,
            system,
            format: "json",
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(model = %self.model, "Ollama response: {}", ollama_response.response);

        parse_suggestions(&ollama_response.response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.with_model("gemma3").model(), "gemma3");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OllamaBackend::new("http://127.0.0.1:1", "llama3.2");
        assert!(!backend.health_check().await);
    }
}
