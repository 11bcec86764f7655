//! Pluggable reasoning backend abstraction
//!
//! External reasoning is an optional enrichment of rule-based insights. Every
//! backend runs behind the same trait; the `ReasoningAdapter` adds the
//! enable flag, health gate and deadline.
//!
//! # Architecture
//!
//! - `ReasoningBackend` trait: the interface every backend implements
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//! - `ReasoningAdapter`: what the orchestrator actually talks to
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod adapter;
mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use adapter::ReasoningAdapter;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::prompts::{PromptId, PromptLibrary};

/// Interface for all reasoning backends
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Propose insights for an anonymised summary
    async fn suggest_insights(&self, request: &ReasoningRequest) -> Result<Vec<SuggestedInsight>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Model name (recorded as candidate source)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete reasoning client
#[derive(Clone)]
pub enum AIClient {
    Ollama(OllamaBackend),
    /// vLLM, LocalAI, llama-server, Docker Model Runner, ...
    OpenAICompatible(OpenAICompatibleBackend),
    Mock(MockBackend),
}

impl AIClient {
    /// Create a client from environment variables.
    ///
    /// Returns None if the selected backend's host variable is not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            "none" | "off" => None,
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::Ollama(b) => AIClient::Ollama(b.with_model(model)),
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

#[async_trait]
impl ReasoningBackend for AIClient {
    async fn suggest_insights(&self, request: &ReasoningRequest) -> Result<Vec<SuggestedInsight>> {
        match self {
            AIClient::Ollama(b) => b.suggest_insights(request).await,
            AIClient::OpenAICompatible(b) => b.suggest_insights(request).await,
            AIClient::Mock(b) => b.suggest_insights(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Render the `suggest_insight` prompt into (system, user) text
pub(crate) fn render_prompt(
    prompts: &Mutex<PromptLibrary>,
    request: &ReasoningRequest,
) -> Result<(String, String)> {
    let vars = request.prompt_vars();
    let mut prompts = prompts.lock();
    let prompt = prompts.get(PromptId::SuggestInsight)?;
    Ok((prompt.render_system(&vars), prompt.render_user(&vars)))
}
