//! Mock backend for testing
//!
//! Returns canned suggestions, a canned failure, or nothing at all after an
//! optional delay. Counts calls so tests can assert on fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::Category;

use super::types::{ReasoningRequest, SuggestedInsight};
use super::ReasoningBackend;

#[derive(Debug, Clone)]
enum MockBehavior {
    Respond(Vec<SuggestedInsight>),
    Fail(String),
}

/// Mock reasoning backend
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Healthy backend that answers with one coping suggestion
    pub fn new() -> Self {
        let mut suggestion = SuggestedInsight::new(
            Category::Coping,
            "Ride out the next urge",
            "Urges usually peak and pass within twenty minutes. Next time, set a timer and watch it fade.",
        );
        suggestion.priority = Some("medium".into());
        suggestion.confidence = Some(0.7);
        suggestion.technique = Some("urge_surfing".into());
        suggestion.advice = vec!["Set a 15 minute timer".into(), "Rate the urge before and after".into()];

        Self {
            healthy: true,
            behavior: MockBehavior::Respond(vec![suggestion]),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Answer with these suggestions
    pub fn with_suggestions(mut self, suggestions: Vec<SuggestedInsight>) -> Self {
        self.behavior = MockBehavior::Respond(suggestions);
        self
    }

    /// Fail every call with this message
    pub fn failing(mut self, message: &str) -> Self {
        self.behavior = MockBehavior::Fail(message.to_string());
        self
    }

    /// Sleep before answering (tokio clock, so paused-time tests work)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `suggest_insights` calls so far, across clones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// No-op for mock
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }
}

#[async_trait]
impl ReasoningBackend for MockBackend {
    async fn suggest_insights(&self, request: &ReasoningRequest) -> Result<Vec<SuggestedInsight>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Respond(suggestions) => Ok(suggestions
                .iter()
                .take(request.max_insights)
                .cloned()
                .collect()),
            MockBehavior::Fail(message) => Err(Error::ExternalUnavailable(message.clone())),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
