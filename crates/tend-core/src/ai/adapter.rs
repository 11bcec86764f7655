//! Reasoning adapter
//!
//! Wraps an optional `AIClient` with the enable flag, a health gate and one
//! deadline covering the whole exchange. Suggestions are validated and turned
//! into candidates here, so nothing unvetted reaches the orchestrator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{ExternalConfig, TtlTable};
use crate::error::{Error, Result};
use crate::models::{Category, GenerationContext, InsightCandidate, Priority, Provenance, Technique};

use super::types::{ReasoningRequest, SuggestedInsight};
use super::{AIClient, ReasoningBackend};

const DEFAULT_CONFIDENCE: f64 = 0.6;

#[derive(Clone)]
pub struct ReasoningAdapter {
    client: Option<AIClient>,
    enabled: bool,
    timeout: Duration,
}

impl ReasoningAdapter {
    pub fn new(client: Option<AIClient>, config: &ExternalConfig) -> Self {
        Self {
            client,
            enabled: config.enabled,
            timeout: config.timeout,
        }
    }

    /// Adapter that never calls out
    pub fn disabled() -> Self {
        Self {
            client: None,
            enabled: false,
            timeout: ExternalConfig::default().timeout,
        }
    }

    /// Override the deadline (tests)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enabled and a backend is configured
    pub fn is_configured(&self) -> bool {
        self.enabled && self.client.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn model(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.model())
    }

    pub fn host(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.host())
    }

    /// Configured and answering health checks within the deadline
    pub async fn is_available(&self) -> bool {
        match (&self.client, self.enabled) {
            (Some(client), true) => tokio::time::timeout(self.timeout, client.health_check())
                .await
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Ask the backend for supplementary insights.
    ///
    /// Errors: `FeatureDisabled` when switched off, `ExternalUnavailable` when
    /// no backend is configured or it fails its health check, `Timeout` when
    /// the deadline passes. Backend errors pass through.
    pub async fn suggest(
        &self,
        ctx: &GenerationContext,
        max_insights: usize,
        ttl: &TtlTable,
        now: DateTime<Utc>,
    ) -> Result<Vec<InsightCandidate>> {
        if !self.enabled {
            return Err(Error::FeatureDisabled("external_reasoning"));
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::ExternalUnavailable("no reasoning backend configured".into()))?;

        let request = ReasoningRequest::from_context(ctx, max_insights);

        let exchange = async {
            if !client.health_check().await {
                return Err(Error::ExternalUnavailable(format!(
                    "{} failed health check",
                    client.host()
                )));
            }
            client.suggest_insights(&request).await
        };

        let suggestions = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let total = suggestions.len();
        let candidates: Vec<InsightCandidate> = suggestions
            .into_iter()
            .filter_map(|s| into_candidate(s, client.model(), ttl, now))
            .take(max_insights)
            .collect();

        if candidates.len() < total {
            debug!(
                dropped = total - candidates.len(),
                "Discarded unusable backend suggestions"
            );
        }
        info!(
            model = client.model(),
            count = candidates.len(),
            "External reasoning returned suggestions"
        );

        Ok(candidates)
    }
}

/// Validate a suggestion and turn it into a candidate. Unknown categories
/// and empty text are dropped.
fn into_candidate(
    suggestion: SuggestedInsight,
    model: &str,
    ttl: &TtlTable,
    now: DateTime<Utc>,
) -> Option<InsightCandidate> {
    let category: Category = suggestion.category.parse().ok()?;
    if suggestion.title.trim().is_empty() || suggestion.message.trim().is_empty() {
        return None;
    }

    let priority = suggestion
        .priority
        .as_deref()
        .and_then(|p| p.parse::<Priority>().ok())
        .unwrap_or(Priority::Medium);
    let technique = suggestion.technique.as_deref().and_then(parse_technique);

    let mut candidate = InsightCandidate::new(
        category,
        priority,
        suggestion.title.trim(),
        suggestion.message.trim(),
        Provenance::ExternalReasoning,
        now,
    )
    .with_advice(suggestion.advice.into_iter().filter(|a| !a.trim().is_empty()))
    .with_confidence(suggestion.confidence.unwrap_or(DEFAULT_CONFIDENCE))
    .with_source(model)
    .with_ttl(ttl.for_category(category));

    if let Some(technique) = technique {
        candidate = candidate.with_technique(technique);
    }
    Some(candidate)
}

fn parse_technique(name: &str) -> Option<Technique> {
    serde_json::from_value(serde_json::Value::String(name.trim().to_lowercase())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::TimeWindow;

    fn ctx() -> GenerationContext {
        GenerationContext::new("s1", TimeWindow::last_days(Utc::now(), 7)).with_profile()
    }

    fn enabled(client: AIClient) -> ReasoningAdapter {
        ReasoningAdapter::new(Some(client), &ExternalConfig::default())
    }

    #[tokio::test]
    async fn test_disabled_adapter() {
        let adapter = ReasoningAdapter::disabled();
        let err = adapter
            .suggest(&ctx(), 5, &TtlTable::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FeatureDisabled(_)));
        assert!(!adapter.is_available().await);
    }

    #[tokio::test]
    async fn test_unconfigured_adapter() {
        let adapter = ReasoningAdapter::new(None, &ExternalConfig::default());
        assert!(!adapter.is_configured());
        let err = adapter
            .suggest(&ctx(), 5, &TtlTable::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unhealthy_backend_not_called() {
        let mock = MockBackend::unhealthy();
        let adapter = enabled(AIClient::Mock(mock.clone()));
        let err = adapter
            .suggest(&ctx(), 5, &TtlTable::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalUnavailable(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_suggestions_become_candidates() {
        let now = Utc::now();
        let adapter = enabled(AIClient::mock());
        let candidates = adapter
            .suggest(&ctx(), 5, &TtlTable::default(), now)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.provenance, Provenance::ExternalReasoning);
        assert_eq!(c.category, Category::Coping);
        assert_eq!(c.technique, Some(Technique::UrgeSurfing));
        assert_eq!(c.source, "mock");
        assert_eq!(c.valid_until, now + TtlTable::default().coping);
    }

    #[tokio::test]
    async fn test_invalid_suggestions_dropped() {
        let mut bad_category = SuggestedInsight::new(Category::Coping, "t", "m");
        bad_category.category = "astrology".into();
        let mut overconfident = SuggestedInsight::new(Category::Pattern, "Evenings", "Most urges come after 9pm.");
        overconfident.confidence = Some(3.0);
        let empty = SuggestedInsight::new(Category::Warning, "Careful", "  ");

        let mock = MockBackend::new().with_suggestions(vec![bad_category, overconfident, empty]);
        let adapter = enabled(AIClient::Mock(mock));
        let candidates = adapter
            .suggest(&ctx(), 5, &TtlTable::default(), Utc::now())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].category, Category::Pattern);
        assert_eq!(candidates[0].confidence, 1.0);
        assert_eq!(candidates[0].priority, Priority::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_timeout() {
        let mock = MockBackend::new().with_delay(Duration::from_secs(60));
        let adapter = enabled(AIClient::Mock(mock)).with_timeout(Duration::from_secs(15));

        let err = adapter
            .suggest(&ctx(), 5, &TtlTable::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_parse_technique() {
        assert_eq!(parse_technique("Urge_Surfing"), Some(Technique::UrgeSurfing));
        assert_eq!(parse_technique("hypnosis"), None);
    }
}
