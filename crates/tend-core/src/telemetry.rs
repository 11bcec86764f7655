//! Structured telemetry for the generation pipeline
//!
//! Events are typed; where they go is up to the `TelemetrySink`. The default
//! sink forwards everything to `tracing` under the `tend::telemetry` target.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::models::{Category, Priority, Provenance};

/// Which side of the fallback chain produced candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    RuleEngine,
    ExternalReasoning,
    Cache,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::RuleEngine => "rule_engine",
            Source::ExternalReasoning => "external_reasoning",
            Source::Cache => "cache",
        }
    }
}

impl From<Provenance> for Source {
    fn from(provenance: Provenance) -> Self {
        match provenance {
            Provenance::ExternalReasoning => Source::ExternalReasoning,
            Provenance::RuleEngine | Provenance::FallbackNotice => Source::RuleEngine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    GenerationStarted {
        subject_id: String,
    },
    GenerationCompleted {
        subject_id: String,
        count: usize,
        categories: Vec<Category>,
        priorities: Vec<Priority>,
        latency_ms: u64,
        used_external: bool,
    },
    GenerationRateLimited {
        subject_id: String,
    },
    GenerationDataInsufficient {
        subject_id: String,
    },
    CacheHit {
        subject_id: String,
        source: String,
    },
    CacheMiss {
        subject_id: String,
    },
    CachePurged {
        subject_id: String,
        reason: String,
    },
    CacheSwept {
        purged: usize,
    },
    TemplateFailure {
        template_id: String,
        error: String,
    },
    SourceCompleted {
        subject_id: String,
        source: Source,
        count: usize,
    },
    ExternalReasoningFailed {
        subject_id: String,
        reason: String,
        timed_out: bool,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::GenerationStarted { .. } => "generation_started",
            TelemetryEvent::GenerationCompleted { .. } => "generation_completed",
            TelemetryEvent::GenerationRateLimited { .. } => "generation_rate_limited",
            TelemetryEvent::GenerationDataInsufficient { .. } => "generation_data_insufficient",
            TelemetryEvent::CacheHit { .. } => "cache_hit",
            TelemetryEvent::CacheMiss { .. } => "cache_miss",
            TelemetryEvent::CachePurged { .. } => "cache_purged",
            TelemetryEvent::CacheSwept { .. } => "cache_swept",
            TelemetryEvent::TemplateFailure { .. } => "template_failure",
            TelemetryEvent::SourceCompleted { .. } => "source_completed",
            TelemetryEvent::ExternalReasoningFailed { .. } => "external_reasoning_failed",
        }
    }
}

/// Receives telemetry events. Implementations must not block.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        match &event {
            TelemetryEvent::TemplateFailure { .. }
            | TelemetryEvent::ExternalReasoningFailed { .. }
            | TelemetryEvent::CachePurged { .. } => {
                tracing::warn!(target: "tend::telemetry", event = event.name(), %payload);
            }
            _ => {
                tracing::info!(target: "tend::telemetry", event = event.name(), %payload);
            }
        }
    }
}

/// Keeps every event in memory (tests, CLI summaries)
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events with the given name
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}
