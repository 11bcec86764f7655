//! Tend Core Library
//!
//! Therapeutic insight generation for behavioral self-tracking:
//! - Distortion detection over free-text entries
//! - Rule templates that turn behavioral records into insights
//! - Optional external reasoning (Ollama, OpenAI-compatible servers)
//! - Generation orchestration with cooldown and single-flight per subject
//! - Content-addressed insight cache on encrypted SQLite

pub mod ai;
pub mod cache;
pub mod config;
pub mod db;
pub mod distortion;
pub mod error;
pub mod insights;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod telemetry;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend, ReasoningAdapter, ReasoningBackend};
pub use cache::{content_hash, CacheEntry, InsightCache, InsightStore, MemoryStore, SourceTag, SweepReport};
pub use config::EngineConfig;
pub use db::Database;
pub use distortion::{DistortionAssessment, DistortionDetector, DistortionKind, SeverityTier};
pub use error::{Error, Result};
pub use insights::{InsightTemplate, TemplateEngine};
pub use models::{
    BehaviorRecord, Category, Feedback, GenerationContext, InsightCandidate, Preferences, Priority, Provenance,
    Technique,
};
pub use orchestrator::{InsightService, InsightServiceBuilder};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use telemetry::{MemorySink, TelemetryEvent, TelemetrySink, TracingSink};
