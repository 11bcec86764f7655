//! Integration tests for tend-core
//!
//! These tests drive `InsightService` end to end: context in, ordered
//! insights out, with the cache, telemetry and reasoning adapter wired the
//! way the CLI wires them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tend_core::{
    ai::{AIClient, MockBackend, ReasoningAdapter},
    cache::{content_hash, InsightCache, MemoryStore, SourceTag},
    config::{CacheConfig, ExternalConfig},
    db::Database,
    distortion::{DetectionContext, DistortionDetector, DistortionKind},
    insights::{InsightTemplate, TemplateEngine, TemplateInput},
    models::{
        BehaviorRecord, Category, GenerationContext, InsightCandidate, Priority, Provenance, TimeWindow,
    },
    orchestrator::InsightService,
    telemetry::{MemorySink, TelemetryEvent},
    Result,
};

// =============================================================================
// Helpers
// =============================================================================

fn records(count: usize, intensity: f64, resistance: f64) -> Vec<BehaviorRecord> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            BehaviorRecord::new(
                format!("rec-{}", i),
                "smoking",
                intensity,
                resistance,
                now - chrono::Duration::hours((count - i) as i64),
            )
        })
        .collect()
}

fn context(subject: &str, records: Vec<BehaviorRecord>) -> GenerationContext {
    GenerationContext::new(subject, TimeWindow::last_days(Utc::now(), 7))
        .with_profile()
        .with_records(records)
}

/// Ten records, exactly three of them with resistance >= 7
fn mixed_resistance_context(subject: &str) -> GenerationContext {
    let mut list = records(10, 6.0, 3.0);
    for index in [1, 4, 7] {
        list[index].resistance = 8.0;
    }
    context(subject, list)
}

/// Always fires; counts how many passes evaluated it
struct FixedTemplate {
    id: &'static str,
    category: Category,
    priority: Priority,
    message: &'static str,
    passes: Arc<AtomicUsize>,
}

impl FixedTemplate {
    fn boxed(
        id: &'static str,
        category: Category,
        priority: Priority,
        message: &'static str,
        passes: &Arc<AtomicUsize>,
    ) -> Box<dyn InsightTemplate> {
        Box::new(Self {
            id,
            category,
            priority,
            message,
            passes: passes.clone(),
        })
    }
}

impl InsightTemplate for FixedTemplate {
    fn id(&self) -> &'static str {
        self.id
    }

    fn category(&self) -> Category {
        self.category
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn condition(&self, _input: &TemplateInput<'_>) -> bool {
        self.passes.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        Ok(input
            .candidate(self.id, self.category, self.priority, self.id, self.message)
            .with_confidence(0.5))
    }
}

fn counting_engine(passes: &Arc<AtomicUsize>) -> TemplateEngine {
    TemplateEngine::with_templates(vec![FixedTemplate::boxed(
        "fixed_coping",
        Category::Coping,
        Priority::Medium,
        "Take three slow breaths before you decide anything",
        passes,
    )])
}

fn adapter_with(backend: MockBackend, timeout: Duration) -> ReasoningAdapter {
    ReasoningAdapter::new(
        Some(AIClient::Mock(backend)),
        &ExternalConfig {
            enabled: true,
            timeout,
        },
    )
}

// =============================================================================
// Cache properties
// =============================================================================

#[test]
fn test_hash_is_deterministic_and_tracks_appends() {
    let mut list = records(8, 5.0, 5.0);
    let first = content_hash(&list, 5);
    assert_eq!(first, content_hash(&list, 5));

    list.push(BehaviorRecord::new("rec-new", "smoking", 5.0, 5.0, Utc::now()));
    assert_ne!(first, content_hash(&list, 5));
}

#[test]
fn test_cache_hit_requires_all_three_conditions() {
    let store = Arc::new(MemoryStore::new());
    let cache = InsightCache::new(store.clone(), &CacheConfig::default());
    let candidate = InsightCandidate::new(
        Category::Pattern,
        Priority::Low,
        "Evenings",
        "Most urges come in the evening",
        Provenance::RuleEngine,
        Utc::now(),
    );

    // Valid
    cache
        .put("s1", vec![candidate.clone()], "h1", chrono::Duration::hours(1), SourceTag::FullAnalysis)
        .unwrap();
    assert!(cache.get("s1", "h1").unwrap().is_some());

    // Hash mismatch
    assert!(cache.get("s1", "h2").unwrap().is_none());
    assert!(store.is_empty());

    // Expired
    cache
        .put("s1", vec![candidate.clone()], "h1", chrono::Duration::seconds(-1), SourceTag::FullAnalysis)
        .unwrap();
    assert!(cache.get("s1", "h1").unwrap().is_none());
    assert!(store.is_empty());

    // Schema mismatch
    cache
        .put("s1", vec![candidate], "h1", chrono::Duration::hours(1), SourceTag::FullAnalysis)
        .unwrap();
    let upgraded = InsightCache::new(store.clone(), &CacheConfig::default()).with_schema_version(99);
    assert!(upgraded.get("s1", "h1").unwrap().is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_invalidate_discards_matching_entry() {
    let service = InsightService::builder().build();
    let ctx = mixed_resistance_context("s1");
    let hash = content_hash(&ctx.records, service.config().cache.hash_slice);

    service.generate(ctx).await.unwrap();
    assert!(service.cache().get("s1", &hash).unwrap().is_some());

    assert!(service.invalidate("s1").await.unwrap());
    assert!(service.cache().get("s1", &hash).unwrap().is_none());
}

// =============================================================================
// Orchestration properties
// =============================================================================

#[tokio::test]
async fn test_concurrent_generation_runs_one_pass() {
    let passes = Arc::new(AtomicUsize::new(0));
    let service = InsightService::builder().engine(counting_engine(&passes)).build();

    let (a, b) = tokio::join!(
        service.generate(context("s1", records(4, 5.0, 5.0))),
        service.generate(context("s1", records(4, 5.0, 5.0))),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(passes.load(Ordering::SeqCst), 1);
    assert_eq!(a, b);
    assert!(!service.is_generating("s1"));
}

#[tokio::test]
async fn test_other_subjects_do_not_share_flight() {
    let passes = Arc::new(AtomicUsize::new(0));
    let service = InsightService::builder().engine(counting_engine(&passes)).build();

    let (a, b) = tokio::join!(
        service.generate(context("s1", records(4, 5.0, 5.0))),
        service.generate(context("s2", records(4, 5.0, 5.0))),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(passes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cooldown_returns_cached_result() {
    let passes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(MemorySink::new());
    let service = InsightService::builder()
        .engine(counting_engine(&passes))
        .telemetry(sink.clone())
        .build();

    let first = service.generate(context("s1", records(4, 5.0, 5.0))).await.unwrap();
    let second = service.generate(context("s1", records(5, 5.0, 5.0))).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(passes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.count("generation_rate_limited"), 1);
}

#[tokio::test]
async fn test_cooldown_without_cache_returns_notice() {
    let passes = Arc::new(AtomicUsize::new(0));
    let service = InsightService::builder().engine(counting_engine(&passes)).build();

    service.generate(context("s1", records(4, 5.0, 5.0))).await.unwrap();
    // Bust the entry behind the service's back; cooldown still applies
    service.cache().invalidate("s1").unwrap();

    let out = service.generate(context("s1", records(4, 5.0, 5.0))).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].provenance, Provenance::FallbackNotice);
    assert_eq!(out[0].priority, Priority::Low);
    assert_eq!(passes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_priority_ordering() {
    let passes = Arc::new(AtomicUsize::new(0));
    let engine = TemplateEngine::with_templates(vec![
        FixedTemplate::boxed("low", Category::Pattern, Priority::Low, "Mornings are quiet for you", &passes),
        FixedTemplate::boxed("critical", Category::Warning, Priority::Critical, "Urges are climbing fast today", &passes),
        FixedTemplate::boxed("medium", Category::Trigger, Priority::Medium, "Stress at work precedes most urges", &passes),
        FixedTemplate::boxed("high", Category::Progress, Priority::High, "You resisted more this week", &passes),
    ]);
    let service = InsightService::builder().engine(engine).build();

    let out = service.generate(context("s1", records(4, 5.0, 5.0))).await.unwrap();
    let priorities: Vec<Priority> = out.iter().map(|c| c.priority).collect();
    assert_eq!(
        priorities,
        vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
    );
}

#[tokio::test]
async fn test_near_duplicates_collapse() {
    let passes = Arc::new(AtomicUsize::new(0));
    let engine = TemplateEngine::with_templates(vec![
        FixedTemplate::boxed(
            "first",
            Category::Coping,
            Priority::Medium,
            "Take a slow breath and notice the urge pass by",
            &passes,
        ),
        FixedTemplate::boxed(
            "second",
            Category::Coping,
            Priority::Medium,
            "Take a slow breath and notice the urge pass",
            &passes,
        ),
    ]);
    let service = InsightService::builder().engine(engine).build();

    let out = service.generate(context("s1", records(4, 5.0, 5.0))).await.unwrap();
    assert_eq!(out.len(), 1);
}

#[tokio::test]
async fn test_output_capped_by_frequency() {
    let passes = Arc::new(AtomicUsize::new(0));
    let messages = [
        "one alpha", "two bravo", "three charlie", "four delta", "five echo", "six foxtrot", "seven golf",
    ];
    let templates = Category::all()
        .iter()
        .zip(messages)
        .map(|(category, message)| FixedTemplate::boxed("fixed", *category, Priority::Medium, message, &passes))
        .collect();
    let service = InsightService::builder()
        .engine(TemplateEngine::with_templates(templates))
        .build();

    let out = service.generate(context("s1", records(4, 5.0, 5.0))).await.unwrap();
    assert_eq!(out.len(), service.config().limits.max_insights);
}

#[test]
fn test_overgeneralization_detected_in_turkish() {
    let detector = DistortionDetector::new();
    let assessment = detector
        .assess(
            "her zaman böyle oluyor, asla değişmeyecek",
            &DetectionContext::new(Utc::now()),
        )
        .unwrap();

    assert!(assessment.detected.contains(&DistortionKind::Overgeneralization));
    assert!(assessment.confidence > 0.0);
    assert!(!assessment.recommended.is_empty());
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_no_records_no_profile_yields_notice() {
    let sink = Arc::new(MemorySink::new());
    let service = InsightService::builder().telemetry(sink.clone()).build();
    let ctx = GenerationContext::new("new-user", TimeWindow::last_days(Utc::now(), 7));

    let out = service.generate(ctx).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].priority, Priority::Low);
    assert_eq!(out[0].provenance, Provenance::FallbackNotice);
    assert_eq!(sink.count("generation_data_insufficient"), 1);
}

#[tokio::test]
async fn test_resistance_progress_surfaces() {
    let service = InsightService::builder().build();
    let out = service.generate(mixed_resistance_context("s1")).await.unwrap();

    let progress = out
        .iter()
        .find(|c| c.category == Category::Progress)
        .expect("progress insight");
    assert!(progress.priority >= Priority::Medium);
    assert!(progress.confidence >= 0.7);
}

#[tokio::test(start_paused = true)]
async fn test_external_timeout_falls_back_to_rules() {
    let sink = Arc::new(MemorySink::new());
    let backend = MockBackend::new().with_delay(Duration::from_secs(60));
    let service = InsightService::builder()
        .adapter(adapter_with(backend, Duration::from_secs(15)))
        .telemetry(sink.clone())
        .build();

    let started = tokio::time::Instant::now();
    let out = service.generate(mixed_resistance_context("s1")).await.unwrap();
    let elapsed = started.elapsed();

    assert!(!out.is_empty());
    assert!(out.iter().all(|c| c.provenance != Provenance::ExternalReasoning));
    assert!(elapsed >= Duration::from_secs(15));
    assert!(elapsed < Duration::from_secs(16));

    let timed_out = sink.events().into_iter().any(|e| {
        matches!(e, TelemetryEvent::ExternalReasoningFailed { timed_out: true, .. })
    });
    assert!(timed_out);
    assert_eq!(
        service.cache().entry("s1").unwrap().unwrap().source_tag,
        SourceTag::HeuristicFallback
    );
}

#[tokio::test]
async fn test_external_candidate_is_merged() {
    let sink = Arc::new(MemorySink::new());
    let backend = MockBackend::new();
    let service = InsightService::builder()
        .adapter(adapter_with(backend.clone(), Duration::from_secs(15)))
        .telemetry(sink.clone())
        .build();

    let out = service.generate(mixed_resistance_context("s1")).await.unwrap();

    assert_eq!(backend.call_count(), 1);
    assert!(out.iter().any(|c| c.provenance == Provenance::ExternalReasoning));
    let used_external = sink.events().into_iter().any(|e| {
        matches!(e, TelemetryEvent::GenerationCompleted { used_external: true, .. })
    });
    assert!(used_external);
}

#[tokio::test]
async fn test_failing_backend_is_absorbed() {
    let service = InsightService::builder()
        .adapter(adapter_with(MockBackend::new().failing("connection refused"), Duration::from_secs(15)))
        .build();

    let out = service.generate(mixed_resistance_context("s1")).await.unwrap();
    assert!(!out.is_empty());
    assert_eq!(
        service.cache().entry("s1").unwrap().unwrap().source_tag,
        SourceTag::HeuristicFallback
    );
}

#[tokio::test]
async fn test_database_backed_service() {
    let db = Arc::new(Database::in_memory().unwrap());
    let service = InsightService::builder().store(db.clone()).build();

    let out = service.generate(mixed_resistance_context("s1")).await.unwrap();
    let shown = service.mark_shown("s1", &out[0].id).await.unwrap();
    assert!(shown.shown);

    let cached = service.get_cached("s1").await.unwrap();
    assert_eq!(cached.len(), out.len());
    assert!(cached.iter().any(|c| c.id == out[0].id && c.shown));
}
