//! Generation orchestrator
//!
//! `InsightService` is the entry point collaborators call. One `generate`
//! cycle:
//!
//! 1. Validate the context (the only error that propagates)
//! 2. Cooldown: a subject regenerated less than `cooldown` ago gets its
//!    cached result (or the data-insufficient notice) back
//! 3. Single-flight: concurrent calls for one subject share one pipeline run
//! 4. Pipeline: sufficiency guard, cache lookup by content hash, distortion
//!    assessment, template pass, optional external reasoning, merge,
//!    validity gate, ordering, batch dedup, focus quota, cache write
//!
//! The pipeline runs in a spawned task so a caller that goes away does not
//! cancel work other callers are waiting on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ai::{AIClient, ReasoningAdapter};
use crate::cache::{content_hash, spawn_sweeper, InsightCache, InsightStore, MemoryStore, SourceTag};
use crate::config::EngineConfig;
use crate::distortion::{DetectionContext, DistortionAssessment, DistortionDetector};
use crate::error::{Error, Result};
use crate::insights::{apply_quota, dedup_batch, merge_sources, sort_candidates, TemplateEngine, TemplateInput, ValidityGate};
use crate::models::{
    system_clock, Category, Clock, Feedback, GenerationContext, InsightCandidate, Priority, Provenance, ShownInsight,
};
use crate::telemetry::{Source, TelemetryEvent, TelemetrySink, TracingSink};

type SharedResult = Option<Arc<Vec<InsightCandidate>>>;

/// Transient per-subject state. Removed by `end_session`.
#[derive(Debug)]
struct SubjectState {
    /// Process-unique, so a late pipeline cannot write into a later session
    session: u64,
    last_generated: Option<DateTime<Utc>>,
    /// Insights marked shown during this session
    shown: Vec<ShownInsight>,
}

impl SubjectState {
    fn new(session: u64) -> Self {
        Self {
            session,
            last_generated: None,
            shown: Vec::new(),
        }
    }
}

/// A pending generation other callers for the subject can join
struct Flight {
    id: u64,
    rx: watch::Receiver<SharedResult>,
}

struct Inner {
    engine: TemplateEngine,
    detector: DistortionDetector,
    adapter: ReasoningAdapter,
    cache: Arc<InsightCache>,
    telemetry: Arc<dyn TelemetrySink>,
    config: EngineConfig,
    clock: Clock,
    in_flight: Mutex<HashMap<String, Flight>>,
    subjects: Mutex<HashMap<String, SubjectState>>,
    next_id: AtomicU64,
}

/// Handle to the insight generation service. Cheap to clone.
#[derive(Clone)]
pub struct InsightService {
    inner: Arc<Inner>,
}

/// Removes the single-flight entry on every exit path of the leader task.
/// An entry that was detached and replaced by a newer flight is left alone.
struct InFlightGuard {
    inner: Arc<Inner>,
    subject_id: String,
    flight: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.get(&self.subject_id).is_some_and(|f| f.id == self.flight) {
            in_flight.remove(&self.subject_id);
        }
    }
}

#[derive(Default)]
pub struct InsightServiceBuilder {
    engine: Option<TemplateEngine>,
    detector: Option<DistortionDetector>,
    adapter: Option<ReasoningAdapter>,
    client: Option<AIClient>,
    cache: Option<Arc<InsightCache>>,
    store: Option<Arc<dyn InsightStore>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    config: Option<EngineConfig>,
    clock: Option<Clock>,
}

impl InsightServiceBuilder {
    pub fn engine(mut self, engine: TemplateEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn detector(mut self, detector: DistortionDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn adapter(mut self, adapter: ReasoningAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Reasoning client wrapped with the configured enable flag and timeout.
    /// Ignored when `adapter` is also set.
    pub fn client(mut self, client: AIClient) -> Self {
        self.client = Some(client);
        self
    }

    /// A fully built cache. Takes precedence over `store`.
    pub fn cache(mut self, cache: Arc<InsightCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Backing store for a cache built with the service's telemetry and clock
    pub fn store(mut self, store: Arc<dyn InsightStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> InsightService {
        let config = self.config.unwrap_or_default();
        let telemetry: Arc<dyn TelemetrySink> = self.telemetry.unwrap_or_else(|| Arc::new(TracingSink));
        let clock = self.clock.unwrap_or_else(system_clock);

        let adapter = match (self.adapter, self.client) {
            (Some(adapter), _) => adapter,
            (None, Some(client)) => ReasoningAdapter::new(Some(client), &config.external),
            (None, None) => ReasoningAdapter::disabled(),
        };

        let cache = self.cache.unwrap_or_else(|| {
            let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
            Arc::new(
                InsightCache::new(store, &config.cache)
                    .with_telemetry(telemetry.clone())
                    .with_clock(clock.clone()),
            )
        });

        InsightService {
            inner: Arc::new(Inner {
                engine: self.engine.unwrap_or_default(),
                detector: self
                    .detector
                    .unwrap_or_else(|| DistortionDetector::with_enabled(config.detector.enabled)),
                adapter,
                cache,
                telemetry,
                config,
                clock,
                in_flight: Mutex::new(HashMap::new()),
                subjects: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl InsightService {
    pub fn builder() -> InsightServiceBuilder {
        InsightServiceBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<InsightCache> {
        &self.inner.cache
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.inner.engine
    }

    pub fn detector(&self) -> &DistortionDetector {
        &self.inner.detector
    }

    pub fn adapter(&self) -> &ReasoningAdapter {
        &self.inner.adapter
    }

    /// Whether a generation for `subject_id` is running right now
    pub fn is_generating(&self, subject_id: &str) -> bool {
        self.inner.in_flight.lock().contains_key(subject_id)
    }

    /// Start the periodic cache sweep at the configured interval
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        spawn_sweeper(self.inner.cache.clone(), self.inner.config.cache.sweep_interval)
    }

    /// Generate the ordered, capped insight list for one subject.
    ///
    /// Only `InvalidContext` is returned as an error; unavailable backends,
    /// failing templates, corrupt cache entries and missing data all end in
    /// a (possibly degraded) list.
    pub async fn generate(&self, ctx: GenerationContext) -> Result<Vec<InsightCandidate>> {
        ctx.validate()?;
        let subject_id = ctx.subject_id.clone();

        if self.inner.in_cooldown(&subject_id) {
            return Ok(self.inner.cooldown_result(&subject_id));
        }

        let mut rx = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&subject_id) {
                Some(flight) => {
                    debug!(subject = %subject_id, flight = flight.id, "Joining in-flight generation");
                    flight.rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    let id = self.inner.next_id();
                    in_flight.insert(subject_id.clone(), Flight { id, rx: rx.clone() });

                    let guard = InFlightGuard {
                        inner: self.inner.clone(),
                        subject_id: subject_id.clone(),
                        flight: id,
                    };
                    let session = self.inner.session(&subject_id);
                    let inner = self.inner.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        let result = inner.run_pipeline(ctx, session).await;
                        let _ = tx.send(Some(Arc::new(result)));
                    });
                    rx
                }
            }
        };

        let shared = match rx.wait_for(|value| value.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };

        match shared {
            Some(result) => Ok(result.as_ref().clone()),
            None => {
                warn!(subject = %subject_id, "Generation ended without a result, serving cache");
                Ok(self.inner.cooldown_result(&subject_id))
            }
        }
    }

    /// Valid cached insights, regardless of snapshot. Empty when none.
    pub async fn get_cached(&self, subject_id: &str) -> Result<Vec<InsightCandidate>> {
        require_subject(subject_id)?;
        match self.inner.cache.get_cached(subject_id) {
            Ok(candidates) => Ok(candidates),
            Err(e) => {
                warn!(subject = %subject_id, error = %e, "Cache read failed");
                Ok(Vec::new())
            }
        }
    }

    /// Mark a cached insight as shown; it then counts for the dedup window
    pub async fn mark_shown(&self, subject_id: &str, candidate_id: &str) -> Result<InsightCandidate> {
        require_subject(subject_id)?;
        let candidate = self.inner.cache.mark_shown(subject_id, candidate_id)?;
        self.inner.with_state(subject_id, |state| state.shown.push(ShownInsight::from(&candidate)));
        Ok(candidate)
    }

    pub async fn record_feedback(
        &self,
        subject_id: &str,
        candidate_id: &str,
        feedback: Feedback,
    ) -> Result<InsightCandidate> {
        require_subject(subject_id)?;
        let candidate = self.inner.cache.record_feedback(subject_id, candidate_id, feedback)?;
        info!(subject = %subject_id, insight = %candidate_id, feedback = %feedback, "Recorded insight feedback");
        Ok(candidate)
    }

    /// Drop the subject's cached insights and cooldown, e.g. after a new record
    pub async fn invalidate(&self, subject_id: &str) -> Result<bool> {
        require_subject(subject_id)?;
        if let Some(state) = self.inner.subjects.lock().get_mut(subject_id) {
            state.last_generated = None;
        }
        self.inner.cache.invalidate(subject_id)
    }

    /// Forget transient state for the subject. A generation already in
    /// flight still completes and caches its result for the callers waiting
    /// on it, but later callers start their own.
    pub fn end_session(&self, subject_id: &str) {
        self.inner.subjects.lock().remove(subject_id);
        if let Some(flight) = self.inner.in_flight.lock().remove(subject_id) {
            debug!(subject = %subject_id, flight = flight.id, "Detached in-flight generation");
        }
        self.inner.cache.release(subject_id);
        debug!(subject = %subject_id, "Session ended");
    }
}

fn require_subject(subject_id: &str) -> Result<()> {
    if subject_id.trim().is_empty() {
        return Err(Error::InvalidContext("subject id is empty".into()));
    }
    Ok(())
}

impl Inner {
    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn in_cooldown(&self, subject_id: &str) -> bool {
        let Some(last) = self
            .subjects
            .lock()
            .get(subject_id)
            .and_then(|s| s.last_generated)
        else {
            return false;
        };
        let cooldown = chrono::Duration::from_std(self.config.generation.cooldown).unwrap_or_else(|_| chrono::Duration::zero());
        self.now() - last < cooldown
    }

    /// What a rate-limited call gets: the cached result, else the
    /// data-insufficient notice
    fn cooldown_result(&self, subject_id: &str) -> Vec<InsightCandidate> {
        self.telemetry.emit(TelemetryEvent::GenerationRateLimited {
            subject_id: subject_id.to_string(),
        });
        debug!(subject = %subject_id, "Generation rate limited");

        let cached = self.cache.get_cached(subject_id).unwrap_or_else(|e| {
            warn!(subject = %subject_id, error = %e, "Cache read failed");
            Vec::new()
        });
        if cached.is_empty() {
            vec![data_insufficient_notice(self.now())]
        } else {
            cached
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Run `f` on the subject's state, opening a session if there is none
    fn with_state<T>(&self, subject_id: &str, f: impl FnOnce(&mut SubjectState) -> T) -> T {
        let mut subjects = self.subjects.lock();
        let state = subjects
            .entry(subject_id.to_string())
            .or_insert_with(|| SubjectState::new(self.next_id()));
        f(state)
    }

    fn session(&self, subject_id: &str) -> u64 {
        self.with_state(subject_id, |state| state.session)
    }

    /// Insights shown in `session`; empty once that session has ended
    fn session_shown(&self, subject_id: &str, session: u64) -> Vec<ShownInsight> {
        self.subjects
            .lock()
            .get(subject_id)
            .filter(|s| s.session == session)
            .map(|s| s.shown.clone())
            .unwrap_or_default()
    }

    /// Record a completed generation unless the session ended meanwhile
    fn mark_generated(&self, subject_id: &str, session: u64, at: DateTime<Utc>) {
        if let Some(state) = self.subjects.lock().get_mut(subject_id) {
            if state.session == session {
                state.last_generated = Some(at);
            }
        }
    }

    async fn run_pipeline(&self, mut ctx: GenerationContext, session: u64) -> Vec<InsightCandidate> {
        let started = tokio::time::Instant::now();
        let now = self.now();
        let subject_id = ctx.subject_id.clone();

        self.telemetry.emit(TelemetryEvent::GenerationStarted {
            subject_id: subject_id.clone(),
        });

        ctx.normalize(self.config.generation.recent_record_limit);

        if !ctx.has_profile || !ctx.has_records() {
            debug!(subject = %subject_id, "Not enough data to generate insights");
            self.telemetry.emit(TelemetryEvent::GenerationDataInsufficient {
                subject_id: subject_id.clone(),
            });
            return vec![data_insufficient_notice(now)];
        }

        let hash = content_hash(&ctx.records, self.config.cache.hash_slice);
        match self.cache.get(&subject_id, &hash) {
            Ok(Some(cached)) => {
                self.telemetry.emit(TelemetryEvent::SourceCompleted {
                    subject_id: subject_id.clone(),
                    source: Source::Cache,
                    count: cached.len(),
                });
                self.complete(&subject_id, &cached, started);
                return cached;
            }
            Ok(None) => {}
            Err(e) => warn!(subject = %subject_id, error = %e, "Cache lookup failed, regenerating"),
        }

        let assessments = self.assess_messages(&ctx, now);

        let rule_candidates = {
            let input = TemplateInput::new(&ctx, &assessments, &self.config.ttl, now);
            self.engine.run(&input, self.telemetry.as_ref())
        };
        self.telemetry.emit(TelemetryEvent::SourceCompleted {
            subject_id: subject_id.clone(),
            source: Source::RuleEngine,
            count: rule_candidates.len(),
        });

        // External reasoning adds at most one candidate per cycle
        let (external, external_ok, external_failed) =
            match self.adapter.suggest(&ctx, 1, &self.config.ttl, now).await {
                Ok(candidates) => {
                    self.telemetry.emit(TelemetryEvent::SourceCompleted {
                        subject_id: subject_id.clone(),
                        source: Source::ExternalReasoning,
                        count: candidates.len(),
                    });
                    (candidates, true, false)
                }
                Err(Error::FeatureDisabled(_)) => {
                    debug!(subject = %subject_id, "External reasoning disabled");
                    (Vec::new(), false, false)
                }
                Err(e) => {
                    warn!(subject = %subject_id, error = %e, "External reasoning failed, using rules only");
                    self.telemetry.emit(TelemetryEvent::ExternalReasoningFailed {
                        subject_id: subject_id.clone(),
                        reason: e.to_string(),
                        timed_out: e.is_timeout(),
                    });
                    (Vec::new(), false, true)
                }
            };

        let merged = merge_sources(rule_candidates, external);

        if merged.is_empty() && !external_ok {
            let notice = vec![offline_notice(now)];
            self.mark_generated(&subject_id, session, now);
            self.complete(&subject_id, &notice, started);
            return notice;
        }

        let mut shown = ctx.history.clone();
        shown.extend(self.session_shown(&subject_id, session));
        let gate = ValidityGate::new(
            &shown,
            &ctx.preferences.avoid_topics,
            self.config.generation.similarity_threshold,
            self.config.generation.dedup_window,
            now,
        );
        let mut candidates = gate.filter(merged);

        sort_candidates(&mut candidates, &ctx.preferences);
        let candidates = dedup_batch(candidates, self.config.generation.similarity_threshold);
        let candidates = apply_quota(
            candidates,
            &ctx.preferences,
            self.config.max_insights(ctx.preferences.frequency),
            self.config.limits.focus_quota_max,
        );

        let source_tag = if external_failed {
            SourceTag::HeuristicFallback
        } else {
            SourceTag::FullAnalysis
        };
        if let Err(e) = self
            .cache
            .put(&subject_id, candidates.clone(), &hash, self.config.cache.ttl, source_tag)
        {
            warn!(subject = %subject_id, error = %e, "Failed to cache insights");
        }

        self.mark_generated(&subject_id, session, now);
        self.complete(&subject_id, &candidates, started);
        candidates
    }

    /// Per-message distortion assessment; empty when the detector is off
    fn assess_messages(&self, ctx: &GenerationContext, now: DateTime<Utc>) -> Vec<DistortionAssessment> {
        let detection = DetectionContext {
            now,
            intervention_ttl: self.config.ttl.for_category(Category::Coping),
        };
        let mut assessments = Vec::with_capacity(ctx.messages.len());
        for message in &ctx.messages {
            match self.detector.assess(message, &detection) {
                Ok(assessment) => assessments.push(assessment),
                Err(Error::FeatureDisabled(_)) => {
                    debug!(subject = %ctx.subject_id, "Distortion detector disabled, skipping");
                    return Vec::new();
                }
                Err(e) => warn!(subject = %ctx.subject_id, error = %e, "Distortion assessment failed"),
            }
        }
        assessments
    }

    fn complete(&self, subject_id: &str, candidates: &[InsightCandidate], started: tokio::time::Instant) {
        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            subject = %subject_id,
            count = candidates.len(),
            latency_ms,
            "Insight generation complete"
        );
        self.telemetry.emit(TelemetryEvent::GenerationCompleted {
            subject_id: subject_id.to_string(),
            count: candidates.len(),
            categories: candidates.iter().map(|c| c.category).collect(),
            priorities: candidates.iter().map(|c| c.priority).collect(),
            latency_ms,
            used_external: candidates
                .iter()
                .any(|c| c.provenance == Provenance::ExternalReasoning),
        });
    }
}

/// "Add a record" notice for subjects without a profile or records
pub fn data_insufficient_notice(now: DateTime<Utc>) -> InsightCandidate {
    InsightCandidate::new(
        Category::Education,
        Priority::Low,
        "Add a record to get insights",
        "Log a few urges, including how strong they were and how much you resisted, and personal insights will start to appear here.",
        Provenance::FallbackNotice,
        now,
    )
    .with_advice(["Log your next urge when it happens"])
    .with_source("data_insufficient")
    .with_confidence(1.0)
}

/// Notice for when nothing could be produced and reasoning was unreachable
pub fn offline_notice(now: DateTime<Utc>) -> InsightCandidate {
    InsightCandidate::new(
        Category::Education,
        Priority::Low,
        "Insights are limited right now",
        "There is not enough to go on yet and deeper analysis is unavailable. Keep logging and check back later.",
        Provenance::FallbackNotice,
        now,
    )
    .with_source("offline")
    .with_confidence(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BehaviorRecord, TimeWindow};
    use crate::telemetry::MemorySink;
    use chrono::Duration;

    fn context(subject: &str, records: usize) -> GenerationContext {
        let now = Utc::now();
        let records = (0..records)
            .map(|i| {
                BehaviorRecord::new(
                    format!("r{}", i),
                    "smoking",
                    6.0,
                    8.0,
                    now - Duration::hours(records as i64 - i as i64),
                )
            })
            .collect();
        GenerationContext::new(subject, TimeWindow::last_days(now, 7))
            .with_profile()
            .with_records(records)
    }

    #[tokio::test]
    async fn test_invalid_context_propagates() {
        let service = InsightService::builder().build();
        let ctx = GenerationContext::new("  ", TimeWindow::last_days(Utc::now(), 7));
        assert!(matches!(service.generate(ctx).await, Err(Error::InvalidContext(_))));
        assert!(matches!(service.get_cached("").await, Err(Error::InvalidContext(_))));
    }

    #[tokio::test]
    async fn test_no_profile_short_circuits() {
        let sink = Arc::new(MemorySink::new());
        let service = InsightService::builder().telemetry(sink.clone()).build();
        let mut ctx = context("s1", 5);
        ctx.has_profile = false;

        let out = service.generate(ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "data_insufficient");
        assert_eq!(sink.count("generation_data_insufficient"), 1);
        assert_eq!(sink.count("source_completed"), 0);
    }

    #[tokio::test]
    async fn test_generation_caches_and_clears_in_flight() {
        let service = InsightService::builder().build();
        let out = service.generate(context("s1", 10)).await.unwrap();
        assert!(!out.is_empty());
        assert!(!service.is_generating("s1"));

        let cached = service.get_cached("s1").await.unwrap();
        assert_eq!(cached, out);
        let entry = service.cache().entry("s1").unwrap().unwrap();
        assert_eq!(entry.source_tag, SourceTag::FullAnalysis);
    }

    #[tokio::test]
    async fn test_offline_notice_when_nothing_produced() {
        let service = InsightService::builder()
            .engine(TemplateEngine::with_templates(Vec::new()))
            .build();
        let out = service.generate(context("s1", 2)).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].provenance, Provenance::FallbackNotice);
        assert_eq!(out[0].priority, Priority::Low);
        assert_eq!(out[0].source, "offline");
        assert!(service.cache().entry("s1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_shown_feeds_dedup_gate() {
        let service = InsightService::builder().build();
        let first = service.generate(context("s1", 10)).await.unwrap();
        let shown = first[0].clone();
        service.mark_shown("s1", &shown.id).await.unwrap();

        // New snapshot, no cooldown: the shown insight must not come back
        service.invalidate("s1").await.unwrap();
        let second = service.generate(context("s1", 11)).await.unwrap();
        assert!(second
            .iter()
            .all(|c| !(c.category == shown.category && c.message == shown.message)));
    }

    #[tokio::test]
    async fn test_end_session_clears_cooldown_and_history() {
        let sink = Arc::new(MemorySink::new());
        let service = InsightService::builder().telemetry(sink.clone()).build();
        let first = service.generate(context("s1", 10)).await.unwrap();
        service.mark_shown("s1", &first[0].id).await.unwrap();

        service.end_session("s1");
        assert!(service.inner.subjects.lock().get("s1").is_none());

        service.generate(context("s1", 10)).await.unwrap();
        assert_eq!(sink.count("generation_rate_limited"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_session_detaches_in_flight_generation() {
        use crate::ai::MockBackend;
        use crate::config::ExternalConfig;

        let adapter = ReasoningAdapter::new(
            Some(AIClient::Mock(MockBackend::new().with_delay(std::time::Duration::from_secs(5)))),
            &ExternalConfig {
                enabled: true,
                timeout: std::time::Duration::from_secs(15),
            },
        );
        let service = InsightService::builder().adapter(adapter).build();

        // Old session: every urge resisted
        let old_service = service.clone();
        let old = tokio::spawn(async move { old_service.generate(context("s1", 10)).await });
        while !service.is_generating("s1") {
            tokio::task::yield_now().await;
        }

        service.end_session("s1");
        assert!(!service.is_generating("s1"));

        // New session, same id: strong urges, barely resisted
        let now = Utc::now();
        let records = (0..6)
            .map(|i| BehaviorRecord::new(format!("n{}", i), "smoking", 9.0, 1.0, now - Duration::hours(6 - i)))
            .collect();
        let fresh = GenerationContext::new("s1", TimeWindow::last_days(now, 7))
            .with_profile()
            .with_records(records);
        let new_out = service.generate(fresh).await.unwrap();

        let old_out = old.await.unwrap().unwrap();
        assert!(!old_out.is_empty(), "old waiters still get their result");
        assert_ne!(new_out, old_out);
        assert!(new_out.iter().all(|c| c.source != "resistance_progress"));
        assert!(!service.is_generating("s1"));
    }

    #[tokio::test]
    async fn test_end_session_releases_subject_state() {
        let service = InsightService::builder().build();
        let out = service.generate(context("s1", 10)).await.unwrap();
        service.mark_shown("s1", &out[0].id).await.unwrap();
        assert!(service.inner.subjects.lock().contains_key("s1"));

        service.end_session("s1");
        assert!(service.inner.subjects.lock().is_empty());
        assert!(service.inner.in_flight.lock().is_empty());

        // Ending a session for an unknown subject leaves nothing behind
        service.end_session("never-seen");
        assert!(service.inner.subjects.lock().is_empty());
    }

    #[tokio::test]
    async fn test_late_pipeline_does_not_set_new_session_cooldown() {
        let service = InsightService::builder().build();
        let stale = service.inner.session("s1");
        service.end_session("s1");

        service.inner.mark_generated("s1", stale, Utc::now());
        assert!(!service.inner.in_cooldown("s1"));
        assert!(service.inner.subjects.lock().is_empty());
    }
}
