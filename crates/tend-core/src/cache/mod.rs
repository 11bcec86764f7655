//! Persistent insight cache
//!
//! One entry per subject, replaced wholesale on every successful
//! generation. An entry is served only while it is unexpired, written under
//! the current schema version and (for `get`) built from a snapshot with the
//! same content hash. Anything else is a miss, and the stale entry is purged
//! on the spot.
//!
//! Storage goes through `InsightStore`; `MemoryStore` backs tests and the
//! SQLite `Database` backs the CLI.

mod hash;
mod sweeper;

pub use hash::content_hash;
pub use sweeper::spawn_sweeper;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::models::{system_clock, Clock, Feedback, InsightCandidate};
use crate::telemetry::{TelemetryEvent, TelemetrySink, TracingSink};

/// How the cached result set was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Rule engine plus a successful (or intentionally skipped) external pass
    FullAnalysis,
    /// External reasoning failed; rules only
    HeuristicFallback,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::FullAnalysis => "full_analysis",
            SourceTag::HeuristicFallback => "heuristic_fallback",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full_analysis" => Ok(SourceTag::FullAnalysis),
            "heuristic_fallback" => Ok(SourceTag::HeuristicFallback),
            _ => Err(format!("Unknown cache source tag: {}", s)),
        }
    }
}

/// A subject's cached result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub subject_id: String,
    pub candidates: Vec<InsightCandidate>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub content_hash: String,
    pub schema_version: u32,
    pub source_tag: SourceTag,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Why this entry cannot be served, if it cannot. `hash` is `None` when
    /// the caller has no snapshot to compare against.
    pub fn staleness(&self, now: DateTime<Utc>, schema_version: u32, hash: Option<&str>) -> Option<&'static str> {
        if self.schema_version != schema_version {
            return Some("schema_mismatch");
        }
        if self.is_expired(now) {
            return Some("expired");
        }
        match hash {
            Some(h) if h != self.content_hash => Some("hash_mismatch"),
            _ => None,
        }
    }
}

/// Key-value persistence for cache entries, one entry per subject
pub trait InsightStore: Send + Sync {
    /// Raw serialized entry, if any
    fn load(&self, subject_id: &str) -> Result<Option<String>>;

    /// Overwrite the subject's entry
    fn save(&self, entry: &CacheEntry) -> Result<()>;

    /// Returns whether an entry existed
    fn remove(&self, subject_id: &str) -> Result<bool>;

    fn subjects(&self) -> Result<Vec<String>>;
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary payload, bypassing serialization
    pub fn insert_raw(&self, subject_id: &str, payload: impl Into<String>) {
        self.entries.lock().insert(subject_id.to_string(), payload.into());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl InsightStore for MemoryStore {
    fn load(&self, subject_id: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(subject_id).cloned())
    }

    fn save(&self, entry: &CacheEntry) -> Result<()> {
        let payload = serde_json::to_string(entry)?;
        self.entries.lock().insert(entry.subject_id.clone(), payload);
        Ok(())
    }

    fn remove(&self, subject_id: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(subject_id).is_some())
    }

    fn subjects(&self) -> Result<Vec<String>> {
        let mut subjects: Vec<String> = self.entries.lock().keys().cloned().collect();
        subjects.sort();
        Ok(subjects)
    }
}

/// Hit/miss/purge counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub purges: u64,
}

/// Result of one sweep over all subjects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub purged: usize,
    pub failed: usize,
}

pub struct InsightCache {
    store: Arc<dyn InsightStore>,
    telemetry: Arc<dyn TelemetrySink>,
    schema_version: u32,
    clock: Clock,
    /// Serializes read-modify-write against overwrite, per subject
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    purges: AtomicU64,
}

impl InsightCache {
    pub fn new(store: Arc<dyn InsightStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            telemetry: Arc::new(TracingSink),
            schema_version: config.schema_version,
            clock: system_clock(),
            locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            purges: AtomicU64::new(0),
        }
    }

    /// Memory-backed cache with default settings
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), &CacheConfig::default())
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
        }
    }

    fn subject_lock(&self, subject_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(subject_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load and parse; an unreadable payload is purged and reported as corruption
    fn read_entry(&self, subject_id: &str) -> Result<Option<CacheEntry>> {
        let Some(payload) = self.store.load(subject_id)? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&payload) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                self.purge(subject_id, "corrupt")?;
                Err(Error::CacheCorruption(format!("{}: {}", subject_id, e)))
            }
        }
    }

    fn purge(&self, subject_id: &str, reason: &str) -> Result<()> {
        if self.store.remove(subject_id)? {
            self.purges.fetch_add(1, Ordering::Relaxed);
            debug!(subject = %subject_id, reason, "Purged cache entry");
            self.telemetry.emit(TelemetryEvent::CachePurged {
                subject_id: subject_id.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    fn miss(&self, subject_id: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.telemetry.emit(TelemetryEvent::CacheMiss {
            subject_id: subject_id.to_string(),
        });
    }

    fn hit(&self, subject_id: &str, entry: &CacheEntry) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.telemetry.emit(TelemetryEvent::CacheHit {
            subject_id: subject_id.to_string(),
            source: entry.source_tag.as_str().to_string(),
        });
    }

    /// Shared lookup. `hash: None` skips the content check.
    fn lookup(&self, subject_id: &str, hash: Option<&str>) -> Result<Option<Vec<InsightCandidate>>> {
        let lock = self.subject_lock(subject_id);
        let _guard = lock.lock();

        let entry = match self.read_entry(subject_id) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.miss(subject_id);
                return Ok(None);
            }
            Err(Error::CacheCorruption(reason)) => {
                warn!(subject = %subject_id, reason = %reason, "Cache entry corrupt, treating as miss");
                self.miss(subject_id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let now = (self.clock)();
        if let Some(reason) = entry.staleness(now, self.schema_version, hash) {
            self.purge(subject_id, reason)?;
            self.miss(subject_id);
            return Ok(None);
        }

        self.hit(subject_id, &entry);
        Ok(Some(entry.candidates))
    }

    /// Candidates for `subject_id` if the entry is valid for `content_hash`.
    /// Any invalid entry is purged.
    pub fn get(&self, subject_id: &str, content_hash: &str) -> Result<Option<Vec<InsightCandidate>>> {
        self.lookup(subject_id, Some(content_hash))
    }

    /// Best valid result regardless of snapshot; empty when there is none
    pub fn get_cached(&self, subject_id: &str) -> Result<Vec<InsightCandidate>> {
        Ok(self.lookup(subject_id, None)?.unwrap_or_default())
    }

    /// Raw entry without validity checks or counters
    pub fn entry(&self, subject_id: &str) -> Result<Option<CacheEntry>> {
        self.read_entry(subject_id)
    }

    /// Overwrite the subject's entry
    pub fn put(
        &self,
        subject_id: &str,
        candidates: Vec<InsightCandidate>,
        content_hash: &str,
        ttl: Duration,
        source_tag: SourceTag,
    ) -> Result<()> {
        let now = (self.clock)();
        let entry = CacheEntry {
            subject_id: subject_id.to_string(),
            candidates,
            created_at: now,
            expires_at: now + ttl,
            content_hash: content_hash.to_string(),
            schema_version: self.schema_version,
            source_tag,
        };

        let lock = self.subject_lock(subject_id);
        let _guard = lock.lock();
        self.store.save(&entry)?;
        debug!(subject = %subject_id, count = entry.candidates.len(), source = %source_tag, "Cached insights");
        Ok(())
    }

    /// Drop the subject's lock slot unless an update is holding it
    pub fn release(&self, subject_id: &str) {
        let mut locks = self.locks.lock();
        if locks.get(subject_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(subject_id);
        }
    }

    /// Unconditionally discard the subject's entry
    pub fn invalidate(&self, subject_id: &str) -> Result<bool> {
        let lock = self.subject_lock(subject_id);
        let _guard = lock.lock();
        let existed = self.store.remove(subject_id)?;
        if existed {
            self.purges.fetch_add(1, Ordering::Relaxed);
            self.telemetry.emit(TelemetryEvent::CachePurged {
                subject_id: subject_id.to_string(),
                reason: "invalidated".to_string(),
            });
        }
        Ok(existed)
    }

    /// Apply `update` to one cached candidate under the subject lock
    fn modify_candidate<F>(&self, subject_id: &str, candidate_id: &str, update: F) -> Result<InsightCandidate>
    where
        F: FnOnce(&mut InsightCandidate, DateTime<Utc>),
    {
        let lock = self.subject_lock(subject_id);
        let _guard = lock.lock();

        let mut entry = self
            .read_entry(subject_id)?
            .ok_or_else(|| Error::NotFound(format!("No cached insights for subject {}", subject_id)))?;

        let now = (self.clock)();
        let candidate = entry
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .ok_or_else(|| Error::NotFound(format!("Insight {} for subject {}", candidate_id, subject_id)))?;
        update(candidate, now);
        let updated = candidate.clone();

        self.store.save(&entry)?;
        Ok(updated)
    }

    /// Flag a cached candidate as shown. Returns the updated candidate.
    pub fn mark_shown(&self, subject_id: &str, candidate_id: &str) -> Result<InsightCandidate> {
        self.modify_candidate(subject_id, candidate_id, |candidate, now| {
            if !candidate.shown {
                candidate.shown = true;
                candidate.shown_at = Some(now);
            }
        })
    }

    pub fn record_feedback(
        &self,
        subject_id: &str,
        candidate_id: &str,
        feedback: Feedback,
    ) -> Result<InsightCandidate> {
        self.modify_candidate(subject_id, candidate_id, |candidate, _| {
            candidate.feedback = Some(feedback);
        })
    }

    /// Purge expired, schema-stale and corrupt entries across all subjects.
    /// Per-subject failures are counted and skipped.
    pub fn sweep(&self) -> Result<SweepReport> {
        let subjects = self.store.subjects()?;
        let now = (self.clock)();
        let mut report = SweepReport {
            scanned: subjects.len(),
            ..Default::default()
        };

        for subject_id in subjects {
            let lock = self.subject_lock(&subject_id);
            let _guard = lock.lock();

            match self.read_entry(&subject_id) {
                Ok(Some(entry)) => {
                    if let Some(reason) = entry.staleness(now, self.schema_version, None) {
                        match self.purge(&subject_id, reason) {
                            Ok(()) => report.purged += 1,
                            Err(e) => {
                                warn!(subject = %subject_id, error = %e, "Sweep failed to purge entry");
                                report.failed += 1;
                            }
                        }
                    }
                }
                Ok(None) => {}
                // read_entry already purged it
                Err(Error::CacheCorruption(_)) => report.purged += 1,
                Err(e) => {
                    warn!(subject = %subject_id, error = %e, "Sweep failed to read entry");
                    report.failed += 1;
                }
            }
        }

        // Drop lock slots nobody holds
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);

        self.telemetry.emit(TelemetryEvent::CacheSwept {
            purged: report.purged,
        });
        Ok(report)
    }
}
