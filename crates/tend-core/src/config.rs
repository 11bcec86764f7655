//! Engine configuration
//!
//! Every empirically chosen constant (dedup threshold, TTL table, cooldown,
//! limits, timeouts) lives here rather than in the algorithms.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Start from embedded defaults (compiled into binary)
//! 2. Apply keys from the override file (~/.local/share/tend/config/insights.toml)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Category, Frequency};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/insights.toml");

/// Bounds for the external reasoning deadline
const MIN_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct LimitsConfig {
    pub max_insights: usize,
    pub max_insights_non_daily: usize,
    pub focus_quota_max: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_insights: 5,
            max_insights_non_daily: 10,
            focus_quota_max: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub cooldown: Duration,
    pub similarity_threshold: f64,
    pub dedup_window: chrono::Duration,
    pub recent_record_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            similarity_threshold: 0.8,
            dedup_window: chrono::Duration::hours(24),
            recent_record_limit: 50,
        }
    }
}

/// Per-category validity of generated insights
#[derive(Debug, Clone, PartialEq)]
pub struct TtlTable {
    pub warning: chrono::Duration,
    pub trigger: chrono::Duration,
    pub coping: chrono::Duration,
    pub motivation: chrono::Duration,
    pub progress: chrono::Duration,
    pub education: chrono::Duration,
    pub pattern: chrono::Duration,
    pub celebration: chrono::Duration,
}

impl TtlTable {
    pub fn for_category(&self, category: Category) -> chrono::Duration {
        match category {
            Category::Warning => self.warning,
            Category::Trigger => self.trigger,
            Category::Coping => self.coping,
            Category::Motivation => self.motivation,
            Category::Progress => self.progress,
            Category::Education => self.education,
            Category::Pattern => self.pattern,
            Category::Celebration => self.celebration,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut chrono::Duration {
        match category {
            Category::Warning => &mut self.warning,
            Category::Trigger => &mut self.trigger,
            Category::Coping => &mut self.coping,
            Category::Motivation => &mut self.motivation,
            Category::Progress => &mut self.progress,
            Category::Education => &mut self.education,
            Category::Pattern => &mut self.pattern,
            Category::Celebration => &mut self.celebration,
        }
    }
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            warning: chrono::Duration::hours(12),
            trigger: chrono::Duration::hours(48),
            coping: chrono::Duration::hours(24),
            motivation: chrono::Duration::hours(24),
            progress: chrono::Duration::hours(168),
            education: chrono::Duration::hours(168),
            pattern: chrono::Duration::hours(72),
            celebration: chrono::Duration::hours(72),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub ttl: chrono::Duration,
    pub schema_version: u32,
    pub hash_slice: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(12),
            schema_version: 3,
            hash_slice: 5,
            sweep_interval: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub enabled: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub generation: GenerationConfig,
    pub ttl: TtlTable,
    pub cache: CacheConfig,
    pub external: ExternalConfig,
    pub detector: DetectorConfig,
}

impl EngineConfig {
    /// Load embedded defaults plus the user override file, if present
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path().as_deref())
    }

    /// Load embedded defaults plus a specific override file
    pub fn load_from(override_path: Option<&Path>) -> Result<Self> {
        let mut config = parse_config(DEFAULT_CONFIG, Self::default())?;

        if let Some(path) = override_path {
            if path.exists() {
                let content = fs::read_to_string(path)
                    .map_err(|e| Error::InvalidData(format!("Failed to read config: {}", e)))?;
                config = parse_config(&content, config)?;
                tracing::debug!(path = %path.display(), "Applied config override");
            }
        }

        Ok(config)
    }

    /// Maximum delivered insights for a frequency preference
    pub fn max_insights(&self, frequency: Frequency) -> usize {
        match frequency {
            Frequency::Daily => self.limits.max_insights,
            Frequency::Weekly | Frequency::AsNeeded => self.limits.max_insights_non_daily,
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tend").join("config").join("insights.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    limits: Option<RawLimits>,
    generation: Option<RawGeneration>,
    ttl_hours: Option<std::collections::HashMap<String, i64>>,
    cache: Option<RawCache>,
    external: Option<RawExternal>,
    detector: Option<RawDetector>,
}

#[derive(Debug, Deserialize)]
struct RawLimits {
    max_insights: Option<usize>,
    max_insights_non_daily: Option<usize>,
    focus_quota_max: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawGeneration {
    cooldown_secs: Option<u64>,
    similarity_threshold: Option<f64>,
    dedup_window_hours: Option<i64>,
    recent_record_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawCache {
    ttl_hours: Option<i64>,
    schema_version: Option<u32>,
    hash_slice: Option<usize>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawExternal {
    enabled: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDetector {
    enabled: Option<bool>,
}

/// Parse TOML content and apply the keys it sets on top of `base`
fn parse_config(content: &str, base: EngineConfig) -> Result<EngineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::InvalidData(format!("Invalid config TOML: {}", e)))?;

    let mut config = base;

    if let Some(limits) = raw.limits {
        if let Some(max) = limits.max_insights {
            config.limits.max_insights = max.max(1);
        }
        if let Some(max) = limits.max_insights_non_daily {
            config.limits.max_insights_non_daily = max.max(1);
        }
        if let Some(quota) = limits.focus_quota_max {
            config.limits.focus_quota_max = quota.max(1);
        }
    }

    if let Some(generation) = raw.generation {
        if let Some(secs) = generation.cooldown_secs {
            config.generation.cooldown = Duration::from_secs(secs);
        }
        if let Some(threshold) = generation.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::InvalidData(format!(
                    "similarity_threshold must be within 0-1, got {}",
                    threshold
                )));
            }
            config.generation.similarity_threshold = threshold;
        }
        if let Some(hours) = generation.dedup_window_hours {
            config.generation.dedup_window = chrono::Duration::hours(hours);
        }
        if let Some(limit) = generation.recent_record_limit {
            config.generation.recent_record_limit = limit.max(1);
        }
    }

    if let Some(ttl_hours) = raw.ttl_hours {
        for (name, hours) in ttl_hours {
            let Ok(category) = name.parse::<Category>() else {
                continue; // Skip unknown categories
            };
            *config.ttl.slot_mut(category) = chrono::Duration::hours(hours);
        }
    }

    if let Some(cache) = raw.cache {
        if let Some(hours) = cache.ttl_hours {
            config.cache.ttl = chrono::Duration::hours(hours);
        }
        if let Some(version) = cache.schema_version {
            config.cache.schema_version = version;
        }
        if let Some(slice) = cache.hash_slice {
            config.cache.hash_slice = slice.max(1);
        }
        if let Some(secs) = cache.sweep_interval_secs {
            config.cache.sweep_interval = Duration::from_secs(secs.max(1));
        }
    }

    if let Some(external) = raw.external {
        if let Some(enabled) = external.enabled {
            config.external.enabled = enabled;
        }
        if let Some(secs) = external.timeout_secs {
            config.external.timeout =
                Duration::from_secs(secs).clamp(MIN_EXTERNAL_TIMEOUT, MAX_EXTERNAL_TIMEOUT);
        }
    }

    if let Some(detector) = raw.detector {
        if let Some(enabled) = detector.enabled {
            config.detector.enabled = enabled;
        }
    }

    Ok(config)
}
