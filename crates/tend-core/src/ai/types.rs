//! Reasoning backend request and response types
//!
//! These types are backend-agnostic. A `ReasoningRequest` is an anonymised
//! summary: it never carries the subject id or record ids.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::Timelike;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{BehaviorRecord, Category, GenerationContext, Style};

/// Messages longer than this are cut before leaving the process
const MAX_EXCERPT_CHARS: usize = 280;
/// Only the most recent messages are sent
const MAX_EXCERPTS: usize = 3;

/// Anonymised behavioral summary sent to a reasoning backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningRequest {
    pub record_count: usize,
    pub avg_intensity: f64,
    pub avg_resistance: f64,
    /// Share of records where resistance matched the urge, 0-1
    pub resisted_share: f64,
    pub top_category: Option<String>,
    /// Hour of day (UTC) with the most records
    pub peak_hour: Option<u32>,
    pub excerpts: Vec<String>,
    pub focus_areas: Vec<Category>,
    pub avoid_topics: Vec<String>,
    pub style: Style,
    pub max_insights: usize,
}

impl ReasoningRequest {
    /// Summarise a generation context
    pub fn from_context(ctx: &GenerationContext, max_insights: usize) -> Self {
        let count = ctx.records.len();

        let resisted = ctx.records.iter().filter(|r| r.resisted()).count();

        let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
        let mut hours: BTreeMap<u32, usize> = BTreeMap::new();
        for record in &ctx.records {
            *categories.entry(record.category.as_str()).or_default() += 1;
            *hours.entry(record.timestamp.hour()).or_default() += 1;
        }

        let excerpts = ctx
            .messages
            .iter()
            .rev()
            .take(MAX_EXCERPTS)
            .rev()
            .map(|m| scrub(m))
            .filter(|m| !m.is_empty())
            .collect();

        Self {
            record_count: count,
            avg_intensity: round2(mean_of(&ctx.records, |r| r.intensity)),
            avg_resistance: round2(mean_of(&ctx.records, |r| r.resistance)),
            resisted_share: if count == 0 {
                0.0
            } else {
                round2(resisted as f64 / count as f64)
            },
            top_category: most_frequent(&categories).map(|c| c.to_string()),
            peak_hour: most_frequent(&hours),
            excerpts,
            focus_areas: ctx.preferences.focus_areas.iter().copied().collect(),
            avoid_topics: ctx.preferences.avoid_topics.clone(),
            style: ctx.preferences.style,
            max_insights,
        }
    }

    /// Variables for the `suggest_insight` prompt
    pub fn prompt_vars(&self) -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        vars.insert("max_insights", self.max_insights.to_string());
        vars.insert("style", self.style.as_str().to_string());
        vars.insert("record_count", self.record_count.to_string());
        vars.insert("avg_intensity", format!("{:.1}", self.avg_intensity));
        vars.insert("avg_resistance", format!("{:.1}", self.avg_resistance));
        vars.insert("resisted_share", format!("{:.0}%", self.resisted_share * 100.0));
        vars.insert(
            "top_category",
            self.top_category.clone().unwrap_or_else(|| "unknown".into()),
        );
        vars.insert(
            "peak_hour",
            self.peak_hour
                .map(|h| format!("{:02}:00", h))
                .unwrap_or_else(|| "unknown".into()),
        );
        vars.insert(
            "focus_areas",
            self.focus_areas
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        vars.insert("avoid_topics", self.avoid_topics.join(", "));
        vars.insert(
            "excerpts",
            self.excerpts
                .iter()
                .map(|e| format!("- {}", e))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        vars
    }
}

/// One insight as a backend proposes it. Validated before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedInsight {
    pub category: String,
    #[serde(default)]
    pub priority: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub advice: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub technique: Option<String>,
}

impl SuggestedInsight {
    pub fn new(category: Category, title: &str, message: &str) -> Self {
        Self {
            category: category.as_str().to_string(),
            priority: None,
            title: title.to_string(),
            message: message.to_string(),
            advice: Vec::new(),
            confidence: None,
            technique: None,
        }
    }
}

/// Envelope the prompt asks backends to return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionSet {
    #[serde(default)]
    pub insights: Vec<SuggestedInsight>,
}

fn mean_of(records: &[BehaviorRecord], f: impl Fn(&BehaviorRecord) -> f64) -> f64 {
    if records.is_empty() {
        0.0
    } else {
        records.iter().map(f).sum::<f64>() / records.len() as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn most_frequent<K: Copy + Ord>(counts: &BTreeMap<K, usize>) -> Option<K> {
    // Ties resolve to the smallest key, BTreeMap iterates in key order
    counts
        .iter()
        .fold(None, |best: Option<(K, usize)>, (k, n)| match best {
            Some((_, m)) if m >= *n => best,
            _ => Some((*k, *n)),
        })
        .map(|(k, _)| k)
}

/// Strip obvious identifiers and cut to excerpt length
fn scrub(message: &str) -> String {
    static IDENTIFIERS: OnceLock<Regex> = OnceLock::new();
    let re = IDENTIFIERS.get_or_init(|| {
        Regex::new(r"[\w.+-]+@[\w-]+\.[\w.]+|\+?\d[\d\s-]{6,}\d|https?://\S+").expect("valid regex")
    });
    let cleaned = re.replace_all(message.trim(), "[redacted]");
    cleaned.chars().take(MAX_EXCERPT_CHARS).collect()
}
