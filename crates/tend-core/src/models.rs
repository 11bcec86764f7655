//! Data models for Tend

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Insight category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Recurring shape in the records (time, category, trend)
    Pattern,
    /// Situations that tend to precede urges
    Trigger,
    /// Improvement in resistance over time
    Progress,
    /// Concrete coping technique for the current state
    Coping,
    /// Escalation that deserves attention now
    Warning,
    /// Encouragement to keep going
    Motivation,
    /// Psychoeducation about urges and thinking patterns
    Education,
    /// Milestones reached
    Celebration,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pattern => "pattern",
            Category::Trigger => "trigger",
            Category::Progress => "progress",
            Category::Coping => "coping",
            Category::Warning => "warning",
            Category::Motivation => "motivation",
            Category::Education => "education",
            Category::Celebration => "celebration",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Pattern,
            Category::Trigger,
            Category::Progress,
            Category::Coping,
            Category::Warning,
            Category::Motivation,
            Category::Education,
            Category::Celebration,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pattern" => Ok(Category::Pattern),
            "trigger" => Ok(Category::Trigger),
            "progress" => Ok(Category::Progress),
            "coping" => Ok(Category::Coping),
            "warning" => Ok(Category::Warning),
            "motivation" => Ok(Category::Motivation),
            "education" => Ok(Category::Education),
            "celebration" => Ok(Category::Celebration),
            _ => Err(format!("Unknown insight category: {}", s)),
        }
    }
}

/// Ordinal priority. Declaration order is the sort order (`Info` lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Info => "info",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Numeric rank for sorting (higher = more urgent)
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Info => 1,
            Priority::Low => 2,
            Priority::Medium => 3,
            Priority::High => 4,
            Priority::Critical => 5,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Priority::Info),
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Therapeutic technique an insight draws on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    CognitiveRestructuring,
    Decatastrophizing,
    EvidenceExamination,
    BalancedThinking,
    SelfCompassion,
    Mindfulness,
    Grounding,
    BehavioralActivation,
    UrgeSurfing,
    ProblemSolving,
}

impl Technique {
    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::CognitiveRestructuring => "cognitive_restructuring",
            Technique::Decatastrophizing => "decatastrophizing",
            Technique::EvidenceExamination => "evidence_examination",
            Technique::BalancedThinking => "balanced_thinking",
            Technique::SelfCompassion => "self_compassion",
            Technique::Mindfulness => "mindfulness",
            Technique::Grounding => "grounding",
            Technique::BehavioralActivation => "behavioral_activation",
            Technique::UrgeSurfing => "urge_surfing",
            Technique::ProblemSolving => "problem_solving",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            Technique::CognitiveRestructuring => "Cognitive restructuring",
            Technique::Decatastrophizing => "Decatastrophizing",
            Technique::EvidenceExamination => "Examining the evidence",
            Technique::BalancedThinking => "Balanced thinking",
            Technique::SelfCompassion => "Self-compassion",
            Technique::Mindfulness => "Mindfulness",
            Technique::Grounding => "Grounding",
            Technique::BehavioralActivation => "Behavioral activation",
            Technique::UrgeSurfing => "Urge surfing",
            Technique::ProblemSolving => "Problem solving",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    RuleEngine,
    ExternalReasoning,
    FallbackNotice,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::RuleEngine => "rule_engine",
            Provenance::ExternalReasoning => "external_reasoning",
            Provenance::FallbackNotice => "fallback_notice",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User feedback on a delivered insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
    Irrelevant,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Helpful => "helpful",
            Feedback::NotHelpful => "not_helpful",
            Feedback::Irrelevant => "irrelevant",
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "helpful" => Ok(Feedback::Helpful),
            "not_helpful" | "not-helpful" => Ok(Feedback::NotHelpful),
            "irrelevant" => Ok(Feedback::Irrelevant),
            _ => Err(format!("Unknown feedback: {}", s)),
        }
    }
}

/// A generated insight prior to (and after) prioritization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightCandidate {
    pub id: String,
    pub category: Category,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    /// Ordered, actionable steps
    pub advice: Vec<String>,
    /// Always within [0, 1]
    pub confidence: f64,
    pub technique: Option<Technique>,
    pub detected_patterns: Vec<String>,
    pub provenance: Provenance,
    /// Template id or backend model that produced the candidate
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub shown: bool,
    pub shown_at: Option<DateTime<Utc>>,
    pub feedback: Option<Feedback>,
}

impl InsightCandidate {
    /// Create a candidate generated at `now`, valid for one hour until a TTL is applied
    pub fn new(
        category: Category,
        priority: Priority,
        title: impl Into<String>,
        message: impl Into<String>,
        provenance: Provenance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            priority,
            title: title.into(),
            message: message.into(),
            advice: Vec::new(),
            confidence: 0.5,
            technique: None,
            detected_patterns: Vec::new(),
            provenance,
            source: provenance.as_str().to_string(),
            generated_at: now,
            valid_until: now + Duration::hours(1),
            shown: false,
            shown_at: None,
            feedback: None,
        }
    }

    /// Set confidence, clamped to [0, 1]. NaN becomes 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_advice<I, S>(mut self, advice: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.advice = advice.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.technique = Some(technique);
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detected_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.valid_until = self.generated_at + ttl;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    pub fn is_notice(&self) -> bool {
        self.provenance == Provenance::FallbackNotice
    }
}

/// Clamp a score to [0, 1]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Source of the current time, shared by the cache and the orchestrator
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// One behavioral record (an urge, craving or episode the subject logged)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub id: String,
    /// Free-form record category (e.g. "smoking", "doomscrolling")
    pub category: String,
    /// Urge intensity, 0-10
    pub intensity: f64,
    /// How strongly the urge was resisted, 0-10
    pub resistance: f64,
    pub timestamp: DateTime<Utc>,
    /// Set when the record was edited after creation
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BehaviorRecord {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        intensity: f64,
        resistance: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            intensity,
            resistance,
            timestamp,
            updated_at: None,
        }
    }

    /// Latest of creation and edit time
    pub fn last_modified(&self) -> DateTime<Utc> {
        match self.updated_at {
            Some(updated) if updated > self.timestamp => updated,
            _ => self.timestamp,
        }
    }

    /// Resistance at least matched the urge
    pub fn resisted(&self) -> bool {
        self.resistance >= self.intensity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
}

impl TimeWindow {
    /// Window covering the last `days` days up to `now`
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        let granularity = if days <= 7 {
            Granularity::Day
        } else if days <= 60 {
            Granularity::Week
        } else {
            Granularity::Month
        };
        Self {
            start: now - Duration::days(days),
            end: now,
            granularity,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    AsNeeded,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::AsNeeded => "as_needed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    #[default]
    Supportive,
    Direct,
    Educational,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Supportive => "supportive",
            Style::Direct => "direct",
            Style::Educational => "educational",
        }
    }

    /// Categories this style leans toward when ranking
    pub fn affinity(&self) -> &'static [Category] {
        match self {
            Style::Supportive => &[Category::Coping, Category::Motivation, Category::Celebration],
            Style::Direct => &[Category::Warning, Category::Trigger, Category::Pattern],
            Style::Educational => &[Category::Education, Category::Pattern, Category::Progress],
        }
    }
}

/// Subject preference configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub focus_areas: BTreeSet<Category>,
    #[serde(default)]
    pub avoid_topics: Vec<String>,
}

/// An insight that was already delivered to the subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShownInsight {
    pub category: Category,
    pub title: String,
    pub message: String,
    pub shown_at: DateTime<Utc>,
}

impl From<&InsightCandidate> for ShownInsight {
    fn from(candidate: &InsightCandidate) -> Self {
        Self {
            category: candidate.category,
            title: candidate.title.clone(),
            message: candidate.message.clone(),
            shown_at: candidate.shown_at.unwrap_or(candidate.generated_at),
        }
    }
}

/// Everything one generation call needs. Built per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub subject_id: String,
    /// Whether the subject has a therapeutic profile at all
    #[serde(default)]
    pub has_profile: bool,
    #[serde(default)]
    pub records: Vec<BehaviorRecord>,
    #[serde(default)]
    pub messages: Vec<String>,
    pub window: TimeWindow,
    /// Prior insights, used for the dedup window
    #[serde(default)]
    pub history: Vec<ShownInsight>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl GenerationContext {
    pub fn new(subject_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            subject_id: subject_id.into(),
            has_profile: false,
            records: Vec::new(),
            messages: Vec::new(),
            window,
            history: Vec::new(),
            preferences: Preferences::default(),
        }
    }

    pub fn with_profile(mut self) -> Self {
        self.has_profile = true;
        self
    }

    pub fn with_records(mut self, records: Vec<BehaviorRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_messages<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messages = messages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_history(mut self, history: Vec<ShownInsight>) -> Self {
        self.history = history;
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Reject malformed input. These are programmer errors, not data conditions.
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.trim().is_empty() {
            return Err(Error::InvalidContext("subject id is empty".into()));
        }
        if self.window.start > self.window.end {
            return Err(Error::InvalidContext(format!(
                "window start {} is after end {}",
                self.window.start, self.window.end
            )));
        }
        for record in &self.records {
            for (name, value) in [("intensity", record.intensity), ("resistance", record.resistance)] {
                if !(0.0..=10.0).contains(&value) {
                    return Err(Error::InvalidContext(format!(
                        "record {} has {} {} outside 0-10",
                        record.id, name, value
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sort records oldest-first and keep only the most recent `limit`
    pub fn normalize(&mut self, limit: usize) {
        self.records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        if self.records.len() > limit {
            let excess = self.records.len() - limit;
            self.records.drain(..excess);
        }
    }

    /// Most recent `n` records, oldest-first. Assumes `normalize` ran.
    pub fn last_records(&self, n: usize) -> &[BehaviorRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_priority_ordering() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        priorities.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
        assert!(Priority::Low.rank() > Priority::Info.rank());
    }

    #[test]
    fn test_category_round_trip() {
        for category in Category::all() {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), *category);
        }
        assert!("nonsense".parse::<Category>().is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let c = InsightCandidate::new(
            Category::Coping,
            Priority::Low,
            "t",
            "m",
            Provenance::RuleEngine,
            at(9),
        );
        assert_eq!(c.clone().with_confidence(1.7).confidence, 1.0);
        assert_eq!(c.clone().with_confidence(-0.2).confidence, 0.0);
        assert_eq!(c.with_confidence(f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_ttl_sets_valid_until() {
        let c = InsightCandidate::new(
            Category::Warning,
            Priority::High,
            "t",
            "m",
            Provenance::RuleEngine,
            at(9),
        )
        .with_ttl(Duration::hours(12));
        assert_eq!(c.valid_until, at(21));
        assert!(!c.is_expired(at(20)));
        assert!(c.is_expired(at(21)));
    }

    #[test]
    fn test_validate_rejects_malformed_context() {
        let window = TimeWindow::last_days(at(12), 7);
        assert!(GenerationContext::new("", window.clone()).validate().is_err());

        let bad = GenerationContext::new("s1", window.clone()).with_records(vec![
            BehaviorRecord::new("r1", "smoking", 11.0, 2.0, at(8)),
        ]);
        assert!(matches!(bad.validate(), Err(Error::InvalidContext(_))));

        let inverted = TimeWindow {
            start: at(12),
            end: at(8),
            granularity: Granularity::Day,
        };
        assert!(GenerationContext::new("s1", inverted).validate().is_err());

        assert!(GenerationContext::new("s1", window).validate().is_ok());
    }

    #[test]
    fn test_normalize_sorts_and_bounds() {
        let mut ctx = GenerationContext::new("s1", TimeWindow::last_days(at(12), 7)).with_records(vec![
            BehaviorRecord::new("c", "x", 1.0, 1.0, at(3)),
            BehaviorRecord::new("a", "x", 1.0, 1.0, at(1)),
            BehaviorRecord::new("b", "x", 1.0, 1.0, at(2)),
        ]);
        ctx.normalize(2);
        let ids: Vec<_> = ctx.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(ctx.last_records(1)[0].id, "c");
    }

    #[test]
    fn test_last_modified_prefers_edit_time() {
        let mut record = BehaviorRecord::new("r", "x", 5.0, 5.0, at(1));
        assert_eq!(record.last_modified(), at(1));
        record.updated_at = Some(at(4));
        assert_eq!(record.last_modified(), at(4));
    }

    #[test]
    fn test_preferences_deserialize_with_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"focus_areas": ["coping", "trigger"]}"#).unwrap();
        assert_eq!(prefs.frequency, Frequency::Daily);
        assert_eq!(prefs.style, Style::Supportive);
        assert!(prefs.focus_areas.contains(&Category::Coping));
    }
}
