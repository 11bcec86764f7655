//! Validity gate and lexical similarity
//!
//! Similarity = 2 x |shared words| / (|words A| + |words B|) over lowercase,
//! whitespace-separated words (edge punctuation stripped).

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Category, InsightCandidate, ShownInsight};

/// Distinct lowercase words of a text
pub fn words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Shared-word ratio in [0, 1]. Two texts without words score 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let wa = words(a);
    let wb = words(b);
    let total = wa.len() + wb.len();
    if total == 0 {
        return 0.0;
    }
    let shared = wa.intersection(&wb).count();
    2.0 * shared as f64 / total as f64
}

/// Same category and at least `threshold` similar
pub fn is_duplicate(
    a: (Category, &str),
    b: (Category, &str),
    threshold: f64,
) -> bool {
    a.0 == b.0 && similarity(a.1, b.1) >= threshold
}

/// Drops candidates that must not be delivered
pub struct ValidityGate<'a> {
    recent: Vec<&'a ShownInsight>,
    avoid_topics: Vec<String>,
    threshold: f64,
}

impl<'a> ValidityGate<'a> {
    /// `shown` is everything delivered before; only entries inside the
    /// rolling `window` ending at `now` count for dedup
    pub fn new(
        shown: impl IntoIterator<Item = &'a ShownInsight>,
        avoid_topics: &[String],
        threshold: f64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let cutoff = now - window;
        Self {
            recent: shown.into_iter().filter(|s| s.shown_at >= cutoff).collect(),
            avoid_topics: avoid_topics
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            threshold,
        }
    }

    /// Why a candidate is rejected, if it is
    pub fn rejection(&self, candidate: &InsightCandidate) -> Option<&'static str> {
        if candidate.message.trim().is_empty() {
            return Some("empty_message");
        }
        if self.recent.iter().any(|s| {
            is_duplicate(
                (candidate.category, &candidate.message),
                (s.category, &s.message),
                self.threshold,
            )
        }) {
            return Some("recently_shown");
        }
        if self.mentions_avoided_topic(candidate) {
            return Some("avoided_topic");
        }
        None
    }

    fn mentions_avoided_topic(&self, candidate: &InsightCandidate) -> bool {
        if self.avoid_topics.is_empty() {
            return false;
        }
        let haystack = std::iter::once(candidate.title.as_str())
            .chain(std::iter::once(candidate.message.as_str()))
            .chain(candidate.advice.iter().map(|a| a.as_str()))
            .map(|s| s.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        self.avoid_topics.iter().any(|t| haystack.contains(t.as_str()))
    }

    pub fn filter(&self, candidates: Vec<InsightCandidate>) -> Vec<InsightCandidate> {
        candidates
            .into_iter()
            .filter(|c| match self.rejection(c) {
                Some(reason) => {
                    tracing::debug!(category = %c.category, source = %c.source, reason, "Candidate rejected");
                    false
                }
                None => true,
            })
            .collect()
    }
}

/// Collapse near-duplicates within one batch, keeping the earlier one.
/// Run after sorting so the better candidate survives.
pub fn dedup_batch(candidates: Vec<InsightCandidate>, threshold: f64) -> Vec<InsightCandidate> {
    let mut kept: Vec<InsightCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = kept.iter().any(|k| {
            is_duplicate(
                (k.category, &k.message),
                (candidate.category, &candidate.message),
                threshold,
            )
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Provenance};

    fn candidate(category: Category, message: &str) -> InsightCandidate {
        InsightCandidate::new(category, Priority::Medium, "Title", message, Provenance::RuleEngine, Utc::now())
    }

    #[test]
    fn test_similarity_formula() {
        assert_eq!(similarity("a b c d", "a b c d"), 1.0);
        assert_eq!(similarity("A B", "a b"), 1.0);
        // shared {a, b}: 2*2 / (4 + 2)
        assert!((similarity("a b c d", "a b") - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("one", "two"), 0.0);
    }

    #[test]
    fn test_batch_dedup_same_category_only() {
        let batch = vec![
            candidate(Category::Coping, "Take a slow breath and notice the urge pass"),
            candidate(Category::Coping, "take a slow breath and notice the urge pass."),
            candidate(Category::Trigger, "Take a slow breath and notice the urge pass"),
        ];
        let kept = dedup_batch(batch, 0.8);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].category, Category::Coping);
        assert_eq!(kept[1].category, Category::Trigger);
    }

    #[test]
    fn test_gate_rejects_recently_shown() {
        let now = Utc::now();
        let shown = vec![
            ShownInsight {
                category: Category::Coping,
                title: "t".into(),
                message: "Try urge surfing when the next craving hits".into(),
                shown_at: now - Duration::hours(2),
            },
            ShownInsight {
                category: Category::Pattern,
                title: "t".into(),
                message: "Evenings are your hardest time".into(),
                shown_at: now - Duration::hours(30),
            },
        ];
        let gate = ValidityGate::new(&shown, &[], 0.8, Duration::hours(24), now);

        assert_eq!(
            gate.rejection(&candidate(Category::Coping, "Try urge surfing when the next craving hits")),
            Some("recently_shown")
        );
        // Outside the 24h window
        assert_eq!(
            gate.rejection(&candidate(Category::Pattern, "Evenings are your hardest time")),
            None
        );
    }

    #[test]
    fn test_gate_rejects_empty_and_avoided() {
        let now = Utc::now();
        let gate = ValidityGate::new(
            std::iter::empty(),
            &["Alcohol".to_string()],
            0.8,
            Duration::hours(24),
            now,
        );

        assert_eq!(gate.rejection(&candidate(Category::Coping, "   ")), Some("empty_message"));
        assert_eq!(
            gate.rejection(&candidate(Category::Trigger, "Skipping alcohol on Fridays helps")),
            Some("avoided_topic")
        );
        let kept = gate.filter(vec![
            candidate(Category::Coping, "Breathe"),
            candidate(Category::Coping, ""),
        ]);
        assert_eq!(kept.len(), 1);
    }
}
