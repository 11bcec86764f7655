//! Record-driven templates
//!
//! Each template looks only at the normalized behavior records (oldest-first)
//! and the subject's style.

use std::collections::BTreeMap;

use chrono::Timelike;

use crate::error::Result;
use crate::models::{BehaviorRecord, Category, InsightCandidate, Priority, Technique};

use super::engine::{styled, InsightTemplate, TemplateInput};

/// Records considered "recent" by the progress and warning templates
const RECENT: usize = 10;
/// Resistance level that counts as a strong push-back
const STRONG_RESISTANCE: f64 = 7.0;
const HIGH_INTENSITY: f64 = 8.0;
const LOW_RESISTANCE: f64 = 3.0;
const MILESTONES: &[usize] = &[5, 10, 25, 50, 100];

fn mean(records: &[BehaviorRecord], f: impl Fn(&BehaviorRecord) -> f64) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(f).sum::<f64>() / records.len() as f64
}

/// Resisted records at the end of the list, newest backwards
fn trailing_resisted(records: &[BehaviorRecord]) -> usize {
    records.iter().rev().take_while(|r| r.resisted()).count()
}

/// Strong resistance in recent records
pub struct ResistanceProgress;

impl ResistanceProgress {
    fn strong(input: &TemplateInput<'_>) -> usize {
        input
            .last(RECENT)
            .iter()
            .filter(|r| r.resistance >= STRONG_RESISTANCE)
            .count()
    }
}

impl InsightTemplate for ResistanceProgress {
    fn id(&self) -> &'static str {
        "resistance_progress"
    }

    fn category(&self) -> Category {
        Category::Progress
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        Self::strong(input) >= 3
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let recent = input.last(RECENT);
        let strong = Self::strong(input);
        let share = strong as f64 / recent.len() as f64;
        let priority = if share >= 0.6 {
            Priority::High
        } else {
            Priority::Medium
        };

        let message = styled(
            input.style(),
            &format!(
                "You pushed back hard on {} of your last {} urges. That strength is growing, even on days it doesn't feel like it.",
                strong,
                recent.len()
            ),
            &format!(
                "{} of your last {} urges were met with strong resistance. Keep doing what worked.",
                strong,
                recent.len()
            ),
            &format!(
                "Resistance of 7 or more in {} of your last {} records. Each time you resist, the urge-response link weakens.",
                strong,
                recent.len()
            ),
        );

        Ok(input
            .candidate(self.id(), self.category(), priority, "Your resistance is building", message)
            .with_advice([
                "Note what helped you resist this week",
                "Plan to use it again at your next urge",
            ])
            .with_confidence((0.7 + 0.2 * share).min(0.95))
            .with_patterns(["strong_resistance"]))
    }
}

/// High-intensity urges met with little resistance
pub struct HighIntensityWarning;

impl HighIntensityWarning {
    fn is_unchecked(record: &BehaviorRecord) -> bool {
        record.intensity >= HIGH_INTENSITY && !record.resisted()
    }

    /// The last three records are all intense with almost no resistance
    fn sustained(input: &TemplateInput<'_>) -> bool {
        let last = input.last(3);
        last.len() == 3
            && last
                .iter()
                .all(|r| r.intensity >= HIGH_INTENSITY && r.resistance <= LOW_RESISTANCE)
    }
}

impl InsightTemplate for HighIntensityWarning {
    fn id(&self) -> &'static str {
        "high_intensity_warning"
    }

    fn category(&self) -> Category {
        Category::Warning
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        input.last(5).iter().filter(|r| Self::is_unchecked(r)).count() >= 3
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let sustained = Self::sustained(input);
        let (priority, confidence) = if sustained {
            (Priority::Critical, 0.9)
        } else {
            (Priority::High, 0.8)
        };

        let message = styled(
            input.style(),
            "Your urges have been very strong lately and it has been hard to hold back. That's a sign to lean on extra support right now.",
            "Several recent urges hit 8+ with little resistance. Put a plan in place before the next one.",
            "Repeated high-intensity urges with low resistance often precede a lapse. Early support breaks that chain.",
        );

        Ok(input
            .candidate(self.id(), self.category(), priority, "Urges are running high", message)
            .with_advice([
                "Reach out to someone you trust today",
                "Remove easy access to what you're resisting",
                "Try 5 minutes of slow breathing when the next urge starts",
            ])
            .with_technique(Technique::Grounding)
            .with_confidence(confidence)
            .with_patterns(if sustained {
                vec!["high_intensity", "low_resistance", "sustained_streak"]
            } else {
                vec!["high_intensity", "low_resistance"]
            }))
    }
}

/// Hour-of-day histogram over the records
fn hour_counts(records: &[BehaviorRecord]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.timestamp.hour()).or_insert(0) += 1;
    }
    counts
}

/// Urges cluster at one hour of the day
pub struct PeakHourTrigger;

impl PeakHourTrigger {
    /// (hour, count), earliest hour on ties
    fn peak(records: &[BehaviorRecord]) -> Option<(u32, usize)> {
        hour_counts(records)
            .into_iter()
            .fold(None, |best: Option<(u32, usize)>, (hour, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((hour, n)),
            })
    }
}

impl InsightTemplate for PeakHourTrigger {
    fn id(&self) -> &'static str {
        "peak_hour_trigger"
    }

    fn category(&self) -> Category {
        Category::Trigger
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        let records = input.records();
        if records.len() < 5 {
            return false;
        }
        matches!(Self::peak(records), Some((_, n)) if n >= 3 && n as f64 / records.len() as f64 >= 0.4)
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let records = input.records();
        let (hour, count) = Self::peak(records).unwrap_or((0, 0));
        let share = count as f64 / records.len().max(1) as f64;
        let when = format!("{:02}:00", hour);

        let message = styled(
            input.style(),
            &format!(
                "Many of your urges ({} of {}) show up around {}. Knowing that gives you a chance to get ahead of it.",
                count,
                records.len(),
                when
            ),
            &format!("{} of {} urges happen around {}. Plan that hour.", count, records.len(), when),
            &format!(
                "{} of {} records fall around {}. Time-of-day cues are among the most common triggers.",
                count,
                records.len(),
                when
            ),
        );

        Ok(input
            .candidate(self.id(), self.category(), self.priority(), format!("Watch the {} hour", when), message)
            .with_advice([
                format!("Schedule something absorbing just before {}", when),
                "Notice what usually happens right before that time".to_string(),
            ])
            .with_technique(Technique::ProblemSolving)
            .with_confidence(0.5 + share / 2.0)
            .with_patterns([format!("peak_hour_{}", hour)]))
    }
}

/// One record category dominates
pub struct DominantCategoryPattern;

impl DominantCategoryPattern {
    fn dominant(records: &[BehaviorRecord]) -> Option<(&str, usize, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for record in records {
            *counts.entry(record.category.as_str()).or_insert(0) += 1;
        }
        let distinct = counts.len();
        counts
            .into_iter()
            .fold(None, |best: Option<(&str, usize)>, (cat, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((cat, n)),
            })
            .map(|(cat, n)| (cat, n, distinct))
    }
}

impl InsightTemplate for DominantCategoryPattern {
    fn id(&self) -> &'static str {
        "dominant_category_pattern"
    }

    fn category(&self) -> Category {
        Category::Pattern
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        let records = input.records();
        if records.len() < 5 {
            return false;
        }
        matches!(
            Self::dominant(records),
            Some((_, n, distinct)) if distinct >= 2 && n as f64 / records.len() as f64 >= 0.5
        )
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let records = input.records();
        let (category, count, _) = Self::dominant(records).unwrap_or(("unknown", 0, 0));
        let share = count as f64 / records.len().max(1) as f64;

        let message = styled(
            input.style(),
            &format!(
                "Most of what you've logged ({} of {}) is about {}. It might be the place where a little extra care goes furthest.",
                count,
                records.len(),
                category
            ),
            &format!("{} accounts for {} of {} records. Focus there first.", category, count, records.len()),
            &format!(
                "{} of {} records are {}. Concentrating effort on the most frequent behavior usually gives the biggest gains.",
                count,
                records.len(),
                category
            ),
        );

        Ok(input
            .candidate(self.id(), self.category(), self.priority(), format!("{} stands out", category), message)
            .with_confidence(share)
            .with_patterns([format!("dominant_{}", category)]))
    }
}

/// Intensity rising or easing between the older and newer half
pub struct IntensityTrend;

impl IntensityTrend {
    const MIN_RECORDS: usize = 6;
    const MIN_DELTA: f64 = 1.5;

    fn delta(records: &[BehaviorRecord]) -> f64 {
        let (older, newer) = records.split_at(records.len() / 2);
        mean(newer, |r| r.intensity) - mean(older, |r| r.intensity)
    }
}

impl InsightTemplate for IntensityTrend {
    fn id(&self) -> &'static str {
        "intensity_trend"
    }

    fn category(&self) -> Category {
        Category::Pattern
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        let records = input.records();
        records.len() >= Self::MIN_RECORDS && Self::delta(records).abs() >= Self::MIN_DELTA
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let delta = Self::delta(input.records());
        let confidence = (0.5 + delta.abs() / 10.0).min(0.9);

        let candidate = if delta > 0.0 {
            let message = styled(
                input.style(),
                &format!("Your urges have been getting stronger (about {:.1} points higher on average). Be gentle with yourself and plan a little extra support.", delta),
                &format!("Average intensity is up {:.1} points. Tighten your plan.", delta),
                &format!("Mean intensity rose by {:.1} points between the older and newer half of your records. Stress, sleep and routine changes often drive this.", delta),
            );
            input
                .candidate(self.id(), self.category(), Priority::Medium, "Urges are getting stronger", message)
                .with_patterns(["intensity_rising"])
        } else {
            let message = styled(
                input.style(),
                &format!("Your urges have eased by about {:.1} points on average. What you're doing is working.", -delta),
                &format!("Average intensity is down {:.1} points. Stay the course.", -delta),
                &format!("Mean intensity fell by {:.1} points. Urges weaken when they are repeatedly not acted on.", -delta),
            );
            input
                .candidate(self.id(), self.category(), Priority::Low, "Urges are easing", message)
                .with_patterns(["intensity_falling"])
        };

        Ok(candidate.with_confidence(confidence))
    }
}

/// Several resisted urges in a row
pub struct ResistanceStreakMotivation;

impl InsightTemplate for ResistanceStreakMotivation {
    fn id(&self) -> &'static str {
        "resistance_streak_motivation"
    }

    fn category(&self) -> Category {
        Category::Motivation
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        trailing_resisted(input.records()) >= 3
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let streak = trailing_resisted(input.records());
        let message = styled(
            input.style(),
            &format!("{} urges in a row, and you held your ground every time. You're proving something to yourself.", streak),
            &format!("{} resisted urges in a row. Make it {}.", streak, streak + 1),
            &format!("A streak of {} resisted urges. Every success makes the next one a little easier.", streak),
        );

        Ok(input
            .candidate(self.id(), self.category(), self.priority(), format!("{} in a row", streak), message)
            .with_technique(Technique::BehavioralActivation)
            .with_confidence((0.6 + 0.05 * streak as f64).min(0.9))
            .with_patterns(["resistance_streak"]))
    }
}

/// Total resisted urges reached a milestone with the latest record
pub struct MilestoneCelebration;

impl MilestoneCelebration {
    fn resisted_total(records: &[BehaviorRecord]) -> usize {
        records.iter().filter(|r| r.resisted()).count()
    }
}

impl InsightTemplate for MilestoneCelebration {
    fn id(&self) -> &'static str {
        "milestone_celebration"
    }

    fn category(&self) -> Category {
        Category::Celebration
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        let records = input.records();
        records.last().is_some_and(|r| r.resisted())
            && MILESTONES.contains(&Self::resisted_total(records))
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let total = Self::resisted_total(input.records());
        let message = styled(
            input.style(),
            &format!("That's {} urges you've resisted. Take a moment to be proud of that.", total),
            &format!("{} urges resisted. Milestone reached.", total),
            &format!("{} resisted urges logged. Milestones are worth marking: recognising progress reinforces it.", total),
        );

        Ok(input
            .candidate(self.id(), self.category(), self.priority(), format!("{} urges resisted!", total), message)
            .with_confidence(0.9)
            .with_patterns([format!("milestone_{}", total)]))
    }
}
