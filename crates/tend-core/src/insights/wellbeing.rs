//! Text- and education-driven templates

use std::cmp::Ordering;

use crate::distortion::{interventions_for, DistortionAssessment, SeverityTier};
use crate::error::{Error, Result};
use crate::models::{Category, InsightCandidate, Priority, Style, Technique};

use super::engine::{styled, InsightTemplate, TemplateInput};

/// Coping suggestion for the most severe thinking trap in recent messages
pub struct DistortionCoping;

impl DistortionCoping {
    /// Highest severity, then highest confidence; first message wins ties
    fn strongest<'a>(assessments: &'a [DistortionAssessment]) -> Option<&'a DistortionAssessment> {
        assessments
            .iter()
            .filter(|a| !a.is_empty())
            .fold(None, |best: Option<&DistortionAssessment>, a| match best {
                Some(b)
                    if b.severity > a.severity
                        || (b.severity == a.severity
                            && b.confidence.partial_cmp(&a.confidence) != Some(Ordering::Less)) =>
                {
                    Some(b)
                }
                _ => Some(a),
            })
    }
}

impl InsightTemplate for DistortionCoping {
    fn id(&self) -> &'static str {
        "distortion_coping"
    }

    fn category(&self) -> Category {
        Category::Coping
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        Self::strongest(input.assessments).is_some()
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let assessment = Self::strongest(input.assessments).ok_or_else(|| Error::TemplateEvaluation {
            template: self.id().to_string(),
            reason: "no distortion detected".into(),
        })?;

        // The detector already picked an immediate intervention
        if let Some(intervention) = &assessment.intervention {
            return Ok(intervention
                .clone()
                .with_source(self.id())
                .with_ttl(input.ttl.for_category(Category::Coping)));
        }

        let technique = assessment
            .recommended
            .first()
            .copied()
            .unwrap_or(Technique::CognitiveRestructuring);
        let labels = assessment
            .detected
            .iter()
            .map(|k| k.label().to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        let priority = match assessment.severity {
            SeverityTier::High => Priority::High,
            SeverityTier::Moderate | SeverityTier::Low => Priority::Medium,
        };

        let message = styled(
            input.style(),
            &format!(
                "Some of what you wrote sounds like {}. Those thoughts are heavy to carry. {} can help you hold them more lightly.",
                labels,
                technique.label()
            ),
            &format!("Thinking trap spotted: {}. Counter it with {}.", labels, technique.label().to_lowercase()),
            &format!(
                "Your message shows signs of {}, a common thinking pattern that makes things feel worse than they are. {} is a well-tested way to challenge it.",
                labels,
                technique.label()
            ),
        );

        let advice: Vec<&str> = interventions_for(technique)
            .first()
            .map(|i| i.steps.to_vec())
            .unwrap_or_default();

        Ok(input
            .candidate(
                self.id(),
                self.category(),
                priority,
                format!("Try {}", technique.label().to_lowercase()),
                message,
            )
            .with_advice(advice)
            .with_technique(technique)
            .with_confidence(assessment.confidence)
            .with_patterns(assessment.detected.iter().map(|k| k.as_str())))
    }
}

/// How urges rise and fall, for subjects who log intense urges or prefer
/// the educational style
pub struct UrgeCycleEducation;

impl UrgeCycleEducation {
    const MIN_RECORDS: usize = 3;
    const INTENSE_AVERAGE: f64 = 5.0;

    fn average_intensity(input: &TemplateInput<'_>) -> f64 {
        let records = input.records();
        if records.is_empty() {
            return 0.0;
        }
        records.iter().map(|r| r.intensity).sum::<f64>() / records.len() as f64
    }
}

impl InsightTemplate for UrgeCycleEducation {
    fn id(&self) -> &'static str {
        "urge_cycle_education"
    }

    fn category(&self) -> Category {
        Category::Education
    }

    fn priority(&self) -> Priority {
        Priority::Info
    }

    fn condition(&self, input: &TemplateInput<'_>) -> bool {
        input.records().len() >= Self::MIN_RECORDS
            && (Self::average_intensity(input) >= Self::INTENSE_AVERAGE
                || input.style() == Style::Educational)
    }

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate> {
        let priority = if input.style() == Style::Educational {
            Priority::Low
        } else {
            Priority::Info
        };

        let message = styled(
            input.style(),
            "An urge is like a wave: it builds, peaks and passes, usually within 20 to 30 minutes, whether or not you act on it.",
            "Urges peak and fade within about 20 to 30 minutes. Wait it out.",
            "Urges follow a predictable curve: they build, peak and subside within roughly 20 to 30 minutes. Each time you ride one out without acting, the next one tends to be weaker.",
        );

        Ok(input
            .candidate(self.id(), self.category(), priority, "Urges are waves", message)
            .with_advice(["Next time, note the time an urge starts and when it fades"])
            .with_technique(Technique::UrgeSurfing)
            .with_confidence(0.6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtlTable;
    use crate::distortion::{DetectionContext, DistortionDetector};
    use crate::models::{BehaviorRecord, GenerationContext, TimeWindow};
    use chrono::Utc;

    fn assess(messages: &[&str]) -> Vec<DistortionAssessment> {
        let detector = DistortionDetector::new();
        let ctx = DetectionContext::new(Utc::now());
        messages
            .iter()
            .map(|m| detector.assess(m, &ctx).unwrap())
            .collect()
    }

    #[test]
    fn test_no_distortion_no_coping() {
        let ctx = GenerationContext::new("s1", TimeWindow::last_days(Utc::now(), 7));
        let ttl = TtlTable::default();
        let assessments = assess(&["had a calm afternoon"]);
        let input = TemplateInput::new(&ctx, &assessments, &ttl, Utc::now());
        assert!(!DistortionCoping.condition(&input));
    }

    #[test]
    fn test_coping_uses_recommended_technique() {
        let ctx = GenerationContext::new("s1", TimeWindow::last_days(Utc::now(), 7));
        let ttl = TtlTable::default();
        let assessments = assess(&["fine today", "her zaman böyle oluyor, asla değişmeyecek"]);
        let input = TemplateInput::new(&ctx, &assessments, &ttl, Utc::now());

        let candidate = DistortionCoping.generate(&input).unwrap();
        assert_eq!(candidate.category, Category::Coping);
        assert!(candidate.technique.is_some());
        assert!(candidate
            .detected_patterns
            .contains(&"overgeneralization".to_string()));
        assert!(!candidate.advice.is_empty());
        assert!(candidate.confidence > 0.0);
    }

    #[test]
    fn test_coping_prefers_detector_intervention() {
        let ctx = GenerationContext::new("s1", TimeWindow::last_days(Utc::now(), 7));
        let ttl = TtlTable::default();
        let assessments = assess(&["This is a disaster, I should be stronger, I'm a failure"]);
        assert!(assessments[0].intervention.is_some());
        let input = TemplateInput::new(&ctx, &assessments, &ttl, Utc::now());

        let candidate = DistortionCoping.generate(&input).unwrap();
        assert_eq!(candidate.priority, Priority::High);
        assert_eq!(candidate.source, "distortion_coping");
    }

    #[test]
    fn test_education_for_educational_style() {
        let now = Utc::now();
        let mut ctx = GenerationContext::new("s1", TimeWindow::last_days(now, 7)).with_records(vec![
            BehaviorRecord::new("a", "x", 2.0, 2.0, now),
            BehaviorRecord::new("b", "x", 2.0, 2.0, now),
            BehaviorRecord::new("c", "x", 2.0, 2.0, now),
        ]);
        let ttl = TtlTable::default();
        {
            let input = TemplateInput::new(&ctx, &[], &ttl, now);
            assert!(!UrgeCycleEducation.condition(&input));
        }
        ctx.preferences.style = Style::Educational;
        let input = TemplateInput::new(&ctx, &[], &ttl, now);
        assert!(UrgeCycleEducation.condition(&input));
        assert_eq!(UrgeCycleEducation.generate(&input).unwrap().priority, Priority::Low);
    }
}
