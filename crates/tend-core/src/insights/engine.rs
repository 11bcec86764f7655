//! Template engine - evaluates the rule templates against one context

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};

use crate::config::TtlTable;
use crate::distortion::DistortionAssessment;
use crate::error::{Error, Result};
use crate::models::{BehaviorRecord, Category, GenerationContext, InsightCandidate, Priority, Provenance, Style};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

use super::behavior::{
    DominantCategoryPattern, HighIntensityWarning, IntensityTrend, MilestoneCelebration,
    PeakHourTrigger, ResistanceProgress, ResistanceStreakMotivation,
};
use super::wellbeing::{DistortionCoping, UrgeCycleEducation};

/// Everything a template may look at. Built once per generation pass.
pub struct TemplateInput<'a> {
    /// Normalized context (records oldest-first, bounded)
    pub ctx: &'a GenerationContext,
    /// One assessment per message; empty when the detector is off
    pub assessments: &'a [DistortionAssessment],
    pub ttl: &'a TtlTable,
    pub now: DateTime<Utc>,
}

impl<'a> TemplateInput<'a> {
    pub fn new(
        ctx: &'a GenerationContext,
        assessments: &'a [DistortionAssessment],
        ttl: &'a TtlTable,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ctx,
            assessments,
            ttl,
            now,
        }
    }

    pub fn records(&self) -> &'a [BehaviorRecord] {
        &self.ctx.records
    }

    /// Most recent `n` records, oldest-first
    pub fn last(&self, n: usize) -> &'a [BehaviorRecord] {
        self.ctx.last_records(n)
    }

    pub fn style(&self) -> Style {
        self.ctx.preferences.style
    }

    /// Rule-engine candidate with the category TTL applied
    pub fn candidate(
        &self,
        template_id: &str,
        category: Category,
        priority: Priority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> InsightCandidate {
        InsightCandidate::new(category, priority, title, message, Provenance::RuleEngine, self.now)
            .with_source(template_id)
            .with_ttl(self.ttl.for_category(category))
    }
}

/// Pick the phrasing matching the subject's preferred style
pub fn styled(style: Style, supportive: &str, direct: &str, educational: &str) -> String {
    match style {
        Style::Supportive => supportive,
        Style::Direct => direct,
        Style::Educational => educational,
    }
    .to_string()
}

/// A declarative rule: condition plus pure generator.
///
/// Both methods must be synchronous and free of hidden state.
pub trait InsightTemplate: Send + Sync {
    fn id(&self) -> &'static str;

    fn category(&self) -> Category;

    /// Base priority (a generator may escalate)
    fn priority(&self) -> Priority;

    fn condition(&self, input: &TemplateInput<'_>) -> bool;

    fn generate(&self, input: &TemplateInput<'_>) -> Result<InsightCandidate>;
}

/// Registry of templates, immutable once built
pub struct TemplateEngine {
    templates: Vec<Box<dyn InsightTemplate>>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Engine with the built-in templates
    pub fn new() -> Self {
        Self::with_templates(vec![
            Box::new(HighIntensityWarning),
            Box::new(DistortionCoping),
            Box::new(ResistanceProgress),
            Box::new(PeakHourTrigger),
            Box::new(DominantCategoryPattern),
            Box::new(IntensityTrend),
            Box::new(ResistanceStreakMotivation),
            Box::new(MilestoneCelebration),
            Box::new(UrgeCycleEducation),
        ])
    }

    /// Engine with exactly these templates, evaluated in order
    pub fn with_templates(templates: Vec<Box<dyn InsightTemplate>>) -> Self {
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// (id, category, base priority) of every registered template
    pub fn describe(&self) -> Vec<(&'static str, Category, Priority)> {
        self.templates
            .iter()
            .map(|t| (t.id(), t.category(), t.priority()))
            .collect()
    }

    /// One generation pass. A failing template is reported and skipped;
    /// output order follows registration order.
    pub fn run(&self, input: &TemplateInput<'_>, telemetry: &dyn TelemetrySink) -> Vec<InsightCandidate> {
        let mut candidates = Vec::new();

        for template in &self.templates {
            match evaluate(template.as_ref(), input) {
                Ok(Some(candidate)) => {
                    tracing::debug!(template = template.id(), "Template produced a candidate");
                    candidates.push(candidate);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(template = template.id(), error = %e, "Template evaluation failed");
                    telemetry.emit(TelemetryEvent::TemplateFailure {
                        template_id: template.id().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        candidates
    }
}

/// Evaluate one template, turning a panic into a template error
fn evaluate(template: &dyn InsightTemplate, input: &TemplateInput<'_>) -> Result<Option<InsightCandidate>> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if template.condition(input) {
            template.generate(input).map(Some)
        } else {
            Ok(None)
        }
    }));

    match outcome {
        Ok(result) => result.map_err(|e| match e {
            Error::TemplateEvaluation { .. } => e,
            other => Error::TemplateEvaluation {
                template: template.id().to_string(),
                reason: other.to_string(),
            },
        }),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "template panicked".to_string());
            Err(Error::TemplateEvaluation {
                template: template.id().to_string(),
                reason,
            })
        }
    }
}
