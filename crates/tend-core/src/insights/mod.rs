//! Insight templates - deterministic, rule-based insight generation
//!
//! A pass evaluates every registered template against one normalized
//! `GenerationContext`. Passing templates produce a candidate each; the
//! validity gate and prioritizer then shape the final list.
//!
//! ## Built-in templates
//!
//! - **high_intensity_warning** - strong urges met with little resistance
//! - **distortion_coping** - coping technique for a detected thinking trap
//! - **resistance_progress** - strong resistance in recent records
//! - **peak_hour_trigger** - urges cluster at one hour of day
//! - **dominant_category_pattern** - one behavior dominates the log
//! - **intensity_trend** - intensity rising or easing
//! - **resistance_streak_motivation** - resisted urges in a row
//! - **milestone_celebration** - resisted-urge milestones
//! - **urge_cycle_education** - how urges rise and fall
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tend_core::insights::{TemplateEngine, TemplateInput};
//!
//! let engine = TemplateEngine::new();
//! let input = TemplateInput::new(&ctx, &assessments, &config.ttl, now);
//! let candidates = engine.run(&input, &TracingSink);
//! ```

pub mod behavior;
pub mod engine;
pub mod prioritize;
pub mod validity;
pub mod wellbeing;

pub use engine::{styled, InsightTemplate, TemplateEngine, TemplateInput};
pub use prioritize::{apply_quota, merge_sources, relevance, sort_candidates};
pub use validity::{dedup_batch, similarity, ValidityGate};
