//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and status, plus shared utilities (open_db, build_service)
//! - `generate` - Insight generation from a context file
//! - `cache` - Cached insights, shown/feedback updates, invalidation, sweep
//! - `detect` - Distortion check and template listing

pub mod cache;
pub mod core;
pub mod detect;
pub mod generate;

// Re-export command functions for main.rs
pub use cache::*;
pub use core::*;
pub use detect::*;
pub use generate::*;

use tend_core::models::InsightCandidate;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable listing shared by `generate` and `cached`
pub fn print_insights(insights: &[InsightCandidate]) {
    if insights.is_empty() {
        println!("   (no insights)");
        return;
    }

    for (index, insight) in insights.iter().enumerate() {
        let marker = match insight.priority {
            tend_core::Priority::Critical => "🚨",
            tend_core::Priority::High => "⚠️ ",
            tend_core::Priority::Medium => "💡",
            tend_core::Priority::Low | tend_core::Priority::Info => "ℹ️ ",
        };
        let shown = if insight.shown { " (shown)" } else { "" };
        println!(
            "   {} {}. [{}/{}] {}{}",
            marker,
            index + 1,
            insight.category,
            insight.priority,
            insight.title,
            shown
        );
        println!("      {}", truncate(&insight.message, 160));
        for step in &insight.advice {
            println!("      - {}", step);
        }
        println!(
            "      id={} source={} confidence={:.2}",
            insight.id, insight.source, insight.confidence
        );
    }
}
