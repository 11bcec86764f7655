//! Insight generation command

use std::path::Path;

use anyhow::{Context, Result};
use tend_core::db::Database;
use tend_core::models::{GenerationContext, InsightCandidate};

use super::{build_service, print_insights};

/// Read a generation context from a JSON file
pub fn read_context(path: &Path) -> Result<GenerationContext> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid generation context in {}", path.display()))
}

pub async fn cmd_generate(db: &Database, input: &Path, json: bool) -> Result<()> {
    let ctx = read_context(input)?;
    let subject = ctx.subject_id.clone();
    let records = ctx.records.len();

    let service = build_service(db)?;
    let insights = service
        .generate(ctx)
        .await
        .context("Insight generation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
        return Ok(());
    }

    println!("🧭 Insights for {} ({} records)", subject, records);
    print_insights(&insights);
    print_summary(&insights);
    Ok(())
}

fn print_summary(insights: &[InsightCandidate]) {
    let external = insights
        .iter()
        .filter(|i| i.provenance == tend_core::Provenance::ExternalReasoning)
        .count();
    if external > 0 {
        println!();
        println!("   🤖 {} insight(s) from external reasoning", external);
    }
}
