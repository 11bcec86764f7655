//! Cache commands (cached, shown, feedback, invalidate, sweep)

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tend_core::db::Database;
use tend_core::models::Feedback;

use super::{build_service, print_insights};

pub async fn cmd_cached(db: &Database, subject: &str, json: bool) -> Result<()> {
    let service = build_service(db)?;
    let insights = service.get_cached(subject).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
        return Ok(());
    }

    println!("📦 Cached insights for {}", subject);
    print_insights(&insights);
    Ok(())
}

pub async fn cmd_shown(db: &Database, subject: &str, id: &str) -> Result<()> {
    let service = build_service(db)?;
    let insight = service
        .mark_shown(subject, id)
        .await
        .with_context(|| format!("Failed to mark insight {} as shown", id))?;
    println!("👀 Marked \"{}\" as shown", insight.title);
    Ok(())
}

pub async fn cmd_feedback(db: &Database, subject: &str, id: &str, value: &str) -> Result<()> {
    let feedback: Feedback = value.parse().map_err(|e: String| anyhow!(e))?;
    let service = build_service(db)?;
    let insight = service
        .record_feedback(subject, id, feedback)
        .await
        .with_context(|| format!("Failed to record feedback for insight {}", id))?;
    println!("📝 Recorded {} for \"{}\"", feedback, insight.title);
    Ok(())
}

pub async fn cmd_invalidate(db: &Database, subject: &str) -> Result<()> {
    let service = build_service(db)?;
    if service.invalidate(subject).await? {
        println!("🗑️  Discarded cached insights for {}", subject);
    } else {
        println!("   No cached insights for {}", subject);
    }
    Ok(())
}

pub fn cmd_sweep(db: &Database) -> Result<()> {
    let service = build_service(db)?;
    let report = service.cache().sweep().context("Cache sweep failed")?;

    println!("🧹 Cache sweep");
    println!("   Scanned: {}", report.scanned);
    println!("   Purged: {}", report.purged);
    if report.failed > 0 {
        println!("   ⚠️  Failed: {} (will retry next sweep)", report.failed);
    }
    Ok(())
}

/// Sweep period: TEND_SWEEP_INTERVAL seconds if set and positive, else `fallback`
pub fn sweep_interval(fallback: Duration) -> Duration {
    std::env::var("TEND_SWEEP_INTERVAL")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

pub async fn cmd_sweep_watch(db: &Database) -> Result<()> {
    let service = build_service(db)?;
    let period = sweep_interval(service.config().cache.sweep_interval);

    println!("🧹 Sweeping every {}s (Ctrl-C to stop)", period.as_secs());
    let handle = tend_core::cache::spawn_sweeper(service.cache().clone(), period);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.abort();
    println!("   Stopped");
    Ok(())
}
