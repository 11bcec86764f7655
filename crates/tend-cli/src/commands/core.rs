//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `build_service` - Wire the insight service the way every command needs it
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Database, cache and backend status

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tend_core::ai::AIClient;
use tend_core::config::{default_config_path, EngineConfig};
use tend_core::db::{Database, DB_KEY_ENV};
use tend_core::InsightService;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Insight service backed by `db`, with config overrides and the reasoning
/// backend from the environment
pub fn build_service(db: &Database) -> Result<InsightService> {
    let config = EngineConfig::load().context("Failed to load engine config")?;
    let mut builder = InsightService::builder()
        .store(Arc::new(db.clone()))
        .config(config);
    if let Some(client) = AIClient::from_env() {
        builder = builder.client(client);
    }
    Ok(builder.build())
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Generate insights: tend generate --input context.json");
    println!("  2. Review them later: tend cached --subject <id>");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!();
    println!("📊 Tend Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = std::fs::metadata(db_path) {
            println!("   Size: {:.1} KB", metadata.len() as f64 / 1024.0);
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    let config = EngineConfig::load().context("Failed to load engine config")?;
    match default_config_path() {
        Some(path) if path.exists() => println!("   Config: {} (override)", path.display()),
        _ => println!("   Config: built-in defaults"),
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                let status = db.cache_status(Utc::now(), config.cache.schema_version)?;
                println!();
                println!("   Cached subjects: {}", status.entries);
                println!("   Expired: {}", status.expired);
                println!("   Stale schema: {}", status.stale_schema);
                if let Some(next) = status.next_expiry {
                    println!("   Next expiry: {}", next.format("%Y-%m-%d %H:%M UTC"));
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    if !config.external.enabled {
        println!("   🤖 External reasoning: disabled in config");
    } else if let Some(client) = AIClient::from_env() {
        use tend_core::ai::ReasoningBackend;
        println!("   🤖 External reasoning: {} ({})", client.host(), client.model());
        println!("      Timeout: {}s", config.external.timeout.as_secs());
    } else {
        println!("   💡 External reasoning: not configured (set OLLAMA_HOST)");
    }

    println!();
    Ok(())
}
