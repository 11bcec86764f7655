//! Tend CLI - therapeutic insights from a behavioral log
//!
//! Usage:
//!   tend init                          Initialize database
//!   tend generate --input ctx.json     Generate insights for a subject
//!   tend cached --subject ID           Show cached insights
//!   tend detect --text "..."           Check a message for thinking traps

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Generate { input, json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_generate(&db, &input, json).await
        }
        Commands::Cached { subject, json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_cached(&db, &subject, json).await
        }
        Commands::Shown { subject, id } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_shown(&db, &subject, &id).await
        }
        Commands::Feedback { subject, id, value } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_feedback(&db, &subject, &id, &value).await
        }
        Commands::Invalidate { subject } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_invalidate(&db, &subject).await
        }
        Commands::Sweep { watch } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            if watch {
                commands::cmd_sweep_watch(&db).await
            } else {
                commands::cmd_sweep(&db)
            }
        }
        Commands::Detect { text } => commands::cmd_detect(&text),
        Commands::Templates => commands::cmd_templates(),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
    }
}
