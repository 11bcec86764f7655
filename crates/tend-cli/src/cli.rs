//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tend - Personal insights from your behavioral log
#[derive(Parser)]
#[command(name = "tend")]
#[command(about = "Therapeutic insight generation for behavioral self-tracking", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tend.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for real data)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TEND_DB_KEY environment variable with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Generate insights for a subject from a context file
    Generate {
        /// JSON file with the generation context
        #[arg(short, long)]
        input: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show cached insights for a subject
    Cached {
        #[arg(short, long)]
        subject: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a cached insight as shown
    Shown {
        #[arg(short, long)]
        subject: String,

        /// Insight id
        #[arg(long)]
        id: String,
    },

    /// Record feedback on a cached insight
    Feedback {
        #[arg(short, long)]
        subject: String,

        /// Insight id
        #[arg(long)]
        id: String,

        /// helpful, not_helpful or irrelevant
        #[arg(long)]
        value: String,
    },

    /// Discard a subject's cached insights
    Invalidate {
        #[arg(short, long)]
        subject: String,
    },

    /// Purge expired and stale cache entries
    Sweep {
        /// Keep sweeping periodically until interrupted
        /// (period from TEND_SWEEP_INTERVAL seconds, else config)
        #[arg(long)]
        watch: bool,
    },

    /// Check a message for unhelpful thinking patterns
    Detect {
        /// Message text
        #[arg(short, long)]
        text: String,
    },

    /// List the built-in insight templates
    Templates,

    /// Show database, cache and reasoning backend status
    Status,
}
