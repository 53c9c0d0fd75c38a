//! # weft CLI Module
//!
//! ## Available Commands
//!
//! - `ingest` - Run the ingestion pipeline over the configured sources
//! - `search` - Semantic search (optionally reranked)
//! - `stats` - Store and graph statistics
//! - `pillars` - Highest-degree nodes
//! - `candidates` - Structurally implied missing links
//! - `communities` - Community partition of the graph
//! - `squash` - Merge a directory of extraction sidecars
//! - `prune` - Remove a node and its edges
//! - `checkpoint` - Compact the store file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use weft_core::WeftError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// weft - graph + vector knowledge store
#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to weft.toml (default: ./weft.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest every configured source root
    Ingest,

    /// Find the nodes most similar to a query
    Search {
        /// Query text
        query: String,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        k: usize,

        /// Skip the reranker even when one is configured
        #[arg(long)]
        no_rerank: bool,
    },

    /// Show store and graph statistics
    Stats,

    /// List the highest-degree nodes
    Pillars {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// List likely missing links (Adamic-Adar)
    Candidates {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show the community partition
    Communities,

    /// Merge extraction sidecars (`*.json`) found under a directory
    Squash {
        /// Directory mirroring source paths (`a.md.ember.json` belongs to `a.md`)
        dir: PathBuf,
    },

    /// Remove a node, its vector and every incident edge
    Prune {
        id: String,
    },

    /// Compact the store file
    Checkpoint,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), WeftError> {
    let ws = crate::settings::Workspace::load(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Some(Commands::Ingest) => cmd_ingest(&ws, json),
        Some(Commands::Search {
            query,
            k,
            no_rerank,
        }) => cmd_search(&ws, json, &query, k, !no_rerank),
        Some(Commands::Stats) | None => cmd_stats(&ws, json),
        Some(Commands::Pillars { limit }) => cmd_pillars(&ws, json, limit),
        Some(Commands::Candidates { limit }) => cmd_candidates(&ws, json, limit),
        Some(Commands::Communities) => cmd_communities(&ws, json),
        Some(Commands::Squash { dir }) => cmd_squash(&ws, json, &dir),
        Some(Commands::Prune { id }) => cmd_prune(&ws, json, &id),
        Some(Commands::Checkpoint) => cmd_checkpoint(&ws, json),
    }
}
