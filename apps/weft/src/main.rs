//! # weft
//!
//! Command-line front end for a weft knowledge base.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/weft (THE BINARY)                  │
//! │                                                          │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────┐  │
//! │  │    CLI      │   │   Settings   │   │   Services    │  │
//! │  │   (clap)    │   │ (weft.toml)  │   │  (reqwest)    │  │
//! │  └──────┬──────┘   └──────┬───────┘   └───────┬───────┘  │
//! │         └─────────────────┼───────────────────┘          │
//! │                           ▼                              │
//! │                   ┌───────────────┐                      │
//! │                   │   weft-core   │                      │
//! │                   │ (THE ENGINE)  │                      │
//! │                   └───────────────┘                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! weft ingest
//! weft search "circular reasoning" -k 5
//! weft --json communities
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weft::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // WEFT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("WEFT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_env("WEFT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "weft=info,weft_core=info".into());

    // Logs go to stderr so that --json output on stdout stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}
