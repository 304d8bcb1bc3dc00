//! # nesdb
//!
//! The command line tool for the versioned civic entity graph.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               apps/nesdb (THE BINARY)        │
//! │                                              │
//! │   ┌──────────────┐      ┌────────────────┐   │
//! │   │  CLI (clap)  │─────▶│  nesdb-core    │   │
//! │   └──────────────┘      │  (THE STORE)   │   │
//! │                         └───────┬────────┘   │
//! │                                 ▼            │
//! │                    data root (git work tree) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! nesdb pending
//! nesdb run --all
//! nesdb run 003-party-seats --force
//! nesdb create party-seats --author jane
//! nesdb traverse entity:location/district/kathmandu --depth 2
//! nesdb export entity:organization/political_party/nepali-congress --format mermaid
//! ```

use clap::Parser;
use nesdb::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // NESDB_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("NESDB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "nesdb=debug,nesdb_core=debug"
    } else if cli.quiet {
        "nesdb=warn,nesdb_core=warn"
    } else {
        "nesdb=info,nesdb_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

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

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
