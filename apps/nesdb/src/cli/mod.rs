//! # nesdb CLI Module
//!
//! ## Available Commands
//!
//! - `list` - List discovered migrations and whether they are applied
//! - `pending` - List migrations not yet applied
//! - `run` - Run one migration, or every pending one with `--all`
//! - `create` - Scaffold a new migration unit
//! - `show` - Print an entity or relationship
//! - `versions` - Print the version history of an entity or relationship
//! - `search` - Free-text entity search
//! - `traverse` - Breadth-first traversal from an entity
//! - `path` - Shortest outgoing path between two entities
//! - `export` - Render an entity's neighborhood as DOT, Mermaid or JSON
//! - `integrity` - Cycle, duplicate and orphan report
//! - `reindex` - Rebuild the by-type index

mod commands;

use clap::{Parser, Subcommand};
use nesdb_core::{NesConfig, NesError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// nesdb - versioned civic entity graph
///
/// Manages the entity/relationship dataset and the migrations that evolve it.
#[derive(Parser, Debug)]
#[command(name = "nesdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (default: ./nesdb.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root of the record tree
    #[arg(short = 'D', long, global = true)]
    pub data_root: Option<PathBuf>,

    /// Directory holding migration units
    #[arg(short = 'M', long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List discovered migrations
    List,

    /// List migrations not yet applied
    Pending,

    /// Run migrations
    Run {
        /// Migration to run, e.g. 003-party-seats
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Run every pending migration in order
        #[arg(long)]
        all: bool,

        /// Execute without committing to the journal
        #[arg(long)]
        dry_run: bool,

        /// Re-run even if already applied (ignored with --all)
        #[arg(long)]
        force: bool,

        /// Leave changes uncommitted
        #[arg(long)]
        no_commit: bool,

        /// Keep going after a failed migration (with --all)
        #[arg(long)]
        continue_on_failure: bool,
    },

    /// Scaffold a new migration unit
    Create {
        /// Descriptive name, e.g. party-seats
        name: String,

        /// Author recorded in migration.toml
        #[arg(short, long)]
        author: String,

        /// One-line description (default: derived from the name)
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show an entity or relationship
    Show {
        /// entity:... or relationship:... id
        id: String,
    },

    /// Show the version history of an entity or relationship
    Versions {
        /// entity:... or relationship:... id
        id: String,
    },

    /// Search entities by name
    Search {
        /// Text matched against every name variant
        text: String,

        /// Entity kind (person, organization, location)
        #[arg(short, long)]
        kind: Option<String>,

        /// Entity sub-kind (e.g. political_party, district)
        #[arg(short, long)]
        sub_kind: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Traverse relationships from an entity
    Traverse {
        /// Start entity id
        id: String,

        /// out, in or both
        #[arg(long, default_value = "both")]
        direction: String,

        /// Maximum depth (unbounded when omitted)
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Shortest path between two entities along outgoing edges
    Path {
        source: String,
        target: String,

        /// Maximum number of edges
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Export an entity's neighborhood
    Export {
        /// Center entity id
        id: String,

        /// dot, mermaid or json
        #[arg(short = 't', long, default_value = "dot")]
        format: String,

        /// Neighborhood depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report hierarchy cycles, duplicate and orphaned relationships
    Integrity {
        /// Restrict cycle search to one relationship kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Rebuild the by-type index
    Reindex,
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Config file, then environment, then command-line flags.
pub fn resolve_config(cli: &Cli) -> Result<NesConfig, NesError> {
    let mut config = NesConfig::load(cli.config.as_deref())?;
    apply_flags(&mut config, cli);
    Ok(config)
}

/// Overlay the global path flags onto an already loaded config.
pub fn apply_flags(config: &mut NesConfig, cli: &Cli) {
    if let Some(root) = &cli.data_root {
        config.data_root = root.clone();
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migrations_dir = dir.clone();
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), NesError> {
    let config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::List => cmd_list(&config, json_mode),
        Commands::Pending => cmd_pending(&config, json_mode),
        Commands::Run {
            name,
            all,
            dry_run,
            force,
            no_commit,
            continue_on_failure,
        } => cmd_run(
            &config,
            json_mode,
            name.as_deref(),
            RunFlags {
                all,
                dry_run,
                force,
                no_commit,
                continue_on_failure,
            },
        ),
        Commands::Create {
            name,
            author,
            description,
        } => cmd_create(&config, json_mode, &name, &author, description.as_deref()),
        Commands::Show { id } => cmd_show(&config, json_mode, &id),
        Commands::Versions { id } => cmd_versions(&config, json_mode, &id),
        Commands::Search {
            text,
            kind,
            sub_kind,
            limit,
        } => cmd_search(&config, json_mode, &text, kind.as_deref(), sub_kind.as_deref(), limit),
        Commands::Traverse {
            id,
            direction,
            depth,
        } => cmd_traverse(&config, json_mode, &id, &direction, depth),
        Commands::Path {
            source,
            target,
            depth,
        } => cmd_path(&config, json_mode, &source, &target, depth),
        Commands::Export {
            id,
            format,
            depth,
            output,
        } => cmd_export(&config, &id, &format, depth, output.as_deref()),
        Commands::Integrity { kind } => cmd_integrity(&config, json_mode, kind.as_deref()),
        Commands::Reindex => cmd_reindex(&config, json_mode),
    }
}
