//! # Migration Engine
//!
//! Evolves the stored dataset through ordered, idempotent migration units.
//!
//! A unit is a directory `NNN-name/` under the migrations root holding a
//! `migration.toml` metadata file, an optional `README.md` and whatever data
//! its entry procedure reads (for the built-in `seed-records` procedure, a
//! `records.json`).
//!
//! ## Lifecycle
//!
//! ```text
//! Discovered ──┬─> Skipped                  (already in the journal, no force)
//!              └─> Running ──┬─> Completed  (journal entry appended)
//!                            └─> Failed     (procedure or commit error)
//! ```
//!
//! The journal is the durable proof of application: a unit counts as applied
//! once an entry whose subject starts with `Migration: <NNN-name>` exists.
//! Units run strictly one after another.

mod context;
mod discovery;
mod git;
mod journal;
mod procedure;
mod runner;
mod scaffold;

pub use context::MigrationContext;
pub use discovery::{NameCheck, check_name, discover, load_unit};
pub use git::GitJournal;
pub use journal::{MemoryJournal, MigrationJournal, format_commit_message, parse_applied};
pub use procedure::{MigrationProcedure, ProcedureRegistry, SEED_RECORDS_PROCEDURE, SeedRecords};
pub use runner::{MigrationEngine, RunSummary};
pub use scaffold::create_unit;

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// UNIT
// =============================================================================

/// A discovered migration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    /// Numeric prefix, 0..=999. Determines execution order.
    pub prefix: u16,
    /// Descriptive part of the folder name, e.g. `initial-locations`.
    pub name: String,
    pub dir: PathBuf,
    pub readme: Option<PathBuf>,
    pub author: String,
    pub date: NaiveDate,
    pub description: String,
    /// Name of the registered procedure to run.
    pub entry: String,
}

impl MigrationUnit {
    /// Canonical identifier, e.g. `000-initial-locations`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{:03}-{}", self.prefix, self.name)
    }
}

impl fmt::Display for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}-{}", self.prefix, self.name)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Completed,
    Skipped,
    Failed,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// What happened when a unit was run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub unit_name: String,
    pub status: MigrationStatus,
    pub duration: Duration,
    /// Net growth of the entity count across the run (never negative).
    pub entities_created: usize,
    pub relationships_created: usize,
    pub logs: Vec<String>,
    pub error: Option<String>,
    /// Journal entries appended for this run, in order.
    pub entry_ids: Vec<String>,
}

impl MigrationOutcome {
    pub(crate) fn new(unit: &MigrationUnit, status: MigrationStatus) -> Self {
        Self {
            unit_name: unit.full_name(),
            status,
            duration: Duration::ZERO,
            entities_created: 0,
            relationships_created: 0,
            logs: Vec::new(),
            error: None,
            entry_ids: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, error: impl fmt::Display) {
        self.status = MigrationStatus::Failed;
        self.error = Some(error.to_string());
    }
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            MigrationStatus::Completed => write!(
                f,
                "Migration {} completed successfully in {}s (created: {} entities, {} relationships)",
                self.unit_name,
                format_secs(self.duration),
                self.entities_created,
                self.relationships_created
            ),
            MigrationStatus::Failed => write!(
                f,
                "Migration {} failed after {}s: {}",
                self.unit_name,
                format_secs(self.duration),
                self.error.as_deref().unwrap_or("unknown error")
            ),
            MigrationStatus::Skipped => {
                write!(f, "Migration {} skipped (already applied)", self.unit_name)
            }
        }
    }
}

/// Seconds with one decimal, e.g. `12.3`. Truncates.
pub(crate) fn format_secs(duration: Duration) -> String {
    let tenths = duration.as_millis() / 100;
    format!("{}.{}", tenths / 10, tenths % 10)
}

/// Flags for a single `MigrationEngine::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Execute the unit but leave the changes uncommitted.
    pub dry_run: bool,
    /// Append journal entries after a successful run.
    pub auto_commit: bool,
    /// Re-run a unit even if the journal says it was applied.
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_commit: true,
            force: false,
        }
    }
}
