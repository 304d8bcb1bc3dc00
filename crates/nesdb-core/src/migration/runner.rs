//! Discovery, applied-state tracking and sequential execution of units.

use super::context::MigrationContext;
use super::journal::{MigrationJournal, format_commit_message, parse_applied};
use super::procedure::ProcedureRegistry;
use super::{MigrationOutcome, MigrationStatus, MigrationUnit, RunOptions, discovery, scaffold};
use crate::config::NesConfig;
use crate::primitives::{DEFAULT_COMMIT_BATCH_SIZE, MIGRATION_ENTRY_PREFIX};
use crate::publisher::VersionedPublisher;
use crate::storage::RecordStore;
use crate::types::NesError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Totals over a list of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entities_created: usize,
    pub relationships_created: usize,
}

impl RunSummary {
    pub fn of(outcomes: &[MigrationOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome.status {
                MigrationStatus::Completed => summary.completed += 1,
                MigrationStatus::Skipped => summary.skipped += 1,
                MigrationStatus::Failed => summary.failed += 1,
            }
            summary.entities_created += outcome.entities_created;
            summary.relationships_created += outcome.relationships_created;
            summary
        })
    }
}

/// Runs migration units against a publisher and records them in a journal.
pub struct MigrationEngine<S: RecordStore, J: MigrationJournal> {
    migrations_dir: PathBuf,
    publisher: VersionedPublisher<S>,
    journal: J,
    registry: ProcedureRegistry<S>,
    /// Applied unit names. `None` until the journal has been read successfully.
    applied_cache: Option<BTreeSet<String>>,
    commit_batch_size: usize,
    author_prefix: String,
}

impl<S: RecordStore, J: MigrationJournal> std::fmt::Debug for MigrationEngine<S, J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("migrations_dir", &self.migrations_dir)
            .field("registry", &self.registry)
            .field("applied_cache", &self.applied_cache)
            .field("commit_batch_size", &self.commit_batch_size)
            .field("author_prefix", &self.author_prefix)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore, J: MigrationJournal> MigrationEngine<S, J> {
    pub fn new(migrations_dir: impl AsRef<Path>, publisher: VersionedPublisher<S>, journal: J) -> Self {
        Self {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
            publisher,
            journal,
            registry: ProcedureRegistry::with_builtins(),
            applied_cache: None,
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            author_prefix: "migration".to_string(),
        }
    }

    /// `new` with batch size and author prefix taken from `config`.
    pub fn from_config(config: &NesConfig, publisher: VersionedPublisher<S>, journal: J) -> Self {
        Self::new(&config.migrations_dir, publisher, journal)
            .with_commit_batch_size(config.commit_batch_size)
            .with_author_prefix(config.author_prefix.clone())
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ProcedureRegistry<S>) -> Self {
        self.registry = registry;
        self
    }

    /// Zero is treated as one.
    #[must_use]
    pub fn with_commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_author_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.author_prefix = prefix.into();
        self
    }

    pub fn publisher(&self) -> &VersionedPublisher<S> {
        &self.publisher
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    pub fn registry_mut(&mut self) -> &mut ProcedureRegistry<S> {
        &mut self.registry
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    // =========================================================================
    // STATE
    // =========================================================================

    pub fn discover(&self) -> Result<Vec<MigrationUnit>, NesError> {
        discovery::discover(&self.migrations_dir)
    }

    /// Names of units the journal records as applied.
    ///
    /// Cached until `invalidate`. A journal failure is logged and reads as
    /// "nothing applied"; it is not cached, so the next call asks again.
    pub fn applied(&mut self) -> BTreeSet<String> {
        if let Some(applied) = &self.applied_cache {
            return applied.clone();
        }
        match self.journal.list_entries(MIGRATION_ENTRY_PREFIX) {
            Ok(subjects) => {
                let applied = parse_applied(subjects);
                tracing::debug!("Journal lists {} applied migrations", applied.len());
                self.applied_cache = Some(applied.clone());
                applied
            }
            Err(e) => {
                tracing::warn!("Could not read migration journal, assuming nothing applied: {}", e);
                BTreeSet::new()
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.applied_cache = None;
    }

    pub fn is_applied(&mut self, unit: &MigrationUnit) -> bool {
        self.applied().contains(&unit.full_name())
    }

    /// Discovered units not yet applied, in execution order.
    pub fn pending(&mut self) -> Result<Vec<MigrationUnit>, NesError> {
        let applied = self.applied();
        Ok(self
            .discover()?
            .into_iter()
            .filter(|unit| !applied.contains(&unit.full_name()))
            .collect())
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Run one unit. Never returns an error: failures are reported in the
    /// outcome.
    pub fn run(&mut self, unit: &MigrationUnit, options: RunOptions) -> MigrationOutcome {
        if self.is_applied(unit) {
            if !options.force {
                let outcome = MigrationOutcome::new(unit, MigrationStatus::Skipped);
                tracing::info!("{}", outcome);
                return outcome;
            }
            tracing::warn!("Re-running already applied migration {} (forced)", unit);
        }

        tracing::info!("Running migration {}{}", unit, if options.dry_run { " (dry run)" } else { "" });
        let started = Instant::now();
        let mut outcome = MigrationOutcome::new(unit, MigrationStatus::Completed);

        if let Err(e) = self.execute(unit, &mut outcome) {
            outcome.duration = started.elapsed();
            outcome.fail(e);
            tracing::error!("{}", outcome);
            return outcome;
        }
        outcome.duration = started.elapsed();

        if options.auto_commit && !options.dry_run {
            match self.commit(unit, &outcome) {
                Ok(ids) => outcome.entry_ids = ids,
                Err(e) => {
                    outcome.fail(format!("commit failed: {}", e));
                    tracing::error!("{}", outcome);
                    return outcome;
                }
            }
        } else {
            tracing::info!("Changes for {} left uncommitted", unit);
        }

        tracing::info!("{}", outcome);
        outcome
    }

    fn execute(&mut self, unit: &MigrationUnit, outcome: &mut MigrationOutcome) -> Result<(), NesError> {
        let procedure = self.registry.get(&unit.entry).ok_or_else(|| {
            NesError::MigrationFailed(format!("{} names unknown procedure '{}'", unit, unit.entry))
        })?;

        let store = self.publisher.store();
        let entities_before = store.entity_count()?;
        let relationships_before = store.relationship_count()?;

        let author_id = format!("{}-{}", self.author_prefix, unit.full_name());
        let mut ctx = MigrationContext::new(&mut self.publisher, unit, author_id);
        let result = procedure.run(&mut ctx);
        outcome.logs = ctx.into_logs();
        result?;

        let store = self.publisher.store();
        outcome.entities_created = store.entity_count()?.saturating_sub(entities_before);
        outcome.relationships_created = store
            .relationship_count()?
            .saturating_sub(relationships_before);
        Ok(())
    }

    /// Append the journal entries for a completed run and publish them.
    ///
    /// At `commit_batch_size` changed paths or more, paths are split into
    /// `ceil(n / size)` entries tagged `(Batch i/N)`.
    fn commit(&mut self, unit: &MigrationUnit, outcome: &MigrationOutcome) -> Result<Vec<String>, NesError> {
        let paths = self.journal.changed_paths()?;
        if paths.is_empty() {
            tracing::info!("No data changes for {}, recording an empty entry", unit);
        }

        let mut ids = Vec::new();
        let appended = if paths.len() >= self.commit_batch_size {
            let total = paths.len().div_ceil(self.commit_batch_size);
            tracing::info!(
                "Committing {} changed paths in {} batches",
                paths.len(),
                total
            );
            paths
                .chunks(self.commit_batch_size)
                .enumerate()
                .try_for_each(|(i, chunk)| {
                    let message = format_commit_message(unit, outcome, Some((i + 1, total)));
                    ids.push(self.journal.append_entry(&message, chunk)?);
                    Ok::<(), NesError>(())
                })
        } else {
            let message = format_commit_message(unit, outcome, None);
            self.journal
                .append_entry(&message, &paths)
                .map(|id| ids.push(id))
        };
        // Even a partial batch sequence changes what the journal reports.
        self.invalidate();
        appended?;

        self.journal.publish()?;
        Ok(ids)
    }

    /// Run units one after another. `force` is never applied here.
    ///
    /// With `stop_on_failure` the first failed unit ends the run and the
    /// remaining units are not attempted.
    pub fn run_many(
        &mut self,
        units: &[MigrationUnit],
        options: RunOptions,
        stop_on_failure: bool,
    ) -> Vec<MigrationOutcome> {
        let options = RunOptions {
            force: false,
            ..options
        };
        tracing::info!("Running batch of {} migrations", units.len());

        let mut outcomes = Vec::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            tracing::info!("Processing migration {}/{}: {}", i + 1, units.len(), unit);
            let outcome = self.run(unit, options);
            let failed = outcome.status == MigrationStatus::Failed;
            outcomes.push(outcome);
            if failed && stop_on_failure {
                tracing::error!("Stopping batch execution due to failure in {}", unit);
                break;
            }
        }

        let summary = RunSummary::of(&outcomes);
        tracing::info!(
            "Batch execution complete: {} completed, {} skipped, {} failed ({} entities, {} relationships created)",
            summary.completed,
            summary.skipped,
            summary.failed,
            summary.entities_created,
            summary.relationships_created
        );
        outcomes
    }

    /// Scaffold a new unit in the migrations directory.
    pub fn create(
        &self,
        name: &str,
        author: &str,
        description: &str,
        date: NaiveDate,
    ) -> Result<MigrationUnit, NesError> {
        scaffold::create_unit(&self.migrations_dir, name, author, description, date)
    }
}

// =============================================================================
// TESTS
// =============================================================================
