//! The append-only journal that proves a migration was applied.
//!
//! Application state is detected from entry subjects alone:
//! `Migration: <NNN-name>` optionally followed by ` (Batch i/N)`.

use super::{MigrationOutcome, MigrationUnit, format_secs};
use crate::primitives::MIGRATION_ENTRY_PREFIX;
use crate::types::NesError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static BATCH_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \(Batch \d+/\d+\)$").expect("valid batch suffix regex"));

/// Durable, append-only, greppable log of applied migrations.
pub trait MigrationJournal {
    /// Paths changed in the working data since the last entry.
    fn changed_paths(&self) -> Result<Vec<String>, NesError>;

    /// Record `paths` under `message` and return the new entry's id.
    fn append_entry(&mut self, message: &str, paths: &[String]) -> Result<String, NesError>;

    /// Subject lines of every entry whose subject starts with `prefix`,
    /// newest first.
    fn list_entries(&self, prefix: &str) -> Result<Vec<String>, NesError>;

    /// Make appended entries visible to other replicas, if there are any.
    fn publish(&mut self) -> Result<(), NesError>;
}

/// Reduce journal subjects to the set of applied unit names.
///
/// Batch suffixes are stripped, so a unit committed in several batches
/// counts once. Subjects without the migration tag are ignored.
pub fn parse_applied<I, T>(subjects: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    subjects
        .into_iter()
        .filter_map(|subject| {
            let first_line = subject.as_ref().lines().next()?.trim_end();
            let rest = first_line.strip_prefix(MIGRATION_ENTRY_PREFIX)?;
            let name = BATCH_SUFFIX_RE.replace(rest, "");
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Build the full journal message for a completed run.
///
/// `batch` is `(index, total)`, 1-based.
pub fn format_commit_message(
    unit: &MigrationUnit,
    outcome: &MigrationOutcome,
    batch: Option<(usize, usize)>,
) -> String {
    let mut title = format!("{}{}", MIGRATION_ENTRY_PREFIX, unit.full_name());
    if let Some((index, total)) = batch {
        title.push_str(&format!(" (Batch {}/{})", index, total));
    }
    format!(
        "{}\n\n{}\n\nAuthor: {}\nDate: {}\nEntities created: {}\nRelationships created: {}\nDuration: {}s",
        title,
        unit.description,
        unit.author,
        unit.date.format("%Y-%m-%d"),
        outcome.entities_created,
        outcome.relationships_created,
        format_secs(outcome.duration)
    )
}

// =============================================================================
// IN-MEMORY JOURNAL
// =============================================================================

/// Journal kept in process memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Vec<(String, String, Vec<String>)>,
    pending: BTreeSet<String>,
    unreachable: bool,
    publishes: usize,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `path` was modified in the working data.
    pub fn mark_changed(&mut self, path: impl Into<String>) {
        self.pending.insert(path.into());
    }

    /// Make every subsequent call fail with `JournalError`.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// `(id, message)` of every entry, oldest first.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|(id, message, _)| (id.as_str(), message.as_str()))
            .collect()
    }

    /// Paths recorded by the entry with `id`.
    pub fn paths_of(&self, id: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(entry_id, _, _)| entry_id == id)
            .map(|(_, _, paths)| paths.as_slice())
    }

    pub fn publish_count(&self) -> usize {
        self.publishes
    }

    fn check_reachable(&self) -> Result<(), NesError> {
        if self.unreachable {
            return Err(NesError::JournalError("journal is unreachable".to_string()));
        }
        Ok(())
    }
}

impl MigrationJournal for MemoryJournal {
    fn changed_paths(&self) -> Result<Vec<String>, NesError> {
        self.check_reachable()?;
        Ok(self.pending.iter().cloned().collect())
    }

    fn append_entry(&mut self, message: &str, paths: &[String]) -> Result<String, NesError> {
        self.check_reachable()?;
        for path in paths {
            self.pending.remove(path);
        }
        let id = format!("mem-{}", self.entries.len() + 1);
        self.entries.push((id.clone(), message.to_string(), paths.to_vec()));
        Ok(id)
    }

    fn list_entries(&self, prefix: &str) -> Result<Vec<String>, NesError> {
        self.check_reachable()?;
        Ok(self
            .entries
            .iter()
            .rev()
            .filter_map(|(_, message, _)| message.lines().next())
            .filter(|subject| subject.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    fn publish(&mut self) -> Result<(), NesError> {
        self.check_reachable()?;
        self.publishes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationStatus;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::time::Duration;

    fn unit() -> MigrationUnit {
        MigrationUnit {
            prefix: 0,
            name: "initial-locations".to_string(),
            dir: PathBuf::from("migrations/000-initial-locations"),
            readme: None,
            author: "jane".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
            description: "Seed provinces and districts".to_string(),
            entry: "seed-records".to_string(),
        }
    }

    #[test]
    fn batches_collapse_to_one_name() {
        let applied = parse_applied([
            "Migration: 000-initial-locations (Batch 1/3)",
            "Migration: 000-initial-locations (Batch 2/3)",
            "Migration: 000-initial-locations (Batch 3/3)",
        ]);
        assert_eq!(applied.len(), 1);
        assert!(applied.contains("000-initial-locations"));
    }

    #[test]
    fn unrelated_subjects_are_ignored() {
        let applied = parse_applied([
            "Fix typo in README",
            "Migration: 001-parties",
            "Migration:",
            "migration: 002-lowercase-tag",
        ]);
        assert_eq!(applied.into_iter().collect::<Vec<_>>(), vec!["001-parties"]);
    }

    #[test]
    fn message_layout() {
        let mut outcome = MigrationOutcome::new(&unit(), MigrationStatus::Completed);
        outcome.entities_created = 7;
        outcome.relationships_created = 2;
        outcome.duration = Duration::from_millis(1_500);

        let message = format_commit_message(&unit(), &outcome, None);
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines[0], "Migration: 000-initial-locations");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Seed provinces and districts");
        assert!(lines.contains(&"Author: jane"));
        assert!(lines.contains(&"Date: 2024-01-15"));
        assert!(lines.contains(&"Entities created: 7"));
        assert!(lines.contains(&"Relationships created: 2"));
        assert!(lines.contains(&"Duration: 1.5s"));

        let batched = format_commit_message(&unit(), &outcome, Some((2, 3)));
        assert!(batched.starts_with("Migration: 000-initial-locations (Batch 2/3)\n"));
        assert_eq!(parse_applied([batched]).len(), 1);
    }

    #[test]
    fn memory_journal_tracks_paths() {
        let mut journal = MemoryJournal::new();
        journal.mark_changed("entity/person/abc.json");
        journal.mark_changed("version/entity/person/abc/1.json");
        let paths = journal.changed_paths().expect("paths");
        assert_eq!(paths.len(), 2);

        let id = journal.append_entry("Migration: 000-x\n\nbody", &paths).expect("append");
        assert_eq!(id, "mem-1");
        assert!(journal.changed_paths().expect("paths").is_empty());
        assert_eq!(journal.paths_of(&id).map(<[String]>::len), Some(2));
        assert_eq!(
            journal.list_entries(MIGRATION_ENTRY_PREFIX).expect("list"),
            vec!["Migration: 000-x"]
        );

        journal.set_unreachable(true);
        assert!(matches!(journal.list_entries(""), Err(NesError::JournalError(_))));
    }
}
