//! Creates new, empty migration units.

use super::discovery::{check_name, load_unit};
use super::{MigrationUnit, SEED_RECORDS_PROCEDURE};
use crate::primitives::{
    MIGRATION_METADATA_FILE, MIGRATION_README_FILE, SEED_RECORDS_FILE, split_migration_name,
};
use crate::types::NesError;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

const MAX_PREFIX: u16 = 999;

#[derive(Serialize)]
struct NewMetadata<'a> {
    author: &'a str,
    date: String,
    description: &'a str,
    entry: &'a str,
}

/// Create `<root>/<NNN>-<name>/` with the next free prefix.
///
/// `name` is the descriptive part only (`party-seats`), and must satisfy the
/// same rules discovery applies.
pub fn create_unit(
    root: &Path,
    name: &str,
    author: &str,
    description: &str,
    date: NaiveDate,
) -> Result<MigrationUnit, NesError> {
    if author.trim().is_empty() || description.trim().is_empty() {
        return Err(NesError::ValidationError(
            "author and description are required".to_string(),
        ));
    }

    fs::create_dir_all(root)
        .map_err(|e| NesError::IoError(format!("cannot create {}: {}", root.display(), e)))?;
    let prefix = next_prefix(root)?;
    let folder = format!("{:03}-{}", prefix, name);
    let check = check_name(&folder);
    if !check.is_valid() {
        return Err(NesError::ValidationError(check.errors.join("; ")));
    }

    let dir = root.join(&folder);
    fs::create_dir(&dir)
        .map_err(|e| NesError::IoError(format!("cannot create {}: {}", dir.display(), e)))?;

    let metadata = toml::to_string(&NewMetadata {
        author: author.trim(),
        date: date.format("%Y-%m-%d").to_string(),
        description: description.trim(),
        entry: SEED_RECORDS_PROCEDURE,
    })
    .map_err(|e| NesError::SerializationError(e.to_string()))?;
    write(&dir.join(MIGRATION_METADATA_FILE), &metadata)?;
    write(
        &dir.join(MIGRATION_README_FILE),
        &format!(
            "# {}\n\n{}\n\nRecords to upsert go in `{}`.\n",
            folder,
            description.trim(),
            SEED_RECORDS_FILE
        ),
    )?;
    write(
        &dir.join(SEED_RECORDS_FILE),
        "{\n  \"entities\": [],\n  \"relationships\": []\n}\n",
    )?;

    tracing::info!("Created migration {}", dir.display());
    load_unit(&dir)
}

/// One past the highest prefix in use, counting every `NNN-` directory
/// whether or not it is otherwise valid.
fn next_prefix(root: &Path) -> Result<u16, NesError> {
    let entries = fs::read_dir(root)
        .map_err(|e| NesError::IoError(format!("cannot read {}: {}", root.display(), e)))?;
    let mut highest: Option<u16> = None;
    for entry in entries {
        let entry = entry.map_err(|e| NesError::IoError(e.to_string()))?;
        if !entry.path().is_dir() {
            continue;
        }
        let folder = entry.file_name().to_string_lossy().into_owned();
        let prefix = split_migration_name(&folder).map(|(p, _)| p).or_else(|| {
            folder
                .get(..3)
                .filter(|p| p.chars().all(|c| c.is_ascii_digit()))
                .and_then(|p| p.parse().ok())
        });
        if let Some(prefix) = prefix {
            highest = Some(highest.map_or(prefix, |h| h.max(prefix)));
        }
    }
    match highest {
        None => Ok(0),
        Some(h) if h < MAX_PREFIX => Ok(h + 1),
        Some(_) => Err(NesError::ValidationError(
            "no migration prefixes left (999 in use)".to_string(),
        )),
    }
}

fn write(path: &Path, contents: &str) -> Result<(), NesError> {
    fs::write(path, contents)
        .map_err(|e| NesError::IoError(format!("cannot write {}: {}", path.display(), e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::migration::discover;
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn creates_discoverable_units_in_sequence() {
        let root = tempdir().unwrap();
        let first = create_unit(root.path(), "initial-locations", "jane", "Seed locations", day()).unwrap();
        assert_eq!(first.full_name(), "000-initial-locations");
        assert!(first.readme.is_some());
        assert_eq!(first.date, day());

        fs::create_dir(root.path().join("007_legacy")).unwrap();
        let next = create_unit(root.path(), "party-seats", "jane", "Seats", day()).unwrap();
        assert_eq!(next.full_name(), "008-party-seats");

        let names: Vec<String> = discover(root.path())
            .unwrap()
            .iter()
            .map(MigrationUnit::full_name)
            .collect();
        assert_eq!(names, vec!["000-initial-locations", "008-party-seats"]);
    }

    #[test]
    fn rejects_bad_names_and_missing_metadata() {
        let root = tempdir().unwrap();
        assert!(matches!(
            create_unit(root.path(), "Bad_Name", "jane", "x", day()),
            Err(NesError::ValidationError(_))
        ));
        assert!(matches!(
            create_unit(root.path(), "fine-name", " ", "x", day()),
            Err(NesError::ValidationError(_))
        ));
        assert!(fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[test]
    fn prefixes_run_out_at_999() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("999-last")).unwrap();
        assert!(create_unit(root.path(), "one-more", "jane", "x", day()).is_err());
    }
}
