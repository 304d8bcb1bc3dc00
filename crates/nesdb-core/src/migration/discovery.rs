//! Unit discovery and static metadata inspection.
//!
//! Discovery never runs unit code: metadata is plain TOML data.

use super::MigrationUnit;
use super::procedure::SEED_RECORDS_PROCEDURE;
use crate::primitives::{
    MIGRATION_METADATA_FILE, MIGRATION_README_FILE, SEED_RECORDS_FILE, split_migration_name,
};
use crate::types::NesError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Result of checking a folder name against the `NNN-name` convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameCheck {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl NameCheck {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a migration folder name.
///
/// Errors make the folder undiscoverable; warnings are logged only.
#[must_use]
pub fn check_name(folder: &str) -> NameCheck {
    let mut check = NameCheck::default();
    match split_migration_name(folder) {
        Some((_, name)) => {
            let len = name.chars().count();
            if len < 3 {
                check
                    .warnings
                    .push(format!("migration name '{}' is very short", name));
            }
            if len > 50 {
                check.warnings.push(format!(
                    "migration name '{}' is very long ({} characters)",
                    name, len
                ));
            }
        }
        None => {
            check.errors.push(format!(
                "'{}' does not match NNN-descriptive-name (e.g. 000-initial-locations)",
                folder
            ));
            let prefix: String = folder.chars().take(3).collect();
            if prefix.len() != 3 || !prefix.chars().all(|c| c.is_ascii_digit()) {
                check
                    .errors
                    .push("name must start with a 3-digit numeric prefix (000-999)".to_string());
            }
            if folder.contains(['_', ' ', '\t']) {
                check
                    .errors
                    .push("use hyphens, not underscores or spaces".to_string());
            }
            if folder.chars().any(|c| c.is_ascii_uppercase()) {
                check
                    .warnings
                    .push("use lowercase letters only".to_string());
            }
        }
    }
    check
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitMetadata {
    author: String,
    /// `YYYY-MM-DD`, quoted or as a bare TOML date.
    date: toml::Value,
    description: String,
    #[serde(default)]
    entry: Option<String>,
}

fn parse_date(value: &toml::Value) -> Result<NaiveDate, NesError> {
    let text = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Datetime(d) => d.to_string(),
        other => {
            return Err(NesError::ValidationError(format!(
                "date must be YYYY-MM-DD, got a {}",
                other.type_str()
            )));
        }
    };
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| NesError::ValidationError(format!("date '{}' is not YYYY-MM-DD: {}", text, e)))
}

/// Load a single unit directory, validating its name and metadata.
pub fn load_unit(dir: &Path) -> Result<MigrationUnit, NesError> {
    let folder = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| NesError::ValidationError(format!("bad unit path {}", dir.display())))?;
    let (prefix, name) = split_migration_name(folder).ok_or_else(|| {
        NesError::ValidationError(check_name(folder).errors.join("; "))
    })?;

    let metadata_path = dir.join(MIGRATION_METADATA_FILE);
    let text = fs::read_to_string(&metadata_path).map_err(|e| {
        NesError::IoError(format!("cannot read {}: {}", metadata_path.display(), e))
    })?;
    let metadata: UnitMetadata =
        toml::from_str(&text).map_err(|e| NesError::SerializationError(e.to_string()))?;

    let mut missing = Vec::new();
    if metadata.author.trim().is_empty() {
        missing.push("author");
    }
    if metadata.description.trim().is_empty() {
        missing.push("description");
    }
    if !missing.is_empty() {
        return Err(NesError::ValidationError(format!(
            "{} is missing required metadata: {}",
            folder,
            missing.join(", ")
        )));
    }

    let entry = metadata
        .entry
        .unwrap_or_else(|| SEED_RECORDS_PROCEDURE.to_string());
    if entry == SEED_RECORDS_PROCEDURE && !dir.join(SEED_RECORDS_FILE).is_file() {
        return Err(NesError::ValidationError(format!(
            "{} uses {} but has no {}",
            folder, SEED_RECORDS_PROCEDURE, SEED_RECORDS_FILE
        )));
    }

    let readme = dir.join(MIGRATION_README_FILE);
    Ok(MigrationUnit {
        prefix,
        name: name.to_string(),
        dir: dir.to_path_buf(),
        readme: readme.is_file().then_some(readme),
        author: metadata.author.trim().to_string(),
        date: parse_date(&metadata.date)?,
        description: metadata.description.trim().to_string(),
        entry,
    })
}

/// Scan `root` for migration units, sorted by prefix.
///
/// Invalid folders are skipped with a warning; a missing root yields no units.
pub fn discover(root: &Path) -> Result<Vec<MigrationUnit>, NesError> {
    if !root.is_dir() {
        tracing::warn!("Migrations directory does not exist: {}", root.display());
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(root)
        .map_err(|e| NesError::IoError(format!("cannot read {}: {}", root.display(), e)))?;

    let mut units = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| NesError::IoError(e.to_string()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let folder = entry.file_name().to_string_lossy().into_owned();
        if folder.starts_with('.') {
            continue;
        }

        let check = check_name(&folder);
        for warning in &check.warnings {
            tracing::warn!("Migration folder '{}': {}", folder, warning);
        }
        if !check.is_valid() {
            tracing::warn!(
                "Skipping invalid migration folder '{}': {}",
                folder,
                check.errors.join("; ")
            );
            continue;
        }

        match load_unit(&path) {
            Ok(unit) => {
                tracing::debug!("Discovered migration {}", unit);
                units.push(unit);
            }
            Err(e) => tracing::warn!("Skipping migration folder '{}': {}", folder, e),
        }
    }

    units.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.name.cmp(&b.name)));
    for pair in units.windows(2) {
        if pair[0].prefix == pair[1].prefix {
            tracing::warn!("Migrations {} and {} share a prefix", pair[0], pair[1]);
        }
    }
    tracing::info!("Discovered {} migrations in {}", units.len(), root.display());
    Ok(units)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_unit(root: &Path, folder: &str, metadata: &str, with_records: bool) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MIGRATION_METADATA_FILE), metadata).unwrap();
        if with_records {
            fs::write(dir.join(SEED_RECORDS_FILE), "{}").unwrap();
        }
    }

    const META: &str = "author = \"jane\"\ndate = \"2024-01-15\"\ndescription = \"Seed\"\n";

    #[test]
    fn name_checks() {
        assert!(check_name("000-initial-locations").is_valid());
        assert!(check_name("000-initial-locations").warnings.is_empty());

        let short = check_name("001-ab");
        assert!(short.is_valid());
        assert_eq!(short.warnings.len(), 1);

        let long = check_name(&format!("002-{}", "a".repeat(51)));
        assert!(long.is_valid());
        assert_eq!(long.warnings.len(), 1);

        let underscores = check_name("003_bad_name");
        assert!(!underscores.is_valid());
        assert!(underscores.errors.iter().any(|e| e.contains("underscores")));

        let no_prefix = check_name("initial-locations");
        assert!(no_prefix.errors.iter().any(|e| e.contains("3-digit")));

        let upper = check_name("004-Upper");
        assert!(!upper.is_valid());
        assert_eq!(upper.warnings.len(), 1);

        assert!(!check_name("0001-too-long-prefix").is_valid());
    }

    #[test]
    fn discover_sorts_and_skips_invalid_units() {
        let root = tempdir().unwrap();
        write_unit(root.path(), "002-second", META, true);
        write_unit(root.path(), "000-first", META, true);
        write_unit(root.path(), "001_bad", META, true);
        write_unit(root.path(), "003-no-records", META, false);
        write_unit(root.path(), "004-no-author", "date = \"2024-01-15\"\ndescription = \"x\"\n", true);
        write_unit(
            root.path(),
            "005-bare-date",
            "author = \"jane\"\ndate = 2024-02-01\ndescription = \"x\"\n",
            true,
        );
        write_unit(
            root.path(),
            "006-custom-entry",
            "author = \"jane\"\ndate = \"2024-02-01\"\ndescription = \"x\"\nentry = \"custom\"\n",
            false,
        );
        fs::write(root.path().join("notes.txt"), "not a unit").unwrap();

        let units = discover(root.path()).unwrap();
        let names: Vec<String> = units.iter().map(MigrationUnit::full_name).collect();
        assert_eq!(
            names,
            vec!["000-first", "002-second", "005-bare-date", "006-custom-entry"]
        );
        assert_eq!(units[2].date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(units[0].entry, SEED_RECORDS_PROCEDURE);
        assert_eq!(units[3].entry, "custom");
    }

    #[test]
    fn missing_root_is_empty() {
        let root = tempdir().unwrap();
        assert!(discover(&root.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn readme_is_optional() {
        let root = tempdir().unwrap();
        write_unit(root.path(), "000-first", META, true);
        fs::write(root.path().join("000-first").join(MIGRATION_README_FILE), "# First").unwrap();
        let unit = load_unit(&root.path().join("000-first")).unwrap();
        assert!(unit.readme.is_some());
        assert_eq!(unit.author, "jane");
    }
}
