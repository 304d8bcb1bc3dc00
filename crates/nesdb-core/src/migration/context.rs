//! Services handed to a running migration procedure.

use super::MigrationUnit;
use crate::publisher::VersionedPublisher;
use crate::storage::{EntityQuery, RecordStore};
use crate::types::{Entity, NesError};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Everything a procedure may touch while it runs.
///
/// File helpers are confined to the unit's own directory.
pub struct MigrationContext<'a, S: RecordStore> {
    publisher: &'a mut VersionedPublisher<S>,
    unit: &'a MigrationUnit,
    author_id: String,
    logs: Vec<String>,
}

impl<'a, S: RecordStore> MigrationContext<'a, S> {
    pub(crate) fn new(
        publisher: &'a mut VersionedPublisher<S>,
        unit: &'a MigrationUnit,
        author_id: String,
    ) -> Self {
        Self {
            publisher,
            unit,
            author_id,
            logs: Vec::new(),
        }
    }

    pub fn publisher(&mut self) -> &mut VersionedPublisher<S> {
        &mut *self.publisher
    }

    /// Raw read access to the store.
    pub fn store(&self) -> &S {
        self.publisher.store()
    }

    pub fn search(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError> {
        self.publisher.store().search_entities(query)
    }

    pub fn unit(&self) -> &MigrationUnit {
        self.unit
    }

    pub fn dir(&self) -> &Path {
        &self.unit.dir
    }

    /// Author id every write of this unit should be attributed to.
    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    /// Record a line in the unit's outcome and emit it as an event.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[{}] {}", self.unit.full_name(), message);
        self.logs.push(message);
    }

    pub fn read_text(&self, relative: impl AsRef<Path>) -> Result<String, NesError> {
        let path = self.resolve(relative.as_ref())?;
        fs::read_to_string(&path)
            .map_err(|e| NesError::IoError(format!("cannot read {}: {}", path.display(), e)))
    }

    pub fn read_json<T: DeserializeOwned>(&self, relative: impl AsRef<Path>) -> Result<T, NesError> {
        let text = self.read_text(relative.as_ref())?;
        serde_json::from_str(&text).map_err(|e| {
            NesError::SerializationError(format!("{}: {}", relative.as_ref().display(), e))
        })
    }

    pub(crate) fn into_logs(self) -> Vec<String> {
        self.logs
    }

    fn resolve(&self, relative: &Path) -> Result<PathBuf, NesError> {
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(NesError::ValidationError(format!(
                "{} escapes the migration directory",
                relative.display()
            )));
        }
        Ok(self.unit.dir.join(relative))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::FileStore;
    use chrono::NaiveDate;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize)]
    struct Seats {
        seats: u32,
    }

    #[test]
    fn file_helpers_stay_inside_the_unit() {
        let data = tempdir().unwrap();
        let unit_dir = tempdir().unwrap();
        fs::write(unit_dir.path().join("seats.json"), r#"{"seats": 275}"#).unwrap();
        fs::create_dir_all(unit_dir.path().join("data")).unwrap();
        fs::write(unit_dir.path().join("data/notes.txt"), "hello").unwrap();

        let unit = MigrationUnit {
            prefix: 1,
            name: "seats".to_string(),
            dir: unit_dir.path().to_path_buf(),
            readme: None,
            author: "jane".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            description: "Seats".to_string(),
            entry: "custom".to_string(),
        };
        let mut publisher = VersionedPublisher::new(FileStore::open(data.path()).unwrap());
        let mut ctx = MigrationContext::new(&mut publisher, &unit, "migration-001-seats".to_string());

        let seats: Seats = ctx.read_json("seats.json").unwrap();
        assert_eq!(seats.seats, 275);
        assert_eq!(ctx.read_text("./data/notes.txt").unwrap(), "hello");
        assert!(matches!(ctx.read_text("../seats.json"), Err(NesError::ValidationError(_))));
        assert!(matches!(ctx.read_text("/etc/passwd"), Err(NesError::ValidationError(_))));
        assert!(matches!(ctx.read_text("missing.txt"), Err(NesError::IoError(_))));

        ctx.log("loaded seats");
        assert_eq!(ctx.author_id(), "migration-001-seats");
        assert_eq!(ctx.store().entity_count().unwrap(), 0);
        assert_eq!(ctx.into_logs(), vec!["loaded seats"]);
    }
}
