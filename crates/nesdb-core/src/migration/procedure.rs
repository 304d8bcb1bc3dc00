//! Entry procedures and the registry units name them from.

use super::context::MigrationContext;
use crate::storage::RecordStore;
use crate::types::{Entity, EntityDraft, NesError, Relationship, RelationshipDraft};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the built-in procedure used when a unit declares no `entry`.
pub const SEED_RECORDS_PROCEDURE: &str = "seed-records";

/// A unit's entry point. Takes exactly one argument: the context.
pub trait MigrationProcedure<S: RecordStore> {
    fn run(&self, ctx: &mut MigrationContext<'_, S>) -> Result<(), NesError>;
}

impl<S, F> MigrationProcedure<S> for F
where
    S: RecordStore,
    F: Fn(&mut MigrationContext<'_, S>) -> Result<(), NesError>,
{
    fn run(&self, ctx: &mut MigrationContext<'_, S>) -> Result<(), NesError> {
        self(ctx)
    }
}

/// Procedures by name. Resolved when a unit runs, not at discovery.
pub struct ProcedureRegistry<S: RecordStore> {
    procedures: BTreeMap<String, Box<dyn MigrationProcedure<S>>>,
}

impl<S: RecordStore> fmt::Debug for ProcedureRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: RecordStore> Default for ProcedureRegistry<S> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl<S: RecordStore> ProcedureRegistry<S> {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            procedures: BTreeMap::new(),
        }
    }

    /// A registry holding `seed-records`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(SEED_RECORDS_PROCEDURE, SeedRecords);
        registry
    }

    /// Register `procedure` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, procedure: impl MigrationProcedure<S> + 'static) {
        self.procedures.insert(name.into(), Box::new(procedure));
    }

    pub fn get(&self, name: &str) -> Option<&dyn MigrationProcedure<S>> {
        self.procedures.get(name).map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.procedures.keys().map(String::as_str).collect()
    }
}

// =============================================================================
// SEED RECORDS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedFile {
    #[serde(default)]
    entities: Vec<EntityDraft>,
    #[serde(default)]
    relationships: Vec<RelationshipDraft>,
}

#[derive(Debug, Default)]
struct Tally {
    created: usize,
    updated: usize,
    unchanged: usize,
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged",
            self.created, self.updated, self.unchanged
        )
    }
}

/// Upserts the records listed in the unit's `records.json`.
///
/// Records that already match the stored state are left alone, so re-running
/// a unit does not add versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedRecords;

impl<S: RecordStore> MigrationProcedure<S> for SeedRecords {
    fn run(&self, ctx: &mut MigrationContext<'_, S>) -> Result<(), NesError> {
        let seed: SeedFile = ctx.read_json(crate::primitives::SEED_RECORDS_FILE)?;
        let author = ctx.author_id().to_string();
        let description = format!("Applied by migration {}", ctx.unit().full_name());

        let mut entities = Tally::default();
        for draft in seed.entities {
            let existing = ctx.store().get_entity(&draft.id())?;
            match existing {
                None => {
                    ctx.publisher().create_entity(draft, &author, &description)?;
                    entities.created += 1;
                }
                Some(existing) if existing.to_draft() == draft => entities.unchanged += 1,
                Some(existing) => {
                    let entity = Entity::from_draft(draft, existing.version_summary, existing.created_at);
                    ctx.publisher().update_entity(entity, &author, &description)?;
                    entities.updated += 1;
                }
            }
        }

        let mut relationships = Tally::default();
        for draft in seed.relationships {
            let existing = ctx.store().get_relationship(&draft.id())?;
            match existing {
                None => {
                    ctx.publisher().create_relationship(draft, &author, &description)?;
                    relationships.created += 1;
                }
                Some(existing) => {
                    let candidate = Relationship::from_draft(
                        draft,
                        existing.version_summary.clone(),
                        existing.created_at,
                    );
                    if candidate == existing {
                        relationships.unchanged += 1;
                    } else {
                        ctx.publisher().update_relationship(candidate, &author, &description)?;
                        relationships.updated += 1;
                    }
                }
            }
        }

        ctx.log(format!("Entities: {}", entities));
        ctx.log(format!("Relationships: {}", relationships));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::migration::MigrationUnit;
    use crate::primitives::SEED_RECORDS_FILE;
    use crate::publisher::VersionedPublisher;
    use crate::storage::{FileStore, VersionQuery};
    use crate::types::{EntityId, EntityKind, EntitySubKind};
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    const RECORDS: &str = r#"{
        "entities": [
            {"slug": "bagmati", "type": "location", "sub_type": "province",
             "names": [{"kind": "PRIMARY", "en": {"full": "Bagmati Province"}}]},
            {"slug": "kathmandu", "type": "location", "sub_type": "district",
             "names": [{"kind": "PRIMARY", "en": {"full": "Kathmandu"}}]}
        ],
        "relationships": [
            {"source_entity_id": "entity:location/district/kathmandu",
             "target_entity_id": "entity:location/province/bagmati",
             "type": "LOCATED_IN"}
        ]
    }"#;

    fn unit(dir: &std::path::Path) -> MigrationUnit {
        MigrationUnit {
            prefix: 0,
            name: "initial-locations".to_string(),
            dir: dir.to_path_buf(),
            readme: None,
            author: "jane".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: "Seed".to_string(),
            entry: SEED_RECORDS_PROCEDURE.to_string(),
        }
    }

    #[test]
    fn seed_is_an_upsert() {
        let data = tempdir().unwrap();
        let unit_dir = tempdir().unwrap();
        fs::write(unit_dir.path().join(SEED_RECORDS_FILE), RECORDS).unwrap();
        let unit = unit(unit_dir.path());
        let mut publisher = VersionedPublisher::new(FileStore::open(data.path()).unwrap());
        let registry = ProcedureRegistry::with_builtins();
        let seed = registry.get(SEED_RECORDS_PROCEDURE).unwrap();

        let mut ctx = MigrationContext::new(&mut publisher, &unit, "migration-000-initial-locations".to_string());
        seed.run(&mut ctx).unwrap();
        let logs = ctx.into_logs();
        assert_eq!(logs[0], "Entities: 2 created, 0 updated, 0 unchanged");
        assert_eq!(publisher.store().entity_count().unwrap(), 2);
        assert_eq!(publisher.store().relationship_count().unwrap(), 1);

        // Unchanged records add no versions on a second run.
        let mut ctx = MigrationContext::new(&mut publisher, &unit, "migration-000-initial-locations".to_string());
        seed.run(&mut ctx).unwrap();
        assert_eq!(ctx.into_logs()[0], "Entities: 0 created, 0 updated, 2 unchanged");

        // A changed record becomes version 2.
        let changed = RECORDS.replace("\"Kathmandu\"", "\"Kathmandu District\"");
        fs::write(unit_dir.path().join(SEED_RECORDS_FILE), changed).unwrap();
        let mut ctx = MigrationContext::new(&mut publisher, &unit, "migration-000-initial-locations".to_string());
        seed.run(&mut ctx).unwrap();
        assert_eq!(ctx.into_logs()[0], "Entities: 0 created, 1 updated, 1 unchanged");

        let id = EntityId::new(EntityKind::Location, Some(EntitySubKind::District), "kathmandu");
        let versions = publisher
            .store()
            .list_versions(&VersionQuery::subject(id.as_str()))
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].summary.author.slug, "migration-000-initial-locations");
    }

    #[test]
    fn closures_are_procedures() {
        let data = tempdir().unwrap();
        let unit_dir = tempdir().unwrap();
        let unit = unit(unit_dir.path());
        let mut publisher = VersionedPublisher::new(FileStore::open(data.path()).unwrap());

        let mut registry: ProcedureRegistry<FileStore> = ProcedureRegistry::empty();
        registry.register("noop", |ctx: &mut MigrationContext<'_, FileStore>| {
            ctx.log("nothing to do");
            Ok(())
        });
        assert_eq!(registry.names(), vec!["noop"]);
        assert!(registry.get(SEED_RECORDS_PROCEDURE).is_none());

        let mut ctx = MigrationContext::new(&mut publisher, &unit, "migration-000-x".to_string());
        registry.get("noop").unwrap().run(&mut ctx).unwrap();
        assert_eq!(ctx.into_logs(), vec!["nothing to do"]);
    }

    #[test]
    fn seed_rejects_unknown_sections() {
        let data = tempdir().unwrap();
        let unit_dir = tempdir().unwrap();
        fs::write(unit_dir.path().join(SEED_RECORDS_FILE), r#"{"people": []}"#).unwrap();
        let unit = unit(unit_dir.path());
        let mut publisher = VersionedPublisher::new(FileStore::open(data.path()).unwrap());
        let mut ctx = MigrationContext::new(&mut publisher, &unit, "migration-000-x".to_string());
        assert!(matches!(SeedRecords.run(&mut ctx), Err(NesError::SerializationError(_))));
    }
}
