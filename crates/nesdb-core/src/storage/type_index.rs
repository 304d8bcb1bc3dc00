//! # redb-backed Type Index
//!
//! Optional secondary index mapping `(kind, entity id)` to the entity's
//! sub-kind, so by-kind listings read only the files they need instead of
//! walking the whole entity tree.
//!
//! The record files stay the source of truth. The index is updated on every
//! entity put/delete and can always be regenerated with `rebuild`.

use crate::types::{Entity, EntityId, EntityKind, EntitySubKind, NesError};
use redb::{Database, ReadableDatabase, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Table: (kind, entity id) -> postcard-encoded `IndexEntry`
const BY_KIND: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("entities_by_kind");

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    sub_kind: Option<EntitySubKind>,
}

fn index_err(e: impl std::fmt::Display) -> NesError {
    NesError::IndexError(e.to_string())
}

pub struct TypeIndex {
    db: Database,
}

impl std::fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeIndex").finish_non_exhaustive()
    }
}

impl TypeIndex {
    /// Open or create the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NesError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| NesError::IoError(e.to_string()))?;
        }
        let db = Database::create(path).map_err(index_err)?;

        let write_txn = db.begin_write().map_err(index_err)?;
        let _ = write_txn.open_table(BY_KIND).map_err(index_err)?;
        write_txn.commit().map_err(index_err)?;

        Ok(Self { db })
    }

    pub fn insert(&self, entity: &Entity) -> Result<(), NesError> {
        let id = entity.id();
        let entry = postcard::to_allocvec(&IndexEntry {
            sub_kind: entity.sub_kind,
        })
        .map_err(|e| NesError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(index_err)?;
        {
            let mut table = write_txn.open_table(BY_KIND).map_err(index_err)?;
            table
                .insert((entity.kind.as_str(), id.as_str()), entry.as_slice())
                .map_err(index_err)?;
        }
        write_txn.commit().map_err(index_err)
    }

    pub fn remove(&self, id: &EntityId) -> Result<(), NesError> {
        let write_txn = self.db.begin_write().map_err(index_err)?;
        {
            let mut table = write_txn.open_table(BY_KIND).map_err(index_err)?;
            // The kind is the first path segment of the id body.
            let kind = id.body().split('/').next().unwrap_or_default();
            table.remove((kind, id.as_str())).map_err(index_err)?;
        }
        write_txn.commit().map_err(index_err)
    }

    /// Ids of every indexed entity of `kind`, optionally narrowed to one sub-kind.
    pub fn ids(&self, kind: EntityKind, sub_kind: Option<EntitySubKind>) -> Result<Vec<EntityId>, NesError> {
        let read_txn = self.db.begin_read().map_err(index_err)?;
        let table = read_txn.open_table(BY_KIND).map_err(index_err)?;

        let mut ids = Vec::new();
        for entry in table.range((kind.as_str(), "")..).map_err(index_err)? {
            let (key, value) = entry.map_err(index_err)?;
            let (entry_kind, id) = key.value();
            if entry_kind != kind.as_str() {
                break;
            }
            let decoded: IndexEntry = postcard::from_bytes(value.value())
                .map_err(|e| NesError::SerializationError(e.to_string()))?;
            if sub_kind.is_some() && decoded.sub_kind != sub_kind {
                continue;
            }
            ids.push(EntityId::parse(id)?);
        }
        Ok(ids)
    }

    /// Replace the whole index with `entities`. Returns the indexed count.
    pub fn rebuild(&self, entities: &[Entity]) -> Result<usize, NesError> {
        let write_txn = self.db.begin_write().map_err(index_err)?;
        write_txn.delete_table(BY_KIND).map_err(index_err)?;
        {
            let mut table = write_txn.open_table(BY_KIND).map_err(index_err)?;
            for entity in entities {
                let id = entity.id();
                let entry = postcard::to_allocvec(&IndexEntry {
                    sub_kind: entity.sub_kind,
                })
                .map_err(|e| NesError::SerializationError(e.to_string()))?;
                table
                    .insert((entity.kind.as_str(), id.as_str()), entry.as_slice())
                    .map_err(index_err)?;
            }
        }
        write_txn.commit().map_err(index_err)?;
        tracing::info!("Rebuilt type index with {} entities", entities.len());
        self.len()
    }

    pub fn len(&self) -> Result<usize, NesError> {
        let read_txn = self.db.begin_read().map_err(index_err)?;
        let table = read_txn.open_table(BY_KIND).map_err(index_err)?;
        Ok(table.len().map_err(index_err)? as usize)
    }

    pub fn is_empty(&self) -> Result<bool, NesError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{AuthorRef, EntityDraft, Name, VersionSubject, VersionSummary};
    use chrono::Utc;
    use tempfile::tempdir;

    fn entity(kind: EntityKind, sub: Option<EntitySubKind>, slug: &str) -> Entity {
        let draft = EntityDraft::new(kind, sub, slug, vec![Name::primary(slug)]);
        let summary = VersionSummary {
            entity_or_relationship_id: draft.id().to_string(),
            subject: VersionSubject::Entity,
            version_number: 1,
            author: AuthorRef {
                slug: "tester".to_string(),
                name: None,
            },
            change_description: "initial".to_string(),
            created_at: Utc::now(),
        };
        Entity::from_draft(draft, summary, Utc::now())
    }

    #[test]
    fn ids_are_scoped_to_kind() {
        let dir = tempdir().unwrap();
        let index = TypeIndex::open(dir.path().join("idx.redb")).unwrap();
        assert!(index.is_empty().unwrap());

        index.insert(&entity(EntityKind::Person, None, "ram-poudel")).unwrap();
        index
            .insert(&entity(EntityKind::Location, Some(EntitySubKind::Ward), "ward-one"))
            .unwrap();
        index
            .insert(&entity(EntityKind::Location, Some(EntitySubKind::District), "kathmandu"))
            .unwrap();

        assert_eq!(index.ids(EntityKind::Person, None).unwrap().len(), 1);
        assert_eq!(index.ids(EntityKind::Location, None).unwrap().len(), 2);
        assert_eq!(
            index
                .ids(EntityKind::Location, Some(EntitySubKind::Ward))
                .unwrap(),
            vec![EntityId::parse("entity:location/ward/ward-one").unwrap()]
        );
        assert!(index.ids(EntityKind::Organization, None).unwrap().is_empty());
    }

    #[test]
    fn remove_and_rebuild() {
        let dir = tempdir().unwrap();
        let index = TypeIndex::open(dir.path().join("idx.redb")).unwrap();
        let ram = entity(EntityKind::Person, None, "ram-poudel");
        index.insert(&ram).unwrap();
        index.remove(&ram.id()).unwrap();
        assert_eq!(index.len().unwrap(), 0);

        let all = vec![
            entity(EntityKind::Person, None, "aaa"),
            entity(EntityKind::Person, None, "bbb"),
        ];
        assert_eq!(index.rebuild(&all).unwrap(), 2);
        assert_eq!(index.rebuild(&all[..1]).unwrap(), 1);
    }
}
