//! # File-backed Record Store
//!
//! One pretty-printed JSON file per record. The file path is a pure function
//! of the record id (`:` mapped to `/`, plus `.json`), so the directory tree
//! doubles as the by-kind / by-sub-kind index:
//!
//! ```text
//! <root>/entity/<kind>[/<sub_kind>]/<slug>.json
//! <root>/relationship/<source>/<target>/<KIND>.json
//! <root>/version/<subject id as path>/<n>.json
//! <root>/author/<slug>.json
//! ```
//!
//! Files that fail to parse during a scan are skipped with a warning so one
//! bad record never hides the rest of the dataset.

use super::type_index::TypeIndex;
use super::{EntityQuery, RecordStore, RelationshipQuery, VersionQuery, paginate};
use crate::search;
use crate::types::{
    Author, AuthorId, Entity, EntityId, NesError, Relationship, RelationshipId, Version, VersionId,
    record_path,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory under the data root holding derived index files.
pub const INDEX_DIR: &str = "_indexes";

const TYPE_INDEX_FILE: &str = "by_type.redb";

/// A record store rooted at a directory (usually a git working tree).
pub struct FileStore {
    root: PathBuf,
    type_index: Option<TypeIndex>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .field("type_index", &self.type_index.is_some())
            .finish()
    }
}

impl FileStore {
    /// Open (creating if needed) a store at `root` without a type index.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, NesError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| NesError::IoError(format!("cannot create {}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            type_index: None,
        })
    }

    /// Open a store and attach the redb type index under `_indexes/`.
    ///
    /// A freshly created index is populated from the entity tree.
    pub fn with_type_index(root: impl AsRef<Path>) -> Result<Self, NesError> {
        let mut store = Self::open(root)?;
        let index_path = store.root.join(INDEX_DIR).join(TYPE_INDEX_FILE);
        let fresh = !index_path.exists();
        store.type_index = Some(TypeIndex::open(&index_path)?);
        if fresh {
            let count = store.rebuild_index()?;
            tracing::info!("Type index created with {} entities", count);
        }
        Ok(store)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn has_type_index(&self) -> bool {
        self.type_index.is_some()
    }

    /// Rescan the entity tree and rewrite the type index from scratch.
    ///
    /// Returns the number of indexed entities. Without an index this is a
    /// no-op returning 0.
    pub fn rebuild_index(&mut self) -> Result<usize, NesError> {
        let Some(index) = &self.type_index else {
            return Ok(0);
        };
        let entities: Vec<Entity> = self.scan(&self.root.join("entity"));
        index.rebuild(&entities)
    }

    // -------------------------------------------------------------------------
    // File helpers
    // -------------------------------------------------------------------------

    fn write_record<T: Serialize>(&self, id: &str, value: &T) -> Result<(), NesError> {
        let path = record_path(&self.root, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                NesError::IoError(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let mut json = serde_json::to_string_pretty(value)
            .map_err(|e| NesError::SerializationError(e.to_string()))?;
        json.push('\n');
        fs::write(&path, json)
            .map_err(|e| NesError::IoError(format!("cannot write {}: {}", path.display(), e)))
    }

    fn read_record<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, NesError> {
        let path = record_path(&self.root, id);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn remove_record(&self, id: &str) -> Result<bool, NesError> {
        let path = record_path(&self.root, id);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| NesError::IoError(format!("cannot remove {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Recursively load every `.json` record under `dir`, in path order.
    fn scan<T: DeserializeOwned>(&self, dir: &Path) -> Vec<T> {
        if !dir.is_dir() {
            return Vec::new();
        }
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable path under {}: {}", dir.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_json(entry.path()))
            .filter_map(|entry| match read_json(entry.path()) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping invalid record file {}: {}", entry.path().display(), e);
                    None
                }
            })
            .collect()
    }

    fn entity_candidates(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError> {
        if let (Some(index), Some(kind)) = (&self.type_index, query.kind) {
            let mut entities = Vec::new();
            for id in index.ids(kind, query.sub_kind)? {
                match self.read_record::<Entity>(id.as_str()) {
                    Ok(Some(entity)) => entities.push(entity),
                    Ok(None) => tracing::warn!("Type index lists missing entity {}", id),
                    Err(e) => tracing::warn!("Skipping invalid entity {}: {}", id, e),
                }
            }
            return Ok(entities);
        }

        let mut dir = self.root.join("entity");
        if let Some(kind) = query.kind {
            dir.push(kind.as_str());
            if let Some(sub_kind) = query.sub_kind {
                dir.push(sub_kind.as_str());
            }
        }
        Ok(self.scan(&dir))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, NesError> {
    let bytes = fs::read(path)
        .map_err(|e| NesError::IoError(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes).map_err(|e| NesError::SerializationError(e.to_string()))
}

// =============================================================================
// RECORDSTORE IMPLEMENTATION
// =============================================================================

impl RecordStore for FileStore {
    fn put_entity(&mut self, entity: &Entity) -> Result<(), NesError> {
        let id = entity.id();
        self.write_record(id.as_str(), entity)?;
        if let Some(index) = &self.type_index {
            index.insert(entity)?;
        }
        tracing::debug!("Stored entity {}", id);
        Ok(())
    }

    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, NesError> {
        self.read_record(id.as_str())
    }

    fn delete_entity(&mut self, id: &EntityId) -> Result<bool, NesError> {
        let removed = self.remove_record(id.as_str())?;
        if let Some(index) = &self.type_index {
            index.remove(id)?;
        }
        Ok(removed)
    }

    fn list_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError> {
        let mut entities: Vec<Entity> = self
            .entity_candidates(query)?
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();
        entities.sort_by_cached_key(|e| e.id());
        Ok(paginate(entities, query.offset, query.limit))
    }

    fn search_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError> {
        Ok(search::rank(self.entity_candidates(query)?, query))
    }

    fn put_relationship(&mut self, relationship: &Relationship) -> Result<(), NesError> {
        self.write_record(relationship.id().as_str(), relationship)
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>, NesError> {
        self.read_record(id.as_str())
    }

    fn delete_relationship(&mut self, id: &RelationshipId) -> Result<bool, NesError> {
        self.remove_record(id.as_str())
    }

    fn list_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>, NesError> {
        let mut relationships: Vec<Relationship> = self
            .scan::<Relationship>(&self.root.join("relationship"))
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        relationships.sort_by_cached_key(|r| r.id());
        Ok(paginate(relationships, query.offset, query.limit))
    }

    fn put_version(&mut self, version: &Version) -> Result<(), NesError> {
        self.write_record(version.id().as_str(), version)
    }

    fn get_version(&self, id: &VersionId) -> Result<Option<Version>, NesError> {
        self.read_record(id.as_str())
    }

    fn delete_version(&mut self, id: &VersionId) -> Result<bool, NesError> {
        self.remove_record(id.as_str())
    }

    fn list_versions(&self, query: &VersionQuery) -> Result<Vec<Version>, NesError> {
        // Versions of one subject are the files directly inside its directory.
        let dir = self
            .root
            .join(VersionId::subject_prefix(&query.subject_id).replace(':', "/"));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir)
            .map_err(|e| NesError::IoError(format!("cannot read {}: {}", dir.display(), e)))?;

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| NesError::IoError(e.to_string()))?.path();
            if !path.is_file() || !is_json(&path) {
                continue;
            }
            match read_json::<Version>(&path) {
                Ok(version) if query.matches(&version) => versions.push(version),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping invalid version file {}: {}", path.display(), e),
            }
        }
        Ok(query.arrange(versions))
    }

    fn put_author(&mut self, author: &Author) -> Result<(), NesError> {
        self.write_record(&author.id(), author)
    }

    fn get_author(&self, id: &AuthorId) -> Result<Option<Author>, NesError> {
        self.read_record(id.as_str())
    }

    fn delete_author(&mut self, id: &AuthorId) -> Result<bool, NesError> {
        self.remove_record(id.as_str())
    }

    fn list_authors(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Author>, NesError> {
        let mut authors: Vec<Author> = self.scan(&self.root.join("author"));
        authors.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(paginate(authors, offset, limit))
    }
}

// =============================================================================
// TESTS
// =============================================================================
