//! # Cached View
//!
//! A read-only `RecordStore` over a point-in-time snapshot of another store.
//!
//! The first read loads every entity, relationship and author. Concurrent
//! first readers share that single load through a `OnceCell`. From then on
//! entity, relationship and author reads never touch the underlying store;
//! version history is passed through because it is append-only.
//!
//! Filtered listings and searches are additionally memoized by query for a
//! short TTL. Every write returns `NesError::ReadOnly`.

use crate::search;
use crate::storage::{EntityQuery, RecordStore, RelationshipQuery, VersionQuery, paginate};
use crate::types::{
    Author, AuthorId, Entity, EntityId, NesError, Relationship, RelationshipId, Version, VersionId,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Snapshot {
    entities: BTreeMap<EntityId, Entity>,
    /// Sorted by id. Kept as a list so duplicate triples survive.
    relationships: Vec<Relationship>,
    authors: BTreeMap<String, Author>,
}

#[derive(Clone)]
enum Memo {
    Entities(Vec<Entity>),
    Relationships(Vec<Relationship>),
}

/// Hit/miss counters of the memo table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct CachedView<S: RecordStore> {
    inner: S,
    snapshot: OnceCell<Snapshot>,
    memo: Mutex<BTreeMap<String, (Instant, Memo)>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: RecordStore> std::fmt::Debug for CachedView<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedView")
            .field("warm", &self.snapshot.get().is_some())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore> CachedView<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            snapshot: OnceCell::new(),
            memo: Mutex::new(BTreeMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Load the snapshot now instead of on first read.
    pub fn warm(&self) -> Result<(), NesError> {
        self.snapshot().map(|_| ())
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.memo.lock().len(),
        }
    }

    fn snapshot(&self) -> Result<&Snapshot, NesError> {
        self.snapshot.get_or_try_init(|| {
            let entities: BTreeMap<EntityId, Entity> = self
                .inner
                .list_entities(&EntityQuery::default())?
                .into_iter()
                .map(|e| (e.id(), e))
                .collect();
            let relationships = self.inner.list_relationships(&RelationshipQuery::default())?;
            let authors = self
                .inner
                .list_authors(None, 0)?
                .into_iter()
                .map(|a| (a.slug.clone(), a))
                .collect();
            tracing::info!(
                "Cache warmed: {} entities, {} relationships",
                entities.len(),
                relationships.len()
            );
            Ok(Snapshot {
                entities,
                relationships,
                authors,
            })
        })
    }

    /// Serve `key` from the memo table, computing and storing it on a miss.
    fn memoized(
        &self,
        key: String,
        compute: impl FnOnce(&Snapshot) -> Memo,
    ) -> Result<Memo, NesError> {
        let snapshot = self.snapshot()?;
        {
            let mut memo = self.memo.lock();
            match memo.get(&key) {
                Some((at, value)) if at.elapsed() < self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value.clone());
                }
                Some(_) => {
                    memo.remove(&key);
                }
                None => {}
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute(snapshot);
        let mut memo = self.memo.lock();
        memo.retain(|_, (at, _)| at.elapsed() < self.ttl);
        memo.insert(key, (Instant::now(), value.clone()));
        Ok(value)
    }
}

impl<S: RecordStore> RecordStore for CachedView<S> {
    fn put_entity(&mut self, _entity: &Entity) -> Result<(), NesError> {
        Err(NesError::ReadOnly)
    }

    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, NesError> {
        Ok(self.snapshot()?.entities.get(id).cloned())
    }

    fn delete_entity(&mut self, _id: &EntityId) -> Result<bool, NesError> {
        Err(NesError::ReadOnly)
    }

    fn list_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError> {
        let memo = self.memoized(query.cache_key(), |snapshot| {
            let matched = snapshot
                .entities
                .values()
                .filter(|e| query.matches(e))
                .cloned()
                .collect();
            Memo::Entities(paginate(matched, query.offset, query.limit))
        })?;
        match memo {
            Memo::Entities(entities) => Ok(entities),
            Memo::Relationships(_) => Ok(Vec::new()),
        }
    }

    fn search_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError> {
        let key = format!("search|{}", query.cache_key());
        let memo = self.memoized(key, |snapshot| {
            Memo::Entities(search::rank(snapshot.entities.values().cloned(), query))
        })?;
        match memo {
            Memo::Entities(entities) => Ok(entities),
            Memo::Relationships(_) => Ok(Vec::new()),
        }
    }

    fn put_relationship(&mut self, _relationship: &Relationship) -> Result<(), NesError> {
        Err(NesError::ReadOnly)
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>, NesError> {
        Ok(self
            .snapshot()?
            .relationships
            .iter()
            .find(|r| &r.id() == id)
            .cloned())
    }

    fn delete_relationship(&mut self, _id: &RelationshipId) -> Result<bool, NesError> {
        Err(NesError::ReadOnly)
    }

    fn list_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>, NesError> {
        let memo = self.memoized(query.cache_key(), |snapshot| {
            let matched = snapshot
                .relationships
                .iter()
                .filter(|r| query.matches(r))
                .cloned()
                .collect();
            Memo::Relationships(paginate(matched, query.offset, query.limit))
        })?;
        match memo {
            Memo::Relationships(relationships) => Ok(relationships),
            Memo::Entities(_) => Ok(Vec::new()),
        }
    }

    fn put_version(&mut self, _version: &Version) -> Result<(), NesError> {
        Err(NesError::ReadOnly)
    }

    fn get_version(&self, id: &VersionId) -> Result<Option<Version>, NesError> {
        self.inner.get_version(id)
    }

    fn delete_version(&mut self, _id: &VersionId) -> Result<bool, NesError> {
        Err(NesError::ReadOnly)
    }

    fn list_versions(&self, query: &VersionQuery) -> Result<Vec<Version>, NesError> {
        self.inner.list_versions(query)
    }

    fn put_author(&mut self, _author: &Author) -> Result<(), NesError> {
        Err(NesError::ReadOnly)
    }

    fn get_author(&self, id: &AuthorId) -> Result<Option<Author>, NesError> {
        Ok(self.snapshot()?.authors.get(id.slug()).cloned())
    }

    fn delete_author(&mut self, _id: &AuthorId) -> Result<bool, NesError> {
        Err(NesError::ReadOnly)
    }

    fn list_authors(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Author>, NesError> {
        let authors = self.snapshot()?.authors.values().cloned().collect();
        Ok(paginate(authors, offset, limit))
    }

    fn contains_entity(&self, id: &EntityId) -> Result<bool, NesError> {
        Ok(self.snapshot()?.entities.contains_key(id))
    }

    fn entity_count(&self) -> Result<usize, NesError> {
        Ok(self.snapshot()?.entities.len())
    }

    fn relationship_count(&self) -> Result<usize, NesError> {
        Ok(self.snapshot()?.relationships.len())
    }
}
