//! # Record Storage
//!
//! The `RecordStore` trait and the query types every backend understands.
//!
//! Backends:
//! - `FileStore`: one JSON file per record, optional redb type index
//! - `CachedView` (in `cache`): read-only snapshot over any other store
//!
//! No record kind supports partial updates. Writers read the whole record,
//! modify it and put it back.

mod file_store;
mod type_index;

pub use file_store::{FileStore, INDEX_DIR};
pub use type_index::TypeIndex;

use crate::types::{
    Author, AuthorId, Direction, Entity, EntityId, EntityKind, EntitySubKind, NesError,
    Relationship, RelationshipId, RelationshipKind, Version, VersionId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// RECORDSTORE TRAIT
// =============================================================================

/// CRUD plus filtered listing for every record kind.
///
/// Reads take `&self` and may run concurrently with each other. Writes take
/// `&mut self`; there is exactly one writer at a time and no compare-and-swap.
pub trait RecordStore {
    fn put_entity(&mut self, entity: &Entity) -> Result<(), NesError>;
    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, NesError>;
    /// Hard delete. Returns whether a record was removed.
    fn delete_entity(&mut self, id: &EntityId) -> Result<bool, NesError>;
    /// Unindexed scan filtered by kind, sub-kind and attribute equality (AND).
    fn list_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError>;
    /// Like `list_entities`, additionally ranking by name relevance to `query.text`.
    fn search_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>, NesError>;

    fn put_relationship(&mut self, relationship: &Relationship) -> Result<(), NesError>;
    fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>, NesError>;
    fn delete_relationship(&mut self, id: &RelationshipId) -> Result<bool, NesError>;
    fn list_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>, NesError>;

    fn put_version(&mut self, version: &Version) -> Result<(), NesError>;
    fn get_version(&self, id: &VersionId) -> Result<Option<Version>, NesError>;
    fn delete_version(&mut self, id: &VersionId) -> Result<bool, NesError>;
    fn list_versions(&self, query: &VersionQuery) -> Result<Vec<Version>, NesError>;

    fn put_author(&mut self, author: &Author) -> Result<(), NesError>;
    fn get_author(&self, id: &AuthorId) -> Result<Option<Author>, NesError>;
    fn delete_author(&mut self, id: &AuthorId) -> Result<bool, NesError>;
    fn list_authors(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Author>, NesError>;

    fn contains_entity(&self, id: &EntityId) -> Result<bool, NesError> {
        Ok(self.get_entity(id)?.is_some())
    }

    fn entity_count(&self) -> Result<usize, NesError> {
        Ok(self.list_entities(&EntityQuery::default())?.len())
    }

    fn relationship_count(&self) -> Result<usize, NesError> {
        Ok(self.list_relationships(&RelationshipQuery::default())?.len())
    }
}

/// Apply `offset`/`limit` to an already ordered result set.
pub(crate) fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

// =============================================================================
// ENTITY QUERY
// =============================================================================

/// Filter for entity listing and search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuery {
    pub kind: Option<EntityKind>,
    pub sub_kind: Option<EntitySubKind>,
    /// Equality predicates over `Entity::attributes`, all of which must hold.
    pub attributes: BTreeMap<String, Value>,
    /// Free text matched against every language variant of every name.
    pub text: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl EntityQuery {
    #[must_use]
    pub fn of_kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sub_kind(mut self, sub_kind: EntitySubKind) -> Self {
        self.sub_kind = Some(sub_kind);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Kind, sub-kind and attribute predicates (text is scored separately).
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        if self.kind.is_some_and(|kind| entity.kind != kind) {
            return false;
        }
        if self.sub_kind.is_some() && entity.sub_kind != self.sub_kind {
            return false;
        }
        self.attributes
            .iter()
            .all(|(key, value)| entity.attributes.get(key) == Some(value))
    }

    /// Stable textual form, used as a memoization key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let attrs = serde_json::to_string(&self.attributes).unwrap_or_default();
        format!(
            "entities|{:?}|{:?}|{}|{:?}|{:?}|{}",
            self.kind, self.sub_kind, attrs, self.text, self.limit, self.offset
        )
    }
}

// =============================================================================
// RELATIONSHIP QUERY
// =============================================================================

/// Filter for relationship listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipQuery {
    /// Restrict to edges touching this entity on the given side.
    pub endpoint: Option<(EntityId, Direction)>,
    pub kind: Option<RelationshipKind>,
    /// Edge validity interval must contain this date.
    pub active_on: Option<NaiveDate>,
    pub start_date_from: Option<NaiveDate>,
    pub start_date_to: Option<NaiveDate>,
    /// Only edges without an end date.
    pub currently_active: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RelationshipQuery {
    #[must_use]
    pub fn touching(entity: EntityId, direction: Direction) -> Self {
        Self {
            endpoint: Some((entity, direction)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn of_kind(kind: RelationshipKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: RelationshipKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn matches(&self, rel: &Relationship) -> bool {
        if let Some((entity, direction)) = &self.endpoint {
            let hit = match direction {
                Direction::Outgoing => &rel.source == entity,
                Direction::Incoming => &rel.target == entity,
                Direction::Both => &rel.source == entity || &rel.target == entity,
            };
            if !hit {
                return false;
            }
        }
        if self.kind.is_some_and(|kind| rel.kind != kind) {
            return false;
        }
        if self.active_on.is_some_and(|date| !rel.is_active_on(date)) {
            return false;
        }
        if self.currently_active && rel.end_date.is_some() {
            return false;
        }
        if let Some(from) = self.start_date_from {
            if rel.start_date.is_none_or(|start| start < from) {
                return false;
            }
        }
        if let Some(to) = self.start_date_to {
            if rel.start_date.is_none_or(|start| start > to) {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("relationships|{:?}", self)
    }
}

// =============================================================================
// VERSION QUERY
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter for the version history of one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionQuery {
    pub subject_id: String,
    pub author_slug: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub min_version: Option<u32>,
    pub max_version: Option<u32>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl VersionQuery {
    #[must_use]
    pub fn subject(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            author_slug: None,
            created_after: None,
            created_before: None,
            min_version: None,
            max_version: None,
            order: SortOrder::Ascending,
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    #[must_use]
    pub fn by_author(mut self, slug: impl Into<String>) -> Self {
        self.author_slug = Some(slug.into());
        self
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        let summary = &version.summary;
        if summary.entity_or_relationship_id != self.subject_id {
            return false;
        }
        if self
            .author_slug
            .as_ref()
            .is_some_and(|slug| &summary.author.slug != slug)
        {
            return false;
        }
        if self.created_after.is_some_and(|t| summary.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| summary.created_at >= t) {
            return false;
        }
        if self.min_version.is_some_and(|v| summary.version_number < v) {
            return false;
        }
        if self.max_version.is_some_and(|v| summary.version_number > v) {
            return false;
        }
        true
    }

    /// Sort by version number in the requested order, then paginate.
    #[must_use]
    pub fn arrange(&self, mut versions: Vec<Version>) -> Vec<Version> {
        versions.sort_by_key(|v| v.summary.version_number);
        if self.order == SortOrder::Descending {
            versions.reverse();
        }
        paginate(versions, self.offset, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_applies_offset_then_limit() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(paginate(items.clone(), 2, Some(3)), vec![2, 3, 4]);
        assert_eq!(paginate(items.clone(), 8, None), vec![8, 9]);
        assert!(paginate(items, 20, Some(5)).is_empty());
    }

    #[test]
    fn cache_keys_differ_by_filter() {
        let a = EntityQuery::of_kind(EntityKind::Person);
        let b = EntityQuery::of_kind(EntityKind::Person).with_attribute("province", "bagmati");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), EntityQuery::of_kind(EntityKind::Person).cache_key());
    }
}
