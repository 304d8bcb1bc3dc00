//! # Versioned Publisher
//!
//! The only sanctioned write path for entities and relationships.
//!
//! Every accepted mutation:
//! - validates the record
//! - resolves (or lazily creates) the author
//! - stamps the next version number, computed from the *stored* record
//! - writes the subject first, then the version with a full snapshot
//!
//! Writing the subject before its version means an external reader never
//! sees a version that points at a missing record.
//!
//! Version increments are optimistic: two concurrent updates of the same
//! subject both read version `n` and both write `n + 1`, and one of them is
//! lost. `update_entity_checked` is the compare-before-write variant for
//! callers that carry the version they last read.

use crate::primitives::{
    MAX_DESCRIPTION_LENGTH, MAX_KIND_LENGTH, MAX_SHORT_DESCRIPTION_LENGTH, MAX_SUB_KIND_LENGTH,
    validate_kind_token, validate_slug,
};
use crate::storage::{RecordStore, VersionQuery};
use crate::types::{
    Author, AuthorId, Entity, EntityDraft, EntityId, NameKind, NesError, Relationship,
    RelationshipDraft, RelationshipId, Version, VersionId, VersionSubject, VersionSummary,
    validate_kind_pair,
};
use chrono::Utc;
use serde::Serialize;

/// An undo action recorded after a step of a compound operation succeeds.
#[derive(Debug)]
enum Compensation {
    RestoreEntity(Box<Entity>),
    DeleteRelationship(RelationshipId),
    DeleteVersion(VersionId),
}

/// Orchestrates versioned mutation on top of a `RecordStore`.
#[derive(Debug)]
pub struct VersionedPublisher<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> VersionedPublisher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    /// Create a new entity at version 1.
    ///
    /// Fails with `Conflict` if an entity with the same `(kind, sub_kind, slug)`
    /// already exists.
    pub fn create_entity(
        &mut self,
        draft: EntityDraft,
        author_id: &str,
        change_description: &str,
    ) -> Result<Entity, NesError> {
        validate_entity_draft(&draft)?;
        let id = draft.id();
        if self.store.get_entity(&id)?.is_some() {
            return Err(NesError::Conflict(format!("entity {} already exists", id)));
        }

        let author = self.resolve_author(author_id)?;
        let now = Utc::now();
        let summary = stamp(id.as_str(), VersionSubject::Entity, 1, &author, change_description);
        let entity = Entity::from_draft(draft, summary, now);

        self.store.put_entity(&entity)?;
        self.write_version(&entity.version_summary, &entity)?;
        tracing::info!("Created entity {} (version 1) by {}", id, author.slug);
        Ok(entity)
    }

    /// Write a caller-modified entity as the next version.
    ///
    /// The new version number is `stored.version + 1`, whatever version the
    /// caller's copy carries.
    pub fn update_entity(
        &mut self,
        entity: Entity,
        author_id: &str,
        change_description: &str,
    ) -> Result<Entity, NesError> {
        validate_entity_draft(&entity.to_draft())?;
        let id = entity.id();
        let stored = self
            .store
            .get_entity(&id)?
            .ok_or_else(|| NesError::NotFound(format!("entity {}", id)))?;

        let author = self.resolve_author(author_id)?;
        let next = stored.version_summary.version_number.saturating_add(1);
        let mut entity = entity;
        entity.version_summary = stamp(id.as_str(), VersionSubject::Entity, next, &author, change_description);
        entity.created_at = stored.created_at;

        self.store.put_entity(&entity)?;
        self.write_version(&entity.version_summary, &entity)?;
        tracing::info!("Updated entity {} to version {}", id, next);
        Ok(entity)
    }

    /// `update_entity`, but rejects with `Conflict` when the stored version is
    /// no longer `expected_version`.
    pub fn update_entity_checked(
        &mut self,
        entity: Entity,
        expected_version: u32,
        author_id: &str,
        change_description: &str,
    ) -> Result<Entity, NesError> {
        let id = entity.id();
        let stored = self
            .store
            .get_entity(&id)?
            .ok_or_else(|| NesError::NotFound(format!("entity {}", id)))?;
        let current = stored.version_summary.version_number;
        if current != expected_version {
            return Err(NesError::Conflict(format!(
                "entity {} is at version {}, expected {}",
                id, current, expected_version
            )));
        }
        self.update_entity(entity, author_id, change_description)
    }

    /// Hard delete. Version history stays on disk.
    pub fn delete_entity(&mut self, id: &EntityId) -> Result<bool, NesError> {
        let removed = self.store.delete_entity(id)?;
        if removed {
            tracing::info!("Deleted entity {}", id);
        }
        Ok(removed)
    }

    pub fn get_entity(&self, id: &EntityId) -> Result<Entity, NesError> {
        self.store
            .get_entity(id)?
            .ok_or_else(|| NesError::NotFound(format!("entity {}", id)))
    }

    /// Version history of an entity, ascending.
    pub fn get_entity_versions(&self, id: &EntityId) -> Result<Vec<Version>, NesError> {
        let versions = self.store.list_versions(&VersionQuery::subject(id.as_str()))?;
        if versions.is_empty() && !self.store.contains_entity(id)? {
            return Err(NesError::NotFound(format!("entity {}", id)));
        }
        Ok(versions)
    }

    /// Create several entities with one author and description. Stops at the
    /// first failure; entities created before it are kept.
    pub fn batch_create_entities(
        &mut self,
        drafts: Vec<EntityDraft>,
        author_id: &str,
        change_description: &str,
    ) -> Result<Vec<Entity>, NesError> {
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            created.push(self.create_entity(draft, author_id, change_description)?);
        }
        Ok(created)
    }

    // =========================================================================
    // RELATIONSHIPS
    // =========================================================================

    /// Create a relationship at version 1.
    pub fn create_relationship(
        &mut self,
        draft: RelationshipDraft,
        author_id: &str,
        change_description: &str,
    ) -> Result<Relationship, NesError> {
        self.validate_endpoints(&draft.source, &draft.target)?;
        draft.validate_dates()?;
        let id = draft.id();
        if self.store.get_relationship(&id)?.is_some() {
            return Err(NesError::Conflict(format!("relationship {} already exists", id)));
        }

        let author = self.resolve_author(author_id)?;
        let now = Utc::now();
        let summary = stamp(id.as_str(), VersionSubject::Relationship, 1, &author, change_description);
        let relationship = Relationship::from_draft(draft, summary, now);

        self.store.put_relationship(&relationship)?;
        self.write_version(&relationship.version_summary, &relationship)?;
        tracing::info!("Created relationship {} (version 1)", id);
        Ok(relationship)
    }

    /// Write a caller-modified relationship as the next version.
    pub fn update_relationship(
        &mut self,
        relationship: Relationship,
        author_id: &str,
        change_description: &str,
    ) -> Result<Relationship, NesError> {
        let id = relationship.id();
        let stored = self
            .store
            .get_relationship(&id)?
            .ok_or_else(|| NesError::NotFound(format!("relationship {}", id)))?;
        self.validate_endpoints(&relationship.source, &relationship.target)?;
        relationship.validate_dates()?;

        let author = self.resolve_author(author_id)?;
        let next = stored.version_summary.version_number.saturating_add(1);
        let mut relationship = relationship;
        relationship.version_summary = stamp(
            id.as_str(),
            VersionSubject::Relationship,
            next,
            &author,
            change_description,
        );
        relationship.created_at = stored.created_at;

        self.store.put_relationship(&relationship)?;
        self.write_version(&relationship.version_summary, &relationship)?;
        tracing::info!("Updated relationship {} to version {}", id, next);
        Ok(relationship)
    }

    pub fn delete_relationship(&mut self, id: &RelationshipId) -> Result<bool, NesError> {
        let removed = self.store.delete_relationship(id)?;
        if removed {
            tracing::info!("Deleted relationship {}", id);
        }
        Ok(removed)
    }

    /// Version history of a relationship, ascending.
    pub fn get_relationship_versions(&self, id: &RelationshipId) -> Result<Vec<Version>, NesError> {
        let versions = self.store.list_versions(&VersionQuery::subject(id.as_str()))?;
        if versions.is_empty() && self.store.get_relationship(id)?.is_none() {
            return Err(NesError::NotFound(format!("relationship {}", id)));
        }
        Ok(versions)
    }

    // =========================================================================
    // COMPOUND OPERATIONS
    // =========================================================================

    /// Update an entity and create new relationships as one unit.
    ///
    /// Each successful step records an undo action. On failure the undo
    /// actions run in reverse order (restoring the entity's pre-call snapshot
    /// and deleting any relationships created here) and the cause is returned
    /// wrapped in `CoordinatedFailure`.
    pub fn update_entity_with_relationships(
        &mut self,
        entity: Entity,
        relationships: Vec<RelationshipDraft>,
        author_id: &str,
        change_description: &str,
    ) -> Result<(Entity, Vec<Relationship>), NesError> {
        let mut undo = Vec::new();
        match self.coordinated_steps(entity, relationships, author_id, change_description, &mut undo) {
            Ok(done) => Ok(done),
            Err(cause) => {
                tracing::warn!(
                    "Compound update failed, running {} compensating actions: {}",
                    undo.len(),
                    cause
                );
                self.compensate(undo);
                Err(NesError::CoordinatedFailure(Box::new(cause)))
            }
        }
    }

    fn coordinated_steps(
        &mut self,
        entity: Entity,
        relationships: Vec<RelationshipDraft>,
        author_id: &str,
        change_description: &str,
        undo: &mut Vec<Compensation>,
    ) -> Result<(Entity, Vec<Relationship>), NesError> {
        let id = entity.id();
        let original = self
            .store
            .get_entity(&id)?
            .ok_or_else(|| NesError::NotFound(format!("entity {}", id)))?;

        // The record is written before its version, so undo is queued first.
        undo.push(Compensation::RestoreEntity(Box::new(original)));
        let updated = self.update_entity(entity, author_id, change_description)?;
        undo.push(Compensation::DeleteVersion(updated.version_summary.version_id()));

        let mut created = Vec::with_capacity(relationships.len());
        for draft in relationships {
            let rid = draft.id();
            if self.store.get_relationship(&rid)?.is_none() {
                undo.push(Compensation::DeleteRelationship(rid));
            }
            let relationship = self.create_relationship(draft, author_id, change_description)?;
            undo.push(Compensation::DeleteVersion(relationship.version_summary.version_id()));
            created.push(relationship);
        }
        Ok((updated, created))
    }

    /// Run undo actions newest-first. A failing action is logged and the
    /// rest still run.
    fn compensate(&mut self, undo: Vec<Compensation>) {
        for action in undo.into_iter().rev() {
            let outcome = match &action {
                Compensation::RestoreEntity(entity) => self.store.put_entity(entity),
                Compensation::DeleteRelationship(id) => self.store.delete_relationship(id).map(|_| ()),
                Compensation::DeleteVersion(id) => self.store.delete_version(id).map(|_| ()),
            };
            if let Err(e) = outcome {
                tracing::warn!("Compensating action {:?} failed: {}", action, e);
            }
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Look up an author, creating the record the first time it is referenced.
    fn resolve_author(&mut self, author_id: &str) -> Result<Author, NesError> {
        let id = AuthorId::parse(author_id)?;
        if let Some(author) = self.store.get_author(&id)? {
            return Ok(author);
        }
        let author = Author::from(&id);
        self.store.put_author(&author)?;
        tracing::debug!("Created author {}", id);
        Ok(author)
    }

    fn validate_endpoints(&self, source: &EntityId, target: &EntityId) -> Result<(), NesError> {
        if !self.store.contains_entity(source)? {
            return Err(NesError::ValidationError(format!(
                "source entity {} does not exist",
                source
            )));
        }
        if !self.store.contains_entity(target)? {
            return Err(NesError::ValidationError(format!(
                "target entity {} does not exist",
                target
            )));
        }
        Ok(())
    }

    fn write_version<T: Serialize>(&mut self, summary: &VersionSummary, subject: &T) -> Result<(), NesError> {
        let snapshot =
            serde_json::to_value(subject).map_err(|e| NesError::SerializationError(e.to_string()))?;
        self.store.put_version(&Version {
            summary: summary.clone(),
            snapshot: Some(snapshot),
        })
    }
}

fn stamp(
    subject_id: &str,
    subject: VersionSubject,
    version_number: u32,
    author: &Author,
    change_description: &str,
) -> VersionSummary {
    VersionSummary {
        entity_or_relationship_id: subject_id.to_string(),
        subject,
        version_number,
        author: author.reference(),
        change_description: change_description.to_string(),
        created_at: Utc::now(),
    }
}

/// Shape and business-rule checks for entity payloads.
pub fn validate_entity_draft(draft: &EntityDraft) -> Result<(), NesError> {
    validate_slug(&draft.slug)?;
    validate_kind_token(draft.kind.as_str(), MAX_KIND_LENGTH)?;
    if let Some(sub_kind) = draft.sub_kind {
        validate_kind_token(sub_kind.as_str(), MAX_SUB_KIND_LENGTH)?;
    }
    validate_kind_pair(draft.kind, draft.sub_kind)?;
    if !draft.extension.matches(draft.kind, draft.sub_kind) {
        return Err(NesError::ValidationError(format!(
            "extension fields do not match kind '{}'",
            draft.kind
        )));
    }

    if draft.names.is_empty() {
        return Err(NesError::ValidationError(
            "at least one name is required".to_string(),
        ));
    }
    for name in draft.names.iter().chain(draft.misspelled_names.iter()) {
        name.validate()?;
    }
    if !draft.names.iter().any(|n| n.kind == NameKind::Primary) {
        return Err(NesError::ValidationError(
            "at least one name must be PRIMARY".to_string(),
        ));
    }

    let too_long = |text: &Option<String>, max: usize| text.as_ref().is_some_and(|t| t.chars().count() > max);
    if too_long(&draft.short_description, MAX_SHORT_DESCRIPTION_LENGTH) {
        return Err(NesError::ValidationError(format!(
            "short description exceeds {} characters",
            MAX_SHORT_DESCRIPTION_LENGTH
        )));
    }
    if too_long(&draft.description, MAX_DESCRIPTION_LENGTH) {
        return Err(NesError::ValidationError(format!(
            "description exceeds {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
