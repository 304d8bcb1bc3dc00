//! Deterministic record identifiers.
//!
//! Every id is a pure function of the fields that define the record, and the
//! on-disk path of a record is a pure function of its id.

use super::{EntityKind, EntitySubKind, NesError, RelationshipKind};
use crate::primitives::{validate_author_slug, validate_slug};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const ENTITY_PREFIX: &str = "entity:";
const RELATIONSHIP_PREFIX: &str = "relationship:";
const VERSION_PREFIX: &str = "version:";
const AUTHOR_PREFIX: &str = "author:";

/// Map an id to its record file under `root`: `:` becomes `/`, plus `.json`.
#[must_use]
pub fn record_path(root: &Path, id: &str) -> PathBuf {
    let mut relative = id.replace(':', "/");
    relative.push_str(".json");
    root.join(relative)
}

// =============================================================================
// ENTITY ID
// =============================================================================

/// `entity:<kind>[/<sub_kind>]/<slug>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    #[must_use]
    pub fn new(kind: EntityKind, sub_kind: Option<EntitySubKind>, slug: &str) -> Self {
        match sub_kind {
            Some(sub) => Self(format!("{ENTITY_PREFIX}{}/{}/{}", kind, sub, slug)),
            None => Self(format!("{ENTITY_PREFIX}{}/{}", kind, slug)),
        }
    }

    /// Parse and validate an entity id string.
    pub fn parse(s: &str) -> Result<Self, NesError> {
        let body = s.strip_prefix(ENTITY_PREFIX).ok_or_else(|| {
            NesError::ValidationError(format!("entity id '{}' must start with '{}'", s, ENTITY_PREFIX))
        })?;
        Self::from_path_body(body)
    }

    /// Rebuild an id from the part after `entity:` (as embedded in relationship ids).
    fn from_path_body(body: &str) -> Result<Self, NesError> {
        let parts: Vec<&str> = body.split('/').collect();
        let (kind, sub_kind, slug) = match parts.as_slice() {
            [kind, slug] => (kind.parse::<EntityKind>()?, None, *slug),
            [kind, sub, slug] => (
                kind.parse::<EntityKind>()?,
                Some(sub.parse::<EntitySubKind>()?),
                *slug,
            ),
            _ => {
                return Err(NesError::ValidationError(format!(
                    "malformed entity id body '{}'",
                    body
                )));
            }
        };
        super::validate_kind_pair(kind, sub_kind)?;
        validate_slug(slug)?;
        Ok(Self::new(kind, sub_kind, slug))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id without its `entity:` prefix.
    #[must_use]
    pub fn body(&self) -> &str {
        self.0.strip_prefix(ENTITY_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// RELATIONSHIP ID
// =============================================================================

/// `relationship:<source body>:<target body>:<KIND>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    #[must_use]
    pub fn new(source: &EntityId, target: &EntityId, kind: RelationshipKind) -> Self {
        Self(format!(
            "{RELATIONSHIP_PREFIX}{}:{}:{}",
            source.body(),
            target.body(),
            kind
        ))
    }

    pub fn parse(s: &str) -> Result<Self, NesError> {
        let body = s.strip_prefix(RELATIONSHIP_PREFIX).ok_or_else(|| {
            NesError::ValidationError(format!(
                "relationship id '{}' must start with '{}'",
                s, RELATIONSHIP_PREFIX
            ))
        })?;
        let parts: Vec<&str> = body.split(':').collect();
        match parts.as_slice() {
            [source, target, kind] => Ok(Self::new(
                &EntityId::from_path_body(source)?,
                &EntityId::from_path_body(target)?,
                kind.parse()?,
            )),
            _ => Err(NesError::ValidationError(format!(
                "malformed relationship id '{}'",
                s
            ))),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// VERSION ID
// =============================================================================

/// `version:<subject id>:<n>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    #[must_use]
    pub fn new(subject_id: &str, version_number: u32) -> Self {
        Self(format!("{VERSION_PREFIX}{}:{}", subject_id, version_number))
    }

    /// Directory id of all versions of a subject (`version:<subject id>`).
    #[must_use]
    pub fn subject_prefix(subject_id: &str) -> String {
        format!("{VERSION_PREFIX}{}", subject_id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// AUTHOR ID
// =============================================================================

/// `author:<slug>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    /// Accepts either a bare slug or a full `author:<slug>` id.
    pub fn parse(input: &str) -> Result<Self, NesError> {
        let slug = input.strip_prefix(AUTHOR_PREFIX).unwrap_or(input);
        validate_author_slug(slug)?;
        Ok(Self(format!("{AUTHOR_PREFIX}{}", slug)))
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        self.0.strip_prefix(AUTHOR_PREFIX).unwrap_or(&self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
