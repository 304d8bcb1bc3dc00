//! # Core Type Definitions
//!
//! This module contains the record model shared by every engine:
//! - Identifiers (`EntityId`, `RelationshipId`, `VersionId`, `AuthorId`)
//! - Kind enumerations (`EntityKind`, `EntitySubKind`, `RelationshipKind`)
//! - Records (`Entity`, `Relationship`, `Version`, `Author`)
//! - Error types (`NesError`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers are pure functions of their inputs and implement `Ord`, so
//! anything keyed by them in a `BTreeMap`/`BTreeSet` iterates in a stable
//! order across runs and machines.

mod entity;
mod ids;
mod relationship;
mod version;

pub use entity::{
    Attribution, Contact, Entity, EntityDraft, EntityExtension, GovernmentBodyExtension,
    GovernmentType, Identifier, LocationExtension, Name, NameKind, NameParts, PersonExtension,
    PoliticalPartyExtension,
};
pub use ids::{AuthorId, EntityId, RelationshipId, VersionId, record_path};
pub use relationship::{Relationship, RelationshipDraft};
pub use version::{Author, AuthorRef, Version, VersionSubject, VersionSummary};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// Top-level entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
}

impl EntityKind {
    /// All kinds, in directory order.
    pub const ALL: [EntityKind; 3] = [Self::Person, Self::Organization, Self::Location];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| NesError::ValidationError(format!("unknown entity kind '{}'", s)))
    }
}

/// Entity sub-kind. Only organizations and locations have one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySubKind {
    PoliticalParty,
    GovernmentBody,
    Province,
    District,
    MetropolitanCity,
    SubMetropolitanCity,
    Municipality,
    RuralMunicipality,
    Ward,
    Constituency,
}

impl EntitySubKind {
    pub const ALL: [EntitySubKind; 10] = [
        Self::PoliticalParty,
        Self::GovernmentBody,
        Self::Province,
        Self::District,
        Self::MetropolitanCity,
        Self::SubMetropolitanCity,
        Self::Municipality,
        Self::RuralMunicipality,
        Self::Ward,
        Self::Constituency,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PoliticalParty => "political_party",
            Self::GovernmentBody => "government_body",
            Self::Province => "province",
            Self::District => "district",
            Self::MetropolitanCity => "metropolitan_city",
            Self::SubMetropolitanCity => "sub_metropolitan_city",
            Self::Municipality => "municipality",
            Self::RuralMunicipality => "rural_municipality",
            Self::Ward => "ward",
            Self::Constituency => "constituency",
        }
    }

    /// The entity kind this sub-kind belongs to.
    #[must_use]
    pub const fn parent_kind(self) -> EntityKind {
        match self {
            Self::PoliticalParty | Self::GovernmentBody => EntityKind::Organization,
            _ => EntityKind::Location,
        }
    }

    /// Administrative level of a location sub-kind (province = 1 ... ward = 4).
    /// Constituencies are electoral, not administrative.
    #[must_use]
    pub const fn administrative_level(self) -> Option<u8> {
        match self {
            Self::Province => Some(1),
            Self::District => Some(2),
            Self::MetropolitanCity
            | Self::SubMetropolitanCity
            | Self::Municipality
            | Self::RuralMunicipality => Some(3),
            Self::Ward => Some(4),
            Self::Constituency | Self::PoliticalParty | Self::GovernmentBody => None,
        }
    }
}

impl fmt::Display for EntitySubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntitySubKind {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| NesError::ValidationError(format!("unknown entity sub-kind '{}'", s)))
    }
}

/// Check that a `(kind, sub_kind)` pair is one the dataset allows.
pub fn validate_kind_pair(kind: EntityKind, sub_kind: Option<EntitySubKind>) -> Result<(), NesError> {
    match sub_kind {
        Some(sub) if sub.parent_kind() != kind => Err(NesError::ValidationError(format!(
            "sub-kind '{}' is not valid for kind '{}'",
            sub, kind
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// RELATIONSHIP KINDS
// =============================================================================

/// The fixed enumeration of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    AffiliatedWith,
    EmployedBy,
    MemberOf,
    ParentOf,
    ChildOf,
    Supervises,
    LocatedIn,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 7] = [
        Self::AffiliatedWith,
        Self::EmployedBy,
        Self::MemberOf,
        Self::ParentOf,
        Self::ChildOf,
        Self::Supervises,
        Self::LocatedIn,
    ];

    /// Kinds subject to cycle checking.
    pub const HIERARCHICAL: [RelationshipKind; 3] =
        [Self::Supervises, Self::ParentOf, Self::ChildOf];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AffiliatedWith => "AFFILIATED_WITH",
            Self::EmployedBy => "EMPLOYED_BY",
            Self::MemberOf => "MEMBER_OF",
            Self::ParentOf => "PARENT_OF",
            Self::ChildOf => "CHILD_OF",
            Self::Supervises => "SUPERVISES",
            Self::LocatedIn => "LOCATED_IN",
        }
    }

    #[must_use]
    pub const fn is_hierarchical(self) -> bool {
        matches!(self, Self::Supervises | Self::ParentOf | Self::ChildOf)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                NesError::ValidationError(format!(
                    "invalid relationship kind '{}', expected one of: {}",
                    s,
                    Self::ALL.map(|k| k.as_str()).join(", ")
                ))
            })
    }
}

/// Edge direction relative to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges whose source is the entity.
    Outgoing,
    /// Edges whose target is the entity.
    Incoming,
    /// Either end.
    #[default]
    Both,
}

impl FromStr for Direction {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "out" | "outgoing" | "source" => Ok(Self::Outgoing),
            "in" | "incoming" | "target" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            other => Err(NesError::ValidationError(format!(
                "unknown direction '{}', expected outgoing, incoming or both",
                other
            ))),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in nesdb operations.
#[derive(Debug, Error)]
pub enum NesError {
    /// Input failed a shape or business rule check.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record already exists, or changed under the caller.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A write was attempted through a read-only view.
    #[error("Read-only view does not support write operations")]
    ReadOnly,

    /// A compound operation failed and its completed steps were undone.
    #[error("Coordinated operation failed: {0}")]
    CoordinatedFailure(Box<NesError>),

    /// The migration runner could not execute a unit.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The migration journal could not be read or appended.
    #[error("Journal error: {0}")]
    JournalError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The secondary type index failed.
    #[error("Index error: {0}")]
    IndexError(String),
}

// =============================================================================
// TESTS
// =============================================================================
