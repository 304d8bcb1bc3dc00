//! Version and author records.

use super::{AuthorId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of record a version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionSubject {
    Entity,
    Relationship,
}

/// Lightweight author reference embedded in version summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Pointer to the latest version of a subject, stored on the subject itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Id of the entity or relationship this version describes.
    pub entity_or_relationship_id: String,
    #[serde(rename = "type")]
    pub subject: VersionSubject,
    pub version_number: u32,
    pub author: AuthorRef,
    pub change_description: String,
    pub created_at: DateTime<Utc>,
}

impl VersionSummary {
    #[must_use]
    pub fn version_id(&self) -> VersionId {
        VersionId::new(&self.entity_or_relationship_id, self.version_number)
    }
}

/// An immutable, numbered record of a subject's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(flatten)]
    pub summary: VersionSummary,
    /// Full JSON snapshot of the subject as written by this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

impl Version {
    #[must_use]
    pub fn id(&self) -> VersionId {
        self.summary.version_id()
    }
}

/// A contributor. Created lazily the first time an author id is referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Author {
    #[must_use]
    pub fn id(&self) -> String {
        format!("author:{}", self.slug)
    }

    #[must_use]
    pub fn reference(&self) -> AuthorRef {
        AuthorRef {
            slug: self.slug.clone(),
            name: self.name.clone(),
        }
    }
}

impl From<&AuthorId> for Author {
    fn from(id: &AuthorId) -> Self {
        Self {
            slug: id.slug().to_string(),
            name: None,
        }
    }
}
