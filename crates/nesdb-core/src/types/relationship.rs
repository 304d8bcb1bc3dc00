//! Relationship records.

use super::{EntityId, NesError, RelationshipId, RelationshipKind, VersionSummary};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The caller-supplied part of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDraft {
    #[serde(rename = "source_entity_id")]
    pub source: EntityId,
    #[serde(rename = "target_entity_id")]
    pub target: EntityId,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl RelationshipDraft {
    #[must_use]
    pub fn new(source: EntityId, target: EntityId, kind: RelationshipKind) -> Self {
        Self {
            source,
            target,
            kind,
            start_date: None,
            end_date: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    #[must_use]
    pub fn id(&self) -> RelationshipId {
        RelationshipId::new(&self.source, &self.target, self.kind)
    }

    /// `end >= start` when both are present.
    pub fn validate_dates(&self) -> Result<(), NesError> {
        validate_interval(self.start_date, self.end_date)
    }
}

pub(crate) fn validate_interval(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), NesError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(NesError::ValidationError(format!(
            "end date {} is before start date {}",
            end, start
        ))),
        _ => Ok(()),
    }
}

/// A typed, optionally time-bounded edge between two entities.
///
/// The validity interval is half-open: `[start_date, end_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "source_entity_id")]
    pub source: EntityId,
    #[serde(rename = "target_entity_id")]
    pub target: EntityId,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    pub version_summary: VersionSummary,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    #[must_use]
    pub fn from_draft(draft: RelationshipDraft, version_summary: VersionSummary, created_at: DateTime<Utc>) -> Self {
        Self {
            source: draft.source,
            target: draft.target,
            kind: draft.kind,
            start_date: draft.start_date,
            end_date: draft.end_date,
            attributes: draft.attributes,
            version_summary,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> RelationshipId {
        RelationshipId::new(&self.source, &self.target, self.kind)
    }

    pub fn validate_dates(&self) -> Result<(), NesError> {
        validate_interval(self.start_date, self.end_date)
    }

    /// Whether `date` falls inside `[start_date, end_date)`. Open ends are unbounded.
    #[must_use]
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| start <= date) && self.end_date.is_none_or(|end| date < end)
    }

    /// The endpoint opposite `entity`, if `entity` is one of the endpoints.
    #[must_use]
    pub fn other_end(&self, entity: &EntityId) -> Option<&EntityId> {
        if &self.source == entity {
            Some(&self.target)
        } else if &self.target == entity {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthorRef, EntityKind, VersionSubject};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn relationship(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Relationship {
        let draft = RelationshipDraft::new(
            EntityId::new(EntityKind::Person, None, "ram-poudel"),
            EntityId::new(EntityKind::Organization, None, "acme-corp"),
            RelationshipKind::EmployedBy,
        )
        .between(start, end);
        let summary = VersionSummary {
            entity_or_relationship_id: draft.id().to_string(),
            subject: VersionSubject::Relationship,
            version_number: 1,
            author: AuthorRef {
                slug: "tester".to_string(),
                name: None,
            },
            change_description: "initial".to_string(),
            created_at: Utc::now(),
        };
        Relationship::from_draft(draft, summary, Utc::now())
    }

    #[test]
    fn end_before_start_is_invalid() {
        let rel = relationship(Some(date("2020-01-01")), Some(date("2019-01-01")));
        assert!(matches!(rel.validate_dates(), Err(NesError::ValidationError(_))));

        let same_day = relationship(Some(date("2020-01-01")), Some(date("2020-01-01")));
        assert!(same_day.validate_dates().is_ok());
    }

    #[test]
    fn active_interval_is_half_open() {
        let rel = relationship(Some(date("2020-01-01")), Some(date("2021-01-01")));
        assert!(rel.is_active_on(date("2020-01-01")));
        assert!(rel.is_active_on(date("2020-12-31")));
        assert!(!rel.is_active_on(date("2021-01-01")));
        assert!(!rel.is_active_on(date("2019-12-31")));

        let open = relationship(None, None);
        assert!(open.is_active_on(date("1900-01-01")));
    }

    #[test]
    fn wire_field_names() {
        let rel = relationship(None, None);
        let json = serde_json::to_value(&rel).expect("ser");
        assert_eq!(json["type"], "EMPLOYED_BY");
        assert_eq!(json["source_entity_id"], "entity:person/ram-poudel");
        assert_eq!(json["target_entity_id"], "entity:organization/acme-corp");
    }
}
