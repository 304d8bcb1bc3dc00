//! Entity records.
//!
//! An entity is a shared base payload (names, tags, attributes, ...) plus a
//! kind-specific extension. The extension is chosen at deserialization time
//! from a `(kind, sub_kind)` lookup table, so a stored `location/ward`
//! record always comes back as `EntityExtension::Location`.

use super::{EntityId, EntityKind, EntitySubKind, NesError, VersionSummary, validate_kind_pair};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// NAMES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NameKind {
    Primary,
    Alias,
    Alternate,
    BirthName,
}

/// The parts of a name in one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParts {
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl NameParts {
    #[must_use]
    pub fn full(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            ..Self::default()
        }
    }
}

/// A name in English and/or Nepali.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub kind: NameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<NameParts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<NameParts>,
}

impl Name {
    #[must_use]
    pub fn new(kind: NameKind, en: Option<NameParts>, ne: Option<NameParts>) -> Self {
        Self { kind, en, ne }
    }

    /// A PRIMARY name with only an English full form.
    #[must_use]
    pub fn primary(full_en: impl Into<String>) -> Self {
        Self::new(NameKind::Primary, Some(NameParts::full(full_en)), None)
    }

    /// Language variants present on this name.
    pub fn parts(&self) -> impl Iterator<Item = &NameParts> {
        self.en.iter().chain(self.ne.iter())
    }

    pub fn validate(&self) -> Result<(), NesError> {
        if self.en.is_none() && self.ne.is_none() {
            return Err(NesError::ValidationError(
                "each name needs at least one of 'en' or 'ne'".to_string(),
            ));
        }
        if self.parts().any(|p| p.full.trim().is_empty()) {
            return Err(NesError::ValidationError(
                "name parts must carry a non-empty full name".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// SHARED PAYLOAD ITEMS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub scheme: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Source credit for the data in a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// =============================================================================
// KIND-SPECIFIC EXTENSIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electoral_details: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoliticalPartyExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_chief: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernmentType {
    Federal,
    Provincial,
    Local,
    Other,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernmentBodyExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government_type: Option<GovernmentType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationExtension {
    /// Enclosing location, e.g. the district of a municipality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityId>,
    /// Area in square kilometres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// Kind-specific fields, flattened next to the shared payload on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityExtension {
    Person(PersonExtension),
    Organization,
    PoliticalParty(PoliticalPartyExtension),
    GovernmentBody(GovernmentBodyExtension),
    Location(LocationExtension),
}

type ExtensionDecoder = fn(Map<String, Value>) -> Result<EntityExtension, serde_json::Error>;

fn decode_person(fields: Map<String, Value>) -> Result<EntityExtension, serde_json::Error> {
    serde_json::from_value(Value::Object(fields)).map(EntityExtension::Person)
}

fn decode_organization(_: Map<String, Value>) -> Result<EntityExtension, serde_json::Error> {
    Ok(EntityExtension::Organization)
}

fn decode_political_party(fields: Map<String, Value>) -> Result<EntityExtension, serde_json::Error> {
    serde_json::from_value(Value::Object(fields)).map(EntityExtension::PoliticalParty)
}

fn decode_government_body(fields: Map<String, Value>) -> Result<EntityExtension, serde_json::Error> {
    serde_json::from_value(Value::Object(fields)).map(EntityExtension::GovernmentBody)
}

fn decode_location(fields: Map<String, Value>) -> Result<EntityExtension, serde_json::Error> {
    serde_json::from_value(Value::Object(fields)).map(EntityExtension::Location)
}

/// `(kind, sub_kind)` → decoder. A `None` sub-kind row is the fallback for
/// every sub-kind of that kind without its own row.
const EXTENSION_TABLE: &[(EntityKind, Option<EntitySubKind>, ExtensionDecoder)] = &[
    (EntityKind::Person, None, decode_person),
    (EntityKind::Organization, None, decode_organization),
    (
        EntityKind::Organization,
        Some(EntitySubKind::PoliticalParty),
        decode_political_party,
    ),
    (
        EntityKind::Organization,
        Some(EntitySubKind::GovernmentBody),
        decode_government_body,
    ),
    (EntityKind::Location, None, decode_location),
];

fn extension_decoder(kind: EntityKind, sub_kind: Option<EntitySubKind>) -> Option<ExtensionDecoder> {
    let exact = EXTENSION_TABLE
        .iter()
        .find(|(k, s, _)| *k == kind && *s == sub_kind);
    let fallback = || EXTENSION_TABLE.iter().find(|(k, s, _)| *k == kind && s.is_none());
    exact.or_else(fallback).map(|(_, _, decoder)| *decoder)
}

impl EntityExtension {
    /// The empty extension for a `(kind, sub_kind)` pair.
    #[must_use]
    pub fn default_for(kind: EntityKind, sub_kind: Option<EntitySubKind>) -> Self {
        extension_decoder(kind, sub_kind)
            .and_then(|decode| decode(Map::new()).ok())
            .unwrap_or(Self::Organization)
    }

    /// Decode the extension fields of a stored record.
    pub fn decode(
        kind: EntityKind,
        sub_kind: Option<EntitySubKind>,
        fields: Map<String, Value>,
    ) -> Result<Self, NesError> {
        let decoder = extension_decoder(kind, sub_kind).ok_or_else(|| {
            NesError::SerializationError(format!("no extension decoder for kind '{}'", kind))
        })?;
        decoder(fields).map_err(|e| NesError::SerializationError(e.to_string()))
    }

    /// Whether this extension is the one the lookup table selects for the pair.
    #[must_use]
    pub fn matches(&self, kind: EntityKind, sub_kind: Option<EntitySubKind>) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&Self::default_for(kind, sub_kind))
    }

    fn encode(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            Self::Person(ext) => serde_json::to_value(ext)?,
            Self::Organization => Value::Object(Map::new()),
            Self::PoliticalParty(ext) => serde_json::to_value(ext)?,
            Self::GovernmentBody(ext) => serde_json::to_value(ext)?,
            Self::Location(ext) => serde_json::to_value(ext)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// The caller-supplied part of an entity, before versioning stamps it.
///
/// Deserializes from the same JSON shape as `Entity`, minus the versioning
/// fields, which is what seed files carry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "EntityRecord")]
pub struct EntityDraft {
    pub slug: String,
    pub kind: EntityKind,
    pub sub_kind: Option<EntitySubKind>,
    pub names: Vec<Name>,
    pub misspelled_names: Vec<Name>,
    pub identifiers: Vec<Identifier>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, Value>,
    pub contacts: Vec<Contact>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub attributions: Vec<Attribution>,
    pub extension: EntityExtension,
}

impl EntityDraft {
    #[must_use]
    pub fn new(
        kind: EntityKind,
        sub_kind: Option<EntitySubKind>,
        slug: impl Into<String>,
        names: Vec<Name>,
    ) -> Self {
        Self {
            slug: slug.into(),
            kind,
            sub_kind,
            names,
            misspelled_names: Vec::new(),
            identifiers: Vec::new(),
            tags: Vec::new(),
            attributes: BTreeMap::new(),
            contacts: Vec::new(),
            short_description: None,
            description: None,
            attributions: Vec::new(),
            extension: EntityExtension::default_for(kind, sub_kind),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: EntityExtension) -> Self {
        self.extension = extension;
        self
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        EntityId::new(self.kind, self.sub_kind, &self.slug)
    }
}

/// A typed, versioned node of the civic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntityRecord", into = "EntityRecord")]
pub struct Entity {
    pub slug: String,
    pub kind: EntityKind,
    pub sub_kind: Option<EntitySubKind>,
    pub names: Vec<Name>,
    pub misspelled_names: Vec<Name>,
    pub identifiers: Vec<Identifier>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, Value>,
    pub contacts: Vec<Contact>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub attributions: Vec<Attribution>,
    pub extension: EntityExtension,
    pub version_summary: VersionSummary,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    #[must_use]
    pub fn from_draft(draft: EntityDraft, version_summary: VersionSummary, created_at: DateTime<Utc>) -> Self {
        Self {
            slug: draft.slug,
            kind: draft.kind,
            sub_kind: draft.sub_kind,
            names: draft.names,
            misspelled_names: draft.misspelled_names,
            identifiers: draft.identifiers,
            tags: draft.tags,
            attributes: draft.attributes,
            contacts: draft.contacts,
            short_description: draft.short_description,
            description: draft.description,
            attributions: draft.attributions,
            extension: draft.extension,
            version_summary,
            created_at,
        }
    }

    /// Strip versioning back off, e.g. to re-validate a caller-modified entity.
    #[must_use]
    pub fn to_draft(&self) -> EntityDraft {
        EntityDraft {
            slug: self.slug.clone(),
            kind: self.kind,
            sub_kind: self.sub_kind,
            names: self.names.clone(),
            misspelled_names: self.misspelled_names.clone(),
            identifiers: self.identifiers.clone(),
            tags: self.tags.clone(),
            attributes: self.attributes.clone(),
            contacts: self.contacts.clone(),
            short_description: self.short_description.clone(),
            description: self.description.clone(),
            attributions: self.attributions.clone(),
            extension: self.extension.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        EntityId::new(self.kind, self.sub_kind, &self.slug)
    }

    #[must_use]
    pub fn primary_name(&self) -> Option<&Name> {
        self.names.iter().find(|n| n.kind == NameKind::Primary)
    }

    /// Label for display: PRIMARY English full name, then Nepali, then the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.primary_name()
            .and_then(|name| name.en.as_ref().or(name.ne.as_ref()))
            .map(|parts| parts.full.clone())
            .unwrap_or_else(|| self.id().to_string())
    }

    #[must_use]
    pub fn administrative_level(&self) -> Option<u8> {
        match self.kind {
            EntityKind::Location => self.sub_kind.and_then(|s| s.administrative_level()),
            _ => None,
        }
    }
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// On-disk shape: shared payload fields plus flattened extension fields.
#[derive(Serialize, Deserialize)]
struct EntityRecord {
    #[serde(default)]
    id: String,
    slug: String,
    #[serde(rename = "type")]
    kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_type: Option<EntitySubKind>,
    names: Vec<Name>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    misspelled_names: Vec<Name>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contacts: Vec<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    short_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributions: Vec<Attribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version_summary: Option<VersionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extension: Map<String, Value>,
}

impl TryFrom<EntityRecord> for EntityDraft {
    type Error = NesError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        validate_kind_pair(record.kind, record.sub_type)?;
        let extension = EntityExtension::decode(record.kind, record.sub_type, record.extension)?;
        Ok(Self {
            slug: record.slug,
            kind: record.kind,
            sub_kind: record.sub_type,
            names: record.names,
            misspelled_names: record.misspelled_names,
            identifiers: record.identifiers,
            tags: record.tags,
            attributes: record.attributes,
            contacts: record.contacts,
            short_description: record.short_description,
            description: record.description,
            attributions: record.attributions,
            extension,
        })
    }
}

impl TryFrom<EntityRecord> for Entity {
    type Error = NesError;

    fn try_from(mut record: EntityRecord) -> Result<Self, Self::Error> {
        let (Some(version_summary), Some(created_at)) =
            (record.version_summary.take(), record.created_at.take())
        else {
            return Err(NesError::ValidationError(format!(
                "entity record '{}' has no version_summary or created_at",
                record.slug
            )));
        };
        Ok(Entity::from_draft(
            EntityDraft::try_from(record)?,
            version_summary,
            created_at,
        ))
    }
}

impl From<Entity> for EntityRecord {
    fn from(entity: Entity) -> Self {
        let id = entity.id().to_string();
        Self {
            id,
            slug: entity.slug,
            kind: entity.kind,
            sub_type: entity.sub_kind,
            names: entity.names,
            misspelled_names: entity.misspelled_names,
            identifiers: entity.identifiers,
            tags: entity.tags,
            attributes: entity.attributes,
            contacts: entity.contacts,
            short_description: entity.short_description,
            description: entity.description,
            attributions: entity.attributions,
            extension: entity.extension.encode().unwrap_or_default(),
            version_summary: Some(entity.version_summary),
            created_at: Some(entity.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthorRef, VersionSubject};

    fn summary(id: &EntityId) -> VersionSummary {
        VersionSummary {
            entity_or_relationship_id: id.to_string(),
            subject: VersionSubject::Entity,
            version_number: 1,
            author: AuthorRef {
                slug: "tester".to_string(),
                name: None,
            },
            change_description: "initial".to_string(),
            created_at: Utc::now(),
        }
    }

    fn entity(draft: EntityDraft) -> Entity {
        let id = draft.id();
        Entity::from_draft(draft, summary(&id), Utc::now())
    }

    #[test]
    fn extension_dispatch_by_kind_pair() {
        let ward = entity(EntityDraft::new(
            EntityKind::Location,
            Some(EntitySubKind::Ward),
            "kathmandu-ward-1",
            vec![Name::primary("Kathmandu Ward 1")],
        ));
        let json = serde_json::to_value(&ward).expect("ser");
        let back: Entity = serde_json::from_value(json).expect("de");
        assert!(matches!(back.extension, EntityExtension::Location(_)));
        assert_eq!(back.administrative_level(), Some(4));
    }

    #[test]
    fn extension_fields_are_flattened() {
        let party = entity(
            EntityDraft::new(
                EntityKind::Organization,
                Some(EntitySubKind::PoliticalParty),
                "nepali-congress",
                vec![Name::primary("Nepali Congress")],
            )
            .with_extension(EntityExtension::PoliticalParty(PoliticalPartyExtension {
                party_chief: Some("Sher Bahadur Deuba".to_string()),
                ..PoliticalPartyExtension::default()
            })),
        );
        let json = serde_json::to_value(&party).expect("ser");
        assert_eq!(json["party_chief"], "Sher Bahadur Deuba");
        assert_eq!(json["type"], "organization");
        assert_eq!(json["sub_type"], "political_party");
        assert_eq!(json["id"], "entity:organization/political_party/nepali-congress");

        let back: Entity = serde_json::from_value(json).expect("de");
        assert_eq!(back, party);
    }

    #[test]
    fn mismatched_kind_pair_is_rejected() {
        let person = entity(EntityDraft::new(
            EntityKind::Person,
            None,
            "ram-poudel",
            vec![Name::primary("Ram Poudel")],
        ));
        let mut json = serde_json::to_value(&person).expect("ser");
        json["sub_type"] = Value::String("ward".to_string());
        assert!(serde_json::from_value::<Entity>(json).is_err());
    }

    #[test]
    fn display_name_prefers_primary_english() {
        let mut draft = EntityDraft::new(
            EntityKind::Person,
            None,
            "ram-poudel",
            vec![
                Name::new(NameKind::Alias, Some(NameParts::full("Ramji")), None),
                Name::new(NameKind::Primary, None, Some(NameParts::full("राम पौडेल"))),
            ],
        );
        assert_eq!(entity(draft.clone()).display_name(), "राम पौडेल");

        draft.names.clear();
        assert_eq!(entity(draft).display_name(), "entity:person/ram-poudel");
    }

    #[test]
    fn name_requires_a_language() {
        assert!(Name::new(NameKind::Primary, None, None).validate().is_err());
        assert!(Name::primary("x").validate().is_ok());
    }
}
