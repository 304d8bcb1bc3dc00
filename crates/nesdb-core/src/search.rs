//! # Name Search
//!
//! Relevance scoring shared by every `RecordStore` backend.
//!
//! Scoring, per name and per language variant (case-insensitive):
//! - full name: exact 100, contains 50
//! - given / middle / family name: exact 75, contains 25
//! - every hit adds a bonus of 20 for a PRIMARY name, 10 otherwise

use crate::storage::{EntityQuery, paginate};
use crate::types::{Entity, NameKind};

const FULL_EXACT: u32 = 100;
const FULL_CONTAINS: u32 = 50;
const PART_EXACT: u32 = 75;
const PART_CONTAINS: u32 = 25;
const PRIMARY_BONUS: u32 = 20;
const OTHER_BONUS: u32 = 10;

fn score_field(field: &str, needle: &str, exact: u32, contains: u32, bonus: u32) -> u32 {
    let field = field.to_lowercase();
    if field == needle {
        exact + bonus
    } else if field.contains(needle) {
        contains + bonus
    } else {
        0
    }
}

/// Relevance of `entity` for an already lower-cased `needle`. Zero means no match.
#[must_use]
pub fn relevance_score(entity: &Entity, needle: &str) -> u32 {
    let mut score = 0u32;
    for name in &entity.names {
        let bonus = if name.kind == NameKind::Primary {
            PRIMARY_BONUS
        } else {
            OTHER_BONUS
        };
        for parts in name.parts() {
            score = score.saturating_add(score_field(&parts.full, needle, FULL_EXACT, FULL_CONTAINS, bonus));
            for part in [&parts.given, &parts.middle, &parts.family].into_iter().flatten() {
                score = score.saturating_add(score_field(part, needle, PART_EXACT, PART_CONTAINS, bonus));
            }
        }
    }
    score
}

/// Filter, rank and paginate a candidate set.
///
/// Without query text every filtered entity is returned in id order. With
/// text, non-matching entities are dropped and the rest are ordered by
/// descending score, ties broken by id.
#[must_use]
pub fn rank(candidates: impl IntoIterator<Item = Entity>, query: &EntityQuery) -> Vec<Entity> {
    let needle = query
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);

    let mut scored: Vec<(u32, String, Entity)> = candidates
        .into_iter()
        .filter(|entity| query.matches(entity))
        .filter_map(|entity| {
            let score = match &needle {
                Some(needle) => relevance_score(&entity, needle),
                None => 0,
            };
            if needle.is_some() && score == 0 {
                return None;
            }
            Some((score, entity.id().to_string(), entity))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    paginate(
        scored.into_iter().map(|(_, _, entity)| entity).collect(),
        query.offset,
        query.limit,
    )
}
