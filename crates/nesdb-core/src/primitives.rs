//! # Dataset Primitives
//!
//! Fixed limits, patterns and constants shared by every engine.
//!
//! These values are compiled into the binary. Records written by one build
//! must stay readable by the next, so changing a pattern here is a data
//! migration, not a refactor.

use crate::NesError;
use once_cell::sync::Lazy;
use regex::Regex;

// =============================================================================
// IDENTIFIER LIMITS
// =============================================================================

/// Minimum slug length in characters.
pub const MIN_SLUG_LENGTH: usize = 3;

/// Maximum slug length in characters.
pub const MAX_SLUG_LENGTH: usize = 100;

/// Maximum length of an entity kind (`person`, `organization`, ...).
pub const MAX_KIND_LENGTH: usize = 16;

/// Maximum length of an entity sub-kind (`political_party`, ...).
pub const MAX_SUB_KIND_LENGTH: usize = 25;

/// Maximum characters in an entity short description.
pub const MAX_SHORT_DESCRIPTION_LENGTH: usize = 300;

/// Maximum characters in an entity description.
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

// =============================================================================
// GRAPH & MIGRATION CONSTANTS
// =============================================================================

/// Default depth for subgraph exports (visualization).
pub const DEFAULT_SUBGRAPH_DEPTH: usize = 2;

/// Default number of changed files per journal entry before batching kicks in.
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 1000;

/// Subject-line tag that marks a journal entry as a migration application.
pub const MIGRATION_ENTRY_PREFIX: &str = "Migration: ";

/// Name of the metadata file every migration unit must carry.
pub const MIGRATION_METADATA_FILE: &str = "migration.toml";

/// Optional human documentation for a migration unit.
pub const MIGRATION_README_FILE: &str = "README.md";

/// Records file consumed by the built-in `seed-records` procedure.
pub const SEED_RECORDS_FILE: &str = "records.json";

// =============================================================================
// PATTERNS
// =============================================================================

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid slug regex"));

static KIND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_]+$").expect("valid kind regex"));

static MIGRATION_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{3})-([a-z0-9]+(?:-[a-z0-9]+)*)$").expect("valid migration name regex")
});

/// Validate an entity slug: `[a-z0-9-]{3,100}`.
pub fn validate_slug(slug: &str) -> Result<(), NesError> {
    let len = slug.chars().count();
    if !(MIN_SLUG_LENGTH..=MAX_SLUG_LENGTH).contains(&len) {
        return Err(NesError::ValidationError(format!(
            "slug '{}' must be between {} and {} characters",
            slug, MIN_SLUG_LENGTH, MAX_SLUG_LENGTH
        )));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(NesError::ValidationError(format!(
            "slug '{}' may only contain lowercase letters, digits and hyphens",
            slug
        )));
    }
    Ok(())
}

/// Validate a kind or sub-kind token against `[a-z_]+` and a length cap.
pub fn validate_kind_token(token: &str, max_len: usize) -> Result<(), NesError> {
    if token.is_empty() || token.len() > max_len || !KIND_RE.is_match(token) {
        return Err(NesError::ValidationError(format!(
            "kind '{}' must match [a-z_]+ and be at most {} characters",
            token, max_len
        )));
    }
    Ok(())
}

/// Validate an author slug. Authors are looser than entity slugs: any
/// non-empty `[a-z0-9-]+` is accepted.
pub fn validate_author_slug(slug: &str) -> Result<(), NesError> {
    if !SLUG_RE.is_match(slug) {
        return Err(NesError::ValidationError(format!(
            "author slug '{}' may only contain lowercase letters, digits and hyphens",
            slug
        )));
    }
    Ok(())
}

/// Split a migration folder name into `(prefix, name)`.
///
/// Returns `None` unless the whole string matches `^\d{3}-[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn split_migration_name(folder: &str) -> Option<(u16, &str)> {
    let captures = MIGRATION_NAME_RE.captures(folder)?;
    let prefix = captures.get(1)?.as_str().parse::<u16>().ok()?;
    let name = captures.get(2)?.as_str();
    Some((prefix, name))
}
