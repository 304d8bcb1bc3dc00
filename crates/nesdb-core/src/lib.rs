//! # nesdb-core
//!
//! The versioned civic entity graph - THE STORE.
//!
//! People, organizations and locations are stored as entities, connected by
//! typed and optionally time-bounded relationships. Every accepted mutation
//! produces an immutable, numbered version.
//!
//! ## Engines
//!
//! - `storage`: `RecordStore` trait and the file-per-record `FileStore`
//! - `publisher`: `VersionedPublisher`, the only sanctioned write path
//! - `graph` / `export`: traversal, path finding and subgraph rendering
//! - `integrity`: advisory cycle, duplicate and orphan checks
//! - `migration`: ordered, journal-tracked migration units
//! - `cache`: `CachedView`, a read-only snapshot over any store
//!
//! ## Constraints
//!
//! - Single writer: stores do no locking
//! - Synchronous: no async runtime, no network code
//! - Deterministic: ordered maps wherever output is iterated

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod config;
pub mod export;
pub mod graph;
pub mod integrity;
pub mod migration;
pub mod primitives;
pub mod publisher;
pub mod search;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Records
// =============================================================================

pub use types::{
    Author, AuthorId, Direction, Entity, EntityDraft, EntityId, EntityKind, EntitySubKind, Name,
    NameKind, NesError, Relationship, RelationshipDraft, RelationshipId, RelationshipKind,
    Version, VersionId,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use cache::{CacheStats, CachedView};
pub use config::NesConfig;
pub use export::{ExportFormat, render};
pub use graph::{GraphEngine, Subgraph, TraversalEdge};
pub use integrity::{IntegrityEngine, IntegrityReport};
pub use migration::{
    GitJournal, MemoryJournal, MigrationEngine, MigrationJournal, MigrationOutcome,
    MigrationStatus, MigrationUnit, RunOptions, RunSummary,
};
pub use publisher::VersionedPublisher;
pub use storage::{EntityQuery, FileStore, RecordStore, RelationshipQuery, VersionQuery};
