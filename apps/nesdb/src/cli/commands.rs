//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use chrono::Local;
use nesdb_core::{
    CachedView, Direction, EntityId, EntityKind, EntityQuery, EntitySubKind, ExportFormat,
    FileStore, GitJournal, GraphEngine, IntegrityEngine, MigrationEngine, MigrationOutcome,
    MigrationStatus, MigrationUnit, NesConfig, NesError, RecordStore, RelationshipId,
    RelationshipKind, RunOptions, RunSummary, Version, VersionedPublisher, render,
};
use serde_json::json;
use std::path::Path;

const RELATIONSHIP_ID_PREFIX: &str = "relationship:";

/// Flags of the `run` subcommand.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub all: bool,
    pub dry_run: bool,
    pub force: bool,
    pub no_commit: bool,
    pub continue_on_failure: bool,
}

// =============================================================================
// HELPERS
// =============================================================================

/// Open the record tree, with the type index when configured.
pub fn open_store(config: &NesConfig) -> Result<FileStore, NesError> {
    if config.type_index {
        FileStore::with_type_index(&config.data_root)
    } else {
        FileStore::open(&config.data_root)
    }
}

fn open_view(config: &NesConfig) -> Result<CachedView<FileStore>, NesError> {
    Ok(CachedView::new(open_store(config)?, config.query_cache_ttl()))
}

fn open_engine(config: &NesConfig) -> Result<MigrationEngine<FileStore, GitJournal>, NesError> {
    let publisher = VersionedPublisher::new(open_store(config)?);
    let journal = GitJournal::new(&config.data_root);
    Ok(MigrationEngine::from_config(config, publisher, journal))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn to_json_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, NesError> {
    serde_json::to_value(value).map_err(|e| NesError::SerializationError(e.to_string()))
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// "party-seats" -> "Party seats"
fn describe(name: &str) -> String {
    let words = name.replace(['-', '_'], " ");
    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn unit_json(unit: &MigrationUnit, applied: bool) -> serde_json::Value {
    json!({
        "name": unit.full_name(),
        "author": unit.author,
        "date": unit.date.to_string(),
        "description": unit.description,
        "applied": applied,
    })
}

fn outcome_json(outcome: &MigrationOutcome) -> serde_json::Value {
    json!({
        "name": outcome.unit_name,
        "status": outcome.status,
        "duration_ms": millis(outcome.duration),
        "entities_created": outcome.entities_created,
        "relationships_created": outcome.relationships_created,
        "error": outcome.error,
        "entries": outcome.entry_ids,
        "logs": outcome.logs,
    })
}

fn print_version_line(version: &Version) {
    let summary = &version.summary;
    println!(
        "  v{:<4} {}  {:<24} {}",
        summary.version_number,
        summary.created_at.format("%Y-%m-%d %H:%M:%S"),
        summary.author.slug,
        summary.change_description
    );
}

// =============================================================================
// MIGRATION COMMANDS
// =============================================================================

/// List every discovered unit with its applied state.
pub fn cmd_list(config: &NesConfig, json_mode: bool) -> Result<(), NesError> {
    let mut engine = open_engine(config)?;
    let units = engine.discover()?;
    let applied = engine.applied();

    if json_mode {
        let list: Vec<_> = units
            .iter()
            .map(|u| unit_json(u, applied.contains(&u.full_name())))
            .collect();
        print_json(&json!({ "migrations": list, "total": units.len() }));
        return Ok(());
    }

    if units.is_empty() {
        println!("No migrations found in {:?}", config.migrations_dir);
        return Ok(());
    }
    println!("Migrations");
    println!("==========");
    for unit in &units {
        let mark = if applied.contains(&unit.full_name()) { "x" } else { " " };
        println!("  [{}] {:<40} {}", mark, unit.full_name(), unit.description);
    }
    println!();
    println!("{} total, {} applied", units.len(), applied.len());
    Ok(())
}

/// List units not yet applied.
pub fn cmd_pending(config: &NesConfig, json_mode: bool) -> Result<(), NesError> {
    let mut engine = open_engine(config)?;
    let pending = engine.pending()?;

    if json_mode {
        let list: Vec<_> = pending.iter().map(|u| unit_json(u, false)).collect();
        print_json(&json!({ "pending": list, "total": pending.len() }));
        return Ok(());
    }

    if pending.is_empty() {
        println!("No pending migrations");
        return Ok(());
    }
    println!("Pending migrations ({}):", pending.len());
    for unit in &pending {
        println!("  {:<40} {}", unit.full_name(), unit.description);
    }
    Ok(())
}

/// Run one unit, or every pending unit with `--all`.
///
/// Fails (and so exits non-zero) when any unit failed.
pub fn cmd_run(
    config: &NesConfig,
    json_mode: bool,
    name: Option<&str>,
    flags: RunFlags,
) -> Result<(), NesError> {
    let mut engine = open_engine(config)?;
    let options = RunOptions {
        dry_run: flags.dry_run,
        auto_commit: !flags.no_commit,
        force: flags.force,
    };

    let outcomes = if flags.all {
        if flags.force {
            tracing::warn!("--force is ignored with --all");
        }
        let pending = engine.pending()?;
        if pending.is_empty() && !json_mode {
            println!("No pending migrations");
        }
        engine.run_many(&pending, options, !flags.continue_on_failure)
    } else {
        let wanted = name.ok_or_else(|| {
            NesError::ValidationError("a migration name or --all is required".to_string())
        })?;
        let unit = engine
            .discover()?
            .into_iter()
            .find(|u| u.full_name() == wanted || u.name == wanted)
            .ok_or_else(|| NesError::NotFound(format!("migration {}", wanted)))?;
        vec![engine.run(&unit, options)]
    };

    let summary = RunSummary::of(&outcomes);

    if json_mode {
        let list: Vec<_> = outcomes.iter().map(outcome_json).collect();
        print_json(&json!({
            "outcomes": list,
            "completed": summary.completed,
            "skipped": summary.skipped,
            "failed": summary.failed,
            "entities_created": summary.entities_created,
            "relationships_created": summary.relationships_created,
            "dry_run": flags.dry_run,
        }));
    } else {
        for outcome in &outcomes {
            println!(
                "{:<40} {:<10} {:>8.1?}  +{} entities, +{} relationships",
                outcome.unit_name,
                outcome.status.to_string(),
                outcome.duration,
                outcome.entities_created,
                outcome.relationships_created
            );
            for line in &outcome.logs {
                println!("    {}", line);
            }
            if let Some(error) = &outcome.error {
                println!("    error: {}", error);
            }
        }
        if !outcomes.is_empty() {
            println!();
            println!(
                "{} completed, {} skipped, {} failed",
                summary.completed, summary.skipped, summary.failed
            );
        }
        if flags.dry_run {
            println!("Dry run: changes were left uncommitted");
        }
    }

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.status == MigrationStatus::Failed)
        .map(|o| o.unit_name.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(NesError::MigrationFailed(format!(
            "{} migration(s) failed: {}",
            failed.len(),
            failed.join(", ")
        )))
    }
}

/// Scaffold a new unit dated today.
pub fn cmd_create(
    config: &NesConfig,
    json_mode: bool,
    name: &str,
    author: &str,
    description: Option<&str>,
) -> Result<(), NesError> {
    let description = description.map_or_else(|| describe(name), str::to_string);
    let today = Local::now().date_naive();
    let unit = nesdb_core::migration::create_unit(
        &config.migrations_dir,
        name,
        author,
        &description,
        today,
    )?;

    if json_mode {
        print_json(&json!({
            "name": unit.full_name(),
            "path": unit.dir.to_string_lossy(),
            "entry": unit.entry,
        }));
        return Ok(());
    }

    println!("Created migration {}", unit.full_name());
    println!("  Path:  {:?}", unit.dir);
    println!("  Entry: {}", unit.entry);
    Ok(())
}

// =============================================================================
// RECORD COMMANDS
// =============================================================================

/// Print one entity or relationship record as JSON.
pub fn cmd_show(config: &NesConfig, json_mode: bool, id: &str) -> Result<(), NesError> {
    let store = open_store(config)?;

    let value = if id.starts_with(RELATIONSHIP_ID_PREFIX) {
        let rid = RelationshipId::parse(id)?;
        let relationship = store
            .get_relationship(&rid)?
            .ok_or_else(|| NesError::NotFound(format!("relationship {}", rid)))?;
        if !json_mode {
            println!(
                "{} -[{}]-> {}",
                relationship.source, relationship.kind, relationship.target
            );
        }
        to_json_value(&relationship)?
    } else {
        let eid = EntityId::parse(id)?;
        let entity = store
            .get_entity(&eid)?
            .ok_or_else(|| NesError::NotFound(format!("entity {}", eid)))?;
        if !json_mode {
            println!("{} ({})", entity.display_name(), eid);
        }
        to_json_value(&entity)?
    };

    print_json(&value);
    Ok(())
}

/// Print the version history of an entity or relationship.
pub fn cmd_versions(config: &NesConfig, json_mode: bool, id: &str) -> Result<(), NesError> {
    let publisher = VersionedPublisher::new(open_store(config)?);

    let versions = if id.starts_with(RELATIONSHIP_ID_PREFIX) {
        publisher.get_relationship_versions(&RelationshipId::parse(id)?)?
    } else {
        publisher.get_entity_versions(&EntityId::parse(id)?)?
    };

    if json_mode {
        print_json(&json!({ "id": id, "versions": to_json_value(&versions)? }));
        return Ok(());
    }

    println!("Versions of {} ({}):", id, versions.len());
    for version in &versions {
        print_version_line(version);
    }
    Ok(())
}

/// Free-text entity search.
pub fn cmd_search(
    config: &NesConfig,
    json_mode: bool,
    text: &str,
    kind: Option<&str>,
    sub_kind: Option<&str>,
    limit: usize,
) -> Result<(), NesError> {
    let view = open_view(config)?;

    let mut query = EntityQuery::text(text).page(limit, 0);
    if let Some(kind) = kind {
        query.kind = Some(kind.parse::<EntityKind>()?);
    }
    if let Some(sub_kind) = sub_kind {
        query = query.sub_kind(sub_kind.parse::<EntitySubKind>()?);
    }
    let results = view.search_entities(&query)?;

    if json_mode {
        let list: Vec<_> = results
            .iter()
            .map(|e| json!({ "id": e.id().to_string(), "name": e.display_name() }))
            .collect();
        print_json(&json!({ "query": text, "results": list, "count": results.len() }));
        return Ok(());
    }

    if results.is_empty() {
        println!("No entities match '{}'", text);
        return Ok(());
    }
    for entity in &results {
        println!("  {:<60} {}", entity.id().to_string(), entity.display_name());
    }
    Ok(())
}

// =============================================================================
// GRAPH COMMANDS
// =============================================================================

/// Breadth-first traversal from an entity.
pub fn cmd_traverse(
    config: &NesConfig,
    json_mode: bool,
    id: &str,
    direction: &str,
    depth: Option<usize>,
) -> Result<(), NesError> {
    let start = EntityId::parse(id)?;
    let direction = direction.parse::<Direction>()?;
    let view = open_view(config)?;
    let edges = GraphEngine::new(&view).traverse(&start, direction, depth)?;

    if json_mode {
        let list: Vec<_> = edges
            .iter()
            .map(|edge| {
                json!({
                    "id": edge.relationship.id().to_string(),
                    "source": edge.relationship.source.to_string(),
                    "target": edge.relationship.target.to_string(),
                    "kind": edge.relationship.kind,
                    "depth": edge.depth,
                })
            })
            .collect();
        print_json(&json!({ "start": id, "edges": list, "count": edges.len() }));
        return Ok(());
    }

    if edges.is_empty() {
        println!("{} has no relationships in that direction", start);
        return Ok(());
    }
    for edge in &edges {
        println!(
            "  [{}] {} -[{}]-> {}",
            edge.depth, edge.relationship.source, edge.relationship.kind, edge.relationship.target
        );
    }
    Ok(())
}

/// Shortest outgoing path between two entities.
pub fn cmd_path(
    config: &NesConfig,
    json_mode: bool,
    source: &str,
    target: &str,
    depth: Option<usize>,
) -> Result<(), NesError> {
    let from = EntityId::parse(source)?;
    let to = EntityId::parse(target)?;
    let view = open_view(config)?;
    let path = GraphEngine::new(&view).find_path(&from, &to, depth)?;

    if json_mode {
        let hops = path.as_ref().map(|p| {
            p.iter()
                .map(|r| r.id().to_string())
                .collect::<Vec<_>>()
        });
        print_json(&json!({
            "source": source,
            "target": target,
            "found": hops.is_some(),
            "path": hops,
        }));
        return Ok(());
    }

    match path {
        None => println!("No path from {} to {}", from, to),
        Some(hops) if hops.is_empty() => println!("{} is the target itself", from),
        Some(hops) => {
            println!("Path ({} hops):", hops.len());
            for rel in &hops {
                println!("  {} -[{}]-> {}", rel.source, rel.kind, rel.target);
            }
        }
    }
    Ok(())
}

/// Render an entity's neighborhood to a file or stdout.
pub fn cmd_export(
    config: &NesConfig,
    id: &str,
    format: &str,
    depth: Option<usize>,
    output: Option<&Path>,
) -> Result<(), NesError> {
    let center = EntityId::parse(id)?;
    let format = format.parse::<ExportFormat>()?;
    let view = open_view(config)?;
    let subgraph = GraphEngine::new(&view).subgraph(&center, depth)?;
    let text = render(&subgraph, format)?;

    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .map_err(|e| NesError::IoError(format!("write {}: {}", path.display(), e)))?;
            tracing::info!(
                "Exported {} nodes and {} edges to {:?}",
                subgraph.nodes.len(),
                subgraph.edges.len(),
                path
            );
        }
        None => println!("{}", text),
    }
    Ok(())
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

/// Report hierarchy cycles, duplicate and orphaned relationships.
pub fn cmd_integrity(config: &NesConfig, json_mode: bool, kind: Option<&str>) -> Result<(), NesError> {
    let kind = kind.map(str::parse::<RelationshipKind>).transpose()?;
    let view = open_view(config)?;
    let report = IntegrityEngine::new(&view).report(kind)?;

    if json_mode {
        print_json(&json!({
            "clean": report.is_clean(),
            "report": to_json_value(&report)?,
        }));
        return Ok(());
    }

    println!("Integrity Report");
    println!("================");
    println!("Cycles:     {}", report.cycles.len());
    for cycle in &report.cycles {
        let ids: Vec<String> = cycle.iter().map(|r| r.source.to_string()).collect();
        println!("  {}", ids.join(" -> "));
    }
    println!("Duplicates: {}", report.duplicates.len());
    for group in &report.duplicates {
        if let Some(first) = group.first() {
            println!("  {} x{}", first.id(), group.len());
        }
    }
    println!("Orphans:    {}", report.orphans.len());
    for orphan in &report.orphans {
        println!("  {}", orphan.id());
    }
    if report.is_clean() {
        println!();
        println!("No problems found");
    }
    Ok(())
}

/// Rebuild the by-type index from the entity tree.
pub fn cmd_reindex(config: &NesConfig, json_mode: bool) -> Result<(), NesError> {
    let mut store = FileStore::with_type_index(&config.data_root)?;
    let count = store.rebuild_index()?;

    if json_mode {
        print_json(&json!({ "indexed": count }));
    } else {
        println!("Indexed {} entities", count);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn describe_humanizes_slug() {
        assert_eq!(describe("party-seats"), "Party seats");
        assert_eq!(describe("ward_boundaries"), "Ward boundaries");
        assert_eq!(describe(""), "");
    }

    #[test]
    fn reindex_counts_entities() {
        let dir = tempfile::tempdir().unwrap();
        let config = NesConfig {
            data_root: dir.path().to_path_buf(),
            ..NesConfig::default()
        };
        cmd_reindex(&config, true).unwrap();
    }
}
