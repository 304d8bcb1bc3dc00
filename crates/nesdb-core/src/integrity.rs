//! # Integrity Engine
//!
//! Advisory checks over the stored relationship set. Nothing here is enforced
//! at write time; callers decide what to do with the findings.
//!
//! - cycles, only among hierarchical kinds (`SUPERVISES`, `PARENT_OF`, `CHILD_OF`)
//! - duplicate `(source, target, kind)` triples
//! - orphans whose source or target no longer resolves

use crate::graph::{Adjacency, shortest_path};
use crate::storage::{RecordStore, RelationshipQuery};
use crate::types::{Direction, EntityId, NesError, Relationship, RelationshipKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Everything `IntegrityEngine::report` found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// Each cycle as an ordered edge list; the last edge closes back to the
    /// first edge's source.
    pub cycles: Vec<Vec<Relationship>>,
    pub duplicates: Vec<Vec<Relationship>>,
    pub orphans: Vec<Relationship>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty() && self.duplicates.is_empty() && self.orphans.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityEngine<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> IntegrityEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Would adding `source -> target` of `kind` close a cycle?
    ///
    /// Always `false` for non-hierarchical kinds; always `true` for a
    /// hierarchical self-loop.
    pub fn is_circular(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: RelationshipKind,
    ) -> Result<bool, NesError> {
        if !kind.is_hierarchical() {
            return Ok(false);
        }
        if source == target {
            return Ok(true);
        }
        let adjacency = Adjacency::load(self.store, Some(kind))?;
        Ok(shortest_path(&adjacency, target, source, None).is_some())
    }

    /// Every cycle among hierarchical relationships, optionally narrowed to
    /// one kind. Edges are only followed within their own kind, and an edge
    /// already reported in one cycle does not seed another.
    pub fn find_all_cycles(
        &self,
        kind: Option<RelationshipKind>,
    ) -> Result<Vec<Vec<Relationship>>, NesError> {
        let kinds: Vec<RelationshipKind> = match kind {
            Some(kind) if kind.is_hierarchical() => vec![kind],
            Some(_) => return Ok(Vec::new()),
            None => RelationshipKind::HIERARCHICAL.to_vec(),
        };

        let mut cycles = Vec::new();
        for kind in kinds {
            let adjacency = Adjacency::load(self.store, Some(kind))?;
            let mut processed = BTreeSet::new();

            for (idx, rel) in adjacency.edges().iter().enumerate() {
                if processed.contains(&idx) {
                    continue;
                }
                let cycle = if rel.source == rel.target {
                    Some(vec![idx])
                } else {
                    shortest_path(&adjacency, &rel.target, &rel.source, None).map(|back| {
                        let mut cycle = vec![idx];
                        cycle.extend(back);
                        cycle
                    })
                };
                if let Some(cycle) = cycle {
                    processed.extend(cycle.iter().copied());
                    cycles.push(cycle.into_iter().map(|i| adjacency.edge(i).clone()).collect());
                }
            }
        }
        if !cycles.is_empty() {
            tracing::info!("Found {} hierarchical cycles", cycles.len());
        }
        Ok(cycles)
    }

    /// Groups of relationships sharing one `(source, target, kind)` triple.
    pub fn find_duplicates(&self) -> Result<Vec<Vec<Relationship>>, NesError> {
        let mut groups: BTreeMap<(EntityId, EntityId, RelationshipKind), Vec<Relationship>> =
            BTreeMap::new();
        for rel in self.store.list_relationships(&RelationshipQuery::default())? {
            groups
                .entry((rel.source.clone(), rel.target.clone(), rel.kind))
                .or_default()
                .push(rel);
        }
        Ok(groups.into_values().filter(|group| group.len() > 1).collect())
    }

    /// Whether a `source -> target` relationship of `kind` is already stored,
    /// i.e. whether creating one would add a duplicate.
    pub fn has_duplicate(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: RelationshipKind,
    ) -> Result<bool, NesError> {
        let query = RelationshipQuery::touching(source.clone(), Direction::Outgoing).kind(kind);
        Ok(self
            .store
            .list_relationships(&query)?
            .iter()
            .any(|rel| &rel.target == target))
    }

    /// Relationships with a dangling source or target.
    pub fn find_orphans(&self) -> Result<Vec<Relationship>, NesError> {
        let mut exists: BTreeMap<EntityId, bool> = BTreeMap::new();
        let mut orphans = Vec::new();
        for rel in self.store.list_relationships(&RelationshipQuery::default())? {
            let mut dangling = false;
            for endpoint in [&rel.source, &rel.target] {
                let present = match exists.get(endpoint) {
                    Some(&present) => present,
                    None => {
                        let present = self.store.contains_entity(endpoint)?;
                        exists.insert(endpoint.clone(), present);
                        present
                    }
                };
                dangling |= !present;
            }
            if dangling {
                orphans.push(rel);
            }
        }
        Ok(orphans)
    }

    /// Cycles, duplicates and orphans in one pass over the store.
    pub fn report(&self, kind: Option<RelationshipKind>) -> Result<IntegrityReport, NesError> {
        let report = IntegrityReport {
            cycles: self.find_all_cycles(kind)?,
            duplicates: self.find_duplicates()?,
            orphans: self.find_orphans()?,
        };
        tracing::info!(
            "Integrity report: {} cycles, {} duplicate groups, {} orphans",
            report.cycles.len(),
            report.duplicates.len(),
            report.orphans.len()
        );
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
