//! # Graph Engine
//!
//! Read-only traversal over stored relationships.
//!
//! Every call loads one immutable adjacency view of the relationships it
//! needs, then works purely in memory. Searches are iterative (explicit
//! queue plus visited sets), so deep hierarchies never hit a recursion limit.
//! Neighbor order is deterministic: relationships are visited in id order.

use crate::primitives::DEFAULT_SUBGRAPH_DEPTH;
use crate::storage::{RecordStore, RelationshipQuery};
use crate::types::{Direction, Entity, EntityId, NesError, Relationship, RelationshipKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// RESULT TYPES
// =============================================================================

/// A relationship discovered by `traverse`, with the BFS level it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalEdge {
    pub relationship: Relationship,
    /// 1 for edges touching the start entity, 2 for the next ring, and so on.
    pub depth: usize,
}

/// Nodes and edges around a center entity, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct Subgraph {
    pub center: EntityId,
    /// Every endpoint reached, in discovery order, with its stored record when
    /// it still resolves.
    pub nodes: Vec<(EntityId, Option<Entity>)>,
    pub edges: Vec<TraversalEdge>,
}

impl Subgraph {
    /// Display label for a node: the PRIMARY name, else the id.
    #[must_use]
    pub fn label(&self, id: &EntityId) -> String {
        self.nodes
            .iter()
            .find(|(node, _)| node == id)
            .and_then(|(_, entity)| entity.as_ref())
            .map_or_else(|| id.to_string(), Entity::display_name)
    }
}

// =============================================================================
// ADJACENCY VIEW
// =============================================================================

/// Relationships indexed by endpoint. Built once per engine call.
pub(crate) struct Adjacency {
    edges: Vec<Relationship>,
    outgoing: BTreeMap<EntityId, Vec<usize>>,
    incoming: BTreeMap<EntityId, Vec<usize>>,
}

impl Adjacency {
    pub(crate) fn load<S: RecordStore + ?Sized>(
        store: &S,
        kind: Option<RelationshipKind>,
    ) -> Result<Self, NesError> {
        let query = RelationshipQuery {
            kind,
            ..RelationshipQuery::default()
        };
        Ok(Self::from_relationships(store.list_relationships(&query)?))
    }

    pub(crate) fn from_relationships(edges: Vec<Relationship>) -> Self {
        let mut outgoing: BTreeMap<EntityId, Vec<usize>> = BTreeMap::new();
        let mut incoming: BTreeMap<EntityId, Vec<usize>> = BTreeMap::new();
        for (idx, rel) in edges.iter().enumerate() {
            outgoing.entry(rel.source.clone()).or_default().push(idx);
            incoming.entry(rel.target.clone()).or_default().push(idx);
        }
        Self {
            edges,
            outgoing,
            incoming,
        }
    }

    pub(crate) fn edges(&self) -> &[Relationship] {
        &self.edges
    }

    pub(crate) fn edge(&self, idx: usize) -> &Relationship {
        &self.edges[idx]
    }

    /// Edge indices leaving `node`.
    pub(crate) fn outgoing(&self, node: &EntityId) -> &[usize] {
        self.outgoing.get(node).map_or(&[], Vec::as_slice)
    }

    /// Edge indices touching `node` on the requested side(s).
    fn touching(&self, node: &EntityId, direction: Direction) -> Vec<usize> {
        let incoming = self.incoming.get(node).map_or(&[][..], Vec::as_slice);
        match direction {
            Direction::Outgoing => self.outgoing(node).to_vec(),
            Direction::Incoming => incoming.to_vec(),
            Direction::Both => {
                let mut all: Vec<usize> = self.outgoing(node).iter().chain(incoming).copied().collect();
                all.sort_unstable();
                all.dedup();
                all
            }
        }
    }
}

// =============================================================================
// GRAPH ENGINE
// =============================================================================

/// Traversal, path search and subgraph extraction over a `RecordStore`.
#[derive(Debug)]
pub struct GraphEngine<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> GraphEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Breadth-first traversal from `start`.
    ///
    /// Each relationship is reported once, tagged with the level at which it
    /// was first seen. Entities at `max_depth` are not expanded further;
    /// `None` walks the whole reachable component.
    pub fn traverse(
        &self,
        start: &EntityId,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> Result<Vec<TraversalEdge>, NesError> {
        if !self.store.contains_entity(start)? {
            return Err(NesError::NotFound(format!("entity {}", start)));
        }
        let adjacency = Adjacency::load(self.store, None)?;
        Ok(bfs(&adjacency, start, direction, max_depth))
    }

    /// Entities reachable from `start` within `max_depth` hops, excluding `start`.
    pub fn reachable(
        &self,
        start: &EntityId,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> Result<BTreeSet<EntityId>, NesError> {
        let mut reached = BTreeSet::new();
        for edge in self.traverse(start, direction, max_depth)? {
            reached.insert(edge.relationship.source);
            reached.insert(edge.relationship.target);
        }
        reached.remove(start);
        Ok(reached)
    }

    /// Shortest path (fewest edges) from `source` to `target` following only
    /// outgoing edges.
    ///
    /// Returns `Some(vec![])` when `source == target` and `None` when the
    /// target is unreachable within `max_depth` edges.
    pub fn find_path(
        &self,
        source: &EntityId,
        target: &EntityId,
        max_depth: Option<usize>,
    ) -> Result<Option<Vec<Relationship>>, NesError> {
        if source == target {
            return Ok(Some(Vec::new()));
        }
        let adjacency = Adjacency::load(self.store, None)?;
        Ok(shortest_path(&adjacency, source, target, max_depth)
            .map(|path| path.into_iter().map(|idx| adjacency.edge(idx).clone()).collect()))
    }

    /// Both-direction neighborhood of `center`, with endpoint records resolved.
    pub fn subgraph(&self, center: &EntityId, depth: Option<usize>) -> Result<Subgraph, NesError> {
        let depth = depth.unwrap_or(DEFAULT_SUBGRAPH_DEPTH);
        let edges = self.traverse(center, Direction::Both, Some(depth))?;

        let mut seen = BTreeSet::new();
        let mut order = vec![center.clone()];
        seen.insert(center.clone());
        for edge in &edges {
            for id in [&edge.relationship.source, &edge.relationship.target] {
                if seen.insert(id.clone()) {
                    order.push(id.clone());
                }
            }
        }

        let mut nodes = Vec::with_capacity(order.len());
        for id in order {
            let entity = self.store.get_entity(&id)?;
            nodes.push((id, entity));
        }
        tracing::debug!(
            "Subgraph around {}: {} nodes, {} edges",
            center,
            nodes.len(),
            edges.len()
        );
        Ok(Subgraph {
            center: center.clone(),
            nodes,
            edges,
        })
    }
}

// =============================================================================
// SEARCHES
// =============================================================================

fn bfs(
    adjacency: &Adjacency,
    start: &EntityId,
    direction: Direction,
    max_depth: Option<usize>,
) -> Vec<TraversalEdge> {
    let mut visited_entities = BTreeSet::new();
    let mut visited_edges = BTreeSet::new();
    let mut queue = VecDeque::new();
    let mut found = Vec::new();

    visited_entities.insert(start.clone());
    queue.push_back((start.clone(), 0usize));

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        let next_depth = depth.saturating_add(1);

        for idx in adjacency.touching(&current, direction) {
            if !visited_edges.insert(idx) {
                continue;
            }
            let rel = adjacency.edge(idx);
            found.push(TraversalEdge {
                relationship: rel.clone(),
                depth: next_depth,
            });

            if let Some(next) = rel.other_end(&current) {
                if visited_entities.insert(next.clone()) {
                    queue.push_back((next.clone(), next_depth));
                }
            }
        }
    }
    found
}

/// BFS over outgoing edges. Returns edge indices from `source` to `target`.
pub(crate) fn shortest_path(
    adjacency: &Adjacency,
    source: &EntityId,
    target: &EntityId,
    max_depth: Option<usize>,
) -> Option<Vec<usize>> {
    let mut via: BTreeMap<EntityId, usize> = BTreeMap::new();
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();

    visited.insert(source.clone());
    queue.push_back((source.clone(), 0usize));

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        for &idx in adjacency.outgoing(&current) {
            let next = &adjacency.edge(idx).target;
            if next == target {
                let mut path = vec![idx];
                let mut cursor = current.clone();
                while let Some(&back) = via.get(&cursor) {
                    path.push(back);
                    cursor = adjacency.edge(back).source.clone();
                }
                path.reverse();
                return Some(path);
            }
            if visited.insert(next.clone()) {
                via.insert(next.clone(), idx);
                queue.push_back((next.clone(), depth.saturating_add(1)));
            }
        }
    }
    None
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::publisher::VersionedPublisher;
    use crate::storage::FileStore;
    use crate::types::{EntityDraft, EntityKind, Name, RelationshipDraft};
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        publisher: VersionedPublisher<FileStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let store = FileStore::open(dir.path()).unwrap();
            Self {
                _dir: dir,
                publisher: VersionedPublisher::new(store),
            }
        }

        fn person(&mut self, slug: &str) -> EntityId {
            self.publisher
                .create_entity(
                    EntityDraft::new(EntityKind::Person, None, slug, vec![Name::primary(slug)]),
                    "tester",
                    "fixture",
                )
                .unwrap()
                .id()
        }

        fn link(&mut self, source: &EntityId, target: &EntityId, kind: RelationshipKind) {
            self.publisher
                .create_relationship(
                    RelationshipDraft::new(source.clone(), target.clone(), kind),
                    "tester",
                    "fixture",
                )
                .unwrap();
        }

        fn engine(&self) -> GraphEngine<'_, FileStore> {
            GraphEngine::new(self.publisher.store())
        }
    }

    /// a -> b -> c -> d, plus e -> b
    fn chain() -> (Fixture, Vec<EntityId>) {
        let mut fx = Fixture::new();
        let ids: Vec<EntityId> = ["aaa", "bbb", "ccc", "ddd", "eee"]
            .iter()
            .map(|slug| fx.person(slug))
            .collect();
        fx.link(&ids[0], &ids[1], RelationshipKind::Supervises);
        fx.link(&ids[1], &ids[2], RelationshipKind::Supervises);
        fx.link(&ids[2], &ids[3], RelationshipKind::Supervises);
        fx.link(&ids[4], &ids[1], RelationshipKind::MemberOf);
        (fx, ids)
    }

    #[test]
    fn traverse_respects_depth_and_direction() {
        let (fx, ids) = chain();
        let engine = fx.engine();

        let one = engine.reachable(&ids[1], Direction::Both, Some(1)).unwrap();
        assert_eq!(
            one,
            [ids[0].clone(), ids[2].clone(), ids[4].clone()].into_iter().collect()
        );

        let out_two = engine.reachable(&ids[0], Direction::Outgoing, Some(2)).unwrap();
        assert_eq!(out_two, [ids[1].clone(), ids[2].clone()].into_iter().collect());

        let all = engine.reachable(&ids[0], Direction::Outgoing, None).unwrap();
        assert_eq!(all.len(), 3);

        let incoming = engine.reachable(&ids[1], Direction::Incoming, None).unwrap();
        assert_eq!(incoming, [ids[0].clone(), ids[4].clone()].into_iter().collect());
    }

    #[test]
    fn traverse_tags_depth_and_reports_edges_once() {
        let (fx, ids) = chain();
        let edges = fx.engine().traverse(&ids[0], Direction::Both, None).unwrap();
        assert_eq!(edges.len(), 4);
        let depths: Vec<usize> = edges.iter().map(|e| e.depth).collect();
        assert_eq!(depths[0], 1);
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn traverse_terminates_on_cycles() {
        let mut fx = Fixture::new();
        let a = fx.person("aaa");
        let b = fx.person("bbb");
        fx.link(&a, &b, RelationshipKind::Supervises);
        fx.link(&b, &a, RelationshipKind::Supervises);
        let edges = fx.engine().traverse(&a, Direction::Both, None).unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn traverse_missing_start_is_not_found() {
        let fx = Fixture::new();
        let ghost = EntityId::new(EntityKind::Person, None, "ghost-person");
        assert!(matches!(
            fx.engine().traverse(&ghost, Direction::Both, None),
            Err(NesError::NotFound(_))
        ));
    }

    #[test]
    fn find_path_is_shortest_and_outgoing_only() {
        let (mut fx, ids) = chain();
        fx.link(&ids[0], &ids[3], RelationshipKind::AffiliatedWith);
        let engine = fx.engine();

        let path = engine.find_path(&ids[0], &ids[3], None).unwrap().unwrap();
        assert_eq!(path.len(), 1);

        let path = engine.find_path(&ids[4], &ids[3], None).unwrap().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].source, ids[4]);
        assert_eq!(path[2].target, ids[3]);

        // Only outgoing edges are followed.
        assert!(engine.find_path(&ids[3], &ids[0], None).unwrap().is_none());
        // Depth-exhausted.
        assert!(engine.find_path(&ids[4], &ids[3], Some(2)).unwrap().is_none());
        // Same node.
        assert_eq!(engine.find_path(&ids[2], &ids[2], None).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn subgraph_resolves_labels() {
        let (fx, ids) = chain();
        let sub = fx.engine().subgraph(&ids[1], Some(1)).unwrap();
        assert_eq!(sub.nodes[0].0, ids[1]);
        assert_eq!(sub.nodes.len(), 4);
        assert_eq!(sub.edges.len(), 3);
        assert_eq!(sub.label(&ids[0]), "aaa");
    }
}
