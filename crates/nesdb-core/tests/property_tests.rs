//! # Property-Based Tests
//!
//! Identity, versioning, traversal and journal invariants under proptest.

use nesdb_core::migration::parse_applied;
use nesdb_core::{
    Direction, EntityDraft, EntityId, EntityKind, EntitySubKind, FileStore, GraphEngine, Name,
    RelationshipDraft, RelationshipKind, VersionedPublisher,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use tempfile::tempdir;

fn slug_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{2,30}"
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Entity ids are a pure function of (kind, sub-kind, slug).
    #[test]
    fn entity_id_is_pure(slug in slug_strategy()) {
        let a = EntityId::new(EntityKind::Location, Some(EntitySubKind::District), &slug);
        let b = EntityId::new(EntityKind::Location, Some(EntitySubKind::District), &slug);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.as_str(), format!("entity:location/district/{}", slug));
        prop_assert_eq!(EntityId::parse(a.as_str()).expect("parse"), a);

        let draft = EntityDraft::new(
            EntityKind::Location,
            Some(EntitySubKind::District),
            slug.clone(),
            vec![Name::primary("x")],
        );
        prop_assert_eq!(draft.id(), b);
    }

    /// Any number of updates yields versions 1..=n+1 with no gaps.
    #[test]
    fn versions_have_no_gaps(updates in 0usize..8) {
        let dir = tempdir().expect("tempdir");
        let mut publisher = VersionedPublisher::new(FileStore::open(dir.path()).expect("open"));
        let id = publisher
            .create_entity(
                EntityDraft::new(EntityKind::Person, None, "ram-bahadur", vec![Name::primary("Ram")]),
                "tester",
                "create",
            )
            .expect("create")
            .id();
        for i in 0..updates {
            let mut entity = publisher.get_entity(&id).expect("get");
            entity.tags = vec![format!("rev-{}", i)];
            publisher.update_entity(entity, "tester", "update").expect("update");
        }
        let numbers: Vec<u32> = publisher
            .get_entity_versions(&id)
            .expect("versions")
            .iter()
            .map(|v| v.summary.version_number)
            .collect();
        let expected: Vec<u32> = (1..=updates as u32 + 1).collect();
        prop_assert_eq!(numbers, expected);
    }

    /// Reachable sets grow monotonically with depth and stop at the full set.
    #[test]
    fn traversal_depth_is_monotone(
        edges in vec((0usize..8, 0usize..8), 0..20)
    ) {
        let dir = tempdir().expect("tempdir");
        let mut publisher = VersionedPublisher::new(FileStore::open(dir.path()).expect("open"));
        let ids: Vec<EntityId> = (0..8)
            .map(|i| {
                publisher
                    .create_entity(
                        EntityDraft::new(EntityKind::Person, None, format!("node-{}", i), vec![Name::primary("n")]),
                        "tester",
                        "create",
                    )
                    .expect("create")
                    .id()
            })
            .collect();
        let mut seen = BTreeSet::new();
        for (s, t) in edges {
            if seen.insert((s, t)) {
                publisher
                    .create_relationship(
                        RelationshipDraft::new(ids[s].clone(), ids[t].clone(), RelationshipKind::AffiliatedWith),
                        "tester",
                        "link",
                    )
                    .expect("link");
            }
        }

        let engine = GraphEngine::new(publisher.store());
        let full = engine.reachable(&ids[0], Direction::Both, None).expect("reach");
        let mut previous = BTreeSet::new();
        for depth in 0..=8 {
            let reached = engine.reachable(&ids[0], Direction::Both, Some(depth)).expect("reach");
            prop_assert!(previous.is_subset(&reached));
            prop_assert!(reached.is_subset(&full));
            previous = reached;
        }
        prop_assert_eq!(previous, full);
    }

    /// Splitting a unit into N batch entries still reads back as one name.
    #[test]
    fn batch_entries_collapse(name in "[0-9]{3}-[a-z]{3,12}", total in 1usize..6) {
        let subjects: Vec<String> = (1..=total)
            .map(|i| format!("Migration: {} (Batch {}/{})", name, i, total))
            .collect();
        let applied = parse_applied(&subjects);
        prop_assert_eq!(applied.len(), 1);
        prop_assert!(applied.contains(&name));
    }
}
