//! # Property-Based Tests
//!
//! Invariants checked with proptest: vector packing, edge identity,
//! community partitions and id derivation.

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;
use tempfile::tempdir;
use weft_core::vector::pack;
use weft_core::{
    Edge, EdgeKind, Embedding, GraphEngine, Node, NodeKind, PackedVector, Store, node_id,
    slugify,
};

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// A packed vector read back at any offset reproduces the input exactly.
    #[test]
    fn packed_vector_round_trips_at_offset(
        values in vec(-1000.0f32..1000.0, 1..64),
        padding in 0usize..16
    ) {
        let mut buf = vec![0xAB; padding];
        buf.extend(pack(&values));
        buf.extend([0xCD; 3]);

        let packed = PackedVector::new(&buf, padding, values.len() * 4).expect("packed");
        prop_assert_eq!(packed.dimensions(), values.len());
        prop_assert_eq!(packed.to_vec(), values);
    }

    /// Byte lengths that are not a multiple of four never decode.
    #[test]
    fn ragged_lengths_are_rejected(len in 1usize..64) {
        prop_assume!(len % 4 != 0);
        let buf = vec![0u8; 64];
        prop_assert!(PackedVector::new(&buf, 0, len).is_err());
    }

    /// Normalized embeddings are unit length.
    #[test]
    fn normalized_embeddings_have_unit_norm(values in vec(-100.0f32..100.0, 1..32)) {
        prop_assume!(values.iter().any(|v| v.abs() > 1e-3));
        let embedding = Embedding::normalized(&values).expect("unit");
        prop_assert!((embedding.norm() - 1.0).abs() < 1e-4);
    }

    /// Repeated upserts of the same triples leave one edge per triple.
    #[test]
    fn edge_upserts_are_idempotent(
        pairs in vec((0usize..6, 0usize..6, 0usize..3), 1..24)
    ) {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("kb.redb"), Duration::from_millis(200)).expect("open");
        for i in 0..6 {
            store
                .upsert_node(&Node::new(format!("n{i}"), NodeKind::Document, format!("N{i}")))
                .expect("node");
        }
        let kinds = [EdgeKind::Cites, EdgeKind::Exemplifies, EdgeKind::RelatedTo];

        let mut expected = BTreeSet::new();
        for _ in 0..2 {
            for (s, t, k) in &pairs {
                let edge = Edge::new(format!("n{s}"), format!("n{t}"), kinds[*k].clone());
                store.upsert_edge(&edge).expect("edge");
                expected.insert((*s, *t, *k));
            }
        }
        prop_assert_eq!(store.stats().expect("stats").edges, expected.len() as u64);
    }

    /// Every node lands in exactly one community.
    #[test]
    fn communities_partition_the_graph(
        nodes in 1usize..30,
        edges in vec((0usize..30, 0usize..30), 0..60)
    ) {
        let mut graph = GraphEngine::new();
        for i in 0..nodes {
            graph.add_node(&format!("n{i:02}"));
        }
        for (a, b) in edges.iter().filter(|(a, b)| *a < nodes && *b < nodes) {
            graph.add_edge(&format!("n{a:02}"), &format!("n{b:02}"));
        }

        let communities = graph.communities(1.0);
        let mut seen = BTreeSet::new();
        for members in communities.values() {
            prop_assert!(!members.is_empty());
            for id in members {
                prop_assert!(seen.insert(id.clone()), "{} appears twice", id);
            }
        }
        prop_assert_eq!(seen.len(), nodes);
        prop_assert_eq!(communities, graph.communities(1.0));
    }

    /// Ids are slugs and do not depend on `./` prefixes or separators.
    #[test]
    fn node_ids_are_stable(segments in vec("[A-Za-z0-9 _]{1,8}", 1..4)) {
        let path = format!("{}.md", segments.join("/"));
        let id = node_id(&path);

        prop_assert_eq!(&id, &node_id(&format!("./{path}")));
        prop_assert_eq!(&id, &node_id(&path.replace('/', "\\")));
        prop_assert_eq!(&id, &slugify(&id));
        prop_assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }
}
