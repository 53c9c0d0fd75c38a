//! # End-to-End Scenarios
//!
//! Observable guarantees of a weft knowledge base, exercised through the
//! public API against on-disk stores.
//!
//! - Re-ingestion and hashing
//! - Vector storage
//! - Growth control and edge identity
//! - Weaving (references, timeline, orphan rescue)
//! - Concurrent readers beside a writer

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use weft_core::config::SourceRoot;
use weft_core::{
    Edge, EdgeKind, Embedder, Embedding, GraphEngine, GrowthGate, Ingestor, Node, NodeKind,
    SemanticWeaver, Store, TimelineWeaver, VectorEngine, WeftConfig, WeftError, substance_hash,
};

const TIMEOUT: Duration = Duration::from_millis(500);

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, content).expect("write");
}

fn config() -> WeftConfig {
    let mut config = WeftConfig::default();
    config.sources = vec![
        SourceRoot {
            path: PathBuf::from("docs"),
            kind: "document".into(),
        },
        SourceRoot {
            path: PathBuf::from("debriefs"),
            kind: "debrief".into(),
        },
    ];
    config.embeddings.dimensions = 8;
    config.embeddings.min_chars = 1;
    config
}

/// Hashes words into 8 buckets. Deterministic and never zero for text with
/// at least one word.
struct BucketEmbedder;

impl Embedder for BucketEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, WeftError> {
        let mut v = vec![0.0f32; 8];
        for word in text.split_whitespace() {
            let bucket = word.bytes().map(usize::from).sum::<usize>() % 8;
            v[bucket] += 1.0;
        }
        Ok(v)
    }
}

fn ingestor(root: &Path) -> Ingestor {
    Ingestor::new(config(), root).with_vectors(VectorEngine::new(Arc::new(BucketEmbedder), 8))
}

fn open(root: &Path) -> Store {
    Store::open(root.join(".weft/resonance.redb"), TIMEOUT).expect("open")
}

// =============================================================================
// RE-INGESTION AND HASHING
// =============================================================================

mod reingestion {
    use super::*;

    const TERM: &str = "---\nid: term:CircularLogic\ntitle: Circular Logic\ntype: concept\naliases: [Loops]\n---\nReasoning that assumes its conclusion.\n";

    #[test]
    fn unchanged_sources_add_nothing() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "docs/A.md", TERM);
        write(dir.path(), "docs/B.md", "An argument that is tag-loops all the way down.\n");
        let mut store = open(dir.path());
        let ingestor = ingestor(dir.path());

        let first = ingestor.run(&mut store).expect("first");
        assert_eq!(first.nodes_created, 2);
        let before = store.stats().expect("stats");

        let second = ingestor.run(&mut store).expect("second");
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.nodes_updated, 0);
        assert_eq!(second.skipped, 2);
        let after = store.stats().expect("stats");
        assert_eq!((before.nodes, before.edges), (after.nodes, after.edges));
    }

    #[test]
    fn tag_block_is_not_substance() {
        let body = "# Note\n\nSome lasting content.\n";
        let tagged = format!("{body}\n<!-- tags: [EXEMPLIFIES: term-x] -->\n");
        let edited = "# Note\n\nSome different content.\n";

        assert_eq!(substance_hash(body), substance_hash(&tagged));
        assert_ne!(substance_hash(body), substance_hash(edited));
    }

    #[test]
    fn metadata_only_edit_is_skipped() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "docs/note.md", "---\ntitle: Note\n---\nStable body.\n");
        let mut store = open(dir.path());
        let ingestor = ingestor(dir.path());
        ingestor.run(&mut store).expect("first");
        let hash = store.get_node("docs-note").expect("get").expect("node").hash;

        write(dir.path(), "docs/note.md", "---\ntitle: Renamed\n---\nStable body.\n<!-- tags: x -->\n");
        let stats = ingestor.run(&mut store).expect("second");
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.get_node("docs-note").expect("get").expect("node").hash, hash);

        write(dir.path(), "docs/note.md", "---\ntitle: Note\n---\nChanged body.\n");
        let stats = ingestor.run(&mut store).expect("third");
        assert_eq!(stats.nodes_updated, 1);
        assert_ne!(store.get_node("docs-note").expect("get").expect("node").hash, hash);
    }
}

// =============================================================================
// VECTOR STORAGE
// =============================================================================

mod vectors {
    use super::*;

    #[test]
    fn stored_vector_round_trips_at_unit_norm() {
        let dir = tempdir().expect("tempdir");
        let store = open(dir.path());
        let embedding = Embedding::normalized(&[0.3, -1.2, 4.5, 0.0, 2.25]).expect("unit");
        let node = Node::new("v", NodeKind::Document, "V").with_embedding(embedding.clone());
        store.upsert_node(&node).expect("upsert");

        let stored = store.get_embedding("v").expect("get").expect("vector");
        assert_eq!(stored.dimensions(), 5);
        for (a, b) in stored.as_slice().iter().zip(embedding.as_slice()) {
            assert!((a - b).abs() <= 1e-6);
        }
        assert!((stored.norm() - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn search_ranks_the_matching_document_first() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "docs/rust.md", "ownership borrowing lifetimes traits\n");
        write(dir.path(), "docs/garden.md", "tomatoes compost mulch seedlings\n");
        let mut store = open(dir.path());
        ingestor(dir.path()).run(&mut store).expect("run");

        let engine = VectorEngine::new(Arc::new(BucketEmbedder), 8);
        let hits = engine
            .search(&store, "ownership borrowing lifetimes traits", 2)
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "docs-rust");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }
}

// =============================================================================
// GROWTH CONTROL AND EDGE IDENTITY
// =============================================================================

mod edges {
    use super::*;

    #[test]
    fn gate_needs_a_shared_neighbour_at_threshold() {
        let mut graph = GraphEngine::new();
        for i in 0..3 {
            graph.add_edge(&format!("doc-{i}"), "hub");
        }
        graph.add_node("newcomer");
        let mut gate = GrowthGate::new(3);
        assert!(!gate.admit("newcomer", "hub", &graph).allowed);

        graph.add_edge("newcomer", "doc-0");
        assert!(gate.admit("newcomer", "hub", &graph).allowed);
        assert_eq!(gate.stats().checked, 2);
        assert_eq!(gate.stats().rejected, 1);
    }

    #[test]
    fn second_write_of_a_triple_overwrites() {
        let dir = tempdir().expect("tempdir");
        let store = open(dir.path());
        store.upsert_node(&Node::new("a", NodeKind::Document, "A")).expect("a");
        store.upsert_node(&Node::new("b", NodeKind::Document, "B")).expect("b");

        let first = Edge::new("a", "b", EdgeKind::Cites).with_confidence(0.4).with_veracity(0.5);
        let second = Edge::new("a", "b", EdgeKind::Cites).with_confidence(0.9).with_veracity(0.7);
        assert!(store.upsert_edge(&first).expect("first"));
        assert!(!store.upsert_edge(&second).expect("second"));

        let edges = store.edges_from("a").expect("edges");
        assert_eq!(edges.len(), 1);
        assert!((edges[0].confidence - 0.9).abs() < f32::EPSILON);
        assert!((edges[0].veracity - 0.7).abs() < f32::EPSILON);
        assert_eq!(store.edges_to("b").expect("reverse").len(), 1);
    }
}

// =============================================================================
// WEAVING
// =============================================================================

mod weaving {
    use super::*;

    #[test]
    fn alias_tag_links_document_to_term() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "docs/A.md",
            "---\nid: term:CircularLogic\ntitle: Circular Logic\ntype: concept\naliases: [Loops]\n---\nReasoning in a circle.\n",
        );
        write(dir.path(), "docs/B.md", "This argument is a clear case of tag-loops.\n");
        let mut store = open(dir.path());

        let stats = ingestor(dir.path()).run(&mut store).expect("run");
        assert!(stats.edges_created >= 1);
        let edges = store.edges_from("docs-b").expect("edges");
        assert!(edges.iter().any(|e| e.target == "term:CircularLogic"
            && e.kind == EdgeKind::Exemplifies));
    }

    #[test]
    fn dated_records_form_a_chain() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "debriefs/2026-01-01-kickoff.md", "Kickoff notes.\n");
        write(dir.path(), "debriefs/2026-01-02-review.md", "Review notes.\n");
        write(dir.path(), "debriefs/2026-01-03-retro.md", "Retro notes.\n");
        let mut store = open(dir.path());

        let stats = ingestor(dir.path()).run(&mut store).expect("run");
        assert_eq!(stats.timeline_edges, 2);

        let id = |day: &str| weft_core::node_id(&format!("debriefs/2026-01-0{day}"));
        let third = store.edges_from(&id("3-retro")).expect("edges");
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].target, id("2-review"));
        assert_eq!(third[0].kind, EdgeKind::Succeeds);
        let second = store.edges_from(&id("2-review")).expect("edges");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].target, id("1-kickoff"));

        // re-weaving is idempotent
        let again = TimelineWeaver::new(NodeKind::Record).weave(&store).expect("again");
        assert_eq!((again.created, again.removed), (0, 0));
    }

    #[test]
    fn record_arriving_later_slots_into_the_chain() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "debriefs/2026-01-01-kickoff.md", "Kickoff notes.\n");
        write(dir.path(), "debriefs/2026-01-03-retro.md", "Retro notes.\n");
        let mut store = open(dir.path());
        ingestor(dir.path()).run(&mut store).expect("first run");

        write(dir.path(), "debriefs/2026-01-02-review.md", "Review notes.\n");
        let stats = ingestor(dir.path()).run(&mut store).expect("second run");
        assert_eq!(stats.timeline_edges, 2);

        let id = |day: &str| weft_core::node_id(&format!("debriefs/2026-01-0{day}"));
        let succeeds = |from: &str| -> Vec<String> {
            store
                .edges_from(from)
                .expect("edges")
                .into_iter()
                .filter(|e| e.kind == EdgeKind::Succeeds)
                .map(|e| e.target)
                .collect()
        };
        assert_eq!(succeeds(&id("3-retro")), vec![id("2-review")]);
        assert_eq!(succeeds(&id("2-review")), vec![id("1-kickoff")]);
    }

    #[test]
    fn dropped_link_is_gone_after_reingestion() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "docs/guide.md", "# Guide\n\nStart with [[Setup]].\n");
        write(dir.path(), "docs/setup.md", "# Setup\n\nInstall it.\n");
        let mut store = open(dir.path());
        ingestor(dir.path()).run(&mut store).expect("first run");
        let cites = |store: &Store| {
            store
                .edges_from("docs-guide")
                .expect("edges")
                .into_iter()
                .filter(|e| e.kind == EdgeKind::Cites)
                .count()
        };
        assert_eq!(cites(&store), 1);

        write(dir.path(), "docs/guide.md", "# Guide\n\nStart anywhere.\n");
        let stats = ingestor(dir.path()).run(&mut store).expect("second run");
        assert_eq!(stats.edges_removed, 1);
        assert_eq!(cites(&store), 0);
    }

    fn rescue_fixture(orphan: &[f32]) -> (tempfile::TempDir, Store) {
        let dir = tempdir().expect("tempdir");
        let store = open(dir.path());
        let unit = |raw: &[f32]| Embedding::normalized(raw).expect("unit");
        let nodes = [
            Node::new("orphan", NodeKind::Note, "Orphan").with_embedding(unit(orphan)),
            Node::new("match", NodeKind::Document, "Match").with_embedding(unit(&[1.0, 0.0, 0.0])),
            Node::new("other", NodeKind::Document, "Other").with_embedding(unit(&[0.0, 1.0, 0.0])),
            Node::new("anchor", NodeKind::Document, "Anchor").with_embedding(unit(&[0.0, 0.0, 1.0])),
        ];
        for node in &nodes {
            store.upsert_node(node).expect("node");
        }
        store.upsert_edge(&Edge::new("match", "anchor", EdgeKind::Cites)).expect("edge");
        store.upsert_edge(&Edge::new("other", "anchor", EdgeKind::Cites)).expect("edge");
        (dir, store)
    }

    #[test]
    fn close_orphan_gets_exactly_one_edge() {
        let (_dir, store) = rescue_fixture(&[0.95, 0.1, 0.0]);
        let stats = SemanticWeaver::new(0.85).weave(&store).expect("weave");
        assert_eq!(stats.rescued, 1);

        let related = store.edges_from("orphan").expect("edges");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].target, "match");
        assert_eq!(related[0].kind, EdgeKind::RelatedTo);
        assert!(related[0].confidence >= 0.85);
    }

    #[test]
    fn distant_orphan_stays_alone() {
        let (_dir, store) = rescue_fixture(&[0.6, 0.6, 0.5]);
        let stats = SemanticWeaver::new(0.85).weave(&store).expect("weave");
        assert_eq!(stats.rescued, 0);
        assert!(store.edges_from("orphan").expect("edges").is_empty());
        assert!(store.edges_to("orphan").expect("edges").is_empty());
    }
}

// =============================================================================
// CONCURRENT ACCESS
// =============================================================================

mod concurrency {
    use super::*;
    use std::time::Instant;

    fn seeded(root: &Path) -> Store {
        let store = open(root);
        store
            .upsert_node(&Node::new("a", NodeKind::Document, "A"))
            .expect("seed");
        store
    }

    #[test]
    fn readers_see_committed_state_during_a_write() {
        let dir = tempdir().expect("tempdir");
        let store = seeded(dir.path());

        let mut batch = store.begin_batch().expect("batch");
        batch
            .upsert_node(&Node::new("b", NodeKind::Document, "B"))
            .expect("pending write");

        std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let a = store.get_node("a").expect("read").is_some();
                        let b = store.get_node("b").expect("read").is_some();
                        (a, b)
                    })
                })
                .collect();
            for reader in readers {
                assert_eq!(reader.join().expect("reader thread"), (true, false));
            }
        });

        batch.commit().expect("commit");
        assert!(store.get_node("b").expect("read").is_some());
    }

    #[test]
    fn diagnostics_reader_waits_for_the_writer_within_its_timeout() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(".weft/resonance.redb");
        let writer = seeded(dir.path());

        let started = Instant::now();
        let refused = Store::open_read_only(&path, Duration::from_millis(150));
        assert!(matches!(refused, Err(WeftError::Storage(_))));
        assert!(started.elapsed() < Duration::from_secs(5));

        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            drop(writer);
        });
        let reader = Store::open_read_only(&path, Duration::from_secs(5)).expect("read-only");
        release.join().expect("writer thread");

        assert!(reader.is_read_only());
        assert!(reader.get_node("a").expect("read").is_some());
        assert!(matches!(
            reader.upsert_node(&Node::new("c", NodeKind::Document, "C")),
            Err(WeftError::ReadOnly)
        ));
    }
}
