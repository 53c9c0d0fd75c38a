//! # Ingestor Module
//!
//! Pipeline orchestration for one ingestion run:
//!
//! ```text
//! Discover -> per file: Parse -> HashCheck -> Embed -> Persist
//!          -> Weave (all changed files) -> Extract -> Timeline
//!          -> SemanticRescue -> Communities -> Checkpoint
//! ```
//!
//! - Unchanged substance skips the file entirely
//! - Per-file failures are logged and counted, never abort the run
//! - Only fatal store errors propagate
//! - Weaving starts once every changed node of the run is persisted

use crate::cache::ExtractionCache;
use crate::config::WeftConfig;
use crate::embedding::VectorEngine;
use crate::gate::GrowthGate;
use crate::graph::GraphEngine;
use crate::sidecar::{Extractor, ExtractedGraph, SidecarRecord, SidecarSquasher, SquashOutcome};
use crate::source::SourceDocument;
use crate::primitives::CONTEXT_EDGE_WEAVER;
use crate::storage::{Store, WriteBatch};
use crate::types::{Edge, Node, NodeKind};
use crate::vector::Embedding;
use crate::weaver::{EdgeWeaver, Lexicon, SemanticWeaver, TimelineWeaver};
use crate::WeftError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

// =============================================================================
// RUN STATISTICS
// =============================================================================

/// Aggregate counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub discovered: u64,
    /// Files whose node was written.
    pub processed: u64,
    /// Files with unchanged substance.
    pub skipped: u64,
    pub nodes_created: u64,
    pub nodes_updated: u64,
    /// Unchanged nodes that received a missing vector.
    pub reembedded: u64,
    pub vectors: u64,
    pub edges_created: u64,
    pub edges_rejected: u64,
    /// Woven edges whose reference disappeared from the source.
    pub edges_removed: u64,
    pub unresolved: u64,
    /// Files whose id was already held by a node from another source.
    pub id_collisions: u64,
    pub symbols: u64,
    pub timeline_edges: u64,
    pub rescued: u64,
    pub communities: u64,
    /// Per-file failures.
    pub errors: u64,
    pub elapsed_ms: u64,
}

/// A discovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the project root, forward slashes.
    pub relative: String,
    pub kind: NodeKind,
}

// =============================================================================
// INGESTOR
// =============================================================================

/// Drives ingestion runs against a store.
///
/// Capabilities are optional: without a [`VectorEngine`] nodes are stored
/// without vectors, without an [`Extractor`] no symbols are extracted.
pub struct Ingestor {
    config: WeftConfig,
    root: PathBuf,
    vectors: Option<VectorEngine>,
    extractor: Option<Arc<dyn Extractor>>,
    cache: Option<ExtractionCache>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("root", &self.root)
            .field("vectors", &self.vectors)
            .field("extractor", &self.extractor.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

impl Ingestor {
    /// Source roots in `config` are resolved against `root`.
    #[must_use]
    pub fn new(config: WeftConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            vectors: None,
            extractor: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_vectors(mut self, vectors: VectorEngine) -> Self {
        self.vectors = Some(vectors);
        self
    }

    #[must_use]
    pub fn with_extractor(
        mut self,
        extractor: Arc<dyn Extractor>,
        cache: Option<ExtractionCache>,
    ) -> Self {
        self.extractor = Some(extractor);
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    // =========================================================================
    // DISCOVERY
    // =========================================================================

    /// Source files under every configured root, in path order.
    ///
    /// Missing roots are logged and skipped. A file reachable from two roots
    /// is reported once, with the kind of the first root.
    pub fn discover(&self) -> Vec<SourceFile> {
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();

        for source in &self.config.sources {
            let dir = self.root.join(&source.path);
            if !dir.is_dir() {
                tracing::warn!(root = %dir.display(), "source root not found");
                continue;
            }
            let kind = source.node_kind();
            let walker = WalkDir::new(&dir)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable source entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !self.has_source_extension(entry.path()) {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&self.root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if seen.insert(relative.clone()) {
                    files.push(SourceFile {
                        path: entry.path().to_path_buf(),
                        relative,
                        kind: kind.clone(),
                    });
                }
            }
        }
        files
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.config
            .exclude_patterns
            .iter()
            .any(|pattern| name == pattern.as_str())
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    // =========================================================================
    // RUN
    // =========================================================================

    /// Run the full pipeline over every discovered source.
    pub fn run(&self, store: &mut Store) -> Result<RunStats, WeftError> {
        let files = self.discover();
        self.run_files(store, &files)
    }

    /// Run the pipeline over `files` only. Enrichment passes still cover the
    /// whole store.
    pub fn run_files(&self, store: &mut Store, files: &[SourceFile]) -> Result<RunStats, WeftError> {
        let started = Instant::now();
        let mut stats = RunStats {
            discovered: files.len() as u64,
            ..RunStats::default()
        };
        tracing::info!(files = files.len(), "ingestion started");

        let changed = self.persist_pass(store, files, &mut stats)?;
        if !changed.is_empty() {
            self.weave_pass(store, &changed, &mut stats)?;
            self.extract_pass(store, &changed, &mut stats)?;
        }

        let timeline = TimelineWeaver::new(self.config.timeline.node_kind()).weave(store)?;
        stats.timeline_edges = timeline.created;
        stats.edges_removed += timeline.removed;
        let rescue = SemanticWeaver::new(self.config.graph.orphan_similarity).weave(store)?;
        stats.rescued = rescue.rescued;
        stats.edges_created += stats.timeline_edges + stats.rescued;

        if self.config.graph.persist_communities {
            stats.communities = self.persist_communities(store)?;
        }

        if let Err(e) = store.checkpoint() {
            tracing::warn!(error = %e, "checkpoint skipped");
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            processed = stats.processed,
            skipped = stats.skipped,
            nodes_created = stats.nodes_created,
            edges_created = stats.edges_created,
            errors = stats.errors,
            elapsed_ms = stats.elapsed_ms,
            "ingestion complete"
        );
        Ok(stats)
    }

    /// Parse, hash-check, embed and persist. Returns the changed documents.
    fn persist_pass(
        &self,
        store: &Store,
        files: &[SourceFile],
        stats: &mut RunStats,
    ) -> Result<Vec<SourceDocument>, WeftError> {
        let batch_size = self.config.ingest.batch_size.max(1);
        let mut embedding = self.vectors.as_ref();
        let mut changed = Vec::new();
        let mut batch = store.begin_batch()?;
        let mut pending = 0;

        for file in files {
            let content = match std::fs::read_to_string(&file.path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %file.relative, error = %e, "unreadable source");
                    stats.errors += 1;
                    continue;
                }
            };
            let doc = match SourceDocument::parse(&file.relative, &content, &file.kind) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %file.relative, error = %e, "parse failed");
                    stats.errors += 1;
                    continue;
                }
            };
            let wants_vector = doc.text().chars().count() >= self.config.embeddings.min_chars;
            let existing = batch.get_node(&doc.id)?;
            if let Some(previous) = existing.as_ref().and_then(|n| n.meta.source.as_deref())
                && previous != doc.path
            {
                tracing::warn!(
                    id = %doc.id,
                    file = %doc.path,
                    previous,
                    "node id already taken by another source, overwriting"
                );
                stats.id_collisions += 1;
            }

            if let Some(existing) = &existing
                && existing.hash.as_deref() == Some(doc.hash.as_str())
            {
                stats.skipped += 1;
                if existing.embedding.is_some() || !wants_vector {
                    continue;
                }
                let Some(vector) = self.embed_document(&mut embedding, &doc, stats)? else {
                    continue;
                };
                let mut node = existing.clone();
                node.embedding = Some(vector);
                batch.upsert_node(&node)?;
                stats.reembedded += 1;
                stats.vectors += 1;
                pending += 1;
            } else {
                let mut node = doc.to_node();
                if let Some(existing) = &existing {
                    node.meta.community = existing.meta.community;
                }
                if wants_vector {
                    node.embedding = self.embed_document(&mut embedding, &doc, stats)?;
                    if node.embedding.is_some() {
                        stats.vectors += 1;
                    }
                }
                batch.upsert_node(&node)?;
                if existing.is_some() {
                    stats.nodes_updated += 1;
                } else {
                    stats.nodes_created += 1;
                }
                stats.processed += 1;
                tracing::debug!(file = %file.relative, id = %node.id, "node persisted");
                changed.push(doc);
                pending += 1;
            }

            if pending >= batch_size {
                batch.commit()?;
                batch = store.begin_batch()?;
                pending = 0;
            }
        }
        batch.commit()?;
        Ok(changed)
    }

    /// Embed one document. Provider unavailability switches embedding off for
    /// the rest of the run; any other provider error only affects this file.
    fn embed_document(
        &self,
        engine: &mut Option<&VectorEngine>,
        doc: &SourceDocument,
        stats: &mut RunStats,
    ) -> Result<Option<Embedding>, WeftError> {
        let Some(vectors) = *engine else {
            return Ok(None);
        };
        match vectors.embed(doc.text()) {
            Ok(vector) => Ok(Some(vector)),
            Err(e) if e.is_fatal() => Err(e),
            Err(WeftError::ProviderUnavailable(msg)) => {
                tracing::warn!(file = %doc.path, error = %msg, "embedding provider unavailable, continuing without vectors");
                stats.errors += 1;
                *engine = None;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(file = %doc.path, error = %e, "embedding failed");
                stats.errors += 1;
                Ok(None)
            }
        }
    }

    /// Re-weave every changed document. Edge-weaver edges of a document that
    /// its current text no longer proposes are removed in the same batch.
    fn weave_pass(
        &self,
        store: &Store,
        changed: &[SourceDocument],
        stats: &mut RunStats,
    ) -> Result<(), WeftError> {
        let nodes = store.nodes()?;
        let mut graph = GraphEngine::from_store(store)?;
        let mut weaver = EdgeWeaver::new(Lexicon::from_nodes(&nodes))?;
        drop(nodes);
        let mut gate = GrowthGate::new(self.config.graph.super_node_threshold);

        let (mut created, mut removed) = (0u64, 0u64);
        let batch_size = self.config.ingest.batch_size.max(1);
        for chunk in changed.chunks(batch_size) {
            let mut batch = store.begin_batch()?;
            for doc in chunk {
                let mut woven: Vec<Edge> = Vec::new();
                weaver.weave(&doc.id, &doc.body, &mut graph, &mut gate, &mut woven)?;
                removed += retire_stale_edges(&mut batch, &doc.id, &woven)?;
                for edge in &woven {
                    if batch.upsert_edge(edge)? {
                        created += 1;
                    }
                }
            }
            batch.commit()?;
        }

        let woven = weaver.stats();
        stats.edges_created += created;
        stats.edges_removed += removed;
        stats.edges_rejected += woven.rejected;
        stats.unresolved += woven.unresolved;
        tracing::info!(
            proposed = woven.proposed,
            created,
            removed,
            rejected = woven.rejected,
            unresolved = woven.unresolved,
            "edges woven"
        );
        Ok(())
    }

    fn extract_pass(
        &self,
        store: &Store,
        changed: &[SourceDocument],
        stats: &mut RunStats,
    ) -> Result<(), WeftError> {
        let Some(extractor) = &self.extractor else {
            return Ok(());
        };
        let squasher = SidecarSquasher::new(store);

        for doc in changed {
            let graph = match self.cache.as_ref().and_then(|c| c.get(&doc.hash)) {
                Some(graph) => graph,
                None => match extractor.extract(doc.text()) {
                    Ok(graph) => {
                        self.cache_result(&doc.hash, &graph);
                        graph
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(WeftError::ProviderUnavailable(msg)) => {
                        tracing::warn!(error = %msg, "extraction provider unavailable, skipping extraction");
                        stats.errors += 1;
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!(file = %doc.path, error = %e, "extraction failed");
                        stats.errors += 1;
                        continue;
                    }
                },
            };

            let record = SidecarRecord::new(doc.path.clone(), graph).with_parent(doc.id.clone());
            match squasher.squash(&record)? {
                SquashOutcome::Merged { nodes, edges } => {
                    stats.symbols += nodes;
                    stats.edges_created += edges;
                }
                SquashOutcome::MissingParent { parent_id } => {
                    tracing::debug!(file = %doc.path, parent = %parent_id, "extraction parent missing");
                }
            }
        }
        Ok(())
    }

    fn cache_result(&self, hash: &str, graph: &ExtractedGraph) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.put(hash, graph)
        {
            tracing::warn!(error = %e, "extraction cache write failed");
        }
    }

    /// Write each node's community id into `meta.community`. Returns the
    /// number of communities.
    fn persist_communities(&self, store: &Store) -> Result<u64, WeftError> {
        let graph = GraphEngine::from_store(store)?;
        let membership = graph.community_membership(self.config.graph.louvain_resolution);
        let communities: BTreeSet<u64> = membership.values().copied().collect();

        let nodes: Vec<Node> = store.nodes()?;
        let mut batch = store.begin_batch()?;
        let mut updated = 0u64;
        for mut node in nodes {
            let community = membership.get(&node.id).copied();
            if node.meta.community != community {
                node.meta.community = community;
                batch.upsert_node(&node)?;
                updated += 1;
            }
        }
        batch.commit()?;

        tracing::info!(communities = communities.len(), updated, "communities persisted");
        Ok(communities.len() as u64)
    }
}

/// Remove `source`'s edge-weaver edges that are not in `kept`.
fn retire_stale_edges(batch: &mut WriteBatch, source: &str, kept: &[Edge]) -> Result<u64, WeftError> {
    let mut removed = 0;
    for edge in batch.edges_from(source)? {
        let woven_here = edge.context_source.as_deref() == Some(CONTEXT_EDGE_WEAVER);
        let still_proposed = kept
            .iter()
            .any(|k| k.target == edge.target && k.kind == edge.kind);
        if woven_here && !still_proposed && batch.remove_edge(&edge.source, &edge.target, &edge.kind)? {
            tracing::debug!(source, target = %edge.target, kind = %edge.kind, "stale edge removed");
            removed += 1;
        }
    }
    Ok(removed)
}

// =============================================================================
// TESTS
// =============================================================================
