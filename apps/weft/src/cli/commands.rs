//! # CLI Command Implementations

use crate::services::{HttpEmbedder, HttpExtractor, HttpReranker, ServiceClient};
use crate::settings::Workspace;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use weft_core::source::split_frontmatter;
use weft_core::{
    ExtractionCache, GraphEngine, Ingestor, Node, SidecarSquasher, Store, VectorEngine, WeftError,
};

/// Characters of source text sent to the reranker per candidate.
const RERANK_TEXT_LIMIT: usize = 2000;

// =============================================================================
// HELPERS
// =============================================================================

fn print_json(value: &impl Serialize) -> Result<(), WeftError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| WeftError::Serialization(e.to_string()))?;
    println!("{text}");
    Ok(())
}

/// Open the store for reading. Never creates it and never takes the write
/// lock.
fn open_reader(ws: &Workspace) -> Result<Store, WeftError> {
    let path = ws.store_path();
    if !path.exists() {
        return Err(WeftError::InvalidConfig(format!(
            "no store at '{}', run `weft ingest` first",
            path.display()
        )));
    }
    Store::open_read_only(&path, ws.lock_timeout())
}

fn open_writer(ws: &Workspace) -> Result<Store, WeftError> {
    Store::open(ws.store_path(), ws.lock_timeout())
}

fn vector_engine(ws: &Workspace) -> Result<Option<VectorEngine>, WeftError> {
    let Some(url) = &ws.config.services.embed_url else {
        return Ok(None);
    };
    let client = ServiceClient::new(url, ws.service_timeout())?;
    Ok(Some(VectorEngine::new(
        Arc::new(HttpEmbedder::new(client)),
        ws.config.embeddings.dimensions,
    )))
}

/// Body text of a node's source file, for reranking.
fn source_text(root: &Path, node: &Node) -> Option<String> {
    let source = node.meta.source.as_deref()?;
    let content = std::fs::read_to_string(root.join(source)).ok()?;
    let (_, body) = split_frontmatter(&content);
    Some(body.trim().chars().take(RERANK_TEXT_LIMIT).collect())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

pub fn cmd_ingest(ws: &Workspace, json: bool) -> Result<(), WeftError> {
    let mut ingestor = Ingestor::new(ws.config.clone(), ws.root.clone());
    match vector_engine(ws)? {
        Some(engine) => ingestor = ingestor.with_vectors(engine),
        None => tracing::info!("no embed_url configured, nodes are stored without vectors"),
    }
    if let Some(url) = &ws.config.services.extract_url {
        let client = ServiceClient::new(url, ws.service_timeout())?;
        let cache = match ExtractionCache::open(ws.cache_dir()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "extraction cache disabled");
                None
            }
        };
        ingestor = ingestor.with_extractor(Arc::new(HttpExtractor::new(client)), cache);
    }

    let mut store = open_writer(ws)?;
    let stats = ingestor.run(&mut store)?;

    if json {
        return print_json(&stats);
    }
    println!("weft ingest");
    println!("===========");
    println!("Discovered:     {}", stats.discovered);
    println!("Processed:      {}", stats.processed);
    println!("Unchanged:      {}", stats.skipped);
    println!("Nodes created:  {}", stats.nodes_created);
    println!("Nodes updated:  {}", stats.nodes_updated);
    println!("Vectors:        {}", stats.vectors);
    println!("Edges created:  {}", stats.edges_created);
    println!("Edges rejected: {}", stats.edges_rejected);
    println!("Edges removed:  {}", stats.edges_removed);
    println!("Symbols:        {}", stats.symbols);
    println!("Rescued:        {}", stats.rescued);
    println!("Communities:    {}", stats.communities);
    println!("Errors:         {}", stats.errors);
    println!("Elapsed:        {} ms", stats.elapsed_ms);
    Ok(())
}

// =============================================================================
// SEARCH COMMAND
// =============================================================================

#[derive(Serialize)]
struct SearchRow {
    id: String,
    score: f32,
    title: Option<String>,
}

pub fn cmd_search(
    ws: &Workspace,
    json: bool,
    query: &str,
    k: usize,
    rerank: bool,
) -> Result<(), WeftError> {
    let engine = vector_engine(ws)?.ok_or_else(|| {
        WeftError::InvalidConfig("search needs services.embed_url".to_string())
    })?;
    let store = open_reader(ws)?;

    let hits = match (&ws.config.services.rerank_url, rerank) {
        (Some(url), true) => {
            let reranker = HttpReranker::new(ServiceClient::new(url, ws.service_timeout())?);
            engine.search_reranked(&store, &reranker, query, k, |node| source_text(&ws.root, node))?
        }
        _ => engine.search(&store, query, k)?,
    };

    let mut rows = Vec::with_capacity(hits.len());
    for hit in hits {
        let title = store.get_node(&hit.id)?.map(|n| n.title);
        rows.push(SearchRow {
            id: hit.id,
            score: hit.score,
            title,
        });
    }

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No results.");
    }
    for row in &rows {
        println!(
            "{:.4}  {}  {}",
            row.score,
            row.id,
            row.title.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

// =============================================================================
// STATS COMMAND
// =============================================================================

pub fn cmd_stats(ws: &Workspace, json: bool) -> Result<(), WeftError> {
    let store = open_reader(ws)?;
    let stats = store.stats()?;
    let graph = GraphEngine::from_store(&store)?.stats();

    if json {
        return print_json(&serde_json::json!({
            "store": store.path().to_string_lossy(),
            "nodes": stats.nodes,
            "edges": stats.edges,
            "vectors": stats.vectors,
            "file_bytes": stats.file_bytes,
            "graph": graph,
        }));
    }
    println!("weft Store Status");
    println!("=================");
    println!("Store:      {}", store.path().display());
    println!("Size:       {} bytes", stats.file_bytes);
    println!();
    println!("Nodes:      {}", stats.nodes);
    println!("Edges:      {}", stats.edges);
    println!("Vectors:    {}", stats.vectors);
    println!("Density:    {:.6}", graph.density);
    println!("Components: {}", graph.components);
    println!("Isolated:   {}", graph.isolated);
    Ok(())
}

// =============================================================================
// GRAPH COMMANDS
// =============================================================================

pub fn cmd_pillars(ws: &Workspace, json: bool, limit: usize) -> Result<(), WeftError> {
    let graph = GraphEngine::from_store(&open_reader(ws)?)?;
    let pillars = graph.find_pillars(limit);
    if json {
        return print_json(&pillars);
    }
    for pillar in &pillars {
        println!("{:>5}  {}", pillar.degree, pillar.id);
    }
    Ok(())
}

pub fn cmd_candidates(ws: &Workspace, json: bool, limit: usize) -> Result<(), WeftError> {
    let graph = GraphEngine::from_store(&open_reader(ws)?)?;
    let candidates = graph.find_structural_candidates(limit);
    if json {
        return print_json(&candidates);
    }
    if candidates.is_empty() {
        println!("No structural candidates.");
    }
    for candidate in &candidates {
        println!(
            "{:.4}  {} <-> {}",
            candidate.score, candidate.source, candidate.target
        );
    }
    Ok(())
}

pub fn cmd_communities(ws: &Workspace, json: bool) -> Result<(), WeftError> {
    let graph = GraphEngine::from_store(&open_reader(ws)?)?;
    let resolution = ws.config.graph.louvain_resolution;
    let communities = graph.communities(resolution);

    if json {
        return print_json(&communities);
    }
    let membership = graph.community_membership(resolution);
    println!(
        "{} communities, modularity {:.4}",
        communities.len(),
        graph.modularity(&membership, resolution)
    );
    for (id, members) in &communities {
        println!("[{id}] ({}) {}", members.len(), members.join(", "));
    }
    Ok(())
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

pub fn cmd_squash(ws: &Workspace, json: bool, dir: &Path) -> Result<(), WeftError> {
    if !dir.is_dir() {
        return Err(WeftError::Io(format!("'{}' is not a directory", dir.display())));
    }
    let store = open_writer(ws)?;
    let report = SidecarSquasher::new(&store).squash_dir(dir)?;
    if json {
        return print_json(&report);
    }
    println!(
        "Squashed {} of {} sidecars: {} nodes, {} edges ({} skipped, {} failed)",
        report.merged, report.files, report.nodes, report.edges, report.skipped, report.failed
    );
    Ok(())
}

pub fn cmd_prune(ws: &Workspace, json: bool, id: &str) -> Result<(), WeftError> {
    let store = open_writer(ws)?;
    let removed = store.prune_node(id)?;
    if json {
        return print_json(&serde_json::json!({ "id": id, "removed": removed }));
    }
    if removed {
        println!("Pruned {id}");
    } else {
        println!("No node {id}");
    }
    Ok(())
}

pub fn cmd_checkpoint(ws: &Workspace, json: bool) -> Result<(), WeftError> {
    let mut store = open_writer(ws)?;
    let compacted = store.checkpoint()?;
    let stats = store.stats()?;
    if json {
        return print_json(&serde_json::json!({
            "compacted": compacted,
            "file_bytes": stats.file_bytes,
        }));
    }
    println!(
        "Checkpoint {} ({} bytes)",
        if compacted { "compacted the store" } else { "found nothing to reclaim" },
        stats.file_bytes
    );
    Ok(())
}
