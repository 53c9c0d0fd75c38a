//! # Sidecar Squasher
//!
//! Merges externally extracted symbols and relations into the store.
//!
//! A sidecar belongs to one source file. Its parent node is found by deriving
//! the canonical id from the sidecar's source path; a sidecar whose parent is
//! not in the store is skipped rather than merged as a dangling subgraph.
//! Each record is merged in one write transaction.

use crate::identity::node_id;
use crate::primitives::{
    CODE_DOMAIN, CONTEXT_LANG_EXTRACT, DEFAULT_RELATION_CONFIDENCE, SYMBOL_LAYER,
};
use crate::storage::{Store, WriteBatch};
use crate::types::{Edge, EdgeKind, Node, NodeKind, NodeMeta};
use crate::WeftError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Suffix linking a sidecar file to its source (`a.md.ember.json` -> `a.md`).
const SIDECAR_SUFFIX: &str = ".ember.json";

// =============================================================================
// EXTRACTION PAYLOAD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Output of the extraction capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedGraph {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default, alias = "relations")]
    pub relationships: Vec<ExtractedRelation>,
}

impl ExtractedGraph {
    /// Parse sidecar text: raw `{entities, relationships}`, or wrapped in
    /// `graphData`, optionally inside a markdown code fence.
    ///
    /// Returns `Ok(None)` for a sidecar that carries no graph (only
    /// `changes`).
    pub fn parse_sidecar(text: &str) -> Result<Option<Self>, WeftError> {
        let json = strip_fences(text);
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| WeftError::Parse(e.to_string()))?;

        let payload = if let Some(graph) = value.get("graphData") {
            graph.clone()
        } else if value.get("changes").is_some() {
            return Ok(None);
        } else if value.get("entities").is_some() {
            value
        } else {
            return Err(WeftError::Parse("unknown sidecar format".to_string()));
        };
        serde_json::from_value(payload)
            .map(Some)
            .map_err(|e| WeftError::Parse(e.to_string()))
    }
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Entity/relation extraction capability.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<ExtractedGraph, WeftError>;
}

// =============================================================================
// SIDECAR RECORD
// =============================================================================

/// Extraction output for one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarRecord {
    /// Root-relative path of the source file.
    pub source_path: String,
    /// Parent id when known; otherwise derived from `source_path`.
    pub parent_id: Option<String>,
    /// Confidence for relations that carry none.
    pub confidence: Option<f32>,
    pub graph: ExtractedGraph,
}

impl SidecarRecord {
    #[must_use]
    pub fn new(source_path: impl Into<String>, graph: ExtractedGraph) -> Self {
        Self {
            source_path: source_path.into(),
            parent_id: None,
            confidence: None,
            graph,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn parent_id(&self) -> String {
        self.parent_id
            .clone()
            .unwrap_or_else(|| node_id(&self.source_path))
    }

    /// Id of an extracted symbol.
    #[must_use]
    pub fn symbol_id(&self, name: &str) -> String {
        node_id(&format!("{}:{name}", self.source_path))
    }
}

// =============================================================================
// SQUASHER
// =============================================================================

/// Result of merging one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquashOutcome {
    Merged { nodes: u64, edges: u64 },
    MissingParent { parent_id: String },
}

/// Totals for a directory of sidecars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SquashReport {
    pub files: u64,
    pub merged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub nodes: u64,
    pub edges: u64,
}

#[derive(Debug)]
pub struct SidecarSquasher<'a> {
    store: &'a Store,
}

impl<'a> SidecarSquasher<'a> {
    #[must_use]
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Merge one record atomically.
    pub fn squash(&self, record: &SidecarRecord) -> Result<SquashOutcome, WeftError> {
        let mut batch = self.store.begin_batch()?;
        let outcome = merge(&mut batch, record)?;
        if matches!(outcome, SquashOutcome::Merged { .. }) {
            batch.commit()?;
        }
        Ok(outcome)
    }

    /// Merge every `*.json` sidecar under `dir`, in path order.
    ///
    /// Paths relative to `dir`, minus `.ember.json`, name the source files.
    /// Unreadable or malformed sidecars are logged and counted; only store
    /// failures abort.
    pub fn squash_dir(&self, dir: &Path) -> Result<SquashReport, WeftError> {
        let mut report = SquashReport::default();

        let entries = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"));

        for entry in entries {
            report.files += 1;
            let path = entry.path();
            let relative = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let source_path = relative
                .strip_suffix(SIDECAR_SUFFIX)
                .unwrap_or(&relative)
                .to_string();

            let result = std::fs::read_to_string(path)
                .map_err(|e| WeftError::Io(e.to_string()))
                .and_then(|text| ExtractedGraph::parse_sidecar(&text));
            let graph = match result {
                Ok(Some(graph)) => graph,
                Ok(None) => {
                    tracing::debug!(file = %relative, "sidecar has no graph data");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(file = %relative, error = %e, "unreadable sidecar");
                    report.failed += 1;
                    continue;
                }
            };

            match self.squash(&SidecarRecord::new(source_path, graph)) {
                Ok(SquashOutcome::Merged { nodes, edges }) => {
                    report.merged += 1;
                    report.nodes += nodes;
                    report.edges += edges;
                }
                Ok(SquashOutcome::MissingParent { parent_id }) => {
                    tracing::debug!(file = %relative, parent = %parent_id, "parent node not found");
                    report.skipped += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(file = %relative, error = %e, "sidecar not merged");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            files = report.files,
            merged = report.merged,
            nodes = report.nodes,
            edges = report.edges,
            "squash complete"
        );
        Ok(report)
    }
}

/// Write a record into an open batch.
fn merge(batch: &mut WriteBatch, record: &SidecarRecord) -> Result<SquashOutcome, WeftError> {
    let parent_id = record.parent_id();
    let Some(parent) = batch.get_node(&parent_id)? else {
        return Ok(SquashOutcome::MissingParent { parent_id });
    };
    let domain = if parent.domain.is_empty() {
        CODE_DOMAIN.to_string()
    } else {
        parent.domain.clone()
    };

    let mut symbols: BTreeMap<&str, String> = BTreeMap::new();
    let mut nodes = 0;
    let mut edges = 0;

    for entity in &record.graph.entities {
        let name = entity.name.trim();
        if name.is_empty() {
            continue;
        }
        let symbol_id = record.symbol_id(name);
        let node = match batch.get_node(&symbol_id)? {
            Some(mut existing) => {
                existing.summary = entity.description.clone();
                existing
            }
            None => Node {
                id: symbol_id.clone(),
                kind: NodeKind::from(entity.kind.as_str()),
                title: name.to_string(),
                domain: domain.clone(),
                layer: SYMBOL_LAYER.to_string(),
                summary: entity.description.clone(),
                embedding: None,
                hash: None,
                meta: NodeMeta {
                    source: Some(record.source_path.clone()),
                    parent_id: Some(parent_id.clone()),
                    extraction_source: Some(CONTEXT_LANG_EXTRACT.to_string()),
                    ..NodeMeta::default()
                },
            },
        };
        batch.upsert_node(&node)?;
        nodes += 1;

        let defines = Edge::new(parent_id.as_str(), symbol_id.as_str(), EdgeKind::Defines)
            .with_context(CONTEXT_LANG_EXTRACT);
        if batch.upsert_edge(&defines)? {
            edges += 1;
        }
        symbols.insert(name, symbol_id);
    }

    let default_confidence = record.confidence.unwrap_or(DEFAULT_RELATION_CONFIDENCE);
    for relation in &record.graph.relationships {
        let (Some(source), Some(target)) = (
            symbols.get(relation.source.trim()),
            symbols.get(relation.target.trim()),
        ) else {
            tracing::debug!(
                source = %relation.source,
                target = %relation.target,
                "relation references an unknown symbol"
            );
            continue;
        };
        let edge = Edge::new(source.as_str(), target.as_str(), EdgeKind::from(relation.kind.as_str()))
            .with_confidence(relation.confidence.unwrap_or(default_confidence))
            .with_context(CONTEXT_LANG_EXTRACT);
        if batch.upsert_edge(&edge)? {
            edges += 1;
        }
    }

    Ok(SquashOutcome::Merged { nodes, edges })
}

// =============================================================================
// TESTS
// =============================================================================
