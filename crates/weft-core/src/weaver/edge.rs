//! # Edge Weaver
//!
//! Finds references in document text and proposes edges for them:
//! - `tag-<slug>` names a lexicon term and yields `EXEMPLIFIES`
//! - `[[Title]]` / `[[Title|label]]` names any entry and yields `CITES`
//!
//! Every candidate passes through the [`GrowthGate`] before it is written.
//! Unresolved references, self references and rejected candidates are
//! counted and dropped.

use crate::gate::GrowthGate;
use crate::graph::GraphEngine;
use crate::identity::slugify;
use crate::primitives::CONTEXT_EDGE_WEAVER;
use crate::storage::WriteBatch;
use crate::types::{Edge, EdgeKind, Node};
use crate::WeftError;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// LEXICON
// =============================================================================

/// Surface forms resolved to canonical node ids.
///
/// Terms (concept nodes and nodes in the `lexicon` domain) are reachable by
/// tag slug: the slug of their id, of their id without a `prefix:`, of their
/// title and of each alias. Every node is reachable by bracket link through
/// its title, id or aliases, case-insensitively. When two entries claim the
/// same surface form, the first one inserted keeps it.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    tags: BTreeMap<String, String>,
    links: BTreeMap<String, String>,
}

impl Lexicon {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from nodes, in the order given.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut lexicon = Self::new();
        for node in nodes {
            lexicon.insert(node);
        }
        lexicon
    }

    pub fn insert(&mut self, node: &Node) {
        let mut forms: Vec<&str> = vec![node.id.as_str(), node.title.as_str()];
        forms.extend(node.meta.aliases.iter().map(String::as_str));

        if node.is_term() {
            let bare_id = node.id.split_once(':').map(|(_, rest)| rest);
            for form in forms.iter().copied().chain(bare_id) {
                let slug = slugify(form);
                if !slug.is_empty() {
                    self.tags.entry(slug).or_insert_with(|| node.id.clone());
                }
            }
        }
        for form in forms {
            let key = link_key(form);
            if !key.is_empty() {
                self.links.entry(key).or_insert_with(|| node.id.clone());
            }
        }
    }

    /// Canonical term id for a tag slug.
    #[must_use]
    pub fn resolve_tag(&self, slug: &str) -> Option<&str> {
        self.tags.get(&slugify(slug)).map(String::as_str)
    }

    /// Canonical id for bracket-link text.
    #[must_use]
    pub fn resolve_link(&self, text: &str) -> Option<&str> {
        self.links.get(&link_key(text)).map(String::as_str)
    }
}

fn link_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// EDGE SINK
// =============================================================================

/// Destination of admitted edges.
pub trait EdgeSink {
    /// Store an edge; `true` if it did not exist before.
    fn put_edge(&mut self, edge: Edge) -> Result<bool, WeftError>;
}

impl EdgeSink for WriteBatch {
    fn put_edge(&mut self, edge: Edge) -> Result<bool, WeftError> {
        self.upsert_edge(&edge)
    }
}

impl EdgeSink for Vec<Edge> {
    fn put_edge(&mut self, edge: Edge) -> Result<bool, WeftError> {
        let exists = self
            .iter()
            .any(|e| e.source == edge.source && e.target == edge.target && e.kind == edge.kind);
        self.retain(|e| !(e.source == edge.source && e.target == edge.target && e.kind == edge.kind));
        self.push(edge);
        Ok(!exists)
    }
}

// =============================================================================
// WEAVER
// =============================================================================

/// Per-run weaving counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeaveStats {
    /// Distinct resolved references considered.
    pub proposed: u64,
    /// Edges that did not exist before.
    pub created: u64,
    /// Candidates refused by the growth gate.
    pub rejected: u64,
    /// References that matched no entry.
    pub unresolved: u64,
}

/// Reference scanner.
#[derive(Debug)]
pub struct EdgeWeaver {
    lexicon: Lexicon,
    tag_pattern: Regex,
    link_pattern: Regex,
    stats: WeaveStats,
}

impl EdgeWeaver {
    pub fn new(lexicon: Lexicon) -> Result<Self, WeftError> {
        let tag_pattern = Regex::new(r"(?i)\btag-([a-z0-9][a-z0-9-]*)")
            .map_err(|e| WeftError::Parse(e.to_string()))?;
        let link_pattern = Regex::new(r"\[\[([^\[\]|]+)(?:\|[^\[\]]*)?\]\]")
            .map_err(|e| WeftError::Parse(e.to_string()))?;
        Ok(Self {
            lexicon,
            tag_pattern,
            link_pattern,
            stats: WeaveStats::default(),
        })
    }

    #[must_use]
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Scan `content` of `source_id`, admit candidates through `gate` against
    /// `graph`, and write admitted edges to `sink`. Admitted edges are added
    /// to `graph` immediately so later checks see them.
    ///
    /// Returns the number of new edges.
    pub fn weave(
        &mut self,
        source_id: &str,
        content: &str,
        graph: &mut GraphEngine,
        gate: &mut GrowthGate,
        sink: &mut impl EdgeSink,
    ) -> Result<u64, WeftError> {
        let mut created = 0;
        for (target, kind) in self.references(source_id, content) {
            self.stats.proposed += 1;
            if !gate.admit(source_id, &target, graph).allowed {
                self.stats.rejected += 1;
                continue;
            }
            let edge = Edge::new(source_id, target.as_str(), kind).with_context(CONTEXT_EDGE_WEAVER);
            if sink.put_edge(edge)? {
                created += 1;
            }
            graph.add_edge(source_id, &target);
        }
        self.stats.created += created;
        Ok(created)
    }

    /// Resolved `(target, kind)` pairs in order of first occurrence.
    fn references(&mut self, source_id: &str, content: &str) -> Vec<(String, EdgeKind)> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();

        for caps in self.tag_pattern.captures_iter(content) {
            let slug = caps[1].trim_matches('-').to_lowercase();
            match self.lexicon.resolve_tag(&slug) {
                Some(target) if target != source_id => {
                    if seen.insert((target.to_string(), EdgeKind::Exemplifies)) {
                        found.push((target.to_string(), EdgeKind::Exemplifies));
                    }
                }
                Some(_) => {}
                None => {
                    self.stats.unresolved += 1;
                    tracing::debug!(source = source_id, tag = %slug, "unresolved tag");
                }
            }
        }

        for caps in self.link_pattern.captures_iter(content) {
            let text = caps[1].trim();
            match self.lexicon.resolve_link(text) {
                Some(target) if target != source_id => {
                    if seen.insert((target.to_string(), EdgeKind::Cites)) {
                        found.push((target.to_string(), EdgeKind::Cites));
                    }
                }
                Some(_) => {}
                None => {
                    self.stats.unresolved += 1;
                    tracing::debug!(source = source_id, link = text, "unresolved link");
                }
            }
        }
        found
    }

    #[must_use]
    pub fn stats(&self) -> WeaveStats {
        self.stats
    }
}

// =============================================================================
// TESTS
// =============================================================================
