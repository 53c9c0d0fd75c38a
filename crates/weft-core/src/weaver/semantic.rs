//! Orphan rescue: reconnect edgeless nodes to their nearest content node.

use crate::primitives::{CONTEXT_SEMANTIC, DEFAULT_LAYER};
use crate::storage::Store;
use crate::types::{Edge, EdgeKind, Node, NodeKind};
use crate::WeftError;
use serde::Serialize;
use std::collections::BTreeSet;

/// Rescue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RescueStats {
    /// Orphans with an embedding that were examined.
    pub orphans: u64,
    /// Orphans that received a `RELATED_TO` edge.
    pub rescued: u64,
}

/// Links each orphan to its most similar content node when the similarity
/// reaches the threshold. Orphans below it stay orphaned.
#[derive(Debug, Clone)]
pub struct SemanticWeaver {
    threshold: f32,
}

impl SemanticWeaver {
    #[must_use]
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Content-bearing nodes are experience-layer nodes and notes. Taxonomy
    /// markers never are.
    fn is_content(node: &Node) -> bool {
        !node.kind.is_taxonomy_marker()
            && (node.layer == DEFAULT_LAYER || node.kind == NodeKind::Note)
    }

    pub fn weave(&self, store: &Store) -> Result<RescueStats, WeftError> {
        let nodes = store.nodes()?;
        let mut connected: BTreeSet<String> = BTreeSet::new();
        for edge in store.edges()? {
            connected.insert(edge.source);
            connected.insert(edge.target);
        }

        let candidates: Vec<&Node> = nodes
            .iter()
            .filter(|n| n.embedding.is_some() && Self::is_content(n))
            .collect();

        let mut stats = RescueStats::default();
        let mut batch = store.begin_batch()?;
        for orphan in &nodes {
            let Some(vector) = &orphan.embedding else {
                continue;
            };
            if orphan.kind.is_taxonomy_marker() || connected.contains(&orphan.id) {
                continue;
            }
            stats.orphans += 1;

            let mut best: Option<(f32, &Node)> = None;
            for candidate in &candidates {
                if candidate.id == orphan.id {
                    continue;
                }
                let Some(score) = candidate
                    .embedding
                    .as_ref()
                    .and_then(|e| e.dot(vector))
                    .filter(|s| s.is_finite())
                else {
                    continue;
                };
                // strictly greater keeps the smallest id on ties
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, *candidate));
                }
            }

            match best {
                Some((score, target)) if score >= self.threshold => {
                    let edge = Edge::new(orphan.id.as_str(), target.id.as_str(), EdgeKind::RelatedTo)
                        .with_confidence(score)
                        .with_context(CONTEXT_SEMANTIC);
                    batch.upsert_edge(&edge)?;
                    connected.insert(orphan.id.clone());
                    connected.insert(target.id.clone());
                    stats.rescued += 1;
                    tracing::debug!(orphan = %orphan.id, target = %target.id, score, "orphan rescued");
                }
                _ => {
                    tracing::debug!(orphan = %orphan.id, "orphan left unlinked");
                }
            }
        }
        batch.commit()?;

        tracing::info!(orphans = stats.orphans, rescued = stats.rescued, "semantic rescue done");
        Ok(stats)
    }
}
