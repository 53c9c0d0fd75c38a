//! # Vector Engine
//!
//! Embeds text through an injected capability and runs exact similarity
//! search over the store.
//!
//! The embedding and reranking services are external. The engine only sees
//! them through the [`Embedder`] and [`Reranker`] traits, constructed by the
//! caller and passed in explicitly.

use crate::storage::{SearchHit, Store};
use crate::types::Node;
use crate::vector::Embedding;
use crate::WeftError;
use std::sync::Arc;

/// Text embedding capability.
///
/// Implementations return the raw provider vector; normalization happens in
/// [`VectorEngine::embed`]. Unreachable providers report
/// `ProviderUnavailable`, expired calls `ProviderTimeout`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, WeftError>;
}

/// Cross-encoder relevance capability.
pub trait Reranker: Send + Sync {
    /// Score `documents` against `query`. Indices refer to `documents`.
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankScore>, WeftError>;
}

/// One reranker judgement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f32,
}

/// Embedding plus brute-force search.
#[derive(Clone)]
pub struct VectorEngine {
    embedder: Arc<dyn Embedder>,
    dimensions: usize,
}

impl std::fmt::Debug for VectorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorEngine")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl VectorEngine {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, dimensions: usize) -> Self {
        Self {
            embedder,
            dimensions,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed text and normalize the result to unit length.
    ///
    /// # Errors
    ///
    /// Provider errors pass through unchanged; a vector of the wrong dimension
    /// or zero magnitude is `InvalidVector`.
    pub fn embed(&self, text: &str) -> Result<Embedding, WeftError> {
        let raw = self.embedder.embed(text)?;
        if raw.len() != self.dimensions {
            return Err(WeftError::InvalidVector(format!(
                "provider returned {} dimensions, expected {}",
                raw.len(),
                self.dimensions
            )));
        }
        Embedding::normalized(&raw)
    }

    /// Embed `query` and return the `k` most similar stored nodes.
    pub fn search(&self, store: &Store, query: &str, k: usize) -> Result<Vec<SearchHit>, WeftError> {
        let query = self.embed(query)?;
        self.search_by_vector(store, &query, k)
    }

    /// Top-`k` stored nodes by dot product against `query`.
    pub fn search_by_vector(
        &self,
        store: &Store,
        query: &Embedding,
        k: usize,
    ) -> Result<Vec<SearchHit>, WeftError> {
        store.find_similar_by_vector(query.as_slice(), k)
    }

    /// Vector search narrowed to `k` candidates, then re-scored by `reranker`.
    ///
    /// `hydrate` supplies the text of a candidate; when it returns `None` the
    /// title and summary stand in. If the reranker fails the vector ranking
    /// is returned as is.
    pub fn search_reranked(
        &self,
        store: &Store,
        reranker: &dyn Reranker,
        query: &str,
        k: usize,
        hydrate: impl Fn(&Node) -> Option<String>,
    ) -> Result<Vec<SearchHit>, WeftError> {
        let hits = self.search(store, query, k)?;
        if hits.is_empty() {
            return Ok(hits);
        }

        let mut documents = Vec::with_capacity(hits.len());
        for hit in &hits {
            let text = match store.get_node(&hit.id)? {
                Some(node) => hydrate(&node).unwrap_or_else(|| fallback_text(&node)),
                None => String::new(),
            };
            documents.push(text);
        }

        let scores = match reranker.rerank(query, &documents) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!(error = %e, "reranker failed, keeping vector order");
                return Ok(hits);
            }
        };

        let mut seen = std::collections::BTreeSet::new();
        let mut reranked: Vec<SearchHit> = scores
            .into_iter()
            .filter(|s| s.score.is_finite() && seen.insert(s.index))
            .filter_map(|s| {
                hits.get(s.index).map(|hit| SearchHit {
                    id: hit.id.clone(),
                    score: s.score,
                })
            })
            .collect();
        reranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(reranked)
    }
}

fn fallback_text(node: &Node) -> String {
    match &node.summary {
        Some(summary) => format!("{}\n{}", node.title, summary),
        None => node.title.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixed(Vec<f32>);

    impl Embedder for Fixed {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, WeftError> {
            Ok(self.0.clone())
        }
    }

    struct Down;

    impl Embedder for Down {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, WeftError> {
            Err(WeftError::ProviderUnavailable("connection refused".into()))
        }
    }

    /// Scores documents by length, longest first.
    struct ByLength;

    impl Reranker for ByLength {
        fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<RerankScore>, WeftError> {
            Ok(documents
                .iter()
                .enumerate()
                .map(|(index, d)| RerankScore {
                    index,
                    score: d.len() as f32,
                })
                .collect())
        }
    }

    struct Broken;

    impl Reranker for Broken {
        fn rerank(&self, _query: &str, _documents: &[String]) -> Result<Vec<RerankScore>, WeftError> {
            Err(WeftError::ProviderTimeout("rerank".into()))
        }
    }

    fn seeded_store(dir: &std::path::Path) -> Store {
        let store = Store::open(dir.join("kb.redb"), Duration::from_millis(200)).expect("open");
        let vectors: [(&str, [f32; 2]); 3] = [("near", [1.0, 0.1]), ("mid", [1.0, 1.0]), ("far", [0.0, 1.0])];
        for (id, v) in vectors {
            let node = Node::new(id, NodeKind::Document, id)
                .with_embedding(Embedding::normalized(&v).expect("unit"));
            store.upsert_node(&node).expect("upsert");
        }
        store
    }

    #[test]
    fn embed_normalizes_and_checks_dimensions() {
        let engine = VectorEngine::new(Arc::new(Fixed(vec![0.0, 3.0, 4.0])), 3);
        let e = engine.embed("x").expect("embed");
        assert!((e.norm() - 1.0).abs() < 1e-6);

        let wrong = VectorEngine::new(Arc::new(Fixed(vec![1.0, 0.0])), 3);
        assert!(matches!(wrong.embed("x"), Err(WeftError::InvalidVector(_))));
    }

    #[test]
    fn unavailable_provider_surfaces() {
        let engine = VectorEngine::new(Arc::new(Down), 3);
        assert!(matches!(engine.embed("x"), Err(WeftError::ProviderUnavailable(_))));
    }

    #[test]
    fn search_returns_top_k() {
        let dir = tempdir().expect("tempdir");
        let store = seeded_store(dir.path());
        let engine = VectorEngine::new(Arc::new(Fixed(vec![1.0, 0.0])), 2);

        let hits = engine.search(&store, "query", 2).expect("search");
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn reranking_reorders_candidates() {
        let dir = tempdir().expect("tempdir");
        let store = seeded_store(dir.path());
        let engine = VectorEngine::new(Arc::new(Fixed(vec![1.0, 0.0])), 2);

        let hits = engine
            .search_reranked(&store, &ByLength, "q", 2, |n| {
                (n.id == "mid").then(|| "a much longer body".to_string())
            })
            .expect("rerank");
        assert_eq!(hits[0].id, "mid");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn failed_reranker_keeps_vector_order() {
        let dir = tempdir().expect("tempdir");
        let store = seeded_store(dir.path());
        let engine = VectorEngine::new(Arc::new(Fixed(vec![1.0, 0.0])), 2);

        let hits = engine
            .search_reranked(&store, &Broken, "q", 3, |_| None)
            .expect("rerank");
        assert_eq!(hits[0].id, "near");
        assert_eq!(hits.len(), 3);
    }
}
