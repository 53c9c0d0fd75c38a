//! # Configuration
//!
//! Runtime configuration for a weft knowledge base. Every empirically tuned
//! constant is a field here; the compiled-in values in
//! [`crate::primitives`] are only the defaults.
//!
//! The core never reads files itself: the binary deserializes `weft.toml`
//! into [`WeftConfig`] (missing sections fall back to defaults) and calls
//! [`WeftConfig::validate`] before opening anything.

use crate::primitives::{
    DEFAULT_BATCH_SIZE, DEFAULT_DIMENSIONS, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_LOUVAIN_RESOLUTION,
    DEFAULT_MIN_EMBED_CHARS, DEFAULT_ORPHAN_SIMILARITY, DEFAULT_SUPER_NODE_THRESHOLD,
};
use crate::types::NodeKind;
use crate::WeftError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    pub store: StoreConfig,
    pub sources: Vec<SourceRoot>,
    pub extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub embeddings: EmbeddingConfig,
    pub graph: GraphConfig,
    pub timeline: TimelineConfig,
    pub ingest: IngestConfig,
    pub cache: CacheConfig,
    pub services: ServicesConfig,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sources: vec![SourceRoot {
                path: PathBuf::from("docs"),
                kind: "document".to_string(),
            }],
            extensions: vec!["md".to_string()],
            exclude_patterns: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                ".weft".to_string(),
            ],
            embeddings: EmbeddingConfig::default(),
            graph: GraphConfig::default(),
            timeline: TimelineConfig::default(),
            ingest: IngestConfig::default(),
            cache: CacheConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl WeftConfig {
    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), WeftError> {
        if self.graph.super_node_threshold == 0 {
            return Err(WeftError::InvalidConfig(
                "graph.super_node_threshold must be positive".to_string(),
            ));
        }
        let similarity = self.graph.orphan_similarity;
        if !(similarity > 0.0 && similarity <= 1.0) {
            return Err(WeftError::InvalidConfig(format!(
                "graph.orphan_similarity must be in (0, 1], got {similarity}"
            )));
        }
        if !(self.graph.louvain_resolution.is_finite() && self.graph.louvain_resolution > 0.0) {
            return Err(WeftError::InvalidConfig(
                "graph.louvain_resolution must be positive".to_string(),
            ));
        }
        if self.embeddings.dimensions == 0 {
            return Err(WeftError::InvalidConfig(
                "embeddings.dimensions must be positive".to_string(),
            ));
        }
        if self.ingest.batch_size == 0 {
            return Err(WeftError::InvalidConfig(
                "ingest.batch_size must be positive".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(WeftError::InvalidConfig(
                "at least one source extension is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".weft/resonance.redb"),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// A source root and the node kind its files default to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRoot {
    pub path: PathBuf,
    #[serde(default = "default_source_kind")]
    pub kind: String,
}

impl SourceRoot {
    #[must_use]
    pub fn node_kind(&self) -> NodeKind {
        NodeKind::from(self.kind.as_str())
    }
}

fn default_source_kind() -> String {
    "document".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimensions: usize,
    /// Bodies shorter than this are stored without a vector.
    pub min_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            min_chars: DEFAULT_MIN_EMBED_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub super_node_threshold: usize,
    pub orphan_similarity: f32,
    pub louvain_resolution: f64,
    pub persist_communities: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            super_node_threshold: DEFAULT_SUPER_NODE_THRESHOLD,
            orphan_similarity: DEFAULT_ORPHAN_SIMILARITY,
            louvain_resolution: DEFAULT_LOUVAIN_RESOLUTION,
            persist_communities: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Node kind treated as a dated record.
    pub record_kind: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            record_kind: "record".to_string(),
        }
    }
}

impl TimelineConfig {
    #[must_use]
    pub fn node_kind(&self) -> NodeKind {
        NodeKind::from(self.record_kind.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Files per write transaction.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".weft/cache/extract"),
        }
    }
}

/// Endpoints of the external capabilities. Consumed by the binary only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub embed_url: Option<String>,
    pub rerank_url: Option<String>,
    pub extract_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            embed_url: None,
            rerank_url: None,
            extract_url: None,
            timeout_ms: 2000,
        }
    }
}
