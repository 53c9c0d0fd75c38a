//! # weft-core
//!
//! The storage and reasoning engine for weft - an embedded graph + vector
//! knowledge store.
//!
//! Sources are ingested into typed nodes with optional unit-length
//! embeddings; typed, directed edges are woven from references in the text,
//! from dates, from vector similarity and from externally extracted symbols.
//! Every proposed reference edge passes a growth gate that keeps hub nodes
//! from turning into hairballs.
//!
//! ## Architectural Constraints
//!
//! - Synchronous: no async runtime, no network code
//! - Capabilities (embed, rerank, extract) are traits injected by the caller
//! - One writer per store file; readers never take the write lock
//! - Deterministic identity: the same source always yields the same node id
//! - Analytic results are ordered (BTreeMap) and reproducible

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod config;
pub mod embedding;
pub mod gate;
pub mod graph;
pub mod identity;
pub mod ingestor;
pub mod primitives;
pub mod sidecar;
pub mod source;
pub mod storage;
pub mod types;
pub mod vector;
pub mod weaver;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{Edge, EdgeKind, Node, NodeKind, NodeMeta, WeftError};
pub use vector::{Embedding, PackedVector};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use cache::ExtractionCache;
pub use config::WeftConfig;
pub use embedding::{Embedder, RerankScore, Reranker, VectorEngine};
pub use gate::{GateDecision, GateStats, GrowthGate};
pub use graph::{GraphEngine, GraphStats, LinkCandidate, Pillar};
pub use identity::{node_id, slugify, substance_hash};
pub use ingestor::{Ingestor, RunStats, SourceFile};
pub use sidecar::{
    ExtractedEntity, ExtractedGraph, ExtractedRelation, Extractor, SidecarRecord, SidecarSquasher,
    SquashOutcome, SquashReport,
};
pub use source::SourceDocument;
pub use storage::{SearchHit, Store, StoreStats, WriteBatch};
pub use weaver::{
    EdgeSink, EdgeWeaver, Lexicon, RescueStats, SemanticWeaver, TimelineStats, TimelineWeaver,
    WeaveStats,
};
