//! # Engine Primitives
//!
//! Compiled-in constants for the weft engine.
//!
//! Tunable values here are only defaults: every one of them can be overridden
//! through [`crate::config::WeftConfig`]. The structural constants (element
//! size, schema version, provenance tags) are fixed.

/// Size in bytes of one packed vector element (IEEE-754 `f32`).
pub const ELEMENT_SIZE: usize = 4;

/// Allowed deviation of a stored embedding's L2 norm from 1.0.
pub const NORM_TOLERANCE: f64 = 1e-4;

/// Magnitudes below this are treated as failed (zero) embeddings.
pub const ZERO_MAGNITUDE: f64 = 1e-6;

/// Current on-disk schema version.
///
/// Increment this when changing a table layout. Opening a store written with a
/// different version is a fatal error.
pub const SCHEMA_VERSION: u64 = 1;

// =============================================================================
// TUNED DEFAULTS
// =============================================================================

/// Degree at which the growth gate starts demanding a shared neighbor.
pub const DEFAULT_SUPER_NODE_THRESHOLD: usize = 50;

/// Minimum dot product for orphan rescue.
pub const DEFAULT_ORPHAN_SIMILARITY: f32 = 0.85;

/// Louvain resolution (1.0 = classic modularity).
pub const DEFAULT_LOUVAIN_RESOLUTION: f64 = 1.0;

/// Embedding dimensions of the default model (bge-small-en-v1.5).
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Bodies shorter than this are stored without an embedding.
pub const DEFAULT_MIN_EMBED_CHARS: usize = 50;

/// Files per write transaction during ingestion.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// How long to wait for another process to release the store file.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Maximum number of Louvain passes (levels) before giving up.
pub const MAX_LOUVAIN_LEVELS: usize = 32;

/// Confidence of sidecar relations when the record carries none.
pub const DEFAULT_RELATION_CONFIDENCE: f32 = 0.8;

// =============================================================================
// TAXONOMY DEFAULTS
// =============================================================================

pub const DEFAULT_DOMAIN: &str = "knowledge";
pub const DEFAULT_LAYER: &str = "experience";
pub const LEXICON_DOMAIN: &str = "lexicon";
pub const CODE_DOMAIN: &str = "code";
pub const SYMBOL_LAYER: &str = "symbol";

// =============================================================================
// PROVENANCE TAGS (edge `context_source`)
// =============================================================================

pub const CONTEXT_EDGE_WEAVER: &str = "edge-weaver";
pub const CONTEXT_TIMELINE: &str = "timeline-weaver";
pub const CONTEXT_SEMANTIC: &str = "semantic-weaver";
pub const CONTEXT_LANG_EXTRACT: &str = "lang-extract";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_size_is_f32() {
        assert_eq!(ELEMENT_SIZE, std::mem::size_of::<f32>());
    }

    #[test]
    fn orphan_similarity_is_a_cosine() {
        assert!(DEFAULT_ORPHAN_SIMILARITY > 0.0 && DEFAULT_ORPHAN_SIMILARITY <= 1.0);
    }
}
