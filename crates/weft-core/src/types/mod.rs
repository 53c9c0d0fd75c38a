//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the weft engine:
//! - Node and edge records (`Node`, `Edge`, `EdgeAttributes`)
//! - Type tags (`NodeKind`, `EdgeKind`)
//! - Typed metadata with an open extension map (`NodeMeta`)
//! - Error types (`WeftError`)
//!
//! ## Identity
//!
//! - A node is identified by its string `id` alone; `domain` and `layer` are
//!   scoping axes and never take part in identity.
//! - An edge is identified by the `(source, target, kind)` triple. Writing the
//!   same triple twice overwrites the attributes, it never appends.

use crate::vector::Embedding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// NODE KIND
// =============================================================================

/// Type tag of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A source document.
    Document,
    /// A lexicon concept or term.
    Concept,
    /// A structural section of a document.
    Section,
    /// A symbol extracted by an external extractor.
    Symbol,
    /// A dated record (journal entry, debrief). Linked chronologically.
    Record,
    /// A free-form note.
    Note,
    /// Taxonomy root marker.
    Root,
    /// Taxonomy domain marker.
    Domain,
    /// Any other tag, stored verbatim (lowercase).
    Other(String),
}

impl NodeKind {
    /// Canonical lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "document",
            Self::Concept => "concept",
            Self::Section => "section",
            Self::Symbol => "symbol",
            Self::Record => "record",
            Self::Note => "note",
            Self::Root => "root",
            Self::Domain => "domain",
            Self::Other(tag) => tag,
        }
    }

    /// Tag for a kind outside the canonical set. Canonical tags map to their
    /// variant; anything else is stored lowercase.
    #[must_use]
    pub fn other(tag: &str) -> Self {
        Self::from(tag)
    }

    /// Re-derive the tag of an `Other` built with a non-canonical spelling.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Other(tag) => Self::from(tag.as_str()),
            kind => kind,
        }
    }

    /// Taxonomy markers never take part in orphan rescue.
    #[must_use]
    pub fn is_taxonomy_marker(&self) -> bool {
        matches!(self, Self::Root | Self::Domain)
    }
}

impl From<&str> for NodeKind {
    fn from(tag: &str) -> Self {
        let tag = tag.trim().to_lowercase();
        match tag.as_str() {
            "document" => Self::Document,
            "concept" | "term" => Self::Concept,
            "section" => Self::Section,
            "symbol" => Self::Symbol,
            "record" | "debrief" => Self::Record,
            "note" => Self::Note,
            "root" => Self::Root,
            "domain" => Self::Domain,
            _ => Self::Other(tag),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// EDGE KIND
// =============================================================================

/// Type tag of an edge. Stored as an uppercase string key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Bracket link `[[Title]]` from content to an entry.
    Cites,
    /// Tag reference `tag-slug` from content to a lexicon term.
    Exemplifies,
    /// Chronological succession: newer record to its predecessor.
    Succeeds,
    /// Embedding similarity (orphan rescue).
    RelatedTo,
    /// Parent document to an extracted symbol.
    Defines,
    /// Any other relation type, stored uppercase.
    Other(String),
}

impl EdgeKind {
    /// Canonical uppercase tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cites => "CITES",
            Self::Exemplifies => "EXEMPLIFIES",
            Self::Succeeds => "SUCCEEDS",
            Self::RelatedTo => "RELATED_TO",
            Self::Defines => "DEFINES",
            Self::Other(tag) => tag,
        }
    }

    /// Tag for a relation outside the canonical set, stored uppercase with
    /// `_` separators.
    #[must_use]
    pub fn other(tag: &str) -> Self {
        Self::from(tag)
    }

    /// Re-derive the tag of an `Other` built with a non-canonical spelling.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Other(tag) => Self::from(tag.as_str()),
            kind => kind,
        }
    }
}

impl From<&str> for EdgeKind {
    fn from(tag: &str) -> Self {
        let tag = tag.trim().to_uppercase().replace([' ', '-'], "_");
        match tag.as_str() {
            "CITES" => Self::Cites,
            "EXEMPLIFIES" => Self::Exemplifies,
            "SUCCEEDS" => Self::Succeeds,
            "RELATED_TO" => Self::RelatedTo,
            "DEFINES" => Self::Defines,
            _ => Self::Other(tag),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// NODE METADATA
// =============================================================================

/// Node metadata: known fields typed, everything else in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Root-relative source path.
    pub source: Option<String>,
    /// Temporal anchor (`YYYY-MM-DD` or RFC 3339).
    pub date: Option<String>,
    /// Alternative surface forms of a lexicon term.
    pub aliases: Vec<String>,
    /// Community id assigned by the last community-detection pass.
    pub community: Option<u64>,
    /// Parent node of an extracted symbol.
    pub parent_id: Option<String>,
    /// Provenance of an extracted node.
    pub extraction_source: Option<String>,
    /// Open extension map for pipeline annotations.
    pub extra: BTreeMap<String, String>,
}

// =============================================================================
// NODE
// =============================================================================

/// A node in the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable key derived from the normalized source path.
    pub id: String,
    /// Type tag.
    pub kind: NodeKind,
    /// Human label.
    pub title: String,
    /// Taxonomy axis (knowledge, lexicon, persona, code, ...).
    pub domain: String,
    /// Taxonomy axis (experience, symbol, persona, ...).
    pub layer: String,
    /// Short description, if any.
    pub summary: Option<String>,
    /// Unit-norm embedding. Persisted in its own table as packed bytes.
    #[serde(skip)]
    pub embedding: Option<Embedding>,
    /// Substance hash of the source content.
    pub hash: Option<String>,
    /// Typed metadata.
    pub meta: NodeMeta,
}

impl Node {
    /// Create a node with default taxonomy (`knowledge` / `experience`).
    /// An `Other` kind is normalized.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.normalized(),
            title: title.into(),
            domain: crate::primitives::DEFAULT_DOMAIN.to_string(),
            layer: crate::primitives::DEFAULT_LAYER.to_string(),
            summary: None,
            embedding: None,
            hash: None,
            meta: NodeMeta::default(),
        }
    }

    /// Set the taxonomy axes.
    #[must_use]
    pub fn with_taxonomy(mut self, domain: impl Into<String>, layer: impl Into<String>) -> Self {
        self.domain = domain.into();
        self.layer = layer.into();
        self
    }

    /// Attach an embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attach a substance hash.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Whether the node is a lexicon term.
    #[must_use]
    pub fn is_term(&self) -> bool {
        self.kind == NodeKind::Concept || self.domain == crate::primitives::LEXICON_DOMAIN
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// Stored attributes of an edge (the value side of the edge table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    pub confidence: f32,
    pub veracity: f32,
    pub context_source: Option<String>,
}

/// A directed, typed edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Strength in `[0, 1]`.
    pub confidence: f32,
    /// Secondary trust score in `[0, 1]`.
    pub veracity: f32,
    /// Provenance tag of the producing subsystem.
    pub context_source: Option<String>,
}

impl Edge {
    /// Create a structurally certain edge (confidence and veracity 1.0).
    /// An `Other` kind is normalized to its stored spelling.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: kind.normalized(),
            confidence: 1.0,
            veracity: 1.0,
            context_source: None,
        }
    }

    /// Set the confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    /// Set the veracity, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_veracity(mut self, veracity: f32) -> Self {
        self.veracity = clamp_unit(veracity);
        self
    }

    /// Set the provenance tag.
    #[must_use]
    pub fn with_context(mut self, context_source: impl Into<String>) -> Self {
        self.context_source = Some(context_source.into());
        self
    }

    pub(crate) fn attributes(&self) -> EdgeAttributes {
        EdgeAttributes {
            confidence: self.confidence,
            veracity: self.veracity,
            context_source: self.context_source.clone(),
        }
    }

    pub(crate) fn from_parts(source: &str, target: &str, kind: &str, attrs: EdgeAttributes) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            kind: EdgeKind::from(kind),
            confidence: attrs.confidence,
            veracity: attrs.veracity,
            context_source: attrs.context_source,
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the weft engine.
///
/// - "Not found" is never an error: lookups return `Ok(None)`
/// - Only `is_fatal()` errors abort an ingestion run
#[derive(Debug, Error)]
pub enum WeftError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// The embedded store reported an error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The store was written by an incompatible schema version.
    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: u64, expected: u64 },

    /// A write was attempted through a read-only handle.
    #[error("Store is open read-only")]
    ReadOnly,

    /// A vector failed a packing or normalization check.
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// A source or sidecar could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An external capability is not reachable.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An external capability did not answer within its timeout.
    #[error("Provider timed out: {0}")]
    ProviderTimeout(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WeftError {
    /// Whether the error aborts a whole pipeline run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::SchemaMismatch { .. } | Self::ReadOnly | Self::InvalidConfig(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_accepts_legacy_debrief_tag() {
        assert_eq!(NodeKind::from("Debrief"), NodeKind::Record);
        assert_eq!(NodeKind::from("function"), NodeKind::Other("function".into()));
        assert_eq!(NodeKind::from("function").as_str(), "function");
    }

    #[test]
    fn edge_kind_normalizes_case_and_separators() {
        assert_eq!(EdgeKind::from("related-to"), EdgeKind::RelatedTo);
        assert_eq!(EdgeKind::from("calls"), EdgeKind::Other("CALLS".into()));
        assert_eq!(EdgeKind::Exemplifies.to_string(), "EXEMPLIFIES");
    }

    #[test]
    fn other_kinds_are_normalized_on_construction() {
        let edge = Edge::new("a", "b", EdgeKind::Other("Depends on".into()));
        assert_eq!(edge.kind, EdgeKind::Other("DEPENDS_ON".into()));
        assert_eq!(EdgeKind::other("cites"), EdgeKind::Cites);

        let node = Node::new("n", NodeKind::Other("Function".into()), "N");
        assert_eq!(node.kind, NodeKind::other("FUNCTION"));
        assert_eq!(NodeKind::Other("Debrief".into()).normalized(), NodeKind::Record);
    }

    #[test]
    fn edge_scores_are_clamped() {
        let edge = Edge::new("a", "b", EdgeKind::RelatedTo)
            .with_confidence(1.7)
            .with_veracity(f32::NAN);
        assert_eq!(edge.confidence, 1.0);
        assert_eq!(edge.veracity, 0.0);
    }

    #[test]
    fn fatal_classification() {
        assert!(WeftError::SchemaMismatch { found: 1, expected: 2 }.is_fatal());
        assert!(!WeftError::ProviderTimeout("embed".into()).is_fatal());
        assert!(!WeftError::Parse("bad".into()).is_fatal());
    }

    #[test]
    fn lexicon_membership() {
        let term = Node::new("term:x", NodeKind::Concept, "X");
        let doc = Node::new("doc", NodeKind::Document, "Doc").with_taxonomy("lexicon", "experience");
        let plain = Node::new("plain", NodeKind::Document, "Plain");
        assert!(term.is_term());
        assert!(doc.is_term());
        assert!(!plain.is_term());
    }
}
