//! # Weavers
//!
//! Edge producers. The [`EdgeWeaver`] runs per document during ingestion;
//! the [`TimelineWeaver`] and [`SemanticWeaver`] are enrichment passes that
//! run once all documents of a run are persisted.

mod edge;
mod semantic;
mod timeline;

pub use edge::{EdgeSink, EdgeWeaver, Lexicon, WeaveStats};
pub use semantic::{RescueStats, SemanticWeaver};
pub use timeline::{TimelineStats, TimelineWeaver};
