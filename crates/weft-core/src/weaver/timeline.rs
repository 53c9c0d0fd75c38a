//! Chronological succession between dated records.

use crate::primitives::CONTEXT_TIMELINE;
use crate::storage::Store;
use crate::types::{Edge, EdgeKind, Node, NodeKind};
use crate::WeftError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Edge changes of one timeline pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimelineStats {
    pub created: u64,
    pub removed: u64,
}

/// Links each dated record to the next older one with `SUCCEEDS`.
#[derive(Debug, Clone)]
pub struct TimelineWeaver {
    record_kind: NodeKind,
}

impl TimelineWeaver {
    #[must_use]
    pub fn new(record_kind: NodeKind) -> Self {
        Self { record_kind }
    }

    /// Date of a record: `meta.date`, else a `YYYY-MM-DD` prefix of the
    /// source file name.
    #[must_use]
    pub fn record_date(node: &Node) -> Option<NaiveDate> {
        if let Some(date) = node.meta.date.as_deref().and_then(parse_date_prefix) {
            return Some(date);
        }
        let source = node.meta.source.as_deref()?;
        let name = Path::new(source).file_name()?.to_str()?;
        parse_date_prefix(name)
    }

    /// Link every record of the configured kind to its predecessor. Records
    /// without a date are left out.
    ///
    /// Timeline edges that no longer join adjacent records (a record dated
    /// between two others arrived, or a record lost its date) are removed in
    /// the same batch.
    pub fn weave(&self, store: &Store) -> Result<TimelineStats, WeftError> {
        let records = store.nodes_by_type(&self.record_kind)?;
        let mut dated: Vec<(NaiveDate, &str)> = records
            .iter()
            .filter_map(|n| Self::record_date(n).map(|d| (d, n.id.as_str())))
            .collect();
        // newest first; ids break same-day ties
        dated.sort_by(|a, b| b.cmp(a));
        let chain: Vec<(&str, &str)> = dated.windows(2).map(|p| (p[0].1, p[1].1)).collect();
        let adjacent: BTreeSet<(&str, &str)> = chain.iter().copied().collect();

        let mut stats = TimelineStats::default();
        let mut batch = store.begin_batch()?;
        for record in &records {
            for edge in batch.edges_from(&record.id)? {
                let is_timeline = edge.kind == EdgeKind::Succeeds
                    && edge.context_source.as_deref() == Some(CONTEXT_TIMELINE);
                if is_timeline
                    && !adjacent.contains(&(edge.source.as_str(), edge.target.as_str()))
                    && batch.remove_edge(&edge.source, &edge.target, &edge.kind)?
                {
                    stats.removed += 1;
                }
            }
        }
        for (newer, older) in chain {
            let edge = Edge::new(newer, older, EdgeKind::Succeeds).with_context(CONTEXT_TIMELINE);
            if batch.upsert_edge(&edge)? {
                stats.created += 1;
            }
        }
        batch.commit()?;

        if dated.len() < 2 {
            tracing::debug!(records = dated.len(), removed = stats.removed, "timeline: nothing to link");
        } else {
            tracing::info!(
                records = dated.len(),
                created = stats.created,
                removed = stats.removed,
                "timeline woven"
            );
        }
        Ok(stats)
    }
}

fn parse_date_prefix(text: &str) -> Option<NaiveDate> {
    let prefix = text.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
