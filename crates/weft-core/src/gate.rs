//! # Growth Gate
//!
//! Admission control for new edges. A target below the super-node threshold
//! accepts any edge; at or above it, an edge is admitted only if source and
//! target already share a neighbour, so hubs grow by reinforcing existing
//! structure instead of fanning out without bound.
//!
//! This is a local heuristic. Rejecting a legitimate edge is acceptable.

use crate::graph::GraphEngine;
use serde::Serialize;

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    /// Why the edge was rejected.
    pub reason: Option<String>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }
}

/// Check counters, reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub checked: u64,
    pub rejected: u64,
}

/// The super-node gate.
#[derive(Debug, Clone)]
pub struct GrowthGate {
    threshold: usize,
    stats: GateStats,
}

impl GrowthGate {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            stats: GateStats::default(),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Check with the configured threshold.
    pub fn admit(&mut self, source: &str, target: &str, graph: &GraphEngine) -> GateDecision {
        self.check(source, target, graph, self.threshold)
    }

    /// Decide whether `source -> target` may be added to `graph`.
    pub fn check(
        &mut self,
        source: &str,
        target: &str,
        graph: &GraphEngine,
        threshold: usize,
    ) -> GateDecision {
        self.stats.checked += 1;

        let degree = graph.degree(target);
        if degree < threshold || graph.shares_neighbor(source, target) {
            return GateDecision::allow();
        }

        self.stats.rejected += 1;
        tracing::debug!(source, target, degree, threshold, "edge rejected by growth gate");
        GateDecision {
            allowed: false,
            reason: Some(format!(
                "{target} has degree {degree} (threshold {threshold}) and shares no neighbour with {source}"
            )),
        }
    }

    #[must_use]
    pub fn stats(&self) -> GateStats {
        self.stats
    }
}
