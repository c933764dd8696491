//! Neighbor selection and degree pruning.
//!
//! Layer 0 keeps the plain nearest M0 candidates. Upper layers use the
//! diversity heuristic: a candidate is accepted only when it is closer to the
//! query than to every already-accepted neighbor, which spreads links across
//! directions instead of clustering them.

use crate::hnsw::distance::DistanceMetric;
use crate::hnsw::graph::{HnswGraph, NodeId};
use std::collections::HashSet;

impl HnswGraph {
    /// Keep the nearest `m` candidates. `candidates` must be sorted ascending
    /// by distance (as returned by `search_layer`).
    pub(crate) fn select_simple(candidates: &[(NodeId, f64)], m: usize) -> Vec<NodeId> {
        candidates.iter().take(m).map(|&(id, _)| id).collect()
    }

    /// Diversity-based selection of up to `m` neighbors.
    ///
    /// With `extend` set, candidates are first augmented by their own
    /// neighbors at `layer` (used during insertion at upper layers; pruning
    /// never extends). Selection stops at `m`; there is no backfill with
    /// rejected candidates.
    pub(crate) fn select_heuristic(
        &self,
        metric: DistanceMetric,
        query: &[f64],
        candidates: &[(NodeId, f64)],
        m: usize,
        layer: usize,
        extend: bool,
    ) -> Vec<NodeId> {
        let mut working: Vec<(NodeId, f64)> = candidates.to_vec();
        if extend {
            let mut seen: HashSet<NodeId> = working.iter().map(|&(id, _)| id).collect();
            for &(id, _) in candidates {
                for &neighbor in self.neighbors(id, layer) {
                    if seen.insert(neighbor) {
                        let d = metric.distance(query, &self.node(neighbor).vector);
                        working.push((neighbor, d));
                    }
                }
            }
            working.sort_by(|a, b| a.1.total_cmp(&b.1));
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(m);
        for &(candidate, dist_to_query) in &working {
            if selected.len() >= m {
                break;
            }
            let candidate_vec = &self.node(candidate).vector;
            let diverse = selected.iter().all(|&accepted| {
                metric.distance(candidate_vec, &self.node(accepted).vector) >= dist_to_query
            });
            if diverse {
                selected.push(candidate);
            }
        }
        selected
    }

    /// Re-select the adjacency of `id` at `layer` when it exceeds `cap`,
    /// unlinking every dropped neighbor so symmetry is preserved.
    pub(crate) fn prune(&mut self, metric: DistanceMetric, id: NodeId, layer: usize, cap: usize) {
        if self.neighbors(id, layer).len() <= cap {
            return;
        }

        let base = self.node(id).vector.clone();
        let mut candidates: Vec<(NodeId, f64)> = self
            .neighbors(id, layer)
            .iter()
            .map(|&n| (n, metric.distance(&base, &self.node(n).vector)))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        let keep = self.select_heuristic(metric, &base, &candidates, cap, layer, false);
        let keep_set: HashSet<NodeId> = keep.iter().copied().collect();
        let dropped: Vec<NodeId> = candidates
            .iter()
            .map(|&(n, _)| n)
            .filter(|n| !keep_set.contains(n))
            .collect();
        for n in dropped {
            self.unlink(id, n, layer);
        }
        self.replace_adjacency(id, layer, keep);
    }
}
