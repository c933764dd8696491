//! Layer traversal: greedy descent, best-first expansion, k-NN, radius.
//!
//! Two heaps drive the best-first search: a min-heap of open candidates and a
//! max-heap holding the best `ef` results seen so far. The visited set is
//! reused across layers of one query.

use crate::hnsw::distance::DistanceMetric;
use crate::hnsw::graph::{HnswGraph, NodeId};
use crate::hnsw::visited::VisitedSet;
use crate::source::RowKey;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Heap entry: ordered by distance, ties broken by id so traversal order is
/// deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scored {
    dist: OrderedFloat<f64>,
    id: NodeId,
}

impl Scored {
    fn new(dist: f64, id: NodeId) -> Self {
        Self {
            dist: OrderedFloat(dist),
            id,
        }
    }
}

impl HnswGraph {
    #[inline]
    fn distance_to(&self, metric: DistanceMetric, query: &[f64], id: NodeId) -> f64 {
        metric.distance(query, &self.node(id).vector)
    }

    /// Greedy walk at one layer: hop to the closest neighbor of the current
    /// best until no neighbor improves. Used to descend the layers above the
    /// search target.
    pub(crate) fn greedy_walk(
        &self,
        metric: DistanceMetric,
        query: &[f64],
        start: NodeId,
        layer: usize,
    ) -> NodeId {
        let mut best = start;
        let mut best_dist = self.distance_to(metric, query, best);
        loop {
            let mut improved = false;
            for &neighbor in self.neighbors(best, layer) {
                let d = self.distance_to(metric, query, neighbor);
                if d < best_dist {
                    best = neighbor;
                    best_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Best-first search of a single layer from `entry`, keeping the closest
    /// `ef` nodes. Returns (id, distance) pairs sorted ascending.
    pub(crate) fn search_layer(
        &self,
        metric: DistanceMetric,
        query: &[f64],
        entry: NodeId,
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
    ) -> Vec<(NodeId, f64)> {
        visited.reset();
        visited.grow(self.id_capacity());

        let mut open: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        let mut top: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);

        let entry_dist = self.distance_to(metric, query, entry);
        visited.insert(entry);
        open.push(Reverse(Scored::new(entry_dist, entry)));
        top.push(Scored::new(entry_dist, entry));

        while let Some(Reverse(current)) = open.pop() {
            let worst = top.peek().map_or(f64::INFINITY, |s| s.dist.0);
            if top.len() >= ef && current.dist.0 > worst {
                break;
            }
            for &neighbor in self.neighbors(current.id, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.distance_to(metric, query, neighbor);
                let worst = top.peek().map_or(f64::INFINITY, |s| s.dist.0);
                if top.len() < ef || d < worst {
                    open.push(Reverse(Scored::new(d, neighbor)));
                    top.push(Scored::new(d, neighbor));
                    if top.len() > ef {
                        top.pop();
                    }
                }
            }
        }

        top.into_sorted_vec()
            .into_iter()
            .map(|s| (s.id, s.dist.0))
            .collect()
    }

    /// k nearest neighbors. `ef` and `k` are assumed pre-clamped by the
    /// caller (`ef >= 1`). Returns (row key, distance) pairs sorted
    /// ascending, at most `k` of them.
    pub(crate) fn knn(
        &self,
        metric: DistanceMetric,
        query: &[f64],
        k: usize,
        ef: usize,
    ) -> Vec<(RowKey, f64)> {
        let Some(entry) = self.entry() else {
            return Vec::new();
        };

        let mut start = entry.id;
        for layer in (1..=entry.layer).rev() {
            start = self.greedy_walk(metric, query, start, layer);
        }

        let mut visited = VisitedSet::new(self.id_capacity());
        let mut found = self.search_layer(metric, query, start, ef, 0, &mut visited);
        found.truncate(k);
        found
            .into_iter()
            .map(|(id, dist)| (self.node(id).key, dist))
            .collect()
    }

    /// Radius search bounded by the same ef budget as k-NN: runs a k-NN over
    /// all nodes with an enlarged candidate set, then keeps the prefix within
    /// `rmax`. May miss vectors poorly connected to the entry point.
    pub(crate) fn radius_bounded(
        &self,
        metric: DistanceMetric,
        query: &[f64],
        rmax: f64,
        ef_search: usize,
    ) -> Vec<(RowKey, f64)> {
        let n = self.len();
        let ef = (ef_search * 2).min(ef_search.max(n)).max(1);
        let mut hits = self.knn(metric, query, n, ef);
        if let Some(cut) = hits.iter().position(|&(_, d)| d > rmax) {
            hits.truncate(cut);
        }
        hits
    }

    /// Strict radius search: after descending to layer 0, expands the
    /// frontier until its minimum distance exceeds `rmax`. Complete for any
    /// region reachable from the entry point through nodes within the radius,
    /// at the cost of unbounded expansion.
    pub(crate) fn radius_exhaustive(
        &self,
        metric: DistanceMetric,
        query: &[f64],
        rmax: f64,
    ) -> Vec<(RowKey, f64)> {
        let Some(entry) = self.entry() else {
            return Vec::new();
        };

        let mut start = entry.id;
        for layer in (1..=entry.layer).rev() {
            start = self.greedy_walk(metric, query, start, layer);
        }

        let mut visited = VisitedSet::new(self.id_capacity());
        visited.insert(start);
        let mut open: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        open.push(Reverse(Scored::new(
            self.distance_to(metric, query, start),
            start,
        )));

        let mut hits: Vec<(RowKey, f64)> = Vec::new();
        while let Some(Reverse(current)) = open.pop() {
            if current.dist.0 > rmax {
                break;
            }
            hits.push((self.node(current.id).key, current.dist.0));
            for &neighbor in self.neighbors(current.id, 0) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.distance_to(metric, query, neighbor);
                open.push(Reverse(Scored::new(d, neighbor)));
            }
        }
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::graph::Node;

    const METRIC: DistanceMetric = DistanceMetric::Euclidean;

    /// Line of nodes at x = 0, 1, 2, ... fully chained at layer 0.
    fn line_graph(n: usize) -> HnswGraph {
        let mut g = HnswGraph::new();
        let ids: Vec<NodeId> = (0..n)
            .map(|i| g.insert_node(Node::new(i as RowKey, vec![i as f64], 0)))
            .collect();
        for w in ids.windows(2) {
            g.link(w[0], w[1], 0);
        }
        g.set_entry(ids[0], 0);
        g
    }

    #[test]
    fn test_greedy_walk_descends_to_local_minimum() {
        let g = line_graph(10);
        let start = g.id_of(0).unwrap();
        let best = g.greedy_walk(METRIC, &[7.2], start, 0);
        assert_eq!(g.node(best).key, 7);
    }

    #[test]
    fn test_greedy_walk_stays_when_entry_is_best() {
        let g = line_graph(5);
        let start = g.id_of(2).unwrap();
        assert_eq!(g.greedy_walk(METRIC, &[2.1], start, 0), start);
    }

    #[test]
    fn test_search_layer_returns_ascending() {
        let g = line_graph(10);
        let entry = g.id_of(0).unwrap();
        let mut visited = VisitedSet::new(g.id_capacity());
        let found = g.search_layer(METRIC, &[4.0], entry, 5, 0, &mut visited);
        assert_eq!(found.len(), 5);
        for pair in found.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "distances must ascend");
        }
        assert_eq!(g.node(found[0].0).key, 4);
    }

    #[test]
    fn test_search_layer_respects_ef() {
        let g = line_graph(20);
        let entry = g.id_of(0).unwrap();
        let mut visited = VisitedSet::new(g.id_capacity());
        let found = g.search_layer(METRIC, &[0.0], entry, 3, 0, &mut visited);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_knn_finds_nearest_keys() {
        let g = line_graph(10);
        let hits = g.knn(METRIC, &[5.1], 3, 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 5);
        let keys: Vec<RowKey> = hits.iter().map(|&(k, _)| k).collect();
        assert!(keys.contains(&4) || keys.contains(&6));
    }

    #[test]
    fn test_knn_on_empty_graph() {
        let g = HnswGraph::new();
        assert!(g.knn(METRIC, &[0.0], 3, 8).is_empty());
    }

    #[test]
    fn test_radius_bounded_containment() {
        let g = line_graph(10);
        let hits = g.radius_bounded(METRIC, &[0.0], 3.5, 64);
        let keys: Vec<RowKey> = hits.iter().map(|&(k, _)| k).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
        for &(_, d) in &hits {
            assert!(d <= 3.5);
        }
    }

    #[test]
    fn test_radius_exhaustive_reaches_far_nodes() {
        let g = line_graph(50);
        let hits = g.radius_exhaustive(METRIC, &[0.0], 40.0);
        assert_eq!(hits.len(), 41, "every node within the radius is found");
        for pair in hits.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_radius_exhaustive_empty_when_entry_outside() {
        let g = line_graph(5);
        let hits = g.radius_exhaustive(METRIC, &[100.0], 1.0);
        assert!(hits.is_empty());
    }
}
