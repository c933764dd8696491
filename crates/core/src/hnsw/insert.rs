//! Graph construction and maintenance.
//!
//! Insertion descends from the entry point to the node's sampled layer, then
//! links the node layer by layer: an `ef_construction`-wide candidate search,
//! neighbor selection (simple at layer 0, diversity heuristic with extension
//! above), bidirectional linking, and pruning of any neighbor pushed over its
//! degree cap. Erasure unlinks everywhere and reselects the entry point when
//! needed.

use crate::hnsw::distance::DistanceMetric;
use crate::hnsw::graph::{HnswGraph, Node};
use crate::hnsw::visited::VisitedSet;
use crate::source::RowKey;

/// Construction parameters threaded through graph mutation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuildParams {
    pub m: usize,
    pub m0: usize,
    pub ef_construction: usize,
}

impl BuildParams {
    fn cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }
}

impl HnswGraph {
    /// Insert `vector` under `key` with a pre-sampled top layer.
    ///
    /// The caller has already validated the dimension and erased any stale
    /// node for `key`.
    pub(crate) fn insert_at_level(
        &mut self,
        metric: DistanceMetric,
        key: RowKey,
        vector: Vec<f64>,
        level: usize,
        params: BuildParams,
    ) {
        let node = Node::new(key, vector, level);

        let Some(entry) = self.entry() else {
            let id = self.insert_node(node);
            self.set_entry(id, level);
            return;
        };

        // Descend the layers above the node's level with greedy hops.
        let mut start = entry.id;
        for layer in (level + 1..=entry.layer).rev() {
            start = self.greedy_walk(metric, &node.vector, start, layer);
        }

        // Register before linking so pruning sees a consistent store.
        let new_id = self.insert_node(node);
        let query = self.node(new_id).vector.clone();

        let mut visited = VisitedSet::new(self.id_capacity());
        let top = level.min(entry.layer);
        for layer in (0..=top).rev() {
            let candidates =
                self.search_layer(metric, &query, start, params.ef_construction, layer, &mut visited);

            let cap = params.cap(layer);
            let chosen = if layer == 0 {
                Self::select_simple(&candidates, cap)
            } else {
                self.select_heuristic(metric, &query, &candidates, cap, layer, true)
            };

            for &neighbor in &chosen {
                self.link(new_id, neighbor, layer);
            }
            for &neighbor in &chosen {
                self.prune(metric, neighbor, layer, cap);
            }

            if let Some(&(nearest, _)) = candidates.first() {
                start = nearest;
            }
        }

        if level > entry.layer {
            self.set_entry(new_id, level);
        }
    }

    /// Remove `key` from the graph, unlinking it at every layer it occupies.
    /// Returns `false` when the key is not indexed.
    pub(crate) fn erase_key(&mut self, key: RowKey) -> bool {
        let Some(id) = self.id_of(key) else {
            return false;
        };

        let top = self.node(id).top_layer;
        for layer in 0..=top {
            let neighbors = self.neighbors(id, layer).to_vec();
            for neighbor in neighbors {
                self.unlink(id, neighbor, layer);
            }
        }

        let was_entry = self.entry().is_some_and(|e| e.id == id);
        self.remove_node(id);
        if was_entry {
            self.reselect_entry();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRIC: DistanceMetric = DistanceMetric::Euclidean;
    const PARAMS: BuildParams = BuildParams {
        m: 4,
        m0: 8,
        ef_construction: 32,
    };

    fn build(points: &[(RowKey, Vec<f64>)], levels: &[usize]) -> HnswGraph {
        let mut g = HnswGraph::new();
        for (i, (key, vector)) in points.iter().enumerate() {
            g.insert_at_level(METRIC, *key, vector.clone(), levels[i], PARAMS);
        }
        g
    }

    fn assert_symmetric(g: &HnswGraph) {
        for (id, node) in g.iter() {
            for (layer, adj) in node.neighbors.iter().enumerate() {
                for &neighbor in adj {
                    assert!(
                        g.neighbors(neighbor, layer).contains(&id),
                        "edge {id}<->{neighbor} at layer {layer} is one-sided"
                    );
                }
            }
        }
    }

    #[test]
    fn test_first_insert_becomes_entry() {
        let g = build(&[(7, vec![1.0, 2.0])], &[3]);
        let entry = g.entry().unwrap();
        assert_eq!(g.node(entry.id).key, 7);
        assert_eq!(entry.layer, 3);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_inserts_stay_connected_and_symmetric() {
        let points: Vec<(RowKey, Vec<f64>)> = (0..20)
            .map(|i| (i, vec![i as f64, (i % 5) as f64]))
            .collect();
        let levels = vec![0; 20];
        let g = build(&points, &levels);
        assert_eq!(g.len(), 20);
        assert_symmetric(&g);
        // Every non-entry node got at least one link.
        for (id, node) in g.iter() {
            if g.entry().unwrap().id != id {
                assert!(
                    !node.neighbors[0].is_empty(),
                    "node {} is disconnected",
                    node.key
                );
            }
        }
    }

    #[test]
    fn test_higher_level_insert_promotes_entry() {
        let mut g = build(&[(1, vec![0.0]), (2, vec![1.0])], &[0, 0]);
        g.insert_at_level(METRIC, 3, vec![2.0], 5, PARAMS);
        let entry = g.entry().unwrap();
        assert_eq!(g.node(entry.id).key, 3);
        assert_eq!(entry.layer, 5);
    }

    #[test]
    fn test_degree_stays_within_cap() {
        let points: Vec<(RowKey, Vec<f64>)> = (0..60)
            .map(|i| {
                let angle = i as f64 * 0.7;
                (i, vec![angle.cos(), angle.sin()])
            })
            .collect();
        let levels: Vec<usize> = (0..60).map(|i| if i % 13 == 0 { 1 } else { 0 }).collect();
        let g = build(&points, &levels);
        for (_, node) in g.iter() {
            for (layer, adj) in node.neighbors.iter().enumerate() {
                let cap = if layer == 0 { PARAMS.m0 } else { PARAMS.m };
                assert!(
                    adj.len() <= cap + 2,
                    "node {} layer {layer} has degree {}",
                    node.key,
                    adj.len()
                );
            }
        }
    }

    #[test]
    fn test_erase_missing_key_is_noop() {
        let mut g = build(&[(1, vec![0.0])], &[0]);
        assert!(!g.erase_key(99));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_erase_unlinks_everywhere() {
        let points: Vec<(RowKey, Vec<f64>)> =
            (0..10).map(|i| (i, vec![i as f64, 0.0])).collect();
        let levels = vec![0, 1, 0, 2, 0, 1, 0, 0, 1, 0];
        let mut g = build(&points, &levels);

        assert!(g.erase_key(3));
        assert_eq!(g.len(), 9);
        assert!(g.id_of(3).is_none());
        for (_, node) in g.iter() {
            for adj in &node.neighbors {
                for &n in adj {
                    assert_ne!(g.node(n).key, 3, "stale reference to erased node");
                }
            }
        }
        assert_symmetric(&g);
    }

    #[test]
    fn test_erase_entry_reselects_highest() {
        let points: Vec<(RowKey, Vec<f64>)> =
            (0..5).map(|i| (i, vec![i as f64])).collect();
        let levels = vec![0, 3, 0, 2, 0];
        let mut g = build(&points, &levels);
        assert_eq!(g.node(g.entry().unwrap().id).key, 1);

        g.erase_key(1);
        let entry = g.entry().unwrap();
        assert_eq!(g.node(entry.id).key, 3);
        assert_eq!(entry.layer, 2);
    }

    #[test]
    fn test_erase_last_node_empties_graph() {
        let mut g = build(&[(1, vec![0.0])], &[2]);
        g.erase_key(1);
        assert!(g.is_empty());
        assert!(g.entry().is_none());
        assert_eq!(g.max_layer(), -1);
    }
}
