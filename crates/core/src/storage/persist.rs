//! Versioned on-disk representation of the graph.
//!
//! Root layout (all arrays allocated from the host block arena):
//!
//! ```text
//! root (refs):  [metadata, node_0, node_1, ...]
//! metadata:     [format_version, entry_row_key, entry_layer,
//!                dimension, M, ef_construction, ef_search]
//! node (refs):  [info, vector, conns_layer_0, ..., conns_layer_top]
//! info:         [row_key, top_layer]
//! vector:       one i64 bit pattern per f64 component
//! conns:        row keys of the layer's neighbors
//! ```
//!
//! Saving never mutates existing arrays: a complete new root is built, the
//! old root destroyed, and the parent slot rewired to the new ref, so a
//! concurrent reopen observes either the old or the new state in full.

use crate::error::{IndexError, Result};
use crate::hnsw::graph::{HnswGraph, Node, NodeId};
use crate::source::RowKey;
use crate::storage::arena::{ArenaError, ArrayRef, BlockArena, NULL_REF};

/// Only format accepted by [`load_graph`].
pub const FORMAT_VERSION: u64 = 1;

const METADATA_SLOTS: usize = 7;

/// Runtime fields persisted alongside the graph and recovered on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GraphMeta {
    pub dimension: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

/// Result of [`load_graph`]: the reconstructed graph plus recovered metadata.
#[derive(Debug)]
pub(crate) struct LoadedGraph {
    pub graph: HnswGraph,
    pub meta: GraphMeta,
}

/// Serialize the graph into a fresh root array and atomically swap it in.
///
/// On any allocation failure the partially built root is torn down and the
/// old root is left untouched. Returns the new root ref.
pub(crate) fn save_graph(
    arena: &mut BlockArena,
    graph: &HnswGraph,
    meta: GraphMeta,
    old_root: Option<ArrayRef>,
    parent: Option<(ArrayRef, usize)>,
) -> std::result::Result<ArrayRef, ArenaError> {
    let new_root = arena.alloc(true)?;
    if let Err(err) = fill_root(arena, new_root, graph, meta) {
        let _ = arena.destroy_deep(new_root);
        return Err(err);
    }

    if let Some(old) = old_root {
        arena.destroy_deep(old)?;
    }
    if let Some((parent_ref, slot)) = parent {
        arena.set_ref(parent_ref, slot, new_root)?;
    }
    tracing::debug!(
        nodes = graph.len(),
        root = new_root,
        "saved vector index root"
    );
    Ok(new_root)
}

fn fill_root(
    arena: &mut BlockArena,
    root: ArrayRef,
    graph: &HnswGraph,
    meta: GraphMeta,
) -> std::result::Result<(), ArenaError> {
    let metadata = arena.alloc(false)?;
    arena.push(metadata, FORMAT_VERSION as i64)?;
    let entry_key = graph
        .entry()
        .map_or(0, |e| graph.node(e.id).key);
    arena.push(metadata, entry_key)?;
    arena.push(metadata, graph.max_layer() as i64)?;
    arena.push(metadata, meta.dimension as i64)?;
    arena.push(metadata, meta.m as i64)?;
    arena.push(metadata, meta.ef_construction as i64)?;
    arena.push(metadata, meta.ef_search as i64)?;
    arena.push_ref(root, metadata)?;

    for (id, node) in graph.iter() {
        let node_array = arena.alloc(true)?;

        let info = arena.alloc(false)?;
        arena.push(info, node.key)?;
        arena.push(info, node.top_layer as i64)?;
        arena.push_ref(node_array, info)?;

        let vector = arena.alloc(false)?;
        for &component in &node.vector {
            arena.push(vector, component.to_bits() as i64)?;
        }
        arena.push_ref(node_array, vector)?;

        for layer in 0..=node.top_layer {
            let conns = arena.alloc(false)?;
            for &neighbor in graph.neighbors(id, layer) {
                arena.push(conns, graph.node(neighbor).key)?;
            }
            arena.push_ref(node_array, conns)?;
        }
        arena.push_ref(root, node_array)?;
    }
    Ok(())
}

/// Reconstruct a graph from a persisted root.
///
/// Fails with [`IndexError::Corrupt`] when the metadata array is missing,
/// structurally short, or carries an unsupported format version. Well-formed
/// persisted state is otherwise assumed to satisfy the graph invariants.
pub(crate) fn load_graph(arena: &BlockArena, root: ArrayRef) -> Result<LoadedGraph> {
    let root_len = arena.len(root).map_err(corrupt)?;
    if root_len == 0 {
        return Err(IndexError::Corrupt("root has no metadata array".into()));
    }

    let metadata = arena.get_ref(root, 0).map_err(corrupt)?;
    if metadata == NULL_REF {
        return Err(IndexError::Corrupt("metadata ref is null".into()));
    }
    let metadata_len = arena.len(metadata).map_err(corrupt)?;
    if metadata_len < METADATA_SLOTS {
        return Err(IndexError::Corrupt(format!(
            "metadata array has {metadata_len} slots, expected {METADATA_SLOTS}"
        )));
    }

    let version = arena.get(metadata, 0).map_err(corrupt)? as u64;
    if version != FORMAT_VERSION {
        return Err(IndexError::Corrupt(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let entry_key: RowKey = arena.get(metadata, 1).map_err(corrupt)?;
    let entry_layer = arena.get(metadata, 2).map_err(corrupt)?;
    let meta = GraphMeta {
        dimension: arena.get(metadata, 3).map_err(corrupt)? as usize,
        m: arena.get(metadata, 4).map_err(corrupt)? as usize,
        ef_construction: arena.get(metadata, 5).map_err(corrupt)? as usize,
        ef_search: arena.get(metadata, 6).map_err(corrupt)? as usize,
    };

    // First pass: materialize nodes; adjacency still names row keys.
    let mut graph = HnswGraph::new();
    let mut raw_conns: Vec<(NodeId, Vec<Vec<RowKey>>)> = Vec::new();
    for slot in 1..root_len {
        let node_ref = arena.get_ref(root, slot).map_err(corrupt)?;
        if node_ref == NULL_REF {
            continue;
        }
        let node_len = arena.len(node_ref).map_err(corrupt)?;
        if node_len < 2 {
            return Err(IndexError::Corrupt(format!(
                "node array {node_ref} has {node_len} slots"
            )));
        }

        let info = arena.get_ref(node_ref, 0).map_err(corrupt)?;
        let key: RowKey = arena.get(info, 0).map_err(corrupt)?;
        let top_layer = arena.get(info, 1).map_err(corrupt)?;
        if top_layer < 0 {
            return Err(IndexError::Corrupt(format!(
                "node {key} has negative top layer {top_layer}"
            )));
        }
        let top_layer = top_layer as usize;

        let vector_ref = arena.get_ref(node_ref, 1).map_err(corrupt)?;
        let vector_len = arena.len(vector_ref).map_err(corrupt)?;
        if vector_len != meta.dimension {
            return Err(IndexError::Corrupt(format!(
                "node {key} vector has {vector_len} components, expected {}",
                meta.dimension
            )));
        }
        let mut vector = Vec::with_capacity(vector_len);
        for i in 0..vector_len {
            let bits = arena.get(vector_ref, i).map_err(corrupt)?;
            vector.push(f64::from_bits(bits as u64));
        }

        let mut conns = Vec::with_capacity(top_layer + 1);
        for layer in 0..=top_layer {
            let slot_index = 2 + layer;
            if slot_index >= node_len {
                conns.push(Vec::new());
                continue;
            }
            let conn_ref = arena.get_ref(node_ref, slot_index).map_err(corrupt)?;
            let mut layer_keys = Vec::new();
            if conn_ref != NULL_REF {
                let conn_len = arena.len(conn_ref).map_err(corrupt)?;
                for i in 0..conn_len {
                    layer_keys.push(arena.get(conn_ref, i).map_err(corrupt)?);
                }
            }
            conns.push(layer_keys);
        }

        let id = graph.insert_node(Node::new(key, vector, top_layer));
        raw_conns.push((id, conns));
    }

    // Second pass: resolve adjacency row keys to internal ids.
    for (id, conns) in raw_conns {
        for (layer, layer_keys) in conns.into_iter().enumerate() {
            let mut adjacency = Vec::with_capacity(layer_keys.len());
            for key in layer_keys {
                match graph.id_of(key) {
                    Some(neighbor) => adjacency.push(neighbor),
                    None => {
                        tracing::warn!(key, layer, "dropping edge to unknown row key");
                    }
                }
            }
            graph.replace_adjacency(id, layer, adjacency);
        }
    }

    if entry_layer >= 0 {
        let Some(id) = graph.id_of(entry_key) else {
            return Err(IndexError::Corrupt(format!(
                "entry point row key {entry_key} is not among the persisted nodes"
            )));
        };
        graph.set_entry(id, entry_layer as usize);
    } else if !graph.is_empty() {
        return Err(IndexError::Corrupt(
            "nodes present but entry layer is -1".into(),
        ));
    }

    tracing::info!(
        nodes = graph.len(),
        dimension = meta.dimension,
        "loaded vector index root"
    );
    Ok(LoadedGraph { graph, meta })
}

fn corrupt(err: ArenaError) -> IndexError {
    IndexError::Corrupt(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::insert::BuildParams;
    use crate::hnsw::DistanceMetric;
    use std::collections::HashSet;

    const META: GraphMeta = GraphMeta {
        dimension: 2,
        m: 4,
        ef_construction: 32,
        ef_search: 64,
    };

    fn sample_graph(n: usize) -> HnswGraph {
        let params = BuildParams {
            m: 4,
            m0: 8,
            ef_construction: 32,
        };
        let mut g = HnswGraph::new();
        for i in 0..n {
            let level = if i % 7 == 0 { 1 } else { 0 };
            g.insert_at_level(
                DistanceMetric::Euclidean,
                i as RowKey,
                vec![i as f64, (i * i % 11) as f64],
                level,
                params,
            );
        }
        g
    }

    fn adjacency_by_key(g: &HnswGraph) -> Vec<(RowKey, usize, Vec<Vec<RowKey>>)> {
        let mut out: Vec<(RowKey, usize, Vec<Vec<RowKey>>)> = g
            .iter()
            .map(|(id, node)| {
                let layers = (0..=node.top_layer)
                    .map(|layer| {
                        let mut keys: Vec<RowKey> = g
                            .neighbors(id, layer)
                            .iter()
                            .map(|&n| g.node(n).key)
                            .collect();
                        keys.sort_unstable();
                        keys
                    })
                    .collect();
                (node.key, node.top_layer, layers)
            })
            .collect();
        out.sort_by_key(|&(key, _, _)| key);
        out
    }

    #[test]
    fn test_round_trip_empty_graph() {
        let mut arena = BlockArena::new();
        let graph = HnswGraph::new();
        let root = save_graph(&mut arena, &graph, META, None, None).unwrap();

        let loaded = load_graph(&arena, root).unwrap();
        assert!(loaded.graph.is_empty());
        assert!(loaded.graph.entry().is_none());
        assert_eq!(loaded.meta, META);
    }

    #[test]
    fn test_round_trip_preserves_graph() {
        let mut arena = BlockArena::new();
        let graph = sample_graph(30);
        let root = save_graph(&mut arena, &graph, META, None, None).unwrap();

        let loaded = load_graph(&arena, root).unwrap();
        assert_eq!(loaded.graph.len(), 30);
        assert_eq!(adjacency_by_key(&loaded.graph), adjacency_by_key(&graph));

        let entry_key = graph.node(graph.entry().unwrap().id).key;
        let loaded_entry_key = loaded.graph.node(loaded.graph.entry().unwrap().id).key;
        assert_eq!(loaded_entry_key, entry_key);
        assert_eq!(loaded.graph.max_layer(), graph.max_layer());
    }

    #[test]
    fn test_round_trip_preserves_vectors() {
        let mut arena = BlockArena::new();
        let mut graph = HnswGraph::new();
        let params = BuildParams {
            m: 4,
            m0: 8,
            ef_construction: 16,
        };
        graph.insert_at_level(
            DistanceMetric::Euclidean,
            5,
            vec![std::f64::consts::PI, -0.0],
            0,
            params,
        );
        let root = save_graph(&mut arena, &graph, META, None, None).unwrap();
        let loaded = load_graph(&arena, root).unwrap();
        let id = loaded.graph.id_of(5).unwrap();
        let vector = &loaded.graph.node(id).vector;
        assert_eq!(vector[0].to_bits(), std::f64::consts::PI.to_bits());
        assert_eq!(vector[1].to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn test_save_destroys_old_root() {
        let mut arena = BlockArena::new();
        let graph = sample_graph(5);
        let first = save_graph(&mut arena, &graph, META, None, None).unwrap();
        let live_after_first = arena.live_arrays();

        let second = save_graph(&mut arena, &graph, META, Some(first), None).unwrap();
        assert!(!arena.is_live(first) || first == second);
        assert_eq!(
            arena.live_arrays(),
            live_after_first,
            "old root arrays must be reclaimed"
        );
        assert!(load_graph(&arena, second).is_ok());
    }

    #[test]
    fn test_save_rewires_parent_slot() {
        let mut arena = BlockArena::new();
        let parent = arena.alloc(true).unwrap();
        arena.push_ref(parent, NULL_REF).unwrap();

        let graph = sample_graph(3);
        let first = save_graph(&mut arena, &graph, META, None, Some((parent, 0))).unwrap();
        assert_eq!(arena.get_ref(parent, 0).unwrap(), first);

        let second = save_graph(&mut arena, &graph, META, Some(first), Some((parent, 0))).unwrap();
        assert_eq!(arena.get_ref(parent, 0).unwrap(), second);
    }

    #[test]
    fn test_failed_save_leaves_old_root_intact() {
        let mut arena = BlockArena::new();
        let graph = sample_graph(10);
        let root = save_graph(&mut arena, &graph, META, None, None).unwrap();
        let live_before = arena.live_arrays();

        // A fresh arena whose quota is one short of what the root needs,
        // so the build fails partway through the node arrays.
        let mut limited = BlockArena::with_array_limit(live_before - 1);
        let limited_root = save_graph(&mut limited, &graph, META, None, None);
        assert!(matches!(limited_root, Err(ArenaError::Exhausted { .. })));
        assert_eq!(
            limited.live_arrays(),
            0,
            "partial new root must be torn down"
        );

        // The original arena still loads.
        assert!(load_graph(&arena, root).is_ok());
        assert_eq!(arena.live_arrays(), live_before);
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let mut arena = BlockArena::new();
        let graph = HnswGraph::new();
        let root = save_graph(&mut arena, &graph, META, None, None).unwrap();
        let metadata = arena.get_ref(root, 0).unwrap();
        arena.set_ref(metadata, 0, 2).unwrap(); // version slot

        let err = load_graph(&arena, root).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_load_rejects_short_metadata() {
        let mut arena = BlockArena::new();
        let root = arena.alloc(true).unwrap();
        let metadata = arena.alloc(false).unwrap();
        arena.push(metadata, FORMAT_VERSION as i64).unwrap();
        arena.push_ref(root, metadata).unwrap();

        assert!(matches!(
            load_graph(&arena, root),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn test_load_rejects_missing_metadata() {
        let mut arena = BlockArena::new();
        let root = arena.alloc(true).unwrap();
        assert!(matches!(
            load_graph(&arena, root),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn test_load_rejects_vector_dimension_mismatch() {
        let mut arena = BlockArena::new();
        let graph = sample_graph(2);
        let bad_meta = GraphMeta {
            dimension: 3, // nodes were built with dimension 2
            ..META
        };
        let root = save_graph(&mut arena, &graph, bad_meta, None, None).unwrap();
        let err = load_graph(&arena, root).unwrap_err();
        assert!(err.to_string().contains("components"));
    }

    #[test]
    fn test_loaded_adjacency_is_symmetric() {
        let mut arena = BlockArena::new();
        let graph = sample_graph(25);
        let root = save_graph(&mut arena, &graph, META, None, None).unwrap();
        let loaded = load_graph(&arena, root).unwrap().graph;

        for (id, node) in loaded.iter() {
            for (layer, adj) in node.neighbors.iter().enumerate() {
                let unique: HashSet<_> = adj.iter().collect();
                assert_eq!(unique.len(), adj.len(), "duplicate neighbors after load");
                for &neighbor in adj {
                    assert!(loaded.neighbors(neighbor, layer).contains(&id));
                }
            }
        }
    }
}
