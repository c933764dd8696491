//! In-memory layered proximity graph.
//!
//! Nodes live in a dense slab indexed by a compact internal [`NodeId`]; a
//! side table maps host row keys to slots. Traversal and symmetric adjacency
//! updates therefore never hash a row key. Slots freed by erasure are reused
//! by later inserts.

use crate::source::RowKey;
use std::collections::HashMap;

/// Compact internal node identifier: an index into the graph's slab.
/// Only meaningful inside one graph instance; row keys are the stable
/// external identity.
pub type NodeId = u32;

/// A single indexed vector and its per-layer adjacency.
///
/// `neighbors[layer]` holds the node's links at that layer for
/// `layer <= top_layer`. Membership is what matters; the stored order is the
/// iteration order of search.
#[derive(Debug, Clone)]
pub struct Node {
    pub key: RowKey,
    pub vector: Vec<f64>,
    pub top_layer: usize,
    pub neighbors: Vec<Vec<NodeId>>,
}

impl Node {
    pub fn new(key: RowKey, vector: Vec<f64>, top_layer: usize) -> Self {
        Self {
            key,
            vector,
            top_layer,
            neighbors: vec![Vec::new(); top_layer + 1],
        }
    }
}

/// The entry point of the graph: the node searches start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    pub id: NodeId,
    pub layer: usize,
}

/// Node store plus entry-point tracking.
///
/// Purely in-memory; locking, validation, and persistence live in
/// [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Default)]
pub struct HnswGraph {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    ids: HashMap<RowKey, NodeId>,
    entry: Option<EntryPoint>,
}

impl HnswGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Upper bound on internal ids, for sizing visited sets.
    pub fn id_capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn entry(&self) -> Option<EntryPoint> {
        self.entry
    }

    /// Layer of the entry point, -1 when the graph is empty.
    pub fn max_layer(&self) -> i32 {
        self.entry.map_or(-1, |e| e.layer as i32)
    }

    pub fn id_of(&self, key: RowKey) -> Option<NodeId> {
        self.ids.get(&key).copied()
    }

    pub fn contains(&self, key: RowKey) -> bool {
        self.ids.contains_key(&key)
    }

    /// Borrow a live node. Internal ids are an invariant of the graph;
    /// handing in a stale id is a logic error.
    pub fn node(&self, id: NodeId) -> &Node {
        self.slots[id as usize]
            .as_ref()
            .expect("node id points at a live slot")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id as usize]
            .as_mut()
            .expect("node id points at a live slot")
    }

    /// Neighbors of `id` at `layer`; empty when the node does not reach the
    /// layer.
    pub fn neighbors(&self, id: NodeId, layer: usize) -> &[NodeId] {
        let node = self.node(id);
        node.neighbors.get(layer).map_or(&[], Vec::as_slice)
    }

    /// Iterate over all live nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (i as NodeId, n)))
    }

    /// Add a node to the store, reusing a freed slot when one is available.
    /// The caller wires adjacency and entry-point state afterwards.
    pub fn insert_node(&mut self, node: Node) -> NodeId {
        let key = node.key;
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                (self.slots.len() - 1) as NodeId
            }
        };
        self.ids.insert(key, id);
        id
    }

    /// Remove a node, returning it. The caller must already have unlinked it
    /// from every neighbor.
    pub fn remove_node(&mut self, id: NodeId) -> Node {
        let node = self.slots[id as usize]
            .take()
            .expect("node id points at a live slot");
        self.ids.remove(&node.key);
        self.free.push(id);
        node
    }

    /// Add a bidirectional edge between `a` and `b` at `layer`.
    ///
    /// Adjacency vectors grow lazily; self-links and duplicates are ignored.
    pub fn link(&mut self, a: NodeId, b: NodeId, layer: usize) {
        if a == b {
            return;
        }
        self.link_one_side(a, b, layer);
        self.link_one_side(b, a, layer);
    }

    fn link_one_side(&mut self, from: NodeId, to: NodeId, layer: usize) {
        let node = self.node_mut(from);
        while node.neighbors.len() <= layer {
            node.neighbors.push(Vec::new());
        }
        let adj = &mut node.neighbors[layer];
        if !adj.contains(&to) {
            adj.push(to);
        }
    }

    /// Remove the edge between `a` and `b` at `layer` from both sides.
    pub fn unlink(&mut self, a: NodeId, b: NodeId, layer: usize) {
        self.unlink_one_side(a, b, layer);
        self.unlink_one_side(b, a, layer);
    }

    fn unlink_one_side(&mut self, from: NodeId, to: NodeId, layer: usize) {
        let node = self.node_mut(from);
        if let Some(adj) = node.neighbors.get_mut(layer) {
            adj.retain(|&n| n != to);
        }
    }

    /// Overwrite the adjacency of `id` at `layer`. The caller is responsible
    /// for keeping the graph symmetric.
    pub fn replace_adjacency(&mut self, id: NodeId, layer: usize, new_set: Vec<NodeId>) {
        let node = self.node_mut(id);
        while node.neighbors.len() <= layer {
            node.neighbors.push(Vec::new());
        }
        node.neighbors[layer] = new_set;
    }

    pub fn set_entry(&mut self, id: NodeId, layer: usize) {
        self.entry = Some(EntryPoint { id, layer });
    }

    pub fn clear_entry(&mut self) {
        self.entry = None;
    }

    /// Rescan for the node with the greatest top layer and make it the entry
    /// point; clears the entry point when the graph is empty.
    pub fn reselect_entry(&mut self) {
        let mut best: Option<EntryPoint> = None;
        for (id, node) in self.iter() {
            let better = best.map_or(true, |e| node.top_layer > e.layer);
            if better {
                best = Some(EntryPoint {
                    id,
                    layer: node.top_layer,
                });
            }
        }
        self.entry = best;
    }

    /// Drop every node and the entry point.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.ids.clear();
        self.entry = None;
    }

    /// Tear the graph down for a rebuild, handing back each node's key and
    /// vector.
    pub fn drain_for_rebuild(&mut self) -> Vec<(RowKey, Vec<f64>)> {
        let rows = self
            .slots
            .iter_mut()
            .filter_map(Option::take)
            .map(|n| (n.key, n.vector))
            .collect();
        self.clear();
        rows
    }
}
