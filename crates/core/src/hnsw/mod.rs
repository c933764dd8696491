//! Hierarchical Navigable Small World (HNSW) graph internals.
//!
//! The graph is a stack of proximity layers: layer 0 holds every node, each
//! higher layer an exponentially thinner sample used for long jumps. Searches
//! descend greedily from the entry point and widen into a best-first
//! expansion at the target layer. All types here are in-memory and
//! single-threaded; locking, validation, persistence, and metrics live in
//! [`crate::index`].

/// Distance metrics: euclidean, cosine, and negative dot product.
pub mod distance;
/// Node slab, row-key table, per-layer adjacency, entry point.
pub mod graph;
/// Capped geometric layer sampling.
pub mod level;
/// Graph construction: insertion and erasure.
pub(crate) mod insert;
/// Greedy descent, best-first layer search, k-NN and radius queries.
pub(crate) mod search;
/// Simple and diversity-heuristic neighbor selection, degree pruning.
pub(crate) mod select;
/// Epoch-stamped visited set for traversal.
pub mod visited;

pub use distance::DistanceMetric;
pub use graph::{EntryPoint, HnswGraph, Node, NodeId};
pub use level::LevelSampler;
