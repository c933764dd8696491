//! Tuning defaults for the vector index.
//!
//! These are compile-time constants; per-index overrides are carried by
//! [`IndexConfig`](crate::index::IndexConfig).

/// Default number of bidirectional links per node on layers >= 1.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8-64.
pub const DEFAULT_M: usize = 16;

/// Default candidate list size during index construction.
///
/// Higher values produce a better-connected graph at the cost of slower
/// inserts.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Lower bound applied when deriving a default search candidate list size.
pub const EF_SEARCH_FLOOR: usize = 64;

/// Multiplier applied to M when deriving a default search candidate list size
/// (`ef_search = max(EF_SEARCH_FLOOR, M * EF_SEARCH_M_FACTOR)`).
pub const EF_SEARCH_M_FACTOR: usize = 8;

/// Hard cap on the layer a node can be assigned to.
pub const MAX_LAYER: usize = 32;

/// Default layer-sampling scale (1 / ln 2). A node lands on layer
/// `floor(-ln(u) * ml)` for a uniform `u` in (0, 1).
pub const DEFAULT_ML: f64 = 1.442_695_040_888_963_4;

/// Default seed for the per-index layer sampler.
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// How many extra results to request when the host post-filters by a
/// membership set: `k' = k * OVER_FETCH_FACTOR`, bounded by the node count.
pub const OVER_FETCH_FACTOR: usize = 10;

/// Per-layer degree slack tolerated by
/// [`VectorIndex::verify`](crate::index::VectorIndex::verify). Heuristic
/// selection can retain an extra neighbor or two until the next prune.
pub const VERIFY_DEGREE_SLACK: usize = 2;
