//! # loam-vector-core
//!
//! On-disk HNSW vector index core for the Loam embedded database:
//! approximate nearest-neighbor search over variable-length `f64` vectors
//! attached to rows.
//!
//! The host drives the index through its transaction lifecycle: write
//! transactions insert, update, and erase row keys (vectors are pulled
//! through a [`VectorSource`]); read transactions run k-NN and radius
//! queries returning `(row key, distance)` pairs. The graph is persisted
//! into the host's block arena with an atomic root swap on every write.
//!
//! Zero async dependencies; safe to embed directly.

/// Tuning defaults and limits.
pub mod config;
/// Error types surfaced at the API boundary.
pub mod error;
/// HNSW graph internals: distance metrics, node store, search, selection.
pub mod hnsw;
/// The lock-guarded index facade.
pub mod index;
/// Operation counters and timings.
pub mod metrics;
/// Host-side result/predicate composition.
pub mod query;
/// Host column-storage boundary.
pub mod source;
/// Block arena model and the versioned on-disk format.
pub mod storage;

pub use error::{IndexError, Result};
pub use hnsw::DistanceMetric;
pub use index::{IndexConfig, VectorIndex};
pub use metrics::{IndexMetrics, MetricsSnapshot};
pub use source::{MemoryVectorSource, RowKey, VectorSource};
pub use storage::{ArenaError, ArrayRef, BlockArena};
