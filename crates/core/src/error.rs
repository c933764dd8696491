//! Error types surfaced at the index API boundary.

use crate::storage::arena::ArenaError;
use thiserror::Error;

/// An error produced by index operations.
///
/// Absence (erasing or looking up a row key that is not indexed) and empty
/// queries (`k == 0`, empty graph) are not errors; those paths return empty
/// results or no-op.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector (insert, update, or query) does not match the index dimension.
    #[error("vector dimension mismatch: expected {expected} but got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An index holding vectors was opened without a distance metric.
    /// The metric is not persisted; the caller must supply the one the
    /// index was built with.
    #[error("index is non-empty but no distance metric was supplied")]
    MetricNotConfigured,

    /// The block arena failed while saving the graph. In-memory state
    /// reflects the attempted mutation; rollback is the host's concern.
    #[error("storage failure: {0}")]
    Storage(#[from] ArenaError),

    /// Persisted metadata is missing, structurally invalid, or carries an
    /// unsupported format version.
    #[error("index corrupt: {0}")]
    Corrupt(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;
