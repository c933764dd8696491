//! Boundary to the host database's column storage.
//!
//! The index never reads rows itself. At insert and update time it asks a
//! [`VectorSource`] to materialize the row's floating-point list column as a
//! dense `Vec<f64>`. During search the index only touches its own copies.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Opaque 64-bit row identifier assigned by the host database.
///
/// The index uses it only as a key; it carries no ordering semantics.
pub type RowKey = i64;

/// Supplies row vectors from the host's cluster/column storage.
///
/// Returning an empty vector means the row carries no vector and should be
/// skipped by the indexer; it is not an error.
pub trait VectorSource: Send + Sync {
    /// Materialize the floating-point list column for `key`.
    fn fetch(&self, key: RowKey) -> Vec<f64>;
}

/// In-memory [`VectorSource`] backed by a hash map.
///
/// Hosts without cluster storage (and the test suite) register vectors here
/// before driving inserts.
#[derive(Debug, Default)]
pub struct MemoryVectorSource {
    rows: RwLock<HashMap<RowKey, Vec<f64>>>,
}

impl MemoryVectorSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the vector for `key`.
    pub fn put(&self, key: RowKey, vector: Vec<f64>) {
        self.rows.write().insert(key, vector);
    }

    /// Removes the vector for `key`. Returns `true` if one was present.
    pub fn remove(&self, key: RowKey) -> bool {
        self.rows.write().remove(&key).is_some()
    }

    /// Number of registered rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns `true` if no rows are registered.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl VectorSource for MemoryVectorSource {
    fn fetch(&self, key: RowKey) -> Vec<f64> {
        self.rows.read().get(&key).cloned().unwrap_or_default()
    }
}
