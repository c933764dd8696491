//! The vector index: locking, validation, persistence, and metrics around
//! the HNSW graph.
//!
//! A single readers-writer lock guards the graph, the runtime configuration,
//! and the persistence root. Writes (insert/set/erase/clear/rebuild/bulk) are
//! strictly serialized and save the graph before returning; reads observe the
//! state as of lock acquisition. Operation counters are separate atomics.

use crate::config;
use crate::error::{IndexError, Result};
use crate::hnsw::graph::HnswGraph;
use crate::hnsw::insert::BuildParams;
use crate::hnsw::level::LevelSampler;
use crate::hnsw::DistanceMetric;
use crate::metrics::IndexMetrics;
use crate::source::{RowKey, VectorSource};
use crate::storage::arena::{ArrayRef, BlockArena};
use crate::storage::persist::{self, GraphMeta};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Per-index configuration supplied at create/open time.
///
/// Zero values for `m0` and `ef_search` derive the usual defaults
/// (`2 * m` and `max(64, 8 * m)` respectively). The metric is optional only
/// to model reopening: it is not persisted, and [`VectorIndex::open`] fails
/// on a non-empty index when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub metric: Option<DistanceMetric>,
    /// Target neighbor count for layers >= 1.
    pub m: usize,
    /// Target neighbor count for layer 0; 0 derives `2 * m`.
    pub m0: usize,
    /// Candidate-set size during construction.
    pub ef_construction: usize,
    /// Candidate-set size during search; 0 derives `max(64, 8 * m)`.
    pub ef_search: usize,
    /// Layer-sampling scale.
    pub ml: f64,
    /// Seed for the per-index layer sampler.
    pub random_seed: u64,
}

impl IndexConfig {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric: Some(metric),
            ..Self::default()
        }
    }

    fn derived_m0(&self) -> usize {
        if self.m0 == 0 {
            self.m * 2
        } else {
            self.m0
        }
    }

    fn derived_ef_search(&self) -> usize {
        if self.ef_search == 0 {
            config::EF_SEARCH_FLOOR.max(self.m * config::EF_SEARCH_M_FACTOR)
        } else {
            self.ef_search
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            metric: None,
            m: config::DEFAULT_M,
            m0: 0,
            ef_construction: config::DEFAULT_EF_CONSTRUCTION,
            ef_search: 0,
            ml: config::DEFAULT_ML,
            random_seed: config::DEFAULT_RANDOM_SEED,
        }
    }
}

/// Everything guarded by the index lock.
#[derive(Debug)]
struct IndexState {
    graph: HnswGraph,
    sampler: LevelSampler,
    /// 0 until the first insert fixes it.
    dimension: usize,
    m: usize,
    m0: usize,
    ef_construction: usize,
    ef_search: usize,
    root: ArrayRef,
    parent: Option<(ArrayRef, usize)>,
}

impl IndexState {
    fn build_params(&self) -> BuildParams {
        BuildParams {
            m: self.m,
            m0: self.m0,
            ef_construction: self.ef_construction,
        }
    }

    fn meta(&self) -> GraphMeta {
        GraphMeta {
            dimension: self.dimension,
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }
}

/// HNSW index over the vectors of one host column.
///
/// Thread-safe: any number of concurrent readers, one writer at a time.
/// The index owns exclusive copies of all vectors; the host's
/// [`VectorSource`] is consulted only when a row is inserted or updated.
pub struct VectorIndex {
    metric: DistanceMetric,
    state: RwLock<IndexState>,
    arena: Arc<Mutex<BlockArena>>,
    source: Arc<dyn VectorSource>,
    metrics: IndexMetrics,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Create a new empty index and persist its initial root.
    ///
    /// Fails with [`IndexError::MetricNotConfigured`] when the config carries
    /// no metric: the metric is chosen once, here.
    pub fn create(
        source: Arc<dyn VectorSource>,
        arena: Arc<Mutex<BlockArena>>,
        config: IndexConfig,
    ) -> Result<Self> {
        let metric = config.metric.ok_or(IndexError::MetricNotConfigured)?;
        let state = IndexState {
            graph: HnswGraph::new(),
            sampler: LevelSampler::new(config.random_seed, config.ml),
            dimension: 0,
            m: config.m,
            m0: config.derived_m0(),
            ef_construction: config.ef_construction,
            ef_search: config.derived_ef_search(),
            root: 0,
            parent: None,
        };
        let root = {
            let mut arena = arena.lock();
            persist::save_graph(&mut arena, &state.graph, state.meta(), None, None)?
        };
        tracing::info!(root, ?metric, "created vector index");
        Ok(Self {
            metric,
            state: RwLock::new(IndexState { root, ..state }),
            arena,
            source,
            metrics: IndexMetrics::new(),
        })
    }

    /// Attach to an existing persisted root.
    ///
    /// Dimension, M, ef_construction, and ef_search are recovered from the
    /// persisted metadata. The metric is not persisted: opening a non-empty
    /// index without one fails with [`IndexError::MetricNotConfigured`];
    /// an empty index falls back to euclidean.
    pub fn open(
        root: ArrayRef,
        source: Arc<dyn VectorSource>,
        arena: Arc<Mutex<BlockArena>>,
        config: IndexConfig,
    ) -> Result<Self> {
        let loaded = {
            let arena = arena.lock();
            persist::load_graph(&arena, root)?
        };
        let metric = match config.metric {
            Some(metric) => metric,
            None if loaded.graph.is_empty() => DistanceMetric::Euclidean,
            None => return Err(IndexError::MetricNotConfigured),
        };
        let m = loaded.meta.m;
        let ef_search = if loaded.meta.ef_search == 0 {
            config.derived_ef_search()
        } else {
            loaded.meta.ef_search
        };
        let state = IndexState {
            graph: loaded.graph,
            sampler: LevelSampler::new(config.random_seed, config.ml),
            dimension: loaded.meta.dimension,
            m,
            m0: if config.m0 != 0 { config.m0 } else { m * 2 },
            ef_construction: loaded.meta.ef_construction,
            ef_search,
            root,
            parent: None,
        };
        Ok(Self {
            metric,
            state: RwLock::new(state),
            arena,
            source,
            metrics: IndexMetrics::new(),
        })
    }

    /// Index the vector of `key`, fetched from the vector source.
    ///
    /// A row with no vector is skipped. An already-indexed key is updated in
    /// place: the stale node is erased in the same write section, so the node
    /// count never grows on repeated inserts.
    pub fn insert(&self, key: RowKey) -> Result<()> {
        self.write_row(key, false).map(|_| ())
    }

    /// Update the vector of `key`: the stale node is replaced, or removed
    /// entirely when the row no longer carries a vector.
    pub fn set(&self, key: RowKey) -> Result<()> {
        self.write_row(key, true).map(|_| ())
    }

    /// Shared insert/update path. Returns whether a vector was indexed.
    fn write_row(&self, key: RowKey, erase_when_vectorless: bool) -> Result<bool> {
        let started = Instant::now();
        let mut state = self.state.write();

        let vector = self.source.fetch(key);
        if vector.is_empty() {
            if erase_when_vectorless && state.graph.erase_key(key) {
                self.persist(&mut state)?;
                self.metrics.record_erase();
            }
            return Ok(false);
        }

        // Validation precedes any state change: a mismatch leaves the prior
        // node (if any) untouched.
        Self::ensure_dimension(&mut state, vector.len())?;
        let level = state.sampler.sample();
        let replaced = state.graph.erase_key(key);
        let params = state.build_params();
        state
            .graph
            .insert_at_level(self.metric, key, vector, level, params);
        self.persist(&mut state)?;
        drop(state);

        if replaced {
            self.metrics.record_erase();
        }
        self.metrics.record_insert(started.elapsed());
        Ok(true)
    }

    /// Remove `key` from the index. A missing key is a no-op, not an error.
    pub fn erase(&self, key: RowKey) -> Result<()> {
        let mut state = self.state.write();
        if !state.graph.erase_key(key) {
            return Ok(());
        }
        self.persist(&mut state)?;
        drop(state);
        self.metrics.record_erase();
        Ok(())
    }

    /// Remove every node and persist the empty graph. The dimension stays
    /// fixed for the lifetime of the index.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.graph.clear();
        self.persist(&mut state)
    }

    /// Tear the graph down and reinsert every stored vector, re-sampling
    /// layers. Offline repair; the vector source is not consulted.
    pub fn rebuild(&self) -> Result<()> {
        let mut state = self.state.write();
        let rows = state.graph.drain_for_rebuild();
        let nodes = rows.len();
        for (key, vector) in rows {
            let level = state.sampler.sample();
            let params = state.build_params();
            state
                .graph
                .insert_at_level(self.metric, key, vector, level, params);
        }
        self.persist(&mut state)?;
        tracing::info!(nodes, "rebuilt vector index");
        Ok(())
    }

    /// Drive a stream of row keys through [`insert`](Self::insert), one lock
    /// acquisition per key. Returns how many rows carried a vector.
    pub fn insert_bulk<I>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = RowKey>,
    {
        let mut indexed = 0;
        for key in keys {
            if self.write_row(key, false)? {
                indexed += 1;
            }
        }
        Ok(indexed)
    }

    /// k nearest neighbors of `query`, ascending by distance.
    ///
    /// `ef_search` overrides the configured candidate-set size for this call;
    /// both it and `k` are clamped to the node count. An empty graph or
    /// `k == 0` yields an empty result.
    pub fn search_knn(
        &self,
        query: &[f64],
        k: usize,
        ef_search: Option<usize>,
    ) -> Result<Vec<(RowKey, f64)>> {
        let started = Instant::now();
        let state = self.state.read();
        if state.graph.is_empty() || k == 0 {
            drop(state);
            self.metrics.record_search(started.elapsed());
            return Ok(Vec::new());
        }
        Self::check_dimension(&state, query.len())?;

        let n = state.graph.len();
        let ef = ef_search
            .unwrap_or(state.ef_search)
            .max(k)
            .min(n)
            .max(1);
        let k = k.min(n);
        let hits = state.graph.knn(self.metric, query, k, ef);
        drop(state);
        self.metrics.record_search(started.elapsed());
        Ok(hits)
    }

    /// All vectors the ef-bounded traversal finds within `rmax`, ascending by
    /// distance. Approximate: vectors poorly connected to the entry point may
    /// be missed; every returned distance is <= `rmax`.
    pub fn search_radius(&self, query: &[f64], rmax: f64) -> Result<Vec<(RowKey, f64)>> {
        self.radius_with(query, rmax, |state| {
            state
                .graph
                .radius_bounded(self.metric, query, rmax, state.ef_search)
        })
    }

    /// Radius search that keeps expanding while the frontier stays within
    /// `rmax`. Complete for regions reachable through in-radius nodes, and
    /// correspondingly more expensive on dense data.
    pub fn search_radius_exhaustive(
        &self,
        query: &[f64],
        rmax: f64,
    ) -> Result<Vec<(RowKey, f64)>> {
        self.radius_with(query, rmax, |state| {
            state.graph.radius_exhaustive(self.metric, query, rmax)
        })
    }

    fn radius_with<F>(&self, query: &[f64], rmax: f64, run: F) -> Result<Vec<(RowKey, f64)>>
    where
        F: FnOnce(&IndexState) -> Vec<(RowKey, f64)>,
    {
        let started = Instant::now();
        let state = self.state.read();
        if state.graph.is_empty() || rmax < 0.0 {
            drop(state);
            self.metrics.record_radius_search(started.elapsed());
            return Ok(Vec::new());
        }
        Self::check_dimension(&state, query.len())?;
        let hits = run(&state);
        drop(state);
        self.metrics.record_radius_search(started.elapsed());
        Ok(hits)
    }

    /// Number of indexed vectors.
    pub fn count(&self) -> usize {
        self.state.read().graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().graph.is_empty()
    }

    /// Layer of the entry point; -1 when the index is empty.
    pub fn max_layer(&self) -> i32 {
        self.state.read().graph.max_layer()
    }

    /// Row key of the current entry point, if any.
    pub fn entry_point(&self) -> Option<RowKey> {
        let state = self.state.read();
        state
            .graph
            .entry()
            .map(|e| state.graph.node(e.id).key)
    }

    /// Fixed vector dimension; 0 before the first insert.
    pub fn dimension(&self) -> usize {
        self.state.read().dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn ef_search(&self) -> usize {
        self.state.read().ef_search
    }

    /// Adjust the search candidate-set size. Takes effect on the next query
    /// and is persisted with the next write.
    pub fn set_ef_search(&self, ef_search: usize) {
        self.state.write().ef_search = ef_search;
    }

    /// Current persisted root ref; changes on every write.
    pub fn root(&self) -> ArrayRef {
        self.state.read().root
    }

    /// Hang the index under a slot of a host-owned ref array. The slot is
    /// rewired to the fresh root on every save.
    pub fn attach_parent(&self, parent: ArrayRef, slot: usize) -> Result<()> {
        let mut state = self.state.write();
        {
            let mut arena = self.arena.lock();
            arena.set_ref(parent, slot, state.root)?;
        }
        state.parent = Some((parent, slot));
        Ok(())
    }

    /// Operation counters and timings.
    pub fn metrics(&self) -> &IndexMetrics {
        &self.metrics
    }

    /// Node count per top layer, indexed by layer.
    pub fn layer_histogram(&self) -> Vec<usize> {
        let state = self.state.read();
        let mut histogram = vec![0usize; (state.graph.max_layer() + 1).max(0) as usize];
        for (_, node) in state.graph.iter() {
            histogram[node.top_layer] += 1;
        }
        histogram
    }

    /// Rough in-memory footprint of vectors and adjacency, in bytes.
    pub fn estimate_memory_bytes(&self) -> usize {
        let state = self.state.read();
        let mut total = 0usize;
        for (_, node) in state.graph.iter() {
            total += node.vector.len() * 8 + 24;
            for adj in &node.neighbors {
                total += adj.len() * 4 + 24;
            }
            total += 48; // node struct + key map entry
        }
        total
    }

    /// Assert the structural invariants of the graph: entry-point
    /// consistency and maximality, adjacency presence, symmetry, degree
    /// bounds (with a small slack), no self or duplicate links, and uniform
    /// dimension. Panics on violation; intended for tests.
    pub fn verify(&self) {
        let state = self.state.read();
        let graph = &state.graph;

        match graph.entry() {
            None => assert!(graph.is_empty(), "entry point missing with live nodes"),
            Some(entry) => {
                let node = graph.node(entry.id);
                assert_eq!(
                    node.top_layer, entry.layer,
                    "entry layer disagrees with entry node"
                );
                for (_, other) in graph.iter() {
                    assert!(
                        other.top_layer <= entry.layer,
                        "node {} exceeds the entry layer",
                        other.key
                    );
                }
            }
        }

        for (id, node) in graph.iter() {
            assert_eq!(
                node.neighbors.len(),
                node.top_layer + 1,
                "node {} is missing adjacency layers",
                node.key
            );
            if state.dimension != 0 {
                assert_eq!(
                    node.vector.len(),
                    state.dimension,
                    "node {} has a foreign dimension",
                    node.key
                );
            }
            for (layer, adj) in node.neighbors.iter().enumerate() {
                let cap = if layer == 0 { state.m0 } else { state.m };
                assert!(
                    adj.len() <= cap + config::VERIFY_DEGREE_SLACK,
                    "node {} layer {layer} degree {} exceeds {cap}+slack",
                    node.key,
                    adj.len()
                );
                assert!(!adj.contains(&id), "node {} links to itself", node.key);
                let unique: HashSet<_> = adj.iter().collect();
                assert_eq!(
                    unique.len(),
                    adj.len(),
                    "node {} has duplicate neighbors at layer {layer}",
                    node.key
                );
                for &neighbor in adj {
                    assert!(
                        graph.neighbors(neighbor, layer).contains(&id),
                        "edge {} -> {} at layer {layer} is one-sided",
                        node.key,
                        graph.node(neighbor).key
                    );
                }
            }
        }
    }

    fn ensure_dimension(state: &mut IndexState, len: usize) -> Result<()> {
        if state.dimension == 0 {
            state.dimension = len;
            Ok(())
        } else if len != state.dimension {
            Err(IndexError::DimensionMismatch {
                expected: state.dimension,
                actual: len,
            })
        } else {
            Ok(())
        }
    }

    fn check_dimension(state: &IndexState, len: usize) -> Result<()> {
        if state.dimension != 0 && len != state.dimension {
            Err(IndexError::DimensionMismatch {
                expected: state.dimension,
                actual: len,
            })
        } else {
            Ok(())
        }
    }

    /// Save the graph inside the current write section and adopt the new
    /// root. On failure the in-memory mutation stays applied; the host's
    /// transaction layer decides what to do with the surfaced error.
    fn persist(&self, state: &mut IndexState) -> Result<()> {
        let mut arena = self.arena.lock();
        let new_root = persist::save_graph(
            &mut arena,
            &state.graph,
            state.meta(),
            Some(state.root),
            state.parent,
        )?;
        state.root = new_root;
        Ok(())
    }
}
