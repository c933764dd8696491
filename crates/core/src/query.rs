//! Host-side composition of index results with query predicates.
//!
//! The index never sees a filter: the host query engine evaluates its
//! predicates into a membership set of row keys and intersects here. To keep
//! recall under selective filters, more than `k` results are requested from
//! the index (over-fetch) before intersecting and truncating.

use crate::config;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::source::RowKey;
use std::collections::HashSet;

/// k nearest neighbors of `query` restricted to `members`.
///
/// Requests `k * OVER_FETCH_FACTOR` results (bounded by the node count),
/// keeps those in `members`, and truncates to `k`. An empty membership set
/// short-circuits without touching the index.
pub fn knn_with_membership(
    index: &VectorIndex,
    query: &[f64],
    k: usize,
    members: &HashSet<RowKey>,
) -> Result<Vec<(RowKey, f64)>> {
    if members.is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    knn_matching(index, query, k, config::OVER_FETCH_FACTOR, |key| {
        members.contains(&key)
    })
}

/// Predicate-based variant of [`knn_with_membership`] with an explicit
/// over-fetch factor. The predicate only filters results; it never steers
/// the traversal.
pub fn knn_matching<F>(
    index: &VectorIndex,
    query: &[f64],
    k: usize,
    over_fetch: usize,
    accept: F,
) -> Result<Vec<(RowKey, f64)>>
where
    F: Fn(RowKey) -> bool,
{
    if k == 0 {
        return Ok(Vec::new());
    }
    let want = k
        .saturating_mul(over_fetch.max(1))
        .min(index.count())
        .max(k);
    let mut hits = index.search_knn(query, want, None)?;
    hits.retain(|&(key, _)| accept(key));
    hits.truncate(k);
    Ok(hits)
}
