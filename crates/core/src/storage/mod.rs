//! Persistence layer: the host block-arena model and the versioned graph
//! format written through it.

/// Block-arena allocator: integer-indexed arrays addressed by opaque refs.
pub mod arena;
/// Versioned save/load of the graph with atomic root swap.
pub(crate) mod persist;

pub use arena::{ArenaError, ArrayRef, BlockArena, NULL_REF};
pub use persist::FORMAT_VERSION;
