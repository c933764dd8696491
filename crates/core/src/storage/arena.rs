//! Block-arena allocator model.
//!
//! The host database exposes its storage as integer-indexed arrays addressed
//! by opaque refs; arrays flagged `has_refs` hold refs to child arrays
//! instead of values. This module models that allocator for the index core:
//! the persisted graph (see [`super::persist`]) is a tree of such arrays
//! hanging off a single root ref.
//!
//! Refs are nonzero; `NULL_REF` (0) marks an empty slot.

use thiserror::Error;

/// Opaque reference to an arena array.
pub type ArrayRef = u64;

/// The null ref: never a valid array.
pub const NULL_REF: ArrayRef = 0;

/// Errors produced by arena operations. Surfaced across the index boundary
/// as [`IndexError::Storage`](crate::error::IndexError::Storage).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The ref does not name a live array.
    #[error("invalid array ref {0}")]
    InvalidRef(ArrayRef),

    /// Slot index past the end of an array.
    #[error("slot {index} out of bounds for array {array} of length {len}")]
    OutOfBounds {
        array: ArrayRef,
        index: usize,
        len: usize,
    },

    /// The arena's live-array quota is spent.
    #[error("arena exhausted: live array limit {limit} reached")]
    Exhausted { limit: usize },
}

#[derive(Debug)]
struct ArenaArray {
    has_refs: bool,
    slots: Vec<i64>,
}

/// In-memory block arena: a slab of arrays with ref-counted-free slots.
///
/// An optional live-array quota makes allocation failure reachable, the way
/// a real host allocator can refuse space mid-save.
#[derive(Debug, Default)]
pub struct BlockArena {
    arrays: Vec<Option<ArenaArray>>,
    free: Vec<usize>,
    live: usize,
    limit: Option<usize>,
}

impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena that refuses to hold more than `limit` live arrays.
    pub fn with_array_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Number of live arrays.
    pub fn live_arrays(&self) -> usize {
        self.live
    }

    pub fn is_live(&self, array: ArrayRef) -> bool {
        self.slot_of(array)
            .and_then(|i| self.arrays.get(i))
            .is_some_and(Option::is_some)
    }

    /// Allocate a fresh empty array. `has_refs` arrays hold child refs and
    /// participate in [`destroy_deep`](Self::destroy_deep).
    pub fn alloc(&mut self, has_refs: bool) -> Result<ArrayRef, ArenaError> {
        if let Some(limit) = self.limit {
            if self.live >= limit {
                return Err(ArenaError::Exhausted { limit });
            }
        }
        let array = ArenaArray {
            has_refs,
            slots: Vec::new(),
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.arrays[slot] = Some(array);
                slot
            }
            None => {
                self.arrays.push(Some(array));
                self.arrays.len() - 1
            }
        };
        self.live += 1;
        Ok(slot as ArrayRef + 1)
    }

    /// Append a value slot.
    pub fn push(&mut self, array: ArrayRef, value: i64) -> Result<(), ArenaError> {
        self.array_mut(array)?.slots.push(value);
        Ok(())
    }

    /// Append a child ref slot.
    pub fn push_ref(&mut self, array: ArrayRef, child: ArrayRef) -> Result<(), ArenaError> {
        self.push(array, child as i64)
    }

    pub fn get(&self, array: ArrayRef, index: usize) -> Result<i64, ArenaError> {
        let arr = self.array(array)?;
        arr.slots
            .get(index)
            .copied()
            .ok_or(ArenaError::OutOfBounds {
                array,
                index,
                len: arr.slots.len(),
            })
    }

    pub fn get_ref(&self, array: ArrayRef, index: usize) -> Result<ArrayRef, ArenaError> {
        Ok(self.get(array, index)? as ArrayRef)
    }

    /// Overwrite a slot with a child ref (parent rewiring during root swap).
    pub fn set_ref(
        &mut self,
        array: ArrayRef,
        index: usize,
        child: ArrayRef,
    ) -> Result<(), ArenaError> {
        let arr = self.array_mut(array)?;
        let len = arr.slots.len();
        let slot = arr
            .slots
            .get_mut(index)
            .ok_or(ArenaError::OutOfBounds { array, index, len })?;
        *slot = child as i64;
        Ok(())
    }

    pub fn len(&self, array: ArrayRef) -> Result<usize, ArenaError> {
        Ok(self.array(array)?.slots.len())
    }

    /// Free `array` and, for ref arrays, every reachable child.
    pub fn destroy_deep(&mut self, array: ArrayRef) -> Result<(), ArenaError> {
        let mut pending = vec![array];
        while let Some(current) = pending.pop() {
            let slot = self
                .slot_of(current)
                .filter(|&i| i < self.arrays.len())
                .ok_or(ArenaError::InvalidRef(current))?;
            let arr = self.arrays[slot]
                .take()
                .ok_or(ArenaError::InvalidRef(current))?;
            self.free.push(slot);
            self.live -= 1;
            if arr.has_refs {
                for &child in &arr.slots {
                    if child as ArrayRef != NULL_REF {
                        pending.push(child as ArrayRef);
                    }
                }
            }
        }
        Ok(())
    }

    fn slot_of(&self, array: ArrayRef) -> Option<usize> {
        (array != NULL_REF).then(|| (array - 1) as usize)
    }

    fn array(&self, array: ArrayRef) -> Result<&ArenaArray, ArenaError> {
        self.slot_of(array)
            .and_then(|i| self.arrays.get(i))
            .and_then(Option::as_ref)
            .ok_or(ArenaError::InvalidRef(array))
    }

    fn array_mut(&mut self, array: ArrayRef) -> Result<&mut ArenaArray, ArenaError> {
        let slot = self.slot_of(array).ok_or(ArenaError::InvalidRef(array))?;
        self.arrays
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(ArenaError::InvalidRef(array))
    }
}
