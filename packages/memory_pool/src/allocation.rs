use std::ptr::NonNull;

use crate::SizeClass;

/// Where an [`Allocation`] lives inside its pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Location {
    Slab {
        class: SizeClass,
        slab: usize,
        index: usize,
    },
    Heap {
        record: usize,
    },
}

/// A block of memory handed out by a [`MemoryPool`](crate::MemoryPool).
///
/// The handle is the only way to reach the memory: read and write it through
/// [`MemoryPool::data()`](crate::MemoryPool::data) and
/// [`MemoryPool::data_mut()`](crate::MemoryPool::data_mut) and give it back with
/// [`MemoryPool::free()`](crate::MemoryPool::free) or
/// [`MemoryPool::reallocate()`](crate::MemoryPool::reallocate), both of which consume it.
/// The handle cannot be cloned, which rules out double frees in safe code.
///
/// Dropping the handle without freeing it leaks the allocation until the pool is truncated
/// or dropped, and the leak shows up in [`MemoryPool::report()`](crate::MemoryPool::report).
#[derive(Debug, Eq, PartialEq)]
pub struct Allocation {
    pub(crate) pool_id: u64,

    /// The truncation epoch of the pool at the time of allocation. Handles from an earlier
    /// epoch refer to memory that no longer exists.
    pub(crate) epoch: u64,

    pub(crate) location: Location,
    pub(crate) ptr: NonNull<u8>,
    pub(crate) capacity: usize,
}

impl Allocation {
    /// The number of usable bytes: the size class for slab allocations, the requested size
    /// for heap allocations.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the allocation was served by the heap path rather than a slab.
    #[must_use]
    pub fn is_heap(&self) -> bool {
        matches!(self.location, Location::Heap { .. })
    }

    /// The size class serving this allocation, if it lives in a slab.
    #[must_use]
    pub fn size_class(&self) -> Option<SizeClass> {
        match self.location {
            Location::Slab { class, .. } => Some(class),
            Location::Heap { .. } => None,
        }
    }

    /// A pointer to the first usable byte, aligned to [`DATA_ALIGN`](crate::DATA_ALIGN).
    ///
    /// The pointer stays valid until the allocation is freed or the pool is truncated,
    /// destroyed or dropped.
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

// SAFETY: The handle only grants access to the memory through the pool that owns it, which
// enforces exclusive or shared access via its own borrows.
unsafe impl Send for Allocation {}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Allocation: Send);
    assert_not_impl_any!(Allocation: Sync, Clone, Copy);
}
