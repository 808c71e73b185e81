use std::mem;

use bytemuck::Pod;
use memory_pool::{Allocation, DATA_ALIGN, MemoryPool};

/// Checks that values of `T` can be stored in pool memory.
///
/// # Panics
///
/// Panics if `T` needs a stricter alignment than the pool guarantees.
pub(crate) fn assert_storable<T>() {
    assert!(
        mem::align_of::<T>() <= DATA_ALIGN,
        "type with alignment {} cannot be stored in pool memory aligned to {DATA_ALIGN}",
        mem::align_of::<T>()
    );
}

/// Like [`assert_storable()`] but also rejects zero-sized element types, which a sequence
/// cannot be built from.
pub(crate) fn assert_element<T>() {
    assert_storable::<T>();
    assert!(
        mem::size_of::<T>() > 0,
        "zero-sized types cannot be used as sequence elements"
    );
}

/// Number of bytes occupied by `count` elements of `T`.
///
/// # Panics
///
/// Panics if the size exceeds the size of virtual memory.
pub(crate) fn byte_len<T>(count: usize) -> usize {
    count
        .checked_mul(mem::size_of::<T>())
        .expect("sequence size exceeds the size of virtual memory")
}

/// Views the first `count` elements stored in an allocation.
pub(crate) fn slice<'p, T: Pod>(
    pool: &'p MemoryPool,
    allocation: &Allocation,
    count: usize,
) -> &'p [T] {
    let bytes = pool
        .data(allocation)
        .get(..byte_len::<T>(count))
        .expect("allocation is large enough for the elements it holds");

    bytemuck::cast_slice(bytes)
}

/// Views the first `count` elements stored in an allocation, for writing.
pub(crate) fn slice_mut<'p, T: Pod>(
    pool: &'p mut MemoryPool,
    allocation: &Allocation,
    count: usize,
) -> &'p mut [T] {
    let bytes = pool
        .data_mut(allocation)
        .get_mut(..byte_len::<T>(count))
        .expect("allocation is large enough for the elements it holds");

    bytemuck::cast_slice_mut(bytes)
}

/// Views the single value stored at the start of an allocation.
pub(crate) fn value<'p, V: Pod>(pool: &'p MemoryPool, allocation: &Allocation) -> &'p V {
    let bytes = pool
        .data(allocation)
        .get(..mem::size_of::<V>())
        .expect("allocation is large enough for its value");

    bytemuck::from_bytes(bytes)
}

/// Views the single value stored at the start of an allocation, for writing.
pub(crate) fn value_mut<'p, V: Pod>(
    pool: &'p mut MemoryPool,
    allocation: &Allocation,
) -> &'p mut V {
    let bytes = pool
        .data_mut(allocation)
        .get_mut(..mem::size_of::<V>())
        .expect("allocation is large enough for its value");

    bytemuck::from_bytes_mut(bytes)
}

#[cfg(test)]
mod tests {
    use memory_pool::source_tag;

    use super::*;

    #[test]
    fn value_round_trip() {
        let mut pool = MemoryPool::new();
        let allocation = pool.allocate(mem::size_of::<u64>(), source_tag!());

        *value_mut::<u64>(&mut pool, &allocation) = 0xdead_beef;
        assert_eq!(*value::<u64>(&pool, &allocation), 0xdead_beef);

        pool.free(allocation);
    }

    #[test]
    fn zero_sized_values_need_no_bytes() {
        let mut pool = MemoryPool::new();
        let allocation = pool.allocate(0, source_tag!());

        let unit: &() = value(&pool, &allocation);
        assert_eq!(*unit, ());

        pool.free(allocation);
    }

    #[test]
    #[should_panic(expected = "alignment")]
    fn over_aligned_types_are_rejected() {
        #[repr(align(16))]
        struct Wide;

        assert_storable::<Wide>();
    }

    #[test]
    #[should_panic(expected = "zero-sized")]
    fn zero_sized_elements_are_rejected() {
        assert_element::<()>();
    }
}
