use std::marker::PhantomData;

use bytemuck::Pod;
use memory_pool::{Allocation, MemoryPool, SourceTag};

use crate::element;

/// A fixed number of elements stored in a single pool allocation.
///
/// The array does not hold on to its pool. Every operation that touches the elements takes
/// the pool as a parameter and the caller must always pass the pool the array was created
/// with. Release the storage with [`free()`](Self::free) before dropping the array, otherwise
/// the allocation remains outstanding in the pool.
///
/// # Examples
///
/// ```
/// use memory_pool::{MemoryPool, source_tag};
/// use pool_collections::PoolArray;
///
/// let mut pool = MemoryPool::new();
///
/// let mut array = PoolArray::<u32>::new(&mut pool, 3, source_tag!());
/// array.as_mut_slice(&mut pool).copy_from_slice(&[1, 2, 3]);
///
/// array.resize(&mut pool, 5, source_tag!());
/// assert_eq!(&array.as_slice(&pool)[..3], &[1, 2, 3]);
///
/// array.free(&mut pool);
/// pool.destroy().unwrap();
/// ```
#[derive(Debug)]
pub struct PoolArray<T> {
    /// `None` while the array has no elements.
    allocation: Option<Allocation>,
    len: usize,

    _element: PhantomData<T>,
}

impl<T: Pod> PoolArray<T> {
    /// Allocates an array of `len` elements. The initial contents are unspecified.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or needs an alignment above
    /// [`DATA_ALIGN`](memory_pool::DATA_ALIGN).
    #[must_use]
    pub fn new(pool: &mut MemoryPool, len: usize, tag: SourceTag) -> Self {
        element::assert_element::<T>();

        let mut array = Self {
            allocation: None,
            len: 0,
            _element: PhantomData,
        };

        array.resize(pool, len, tag);
        array
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The size in bytes of one element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        size_of::<T>()
    }

    /// Changes the number of elements, preserving the common prefix.
    ///
    /// Resizing to zero frees the storage. Growing beyond the capacity of the current
    /// allocation moves the elements to a new one.
    pub fn resize(&mut self, pool: &mut MemoryPool, len: usize, tag: SourceTag) {
        if len == 0 {
            if let Some(allocation) = self.allocation.take() {
                pool.free(allocation);
            }
        } else {
            let bytes = element::byte_len::<T>(len);
            self.allocation = Some(pool.reallocate(self.allocation.take(), bytes, tag));
        }

        self.len = len;
    }

    /// Sets every element to zero.
    pub fn zero(&mut self, pool: &mut MemoryPool) {
        self.as_mut_slice(pool).fill(T::zeroed());
    }

    /// The elements.
    #[must_use]
    pub fn as_slice<'p>(&self, pool: &'p MemoryPool) -> &'p [T] {
        match &self.allocation {
            Some(allocation) => element::slice(pool, allocation, self.len),
            None => &[],
        }
    }

    /// The elements, for writing.
    #[must_use]
    pub fn as_mut_slice<'p>(&mut self, pool: &'p mut MemoryPool) -> &'p mut [T] {
        match &self.allocation {
            Some(allocation) => element::slice_mut(pool, allocation, self.len),
            None => &mut [],
        }
    }

    /// The element at `index`, or `None` if out of bounds.
    #[must_use]
    pub fn get<'p>(&self, pool: &'p MemoryPool, index: usize) -> Option<&'p T> {
        self.as_slice(pool).get(index)
    }

    /// The element at `index` for writing, or `None` if out of bounds.
    #[must_use]
    pub fn get_mut<'p>(&mut self, pool: &'p mut MemoryPool, index: usize) -> Option<&'p mut T> {
        self.as_mut_slice(pool).get_mut(index)
    }

    /// Returns the storage to the pool.
    pub fn free(mut self, pool: &mut MemoryPool) {
        if let Some(allocation) = self.allocation.take() {
            pool.free(allocation);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use memory_pool::source_tag;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolArray<u32>: Send, std::fmt::Debug);
    assert_not_impl_any!(PoolArray<u32>: Sync, Clone);

    #[test]
    fn new_array_has_requested_len() {
        let mut pool = MemoryPool::new();

        let array = PoolArray::<u16>::new(&mut pool, 10, source_tag!());
        assert_eq!(array.len(), 10);
        assert_eq!(array.element_size(), 2);
        assert_eq!(array.as_slice(&pool).len(), 10);
        assert_eq!(pool.live_allocations(), 1);

        array.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn resize_preserves_prefix() {
        let mut pool = MemoryPool::new();

        let mut array = PoolArray::<u64>::new(&mut pool, 4, source_tag!());
        array
            .as_mut_slice(&mut pool)
            .copy_from_slice(&[10, 20, 30, 40]);

        // 4 * 8 = 32 bytes fits a slab, 100 * 8 goes to the heap.
        array.resize(&mut pool, 100, source_tag!());
        assert_eq!(&array.as_slice(&pool)[..4], &[10, 20, 30, 40]);

        array.resize(&mut pool, 2, source_tag!());
        assert_eq!(array.as_slice(&pool), &[10, 20]);

        array.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn resize_to_zero_frees_storage() {
        let mut pool = MemoryPool::new();

        let mut array = PoolArray::<u8>::new(&mut pool, 8, source_tag!());
        array.resize(&mut pool, 0, source_tag!());

        assert!(array.is_empty());
        assert!(array.as_slice(&pool).is_empty());
        assert!(pool.is_empty());

        array.resize(&mut pool, 3, source_tag!());
        assert_eq!(pool.live_allocations(), 1);

        array.free(&mut pool);
    }

    #[test]
    fn zero_clears_all_elements() {
        let mut pool = MemoryPool::new();

        let mut array = PoolArray::<i32>::new(&mut pool, 5, source_tag!());
        array.as_mut_slice(&mut pool).fill(-1);
        array.zero(&mut pool);

        assert!(array.as_slice(&pool).iter().all(|&value| value == 0));

        array.free(&mut pool);
    }

    #[test]
    fn get_is_bounds_checked() {
        let mut pool = MemoryPool::new();

        let mut array = PoolArray::<u32>::new(&mut pool, 2, source_tag!());
        *array.get_mut(&mut pool, 1).unwrap() = 7;

        assert_eq!(array.get(&pool, 1), Some(&7));
        assert_eq!(array.get(&pool, 2), None);

        array.free(&mut pool);
    }

    #[test]
    #[should_panic(expected = "zero-sized")]
    fn zero_sized_elements_panic() {
        let mut pool = MemoryPool::new();
        let _array = PoolArray::<()>::new(&mut pool, 1, source_tag!());
    }
}
