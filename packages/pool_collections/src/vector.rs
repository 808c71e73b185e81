use bytemuck::Pod;
use memory_pool::{MemoryPool, SourceTag};

use crate::PoolArray;

/// The capacity of a newly created vector.
pub const VECTOR_INITIAL_CAPACITY: usize = 4;

/// A growable sequence of elements stored in a pool allocation.
///
/// The elements live in a [`PoolArray`] whose length is the capacity of the vector. Like the
/// array, the vector does not hold on to its pool: pass the pool it was created with to every
/// operation and release the storage with [`free()`](Self::free).
///
/// # Examples
///
/// ```
/// use memory_pool::{MemoryPool, source_tag};
/// use pool_collections::PoolVec;
///
/// let mut pool = MemoryPool::new();
/// let mut vector = PoolVec::<u32>::new(&mut pool, source_tag!());
///
/// vector.append(&mut pool, 3, source_tag!()).copy_from_slice(&[1, 2, 5]);
/// vector.insert(&mut pool, 2, 2, source_tag!()).copy_from_slice(&[3, 4]);
/// assert_eq!(vector.as_slice(&pool), &[1, 2, 3, 4, 5]);
///
/// vector.remove(&mut pool, 0, 2);
/// assert_eq!(vector.as_slice(&pool), &[3, 4, 5]);
///
/// vector.free(&mut pool);
/// ```
#[derive(Debug)]
pub struct PoolVec<T> {
    buffer: PoolArray<T>,
    len: usize,
}

impl<T: Pod> PoolVec<T> {
    /// Creates an empty vector with room for [`VECTOR_INITIAL_CAPACITY`] elements.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or needs an alignment above
    /// [`DATA_ALIGN`](memory_pool::DATA_ALIGN).
    #[must_use]
    pub fn new(pool: &mut MemoryPool, tag: SourceTag) -> Self {
        Self {
            buffer: PoolArray::new(pool, VECTOR_INITIAL_CAPACITY, tag),
            len: 0,
        }
    }

    /// The number of elements in use.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no elements are in use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of elements that fit without reallocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The size in bytes of one element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.buffer.element_size()
    }

    /// Sets the capacity to exactly `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is smaller than the number of elements in use.
    pub fn reserve(&mut self, pool: &mut MemoryPool, capacity: usize, tag: SourceTag) {
        assert!(
            capacity >= self.len,
            "cannot reserve capacity {capacity} for a vector of {} elements",
            self.len
        );

        self.buffer.resize(pool, capacity, tag);
    }

    /// Sets the number of elements in use, growing the capacity to exactly `len` if it is
    /// too small. The capacity never shrinks. New elements have unspecified contents.
    pub fn resize(&mut self, pool: &mut MemoryPool, len: usize, tag: SourceTag) {
        if len > self.capacity() {
            self.reserve(pool, len, tag);
        }

        self.len = len;
    }

    /// Adds `count` elements at the end and returns them for initialization.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn append<'p>(
        &mut self,
        pool: &'p mut MemoryPool,
        count: usize,
        tag: SourceTag,
    ) -> &'p mut [T] {
        assert!(count > 0, "cannot append zero elements to a vector");

        let start = self.len;
        self.resize(pool, grown_len(start, count), tag);

        self.as_mut_slice(pool)
            .get_mut(start..)
            .expect("the appended range lies within the resized vector")
    }

    /// Opens a gap of `count` elements before position `start` and returns the gap for
    /// initialization. The elements from `start` onwards move back by `count` positions.
    ///
    /// `start` may equal the length, which appends.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or `start` is greater than the length.
    pub fn insert<'p>(
        &mut self,
        pool: &'p mut MemoryPool,
        start: usize,
        count: usize,
        tag: SourceTag,
    ) -> &'p mut [T] {
        assert!(count > 0, "cannot insert zero elements into a vector");
        assert!(
            start <= self.len,
            "insert position {start} is beyond the end of a vector of {} elements",
            self.len
        );

        let old_len = self.len;
        let new_len = grown_len(old_len, count);
        self.resize(pool, new_len, tag);

        let elements = self.as_mut_slice(pool);
        elements.copy_within(start..old_len, grown_len(start, count));

        elements
            .get_mut(start..grown_len(start, count))
            .expect("the gap lies within the resized vector")
    }

    /// Removes `count` elements starting at `start`, moving the following elements forward.
    /// The capacity is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or the range reaches beyond the end of the vector.
    pub fn remove(&mut self, pool: &mut MemoryPool, start: usize, count: usize) {
        assert!(count > 0, "cannot remove zero elements from a vector");

        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.len)
            .unwrap_or_else(|| {
                panic!(
                    "cannot remove {count} elements at {start} from a vector of {} elements",
                    self.len
                )
            });

        let len = self.len;
        self.as_mut_slice(pool).copy_within(end..len, start);

        // Cannot underflow because end <= len and count <= end.
        self.len = len.wrapping_sub(count);
    }

    /// Sets every element in use to zero.
    pub fn zero(&mut self, pool: &mut MemoryPool) {
        self.as_mut_slice(pool).fill(T::zeroed());
    }

    /// The elements in use.
    #[must_use]
    pub fn as_slice<'p>(&self, pool: &'p MemoryPool) -> &'p [T] {
        self.buffer
            .as_slice(pool)
            .get(..self.len)
            .expect("the length never exceeds the capacity")
    }

    /// The elements in use, for writing.
    #[must_use]
    pub fn as_mut_slice<'p>(&mut self, pool: &'p mut MemoryPool) -> &'p mut [T] {
        let len = self.len;

        self.buffer
            .as_mut_slice(pool)
            .get_mut(..len)
            .expect("the length never exceeds the capacity")
    }

    /// The element at `index`, or `None` if it is not in use.
    #[must_use]
    pub fn get<'p>(&self, pool: &'p MemoryPool, index: usize) -> Option<&'p T> {
        self.as_slice(pool).get(index)
    }

    /// The element at `index` for writing, or `None` if it is not in use.
    #[must_use]
    pub fn get_mut<'p>(&mut self, pool: &'p mut MemoryPool, index: usize) -> Option<&'p mut T> {
        self.as_mut_slice(pool).get_mut(index)
    }

    /// Returns the storage to the pool.
    pub fn free(self, pool: &mut MemoryPool) {
        self.buffer.free(pool);
    }
}

fn grown_len(len: usize, additional: usize) -> usize {
    len.checked_add(additional)
        .expect("vector length exceeds the size of virtual memory")
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

    assert_impl_all!(PoolVec<u32>: Send, std::fmt::Debug);
    assert_not_impl_any!(PoolVec<u32>: Sync, Clone);

    fn filled(pool: &mut MemoryPool, values: &[i32]) -> PoolVec<i32> {
        let mut vector = PoolVec::new(pool, source_tag!());
        vector
            .append(pool, values.len(), source_tag!())
            .copy_from_slice(values);
        vector
    }

    #[test]
    fn new_vector_has_initial_capacity() {
        let mut pool = MemoryPool::new();

        let vector = PoolVec::<u64>::new(&mut pool, source_tag!());
        assert!(vector.is_empty());
        assert_eq!(vector.capacity(), VECTOR_INITIAL_CAPACITY);
        assert_eq!(vector.element_size(), 8);

        vector.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn append_returns_new_elements() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[1, 2]);
        let tail = vector.append(&mut pool, 5, source_tag!());
        assert_eq!(tail.len(), 5);
        tail.copy_from_slice(&[3, 4, 5, 6, 7]);

        assert_eq!(vector.as_slice(&pool), &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(vector.capacity(), 7);

        vector.free(&mut pool);
    }

    #[test]
    fn resize_never_shrinks_capacity() {
        let mut pool = MemoryPool::new();

        let mut vector = PoolVec::<u8>::new(&mut pool, source_tag!());
        vector.resize(&mut pool, 20, source_tag!());
        assert_eq!(vector.capacity(), 20);

        vector.resize(&mut pool, 2, source_tag!());
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.capacity(), 20);

        vector.free(&mut pool);
    }

    #[test]
    fn insert_opens_gap() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[1, 2, 5, 6]);
        vector
            .insert(&mut pool, 2, 2, source_tag!())
            .copy_from_slice(&[3, 4]);

        assert_eq!(vector.as_slice(&pool), &[1, 2, 3, 4, 5, 6]);

        vector.free(&mut pool);
    }

    #[test]
    fn insert_at_front_and_end() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[2]);
        vector.insert(&mut pool, 0, 1, source_tag!())[0] = 1;
        vector.insert(&mut pool, 2, 1, source_tag!())[0] = 3;

        assert_eq!(vector.as_slice(&pool), &[1, 2, 3]);

        vector.free(&mut pool);
    }

    #[test]
    fn remove_then_insert_restores_contents() {
        let mut pool = MemoryPool::new();

        let original = [10, 20, 30, 40, 50, 60];
        let mut vector = filled(&mut pool, &original);

        vector.remove(&mut pool, 1, 3);
        assert_eq!(vector.as_slice(&pool), &[10, 50, 60]);
        assert_eq!(vector.capacity(), 6);

        vector
            .insert(&mut pool, 1, 3, source_tag!())
            .copy_from_slice(&[20, 30, 40]);
        assert_eq!(vector.as_slice(&pool), &original);

        vector.free(&mut pool);
    }

    #[test]
    fn remove_tail() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[1, 2, 3]);
        vector.remove(&mut pool, 1, 2);
        assert_eq!(vector.as_slice(&pool), &[1]);

        vector.free(&mut pool);
    }

    #[test]
    fn zero_clears_used_elements() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[9, 9, 9]);
        vector.zero(&mut pool);
        assert_eq!(vector.as_slice(&pool), &[0, 0, 0]);
        assert_eq!(vector.get(&pool, 3), None);

        vector.free(&mut pool);
    }

    #[test]
    #[should_panic(expected = "cannot remove")]
    fn remove_past_end_panics() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[1, 2, 3]);
        vector.remove(&mut pool, 2, 2);
    }

    #[test]
    #[should_panic(expected = "beyond the end")]
    fn insert_past_end_panics() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[1, 2, 3]);
        let _gap = vector.insert(&mut pool, 4, 1, source_tag!());
    }

    #[test]
    #[should_panic(expected = "cannot reserve")]
    fn reserve_below_len_panics() {
        let mut pool = MemoryPool::new();

        let mut vector = filled(&mut pool, &[1, 2, 3]);
        vector.reserve(&mut pool, 2, source_tag!());
    }
}
