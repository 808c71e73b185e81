use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::{debug, trace, warn};

use crate::{
    AllocationMode, AllocationSource, Allocation, DestroyError, DropPolicy, HeapAllocator,
    LeakRecord, Location, MemoryPoolBuilder, PoolReport, SizeClass, SlabAllocator, SourceTag,
    check_entry,
};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A memory pool serving byte allocations of any size.
///
/// Requests of up to [`MAX_SLAB_SIZE`](crate::MAX_SLAB_SIZE) bytes are rounded up to one of
/// the [`SIZE_CLASSES`](crate::SIZE_CLASSES) and served from slabs of 32 slots that are
/// reused after being freed. Larger requests are served by individual system allocations.
/// Every allocation is surrounded by sentinels that are verified whenever the allocation is
/// freed, reallocated or accessed, so buffer overruns are detected early.
///
/// The pool counts its outstanding allocations. [`destroy()`](Self::destroy) refuses to tear
/// down a pool that still has some and returns a [`PoolReport`] listing them instead.
///
/// # Examples
///
/// ```
/// use memory_pool::{MemoryPool, source_tag};
///
/// let mut pool = MemoryPool::new();
///
/// let allocation = pool.allocate(20, source_tag!());
/// assert_eq!(allocation.capacity(), 32);
///
/// pool.data_mut(&allocation)[..5].copy_from_slice(b"hello");
/// assert_eq!(&pool.data(&allocation)[..5], b"hello");
///
/// pool.free(allocation);
/// pool.destroy().unwrap();
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
pub struct MemoryPool {
    /// Handles carry this ID so that a handle from another pool is rejected.
    pool_id: u64,

    /// Incremented by every truncation, which invalidates all handles issued before it.
    epoch: u64,

    mode: AllocationMode,
    drop_policy: DropPolicy,

    slabs: SlabAllocator,
    heap: HeapAllocator,

    /// Number of allocations handed out and not yet freed.
    live: usize,
}

impl MemoryPool {
    /// Creates an empty pool with default settings.
    ///
    /// No memory is reserved until the first allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a new pool.
    #[cfg_attr(test, mutants::skip)] // Gets mutated to alternate version of itself.
    pub fn builder() -> MemoryPoolBuilder {
        MemoryPoolBuilder::new()
    }

    pub(crate) fn new_inner(mode: AllocationMode, drop_policy: DropPolicy) -> Self {
        let pool_id = generate_pool_id();

        debug!(pool_id, ?mode, "created memory pool");

        Self {
            pool_id,
            epoch: 0,
            mode,
            drop_policy,
            slabs: SlabAllocator::new(),
            heap: HeapAllocator::new(),
            live: 0,
        }
    }

    /// The allocation mode the pool was built with.
    #[must_use]
    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    /// The drop policy the pool was built with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// The number of allocations handed out and not yet freed.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        debug_assert_eq!(
            self.live,
            self.slabs
                .occupied_count()
                .wrapping_add(self.heap.len())
        );

        self.live
    }

    /// Whether the pool has no outstanding allocations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_allocations() == 0
    }

    /// The number of slabs currently held by the pool, across all size classes.
    #[must_use]
    pub fn slab_count(&self) -> usize {
        self.slabs.slab_count()
    }

    /// The number of outstanding heap-path allocations.
    #[must_use]
    pub fn heap_count(&self) -> usize {
        self.heap.len()
    }

    /// Allocates at least `size` bytes.
    ///
    /// Requests of up to [`MAX_SLAB_SIZE`](crate::MAX_SLAB_SIZE) bytes are served from the
    /// smallest fitting size class, unless the pool is in [`AllocationMode::System`]. The
    /// memory of a slot that is reused is not cleared.
    ///
    /// Running out of memory ends the process via [`std::alloc::handle_alloc_error`].
    ///
    /// # Examples
    ///
    /// ```
    /// use memory_pool::{MemoryPool, source_tag};
    ///
    /// let mut pool = MemoryPool::new();
    ///
    /// let small = pool.allocate(10, source_tag!());
    /// assert_eq!(small.capacity(), 16);
    /// assert!(!small.is_heap());
    ///
    /// let large = pool.allocate(1000, source_tag!());
    /// assert_eq!(large.capacity(), 1000);
    /// assert!(large.is_heap());
    ///
    /// pool.free(small);
    /// pool.free(large);
    /// ```
    pub fn allocate(&mut self, size: usize, tag: SourceTag) -> Allocation {
        let class = match self.mode {
            AllocationMode::Pooled => SizeClass::for_size(size),
            AllocationMode::System => None,
        };

        let (location, ptr, capacity) = match class {
            Some(class) => {
                let slot = self.slabs.alloc(class, tag);
                let location = Location::Slab {
                    class,
                    slab: slot.slab,
                    index: slot.index,
                };
                (location, slot.ptr, class.size())
            }
            None => {
                let block = self.heap.alloc(size, tag);
                (Location::Heap { record: block.record }, block.ptr, size)
            }
        };

        // Cannot overflow because every allocation occupies memory.
        self.live = self.live.wrapping_add(1);

        trace!(pool_id = self.pool_id, size, capacity, ?location, "allocate");

        Allocation {
            pool_id: self.pool_id,
            epoch: self.epoch,
            location,
            ptr,
            capacity,
        }
    }

    /// Resizes an allocation, moving it only when it has to grow beyond its capacity.
    ///
    /// Passing `None` is the same as calling [`allocate()`](Self::allocate). If the
    /// allocation can already hold `new_size` bytes it is returned unchanged, otherwise a new
    /// allocation is made, the old contents are copied into it and the old allocation is
    /// freed. Allocations never shrink.
    ///
    /// # Panics
    ///
    /// Panics if the allocation does not belong to this pool, predates a truncation or has
    /// damaged sentinels.
    ///
    /// # Examples
    ///
    /// ```
    /// use memory_pool::{MemoryPool, source_tag};
    ///
    /// let mut pool = MemoryPool::new();
    ///
    /// let allocation = pool.reallocate(None, 9, source_tag!());
    /// let ptr = allocation.as_ptr();
    ///
    /// // Still fits the 16 byte class.
    /// let allocation = pool.reallocate(Some(allocation), 16, source_tag!());
    /// assert_eq!(allocation.as_ptr(), ptr);
    ///
    /// let allocation = pool.reallocate(Some(allocation), 17, source_tag!());
    /// assert_eq!(allocation.capacity(), 32);
    ///
    /// pool.free(allocation);
    /// ```
    pub fn reallocate(
        &mut self,
        allocation: Option<Allocation>,
        new_size: usize,
        tag: SourceTag,
    ) -> Allocation {
        let Some(allocation) = allocation else {
            return self.allocate(new_size, tag);
        };

        self.validate(&allocation);

        if allocation.capacity >= new_size {
            return allocation;
        }

        let replacement = self.allocate(new_size, tag);
        let copy_len = allocation.capacity.min(new_size);

        // SAFETY: Both allocations are live and distinct, so the regions do not overlap, and
        // copy_len does not exceed the capacity of either of them.
        unsafe {
            ptr::copy_nonoverlapping(
                allocation.ptr.as_ptr(),
                replacement.ptr.as_ptr(),
                copy_len,
            );
        }

        self.free(allocation);

        replacement
    }

    /// Returns an allocation to the pool.
    ///
    /// Slab slots become available for reuse. Heap allocations are released to the system.
    ///
    /// # Panics
    ///
    /// Panics if the allocation does not belong to this pool, predates a truncation or has
    /// damaged sentinels.
    pub fn free(&mut self, allocation: Allocation) {
        self.assert_owned(&allocation);
        assert!(
            self.live > 0,
            "freeing an allocation from a memory pool that has no outstanding allocations"
        );

        match allocation.location {
            Location::Slab { class, slab, index } => {
                self.slabs.free(class, slab, index, allocation.ptr);
            }
            Location::Heap { record } => self.heap.free(record, allocation.ptr),
        }

        // Cannot underflow, checked above.
        self.live = self.live.wrapping_sub(1);

        trace!(pool_id = self.pool_id, location = ?allocation.location, "free");
    }

    /// The full usable memory of an allocation.
    ///
    /// # Panics
    ///
    /// Panics if the allocation does not belong to this pool, predates a truncation or has
    /// damaged sentinels.
    #[must_use]
    pub fn data(&self, allocation: &Allocation) -> &[u8] {
        self.validate(allocation);

        // SAFETY: The allocation is live and has `capacity` usable bytes, all of which were
        // zero-initialized when the slab or heap block was created. The shared borrow of the
        // pool prevents concurrent data_mut(), free() or truncate().
        unsafe { slice::from_raw_parts(allocation.ptr.as_ptr(), allocation.capacity) }
    }

    /// The full usable memory of an allocation, for writing.
    ///
    /// # Panics
    ///
    /// Panics if the allocation does not belong to this pool, predates a truncation or has
    /// damaged sentinels.
    #[must_use]
    pub fn data_mut(&mut self, allocation: &Allocation) -> &mut [u8] {
        self.validate(allocation);

        // SAFETY: The allocation is live and has `capacity` usable bytes. The exclusive borrow
        // of the pool guarantees no other slice of this allocation exists.
        unsafe { slice::from_raw_parts_mut(allocation.ptr.as_ptr(), allocation.capacity) }
    }

    /// Tears the pool down, releasing all of its memory.
    ///
    /// # Errors
    ///
    /// If allocations are still outstanding, the pool is left untouched and returned inside
    /// the [`DestroyError`] together with a report listing them. The report is also logged.
    ///
    /// # Examples
    ///
    /// ```
    /// use memory_pool::{MemoryPool, source_tag};
    ///
    /// let mut pool = MemoryPool::new();
    /// let allocation = pool.allocate(64, source_tag!());
    ///
    /// let error = pool.destroy().unwrap_err();
    /// assert_eq!(error.report().len(), 1);
    ///
    /// let mut pool = error.into_pool();
    /// pool.free(allocation);
    /// pool.destroy().unwrap();
    /// ```
    pub fn destroy(mut self) -> Result<(), DestroyError> {
        if self.live > 0 {
            warn!(
                pool_id = self.pool_id,
                outstanding = self.live,
                "refusing to destroy memory pool with outstanding allocations"
            );

            let report = self.report();
            return Err(DestroyError::new(self, report));
        }

        self.release_all();

        debug!(pool_id = self.pool_id, "destroyed memory pool");

        Ok(())
    }

    /// Releases every allocation at once and returns the pool to its empty state.
    ///
    /// All handles issued before the truncation become invalid. Passing one to the pool
    /// afterwards panics.
    pub fn truncate(&mut self) {
        let released = self.live;

        self.release_all();
        self.live = 0;
        self.epoch = self.epoch.wrapping_add(1);

        debug!(pool_id = self.pool_id, released, "truncated memory pool");
    }

    /// Lists the outstanding allocations without changing the pool. Each entry is also
    /// logged as a warning.
    #[must_use]
    pub fn report(&self) -> PoolReport {
        let mut records = Vec::with_capacity(self.live);

        self.slabs.for_each_live(|class, header| {
            records.push(LeakRecord::new(class.size(), AllocationSource::Slab, header.tag()));
        });
        self.heap.for_each_live(|size, header| {
            records.push(LeakRecord::new(size, AllocationSource::Heap, header.tag()));
        });

        let report = PoolReport::new(records);
        report.emit(self.pool_id);
        report
    }

    fn release_all(&mut self) {
        self.slabs.free_all();
        self.heap.free_all();
    }

    fn assert_owned(&self, allocation: &Allocation) {
        assert!(
            allocation.pool_id == self.pool_id,
            "allocation belongs to a different pool (allocation pool ID: {}, current pool ID: {})",
            allocation.pool_id,
            self.pool_id
        );
        assert!(
            allocation.epoch == self.epoch,
            "allocation was released when the pool was truncated"
        );
    }

    /// Checks that the allocation belongs to this pool, is still live and has intact
    /// sentinels.
    fn validate(&self, allocation: &Allocation) {
        self.assert_owned(allocation);

        let live = match allocation.location {
            Location::Slab { class, slab, index } => {
                self.slabs.is_live(class, slab, index, allocation.ptr)
            }
            Location::Heap { record } => self.heap.is_live(record, allocation.ptr),
        };
        assert!(live, "allocation is not live in this pool");

        // SAFETY: The allocation is live, so its entry is allocated and was initialized with
        // a data size equal to the allocation capacity.
        unsafe {
            check_entry(allocation.ptr, allocation.capacity);
        }
    }

    #[cfg(test)]
    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        if self.drop_policy == DropPolicy::MustNotDropAllocations && !thread::panicking() {
            assert!(
                self.live == 0,
                "dropped a memory pool with {} outstanding allocations - this is forbidden by DropPolicy::MustNotDropAllocations",
                self.live
            );
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{SLOTS_PER_SLAB, source_tag};

    assert_impl_all!(MemoryPool: Send);
    assert_not_impl_any!(MemoryPool: Sync);

    #[test]
    fn smoke_test() {
        let mut pool = MemoryPool::new();
        assert!(pool.is_empty());

        let a = pool.allocate(8, source_tag!());
        let b = pool.allocate(100, source_tag!());
        let c = pool.allocate(1000, source_tag!());
        assert_eq!(pool.live_allocations(), 3);
        assert_eq!(pool.slab_count(), 2);
        assert_eq!(pool.heap_count(), 1);

        pool.free(b);
        pool.free(a);
        pool.free(c);

        assert!(pool.is_empty());
        assert_eq!(pool.heap_count(), 0);
        pool.destroy().unwrap();
    }

    #[test]
    fn realloc_within_class_keeps_pointer() {
        let mut pool = MemoryPool::new();

        let allocation = pool.allocate(20, source_tag!());
        let ptr = allocation.as_ptr();

        let allocation = pool.reallocate(Some(allocation), 30, source_tag!());
        assert_eq!(allocation.as_ptr(), ptr);
        assert_eq!(allocation.capacity(), 32);
        assert_eq!(pool.live_allocations(), 1);

        pool.free(allocation);
    }

    #[test]
    fn realloc_to_smaller_keeps_pointer() {
        let mut pool = MemoryPool::new();

        let allocation = pool.allocate(2000, source_tag!());
        let ptr = allocation.as_ptr();

        let allocation = pool.reallocate(Some(allocation), 10, source_tag!());
        assert_eq!(allocation.as_ptr(), ptr);
        assert!(allocation.is_heap());

        pool.free(allocation);
    }

    #[test]
    fn realloc_growth_copies_contents() {
        let mut pool = MemoryPool::new();

        let allocation = pool.allocate(16, source_tag!());
        pool.data_mut(&allocation).copy_from_slice(b"0123456789abcdef");

        let allocation = pool.reallocate(Some(allocation), 300, source_tag!());
        assert!(allocation.is_heap());
        assert_eq!(allocation.capacity(), 300);
        assert_eq!(&pool.data(&allocation)[..16], b"0123456789abcdef");
        assert_eq!(pool.live_allocations(), 1);

        pool.free(allocation);
        assert!(pool.is_empty());
    }

    #[test]
    fn realloc_none_allocates() {
        let mut pool = MemoryPool::new();

        let allocation = pool.reallocate(None, 40, source_tag!());
        assert_eq!(allocation.capacity(), 48);
        assert_eq!(pool.live_allocations(), 1);

        pool.free(allocation);
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut pool = MemoryPool::new();

        let first = pool.allocate(64, source_tag!());
        let ptr = first.as_ptr();
        pool.free(first);

        let second = pool.allocate(50, source_tag!());
        assert_eq!(second.as_ptr(), ptr);

        pool.free(second);
    }

    #[test]
    fn many_allocations_grow_the_chain() {
        let mut pool = MemoryPool::new();

        let allocations: Vec<Allocation> = (0..SLOTS_PER_SLAB * 3)
            .map(|_| pool.allocate(8, source_tag!()))
            .collect();
        assert_eq!(pool.slab_count(), 3);

        for allocation in allocations {
            pool.free(allocation);
        }

        // Slabs are only released in bulk.
        assert_eq!(pool.slab_count(), 3);
        assert!(pool.is_empty());
    }

    #[test]
    fn slab_memory_starts_zeroed() {
        let mut pool = MemoryPool::new();

        let allocation = pool.allocate(256, source_tag!());
        assert!(pool.data(&allocation).iter().all(|&byte| byte == 0));

        pool.free(allocation);
    }

    #[test]
    fn system_mode_bypasses_slabs() {
        let mut pool = MemoryPool::builder().mode(AllocationMode::System).build();

        let allocation = pool.allocate(8, source_tag!());
        assert!(allocation.is_heap());
        assert_eq!(allocation.capacity(), 8);
        assert_eq!(pool.slab_count(), 0);

        let report = pool.report();
        assert_eq!(report.records()[0].source(), AllocationSource::Heap);

        pool.free(allocation);
        pool.destroy().unwrap();
    }

    #[test]
    fn destroy_with_leak_keeps_pool_usable() {
        let mut pool = MemoryPool::new();
        let allocation = pool.allocate(32, source_tag!());

        let error = pool.destroy().unwrap_err();
        assert_eq!(error.report().len(), 1);

        let mut pool = error.into_pool();
        assert_eq!(pool.live_allocations(), 1);

        pool.data_mut(&allocation)[0] = 7;
        pool.free(allocation);
        pool.destroy().unwrap();
    }

    #[test]
    fn report_lists_slab_then_heap() {
        let mut pool = MemoryPool::new();

        let heap_old = pool.allocate(500, source_tag!());
        let slab = pool.allocate(3, source_tag!());
        let heap_new = pool.allocate(700, source_tag!());

        let report = pool.report();
        let summary: Vec<(usize, AllocationSource)> = report
            .records()
            .iter()
            .map(|record| (record.size(), record.source()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (8, AllocationSource::Slab),
                (700, AllocationSource::Heap),
                (500, AllocationSource::Heap),
            ]
        );

        // Reporting does not change anything.
        assert_eq!(pool.live_allocations(), 3);

        pool.free(heap_old);
        pool.free(slab);
        pool.free(heap_new);
    }

    #[cfg(feature = "tracking")]
    #[test]
    fn report_carries_source_tags() {
        let mut pool = MemoryPool::new();

        let allocation = pool.allocate(1, SourceTag::new("tagged.rs", 99));

        let report = pool.report();
        assert_eq!(report.records()[0].tag(), SourceTag::new("tagged.rs", 99));
        assert_eq!(
            report.to_string(),
            "  0008 byte pool chunk: tagged.rs(99)\n"
        );

        pool.free(allocation);
    }

    #[test]
    fn truncate_releases_everything() {
        let mut pool = MemoryPool::new();

        let _small = pool.allocate(8, source_tag!());
        let _large = pool.allocate(4096, source_tag!());

        pool.truncate();

        assert!(pool.is_empty());
        assert_eq!(pool.slab_count(), 0);
        assert_eq!(pool.heap_count(), 0);
        assert!(pool.report().is_empty());

        // The pool remains usable after truncation.
        let allocation = pool.allocate(8, source_tag!());
        pool.free(allocation);
        pool.destroy().unwrap();
    }

    #[test]
    #[should_panic(expected = "truncated")]
    fn stale_handle_after_truncate_panics() {
        let mut pool = MemoryPool::new();

        let stale = pool.allocate(8, source_tag!());
        pool.truncate();
        let _fresh = pool.allocate(8, source_tag!());

        pool.free(stale);
    }

    #[test]
    #[should_panic(expected = "different pool")]
    fn free_into_wrong_pool_panics() {
        let mut pool_a = MemoryPool::new();
        let mut pool_b = MemoryPool::new();
        assert_ne!(pool_a.pool_id(), pool_b.pool_id());

        let allocation = pool_a.allocate(8, source_tag!());
        pool_b.free(allocation);
    }

    #[test]
    #[should_panic(expected = "footer")]
    fn overrun_is_detected_on_free() {
        let mut pool = MemoryPool::new();

        let allocation = pool.allocate(16, source_tag!());

        // SAFETY: Deliberately writes one byte past the usable region, into the footer.
        unsafe { allocation.as_ptr().as_ptr().add(16).write(0) };

        pool.free(allocation);
    }

    #[test]
    #[should_panic(expected = "outstanding allocations")]
    fn must_not_drop_policy_panics_on_leak() {
        let mut pool = MemoryPool::builder()
            .drop_policy(DropPolicy::MustNotDropAllocations)
            .build();

        let _leaked = pool.allocate(8, source_tag!());
        drop(pool);
    }

    #[test]
    fn may_drop_policy_releases_silently() {
        let mut pool = MemoryPool::new();

        let _leaked = pool.allocate(8, source_tag!());
        let _leaked_large = pool.allocate(8000, source_tag!());
        drop(pool);
    }
}
