/// Selects how a [`MemoryPool`](crate::MemoryPool) serves small requests.
///
/// # Examples
///
/// ```
/// use memory_pool::{AllocationMode, MemoryPool, source_tag};
///
/// let mut pool = MemoryPool::builder().mode(AllocationMode::System).build();
///
/// let allocation = pool.allocate(8, source_tag!());
/// assert!(allocation.is_heap());
/// assert_eq!(pool.slab_count(), 0);
///
/// pool.free(allocation);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum AllocationMode {
    /// Requests of up to [`MAX_SLAB_SIZE`](crate::MAX_SLAB_SIZE) bytes are served from
    /// size-class slabs, larger ones from individual system allocations. This is the default.
    #[default]
    Pooled,

    /// Every request is an individual system allocation. Allocations are still tracked, so
    /// freeing, reporting and destroying behave exactly as in [`Pooled`](Self::Pooled) mode.
    ///
    /// Useful with external memory checkers, which cannot see overruns inside a slab.
    System,
}
