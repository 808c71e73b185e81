/// Determines what happens when a [`MemoryPool`](crate::MemoryPool) is dropped while
/// allocations are still outstanding.
///
/// The memory of a dropped pool is always returned to the system. The policy only decides
/// whether doing so with live allocations is acceptable.
///
/// # Examples
///
/// ```
/// use memory_pool::{DropPolicy, MemoryPool};
///
/// let pool = MemoryPool::builder()
///     .drop_policy(DropPolicy::MustNotDropAllocations)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Outstanding allocations are released silently together with the pool. This is the
    /// default.
    #[default]
    MayDropAllocations,

    /// The pool panics if it still has outstanding allocations when it is dropped.
    ///
    /// Use [`MemoryPool::destroy()`](crate::MemoryPool::destroy) to tear such a pool down
    /// with a leak report instead of a panic.
    MustNotDropAllocations,
}
