use std::cell::Cell;
use std::marker::PhantomData;

use crate::{AllocationMode, DropPolicy, MemoryPool};

/// Builder for creating an instance of [`MemoryPool`].
///
/// All settings are optional. [`MemoryPool::new()`] is equivalent to building with the
/// defaults.
///
/// # Examples
///
/// ```
/// use memory_pool::{AllocationMode, DropPolicy, MemoryPool};
///
/// let pool = MemoryPool::builder()
///     .mode(AllocationMode::Pooled)
///     .drop_policy(DropPolicy::MustNotDropAllocations)
///     .build();
///
/// assert_eq!(pool.mode(), AllocationMode::Pooled);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct MemoryPoolBuilder {
    mode: AllocationMode,
    drop_policy: DropPolicy,

    _not_sync: PhantomData<Cell<()>>,
}

impl MemoryPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            mode: AllocationMode::default(),
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the [allocation mode][AllocationMode], which decides whether small requests are
    /// served from slabs or from individual system allocations.
    #[inline]
    pub fn mode(mut self, mode: AllocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat
    /// outstanding allocations when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the memory pool with the specified configuration.
    #[must_use]
    #[inline]
    pub fn build(self) -> MemoryPool {
        MemoryPool::new_inner(self.mode, self.drop_policy)
    }
}
