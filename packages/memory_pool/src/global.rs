//! The designated global pool of the current thread.
//!
//! Code that does not want to pass a [`MemoryPool`] around can designate one pool per thread
//! as the global pool and allocate from it through the free functions of this module.
//!
//! ```
//! use memory_pool::{MemoryPool, global, source_tag};
//!
//! global::set_global(MemoryPool::new());
//!
//! let allocation = global::allocate(100, source_tag!()).unwrap();
//! global::free(allocation).unwrap();
//!
//! global::destroy_global().unwrap();
//! assert!(!global::has_global());
//! ```

use std::cell::RefCell;

use tracing::debug;

use crate::{Allocation, MemoryPool, PoolError, PoolReport, Result, SourceTag};

thread_local! {
    static GLOBAL_POOL: RefCell<Option<MemoryPool>> = const { RefCell::new(None) };
}

/// Designates `pool` as the global pool of the current thread.
///
/// Returns the previously designated pool, if any, untouched.
pub fn set_global(pool: MemoryPool) -> Option<MemoryPool> {
    GLOBAL_POOL.with_borrow_mut(|global| global.replace(pool))
}

/// Removes the designation and hands the global pool back to the caller.
pub fn take_global() -> Option<MemoryPool> {
    GLOBAL_POOL.with_borrow_mut(Option::take)
}

/// Whether a global pool is designated on the current thread.
#[must_use]
pub fn has_global() -> bool {
    GLOBAL_POOL.with_borrow(Option::is_some)
}

/// Runs `f` with exclusive access to the global pool.
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread.
///
/// # Panics
///
/// Panics if called from within `f`, as the global pool is already borrowed.
pub fn with_global<R>(f: impl FnOnce(&mut MemoryPool) -> R) -> Result<R> {
    GLOBAL_POOL.with_borrow_mut(|global| global.as_mut().map(f).ok_or(PoolError::NoGlobalPool))
}

/// Allocates from the global pool. See [`MemoryPool::allocate()`].
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread.
pub fn allocate(size: usize, tag: SourceTag) -> Result<Allocation> {
    with_global(|pool| pool.allocate(size, tag))
}

/// Reallocates in the global pool. See [`MemoryPool::reallocate()`].
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread. The
/// allocation passed in is dropped in that case, which leaks it.
pub fn reallocate(
    allocation: Option<Allocation>,
    new_size: usize,
    tag: SourceTag,
) -> Result<Allocation> {
    with_global(|pool| pool.reallocate(allocation, new_size, tag))
}

/// Frees an allocation of the global pool. See [`MemoryPool::free()`].
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread.
pub fn free(allocation: Allocation) -> Result<()> {
    with_global(|pool| pool.free(allocation))
}

/// Lists the outstanding allocations of the global pool. See [`MemoryPool::report()`].
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread.
pub fn report_global() -> Result<PoolReport> {
    with_global(|pool| pool.report())
}

/// Truncates the global pool. See [`MemoryPool::truncate()`].
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread.
pub fn truncate_global() -> Result<()> {
    with_global(MemoryPool::truncate)
}

/// Destroys the global pool and clears the designation.
///
/// # Errors
///
/// Returns [`PoolError::NoGlobalPool`] if no pool is designated on this thread, or
/// [`PoolError::Leaked`] if allocations are outstanding. In the latter case the pool is left
/// intact and remains the global pool.
pub fn destroy_global() -> Result<()> {
    let pool = take_global().ok_or(PoolError::NoGlobalPool)?;

    match pool.destroy() {
        Ok(()) => {
            debug!("destroyed global memory pool");
            Ok(())
        }
        Err(error) => {
            let report = error.report().clone();
            set_global(error.into_pool());
            Err(PoolError::Leaked { report })
        }
    }
}
