use thiserror::Error;

use crate::{MemoryPool, PoolReport};

/// A [`MemoryPool`] could not be destroyed because allocations were still outstanding.
///
/// The pool is left fully intact inside the error. Recover it with
/// [`into_pool()`](Self::into_pool) to keep using it, or drop the error to release the pool
/// memory regardless (subject to the pool's [`DropPolicy`](crate::DropPolicy)).
#[derive(Debug, Error)]
#[error("memory pool still has {} outstanding allocations", .report.len())]
pub struct DestroyError {
    pool: Box<MemoryPool>,
    report: PoolReport,
}

impl DestroyError {
    pub(crate) fn new(pool: MemoryPool, report: PoolReport) -> Self {
        Self {
            pool: Box::new(pool),
            report,
        }
    }

    /// The outstanding allocations that prevented the pool from being destroyed.
    #[must_use]
    pub fn report(&self) -> &PoolReport {
        &self.report
    }

    /// Returns the pool that could not be destroyed, in the state it was in.
    #[must_use]
    pub fn into_pool(self) -> MemoryPool {
        *self.pool
    }
}

/// Errors raised by operations on the thread's designated global pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The operation needs a global pool but none has been designated on this thread.
    #[error("no memory pool is designated as the global pool on this thread")]
    NoGlobalPool,

    /// The global pool could not be destroyed because allocations were still outstanding.
    /// The pool remains designated.
    #[error("global memory pool still has {} outstanding allocations", .report.len())]
    Leaked {
        /// The outstanding allocations.
        report: PoolReport,
    },
}

/// The result type of operations on the designated global pool.
pub type Result<T, E = PoolError> = std::result::Result<T, E>;
