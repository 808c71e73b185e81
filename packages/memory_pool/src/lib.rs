//! A memory pool with size-class slabs, a heap fallback and leak reports.
//!
//! This crate provides [`MemoryPool`], an allocator for byte buffers that serves small
//! requests from slabs of fixed-size slots and large ones from individual system
//! allocations. It is meant to sit underneath data structures that do many small allocations
//! and want to know, at teardown, whether any of them were forgotten.
//!
//! # Key Features
//!
//! - **Size classes**: requests of up to [`MAX_SLAB_SIZE`] bytes are rounded up to one of
//!   [`SIZE_CLASSES`] and served from slabs of 32 slots that are reused after being freed
//! - **Heap fallback**: larger requests become individual system allocations
//! - **Sentinels**: every allocation carries a header and footer that are verified on free,
//!   reallocation and access, catching buffer overruns
//! - **Leak tracking**: the pool counts outstanding allocations and
//!   [`destroy()`](MemoryPool::destroy) refuses to run while any exist, returning a
//!   [`PoolReport`] that names the source location of each leak
//! - **Bulk release**: [`truncate()`](MemoryPool::truncate) frees everything at once
//! - **Global pool**: one pool per thread can be designated for code that does not carry a
//!   pool reference, see [`global`]
//!
//! # Handles
//!
//! [`MemoryPool::allocate()`] returns an [`Allocation`] handle. The handle cannot be cloned and
//! is consumed when the memory is freed, so double frees are impossible in safe code. The
//! memory is accessed through the pool with [`MemoryPool::data()`] and
//! [`MemoryPool::data_mut()`], which tie the returned slices to a borrow of the pool.
//!
//! # Examples
//!
//! ```rust
//! use memory_pool::{MemoryPool, source_tag};
//!
//! let mut pool = MemoryPool::new();
//!
//! let name = pool.allocate(5, source_tag!());
//! pool.data_mut(&name)[..5].copy_from_slice(b"folio");
//!
//! // Growing within the 8 byte size class keeps the same memory.
//! let name = pool.reallocate(Some(name), 8, source_tag!());
//! assert_eq!(&pool.data(&name)[..5], b"folio");
//!
//! // Forgetting to free is reported instead of silently leaking.
//! let error = pool.destroy().unwrap_err();
//! assert_eq!(error.report().len(), 1);
//!
//! let mut pool = error.into_pool();
//! pool.free(name);
//! pool.destroy().unwrap();
//! ```
//!
//! # Features
//!
//! - `tracking` (default): records the [`SourceTag`] of each allocation in its header so that
//!   reports can name it. Without it, reports show [`SourceTag::unknown()`].

mod allocation;
mod builder;
mod drop_policy;
mod error;
pub mod global;
mod header;
mod heap;
mod mode;
mod pool;
mod report;
mod size_class;
mod slab;
mod slab_allocator;
mod source_tag;

pub use allocation::Allocation;
pub(crate) use allocation::Location;
pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use header::DATA_ALIGN;
pub(crate) use header::{AllocHeader, EntryLayout, HEAP_INDEX, check_entry};
pub(crate) use heap::*;
pub use mode::*;
pub use pool::MemoryPool;
pub use report::*;
pub use size_class::{MAX_SLAB_SIZE, SIZE_CLASSES, SizeClass};
pub(crate) use size_class::SIZE_CLASS_COUNT;
pub(crate) use slab::*;
pub(crate) use slab_allocator::*;
pub use source_tag::SourceTag;
