//! Collections whose storage is allocated from a [`memory_pool::MemoryPool`].
//!
//! The collections in this crate do not hold on to the pool they allocate from. Every
//! operation that touches storage takes the pool as a parameter, which keeps the pool free to
//! be used by other code in between and lets any number of collections share one pool. The
//! caller must always pass the same pool a collection was created with; the pool verifies this
//! and panics on a mismatch.
//!
//! Dropping a collection does not release its storage. Call `free()` to return it to the pool;
//! anything forgotten shows up in the pool's leak report.
//!
//! # Collections
//!
//! - [`PoolArray`]: a fixed number of elements in one allocation
//! - [`PoolVec`]: a growable sequence with separate length and capacity
//! - [`PoolString`]: a nul-terminated byte string with formatting support
//! - [`PoolTree`]: an unbalanced binary search tree with unique keys
//! - [`SortedList`]: a doubly-linked list kept in key order, allowing duplicate keys
//!
//! Elements and values are [`bytemuck::Pod`] types, which lets them be viewed in place inside
//! pool memory without copying.
//!
//! # Examples
//!
//! ```rust
//! use memory_pool::{MemoryPool, source_tag};
//! use pool_collections::{PoolString, PoolVec};
//!
//! let mut pool = MemoryPool::new();
//!
//! let mut greeting = PoolString::new(&mut pool, "Hello", source_tag!());
//! greeting.catf(&mut pool, format_args!(", {}!", "pool"), source_tag!());
//! assert_eq!(greeting.to_str(&pool).unwrap(), "Hello, pool!");
//!
//! let mut numbers = PoolVec::<u16>::new(&mut pool, source_tag!());
//! numbers.append(&mut pool, 2, source_tag!()).copy_from_slice(&[4, 2]);
//! assert_eq!(numbers.as_slice(&pool), &[4, 2]);
//!
//! greeting.free(&mut pool);
//! numbers.free(&mut pool);
//! pool.destroy().unwrap();
//! ```

mod array;
mod element;
mod sorted_list;
mod string;
mod tree;
mod vector;

pub use array::*;
pub use sorted_list::*;
pub use string::*;
pub use tree::*;
pub use vector::*;
