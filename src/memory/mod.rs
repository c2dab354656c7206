//! Storage backings for buffers.
//!
//! A buffer's elements live in exactly one backing at a time:
//!
//! - [`HostAllocation`]: memory the buffer allocated and frees itself
//! - borrowed host slices (`&mut [T]` or `&[T]`), never freed by the buffer
//! - [`HostBlock`] behind an `Arc`, co-owned with the caller
//! - a `Box<[T]>` whose ownership moved into the buffer
//!
//! [`StorageKind`] names the active backing and [`ReleaseRule`] states what
//! teardown does with it.
//!
//! # Example
//!
//! ```rust
//! use hetbuf::memory::{HostBlock, StorageKind};
//! use std::sync::Arc;
//!
//! let block = Arc::new(HostBlock::from_vec(vec![1u32, 2, 3]));
//! assert_eq!(block.len(), 3);
//! assert!(StorageKind::SharedExternal.is_host_provided());
//! ```

pub mod defaults;
mod heap;
mod segment;
mod shared;
mod storage;

pub use heap::HostAllocation;
pub use segment::{ReleaseRule, StorageKind};
pub use shared::HostBlock;
pub(crate) use storage::Storage;

/// Types that can be stored in a buffer.
///
/// Elements are plain data: copying is a bitwise copy, and a default value
/// fills freshly allocated storage. `Send + Sync + 'static` lets buffers
/// move between the host thread and the threads that run tasks.
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Element for T {}
