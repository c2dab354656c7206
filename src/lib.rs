//! # hetbuf
//!
//! Host-side data buffers for a heterogeneous task runtime.
//!
//! A [`Buffer`] is a shaped block of elements that host code and scheduled
//! tasks share. It tracks where its elements live (memory it allocated,
//! caller memory it borrows, or memory whose ownership it shares or took),
//! whether anyone has written to it, and where its contents go when it is
//! torn down.
//!
//! ## Features
//!
//! - **Ownership modes**: owned, borrowed, read-only borrowed, shared and
//!   unique backings, each with an explicit release rule
//! - **Copy-on-write**: a buffer over read-only memory copies it on the
//!   first write-capable access
//! - **Write-back**: modified buffers copy their contents to a sink on
//!   teardown
//! - **Teardown synchronization**: host code waits for the write-back only
//!   when another holder will run it
//!
//! ## Quick Start
//!
//! ```rust
//! use hetbuf::prelude::*;
//!
//! let input = [1.0f32, 2.0, 3.0, 4.0];
//! let mut output = [0.0f32; 4];
//! {
//!     let mut buffer = Buffer::from_const_host_slice(&input, Shape::new([4])?)?;
//!     buffer.set_final_data(OutputCursor::new(&mut output))?;
//!
//!     let mut acc = buffer.host_write(WriteMode::ReadWrite)?;
//!     for v in acc.iter_mut() {
//!         *v *= 2.0;
//!     }
//! }
//! assert_eq!(output, [2.0, 4.0, 6.0, 8.0]);
//! assert_eq!(input, [1.0, 2.0, 3.0, 4.0]);
//! # Ok::<(), hetbuf::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod access;
pub mod buffer;
pub mod config;
pub mod error;
pub mod memory;
pub mod observability;
pub mod shape;
pub mod sink;
pub mod task;
pub mod teardown;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::access::{AccessMode, AccessTarget, HostAccessor, HostAccessorMut, WriteMode};
    pub use crate::buffer::{Buffer, BufferId};
    pub use crate::config::BufferConfig;
    pub use crate::error::{Error, Result};
    pub use crate::memory::{Element, HostBlock, StorageKind};
    pub use crate::shape::Shape;
    pub use crate::sink::{FinalData, OutputCursor};
    pub use crate::task::{BufferDependency, TaskBuilder, attach_to_task};
    pub use crate::teardown::{BufferWaiter, CompletionSignal, SharedBuffer, SharedBufferGuard};
}

pub use access::{AccessMode, AccessTarget, HostAccessor, HostAccessorMut, WriteMode};
pub use buffer::{Buffer, BufferId};
pub use config::BufferConfig;
pub use error::{Error, Result};
pub use shape::Shape;
pub use sink::{FinalData, OutputCursor};
pub use task::{BufferBase, BufferDependency, TaskBuilder, attach_to_task};
pub use teardown::{BufferWaiter, CompletionSignal, SharedBuffer, SharedBufferGuard};
