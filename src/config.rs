//! Buffer configuration.

use crate::memory::defaults;
use std::time::Duration;

/// Limits applied when a buffer allocates or is released.
///
/// # Example
///
/// ```rust
/// use hetbuf::{Buffer, BufferConfig, Shape};
///
/// let config = BufferConfig::default().with_max_allocation_bytes(64);
/// assert!(Buffer::<u32>::from_shape_with_config(Shape::new([16]).unwrap(), &config).is_ok());
/// assert!(Buffer::<u32>::from_shape_with_config(Shape::new([17]).unwrap(), &config).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Largest owned allocation, in bytes, for construction and
    /// copy-on-write promotion.
    pub max_allocation_bytes: usize,
    /// How long a [`BufferWaiter`](crate::BufferWaiter) waits for a pending
    /// write-back on drop. `None` waits indefinitely.
    pub release_timeout: Option<Duration>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_allocation_bytes: defaults::DEFAULT_MAX_ALLOCATION_BYTES,
            release_timeout: defaults::DEFAULT_RELEASE_TIMEOUT,
        }
    }
}

impl BufferConfig {
    /// A config with finite limits on allocation size and release waits.
    pub fn bounded() -> Self {
        Self {
            max_allocation_bytes: defaults::BOUNDED_MAX_ALLOCATION_BYTES,
            release_timeout: Some(defaults::BOUNDED_RELEASE_TIMEOUT),
        }
    }

    /// Set the allocation limit.
    pub fn with_max_allocation_bytes(mut self, bytes: usize) -> Self {
        self.max_allocation_bytes = bytes;
        self
    }

    /// Set the release timeout.
    pub fn with_release_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.release_timeout = timeout;
        self
    }
}
