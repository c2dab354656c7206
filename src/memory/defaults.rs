//! Default limits and thresholds.
//!
//! These are the values [`BufferConfig::default`](crate::BufferConfig) starts
//! from.

use std::time::Duration;

// =============================================================================
// Allocation
// =============================================================================

/// Largest owned allocation a buffer will attempt, in bytes.
///
/// Matches the largest size a single Rust allocation may have.
pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = isize::MAX as usize;

/// Allocation limit used by [`BufferConfig::bounded`](crate::BufferConfig::bounded).
pub const BOUNDED_MAX_ALLOCATION_BYTES: usize = 256 * 1024 * 1024;

// =============================================================================
// Teardown
// =============================================================================

/// Fewest holders for which a completion signal can be handed out.
///
/// With a single holder the caller itself is the only thread that can tear
/// the buffer down, so waiting would never finish.
pub const MIN_HOLDERS_FOR_SIGNAL: usize = 2;

/// How long a release waits for a pending write-back before giving up.
///
/// `None` waits indefinitely.
pub const DEFAULT_RELEASE_TIMEOUT: Option<Duration> = None;

/// Release timeout used by [`BufferConfig::bounded`](crate::BufferConfig::bounded).
pub const BOUNDED_RELEASE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Convenience Functions
// =============================================================================

/// Bytes needed for `count` elements of `T`, or `None` on overflow.
///
/// # Example
/// ```rust
/// use hetbuf::memory::defaults::bytes_for;
///
/// assert_eq!(bytes_for::<f32>(4), Some(16));
/// ```
pub const fn bytes_for<T>(count: usize) -> Option<usize> {
    count.checked_mul(std::mem::size_of::<T>())
}
