//! Spans for buffer lifecycle events.

use crate::buffer::BufferId;
use crate::memory::StorageKind;
use tracing::{Level, Span, span};

/// Create a span covering work on one buffer.
///
/// # Example
///
/// ```rust
/// use hetbuf::{Buffer, Shape, observability::span_buffer};
///
/// let buffer = Buffer::<u8>::from_shape(Shape::new([4]).unwrap()).unwrap();
/// let span = span_buffer(buffer.id(), buffer.storage_kind());
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_buffer(id: BufferId, storage: StorageKind) -> Span {
    span!(Level::DEBUG, "buffer", id = %id, storage = %storage)
}

/// Enter a span for a buffer's teardown.
///
/// Write-back and release events logged while the guard lives carry the
/// buffer's id.
pub fn instrument_teardown(id: BufferId, storage: StorageKind) -> tracing::span::EnteredSpan {
    span!(Level::DEBUG, "buffer_teardown", id = %id, storage = %storage).entered()
}
