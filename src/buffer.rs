//! The buffer: a shaped block of elements and its ownership state.

use crate::config::BufferConfig;
use crate::error::{Error, Result};
use crate::memory::{Element, HostAllocation, HostBlock, Storage, StorageKind};
use crate::observability;
use crate::shape::Shape;
use crate::sink::{FinalData, WriteBackOutcome, WriteBackSink};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique buffer identifier, used in logs and by schedulers to key
/// dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// A `D`-dimensional block of `T`s shared between host code and tasks.
///
/// A buffer's elements live in one [`StorageKind`] of backing. Buffers built
/// over caller memory borrow it for `'a`; buffers that allocate or take
/// ownership of their memory can be `'static`.
///
/// State only moves forward:
///
/// - the modified flag is set by the first write-capable access (or by
///   [`Buffer::mark_written`]) and never cleared;
/// - a buffer built over read-only memory copies it into an owned
///   allocation on its first write-capable access, exactly once.
///
/// When a modified buffer is dropped it copies its elements to its
/// write-back sink, if one is installed, and then releases its storage.
///
/// All mutation goes through `&mut self`. To hand a buffer to several
/// tasks, wrap it in a [`SharedBuffer`](crate::SharedBuffer); ordering those
/// tasks is the scheduler's job.
///
/// # Example
///
/// ```rust
/// use hetbuf::{Buffer, Shape, WriteMode};
///
/// let mut data = [1, 2, 3];
/// {
///     let mut buffer = Buffer::from_host_slice(&mut data, Shape::new([3]).unwrap()).unwrap();
///     let mut acc = buffer.host_write(WriteMode::Write).unwrap();
///     acc[0] = 9;
/// }
/// assert_eq!(data, [9, 2, 3]);
/// ```
pub struct Buffer<'a, T: Element, const D: usize = 1> {
    id: BufferId,
    shape: Shape<D>,
    storage: Storage<'a, T>,
    modified: bool,
    copy_on_write_pending: bool,
    sink: WriteBackSink<'a, T>,
    max_allocation_bytes: usize,
}

impl<'a, T: Element, const D: usize> Buffer<'a, T, D> {
    fn with_storage(shape: Shape<D>, storage: Storage<'a, T>, config: &BufferConfig) -> Self {
        let buffer = Self {
            id: BufferId::next(),
            shape,
            copy_on_write_pending: matches!(storage, Storage::BorrowedConst(_)),
            storage,
            modified: false,
            sink: WriteBackSink::None,
            max_allocation_bytes: config.max_allocation_bytes,
        };

        let kind = buffer.storage.kind();
        tracing::debug!(
            buffer = %buffer.id,
            storage = %kind,
            shape = %buffer.shape,
            element = std::any::type_name::<T>(),
            "buffer created"
        );
        observability::record_buffer_created(kind);
        buffer
    }

    /// Create a buffer that allocates `shape.count()` default-valued
    /// elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the allocation fails.
    pub fn from_shape(shape: Shape<D>) -> Result<Self> {
        Self::from_shape_with_config(shape, &BufferConfig::default())
    }

    /// Like [`Buffer::from_shape`], with explicit limits.
    pub fn from_shape_with_config(shape: Shape<D>, config: &BufferConfig) -> Result<Self> {
        let alloc = HostAllocation::with_limit(shape.count(), config.max_allocation_bytes)?;
        Ok(Self::with_storage(shape, Storage::Owned(alloc), config))
    }

    /// Create a buffer over caller memory, read and written in place.
    ///
    /// The buffer never frees `data`. Only the first `shape.count()`
    /// elements are used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if `data` is shorter than the shape.
    pub fn from_host_slice(data: &'a mut [T], shape: Shape<D>) -> Result<Self> {
        let count = check_len(data.len(), &shape)?;
        Ok(Self::with_storage(
            shape,
            Storage::Borrowed(&mut data[..count]),
            &BufferConfig::default(),
        ))
    }

    /// Create a buffer over read-only caller memory.
    ///
    /// The buffer reads `data` in place until the first write-capable
    /// access, which copies the elements into an owned allocation. `data`
    /// is never written and never freed. The borrow keeps `data` unchanged
    /// for the buffer's whole life, so the copy always equals the contents
    /// at construction.
    pub fn from_const_host_slice(data: &'a [T], shape: Shape<D>) -> Result<Self> {
        let count = check_len(data.len(), &shape)?;
        Ok(Self::with_storage(
            shape,
            Storage::BorrowedConst(&data[..count]),
            &BufferConfig::default(),
        ))
    }

    /// Create a buffer that co-owns a shared host block.
    ///
    /// The block outlives the buffer as long as other holders keep it. The
    /// buffer does not arbitrate between them.
    ///
    /// # Safety
    ///
    /// While this buffer exists, nothing else may read or write the first
    /// [`Shape::count`] elements of `block` concurrently with an access made
    /// through the buffer. In particular the caller must not:
    ///
    /// - hold views from [`HostBlock::as_slice`] or
    ///   [`HostBlock::as_mut_slice`] over those elements while a host
    ///   accessor of this buffer is live, or keep them across its teardown;
    /// - build a second buffer over the same block and use accessors of both
    ///   at the same time;
    /// - let another buffer write back into `block` (through
    ///   [`FinalData::Strong`] or [`FinalData::Weak`]) while an accessor of
    ///   this buffer is live.
    ///
    /// This buffer writing back into its own block is allowed.
    pub unsafe fn from_shared(block: Arc<HostBlock<T>>, shape: Shape<D>) -> Result<Self> {
        let count = check_len(block.len(), &shape)?;
        Ok(Self::with_storage(
            shape,
            Storage::SharedExternal { block, count },
            &BufferConfig::default(),
        ))
    }

    /// Create a buffer that takes sole ownership of `data`.
    pub fn from_unique(data: Box<[T]>, shape: Shape<D>) -> Result<Self> {
        let count = check_len(data.len(), &shape)?;
        let data = if data.len() == count {
            data
        } else {
            let mut data = data.into_vec();
            data.truncate(count);
            data.into_boxed_slice()
        };
        Ok(Self::with_storage(
            shape,
            Storage::UniqueExternal(data),
            &BufferConfig::default(),
        ))
    }

    /// Apply `config`'s allocation limit to later copy-on-write promotions.
    pub fn with_config(mut self, config: &BufferConfig) -> Self {
        self.max_allocation_bytes = config.max_allocation_bytes;
        self
    }

    /// This buffer's identifier.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The buffer's shape.
    #[inline]
    pub fn shape(&self) -> Shape<D> {
        self.shape
    }

    /// Total number of elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.shape.count()
    }

    /// Size of the elements in bytes.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.count() * std::mem::size_of::<T>()
    }

    /// The backing currently holding the elements.
    #[inline]
    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Has a write-capable access been made, or the buffer marked written?
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Will the next write-capable access copy the elements into owned
    /// storage?
    #[inline]
    pub fn is_copy_on_write_pending(&self) -> bool {
        self.copy_on_write_pending
    }

    /// Is a write-back sink installed?
    #[inline]
    pub fn has_write_back(&self) -> bool {
        self.sink.is_some()
    }

    /// Treat the buffer as modified, as a write-capable access would.
    ///
    /// Does not trigger copy-on-write promotion.
    pub fn mark_written(&mut self) {
        self.modified = true;
    }

    /// Replace the write-back sink.
    ///
    /// The previous sink is discarded without firing. Passing
    /// [`FinalData::None`] disables write-back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SinkTypeMismatch`] if an output cursor's element type
    /// differs from `T`, and [`Error::SinkTooSmall`] if the destination
    /// cannot hold [`Buffer::count`] elements. The previous sink stays
    /// installed on error.
    pub fn set_final_data(&mut self, data: impl Into<FinalData<'a, T>>) -> Result<()> {
        let sink = WriteBackSink::validate(data.into(), self.count())?;
        tracing::trace!(buffer = %self.id, sink = sink.as_str(), "write-back sink set");
        self.sink = sink;
        Ok(())
    }

    /// Hand out the restricted storage capability.
    pub(crate) fn grant(&mut self) -> StorageGrant<'_, 'a, T, D> {
        StorageGrant { buffer: self }
    }

    /// Does tearing this buffer down publish data another holder may be
    /// waiting for?
    pub(crate) fn has_pending_write_back(&self) -> bool {
        self.modified && (self.sink.is_some() || self.storage.kind().is_host_provided())
    }
}

impl<'a, T: Element> Buffer<'a, T, 1> {
    /// Create a one-dimensional buffer holding a copy of every element of
    /// `elements`, in iteration order.
    ///
    /// Storage is allocated before the first element is read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] for an empty sequence and
    /// [`Error::AllocationFailed`] if the allocation fails.
    pub fn from_elements<I>(elements: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = elements.into_iter();
        let shape = Shape::linear(iter.len())
            .map_err(|_| Error::InvalidShape("cannot build a buffer from an empty sequence".into()))?;
        let config = BufferConfig::default();
        let alloc = HostAllocation::from_exact_iter(iter, config.max_allocation_bytes)?;
        // The iterator may have yielded fewer elements than it announced.
        let shape = if alloc.len() == shape.count() {
            shape
        } else {
            Shape::linear(alloc.len())?
        };
        Ok(Self::with_storage(shape, Storage::Owned(alloc), &config))
    }
}

impl<T: Element, const D: usize> Drop for Buffer<'_, T, D> {
    fn drop(&mut self) {
        let kind = self.storage.kind();
        let _span = observability::instrument_teardown(self.id, kind);

        let sink = std::mem::replace(&mut self.sink, WriteBackSink::None);
        if self.modified {
            let target = sink.as_str();
            match sink.fire(self.storage.as_slice()) {
                WriteBackOutcome::Disabled => {}
                WriteBackOutcome::Written(count) => {
                    let bytes = count * std::mem::size_of::<T>();
                    tracing::debug!(sink = target, bytes, "wrote back buffer contents");
                    observability::record_write_back(target, bytes);
                }
                WriteBackOutcome::TargetReleased => {
                    tracing::debug!(sink = target, "write-back target already released, skipping");
                    observability::record_write_back_skipped(target);
                }
            }
        }

        tracing::trace!(release = ?kind.release_rule(), "releasing storage");
        observability::record_buffer_released(kind);
    }
}

impl<T: Element, const D: usize> fmt::Debug for Buffer<'_, T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("element", &std::any::type_name::<T>())
            .field("storage", &self.storage.kind())
            .field("modified", &self.modified)
            .field("copy_on_write_pending", &self.copy_on_write_pending)
            .field("sink", &self.sink.as_str())
            .finish()
    }
}

fn check_len<const D: usize>(actual: usize, shape: &Shape<D>) -> Result<usize> {
    let expected = shape.count();
    if actual < expected {
        return Err(Error::LengthMismatch { expected, actual });
    }
    Ok(expected)
}

/// Privileged access to a buffer's storage and state flags.
///
/// Only the access tracker and the task hook obtain one (through
/// [`Buffer::grant`]); everything else sees the buffer's public surface.
pub(crate) struct StorageGrant<'g, 'a, T: Element, const D: usize> {
    buffer: &'g mut Buffer<'a, T, D>,
}

impl<'g, 'a, T: Element, const D: usize> StorageGrant<'g, 'a, T, D> {
    pub(crate) fn id(&self) -> BufferId {
        self.buffer.id
    }

    pub(crate) fn storage_kind(&self) -> StorageKind {
        self.buffer.storage.kind()
    }

    pub(crate) fn set_modified(&mut self) {
        self.buffer.modified = true;
    }

    /// Copy read-only borrowed elements into owned storage, once.
    ///
    /// Returns `true` if a copy was made.
    pub(crate) fn promote_if_pending(&mut self) -> Result<bool> {
        if !self.buffer.copy_on_write_pending {
            return Ok(false);
        }
        self.buffer
            .storage
            .promote_to_owned(self.buffer.max_allocation_bytes)?;
        self.buffer.copy_on_write_pending = false;
        Ok(true)
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.buffer.byte_size()
    }

    pub(crate) fn into_view(self) -> &'g [T] {
        let buffer = self.buffer;
        buffer.storage.as_slice()
    }

    pub(crate) fn into_mut_view(self) -> Option<&'g mut [T]> {
        let buffer = self.buffer;
        buffer.storage.as_mut_slice()
    }
}
