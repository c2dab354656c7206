//! Access modes and the state transitions they drive.
//!
//! Every capability created against a buffer (a host accessor, or a task's
//! registration of the buffer) declares an [`AccessMode`]. The buffer reacts
//! in [`Buffer::track_access_mode`]:
//!
//! - a write-capable mode marks the buffer modified and, for a buffer over
//!   read-only memory, copies the elements into owned storage the first
//!   time;
//! - a read-only mode changes nothing.

use crate::buffer::{Buffer, StorageGrant};
use crate::error::Result;
use crate::memory::Element;
use crate::observability;
use std::ops::{Deref, DerefMut};

/// How a capability intends to use a buffer's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
    /// Write, without needing the previous contents.
    DiscardWrite,
    /// Read and write, without needing the previous contents.
    DiscardReadWrite,
    /// Atomic read-modify-write.
    Atomic,
}

impl AccessMode {
    /// Every access mode.
    pub const ALL: [AccessMode; 6] = [
        AccessMode::Read,
        AccessMode::Write,
        AccessMode::ReadWrite,
        AccessMode::DiscardWrite,
        AccessMode::DiscardReadWrite,
        AccessMode::Atomic,
    ];

    /// Can a capability with this mode modify the elements?
    #[inline]
    pub fn is_write_capable(&self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    /// Short lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::ReadWrite => "read_write",
            AccessMode::DiscardWrite => "discard_write",
            AccessMode::DiscardReadWrite => "discard_read_write",
            AccessMode::Atomic => "atomic",
        }
    }
}

/// The write-capable subset of [`AccessMode`], for host accessors that hand
/// out `&mut [T]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
    /// Write, without needing the previous contents.
    DiscardWrite,
    /// Read and write, without needing the previous contents.
    DiscardReadWrite,
    /// Atomic read-modify-write.
    Atomic,
}

impl From<WriteMode> for AccessMode {
    fn from(mode: WriteMode) -> Self {
        match mode {
            WriteMode::Write => AccessMode::Write,
            WriteMode::ReadWrite => AccessMode::ReadWrite,
            WriteMode::DiscardWrite => AccessMode::DiscardWrite,
            WriteMode::DiscardReadWrite => AccessMode::DiscardReadWrite,
            WriteMode::Atomic => AccessMode::Atomic,
        }
    }
}

/// Where a capability accesses the buffer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessTarget {
    /// Host code, through a [`HostAccessor`] or [`HostAccessorMut`].
    #[default]
    HostBuffer,
    /// Device global memory, from a task.
    GlobalBuffer,
    /// Device constant memory, from a task.
    ConstantBuffer,
    /// Work-group local memory, from a task.
    Local,
}

impl AccessTarget {
    /// Is the access made by host code?
    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self, AccessTarget::HostBuffer)
    }

    /// Short lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTarget::HostBuffer => "host_buffer",
            AccessTarget::GlobalBuffer => "global_buffer",
            AccessTarget::ConstantBuffer => "constant_buffer",
            AccessTarget::Local => "local",
        }
    }
}

/// Log an access to the buffer behind `grant`.
fn trace_access<T: Element, const D: usize>(
    grant: &StorageGrant<'_, '_, T, D>,
    mode: AccessMode,
    target: AccessTarget,
) {
    let _span = observability::span_buffer(grant.id(), grant.storage_kind()).entered();
    tracing::trace!(mode = mode.as_str(), target = target.as_str(), "access tracked");
}

/// Apply an access to the buffer behind `grant`.
pub(crate) fn track<T: Element, const D: usize>(
    grant: &mut StorageGrant<'_, '_, T, D>,
    mode: AccessMode,
    target: AccessTarget,
) -> Result<()> {
    trace_access(grant, mode, target);
    if !mode.is_write_capable() {
        return Ok(());
    }

    grant.set_modified();
    if grant.promote_if_pending()? {
        let bytes = grant.byte_size();
        tracing::debug!(buffer = %grant.id(), bytes, "copy-on-write: promoted read-only host memory to owned storage");
        observability::record_promotion(bytes);
    }
    Ok(())
}

impl<'a, T: Element, const D: usize> Buffer<'a, T, D> {
    /// Record that a capability with `mode` was created for `target`.
    ///
    /// This is the hook for code that builds its own capabilities;
    /// [`Buffer::host_read`], [`Buffer::host_write`] and
    /// [`SharedBuffer::register_access`](crate::SharedBuffer::register_access)
    /// call it for you.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`](crate::Error::AllocationFailed) if
    /// copy-on-write promotion cannot allocate. The buffer is then marked
    /// modified but keeps its read-only backing, and the next write-capable
    /// access retries the promotion.
    pub fn track_access_mode(&mut self, mode: AccessMode, target: AccessTarget) -> Result<()> {
        track(&mut self.grant(), mode, target)
    }

    /// Create a read-only host accessor.
    ///
    /// Reading changes no buffer state: a buffer over read-only memory keeps
    /// reading it in place.
    pub fn host_read(&mut self) -> HostAccessor<'_, T> {
        let grant = self.grant();
        trace_access(&grant, AccessMode::Read, AccessTarget::HostBuffer);
        HostAccessor {
            slice: grant.into_view(),
        }
    }

    /// Create a writable host accessor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`](crate::Error::AllocationFailed) if
    /// copy-on-write promotion cannot allocate.
    pub fn host_write(&mut self, mode: WriteMode) -> Result<HostAccessorMut<'_, T>> {
        let mut grant = self.grant();
        track(&mut grant, mode.into(), AccessTarget::HostBuffer)?;
        match grant.into_mut_view() {
            Some(slice) => Ok(HostAccessorMut { mode, slice }),
            None => unreachable!("write-capable access leaves the buffer writable"),
        }
    }
}

/// Read-only host view of a buffer's elements, in linear index order.
///
/// Dereferences to `[T]`.
pub struct HostAccessor<'b, T> {
    slice: &'b [T],
}

impl<'b, T> HostAccessor<'b, T> {
    /// The elements.
    pub fn as_slice(&self) -> &'b [T] {
        self.slice
    }
}

impl<T> Deref for HostAccessor<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.slice
    }
}

impl<T> std::fmt::Debug for HostAccessor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAccessor")
            .field("len", &self.slice.len())
            .finish()
    }
}

/// Writable host view of a buffer's elements, in linear index order.
///
/// Dereferences to `[T]` and `mut [T]`.
pub struct HostAccessorMut<'b, T> {
    mode: WriteMode,
    slice: &'b mut [T],
}

impl<T> HostAccessorMut<'_, T> {
    /// The mode this accessor was created with.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// The elements.
    pub fn as_slice(&self) -> &[T] {
        self.slice
    }

    /// The elements, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.slice
    }
}

impl<T> Deref for HostAccessorMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.slice
    }
}

impl<T> DerefMut for HostAccessorMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.slice
    }
}

impl<T> std::fmt::Debug for HostAccessorMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAccessorMut")
            .field("mode", &self.mode)
            .field("len", &self.slice.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StorageKind;
    use crate::shape::Shape;

    #[test]
    fn test_write_capable_classification() {
        let writers: Vec<_> = AccessMode::ALL
            .iter()
            .filter(|m| m.is_write_capable())
            .collect();
        assert_eq!(writers.len(), 5);
        assert!(!AccessMode::Read.is_write_capable());
    }

    #[test]
    fn test_read_access_changes_nothing() {
        let data = [1u8, 2, 3];
        let mut buffer = Buffer::from_const_host_slice(&data, Shape::new([3]).unwrap()).unwrap();
        buffer
            .track_access_mode(AccessMode::Read, AccessTarget::GlobalBuffer)
            .unwrap();
        assert!(!buffer.is_modified());
        assert!(buffer.is_copy_on_write_pending());
        assert_eq!(buffer.storage_kind(), StorageKind::BorrowedConst);
    }

    #[test]
    fn test_every_write_mode_promotes() {
        let data = [4u8, 5];
        for mode in AccessMode::ALL.into_iter().filter(AccessMode::is_write_capable) {
            let mut buffer = Buffer::from_const_host_slice(&data, Shape::new([2]).unwrap()).unwrap();
            buffer.track_access_mode(mode, AccessTarget::HostBuffer).unwrap();
            assert!(buffer.is_modified(), "{:?}", mode);
            assert_eq!(buffer.storage_kind(), StorageKind::Owned, "{:?}", mode);
        }
    }

    #[test]
    fn test_modified_survives_reads() {
        let mut buffer = Buffer::<u32>::from_shape(Shape::new([2]).unwrap()).unwrap();
        buffer
            .track_access_mode(AccessMode::Atomic, AccessTarget::GlobalBuffer)
            .unwrap();
        for _ in 0..3 {
            buffer
                .track_access_mode(AccessMode::Read, AccessTarget::HostBuffer)
                .unwrap();
        }
        assert!(buffer.is_modified());
    }

    #[test]
    fn test_read_accessor_views_elements() {
        let data = [1u8, 2];
        let mut buffer = Buffer::from_const_host_slice(&data, Shape::new([2]).unwrap()).unwrap();
        let acc = buffer.host_read();
        assert_eq!(acc.as_slice(), &[1, 2]);
        assert_eq!(acc[1], 2);
        assert_eq!(acc.len(), 2);
        assert!(!buffer.is_modified());
        assert_eq!(buffer.storage_kind(), StorageKind::BorrowedConst);
    }

    #[test]
    fn test_write_modes_map_to_write_capable_access() {
        let modes = [
            WriteMode::Write,
            WriteMode::ReadWrite,
            WriteMode::DiscardWrite,
            WriteMode::DiscardReadWrite,
            WriteMode::Atomic,
        ];
        for mode in modes {
            assert!(AccessMode::from(mode).is_write_capable(), "{:?}", mode);
        }
    }

    #[test]
    fn test_write_accessor_mutates() {
        let mut buffer = Buffer::from_elements([0i32; 4]).unwrap();
        {
            let mut acc = buffer.host_write(WriteMode::DiscardWrite).unwrap();
            assert_eq!(acc.mode(), WriteMode::DiscardWrite);
            acc.fill(7);
            acc[0] = 1;
        }
        assert!(buffer.is_modified());
        let acc = buffer.host_read();
        assert_eq!(acc.as_slice(), &[1, 7, 7, 7]);
    }

    #[test]
    fn test_write_accessor_promotes_const_memory() {
        let data = [3u16, 4];
        let mut buffer = Buffer::from_const_host_slice(&data, Shape::new([2]).unwrap()).unwrap();
        buffer.host_write(WriteMode::ReadWrite).unwrap()[1] = 40;
        assert_eq!(buffer.storage_kind(), StorageKind::Owned);
        assert_eq!(buffer.host_read().as_slice(), &[3, 40]);
        assert_eq!(data, [3, 4]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_access_logged_inside_buffer_span() {
        let data = [1u8, 2];
        let mut buffer = Buffer::from_const_host_slice(&data, Shape::new([2]).unwrap()).unwrap();
        buffer.host_write(WriteMode::Write).unwrap();

        // The span records the backing as it was when the access began.
        assert!(logs_contain("buffer{"));
        assert!(logs_contain("storage=borrowed_const"));
        assert!(logs_contain("access tracked"));
    }

    #[test]
    fn test_promotion_respects_allocation_limit() {
        let data = [0u64; 4];
        let config = crate::BufferConfig::default().with_max_allocation_bytes(16);
        let mut buffer = Buffer::from_const_host_slice(&data, Shape::new([4]).unwrap())
            .unwrap()
            .with_config(&config);

        let result = buffer.track_access_mode(AccessMode::Write, AccessTarget::HostBuffer);
        assert!(matches!(result, Err(crate::Error::AllocationFailed(_))));
        assert!(buffer.is_copy_on_write_pending());
        assert_eq!(buffer.storage_kind(), StorageKind::BorrowedConst);
    }
}
