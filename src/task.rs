//! Registering buffers with tasks.
//!
//! A scheduler that runs tasks over buffers implements [`TaskBuilder`].
//! Each time a task is given access to a buffer, the buffer hands the
//! builder a [`BufferDependency`]: a type-erased holder that keeps the
//! buffer alive until the task drops it. The scheduler uses the dependency
//! to order tasks over the same buffer; dropping it when the task finishes
//! is what lets the buffer's teardown run.

use crate::access::{self, AccessMode, AccessTarget};
use crate::buffer::BufferId;
use crate::error::Result;
use crate::memory::Element;
use crate::teardown::{BufferCell, SharedBuffer};
use std::fmt;
use std::sync::Arc;

/// A buffer seen without its element type or dimensionality.
pub trait BufferBase: Send + Sync {
    /// The buffer's identifier.
    fn id(&self) -> BufferId;

    /// Size of the buffer's elements in bytes.
    fn byte_size(&self) -> usize;

    /// Name of the element type.
    fn element_type_name(&self) -> &'static str;
}

impl<T: Element, const D: usize> BufferBase for BufferCell<T, D> {
    fn id(&self) -> BufferId {
        self.id
    }

    fn byte_size(&self) -> usize {
        self.byte_size
    }

    fn element_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A task's hold on a buffer.
///
/// Keeps the buffer alive. The buffer's teardown cannot run while any
/// dependency on it exists.
#[derive(Clone)]
pub struct BufferDependency {
    buffer: Arc<dyn BufferBase>,
}

impl BufferDependency {
    /// The buffer's identifier.
    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    /// Size of the buffer's elements in bytes.
    pub fn byte_size(&self) -> usize {
        self.buffer.byte_size()
    }

    /// Name of the buffer's element type.
    pub fn element_type_name(&self) -> &'static str {
        self.buffer.element_type_name()
    }

    /// The type-erased buffer.
    pub fn buffer(&self) -> &Arc<dyn BufferBase> {
        &self.buffer
    }
}

impl fmt::Debug for BufferDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferDependency")
            .field("id", &self.id())
            .field("element", &self.element_type_name())
            .field("byte_size", &self.byte_size())
            .finish()
    }
}

/// Something that assembles a task from the buffers it uses.
pub trait TaskBuilder {
    /// What registering a buffer yields, such as the task handle or an
    /// edge in the scheduler's graph.
    type Task;

    /// Register `buffer` with the task being built.
    ///
    /// `is_write` is true for write-capable accesses.
    fn add_buffer(&mut self, buffer: BufferDependency, is_write: bool) -> Self::Task;
}

/// Register `buffer` with the task `builder` is building.
///
/// The builder receives a new holder of the buffer.
pub fn attach_to_task<T, const D: usize, B>(
    buffer: &SharedBuffer<T, D>,
    builder: &mut B,
    is_write: bool,
) -> B::Task
where
    T: Element,
    B: TaskBuilder + ?Sized,
{
    tracing::trace!(buffer = %buffer.id(), is_write, "buffer attached to task");
    builder.add_buffer(buffer.dependency(), is_write)
}

impl<T: Element, const D: usize> SharedBuffer<T, D> {
    /// A new type-erased holder of this buffer.
    pub fn dependency(&self) -> BufferDependency {
        let cell: Arc<BufferCell<T, D>> = Arc::clone(self.cell());
        BufferDependency { buffer: cell }
    }

    /// Give the task `builder` is building access to this buffer.
    ///
    /// Tracks `mode` on the buffer (marking it modified, and promoting
    /// read-only memory, for write-capable modes), then registers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`](crate::Error::AllocationFailed) if
    /// copy-on-write promotion fails. Nothing is registered then.
    pub fn register_access<B>(
        &self,
        builder: &mut B,
        mode: AccessMode,
        target: AccessTarget,
    ) -> Result<B::Task>
    where
        B: TaskBuilder + ?Sized,
    {
        {
            let mut buffer = self.lock();
            access::track(&mut buffer.grant(), mode, target)?;
        }
        Ok(attach_to_task(self, builder, mode.is_write_capable()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::memory::StorageKind;
    use crate::shape::Shape;

    #[derive(Default)]
    struct RecordingBuilder {
        added: Vec<(BufferDependency, bool)>,
    }

    impl TaskBuilder for RecordingBuilder {
        type Task = usize;

        fn add_buffer(&mut self, buffer: BufferDependency, is_write: bool) -> usize {
            self.added.push((buffer, is_write));
            self.added.len() - 1
        }
    }

    fn shared() -> SharedBuffer<f32, 2> {
        SharedBuffer::new(Buffer::from_shape(Shape::new([2, 3]).unwrap()).unwrap())
    }

    #[test]
    fn test_attach_passes_holder_and_flag() {
        let buffer = shared();
        let mut builder = RecordingBuilder::default();

        assert_eq!(attach_to_task(&buffer, &mut builder, true), 0);
        assert_eq!(attach_to_task(&buffer, &mut builder, false), 1);

        assert_eq!(builder.added[0].0.id(), buffer.id());
        assert!(builder.added[0].1);
        assert!(!builder.added[1].1);
        assert_eq!(buffer.holder_count(), 3);
    }

    #[test]
    fn test_dependency_erases_type() {
        let buffer = shared();
        let dep = buffer.dependency();
        assert_eq!(dep.element_type_name(), "f32");
        assert_eq!(dep.byte_size(), 24);
    }

    #[test]
    fn test_dependency_keeps_buffer_alive() {
        let buffer = shared();
        let dep = buffer.dependency();
        drop(buffer);
        assert_eq!(Arc::strong_count(dep.buffer()), 1);
    }

    #[test]
    fn test_register_write_access_marks_modified() {
        let buffer = shared();
        let mut builder = RecordingBuilder::default();
        buffer
            .register_access(&mut builder, AccessMode::Write, AccessTarget::GlobalBuffer)
            .unwrap();
        assert!(buffer.lock().is_modified());
        assert!(builder.added[0].1);
    }

    #[test]
    fn test_register_read_access_leaves_buffer_clean() {
        let data: &'static [u32] = &[1, 2, 3];
        let buffer = SharedBuffer::new(Buffer::from_const_host_slice(data, Shape::new([3]).unwrap()).unwrap());
        let mut builder = RecordingBuilder::default();
        buffer
            .register_access(&mut builder, AccessMode::Read, AccessTarget::ConstantBuffer)
            .unwrap();

        let locked = buffer.lock();
        assert!(!locked.is_modified());
        assert_eq!(locked.storage_kind(), StorageKind::BorrowedConst);
        assert!(!builder.added[0].1);
    }

    #[test]
    fn test_task_holder_drives_teardown_signal() {
        let buffer = shared();
        let mut builder = RecordingBuilder::default();
        buffer
            .register_access(&mut builder, AccessMode::ReadWrite, AccessTarget::GlobalBuffer)
            .unwrap();

        // Owned storage and no sink: nothing to publish even with a task
        // holding the buffer.
        assert!(buffer.request_completion_signal().is_none());
        builder.added.clear();
        assert_eq!(buffer.holder_count(), 1);
    }
}
