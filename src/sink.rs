//! Write-back destinations.
//!
//! A buffer may carry one write-back sink. When a modified buffer is torn
//! down, the sink receives a copy of the buffer's elements; an unmodified
//! buffer never writes back.
//!
//! Callers describe the destination with [`FinalData`]; the buffer validates
//! it into an internal sink at installation time, so a destination that
//! cannot receive the data is rejected where it is set, not at teardown.

use crate::error::{Error, Result};
use crate::memory::{Element, HostBlock};
use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

/// Where a buffer's contents go when it is torn down.
///
/// # Example
///
/// ```rust
/// use hetbuf::{Buffer, FinalData, Shape, memory::HostBlock};
/// use std::sync::Arc;
///
/// let dest = Arc::new(HostBlock::from_vec(vec![0u32; 3]));
/// let mut buffer = Buffer::<u32>::from_shape(Shape::new([3]).unwrap()).unwrap();
/// buffer.set_final_data(FinalData::Strong(Arc::clone(&dest))).unwrap();
/// ```
pub enum FinalData<'d, T> {
    /// No write-back.
    None,
    /// Copy into the block if it is still alive at teardown.
    ///
    /// The copy happens during teardown, on whichever thread drops the last
    /// holder. If the block also backs a buffer built with
    /// [`Buffer::from_shared`](crate::Buffer::from_shared), that buffer's
    /// safety contract applies: no accessor of it may be live while this
    /// write-back runs.
    Weak(Weak<HostBlock<T>>),
    /// Copy into the block.
    ///
    /// The same rule as for [`FinalData::Weak`] applies to blocks that also
    /// back another buffer.
    Strong(Arc<HostBlock<T>>),
    /// Copy sequentially from an output position in a caller slice.
    Cursor(OutputCursor<'d>),
}

impl<T> From<Weak<HostBlock<T>>> for FinalData<'_, T> {
    fn from(target: Weak<HostBlock<T>>) -> Self {
        FinalData::Weak(target)
    }
}

impl<T> From<Arc<HostBlock<T>>> for FinalData<'_, T> {
    fn from(target: Arc<HostBlock<T>>) -> Self {
        FinalData::Strong(target)
    }
}

impl<'d, T> From<OutputCursor<'d>> for FinalData<'d, T> {
    fn from(cursor: OutputCursor<'d>) -> Self {
        FinalData::Cursor(cursor)
    }
}

/// An output position inside a caller-owned slice of any element type.
///
/// The element type is erased so that a cursor over the wrong type can be
/// reported as [`Error::SinkTypeMismatch`] when it is installed.
///
/// # Example
///
/// ```rust
/// use hetbuf::OutputCursor;
///
/// let mut dest = [0u16; 8];
/// let cursor = OutputCursor::at(&mut dest, 2);
/// assert_eq!(cursor.remaining(), 6);
/// assert_eq!(cursor.element_type_name(), "u16");
/// ```
pub struct OutputCursor<'d> {
    ptr: NonNull<u8>,
    remaining: usize,
    element: TypeId,
    element_name: &'static str,
    _marker: PhantomData<&'d mut [u8]>,
}

impl<'d> OutputCursor<'d> {
    /// A cursor at the start of `dest`.
    pub fn new<U: Element>(dest: &'d mut [U]) -> Self {
        Self::at(dest, 0)
    }

    /// A cursor at `position` in `dest`.
    ///
    /// # Panics
    ///
    /// Panics if `position > dest.len()`.
    pub fn at<U: Element>(dest: &'d mut [U], position: usize) -> Self {
        let tail = &mut dest[position..];
        Self {
            ptr: NonNull::from(&mut *tail).cast::<u8>(),
            remaining: tail.len(),
            element: TypeId::of::<U>(),
            element_name: std::any::type_name::<U>(),
            _marker: PhantomData,
        }
    }

    /// Elements between the cursor and the end of the destination.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Name of the destination's element type.
    pub fn element_type_name(&self) -> &'static str {
        self.element_name
    }

    /// Recover the typed destination if it holds `T`s.
    fn downcast<T: Element>(self) -> Result<&'d mut [T]> {
        if self.element != TypeId::of::<T>() {
            return Err(Error::SinkTypeMismatch {
                expected: std::any::type_name::<T>(),
                found: self.element_name,
            });
        }
        // SAFETY: the pointer and length came from a `&'d mut [U]` with
        // `TypeId::of::<U>() == TypeId::of::<T>()`, so `U` is `T`.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<T>(), self.remaining) })
    }
}

impl std::fmt::Debug for OutputCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCursor")
            .field("remaining", &self.remaining)
            .field("element", &self.element_name)
            .finish()
    }
}

/// A validated write-back sink.
pub(crate) enum WriteBackSink<'d, T> {
    None,
    Weak(Weak<HostBlock<T>>),
    Strong(Arc<HostBlock<T>>),
    Cursor(&'d mut [T]),
}

/// What firing a sink did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteBackOutcome {
    /// No sink was installed.
    Disabled,
    /// The elements were copied to the destination.
    Written(usize),
    /// The weak destination had already been released.
    TargetReleased,
}

impl<'d, T: Element> WriteBackSink<'d, T> {
    /// Validate `data` for a buffer of `count` elements.
    pub(crate) fn validate(data: FinalData<'d, T>, count: usize) -> Result<Self> {
        let check = |available: usize| {
            if available < count {
                Err(Error::SinkTooSmall {
                    required: count,
                    available,
                })
            } else {
                Ok(())
            }
        };

        match data {
            FinalData::None => Ok(WriteBackSink::None),
            FinalData::Weak(target) => {
                // A target that is already gone is accepted; firing skips it.
                if let Some(block) = target.upgrade() {
                    check(block.len())?;
                }
                Ok(WriteBackSink::Weak(target))
            }
            FinalData::Strong(block) => {
                check(block.len())?;
                Ok(WriteBackSink::Strong(block))
            }
            FinalData::Cursor(cursor) => {
                let dest = cursor.downcast::<T>()?;
                check(dest.len())?;
                Ok(WriteBackSink::Cursor(&mut dest[..count]))
            }
        }
    }

    pub(crate) fn is_some(&self) -> bool {
        !matches!(self, WriteBackSink::None)
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            WriteBackSink::None => "none",
            WriteBackSink::Weak(_) => "weak",
            WriteBackSink::Strong(_) => "strong",
            WriteBackSink::Cursor(_) => "cursor",
        }
    }

    /// Copy `src` to the destination.
    ///
    /// Consumes the sink, so a sink fires at most once.
    pub(crate) fn fire(self, src: &[T]) -> WriteBackOutcome {
        match self {
            WriteBackSink::None => WriteBackOutcome::Disabled,
            WriteBackSink::Weak(target) => match target.upgrade() {
                Some(block) => copy_to_block(src, &block),
                None => WriteBackOutcome::TargetReleased,
            },
            WriteBackSink::Strong(block) => copy_to_block(src, &block),
            WriteBackSink::Cursor(dest) => {
                dest.copy_from_slice(src);
                WriteBackOutcome::Written(src.len())
            }
        }
    }
}

fn copy_to_block<T: Element>(src: &[T], block: &HostBlock<T>) -> WriteBackOutcome {
    WriteBackOutcome::Written(block.write_back_from(src))
}
