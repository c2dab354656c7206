//! Host memory shared between a buffer and the code that created it.

use super::Element;
use std::cell::UnsafeCell;
use std::sync::{Mutex, PoisonError};

/// A block of host elements meant to live behind an `Arc`.
///
/// `HostBlock` is the shared backing of
/// [`Buffer::from_shared`](crate::Buffer::from_shared) and the destination of
/// strong and weak write-back sinks. Several holders can reach the same
/// elements, so the views taken through `&self` are `unsafe`: holders must
/// not mutate the block concurrently with another holder's access. Exclusive
/// access (`&mut self`, for example through [`std::sync::Arc::get_mut`]) is
/// always safe.
///
/// Write-backs into the block are serialized: two buffers tearing down
/// into the same block on different threads never interleave their copies.
///
/// # Example
///
/// ```rust
/// use hetbuf::memory::HostBlock;
/// use std::sync::Arc;
///
/// let mut block = Arc::new(HostBlock::from_vec(vec![0u8; 4]));
/// Arc::get_mut(&mut block).unwrap().get_mut()[0] = 7;
/// assert_eq!(Arc::try_unwrap(block).ok().unwrap().into_vec(), vec![7, 0, 0, 0]);
/// ```
pub struct HostBlock<T> {
    data: Box<[UnsafeCell<T>]>,
    write_back: Mutex<()>,
}

// SAFETY: the block owns its elements; moving it moves `T`s.
unsafe impl<T: Send> Send for HostBlock<T> {}

// SAFETY: shared views are only reachable through `unsafe` methods whose
// contract forbids conflicting concurrent access, and write-backs hold
// `write_back` for the whole copy.
unsafe impl<T: Send + Sync> Sync for HostBlock<T> {}

impl<T: Element> HostBlock<T> {
    /// Create a block of `len` default-valued elements.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![T::default(); len])
    }
}

impl<T> HostBlock<T> {
    /// Take ownership of `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            data: data.into_iter().map(UnsafeCell::new).collect(),
            write_back: Mutex::new(()),
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the block holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pointer to the first element.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.as_mut_ptr()
    }

    /// Mutable pointer to the first element.
    ///
    /// Writing through it is subject to the same contract as
    /// [`HostBlock::as_mut_slice`].
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut T {
        // `UnsafeCell<T>` has the same layout as `T`.
        UnsafeCell::raw_get(self.data.as_ptr())
    }

    /// View the elements.
    ///
    /// # Safety
    ///
    /// No other holder may mutate the block while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[T] {
        // SAFETY: caller guarantees no concurrent mutation.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// View the elements mutably.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the elements for the
    /// lifetime of the slice; no other holder may read or write them.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [T] {
        // SAFETY: caller guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len()) }
    }

    /// Copy `src` into the front of the block, one write-back at a time.
    ///
    /// Elements past the end of the block are dropped. Returns the number
    /// of elements copied.
    pub(crate) fn write_back_from(&self, src: &[T]) -> usize
    where
        T: Copy,
    {
        let src = &src[..src.len().min(self.len())];
        // A buffer over this block writing back into it: the elements are
        // already in place.
        if std::ptr::eq(src.as_ptr(), self.as_ptr()) {
            return src.len();
        }
        let _guard = self.write_back.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: `src` fits in the block and does not start at it;
        // `ptr::copy` tolerates other overlaps.
        // Concurrent write-backs wait on `write_back`; other accesses are
        // excluded by the contracts of `as_slice`, `as_mut_slice` and
        // `Buffer::from_shared`.
        unsafe { std::ptr::copy(src.as_ptr(), self.as_mut_ptr(), src.len()) };
        src.len()
    }

    /// View the elements mutably through exclusive ownership.
    pub fn get_mut(&mut self) -> &mut [T] {
        // SAFETY: `&mut self` rules out every other view.
        unsafe { self.as_mut_slice() }
    }

    /// Unwrap the elements.
    pub fn into_vec(self) -> Vec<T> {
        self.data
            .into_vec()
            .into_iter()
            .map(UnsafeCell::into_inner)
            .collect()
    }
}

impl<T> From<Vec<T>> for HostBlock<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

impl<T> std::fmt::Debug for HostBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBlock")
            .field("len", &self.data.len())
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}
