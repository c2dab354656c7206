//! Buffer-owned host allocations.

use super::Element;
use super::defaults::{DEFAULT_MAX_ALLOCATION_BYTES, bytes_for};
use crate::error::{Error, Result};

/// A block of elements allocated and owned by a buffer.
///
/// Allocation is fallible: the reservation goes through
/// [`Vec::try_reserve_exact`], so an out-of-memory condition surfaces as
/// [`Error::AllocationFailed`] instead of aborting.
///
/// # Example
///
/// ```rust
/// use hetbuf::memory::HostAllocation;
///
/// let alloc = HostAllocation::<f32>::new(1024).unwrap();
/// assert_eq!(alloc.len(), 1024);
/// assert_eq!(alloc.byte_size(), 4096);
/// ```
pub struct HostAllocation<T> {
    /// Boxed slice so the block is never reallocated.
    data: Box<[T]>,
}

impl<T: Element> HostAllocation<T> {
    /// Allocate `count` default-valued elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte size overflows or the allocator fails.
    pub fn new(count: usize) -> Result<Self> {
        Self::with_limit(count, DEFAULT_MAX_ALLOCATION_BYTES)
    }

    /// Allocate `count` default-valued elements, refusing anything larger
    /// than `max_bytes`.
    pub fn with_limit(count: usize, max_bytes: usize) -> Result<Self> {
        let mut data = reserve::<T>(count, max_bytes)?;
        data.resize(count, T::default());
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// Allocate a copy of `src`.
    pub fn copy_of(src: &[T], max_bytes: usize) -> Result<Self> {
        let mut data = reserve::<T>(src.len(), max_bytes)?;
        data.extend_from_slice(src);
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// Allocate room for every element of `iter`, then copy them in order.
    ///
    /// The allocation happens before the first element is consumed.
    pub fn from_exact_iter<I>(iter: I, max_bytes: usize) -> Result<Self>
    where
        I: ExactSizeIterator<Item = T>,
    {
        let mut data = reserve::<T>(iter.len(), max_bytes)?;
        data.extend(iter);
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }
}

impl<T> HostAllocation<T> {
    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the allocation holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the allocation in bytes.
    #[inline]
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(&*self.data)
    }

    /// The elements.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The elements, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> std::fmt::Debug for HostAllocation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAllocation")
            .field("len", &self.data.len())
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}

/// Reserve an empty vector with capacity for exactly `count` elements.
fn reserve<T>(count: usize, max_bytes: usize) -> Result<Vec<T>> {
    let bytes = bytes_for::<T>(count).ok_or_else(|| {
        Error::AllocationFailed(format!(
            "{} elements of {} bytes overflow the address space",
            count,
            std::mem::size_of::<T>()
        ))
    })?;
    if bytes > max_bytes {
        return Err(Error::AllocationFailed(format!(
            "{} bytes exceeds the allocation limit of {} bytes",
            bytes, max_bytes
        )));
    }

    let mut data = Vec::new();
    data.try_reserve_exact(count)
        .map_err(|e| Error::AllocationFailed(e.to_string()))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_default_filled() {
        let alloc = HostAllocation::<u32>::new(16).unwrap();
        assert_eq!(alloc.len(), 16);
        assert!(alloc.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_allocation_byte_size() {
        let alloc = HostAllocation::<u64>::new(10).unwrap();
        assert_eq!(alloc.byte_size(), 80);
    }

    #[test]
    fn test_allocation_limit() {
        let result = HostAllocation::<u32>::with_limit(100, 399);
        assert!(matches!(result, Err(Error::AllocationFailed(_))));
        assert!(HostAllocation::<u32>::with_limit(100, 400).is_ok());
    }

    #[test]
    fn test_allocation_overflow() {
        let result = HostAllocation::<u64>::with_limit(usize::MAX, usize::MAX);
        assert!(matches!(result, Err(Error::AllocationFailed(_))));
    }

    #[test]
    fn test_copy_of() {
        let alloc = HostAllocation::copy_of(&[1u8, 2, 3], usize::MAX).unwrap();
        assert_eq!(alloc.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_from_exact_iter_keeps_order() {
        let alloc = HostAllocation::from_exact_iter((0..5u16).rev(), usize::MAX).unwrap();
        assert_eq!(alloc.as_slice(), &[4, 3, 2, 1, 0]);
    }
}
