//! The tagged storage backing of a buffer.

use super::{Element, HostAllocation, HostBlock, StorageKind};
use crate::error::Result;
use std::sync::Arc;

/// Where a buffer's elements live.
///
/// Every variant holds exactly `count` elements as seen by the buffer:
/// caller-provided backings are cut down to the shape's count when the
/// buffer is built, except shared blocks, which are viewed through their
/// first `count` elements on every access.
pub(crate) enum Storage<'a, T> {
    Owned(HostAllocation<T>),
    Borrowed(&'a mut [T]),
    BorrowedConst(&'a [T]),
    SharedExternal {
        block: Arc<HostBlock<T>>,
        count: usize,
    },
    UniqueExternal(Box<[T]>),
}

impl<'a, T: Element> Storage<'a, T> {
    pub(crate) fn kind(&self) -> StorageKind {
        match self {
            Storage::Owned(_) => StorageKind::Owned,
            Storage::Borrowed(_) => StorageKind::Borrowed,
            Storage::BorrowedConst(_) => StorageKind::BorrowedConst,
            Storage::SharedExternal { .. } => StorageKind::SharedExternal,
            Storage::UniqueExternal(_) => StorageKind::UniqueExternal,
        }
    }

    /// The current view of the elements.
    pub(crate) fn as_slice(&self) -> &[T] {
        match self {
            Storage::Owned(alloc) => alloc.as_slice(),
            Storage::Borrowed(slice) => &**slice,
            Storage::BorrowedConst(slice) => *slice,
            // SAFETY: co-owners of a shared block must not mutate it while a
            // buffer over it is being accessed; see `Buffer::from_shared`.
            Storage::SharedExternal { block, count } => unsafe { &block.as_slice()[..*count] },
            Storage::UniqueExternal(data) => &**data,
        }
    }

    /// The current view of the elements, if the backing may be written.
    pub(crate) fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match self {
            Storage::Owned(alloc) => Some(alloc.as_mut_slice()),
            Storage::Borrowed(slice) => Some(&mut **slice),
            Storage::BorrowedConst(_) => None,
            // SAFETY: as for `as_slice`; the `&mut self` receiver serializes
            // this buffer's own accesses.
            Storage::SharedExternal { block, count } => {
                Some(unsafe { &mut block.as_mut_slice()[..*count] })
            }
            Storage::UniqueExternal(data) => Some(&mut **data),
        }
    }

    /// Replace the current backing with an owned copy of its elements.
    ///
    /// Returns the kind that was replaced.
    pub(crate) fn promote_to_owned(&mut self, max_bytes: usize) -> Result<StorageKind> {
        let previous = self.kind();
        let owned = HostAllocation::copy_of(self.as_slice(), max_bytes)?;
        *self = Storage::Owned(owned);
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_storage_is_read_only() {
        let data = [1u32, 2, 3];
        let mut storage = Storage::BorrowedConst(&data);
        assert_eq!(storage.kind(), StorageKind::BorrowedConst);
        assert!(storage.as_mut_slice().is_none());
        assert_eq!(storage.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_promote_copies_current_view() {
        let data = [5u8, 6, 7];
        let mut storage = Storage::BorrowedConst(&data);

        let previous = storage.promote_to_owned(usize::MAX).unwrap();
        assert_eq!(previous, StorageKind::BorrowedConst);
        assert_eq!(storage.kind(), StorageKind::Owned);

        storage.as_mut_slice().unwrap()[0] = 9;
        assert_eq!(storage.as_slice(), &[9, 6, 7]);
        assert_eq!(data, [5, 6, 7]);
    }

    #[test]
    fn test_shared_storage_views_prefix() {
        let block = Arc::new(HostBlock::from_vec(vec![1u8, 2, 3, 4]));
        let storage = Storage::SharedExternal {
            block: Arc::clone(&block),
            count: 2,
        };
        assert_eq!(storage.as_slice(), &[1, 2]);
    }
}
