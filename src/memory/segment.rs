//! Storage kinds and their release rules.

/// Which backing currently holds a buffer's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKind {
    /// Allocated by the buffer, freed at teardown.
    Owned,
    /// Caller memory borrowed mutably; the buffer never frees it.
    Borrowed,
    /// Caller memory borrowed read-only; promoted to [`StorageKind::Owned`]
    /// on the first write-capable access.
    BorrowedConst,
    /// Reference-counted host memory co-owned with the caller.
    SharedExternal,
    /// Host memory whose sole ownership moved into the buffer.
    UniqueExternal,
}

/// What teardown does with a storage backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseRule {
    /// Free the allocation.
    Free,
    /// Leave the memory untouched; it belongs to the caller.
    Leave,
    /// Drop this buffer's reference; the memory lives on while other
    /// holders remain.
    ReleaseReference,
    /// Drop the transferred handle, which releases the memory by its own
    /// rules.
    DropHandle,
}

impl StorageKind {
    /// The release rule for this backing.
    #[inline]
    pub fn release_rule(&self) -> ReleaseRule {
        match self {
            StorageKind::Owned => ReleaseRule::Free,
            StorageKind::Borrowed | StorageKind::BorrowedConst => ReleaseRule::Leave,
            StorageKind::SharedExternal => ReleaseRule::ReleaseReference,
            StorageKind::UniqueExternal => ReleaseRule::DropHandle,
        }
    }

    /// Was the memory provided by host code rather than allocated by the
    /// buffer?
    ///
    /// Host-provided memory is updated in place, so a modified buffer over
    /// it is "written back" as soon as it is torn down.
    #[inline]
    pub fn is_host_provided(&self) -> bool {
        !matches!(self, StorageKind::Owned)
    }

    /// Can the buffer write through this backing?
    #[inline]
    pub fn is_writable(&self) -> bool {
        !matches!(self, StorageKind::BorrowedConst)
    }

    /// Short lowercase name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Owned => "owned",
            StorageKind::Borrowed => "borrowed",
            StorageKind::BorrowedConst => "borrowed_const",
            StorageKind::SharedExternal => "shared_external",
            StorageKind::UniqueExternal => "unique_external",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
