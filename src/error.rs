use core::fmt;

/// The reasons a [`ChunkPool`] operation can fail.
///
/// [`ChunkPool`]: crate::ChunkPool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The segment source (or the segment array) could not provide memory.
    /// The pool's previous state is left unchanged.
    BackingAllocation,
    /// No free block is available and growth is disallowed.
    Exhausted,
    /// The pool has not been initialized (or has been destroyed).
    Uninitialized,
    /// The chunk size or the number of blocks per segment is zero.
    InvalidConfig,
    /// The block layout needs to store a free-list link inside the payload,
    /// but the chunk size is smaller than a link.
    ChunkTooSmall,
    /// The block or segment size does not fit in a [`Layout`].
    ///
    /// [`Layout`]: core::alloc::Layout
    LayoutOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BackingAllocation => "the segment source failed to allocate memory",
            Self::Exhausted => "the pool is exhausted and growth is disallowed",
            Self::Uninitialized => "the pool is not initialized",
            Self::InvalidConfig => "chunk size and blocks per segment must be non-zero",
            Self::ChunkTooSmall => "chunk size is too small to hold a free-list link",
            Self::LayoutOverflow => "segment size overflows the address space",
        })
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        #[cfg_attr(feature = "doc_cfg", doc(cfg(feature = "std")))]
        impl std::error::Error for Error {}
    }
}
