//! Backing memory providers for segments
use core::{alloc, ptr::NonNull};

use crate::Init;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::unix::MmapSource;

/// The underlying memory provider a [`ChunkPool`] obtains its segments from.
///
/// A pool requests exactly one allocation per growth step and returns every
/// allocation, with the same layout, when it is destroyed.
///
/// # Safety
///
/// A non-null pointer returned by `alloc` must be valid for reads and writes
/// of `layout.size()` bytes, aligned to `layout.align()`, and must not alias
/// any other live allocation until it is passed to `dealloc`.
///
/// [`ChunkPool`]: crate::ChunkPool
pub unsafe trait SegmentSource {
    /// Allocate a memory region described by `layout`. `layout.size()` is
    /// never zero.
    ///
    /// Returns `None` if the request cannot be satisfied. No retry is
    /// attempted by the caller.
    ///
    /// # Safety
    ///
    /// See the implementation.
    unsafe fn alloc(&mut self, layout: alloc::Layout) -> Option<NonNull<u8>>;

    /// Release a memory region previously returned by `alloc`.
    ///
    /// # Safety
    ///
    /// `ptr` must denote a region returned by `self.alloc(layout)` that has
    /// not been released yet.
    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: alloc::Layout);
}

/// The global allocator registered with `#[global_allocator]` (or the
/// default one) as a [`SegmentSource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Global;

impl Init for Global {
    const INIT: Self = Self;
}

unsafe impl SegmentSource for Global {
    #[inline]
    unsafe fn alloc(&mut self, layout: alloc::Layout) -> Option<NonNull<u8>> {
        NonNull::new(::alloc::alloc::alloc(layout))
    }

    #[inline]
    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: alloc::Layout) {
        ::alloc::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

/// Wraps a [`GlobalAlloc`] to use it as a [`SegmentSource`].
///
/// ```rust
/// use chunkpool::{ChunkPool, GlobalAllocAsSegmentSource, Prefixed};
///
/// let mut pool: ChunkPool<Prefixed, GlobalAllocAsSegmentSource<std::alloc::System>> =
///     ChunkPool::with_source(GlobalAllocAsSegmentSource(std::alloc::System));
/// pool.init(32, 64).unwrap();
/// assert!(pool.alloc().is_some());
/// ```
///
/// [`GlobalAlloc`]: core::alloc::GlobalAlloc
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalAllocAsSegmentSource<T>(pub T);

impl<T: Init> Init for GlobalAllocAsSegmentSource<T> {
    const INIT: Self = Self(Init::INIT);
}

unsafe impl<T: alloc::GlobalAlloc> SegmentSource for GlobalAllocAsSegmentSource<T> {
    #[inline]
    unsafe fn alloc(&mut self, layout: alloc::Layout) -> Option<NonNull<u8>> {
        NonNull::new(self.0.alloc(layout))
    }

    #[inline]
    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: alloc::Layout) {
        self.0.dealloc(ptr.as_ptr(), layout)
    }
}
