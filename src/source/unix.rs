use core::{alloc::Layout, ptr::NonNull};

use super::SegmentSource;
use crate::Init;

/// Obtains segments directly from the kernel with anonymous private
/// mappings. Requests are rounded up to the page size.
///
/// Useful for pools with large segments that should not be carved out of the
/// process heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapSource;

impl Init for MmapSource {
    const INIT: Self = Self;
}

impl MmapSource {
    /// The memory page size minus 1.
    #[inline]
    fn page_size_m1() -> Option<usize> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        let page_size = page_size as usize;
        if !page_size.is_power_of_two() {
            return None;
        }
        Some(page_size - 1)
    }

    #[inline]
    fn mapping_len(layout: Layout) -> Option<usize> {
        let page_size_m1 = Self::page_size_m1()?;
        // Mappings are page-aligned, which covers any block alignment
        if layout.align() > page_size_m1 + 1 {
            return None;
        }
        Some(layout.size().checked_add(page_size_m1)? & !page_size_m1)
    }
}

unsafe impl SegmentSource for MmapSource {
    unsafe fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let num_bytes = Self::mapping_len(layout)?;

        let ptr = libc::mmap(
            core::ptr::null_mut(),
            num_bytes,
            libc::PROT_WRITE | libc::PROT_READ,
            libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
            -1,
            0,
        );

        if ptr == libc::MAP_FAILED {
            return None;
        }

        NonNull::new(ptr as *mut u8)
    }

    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // `alloc` succeeded with the same layout, so this can't fail
        let num_bytes = Self::mapping_len(layout).unwrap_or_else(|| layout.size());
        let result = libc::munmap(ptr.as_ptr() as *mut _, num_bytes);
        debug_assert_eq!(result, 0);
    }
}
