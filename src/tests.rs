use std::{alloc::Layout, collections::BTreeMap, ops::Range, prelude::v1::*, ptr::NonNull};

use crate::{Init, SegmentSource};

/// Tracks which byte ranges are free, handed out, or not owned by a pool at
/// all. Panics on any transition that would mean two live chunks overlap.
#[derive(Debug)]
pub struct ShadowAllocator {
    regions: BTreeMap<usize, SaRegion>,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SaRegion {
    Free,
    Used,
    Invalid,
}

impl Default for ShadowAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowAllocator {
    pub fn new() -> Self {
        Self {
            regions: Some((0, SaRegion::Invalid)).into_iter().collect(),
        }
    }

    pub fn convert_range(
        &mut self,
        range: Range<usize>,
        old_region: SaRegion,
        new_region: SaRegion,
    ) {
        if range.len() == 0 {
            return;
        }

        assert_ne!(old_region, new_region);
        log::trace!(
            "sa: converting {:?} from {:?} to {:?}",
            range,
            old_region,
            new_region
        );

        let (&addr, &region) = self.regions.range(0..range.end).rev().next().unwrap();
        if addr > range.start {
            panic!("there's a discontinuity in range {:?}", range);
        } else if region != old_region {
            panic!(
                "range {:?} is {:?} (expected {:?})",
                range, region, old_region
            );
        }

        // Insert an element at `range.start`
        if addr == range.start {
            *self.regions.get_mut(&addr).unwrap() = new_region;
        } else {
            self.regions.insert(range.start, new_region);
        }

        // Each element must represent a discontinuity. If it doesnt't represent
        // a discontinuity, it must be removed.
        if let Some((_, &region)) = self.regions.range(0..range.start).rev().next() {
            if region == new_region {
                self.regions.remove(&range.start);
            }
        }

        if let Some(&end_region) = self.regions.get(&range.end) {
            // Each element must represent a discontinuity. If it doesnt't
            // represent a discontinuity, it must be removed.
            if end_region == new_region {
                self.regions.remove(&range.end);
            }
        } else {
            // Insert an element at `range.end`
            self.regions.insert(range.end, old_region);
        }
    }

    pub fn insert_segment(&mut self, start: NonNull<u8>, len: usize) {
        let start = start.as_ptr() as usize;
        self.convert_range(start..start + len, SaRegion::Invalid, SaRegion::Free);
    }

    pub fn remove_segment(&mut self, start: NonNull<u8>, len: usize) {
        let start = start.as_ptr() as usize;
        self.convert_range(start..start + len, SaRegion::Free, SaRegion::Invalid);
    }

    pub fn allocate(&mut self, start: NonNull<u8>, len: usize) {
        let start = start.as_ptr() as usize;
        assert!(
            start % crate::BLOCK_ALIGN == 0,
            "0x{:x} is not properly aligned",
            start
        );
        self.convert_range(start..start + len, SaRegion::Free, SaRegion::Used);
    }

    pub fn deallocate(&mut self, start: NonNull<u8>, len: usize) {
        let start = start.as_ptr() as usize;
        self.convert_range(start..start + len, SaRegion::Used, SaRegion::Free);
    }
}

/// Wraps a segment source and records every segment in a
/// [`ShadowAllocator`].
#[derive(Debug, Default)]
pub struct TrackingSource<T> {
    pub sa: ShadowAllocator,
    pub num_segments: usize,
    pub inner: T,
}

unsafe impl<T: SegmentSource> SegmentSource for TrackingSource<T> {
    unsafe fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        log::trace!("SegmentSource::alloc({:?})", layout);
        let ptr = self.inner.alloc(layout)?;
        log::trace!(" SegmentSource::alloc(...) = {:?}", ptr);
        self.sa.insert_segment(ptr, layout.size());
        self.num_segments += 1;
        Some(ptr)
    }

    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout) {
        log::trace!("SegmentSource::dealloc({:?}, {:?})", ptr, layout);
        self.sa.remove_segment(ptr, layout.size());
        self.num_segments -= 1;
        self.inner.dealloc(ptr, layout)
    }
}

/// A segment source that fails once its budget of allocations is spent.
#[derive(Debug)]
pub struct FailingSource<T> {
    pub remaining: usize,
    pub inner: T,
}

impl<T: Init> FailingSource<T> {
    pub fn new(remaining: usize) -> Self {
        Self {
            remaining,
            inner: T::INIT,
        }
    }
}

unsafe impl<T: SegmentSource> SegmentSource for FailingSource<T> {
    unsafe fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if self.remaining == 0 {
            log::trace!("FailingSource::alloc({:?}) = None (budget spent)", layout);
            return None;
        }
        self.remaining -= 1;
        self.inner.alloc(layout)
    }

    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.dealloc(ptr, layout)
    }
}
