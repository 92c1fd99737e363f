//! Block layout and free-list linkage
use core::{mem, ptr::NonNull};

use crate::utils::checked_align_up;

/// The free-list link stored at the start of every free block.
///
/// Only meaningful while the block is free. Once the block is handed out the
/// bytes belong to the caller.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct FreeBlockHdr {
    pub next_free: Option<NonNull<FreeBlockHdr>>,
}

/// The size of one free-list link.
pub const LINK_SIZE: usize = mem::size_of::<FreeBlockHdr>();

/// Every block (and therefore every segment) is aligned to this many bytes.
pub const BLOCK_ALIGN: usize = mem::align_of::<FreeBlockHdr>();

#[cfg_attr(doc, svgbobdoc::transform)]
/// Decides where a block keeps its free-list link.
///
/// A segment is a run of equally sized blocks. [`Prefixed`] places the link
/// in a dedicated header in front of the payload:
///
/// <center>
/// ```svgbob
///      block 0                      block 1                      block 2
///   ,--------+-----------------,--------+-----------------,--------+-----------------,
///   | header |     payload     | header |     payload     | header |     payload     |
///   |   O----+-----------------+->      |                 |  null  |                 |
///   '--------+-----------------'--------+-----------------'--------+-----------------'
///   ^        ^
///   |        '-- returned by `alloc`
///   '-- block address
/// ```
/// </center>
///
/// [`Inline`] has no header: the link overlays the first bytes of the
/// payload, which is only possible because a free block's payload is unused.
///
/// The layout is a type parameter of [`ChunkPool`] so that every block of a
/// pool has the same shape.
///
/// # Safety
///
/// For every chunk size `>= MIN_CHUNK_SIZE`, a `HEADER_SIZE + chunk_size`
/// byte block must be able to hold a [`LINK_SIZE`]-byte link at its start,
/// and `HEADER_SIZE` must be a multiple of [`BLOCK_ALIGN`].
///
/// [`ChunkPool`]: crate::ChunkPool
pub unsafe trait BlockLayout {
    /// The number of bytes between a block's address and its payload.
    const HEADER_SIZE: usize;
    /// The smallest chunk size this layout supports.
    const MIN_CHUNK_SIZE: usize;
}

/// A pointer-sized header precedes every payload. Supports any chunk size.
#[derive(Debug)]
pub enum Prefixed {}

unsafe impl BlockLayout for Prefixed {
    const HEADER_SIZE: usize = LINK_SIZE;
    const MIN_CHUNK_SIZE: usize = 1;
}

/// No header. The link is stored in the payload of free blocks, so chunks
/// must be at least [`LINK_SIZE`] bytes long.
#[derive(Debug)]
pub enum Inline {}

unsafe impl BlockLayout for Inline {
    const HEADER_SIZE: usize = 0;
    const MIN_CHUNK_SIZE: usize = LINK_SIZE;
}

/// The distance between two consecutive blocks for a given chunk size.
///
/// The header and payload are padded up to [`BLOCK_ALIGN`] so that every
/// link is naturally aligned.
#[inline]
pub(crate) fn block_size<L: BlockLayout>(chunk_size: usize) -> Option<usize> {
    checked_align_up(L::HEADER_SIZE.checked_add(chunk_size)?, BLOCK_ALIGN)
}

/// Get the payload address of a block.
///
/// # Safety
///
/// `block` must point to a block inside a live segment.
#[inline]
pub(crate) unsafe fn payload_of<L: BlockLayout>(block: NonNull<FreeBlockHdr>) -> NonNull<u8> {
    NonNull::new_unchecked(block.as_ptr().cast::<u8>().add(L::HEADER_SIZE))
}

/// Get the block address of a payload. The inverse of [`payload_of`].
///
/// # Safety
///
/// `payload` must have been produced by [`payload_of`] with the same layout.
#[inline]
pub(crate) unsafe fn block_of<L: BlockLayout>(payload: NonNull<u8>) -> NonNull<FreeBlockHdr> {
    NonNull::new_unchecked(payload.as_ptr().sub(L::HEADER_SIZE)).cast()
}

/// Link the blocks of a fresh segment in address order and terminate the
/// last one. Returns the first and last blocks of the resulting sublist.
///
/// # Safety
///
/// `start` must be valid for writes of `block_size * count` bytes and aligned
/// to [`BLOCK_ALIGN`]. `block_size` must be a multiple of [`BLOCK_ALIGN`] and
/// at least [`LINK_SIZE`]. `count` must be non-zero.
pub(crate) unsafe fn init_segment(
    start: NonNull<u8>,
    block_size: usize,
    count: usize,
) -> (NonNull<FreeBlockHdr>, NonNull<FreeBlockHdr>) {
    debug_assert!(count > 0);
    debug_assert!(block_size >= LINK_SIZE);
    debug_assert_eq!(block_size % BLOCK_ALIGN, 0);
    debug_assert_eq!(start.as_ptr() as usize % BLOCK_ALIGN, 0);

    let first = start.cast::<FreeBlockHdr>();
    let mut block = first;
    for _ in 1..count {
        let next: NonNull<FreeBlockHdr> =
            NonNull::new_unchecked(block.as_ptr().cast::<u8>().add(block_size)).cast();
        // The segment is uninitialized memory, so write without reading
        block.as_ptr().write(FreeBlockHdr {
            next_free: Some(next),
        });
        block = next;
    }
    block.as_ptr().write(FreeBlockHdr { next_free: None });

    (first, block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{prelude::v1::*, vec};

    #[test]
    fn block_size_is_padded() {
        assert_eq!(block_size::<Prefixed>(16), Some(LINK_SIZE + 16));
        assert_eq!(block_size::<Prefixed>(1), Some(LINK_SIZE + BLOCK_ALIGN));
        assert_eq!(block_size::<Inline>(LINK_SIZE), Some(LINK_SIZE));
        assert_eq!(block_size::<Inline>(LINK_SIZE + 1), Some(LINK_SIZE * 2));
        assert_eq!(block_size::<Prefixed>(usize::MAX), None);
    }

    #[test]
    fn payload_translation() {
        let mut storage = [0usize; 8];
        let block = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<FreeBlockHdr>();
        unsafe {
            let payload = payload_of::<Prefixed>(block);
            assert_eq!(payload.as_ptr() as usize, block.as_ptr() as usize + LINK_SIZE);
            assert_eq!(block_of::<Prefixed>(payload), block);

            let payload = payload_of::<Inline>(block);
            assert_eq!(payload.as_ptr() as usize, block.as_ptr() as usize);
            assert_eq!(block_of::<Inline>(payload), block);
        }
    }

    #[test]
    fn segment_is_linked_in_address_order() {
        let count = 5;
        let block_size = block_size::<Prefixed>(24).unwrap();
        let mut storage = vec![0usize; block_size * count / LINK_SIZE];
        let start = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<u8>();

        let (first, last) = unsafe { init_segment(start, block_size, count) };
        assert_eq!(first.cast::<u8>(), start);

        let mut visited = Vec::new();
        let mut cursor = Some(first);
        while let Some(block) = cursor {
            visited.push(block.as_ptr() as usize - start.as_ptr() as usize);
            cursor = unsafe { block.as_ref().next_free };
        }

        let expected: Vec<usize> = (0..count).map(|i| i * block_size).collect();
        assert_eq!(visited, expected);
        assert_eq!(
            last.as_ptr() as usize,
            start.as_ptr() as usize + (count - 1) * block_size
        );
    }

    #[test]
    fn single_block_segment() {
        let mut storage = [0usize; 4];
        let start = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<u8>();
        let (first, last) = unsafe { init_segment(start, LINK_SIZE * 4, 1) };
        assert_eq!(first, last);
        assert!(unsafe { first.as_ref().next_free }.is_none());
    }
}
