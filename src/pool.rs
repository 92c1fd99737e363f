//! The chunk pool core
use alloc::vec::Vec;
use core::{alloc::Layout, fmt, marker::PhantomData, ptr::NonNull};

use crate::{
    block::{self, BlockLayout, FreeBlockHdr, Prefixed, BLOCK_ALIGN},
    observe::PoolObserver,
    source::{Global, SegmentSource},
    Error, Init,
};

/// The name reported by a pool that was never given one.
pub const UNNAMED: &str = "<unnamed>";

#[cfg_attr(doc, svgbobdoc::transform)]
/// A pool of equally sized chunks carved out of growable segments.
///
/// # Data Structure Overview
///
/// <center>
/// ```svgbob
///   segments: Vec
///   ,---+---,
///   | O | O |
///   '-|-+-|-'
///     |   |     segment 0                               segment 1
///     |   |    ,-------+-------+-------+-------,        ,-------+-------+-------+-------,
///     '---+--->| used  | free  | used  | free  |    ,-->| free  | free  | used  | used  |
///         |    '-------+---+---+-------+---+---'    |   '---+---+---+---+-------+-------'
///         |                ^               |        |       ^   |   ^
///         '----------------+---------------+--------'       |   |   |
///                          |               '----------------'   '---'
///   first_free ------------'                                     ^
///   last_free ---------------------------------------------------'
/// ```
/// </center>
///
/// Free blocks form a singly linked list threaded through their headers.
/// [`Self::alloc`] pops the head and [`Self::free`] pushes onto it, so the
/// most recently freed block is the next one handed out. When the list runs
/// dry the pool allocates one more segment of `blocks_per_segment` blocks
/// from its [`SegmentSource`] and appends the new blocks to the tail of the
/// list. Segments are never moved or returned before [`Self::destroy`].
///
/// # Type Parameters
///
///  - `L`: where the free-list link lives. See [`BlockLayout`].
///  - `S`: where segments come from. See [`SegmentSource`].
///  - `O`: receives activity notifications. See [`PoolObserver`].
///
/// # Thread Safety
///
/// The pool does no synchronization. Every operation takes `&mut self`;
/// callers sharing one pool between threads must put it behind a lock.
pub struct ChunkPool<L: BlockLayout = Prefixed, S: SegmentSource = Global, O: PoolObserver = ()>
{
    /// The payload size. Zero means uninitialized.
    chunk_size: usize,
    blocks_per_segment: usize,
    /// The distance between consecutive blocks.
    block_size: usize,
    segments: Vec<NonNull<u8>>,
    first_free: Option<NonNull<FreeBlockHdr>>,
    /// The block whose link is `None`. Kept so that growth doesn't have to
    /// walk the free list.
    last_free: Option<NonNull<FreeBlockHdr>>,
    allow_growth: bool,
    name: &'static str,
    source: S,
    observer: O,
    _phantom: PhantomData<fn() -> L>,
}

// Safety: The segments and the free blocks threaded through them are owned
//         exclusively by the pool and only touched through `&mut self`.
unsafe impl<L: BlockLayout, S: SegmentSource + Send, O: PoolObserver + Send> Send
    for ChunkPool<L, S, O>
{
}

impl<L: BlockLayout, S: SegmentSource + fmt::Debug, O: PoolObserver + fmt::Debug> fmt::Debug
    for ChunkPool<L, S, O>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkPool")
            .field("name", &self.name)
            .field("chunk_size", &self.chunk_size)
            .field("blocks_per_segment", &self.blocks_per_segment)
            .field("block_size", &self.block_size)
            .field("segments", &self.segments)
            .field("first_free", &self.first_free)
            .field("last_free", &self.last_free)
            .field("allow_growth", &self.allow_growth)
            .field("source", &self.source)
            .field("observer", &self.observer)
            .finish()
    }
}

impl<L: BlockLayout, S: SegmentSource + Init, O: PoolObserver + Init> Init for ChunkPool<L, S, O> {
    const INIT: Self = Self::INIT;
}

impl<L: BlockLayout, S: SegmentSource + Init, O: PoolObserver + Init> Default
    for ChunkPool<L, S, O>
{
    fn default() -> Self {
        Self::INIT
    }
}

impl<L: BlockLayout> ChunkPool<L> {
    /// Construct an uninitialized pool backed by the global allocator.
    #[inline]
    pub const fn new() -> Self {
        Self::with_source_and_observer(Global, ())
    }
}

impl<L: BlockLayout, S: SegmentSource + Init, O: PoolObserver + Init> ChunkPool<L, S, O> {
    /// An uninitialized pool.
    pub const INIT: Self = Self::with_source_and_observer(S::INIT, O::INIT);
}

impl<L: BlockLayout, S: SegmentSource> ChunkPool<L, S> {
    /// Construct an uninitialized pool that obtains segments from `source`.
    #[inline]
    pub const fn with_source(source: S) -> Self {
        Self::with_source_and_observer(source, ())
    }
}

impl<L: BlockLayout, S: SegmentSource, O: PoolObserver> ChunkPool<L, S, O> {
    /// Construct an uninitialized pool with a specific segment source and
    /// observer.
    #[inline]
    pub const fn with_source_and_observer(source: S, observer: O) -> Self {
        Self {
            chunk_size: 0,
            blocks_per_segment: 0,
            block_size: 0,
            segments: Vec::new(),
            first_free: None,
            last_free: None,
            allow_growth: true,
            name: UNNAMED,
            source,
            observer,
            _phantom: PhantomData,
        }
    }

    /// Set up the pool to hand out `chunk_size`-byte chunks and allocate the
    /// first segment of `blocks_per_segment` blocks.
    ///
    /// An already initialized pool is [destroyed](Self::destroy) first,
    /// which invalidates every pointer it has handed out.
    ///
    /// On failure the pool is left uninitialized.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use chunkpool::{ChunkPool, Error, Inline};
    ///
    /// let mut pool: ChunkPool = ChunkPool::new();
    /// assert_eq!(pool.init(0, 16), Err(Error::InvalidConfig));
    /// assert!(!pool.is_initialized());
    ///
    /// pool.init(48, 16).unwrap();
    /// assert_eq!(pool.chunk_size(), 48);
    /// assert_eq!(pool.capacity(), 16);
    ///
    /// // `Inline` needs room for a pointer in every chunk
    /// let mut pool: ChunkPool<Inline> = ChunkPool::new();
    /// assert_eq!(pool.init(1, 16), Err(Error::ChunkTooSmall));
    /// ```
    pub fn init(&mut self, chunk_size: usize, blocks_per_segment: usize) -> Result<(), Error> {
        if self.is_initialized() {
            self.destroy();
        }

        if chunk_size == 0 || blocks_per_segment == 0 {
            return Err(Error::InvalidConfig);
        }
        if chunk_size < L::MIN_CHUNK_SIZE {
            return Err(Error::ChunkTooSmall);
        }

        let block_size = block::block_size::<L>(chunk_size).ok_or(Error::LayoutOverflow)?;
        Self::segment_layout_for(block_size, blocks_per_segment).ok_or(Error::LayoutOverflow)?;

        self.chunk_size = chunk_size;
        self.blocks_per_segment = blocks_per_segment;
        self.block_size = block_size;

        if let Err(e) = self.grow() {
            self.chunk_size = 0;
            self.blocks_per_segment = 0;
            self.block_size = 0;
            return Err(e);
        }

        Ok(())
    }

    /// Release every segment and return to the uninitialized state.
    ///
    /// Every pointer handed out by this pool becomes dangling. Calling this
    /// on an uninitialized pool does nothing. The growth permission is reset
    /// to its default; the name is kept.
    pub fn destroy(&mut self) {
        if !self.is_initialized() {
            return;
        }

        log::debug!(
            "destroying pool [{} : {}] ({} segments, {} blocks)",
            self.name,
            self.chunk_size,
            self.segments.len(),
            self.capacity()
        );

        let layout = self.segment_layout();
        for segment in self.segments.drain(..) {
            // Safety: Every segment was allocated by `self.source` with
            //         `layout`, which hasn't changed since `init`
            unsafe { self.source.dealloc(segment, layout) };
        }

        self.reset();
        self.observer.on_destroy();
    }

    /// Reset every field except `name`, `source` and `observer`. The segment
    /// array is released.
    fn reset(&mut self) {
        debug_assert!(self.segments.is_empty());
        self.chunk_size = 0;
        self.blocks_per_segment = 0;
        self.block_size = 0;
        self.segments = Vec::new();
        self.first_free = None;
        self.last_free = None;
        self.allow_growth = true;
    }

    /// Allocate one more segment and append its blocks to the free list.
    ///
    /// This is what [`Self::alloc`] does when it runs out of blocks, but it
    /// can be called explicitly to reserve capacity ahead of time. It works
    /// regardless of [`Self::allow_growth`].
    ///
    /// If the source can't provide the memory, `Err(Error::BackingAllocation)`
    /// is returned and the pool is not modified.
    ///
    /// # Time Complexity
    ///
    /// Linear in `blocks_per_segment` (the new blocks are linked one by one)
    /// plus amortized constant time to record the segment.
    pub fn grow(&mut self) -> Result<(), Error> {
        if !self.is_initialized() {
            return Err(Error::Uninitialized);
        }

        let layout = self.segment_layout();

        // Reserve the segment array slot first so that nothing can fail after
        // the segment has been obtained
        if self.segments.try_reserve(1).is_err() {
            log::warn!("pool [{}]: failed to grow the segment array", self.name);
            return Err(Error::BackingAllocation);
        }

        // Safety: `layout.size()` is non-zero
        let Some(start) = (unsafe { self.source.alloc(layout) }) else {
            log::warn!(
                "pool [{}]: the source failed to provide {} bytes",
                self.name,
                layout.size()
            );
            return Err(Error::BackingAllocation);
        };

        // Safety: `start` is valid for `layout`, whose size is exactly
        //         `block_size * blocks_per_segment` and whose alignment is
        //         `BLOCK_ALIGN`
        let (head, tail) =
            unsafe { block::init_segment(start, self.block_size, self.blocks_per_segment) };

        match self.last_free {
            // Safety: `last` is a free block in one of our segments
            Some(mut last) => unsafe {
                debug_assert!(last.as_ref().next_free.is_none());
                last.as_mut().next_free = Some(head);
            },
            None => {
                debug_assert!(self.first_free.is_none());
                self.first_free = Some(head);
            }
        }
        self.last_free = Some(tail);

        self.segments.push(start);

        log::debug!(
            "growing pool [{} : {}] = {}",
            self.name,
            self.chunk_size,
            self.segments.len()
        );
        self.observer.on_grow(self.segments.len(), self.capacity());

        Ok(())
    }

    /// Attempt to allocate a chunk.
    ///
    /// Returns the address of `chunk_size` writable bytes aligned to
    /// [`BLOCK_ALIGN`]; `None` if the pool is uninitialized, or empty and not
    /// allowed (or unable) to grow.
    ///
    /// # Time Complexity
    ///
    /// Constant time unless a new segment is needed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use chunkpool::ChunkPool;
    ///
    /// let mut pool: ChunkPool = ChunkPool::new();
    /// assert!(pool.alloc().is_none());
    ///
    /// pool.init(16, 2).unwrap();
    /// pool.set_allow_growth(false);
    /// let a = pool.alloc().unwrap();
    /// let _b = pool.alloc().unwrap();
    /// assert!(pool.alloc().is_none());
    ///
    /// unsafe { pool.deallocate(a) };
    /// assert_eq!(pool.alloc(), Some(a));
    /// ```
    #[inline]
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        self.try_alloc().ok()
    }

    /// Like [`Self::alloc`], but tells why the allocation failed.
    pub fn try_alloc(&mut self) -> Result<NonNull<u8>, Error> {
        let block = match self.first_free {
            Some(block) => block,
            None => {
                if !self.is_initialized() {
                    return Err(Error::Uninitialized);
                }
                if !self.allow_growth {
                    return Err(Error::Exhausted);
                }
                self.grow()?;
                self.first_free.ok_or(Error::Exhausted)?
            }
        };

        // Safety: `block` is on the free list, so its link is valid
        self.first_free = unsafe { block.as_ref().next_free };
        if self.first_free.is_none() {
            self.last_free = None;
        }

        self.observer.on_alloc();

        // Safety: `block` lies in one of our segments
        Ok(unsafe { block::payload_of::<L>(block) })
    }

    /// Return a chunk to the pool. Does nothing if `ptr` is null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`Self::alloc`] (or
    /// [`Self::try_alloc`]) on this pool, which hasn't been freed since and
    /// whose pool hasn't been destroyed since.
    #[inline]
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if let Some(ptr) = NonNull::new(ptr) {
            self.deallocate(ptr);
        }
    }

    /// Return a chunk to the pool.
    ///
    /// # Time Complexity
    ///
    /// This method will complete in constant time (in release builds; debug
    /// builds verify the provenance of `ptr`).
    ///
    /// # Safety
    ///
    /// `ptr` must be a pointer returned by [`Self::alloc`] (or
    /// [`Self::try_alloc`]) on this pool, which hasn't been freed since and
    /// whose pool hasn't been destroyed since.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        debug_assert!(
            self.contains(ptr),
            "{:p} was not allocated by pool [{}]",
            ptr,
            self.name
        );

        let mut block = block::block_of::<L>(ptr);
        block.as_mut().next_free = self.first_free;
        if self.first_free.is_none() {
            self.last_free = Some(block);
        }
        self.first_free = Some(block);

        self.observer.on_free();
    }

    /// Check whether `ptr` is a payload address inside one of this pool's
    /// segments. It doesn't tell whether the block is currently allocated.
    ///
    /// # Time Complexity
    ///
    /// Linear in the number of segments.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let addr = ptr.as_ptr() as usize;
        let Some(block_addr) = addr.checked_sub(L::HEADER_SIZE) else {
            return false;
        };
        let segment_len = self.block_size * self.blocks_per_segment;

        self.segments.iter().any(|segment| {
            let start = segment.as_ptr() as usize;
            match block_addr.checked_sub(start) {
                Some(offset) => offset < segment_len && offset % self.block_size == 0,
                None => false,
            }
        })
    }

    /// Count the blocks on the free list.
    ///
    /// # Time Complexity
    ///
    /// Linear in the number of free blocks.
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.first_free;
        while let Some(block) = cursor {
            count += 1;
            // Safety: `block` is on the free list
            cursor = unsafe { block.as_ref().next_free };
        }
        count
    }

    /// Get whether [`Self::init`] has succeeded and [`Self::destroy`] hasn't
    /// been called since.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.chunk_size != 0
    }

    /// Get the payload size in bytes. Zero if uninitialized.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Get the number of blocks added per growth step.
    #[inline]
    pub fn blocks_per_segment(&self) -> usize {
        self.blocks_per_segment
    }

    /// Get the distance between consecutive blocks, header included.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Get the total number of blocks, free or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks_per_segment * self.segments.len()
    }

    #[inline]
    pub fn allow_growth(&self) -> bool {
        self.allow_growth
    }

    /// Choose whether [`Self::alloc`] may add segments when the pool is
    /// empty. Enabled by default.
    #[inline]
    pub fn set_allow_growth(&mut self, allow_growth: bool) {
        self.allow_growth = allow_growth;
    }

    /// Get the diagnostic name used in log messages.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Set the diagnostic name used in log messages. It has no effect on
    /// allocation.
    #[inline]
    pub fn set_name(&mut self, name: &'static str) {
        self.name = name;
    }

    #[inline]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    #[inline]
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a mutable reference to the segment source.
    ///
    /// # Safety
    ///
    /// The caller must not replace the source or release memory the pool got
    /// from it.
    #[inline]
    pub unsafe fn source_mut_unchecked(&mut self) -> &mut S {
        &mut self.source
    }

    #[inline]
    fn segment_layout_for(block_size: usize, blocks_per_segment: usize) -> Option<Layout> {
        let size = block_size.checked_mul(blocks_per_segment)?;
        Layout::from_size_align(size, BLOCK_ALIGN).ok()
    }

    #[inline]
    fn segment_layout(&self) -> Layout {
        debug_assert!(self.is_initialized());
        // Safety: Validated by `init`
        unsafe {
            Layout::from_size_align_unchecked(
                self.block_size * self.blocks_per_segment,
                BLOCK_ALIGN,
            )
        }
    }
}

impl<L: BlockLayout, S: SegmentSource, O: PoolObserver> Drop for ChunkPool<L, S, O> {
    fn drop(&mut self) {
        self.destroy();
    }
}
