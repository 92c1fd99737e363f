//! Observability hooks
use crate::Init;

/// Receives notifications about a pool's activity.
///
/// Every method has an empty default implementation. The pool calls the
/// hooks after the corresponding operation has completed and never consults
/// the observer when deciding what to do, so the allocation behavior is the
/// same with any observer. `()` is the no-op observer.
pub trait PoolObserver {
    /// A segment was added. `segments` is the new segment count and
    /// `capacity` the new total number of blocks.
    #[inline]
    fn on_grow(&mut self, segments: usize, capacity: usize) {
        let _ = (segments, capacity);
    }

    /// A block was handed out.
    #[inline]
    fn on_alloc(&mut self) {}

    /// A block was returned.
    #[inline]
    fn on_free(&mut self) {}

    /// The pool released all of its segments.
    #[inline]
    fn on_destroy(&mut self) {}
}

impl PoolObserver for () {}

/// Allocation counters.
///
/// ```rust
/// use chunkpool::{AllocCounter, ChunkPool, Global, Prefixed};
///
/// let mut pool: ChunkPool<Prefixed, Global, AllocCounter> =
///     ChunkPool::with_source_and_observer(Global, AllocCounter::new());
/// pool.init(8, 4).unwrap();
///
/// let a = pool.alloc().unwrap();
/// let _b = pool.alloc().unwrap();
/// unsafe { pool.deallocate(a) };
///
/// assert_eq!(pool.observer().live(), 1);
/// assert_eq!(pool.observer().peak(), 2);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocCounter {
    live: usize,
    peak: usize,
    total_allocs: u64,
    grows: usize,
}

impl Init for AllocCounter {
    const INIT: Self = Self::new();
}

impl AllocCounter {
    /// Construct a counter with everything set to zero.
    pub const fn new() -> Self {
        Self {
            live: 0,
            peak: 0,
            total_allocs: 0,
            grows: 0,
        }
    }

    /// The number of blocks currently handed out.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// The largest value [`Self::live`] has reached since the last destroy.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// The number of successful allocations since the last destroy.
    #[inline]
    pub fn total_allocs(&self) -> u64 {
        self.total_allocs
    }

    /// The number of segments added since the last destroy.
    #[inline]
    pub fn grows(&self) -> usize {
        self.grows
    }
}

impl PoolObserver for AllocCounter {
    #[inline]
    fn on_grow(&mut self, _segments: usize, _capacity: usize) {
        self.grows += 1;
    }

    #[inline]
    fn on_alloc(&mut self) {
        self.live += 1;
        self.total_allocs += 1;
        self.peak = self.peak.max(self.live);
    }

    #[inline]
    fn on_free(&mut self) {
        debug_assert!(self.live > 0, "more frees than allocations");
        self.live = self.live.saturating_sub(1);
    }

    #[inline]
    fn on_destroy(&mut self) {
        log::debug!(
            "pool destroyed: {} live, peak {}, {} allocations, {} grows",
            self.live,
            self.peak,
            self.total_allocs,
            self.grows
        );
        *self = Self::new();
    }
}

impl<T: PoolObserver + ?Sized> PoolObserver for &mut T {
    #[inline]
    fn on_grow(&mut self, segments: usize, capacity: usize) {
        (**self).on_grow(segments, capacity)
    }

    #[inline]
    fn on_alloc(&mut self) {
        (**self).on_alloc()
    }

    #[inline]
    fn on_free(&mut self) {
        (**self).on_free()
    }

    #[inline]
    fn on_destroy(&mut self) {
        (**self).on_destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_high_water_mark() {
        let mut counter = AllocCounter::new();
        counter.on_grow(1, 4);
        counter.on_alloc();
        counter.on_alloc();
        counter.on_alloc();
        counter.on_free();
        counter.on_free();
        counter.on_alloc();

        assert_eq!(counter.live(), 2);
        assert_eq!(counter.peak(), 3);
        assert_eq!(counter.total_allocs(), 4);
        assert_eq!(counter.grows(), 1);

        counter.on_destroy();
        assert_eq!(counter, AllocCounter::new());
    }
}
