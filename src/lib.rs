//! This crate implements a fixed-size chunk pool: a memory allocator
//! specialized for many objects of one uniform size.
//!
//!  - **Allocation and deallocation complete in constant time.** A free
//!    chunk is popped from (or pushed onto) a singly linked free list threaded
//!    through the chunks themselves. No searching, no splitting, no
//!    coalescing.
//!
//!  - **No fragmentation.** Every chunk has the same size, so any free chunk
//!    satisfies any request.
//!
//!  - **The pool grows in segments.** When it runs out of chunks it obtains
//!    one more segment holding a fixed number of chunks from a pluggable
//!    [`SegmentSource`] (the global allocator by default). Segments never move,
//!    so handed-out pointers stay valid until they are freed or the pool is
//!    destroyed.
//!
//!  - **This crate supports `#![no_std]`.** It only needs the `alloc` crate.
//!
//! The pool can't return individual segments to the underlying memory
//! system. Memory goes back only when the whole pool is destroyed.
//!
//! # Examples
//!
//! ```rust
//! use chunkpool::ChunkPool;
//!
//! #[derive(Debug, PartialEq)]
//! struct Particle {
//!     position: [f32; 3],
//!     ttl: u32,
//! }
//!
//! let mut pool: ChunkPool = ChunkPool::new();
//! pool.init(std::mem::size_of::<Particle>(), 256).unwrap();
//! pool.set_name("particles");
//!
//! let ptr = pool.alloc().unwrap().cast::<Particle>();
//! unsafe {
//!     ptr.as_ptr().write(Particle { position: [0.0; 3], ttl: 60 });
//!     assert_eq!(ptr.as_ref().ttl, 60);
//!     pool.free(ptr.as_ptr().cast());
//! }
//! ```
//!
//! Chunks are aligned to [`BLOCK_ALIGN`] (the alignment of a pointer).
//!
//! # Details
//!
//! ## Block Layout
//!
//! By default ([`Prefixed`]) each chunk is preceded by a pointer-sized
//! header that holds the free-list link while the chunk is free. [`Inline`]
//! drops the header and keeps the link in the first bytes of a free chunk,
//! which saves a pointer per chunk but requires chunks to be at least
//! [`LINK_SIZE`] bytes long. The layout is a type parameter, so every chunk
//! of a pool has the same layout.
//!
//! ## Reuse Order
//!
//! Freed chunks are reused in LIFO order. The blocks of a new segment are
//! appended behind the existing free chunks in address order.
//!
//! ## Misuse
//!
//! Freeing a pointer twice, freeing a pointer from another pool, or using a
//! pointer after the pool is destroyed is undefined behavior. Debug builds
//! catch foreign pointers with an assertion.
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod block;
mod error;
mod init;
mod observe;
mod pool;
mod source;
mod utils;
pub use self::{
    block::{BlockLayout, Inline, Prefixed, BLOCK_ALIGN, LINK_SIZE},
    error::Error,
    init::*,
    observe::{AllocCounter, PoolObserver},
    pool::{ChunkPool, UNNAMED},
    source::{Global, GlobalAllocAsSegmentSource, SegmentSource},
};

#[cfg(unix)]
#[cfg_attr(feature = "doc_cfg", doc(cfg(unix)))]
pub use self::source::MmapSource;

#[cfg(test)]
mod tests;
