//! Memory sources for the embedded runtime
//!
//! Design: the runtime funnels every allocation, reallocation and free
//! through a single callback. The callback decodes into an [`AllocRequest`]
//! and any [`MemorySource`] serves it:
//! 1. [`BlockAllocator`] - fixed arena, bump pointer plus a single-class free list
//! 2. [`FallbackAllocator`] - arena first, system heap once the arena is exhausted
//! 3. [`SystemAllocator`] - plain heap passthrough, the baseline for benchmarks
//!
//! None of these types is `Send` or `Sync`: the runtime is single-threaded
//! and every call assumes exclusive, non-reentrant access.

mod block;
mod buffer;
mod fallback;
mod system;


pub use block::BlockAllocator;
pub use buffer::ArenaBuffer;
pub use fallback::FallbackAllocator;
pub use system::SystemAllocator;

use core::ffi::c_void;
use core::ptr::{self, NonNull};

/// Alignment of every block handed to the runtime
pub const ALIGNMENT: usize = 8;

/// Smallest block the arena carves out; also the only reclaimable size class
pub const MIN_BLOCK_SIZE: usize = 8 * ALIGNMENT;

/// One decoded call of the runtime's allocator callback
///
/// The callback shape `(ud, ptr, osize, nsize)` folds three verbs into one
/// function: `nsize == 0` frees, a null `ptr` allocates, anything else
/// reallocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocRequest {
    Allocate { size: usize },
    Free { ptr: NonNull<u8>, size: usize },
    Reallocate { ptr: NonNull<u8>, old_size: usize, new_size: usize },
}

impl AllocRequest {
    /// Decode raw callback arguments
    ///
    /// Returns `None` for the no-op case (free of a null pointer). When `ptr`
    /// is null the runtime passes a type tag in `old_size`, which is ignored.
    pub fn decode(ptr: *mut c_void, old_size: usize, new_size: usize) -> Option<Self> {
        match (NonNull::new(ptr.cast::<u8>()), new_size) {
            (None, 0) => None,
            (Some(ptr), 0) => Some(Self::Free { ptr, size: old_size }),
            (None, size) => Some(Self::Allocate { size }),
            (Some(ptr), new_size) => Some(Self::Reallocate {
                ptr,
                old_size,
                new_size,
            }),
        }
    }
}

/// The four-verb memory contract the runtime's callback is served from
pub trait MemorySource {
    /// Allocate `size` bytes aligned to [`ALIGNMENT`]
    ///
    /// Never returns null. Running out of memory is fatal for sources
    /// without a fallback.
    fn allocate(&mut self, size: usize) -> NonNull<u8>;

    /// Return a block to the source
    ///
    /// Panics with "double free of null" when `ptr` is null.
    ///
    /// # Safety
    /// `ptr` must come from this source, be live, and `size` must be the
    /// size it was requested with.
    unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize);

    /// Move a block to a fresh allocation of `new_size` bytes
    ///
    /// Copies `min(old_size, new_size)` bytes and frees the old block.
    ///
    /// # Safety
    /// Same requirements as [`MemorySource::deallocate`] for `ptr`/`old_size`.
    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8>;

    /// Invalidate every block handed out so far
    fn reset(&mut self);

    /// Snapshot of usage counters
    fn stats(&self) -> AllocatorStats;

    /// Serve one decoded callback request
    ///
    /// # Safety
    /// Pointers inside `request` must satisfy the requirements of the verb
    /// they are routed to.
    unsafe fn serve(&mut self, request: AllocRequest) -> *mut u8 {
        match request {
            AllocRequest::Allocate { size } => self.allocate(size).as_ptr(),
            AllocRequest::Free { ptr, size } => {
                self.deallocate(ptr.as_ptr(), size);
                ptr::null_mut()
            }
            AllocRequest::Reallocate {
                ptr,
                old_size,
                new_size,
            } => self.reallocate(ptr, old_size, new_size).as_ptr(),
        }
    }
}

/// Allocator statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Usable arena bytes (zero for heap-only sources)
    pub capacity: usize,
    /// Bytes consumed by the bump cursor since the last reset
    pub used: usize,
    /// Blocks currently parked on the free list
    pub free_blocks: usize,
    /// Arena blocks handed out and not yet returned
    pub live_blocks: usize,
    /// Heap blocks handed out and not yet returned
    pub heap_blocks: usize,
    /// Bytes held by live heap blocks
    pub heap_bytes: usize,
}

/// Arena memory picked at runtime from configuration
#[derive(Debug)]
pub enum Memory<'buf> {
    /// Exhaustion is fatal
    Arena(BlockAllocator<'buf>),
    /// Exhaustion spills to the system heap
    Fallback(FallbackAllocator<'buf>),
}

impl<'buf> Memory<'buf> {
    /// Whether arena exhaustion degrades to heap allocation
    pub fn has_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// The underlying arena, regardless of variant
    pub fn arena(&self) -> &BlockAllocator<'buf> {
        match self {
            Self::Arena(arena) => arena,
            Self::Fallback(fallback) => fallback.arena(),
        }
    }
}

impl MemorySource for Memory<'_> {
    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        match self {
            Self::Arena(arena) => arena.allocate(size),
            Self::Fallback(fallback) => fallback.allocate(size),
        }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        match self {
            Self::Arena(arena) => arena.deallocate(ptr, size),
            Self::Fallback(fallback) => fallback.deallocate(ptr, size),
        }
    }

    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8> {
        match self {
            Self::Arena(arena) => arena.reallocate(ptr, old_size, new_size),
            Self::Fallback(fallback) => fallback.reallocate(ptr, old_size, new_size),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Arena(arena) => arena.reset(),
            Self::Fallback(fallback) => fallback.reset(),
        }
    }

    fn stats(&self) -> AllocatorStats {
        match self {
            Self::Arena(arena) => arena.stats(),
            Self::Fallback(fallback) => fallback.stats(),
        }
    }
}

/// Round a request up to its block size
///
/// Sizes are rounded to a multiple of [`ALIGNMENT`] first and then to at
/// least [`MIN_BLOCK_SIZE`], so every request of 64 bytes or less lands in
/// the one reclaimable class. `None` on arithmetic overflow.
#[inline]
pub const fn block_size(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(padded) => {
            let rounded = padded & !(ALIGNMENT - 1);
            if rounded < MIN_BLOCK_SIZE {
                Some(MIN_BLOCK_SIZE)
            } else {
                Some(rounded)
            }
        }
        None => None,
    }
}

/// Whether a request of `size` bytes is served from (and returned to) the free list
#[inline]
pub const fn is_reclaimable(size: usize) -> bool {
    matches!(block_size(size), Some(MIN_BLOCK_SIZE))
}
