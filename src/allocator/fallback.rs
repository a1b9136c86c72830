//! Graceful degradation - arena first, system heap when it runs dry
//!
//! Design: no per-block provenance record is kept. Ownership is re-derived
//! on free by testing the address against the arena range, which holds as
//! long as the heap never hands out addresses inside the arena buffer.

use super::{AllocatorStats, BlockAllocator, MemorySource, ALIGNMENT};
use crate::logging;
use core::ptr::{self, NonNull};
use std::alloc::{self, Layout};

/// Arena allocator that spills to the heap instead of failing
#[derive(Debug)]
pub struct FallbackAllocator<'buf> {
    arena: BlockAllocator<'buf>,
    heap_blocks: usize,
    heap_bytes: usize,
    spills: usize,
}

impl<'buf> FallbackAllocator<'buf> {
    /// Wrap an existing arena
    pub fn new(arena: BlockAllocator<'buf>) -> Self {
        Self {
            arena,
            heap_blocks: 0,
            heap_bytes: 0,
            spills: 0,
        }
    }

    /// Build the arena and the wrapper in one step
    pub fn from_buffer(buffer: &'buf mut [u8]) -> Self {
        Self::new(BlockAllocator::new(buffer))
    }

    /// The wrapped arena
    pub fn arena(&self) -> &BlockAllocator<'buf> {
        &self.arena
    }

    /// Unwrap, leaving any live heap blocks to their owners
    pub fn into_inner(self) -> BlockAllocator<'buf> {
        self.arena
    }

    /// Number of requests served by the heap since creation
    pub fn spills(&self) -> usize {
        self.spills
    }

    fn allocate_heap(&mut self, size: usize) -> NonNull<u8> {
        let layout = heap_layout(size);
        // SAFETY: `heap_layout` never produces a zero-sized layout
        let raw = unsafe { alloc::alloc(layout) };
        let Some(block) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        self.spills += 1;
        self.heap_blocks += 1;
        self.heap_bytes += layout.size();
        logging::log_fallback(size, self.spills, self.arena.remaining());
        block
    }
}

impl MemorySource for FallbackAllocator<'_> {
    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        match self.arena.try_allocate(size) {
            Some(block) => block,
            None => self.allocate_heap(size),
        }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        assert!(!ptr.is_null(), "double free of null");

        if self.arena.contains(ptr) {
            self.arena.deallocate(ptr, size);
            return;
        }

        let layout = heap_layout(size);
        alloc::dealloc(ptr, layout);
        self.heap_blocks = self.heap_blocks.saturating_sub(1);
        self.heap_bytes = self.heap_bytes.saturating_sub(layout.size());
        logging::log_deallocation(size, ptr);
    }

    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8> {
        let fresh = self.allocate(new_size);
        ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old_size.min(new_size));
        self.deallocate(ptr.as_ptr(), old_size);

        logging::log_reallocation(old_size, new_size, fresh.as_ptr());
        fresh
    }

    fn reset(&mut self) {
        if self.heap_blocks > 0 {
            logging::log_reset_with_heap_blocks(self.heap_blocks, self.heap_bytes);
        }
        self.arena.reset();
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            heap_blocks: self.heap_blocks,
            heap_bytes: self.heap_bytes,
            ..self.arena.stats()
        }
    }
}

/// Heap layout for a block of `size` bytes
///
/// Zero-sized requests are widened to one byte; the size overflowing
/// `isize` is a contract violation and fatal.
pub(super) fn heap_layout(size: usize) -> Layout {
    match Layout::from_size_align(size.max(1), ALIGNMENT) {
        Ok(layout) => layout,
        Err(_) => panic!("allocation of {} bytes exceeds the address space", size),
    }
}
