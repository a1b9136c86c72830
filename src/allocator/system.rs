//! Heap passthrough - the runtime's stock `realloc`/`free` behaviour
//!
//! Used as the baseline the arena is benchmarked against, and as a memory
//! source for hosts that do not need a fixed budget.

use super::fallback::heap_layout;
use super::{AllocatorStats, MemorySource};
use crate::logging;
use core::ptr::NonNull;
use std::alloc;

/// Allocator backed directly by the global heap
#[derive(Debug, Default)]
pub struct SystemAllocator {
    live_blocks: usize,
    live_bytes: usize,
}

impl SystemAllocator {
    pub const fn new() -> Self {
        Self {
            live_blocks: 0,
            live_bytes: 0,
        }
    }
}

impl MemorySource for SystemAllocator {
    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        let layout = heap_layout(size);
        // SAFETY: `heap_layout` never produces a zero-sized layout
        let raw = unsafe { alloc::alloc(layout) };
        let Some(block) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        self.live_blocks += 1;
        self.live_bytes += layout.size();
        logging::log_allocation(size, block.as_ptr(), false);
        block
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        assert!(!ptr.is_null(), "double free of null");

        let layout = heap_layout(size);
        alloc::dealloc(ptr, layout);
        self.live_blocks = self.live_blocks.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(layout.size());
        logging::log_deallocation(size, ptr);
    }

    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8> {
        let old_layout = heap_layout(old_size);
        let new_layout = heap_layout(new_size);
        let raw = alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size());
        let Some(block) = NonNull::new(raw) else {
            alloc::handle_alloc_error(new_layout);
        };

        self.live_bytes = self.live_bytes.saturating_sub(old_layout.size()) + new_layout.size();
        logging::log_reallocation(old_size, new_size, block.as_ptr());
        block
    }

    /// Heap blocks belong to their users; there is nothing to rewind
    fn reset(&mut self) {}

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            heap_blocks: self.live_blocks,
            heap_bytes: self.live_bytes,
            ..AllocatorStats::default()
        }
    }
}
