//! Fixed-capacity arena - O(1) bump allocation with a single-class free list
//!
//! Design: the runtime issues a stream of small, similarly sized blocks and
//! frees them in no particular order. Blocks of the minimum class are
//! threaded onto an intrusive free list and reused LIFO; larger blocks are
//! only ever reclaimed by [`BlockAllocator::reset`].

use super::{block_size, is_reclaimable, AllocatorStats, MemorySource, ALIGNMENT};
use crate::logging;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

/// Free-list node overlaid on the first word of a reclaimed block
///
/// Sound only because every reclaimable block is at least
/// [`super::MIN_BLOCK_SIZE`] bytes and aligned to [`ALIGNMENT`].
#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

/// Bump + free-list allocator over a caller-supplied buffer
///
/// The buffer is borrowed for `'buf`; the allocator never frees it and has
/// no cleanup of its own. `begin <= cursor <= end` holds at all times.
#[derive(Debug)]
pub struct BlockAllocator<'buf> {
    begin: *mut u8,
    end: *mut u8,
    cursor: *mut u8,
    free_list: Option<NonNull<FreeBlock>>,
    free_blocks: usize,
    live_blocks: usize,
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl<'buf> BlockAllocator<'buf> {
    /// Create an arena over `buffer`
    ///
    /// `begin` is the first 8-aligned byte of the buffer, so a misaligned
    /// slice loses up to seven bytes of capacity.
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        let len = buffer.len();
        let base = buffer.as_mut_ptr();
        let skip = base.align_offset(ALIGNMENT).min(len);

        // SAFETY: both offsets are within (or one past the end of) `buffer`
        let (begin, end) = unsafe { (base.add(skip), base.add(len)) };

        Self {
            begin,
            end,
            cursor: begin,
            free_list: None,
            free_blocks: 0,
            live_blocks: 0,
            _buffer: PhantomData,
        }
    }

    /// First usable address
    #[inline]
    pub fn begin(&self) -> *const u8 {
        self.begin
    }

    /// Exclusive upper bound
    #[inline]
    pub fn end(&self) -> *const u8 {
        self.end
    }

    /// Usable bytes between `begin` and `end`
    #[inline]
    pub fn capacity(&self) -> usize {
        self.end as usize - self.begin as usize
    }

    /// Bytes left for bump allocation (free-list blocks not counted)
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end as usize - self.cursor as usize
    }

    /// Whether `ptr` lies inside this arena's address range
    ///
    /// Every arena block starts strictly before `end`, so the range is
    /// half-open; a heap block placed right after the buffer is not claimed.
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.begin as usize && addr < self.end as usize
    }

    /// Allocate without failing: `None` when the arena cannot serve `size`
    pub fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let rounded = block_size(size)?;

        if is_reclaimable(size) {
            if let Some(head) = self.free_list {
                // SAFETY: nodes on the list were written by `deallocate` and
                // the blocks stay untouched until popped here
                self.free_list = unsafe { head.as_ref().next };
                self.free_blocks -= 1;
                self.live_blocks += 1;
                logging::log_allocation(size, head.as_ptr().cast(), true);
                return Some(head.cast());
            }
        }

        let pad = self.cursor.align_offset(ALIGNMENT);
        let needed = pad.checked_add(rounded)?;
        if needed > self.remaining() {
            return None;
        }

        // SAFETY: `needed <= remaining`, so both pointers stay within the buffer
        let block = unsafe { self.cursor.add(pad) };
        self.cursor = unsafe { block.add(rounded) };
        self.live_blocks += 1;

        logging::log_allocation(size, block, false);
        NonNull::new(block)
    }

    fn exhausted(&self, size: usize) -> ! {
        logging::log_arena_exhausted(size, self.remaining());
        panic!(
            "arena exhausted: requested {} bytes with {} of {} remaining",
            size,
            self.remaining(),
            self.capacity()
        );
    }
}

impl MemorySource for BlockAllocator<'_> {
    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        match self.try_allocate(size) {
            Some(block) => block,
            None => self.exhausted(size),
        }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        assert!(!ptr.is_null(), "double free of null");
        debug_assert!(self.contains(ptr), "block {:p} is not owned by this arena", ptr);

        self.live_blocks = self.live_blocks.saturating_sub(1);
        logging::log_deallocation(size, ptr);

        if is_reclaimable(size) {
            let node = ptr.cast::<FreeBlock>();
            node.write(FreeBlock {
                next: self.free_list,
            });
            self.free_list = NonNull::new(node);
            self.free_blocks += 1;
        }
        // Larger blocks stay burnt until reset
    }

    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8> {
        let fresh = self.allocate(new_size);
        ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old_size.min(new_size));
        self.deallocate(ptr.as_ptr(), old_size);

        logging::log_reallocation(old_size, new_size, fresh.as_ptr());
        fresh
    }

    fn reset(&mut self) {
        logging::log_arena_reset(self.capacity(), self.cursor as usize - self.begin as usize);
        self.cursor = self.begin;
        self.free_list = None;
        self.free_blocks = 0;
        self.live_blocks = 0;
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            capacity: self.capacity(),
            used: self.cursor as usize - self.begin as usize,
            free_blocks: self.free_blocks,
            live_blocks: self.live_blocks,
            heap_blocks: 0,
            heap_bytes: 0,
        }
    }
}
