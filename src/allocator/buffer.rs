//! Owned backing memory for an arena
//!
//! Callers who already have a buffer (a stack array, a static) hand a slice
//! to [`super::BlockAllocator::new`] directly; this type covers the rest.

use super::ALIGNMENT;
use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Zeroed, 8-aligned heap buffer released on drop
pub struct ArenaBuffer {
    start: *mut u8,
    layout: Layout,
}

impl ArenaBuffer {
    /// Acquire `size` bytes from the system heap
    ///
    /// Returns `None` for a zero size or when the heap refuses.
    pub fn new(size: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, ALIGNMENT).ok()?;

        // SAFETY: layout has non-zero size
        let start = unsafe { alloc_zeroed(layout) };
        if start.is_null() {
            return None;
        }

        Some(Self { start, layout })
    }

    /// Buffer size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Borrow the whole buffer, typically to build an arena over it
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `start` owns `layout.size()` initialised bytes for our lifetime
        unsafe { core::slice::from_raw_parts_mut(self.start, self.layout.size()) }
    }
}

impl Drop for ArenaBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout
        unsafe {
            dealloc(self.start, self.layout);
        }
    }
}

impl core::fmt::Debug for ArenaBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArenaBuffer")
            .field("start", &self.start)
            .field("len", &self.layout.size())
            .finish()
    }
}
