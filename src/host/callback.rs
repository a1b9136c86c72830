//! The runtime's allocator callback
//!
//! `lua_Alloc` folds allocate, reallocate and free into one function. The
//! callback decodes it into an [`AllocRequest`] and lets the host's memory
//! source serve it.

use crate::allocator::{AllocRequest, MemorySource};
use crate::bridge::dispatch::panic_message;
use crate::logging;
use core::ffi::c_void;
use core::ptr;
use std::panic::{self, AssertUnwindSafe};

/// Allocator callback for a runtime whose `ud` is a `*mut A`
///
/// Allocator panics (arena exhausted, null free) are contract violations.
/// They are logged and end the process: unwinding into the runtime would
/// leave it with a half-applied allocation.
///
/// # Safety
/// `ud` must point to a live `A` that nothing else borrows during the call,
/// and `ptr`/`osize` must describe a block previously returned for `ud`.
pub(crate) unsafe extern "C-unwind" fn lua_alloc<A: MemorySource>(
    ud: *mut c_void,
    ptr: *mut c_void,
    osize: usize,
    nsize: usize,
) -> *mut c_void {
    let served = panic::catch_unwind(AssertUnwindSafe(|| {
        let Some(request) = AllocRequest::decode(ptr, osize, nsize) else {
            return ptr::null_mut();
        };
        let source = &mut *ud.cast::<A>();
        source.serve(request).cast::<c_void>()
    }));

    match served {
        Ok(block) => block,
        Err(payload) => {
            logging::log_allocator_abort(&panic_message(payload.as_ref()));
            std::process::abort()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{ArenaBuffer, BlockAllocator, FallbackAllocator, MemorySource};

    #[test]
    fn callback_serves_all_three_verbs() {
        let mut buffer = ArenaBuffer::new(1024).unwrap();
        let mut arena = BlockAllocator::new(buffer.as_mut_slice());
        let ud = (&mut arena as *mut BlockAllocator<'_>).cast::<c_void>();

        unsafe {
            // Fresh allocation: `osize` carries a type tag
            let block = lua_alloc::<BlockAllocator<'_>>(ud, ptr::null_mut(), 5, 24);
            assert!(!block.is_null());
            assert_eq!(block as usize % 8, 0);

            let grown = lua_alloc::<BlockAllocator<'_>>(ud, block, 24, 200);
            assert!(!grown.is_null());

            let freed = lua_alloc::<BlockAllocator<'_>>(ud, grown, 200, 0);
            assert!(freed.is_null());

            // free(NULL) is a no-op
            assert!(lua_alloc::<BlockAllocator<'_>>(ud, ptr::null_mut(), 0, 0).is_null());
        }

        let stats = arena.stats();
        assert_eq!(stats.live_blocks, 0);
        assert_eq!(stats.free_blocks, 1);
    }

    #[test]
    fn callback_spills_through_fallback() {
        let mut buffer = ArenaBuffer::new(128).unwrap();
        let mut memory = FallbackAllocator::from_buffer(buffer.as_mut_slice());
        let ud = (&mut memory as *mut FallbackAllocator<'_>).cast::<c_void>();

        unsafe {
            let big = lua_alloc::<FallbackAllocator<'_>>(ud, ptr::null_mut(), 0, 4096);
            assert!(!big.is_null());
            assert_eq!((*ud.cast::<FallbackAllocator<'_>>()).stats().heap_blocks, 1);
            lua_alloc::<FallbackAllocator<'_>>(ud, big, 4096, 0);
        }
        assert_eq!(memory.stats().heap_blocks, 0);
    }
}
