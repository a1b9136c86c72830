//! Property tests for the arena and fallback memory sources

use proptest::prelude::*;
use scriptbridge::{ArenaBuffer, BlockAllocator, FallbackAllocator, MemorySource};

const ARENA_SIZE: usize = 64 * 1024;

fn within(arena: &BlockAllocator<'_>, ptr: *const u8, size: usize) -> bool {
    let start = ptr as usize;
    start >= arena.begin() as usize && start + size <= arena.end() as usize
}

proptest! {
    #[test]
    fn test_blocks_are_aligned_and_in_bounds(sizes in prop::collection::vec(0usize..512, 1..64)) {
        let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
        let mut arena = BlockAllocator::new(buffer.as_mut_slice());

        for size in sizes {
            let Some(block) = arena.try_allocate(size) else { break };
            prop_assert_eq!(block.as_ptr() as usize % 8, 0);
            prop_assert!(within(&arena, block.as_ptr(), size.max(1)));
        }
    }

    #[test]
    fn test_live_blocks_never_overlap(sizes in prop::collection::vec(1usize..300, 1..48)) {
        let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
        let mut arena = BlockAllocator::new(buffer.as_mut_slice());

        let mut spans: Vec<(usize, usize)> = sizes
            .iter()
            .filter_map(|&size| arena.try_allocate(size).map(|b| (b.as_ptr() as usize, size)))
            .collect();
        spans.sort_unstable();

        for pair in spans.windows(2) {
            prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn test_small_free_is_reused_first(noise in prop::collection::vec(1usize..200, 0..16), size in 1usize..=64) {
        let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
        let mut arena = BlockAllocator::new(buffer.as_mut_slice());
        for n in noise {
            arena.allocate(n);
        }

        let block = arena.allocate(size);
        unsafe { arena.deallocate(block.as_ptr(), size) };
        prop_assert_eq!(arena.allocate(size), block);
    }

    #[test]
    fn test_reset_rewinds(sizes in prop::collection::vec(1usize..256, 1..32)) {
        let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
        let mut arena = BlockAllocator::new(buffer.as_mut_slice());
        for size in &sizes {
            let block = arena.allocate(*size);
            if size % 2 == 0 {
                unsafe { arena.deallocate(block.as_ptr(), *size) };
            }
        }

        arena.reset();
        prop_assert_eq!(arena.stats().used, 0);
        prop_assert_eq!(arena.stats().free_blocks, 0);
        prop_assert_eq!(arena.allocate(sizes[0]).as_ptr() as *const u8, arena.begin());
    }

    #[test]
    fn test_reallocate_keeps_prefix(data in prop::collection::vec(any::<u8>(), 1..256), grow in 0usize..512) {
        let mut buffer = ArenaBuffer::new(ARENA_SIZE).unwrap();
        let mut arena = BlockAllocator::new(buffer.as_mut_slice());

        let old_size = data.len();
        let block = arena.allocate(old_size);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), block.as_ptr(), old_size);
            let new_size = old_size + grow;
            let moved = arena.reallocate(block, old_size, new_size);
            let prefix = std::slice::from_raw_parts(moved.as_ptr(), old_size);
            prop_assert_eq!(prefix, data.as_slice());
        }
    }

    #[test]
    fn test_fallback_never_fails(sizes in prop::collection::vec(1usize..2048, 1..40)) {
        let mut buffer = ArenaBuffer::new(4096).unwrap();
        let mut memory = FallbackAllocator::from_buffer(buffer.as_mut_slice());

        let blocks: Vec<_> = sizes.iter().map(|&size| (memory.allocate(size), size)).collect();
        for &(block, size) in &blocks {
            prop_assert_eq!(block.as_ptr() as usize % 8, 0);
            if memory.arena().contains(block.as_ptr()) {
                prop_assert!(within(memory.arena(), block.as_ptr(), size));
            }
        }

        let free_before = memory.arena().stats().free_blocks;
        let heap: Vec<_> = blocks
            .iter()
            .copied()
            .filter(|(b, _)| !memory.arena().contains(b.as_ptr()))
            .collect();
        for &(block, size) in &heap {
            unsafe { memory.deallocate(block.as_ptr(), size) };
        }
        prop_assert_eq!(memory.arena().stats().free_blocks, free_before);
        prop_assert_eq!(memory.stats().heap_blocks, 0);
        prop_assert!(memory.spills() >= heap.len());
    }
}
