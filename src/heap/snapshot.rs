/*!
 * Heap Snapshot
 * Read-only iteration over the address-ordered block ring
 *
 * This is the entire surface a presentation layer consumes: a point-in-time
 * copy of every block's address, state, ref count, flags, tag, and timestamp.
 * Persisting a snapshot is just serializing the iterated list; no format is
 * prescribed here.
 */

use super::block::{BlockRef, SENTINEL};
use super::types::BlockSnapshot;
use super::Heap;

impl Heap {
    /// Iterate the block ring in address order, starting at the root block
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            heap: self,
            cursor: Some(self.root),
        }
    }

    /// Copy the whole block list
    pub fn snapshot(&self) -> Vec<BlockSnapshot> {
        self.blocks().collect()
    }

    /// Assert every structural invariant the allocator maintains between
    /// public operations. Panics on violation: a failure here is a logic bug
    /// in the allocator, and continuing would risk corrupting the heap.
    ///
    /// Checks: the ring covers the region exactly once in address order; no
    /// two adjacent free blocks; used-byte accounting matches the ring; every
    /// free block appears in each chain exactly once and the two chains are
    /// exact reverses; ref-counted ring membership matches block flags.
    pub fn verify_integrity(&self) {
        // Ring coverage: contiguous, address-ordered, wrapping once.
        let mut expected_addr = 0;
        let mut spans = 0;
        let mut used = 0;
        let mut ring_free = Vec::new();
        let mut count = 0;
        let mut prev_free = false;
        let mut cursor = self.root;
        loop {
            let block = &self.arena[cursor];
            assert_eq!(block.addr, expected_addr, "gap or overlap in block ring");
            if block.is_free() {
                assert!(!prev_free, "two adjacent free blocks survived coalescing");
                ring_free.push(cursor);
            } else {
                used += block.span();
            }
            prev_free = block.is_free();
            spans += block.span();
            expected_addr += block.span();
            count += 1;
            cursor = block.next;
            if cursor == self.root {
                break;
            }
        }
        assert_eq!(spans, self.region.len(), "ring does not cover the region");
        assert_eq!(count, self.block_count, "block count out of sync");
        assert_eq!(used, self.used_bytes, "used-byte accounting out of sync");

        // Free chains: each free block exactly once, chains mutually reversed.
        let mut large_chain = Vec::new();
        let mut cursor = self.arena[SENTINEL].next_free_large;
        while cursor != SENTINEL {
            assert!(self.arena[cursor].is_free(), "used block on free chain");
            large_chain.push(cursor);
            assert!(
                large_chain.len() <= self.block_count,
                "free chain does not terminate"
            );
            cursor = self.arena[cursor].next_free_large;
        }
        let mut small_chain = Vec::new();
        let mut cursor = self.arena[SENTINEL].next_free_small;
        while cursor != SENTINEL {
            small_chain.push(cursor);
            assert!(
                small_chain.len() <= self.block_count,
                "free chain does not terminate"
            );
            cursor = self.arena[cursor].next_free_small;
        }
        small_chain.reverse();
        assert_eq!(large_chain, small_chain, "free chains are not reverses");

        let mut chain_sorted: Vec<BlockRef> = large_chain.clone();
        chain_sorted.sort_unstable();
        let mut ring_sorted = ring_free.clone();
        ring_sorted.sort_unstable();
        assert_eq!(
            chain_sorted, ring_sorted,
            "free chain membership does not match the ring"
        );

        // Ref-count ring: members are allocated, flagged blocks.
        let mut cursor = self.arena[SENTINEL].rc_next;
        let mut rc_len = 0;
        while cursor != SENTINEL {
            let block = &self.arena[cursor];
            assert!(block.flags.ref_counted, "unflagged block in ref-count ring");
            assert!(!block.is_free(), "free block in ref-count ring");
            rc_len += 1;
            assert!(rc_len <= self.block_count, "ref-count ring does not terminate");
            cursor = block.rc_next;
        }
    }

    fn snapshot_of(&self, handle: BlockRef) -> BlockSnapshot {
        let block = &self.arena[handle];
        BlockSnapshot {
            address: block.addr,
            data_address: block.data_address(),
            free: block.is_free(),
            capacity: block.capacity(),
            total_size: block.span(),
            id: block.id,
            ref_count: block.ref_count,
            flags: block.flags,
            tag: block.tag.clone(),
            alloc_ticks: block.alloc_ticks,
        }
    }
}

/// Iterator over the address-ordered block ring
pub struct Blocks<'a> {
    heap: &'a Heap,
    cursor: Option<BlockRef>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = BlockSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        let snapshot = self.heap.snapshot_of(current);
        let next = self.heap.arena[current].next;
        self.cursor = (next != self.heap.root).then_some(next);
        Some(snapshot)
    }
}
