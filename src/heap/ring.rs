/*!
 * Block Ring
 * Split and coalesce over the address-ordered circular ring
 */

use super::block::{Block, BlockRef, BlockState, HEADER_SIZE};
use super::free_list::FreeClass;
use super::Heap;
use crate::core::types::Size;

impl Heap {
    /// Carve an allocation of `alloc_total` bytes (header included, already
    /// aligned) out of the free `block`. Returns the allocated block.
    ///
    /// The two request classes consume a free block from opposite ends: small
    /// requests take the high-address end, so the free remainder keeps the
    /// original header and its chain links; large requests take the
    /// low-address end, reusing the original header, and the remainder is a
    /// new free block that has to be rethreaded.
    ///
    /// A leftover too small to hold a header plus payload is absorbed into
    /// the allocation instead of becoming a block.
    pub(crate) fn split(
        &mut self,
        block: BlockRef,
        alloc_total: Size,
        class: FreeClass,
    ) -> BlockRef {
        let span = self.arena[block].span();
        debug_assert!(span >= alloc_total);
        let leftover = span - alloc_total;

        if leftover <= HEADER_SIZE {
            // No room for a second block: convert in place, taking the whole
            // span (the slack is invisible internal fragmentation).
            self.free_list_unlink(block);
            self.arena[block].state = BlockState::Allocated { total: span };
            self.arena[block].reset_meta();
            self.used_bytes += span;
            return block;
        }

        match class {
            FreeClass::Small => {
                let addr = self.arena[block].addr + leftover;
                let new_block = self.arena.insert(Block::allocated(addr, alloc_total));
                // The remainder keeps the low header, so its chain links and
                // list position stay valid untouched.
                self.arena[block].state = BlockState::Free {
                    capacity: leftover - HEADER_SIZE,
                };
                self.ring_insert_after(block, new_block);
                self.by_addr.insert(addr, new_block);
                self.block_count += 1;
                self.used_bytes += alloc_total;
                new_block
            }
            FreeClass::Large => {
                self.free_list_unlink(block);
                let remainder_addr = self.arena[block].addr + alloc_total;
                let remainder = self.arena.insert(Block::free(
                    remainder_addr,
                    leftover - HEADER_SIZE,
                ));
                self.arena[block].state = BlockState::Allocated { total: alloc_total };
                self.arena[block].reset_meta();
                self.ring_insert_after(block, remainder);
                self.by_addr.insert(remainder_addr, remainder);
                self.block_count += 1;
                self.used_bytes += alloc_total;
                // The new high-address remainder must be rethreaded into the
                // free chains from scratch.
                self.free_list_insert(remainder);
                block
            }
        }
    }

    /// Link `new_block` into the address ring directly after `block`
    pub(crate) fn ring_insert_after(&mut self, block: BlockRef, new_block: BlockRef) {
        let next = self.arena[block].next;
        self.arena[new_block].prev = block;
        self.arena[new_block].next = next;
        self.arena[next].prev = new_block;
        self.arena[block].next = new_block;
    }

    /// Merge the free `block` with its free, address-contiguous ring
    /// neighbors. At most two merges happen: the successor is folded into
    /// `block`, then `block` into its predecessor. Returns the handle of the
    /// surviving block, which the eviction path checks for sufficiency.
    pub(crate) fn coalesce(&mut self, block: BlockRef) -> BlockRef {
        debug_assert!(self.arena[block].is_free());

        let next = self.arena[block].next;
        if self.arena[next].is_free()
            && self.arena[block].addr + self.arena[block].span() == self.arena[next].addr
        {
            self.merge_into(block, next);
        }

        let prev = self.arena[block].prev;
        if self.arena[prev].is_free()
            && self.arena[prev].addr + self.arena[prev].span() == self.arena[block].addr
        {
            self.merge_into(prev, block);
            return prev;
        }

        block
    }

    /// Fold the free block `other` into the free block `target`, which must
    /// directly precede it in the region. `other`'s handle dies here.
    fn merge_into(&mut self, target: BlockRef, other: BlockRef) {
        debug_assert!(self.arena[target].is_free() && self.arena[other].is_free());
        debug_assert_eq!(
            self.arena[target].addr + self.arena[target].span(),
            self.arena[other].addr
        );

        let other_span = self.arena[other].span();
        if let BlockState::Free { capacity } = &mut self.arena[target].state {
            *capacity += other_span;
        }

        self.free_list_unlink(other);

        let prev = self.arena[other].prev;
        let next = self.arena[other].next;
        self.arena[prev].next = next;
        self.arena[next].prev = prev;

        self.by_addr.remove(&self.arena[other].addr);
        self.arena.release(other);
        self.block_count -= 1;
    }
}
