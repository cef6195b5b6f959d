/*!
 * Free List Index
 * The two free chains threading through free blocks only
 *
 * Both chains are traversal orders of the same circular list of free blocks,
 * anchored at the sentinel: `next_free_large` runs in insertion order
 * (approximately ascending address) and `next_free_small` is its exact
 * reverse. There is no separate back-pointer for free-chain traversal; the
 * predecessor needed to splice a block in is found by walking the address
 * ring backward to the nearest free block. That backward scan is what keeps
 * the chain order aligned with address order after splits and merges.
 */

use super::block::{BlockRef, SENTINEL};
use super::Heap;
use crate::core::types::Size;

/// Which free chain an allocation request searches, chosen by the request
/// size against the configured threshold, never by the block's own size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FreeClass {
    /// Scans `next_free_small`: high-address blocks first
    Small,
    /// Scans `next_free_large`: low-address blocks first
    Large,
}

impl Heap {
    /// First-fit scan of the requested chain. `alloc_total` is the full
    /// aligned footprint (header included); a free block fits when its span
    /// covers it. Wrapping back to the sentinel means no fit.
    pub(crate) fn find_fit(&self, class: FreeClass, alloc_total: Size) -> Option<BlockRef> {
        let mut block = match class {
            FreeClass::Small => self.arena[SENTINEL].next_free_small,
            FreeClass::Large => self.arena[SENTINEL].next_free_large,
        };
        while block != SENTINEL {
            debug_assert!(self.arena[block].is_free(), "free chain holds a used block");
            if self.arena[block].span() >= alloc_total {
                return Some(block);
            }
            block = match class {
                FreeClass::Small => self.arena[block].next_free_small,
                FreeClass::Large => self.arena[block].next_free_large,
            };
        }
        None
    }

    /// Splice `block` into both free chains.
    ///
    /// The insertion point is found by the backward ring scan: walk `prev`
    /// links from `block` until a free block appears. Reaching `block` itself
    /// means no other free block exists and it becomes the chain head at the
    /// sentinel; otherwise it is spliced directly after that neighbor in
    /// large-chain order (and so directly before it in small-chain order).
    pub(crate) fn free_list_insert(&mut self, block: BlockRef) {
        debug_assert!(self.arena[block].is_free());

        let mut cursor = self.arena[block].prev;
        while !self.arena[cursor].is_free() {
            debug_assert_ne!(cursor, SENTINEL, "address ring reached the sentinel");
            cursor = self.arena[cursor].prev;
        }

        if cursor == block {
            let head = self.arena[SENTINEL].next_free_small;
            self.arena[head].next_free_large = block;
            self.arena[block].next_free_large = SENTINEL;
            self.arena[block].next_free_small = head;
            self.arena[SENTINEL].next_free_small = block;
        } else {
            let after = self.arena[cursor].next_free_large;
            self.arena[after].next_free_small = block;
            self.arena[block].next_free_small = cursor;
            self.arena[block].next_free_large = after;
            self.arena[cursor].next_free_large = block;
        }
    }

    /// Unlink `block` from both free chains in O(1) by repairing the paired
    /// links around it. Valid only while the block is still threaded (free,
    /// or in the middle of being converted to allocated).
    pub(crate) fn free_list_unlink(&mut self, block: BlockRef) {
        let small = self.arena[block].next_free_small;
        let large = self.arena[block].next_free_large;
        self.arena[small].next_free_large = large;
        self.arena[large].next_free_small = small;
    }
}
