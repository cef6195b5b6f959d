/*!
 * Ref-Count Registry
 * Ring of reference-counted blocks and the eviction scan
 *
 * Ref-counted blocks form a circular doubly-linked ring through the sentinel,
 * newest at the head. A block whose count drops to zero without the
 * free-on-zero flag stays allocated and stays in this ring: its memory is
 * retained for cheap re-acquisition until an allocation failure forces the
 * eviction scan to reclaim it, oldest first.
 */

use super::block::{BlockRef, SENTINEL};
use super::Heap;
use crate::core::types::Size;
use log::{debug, info};

impl Heap {
    /// Insert `block` at the head (most recently allocated end) of the
    /// ref-count ring
    pub(crate) fn rc_push_front(&mut self, block: BlockRef) {
        let head = self.arena[SENTINEL].rc_next;
        self.arena[head].rc_prev = block;
        self.arena[block].rc_next = head;
        self.arena[block].rc_prev = SENTINEL;
        self.arena[SENTINEL].rc_next = block;
    }

    /// Unlink `block` from the ref-count ring
    pub(crate) fn rc_unlink(&mut self, block: BlockRef) {
        let next = self.arena[block].rc_next;
        let prev = self.arena[block].rc_prev;
        self.arena[next].rc_prev = prev;
        self.arena[prev].rc_next = next;
        self.arena[block].rc_next = SENTINEL;
        self.arena[block].rc_prev = SENTINEL;
    }

    /// Reclaim retained ref-counted blocks until one coalesces into a block
    /// able to hold `required` payload bytes.
    ///
    /// Scans the ring from the tail (oldest allocation) toward the head.
    /// Candidates must be reuse-permitted, still allocated, and at zero ref
    /// count. Each candidate is unlinked, reclaimed, and coalesced; the scan
    /// stops as soon as the merged result is big enough. Returns false when
    /// the ring is exhausted without producing a sufficient block, in which
    /// case the pending allocation fails for good.
    pub(crate) fn evict_for(&mut self, required: Size) -> bool {
        let mut block = self.arena[SENTINEL].rc_prev;
        while block != SENTINEL {
            // Capture the older neighbor before any unlinking clobbers it.
            let older = self.arena[block].rc_prev;

            let candidate = &self.arena[block];
            if !candidate.flags.prevent_reuse
                && !candidate.is_free()
                && candidate.ref_count == 0
            {
                let addr = candidate.addr;
                let id = candidate.id;
                self.rc_unlink(block);
                let merged = self.do_free(block);
                let merged_capacity = self.arena[merged].capacity();
                debug!(
                    "Evicted retained block id={} at 0x{:x}, coalesced capacity {} (need {})",
                    id, addr, merged_capacity, required
                );
                if merged_capacity >= required {
                    info!(
                        "Eviction satisfied pending request: {} bytes available at 0x{:x}",
                        merged_capacity, self.arena[merged].addr
                    );
                    return true;
                }
            }

            block = older;
        }
        false
    }
}
