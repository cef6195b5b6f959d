/*!
 * Heap Allocator Facade
 * Allocation, reference-counted allocation, and free
 */

use super::block::{
    align_up, BlockRef, BlockState, ALIGNMENT, FILL_ALLOC, FILL_FREE, HEADER_SIZE, SENTINEL,
};
use super::free_list::FreeClass;
use super::types::{BlockFlags, HeapError, HeapResult};
use super::Heap;
use crate::core::types::{Address, Size, NULL_ADDRESS};
use log::{error, info, warn};

impl Heap {
    /// Allocate `size` payload bytes, tagged for diagnostics.
    ///
    /// Requests below the small-block threshold search the small chain (and
    /// consume the region from the high end); everything else searches the
    /// large chain. On exhaustion one eviction pass reclaims retained
    /// ref-counted blocks; if that cannot produce enough contiguous space the
    /// allocation fails with `OutOfMemory`.
    pub fn alloc(&mut self, size: Size, tag: &str) -> HeapResult<Address> {
        let class = if size < self.small_block_threshold {
            FreeClass::Small
        } else {
            FreeClass::Large
        };

        let block = self.alloc_block(class, size)?;

        let data = self.arena[block].data_address();
        if self.fill_patterns {
            self.region[data..data + size].fill(FILL_ALLOC);
        }

        let ticks = self.ticks.ticks();
        let entry = &mut self.arena[block];
        entry.next_free_small = SENTINEL;
        entry.next_free_large = SENTINEL;
        entry.tag = if tag.is_empty() {
            None
        } else {
            Some(tag.to_owned())
        };
        entry.alloc_ticks = ticks;

        self.bump_average(size);

        info!(
            "Allocated {} bytes at 0x{:x} ({:?} path)",
            size, data, class
        );
        Ok(data)
    }

    /// Allocate a reference-counted block of `size` payload bytes.
    ///
    /// Always takes the large path regardless of size. The block starts with
    /// a ref count of 1 and sits at the head of the ref-count ring. Payload
    /// bytes are not pre-filled.
    pub fn alloc_ref_counted(&mut self, id: u32, size: Size) -> HeapResult<Address> {
        let block = self.alloc_block(FreeClass::Large, size)?;

        let ticks = self.ticks.ticks();
        let entry = &mut self.arena[block];
        entry.id = id;
        entry.flags = BlockFlags::ref_counted();
        entry.tag = None;
        entry.alloc_ticks = ticks;

        self.bump_average(size);
        self.rc_push_front(block);

        let data = self.arena[block].data_address();
        info!(
            "Allocated ref-counted block id={} ({} bytes) at 0x{:x}",
            id, size, data
        );
        Ok(data)
    }

    /// Release an allocation obtained from this heap.
    ///
    /// Freeing the null address is a no-op. On a ref-counted block this drops
    /// one reference; the block is only reclaimed when the count reaches zero
    /// with the free-on-zero flag set, otherwise it stays allocated in the
    /// ref-count ring as a soft cache. Non-ref-counted blocks are reclaimed
    /// immediately.
    pub fn free(&mut self, addr: Address) -> HeapResult<()> {
        if addr == NULL_ADDRESS {
            return Ok(());
        }
        let block = self.lookup(addr)?;

        if self.arena[block].flags.ref_counted {
            if self.arena[block].ref_count != 0 {
                self.arena[block].ref_count -= 1;
                if self.arena[block].ref_count == 0 && self.arena[block].flags.free_on_zero {
                    self.rc_unlink(block);
                    self.do_free(block);
                } else {
                    info!(
                        "Released reference on block id={} at 0x{:x} (ref_count {})",
                        self.arena[block].id,
                        addr,
                        self.arena[block].ref_count
                    );
                }
            }
        } else {
            self.do_free(block);
        }
        Ok(())
    }

    /// Take another reference on a ref-counted block. Returns the new count.
    ///
    /// Fails at the counter's capacity rather than wrapping: a wrapped count
    /// of zero would mark a still-referenced block evictable.
    pub fn retain(&mut self, addr: Address) -> HeapResult<u16> {
        let block = self.lookup(addr)?;
        if !self.arena[block].flags.ref_counted {
            return Err(HeapError::InvalidAddress(addr));
        }
        let count = self.arena[block]
            .ref_count
            .checked_add(1)
            .ok_or(HeapError::RefCountExhausted(addr))?;
        self.arena[block].ref_count = count;
        Ok(count)
    }

    /// Protect a ref-counted block from eviction, or remove the protection
    pub fn set_prevent_reuse(&mut self, addr: Address, prevent: bool) -> HeapResult<()> {
        let block = self.lookup(addr)?;
        self.arena[block].flags.prevent_reuse = prevent;
        Ok(())
    }

    /// Make a ref-counted block reclaim immediately at zero ref count
    pub fn set_free_on_zero(&mut self, addr: Address, free_on_zero: bool) -> HeapResult<()> {
        let block = self.lookup(addr)?;
        self.arena[block].flags.free_on_zero = free_on_zero;
        Ok(())
    }

    /// Find a retained ref-counted block by id, newest first. Pair with
    /// `retain` to re-acquire a soft-cached resource without reallocating.
    pub fn find_ref_counted(&self, id: u32) -> Option<Address> {
        let mut cursor = self.arena[SENTINEL].rc_next;
        while cursor != SENTINEL {
            if self.arena[cursor].id == id {
                return Some(self.arena[cursor].data_address());
            }
            cursor = self.arena[cursor].rc_next;
        }
        None
    }

    /// Borrow the payload bytes of an allocated block
    pub fn payload(&self, addr: Address) -> HeapResult<&[u8]> {
        let block = self.lookup(addr)?;
        let capacity = self.arena[block].capacity();
        Ok(&self.region[addr..addr + capacity])
    }

    /// Mutably borrow the payload bytes of an allocated block
    pub fn payload_mut(&mut self, addr: Address) -> HeapResult<&mut [u8]> {
        let block = self.lookup(addr)?;
        let capacity = self.arena[block].capacity();
        Ok(&mut self.region[addr..addr + capacity])
    }

    /// First-fit search plus split, retrying once per reclaimed block under
    /// the eviction scan
    fn alloc_block(&mut self, class: FreeClass, size: Size) -> HeapResult<BlockRef> {
        // Header and alignment padding can push a near-usize::MAX request
        // past the address space; that is a request no region can hold.
        if size.checked_add(HEADER_SIZE + ALIGNMENT - 1).is_none() {
            return Err(self.out_of_memory(size));
        }
        let alloc_total = align_up(size + HEADER_SIZE);
        loop {
            if let Some(found) = self.find_fit(class, alloc_total) {
                return Ok(self.split(found, alloc_total, class));
            }
            if !self.evict_for(size) {
                return Err(self.out_of_memory(size));
            }
        }
    }

    fn out_of_memory(&self, size: Size) -> HeapError {
        let err = HeapError::OutOfMemory {
            requested: size,
            available: self.available_bytes(),
            used: self.used_bytes,
            total: self.region.len(),
        };
        error!("{}", err);
        err
    }

    /// Reclaim an allocated block: scrub the payload, flip it to free, thread
    /// it back into the free chains, and coalesce. Returns the surviving
    /// merged block.
    pub(crate) fn do_free(&mut self, block: BlockRef) -> BlockRef {
        debug_assert!(!self.arena[block].is_free());
        let total = self.arena[block].span();
        let data = self.arena[block].data_address();

        if self.fill_patterns && total > HEADER_SIZE {
            self.region[data..data + (total - HEADER_SIZE)].fill(FILL_FREE);
        }

        self.arena[block].tag = None;
        self.arena[block].state = BlockState::Free {
            capacity: total - HEADER_SIZE,
        };
        self.used_bytes -= total;

        info!(
            "Freed {} bytes at 0x{:x} ({} bytes now available)",
            total,
            data,
            self.available_bytes()
        );

        self.free_list_insert(block);
        self.coalesce(block)
    }

    /// Running average-allocation-size statistic
    fn bump_average(&mut self, size: Size) {
        self.average_alloc_size = if self.average_alloc_size != 0 {
            (self.average_alloc_size + size) / 2
        } else {
            size
        };
    }

    /// Resolve a data address back to its block handle
    fn lookup(&self, addr: Address) -> HeapResult<BlockRef> {
        let block = addr
            .checked_sub(HEADER_SIZE)
            .and_then(|header| self.by_addr.get(&header).copied())
            .ok_or(HeapError::InvalidAddress(addr))?;
        if self.arena[block].is_free() {
            warn!("Attempted to use a freed address: 0x{:x}", addr);
            return Err(HeapError::InvalidAddress(addr));
        }
        Ok(block)
    }
}
