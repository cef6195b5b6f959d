/*!
 * Block Arena
 * Fixed-layout block metadata stored in a slot arena and linked by handle
 *
 * Every byte of the region belongs to exactly one block. Block metadata lives
 * in arena slots rather than inside the region itself; a block's identity is
 * its handle, and its place in the region is its header address. Four
 * relationships thread through the same entries:
 *
 * - `prev`/`next`: the address-ordered circular ring over all blocks
 * - `next_free_small`/`next_free_large`: the two free chains (each chain is
 *   the exact reverse of the other), anchored at the sentinel slot
 * - `rc_next`/`rc_prev`: the ring of ref-counted blocks, head = newest
 */

use super::types::BlockFlags;
use crate::core::types::{Address, Size, Tick};

/// Handle of a block slot in the arena
pub(crate) type BlockRef = usize;

/// The sentinel ("dummy") slot: a header-only pseudo-block anchoring the free
/// chains and the ref-count ring. Never part of the address-ordered ring.
pub(crate) const SENTINEL: BlockRef = 0;

/// Bytes of region space accounted to every block header
pub(crate) const HEADER_SIZE: Size = 0x40;

/// Block start addresses and spans are multiples of this
pub(crate) const ALIGNMENT: Size = 16;

/// Byte written over freshly allocated payloads
pub(crate) const FILL_ALLOC: u8 = 0xCC;

/// Byte written over freed payloads before they rejoin the pool
pub(crate) const FILL_FREE: u8 = 0xDE;

/// Round `size` up to the block alignment
#[inline]
pub(crate) fn align_up(size: Size) -> Size {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Free/used state of a block.
///
/// A free block's `capacity` excludes its own header; an allocated block's
/// `total` includes it. `span()` is the full footprint either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
    Free { capacity: Size },
    Allocated { total: Size },
}

#[derive(Debug, Clone)]
pub(crate) struct Block {
    /// Header address within the region
    pub addr: Address,
    pub state: BlockState,

    /// Address-ordered ring
    pub prev: BlockRef,
    pub next: BlockRef,

    /// Free chain links. Stale on allocated blocks: only ever dereferenced
    /// through a currently free block or the sentinel.
    pub next_free_small: BlockRef,
    pub next_free_large: BlockRef,

    /// Ref-count ring links. Meaningful only while `flags.ref_counted`.
    pub rc_next: BlockRef,
    pub rc_prev: BlockRef,

    /// User-supplied identifier for ref-counted blocks
    pub id: u32,
    /// Always exactly 1 on allocated non-ref-counted blocks
    pub ref_count: u16,
    pub flags: BlockFlags,
    /// Diagnostic tag, opaque at this layer
    pub tag: Option<String>,
    /// Tick-source stamp taken when the block was handed out
    pub alloc_ticks: Tick,
}

impl Block {
    /// A free block covering `[addr, addr + capacity + HEADER_SIZE)`,
    /// not yet linked anywhere.
    pub fn free(addr: Address, capacity: Size) -> Self {
        Self {
            addr,
            state: BlockState::Free { capacity },
            prev: SENTINEL,
            next: SENTINEL,
            next_free_small: SENTINEL,
            next_free_large: SENTINEL,
            rc_next: SENTINEL,
            rc_prev: SENTINEL,
            id: 0,
            ref_count: 0,
            flags: BlockFlags::default(),
            tag: None,
            alloc_ticks: 0,
        }
    }

    /// A freshly allocated block with reset metadata, not yet ring-linked.
    pub fn allocated(addr: Address, total: Size) -> Self {
        Self {
            state: BlockState::Allocated { total },
            ref_count: 1,
            ..Self::free(addr, 0)
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self.state, BlockState::Free { .. })
    }

    /// Payload bytes available to an owner (excludes the header)
    #[inline]
    pub fn capacity(&self) -> Size {
        match self.state {
            BlockState::Free { capacity } => capacity,
            BlockState::Allocated { total } => total - HEADER_SIZE,
        }
    }

    /// Full footprint of the block including its header
    #[inline]
    pub fn span(&self) -> Size {
        match self.state {
            BlockState::Free { capacity } => capacity + HEADER_SIZE,
            BlockState::Allocated { total } => total,
        }
    }

    /// First payload byte
    #[inline]
    pub fn data_address(&self) -> Address {
        self.addr + HEADER_SIZE
    }

    /// Reset ownership metadata, as done on every path that hands a block out
    pub fn reset_meta(&mut self) {
        self.id = 0;
        self.flags = BlockFlags::default();
        self.ref_count = 1;
    }
}

/// Slot arena giving blocks stable handles across splits and merges.
///
/// Slot 0 is always the sentinel. Released slots are recycled LIFO; a handle
/// is only valid between its `insert` and `release`, which the linked
/// structures guarantee by construction.
#[derive(Debug)]
pub(crate) struct BlockArena {
    slots: Vec<Block>,
    free_slots: Vec<BlockRef>,
}

impl BlockArena {
    pub fn new() -> Self {
        // The sentinel's address and span are never used in ring arithmetic;
        // give it an address no real block can have.
        let mut sentinel = Block::free(Address::MAX, 0);
        sentinel.ref_count = 0;
        Self {
            slots: vec![sentinel],
            free_slots: Vec::new(),
        }
    }

    pub fn insert(&mut self, block: Block) -> BlockRef {
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = block;
                slot
            }
            None => {
                self.slots.push(block);
                self.slots.len() - 1
            }
        }
    }

    pub fn release(&mut self, handle: BlockRef) {
        debug_assert_ne!(handle, SENTINEL, "sentinel slot is never released");
        self.free_slots.push(handle);
    }

    /// Live blocks, excluding the sentinel
    pub fn len(&self) -> usize {
        self.slots.len() - 1 - self.free_slots.len()
    }
}

impl std::ops::Index<BlockRef> for BlockArena {
    type Output = Block;

    #[inline]
    fn index(&self, handle: BlockRef) -> &Block {
        &self.slots[handle]
    }
}

impl std::ops::IndexMut<BlockRef> for BlockArena {
    #[inline]
    fn index_mut(&mut self, handle: BlockRef) -> &mut Block {
        &mut self.slots[handle]
    }
}
