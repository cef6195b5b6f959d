/*!
 * Heap Management
 *
 * Segregated, address-ordered, coalescing allocator over one contiguous
 * region, with reference-counted soft-cache blocks that are lazily reclaimed
 * under memory pressure.
 *
 * ## Structure
 *
 * - **Address ring**: every block, free or allocated, sits in one circular
 *   doubly-linked ring in address order, closed by linking the highest block
 *   back to the root (lowest) block.
 * - **Free chains**: free blocks additionally thread through two circular
 *   forward-only chains anchored at a sentinel. The "large" chain runs in
 *   insertion order (approximately ascending address); the "small" chain is
 *   its exact reverse. Small requests therefore consume the region from the
 *   high end and large requests from the low end, keeping short-lived small
 *   objects and long-lived large ones apart.
 * - **Ref-count ring**: ref-counted blocks form their own ring, newest at the
 *   head. A block whose count has dropped to zero stays allocated (a soft
 *   cache) until memory pressure evicts it, oldest first.
 *
 * ## Concurrency
 *
 * `Heap` is deliberately not thread-safe: splitting, chain repair, and
 * coalescing leave the structures transiently inconsistent, so every public
 * operation must run under external mutual exclusion. `SharedHeap` is the
 * lock-per-operation handle for shared use.
 */

mod allocator;
mod block;
mod free_list;
mod refcount;
mod ring;
mod shared;
mod snapshot;
mod traits;
mod types;

pub use shared::SharedHeap;
pub use snapshot::Blocks;
pub use traits::{Allocator, HeapInspect, MonotonicTicks, TickSource};
pub use types::{
    BlockFlags, BlockSnapshot, HeapConfig, HeapError, HeapPressure, HeapResult, HeapStats,
    DEFAULT_REGION_SIZE, DEFAULT_SMALL_BLOCK_THRESHOLD,
};

use crate::core::types::{Address, Size};
use ahash::RandomState;
use block::{Block, BlockArena, BlockRef, ALIGNMENT, HEADER_SIZE, SENTINEL};
use log::info;
use std::collections::HashMap;

/// The heap allocator.
///
/// Owns the byte region for its entire lifetime; all addresses handed out are
/// offsets into it. Public operations are `&mut self` and synchronous; none
/// may block or yield, and allocation failure is an ordinary `Err` value.
pub struct Heap {
    pub(crate) arena: BlockArena,
    pub(crate) region: Vec<u8>,
    /// Header address -> handle, for O(1) `free(ptr)` lookup
    pub(crate) by_addr: HashMap<Address, BlockRef, RandomState>,
    /// The lowest block; survives every merge, so the ring walk starts here
    pub(crate) root: BlockRef,
    pub(crate) small_block_threshold: Size,
    pub(crate) fill_patterns: bool,
    pub(crate) block_count: Size,
    pub(crate) used_bytes: Size,
    pub(crate) average_alloc_size: Size,
    pub(crate) ticks: Box<dyn TickSource>,
}

impl Heap {
    /// Create a heap with the default configuration
    pub fn with_capacity(region_size: Size) -> HeapResult<Self> {
        Self::new(HeapConfig::new(region_size))
    }

    pub fn new(config: HeapConfig) -> HeapResult<Self> {
        Self::with_tick_source(config, Box::new(MonotonicTicks::default()))
    }

    /// Create a heap with an injected tick source (used only to stamp
    /// `alloc_ticks`; no correctness dependency)
    pub fn with_tick_source(
        config: HeapConfig,
        ticks: Box<dyn TickSource>,
    ) -> HeapResult<Self> {
        let region_size = config.region_size;
        if region_size % ALIGNMENT != 0 {
            return Err(HeapError::MisalignedRegion(region_size));
        }
        // The root block needs a header plus at least one aligned payload slot.
        let minimum = HEADER_SIZE + ALIGNMENT;
        if region_size < minimum {
            return Err(HeapError::RegionTooSmall {
                region_size,
                minimum,
            });
        }

        let mut heap = Self {
            arena: BlockArena::new(),
            region: vec![0; region_size],
            by_addr: HashMap::with_hasher(RandomState::new()),
            root: SENTINEL,
            small_block_threshold: config.small_block_threshold,
            fill_patterns: config.fill_patterns,
            block_count: 0,
            used_bytes: 0,
            average_alloc_size: 0,
            ticks,
        };

        // The whole region starts as one free root block, ring-linked to
        // itself and the sole member of both free chains.
        let root = heap
            .arena
            .insert(Block::free(0, region_size - HEADER_SIZE));
        heap.arena[root].prev = root;
        heap.arena[root].next = root;
        heap.root = root;
        heap.by_addr.insert(0, root);
        heap.block_count = 1;
        heap.free_list_insert(root);

        info!(
            "Heap initialized: {} byte region, small-block threshold {}, fill patterns {}",
            region_size,
            heap.small_block_threshold,
            if heap.fill_patterns { "on" } else { "off" }
        );
        Ok(heap)
    }

    /// Total size of the managed region
    pub fn region_size(&self) -> Size {
        self.region.len()
    }

    /// Bytes consumed by allocated blocks, headers included
    pub fn used_bytes(&self) -> Size {
        self.used_bytes
    }

    /// Bytes not consumed by allocated blocks. Free block headers count as
    /// available here; a single allocation can never use all of it.
    pub fn available_bytes(&self) -> Size {
        self.region.len() - self.used_bytes
    }

    /// Number of blocks in the address ring, free and allocated
    pub fn block_count(&self) -> Size {
        self.block_count
    }

    /// Get heap info as (total, used, available)
    pub fn info(&self) -> (Size, Size, Size) {
        (
            self.region_size(),
            self.used_bytes,
            self.available_bytes(),
        )
    }

    /// Get overall heap statistics
    pub fn stats(&self) -> HeapStats {
        let mut free_blocks = 0;
        let mut cursor = self.arena[SENTINEL].next_free_large;
        while cursor != SENTINEL {
            free_blocks += 1;
            cursor = self.arena[cursor].next_free_large;
        }

        let mut ref_counted_blocks = 0;
        let mut cursor = self.arena[SENTINEL].rc_next;
        while cursor != SENTINEL {
            ref_counted_blocks += 1;
            cursor = self.arena[cursor].rc_next;
        }

        HeapStats {
            region_size: self.region.len(),
            used_bytes: self.used_bytes,
            available_bytes: self.available_bytes(),
            usage_percentage: (self.used_bytes as f64 / self.region.len() as f64) * 100.0,
            block_count: self.block_count,
            free_blocks,
            ref_counted_blocks,
            average_alloc_size: self.average_alloc_size,
        }
    }
}
