/*!
 * Heap Traits
 * Seam abstractions for allocation, inspection, and time
 */

use super::types::{BlockSnapshot, HeapResult, HeapStats};
use crate::core::types::{Address, Size, Tick};
use std::time::Instant;

/// Heap allocator interface, implemented by handles that provide their own
/// mutual exclusion (every call covers one whole locked operation)
pub trait Allocator: Send + Sync {
    /// Allocate `size` payload bytes with a diagnostic tag
    fn alloc(&self, size: Size, tag: &str) -> HeapResult<Address>;

    /// Allocate a reference-counted block
    fn alloc_ref_counted(&self, id: u32, size: Size) -> HeapResult<Address>;

    /// Release an allocation (drops one reference on ref-counted blocks)
    fn free(&self, addr: Address) -> HeapResult<()>;
}

/// Read-only heap introspection for presentation layers
pub trait HeapInspect: Send + Sync {
    /// Get overall heap statistics
    fn stats(&self) -> HeapStats;

    /// Copy the address-ordered block list
    fn snapshot(&self) -> Vec<BlockSnapshot>;

    /// Copy the block list only if the heap is not currently held by another
    /// operation; the safe pattern for diagnostic readers that must not
    /// observe torn state
    fn try_snapshot(&self) -> Option<Vec<BlockSnapshot>> {
        Some(self.snapshot())
    }
}

/// Monotonic tick collaborator, used only to stamp `alloc_ticks`
pub trait TickSource: Send {
    fn ticks(&self) -> Tick;
}

/// Default tick source: nanoseconds since heap construction
pub struct MonotonicTicks {
    epoch: Instant,
}

impl Default for MonotonicTicks {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl TickSource for MonotonicTicks {
    fn ticks(&self) -> Tick {
        self.epoch.elapsed().as_nanos() as Tick
    }
}
