/*!
 * Ringheap Library
 * Segregated, address-ordered, coalescing heap allocator with
 * reference-counted soft-cache blocks
 */

pub mod core;
pub mod heap;

// Re-exports
pub use heap::{
    Allocator, BlockFlags, BlockSnapshot, Heap, HeapConfig, HeapError, HeapInspect, HeapPressure,
    HeapResult, HeapStats, MonotonicTicks, SharedHeap, TickSource,
};
