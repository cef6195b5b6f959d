/*!
 * Ref-Counted Block Tests
 * Soft-cache retention, free-on-zero, eviction order, reuse protection
 */

use pretty_assertions::assert_eq;
use ringheap::{Heap, HeapError};

const HEADER_SIZE: usize = 0x40;

#[test]
fn test_zero_refcount_block_is_retained() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    let addr = heap.alloc_ref_counted(7, 500).unwrap();
    let used_before = heap.used_bytes();

    heap.free(addr).unwrap();

    // Last owner released it, but without free-on-zero the memory stays
    // allocated and the block stays in the ref-count ring.
    assert_eq!(heap.used_bytes(), used_before);
    assert_eq!(heap.stats().ref_counted_blocks, 1);
    assert_eq!(heap.find_ref_counted(7), Some(addr));

    // Further frees on a zero-count block are no-ops.
    heap.free(addr).unwrap();
    assert_eq!(heap.used_bytes(), used_before);
}

#[test]
fn test_free_on_zero_reclaims_immediately() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    let addr = heap.alloc_ref_counted(7, 500).unwrap();
    heap.set_free_on_zero(addr, true).unwrap();
    heap.free(addr).unwrap();

    assert_eq!(heap.used_bytes(), 0);
    assert_eq!(heap.stats().ref_counted_blocks, 0);
    assert_eq!(heap.find_ref_counted(7), None);
    assert_eq!(heap.block_count(), 1);
}

#[test]
fn test_retain_keeps_block_alive() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    let addr = heap.alloc_ref_counted(7, 500).unwrap();
    heap.set_free_on_zero(addr, true).unwrap();
    assert_eq!(heap.retain(addr).unwrap(), 2);

    heap.free(addr).unwrap();
    // One reference remains; the block must survive.
    assert_eq!(heap.find_ref_counted(7), Some(addr));

    heap.free(addr).unwrap();
    assert_eq!(heap.find_ref_counted(7), None);
    assert_eq!(heap.used_bytes(), 0);
}

#[test]
fn test_retain_rejects_plain_blocks() {
    let mut heap = Heap::with_capacity(4096).unwrap();
    let addr = heap.alloc(100, "plain").unwrap();
    assert_eq!(heap.retain(addr), Err(HeapError::InvalidAddress(addr)));
}

#[test]
fn test_retain_refuses_at_count_limit() {
    let mut heap = Heap::with_capacity(4096).unwrap();
    let addr = heap.alloc_ref_counted(7, 100).unwrap();

    // Count starts at 1; drive it to the u16 limit.
    for _ in 1..u16::MAX {
        heap.retain(addr).unwrap();
    }
    assert_eq!(heap.retain(addr), Err(HeapError::RefCountExhausted(addr)));

    // The count did not wrap to zero: the block is not evictable.
    let result = heap.alloc(4000, "pressure");
    assert!(matches!(result, Err(HeapError::OutOfMemory { .. })));
    assert_eq!(heap.find_ref_counted(7), Some(addr));
}

#[test]
fn test_eviction_reclaims_oldest_first() {
    // Two retained ref-counted blocks; an allocation that cannot fit must
    // evict the oldest, and only the oldest when its coalesced space
    // suffices.
    let mut heap = Heap::with_capacity(4096).unwrap();

    let oldest = heap.alloc_ref_counted(1, 2000).unwrap();
    let newest = heap.alloc_ref_counted(2, 500).unwrap();
    heap.free(oldest).unwrap();
    heap.free(newest).unwrap();
    assert_eq!(heap.stats().ref_counted_blocks, 2);

    // 1500 bytes cannot fit in the remaining tail of the region, but fits
    // exactly where the oldest block sat.
    let addr = heap.alloc(1500, "pressure").unwrap();

    assert!(
        addr < newest,
        "request is served from the evicted oldest block's space"
    );
    assert_eq!(heap.find_ref_counted(1), None, "oldest was evicted");
    assert_eq!(
        heap.find_ref_counted(2),
        Some(newest),
        "newest survives when the oldest's space suffices"
    );
}

#[test]
fn test_eviction_continues_until_enough_space() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    let first = heap.alloc_ref_counted(1, 500).unwrap();
    let second = heap.alloc_ref_counted(2, 500).unwrap();
    heap.free(first).unwrap();
    heap.free(second).unwrap();

    // Needs more than either block alone: both get evicted, and the
    // coalesced region satisfies the request from the base.
    let addr = heap.alloc(3000, "pressure").unwrap();

    assert_eq!(addr, HEADER_SIZE);
    assert_eq!(heap.find_ref_counted(1), None);
    assert_eq!(heap.find_ref_counted(2), None);
    assert_eq!(heap.stats().ref_counted_blocks, 0);
}

#[test]
fn test_exhausted_eviction_fails_once() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    let retained = heap.alloc_ref_counted(1, 500).unwrap();
    heap.free(retained).unwrap();

    // Even after evicting everything there is no room for this.
    let result = heap.alloc(8000, "hopeless");
    assert!(matches!(result, Err(HeapError::OutOfMemory { .. })));

    // The eviction pass ran: the retained block is gone.
    assert_eq!(heap.find_ref_counted(1), None);
}

#[test]
fn test_prevent_reuse_blocks_eviction() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    let protected = heap.alloc_ref_counted(1, 3000).unwrap();
    heap.set_prevent_reuse(protected, true).unwrap();
    heap.free(protected).unwrap();

    // Only evicting the protected block could satisfy this; it must fail.
    let result = heap.alloc(3500, "pressure");
    assert!(matches!(result, Err(HeapError::OutOfMemory { .. })));

    assert_eq!(
        heap.find_ref_counted(1),
        Some(protected),
        "protected block survives regardless of pressure"
    );

    // Lifting the protection makes the same request succeed.
    heap.set_prevent_reuse(protected, false).unwrap();
    let addr = heap.alloc(3500, "pressure").unwrap();
    assert_eq!(addr, protected);
}

#[test]
fn test_refcounted_payload_is_not_prefilled() {
    let mut heap = Heap::with_capacity(4096).unwrap();

    // Reclaiming scrubs the payload with the free pattern; a ref-counted
    // allocation reusing that space does not overwrite it.
    let first = heap.alloc_ref_counted(1, 500).unwrap();
    heap.set_free_on_zero(first, true).unwrap();
    heap.free(first).unwrap();

    let second = heap.alloc_ref_counted(2, 400).unwrap();
    assert_eq!(second, first);
    let payload = heap.payload(second).unwrap();
    assert!(payload[..400].iter().all(|&b| b == 0xDE));
}

#[test]
fn test_plain_blocks_never_enter_refcount_ring() {
    let mut heap = Heap::with_capacity(4096).unwrap();
    let addr = heap.alloc(100, "plain").unwrap();
    assert_eq!(heap.stats().ref_counted_blocks, 0);

    let snapshot = heap.snapshot();
    let block = snapshot.iter().find(|b| b.data_address == addr).unwrap();
    assert_eq!(block.ref_count, 1, "plain allocated blocks hold count 1");
    assert!(!block.flags.ref_counted);
}
