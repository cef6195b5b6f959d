/*!
 * Structural Invariant Tests
 * Randomized alloc/free sequences with full-traversal verification
 */

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringheap::Heap;

/// One step of a randomized workload
#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    AllocRefCounted(u32, usize),
    FreeNth(usize),
    FreeOnZeroNth(usize),
}

fn apply_ops(heap: &mut Heap, ops: &[Op], verify_each_step: bool) {
    let mut live: Vec<usize> = Vec::new();
    for op in ops {
        match *op {
            Op::Alloc(size) => {
                if let Ok(addr) = heap.alloc(size, "stress") {
                    live.push(addr);
                }
            }
            Op::AllocRefCounted(id, size) => {
                if let Ok(addr) = heap.alloc_ref_counted(id, size) {
                    // Dropped to zero right away: retained as a soft-cache
                    // entry, eligible for eviction under later pressure.
                    heap.free(addr).unwrap();
                }
            }
            Op::FreeNth(n) => {
                if !live.is_empty() {
                    let addr = live.swap_remove(n % live.len());
                    heap.free(addr).unwrap();
                }
            }
            Op::FreeOnZeroNth(n) => {
                if !live.is_empty() {
                    let addr = live[n % live.len()];
                    heap.set_free_on_zero(addr, true).unwrap();
                }
            }
        }
        if verify_each_step {
            heap.verify_integrity();
        }
    }
    heap.verify_integrity();

    // Draining everything must collapse the ring back toward a single free
    // block unless retained ref-counted blocks remain.
    for addr in live {
        heap.free(addr).unwrap();
    }
    heap.verify_integrity();
}

#[test]
fn test_randomized_sequences_hold_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for round in 0..20 {
        let mut heap = Heap::with_capacity(64 * 1024).unwrap();
        let ops: Vec<Op> = (0..200)
            .map(|i| match rng.gen_range(0..10) {
                0..=4 => Op::Alloc(rng.gen_range(1..6000)),
                5..=6 => Op::AllocRefCounted(i as u32, rng.gen_range(64..4096)),
                7..=8 => Op::FreeNth(rng.gen_range(0..64)),
                _ => Op::FreeOnZeroNth(rng.gen_range(0..64)),
            })
            .collect();
        apply_ops(&mut heap, &ops, true);

        let free_capacity: usize = heap
            .blocks()
            .filter(|b| b.free)
            .map(|b| b.capacity)
            .sum();
        assert!(
            free_capacity <= 64 * 1024,
            "round {}: free capacity exceeds region",
            round
        );
    }
}

#[test]
fn test_no_adjacent_free_blocks_after_interleaved_frees() {
    let mut heap = Heap::with_capacity(32 * 1024).unwrap();

    let addrs: Vec<_> = (0..16)
        .map(|i| heap.alloc(500, &format!("b{}", i)).unwrap())
        .collect();

    // Free every other block, then the rest: each free must coalesce fully.
    for addr in addrs.iter().step_by(2) {
        heap.free(*addr).unwrap();
        heap.verify_integrity();
    }
    for addr in addrs.iter().skip(1).step_by(2) {
        heap.free(*addr).unwrap();
        heap.verify_integrity();
    }
    assert_eq!(heap.block_count(), 1);
}

#[test]
fn test_eviction_pressure_holds_invariants() {
    let mut heap = Heap::with_capacity(16 * 1024).unwrap();

    // Fill most of the region with retained soft-cache blocks.
    for id in 0..6 {
        let addr = heap.alloc_ref_counted(id, 2000).unwrap();
        heap.free(addr).unwrap();
    }
    heap.verify_integrity();

    // Repeated pressure allocations force partial eviction scans.
    let mut live = Vec::new();
    for i in 0..4 {
        if let Ok(addr) = heap.alloc(3000, &format!("pressure-{}", i)) {
            live.push(addr);
        }
        heap.verify_integrity();
    }
    assert!(!live.is_empty(), "eviction must free enough for at least one");

    for addr in live {
        heap.free(addr).unwrap();
    }
    heap.verify_integrity();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_invariants_hold_for_any_sequence(
        seed_ops in prop::collection::vec(
            prop_oneof![
                (1usize..5000).prop_map(Op::Alloc),
                (1u32..100, 64usize..2048).prop_map(|(id, s)| Op::AllocRefCounted(id, s)),
                (0usize..64).prop_map(Op::FreeNth),
                (0usize..64).prop_map(Op::FreeOnZeroNth),
            ],
            0..60,
        )
    ) {
        let mut heap = Heap::with_capacity(32 * 1024).unwrap();
        apply_ops(&mut heap, &seed_ops, false);
    }
}
