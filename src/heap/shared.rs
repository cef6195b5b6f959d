/*!
 * Shared Heap Handle
 * The externally-locked collaborator around the single-threaded core
 *
 * The core `Heap` leaves its structures transiently inconsistent inside every
 * operation, so it requires mutual exclusion covering each whole call.
 * `SharedHeap` supplies exactly that: one lock acquisition per public
 * operation, nothing held across calls. Diagnostic readers that must not
 * observe torn state use `try_snapshot`, which only reads when no other
 * operation holds the lock.
 */

use super::traits::{Allocator, HeapInspect};
use super::types::{BlockSnapshot, HeapConfig, HeapResult, HeapStats};
use super::Heap;
use crate::core::types::{Address, Size};
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable, lock-per-operation handle to a heap
#[derive(Clone)]
pub struct SharedHeap {
    inner: Arc<Mutex<Heap>>,
}

impl SharedHeap {
    pub fn new(config: HeapConfig) -> HeapResult<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Heap::new(config)?)),
        })
    }

    /// Wrap an already constructed heap
    pub fn from_heap(heap: Heap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(heap)),
        }
    }

    pub fn alloc(&self, size: Size, tag: &str) -> HeapResult<Address> {
        self.inner.lock().alloc(size, tag)
    }

    pub fn alloc_ref_counted(&self, id: u32, size: Size) -> HeapResult<Address> {
        self.inner.lock().alloc_ref_counted(id, size)
    }

    pub fn free(&self, addr: Address) -> HeapResult<()> {
        self.inner.lock().free(addr)
    }

    pub fn retain(&self, addr: Address) -> HeapResult<u16> {
        self.inner.lock().retain(addr)
    }

    pub fn set_prevent_reuse(&self, addr: Address, prevent: bool) -> HeapResult<()> {
        self.inner.lock().set_prevent_reuse(addr, prevent)
    }

    pub fn set_free_on_zero(&self, addr: Address, free_on_zero: bool) -> HeapResult<()> {
        self.inner.lock().set_free_on_zero(addr, free_on_zero)
    }

    pub fn find_ref_counted(&self, id: u32) -> Option<Address> {
        self.inner.lock().find_ref_counted(id)
    }

    /// Run a closure with exclusive access to the heap, for multi-step
    /// sequences that must observe a consistent state throughout
    pub fn with<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.lock().stats()
    }

    pub fn snapshot(&self) -> Vec<BlockSnapshot> {
        self.inner.lock().snapshot()
    }

    /// Snapshot without waiting: returns None while another operation holds
    /// the heap
    pub fn try_snapshot(&self) -> Option<Vec<BlockSnapshot>> {
        self.inner.try_lock().map(|heap| heap.snapshot())
    }
}

impl Allocator for SharedHeap {
    fn alloc(&self, size: Size, tag: &str) -> HeapResult<Address> {
        SharedHeap::alloc(self, size, tag)
    }

    fn alloc_ref_counted(&self, id: u32, size: Size) -> HeapResult<Address> {
        SharedHeap::alloc_ref_counted(self, id, size)
    }

    fn free(&self, addr: Address) -> HeapResult<()> {
        SharedHeap::free(self, addr)
    }
}

impl HeapInspect for SharedHeap {
    fn stats(&self) -> HeapStats {
        SharedHeap::stats(self)
    }

    fn snapshot(&self) -> Vec<BlockSnapshot> {
        SharedHeap::snapshot(self)
    }

    fn try_snapshot(&self) -> Option<Vec<BlockSnapshot>> {
        SharedHeap::try_snapshot(self)
    }
}
