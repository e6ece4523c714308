//! Test utilities for memkeep development.
//!
//! Provides [`CountingAllocator`], a [`RawAllocator`] that forwards to
//! [`SystemAllocator`] while recording every call, so tests can assert
//! "freed exactly once" and "no leak" directly. It can also be armed to
//! fail upcoming requests to exercise out-of-memory paths.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use memkeep_core::{byte_size, MemError, RawAllocation, RawAllocator, Result, SystemAllocator};

#[derive(Debug, Default)]
struct AllocLog {
    allocations: usize,
    resizes: usize,
    releases: usize,
    failures: usize,
    unknown_releases: usize,
    /// Live blocks: address -> size in bytes.
    live: HashMap<usize, usize>,
    /// Every address ever released, with how many times.
    released: HashMap<usize, usize>,
    fail_next: usize,
    fail_above: Option<usize>,
}

impl AllocLog {
    fn should_fail(&mut self, bytes: usize) -> bool {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return true;
        }
        self.fail_above.is_some_and(|limit| bytes > limit)
    }
}

/// Instrumented allocator for ownership tests.
///
/// Clones share one call log, so a test can keep a clone after handing the
/// allocator to a `Pool` or `TrackedPointer` and inspect it after the
/// component has been dropped.
#[derive(Clone, Debug, Default)]
pub struct CountingAllocator {
    inner: SystemAllocator,
    log: Rc<RefCell<AllocLog>>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful `allocate` calls.
    pub fn allocations(&self) -> usize {
        self.log.borrow().allocations
    }

    /// Successful `resize` calls.
    pub fn resizes(&self) -> usize {
        self.log.borrow().resizes
    }

    /// `release` calls on live blocks.
    pub fn releases(&self) -> usize {
        self.log.borrow().releases
    }

    /// Requests refused by [`fail_next`](Self::fail_next) or
    /// [`fail_above`](Self::fail_above).
    pub fn failures(&self) -> usize {
        self.log.borrow().failures
    }

    /// `release` calls on an address that was not live (a double free).
    ///
    /// These are recorded and not forwarded to the platform.
    pub fn unknown_releases(&self) -> usize {
        self.log.borrow().unknown_releases
    }

    /// Number of blocks currently allocated.
    pub fn live_count(&self) -> usize {
        self.log.borrow().live.len()
    }

    /// Sum of the sizes of blocks currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.log.borrow().live.values().sum()
    }

    /// Whether `addr` is a block this allocator handed out and has not freed.
    pub fn is_live(&self, addr: usize) -> bool {
        self.log.borrow().live.contains_key(&addr)
    }

    /// How many times `addr` has been released.
    ///
    /// The platform may hand a freed address out again, so this counts
    /// releases of the address, not of one particular block.
    pub fn release_count(&self, addr: usize) -> usize {
        self.log.borrow().released.get(&addr).copied().unwrap_or(0)
    }

    /// Refuse the next `n` allocate or resize requests with `OutOfMemory`.
    pub fn fail_next(&self, n: usize) {
        self.log.borrow_mut().fail_next = n;
    }

    /// Refuse every request for more than `bytes` bytes.
    pub fn fail_above(&self, bytes: usize) {
        self.log.borrow_mut().fail_above = Some(bytes);
    }

    /// Disarm [`fail_next`](Self::fail_next) and [`fail_above`](Self::fail_above).
    pub fn clear_failures(&self) {
        let mut log = self.log.borrow_mut();
        log.fail_next = 0;
        log.fail_above = None;
    }
}

// SAFETY: every block is produced by `SystemAllocator`; this type only
// refuses requests or records calls around it.
#[allow(unsafe_code)]
unsafe impl RawAllocator for CountingAllocator {
    fn allocate(&self, count: usize, element_size: usize) -> Result<RawAllocation> {
        let bytes = byte_size(count, element_size)?;
        let mut log = self.log.borrow_mut();
        if log.should_fail(bytes) {
            log.failures += 1;
            return Err(MemError::OutOfMemory { requested: bytes });
        }
        let block = self.inner.allocate(count, element_size)?;
        log.allocations += 1;
        log.live.insert(block.addr(), bytes);
        Ok(block)
    }

    unsafe fn resize(
        &self,
        allocation: &mut RawAllocation,
        count: usize,
        element_size: usize,
    ) -> Result<()> {
        let bytes = byte_size(count, element_size)?;
        let mut log = self.log.borrow_mut();
        if log.should_fail(bytes) {
            log.failures += 1;
            return Err(MemError::OutOfMemory { requested: bytes });
        }
        let old = allocation.addr();
        // SAFETY: the caller guarantees the block came from this allocator,
        // and every block this allocator hands out comes from `inner`.
        unsafe { self.inner.resize(allocation, count, element_size)? };
        log.resizes += 1;
        log.live.remove(&old);
        log.live.insert(allocation.addr(), bytes);
        Ok(())
    }

    unsafe fn release(&self, allocation: RawAllocation) {
        let mut log = self.log.borrow_mut();
        let addr = allocation.addr();
        if log.live.remove(&addr).is_none() {
            log.unknown_releases += 1;
            // Leak rather than corrupt the heap.
            std::mem::forget(allocation);
            return;
        }
        log.releases += 1;
        *log.released.entry(addr).or_insert(0) += 1;
        // SAFETY: as for `resize`.
        unsafe { self.inner.release(allocation) };
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn records_allocate_and_release() {
        let a = CountingAllocator::new();
        let block = a.allocate(4, 8).unwrap();
        let addr = block.addr();
        assert_eq!(a.allocations(), 1);
        assert!(a.is_live(addr));
        assert_eq!(a.live_bytes(), 32);
        unsafe { a.release(block) };
        assert_eq!(a.releases(), 1);
        assert_eq!(a.release_count(addr), 1);
        assert_eq!(a.live_count(), 0);
    }

    #[test]
    fn clones_share_the_log() {
        let a = CountingAllocator::new();
        let b = a.clone();
        let block = b.allocate(1, 1).unwrap();
        assert_eq!(a.allocations(), 1);
        unsafe { b.release(block) };
        assert_eq!(a.releases(), 1);
    }

    #[test]
    fn fail_next_refuses_then_recovers() {
        let a = CountingAllocator::new();
        a.fail_next(1);
        assert_eq!(
            a.allocate(2, 2).unwrap_err(),
            MemError::OutOfMemory { requested: 4 }
        );
        assert_eq!(a.failures(), 1);
        let block = a.allocate(2, 2).unwrap();
        unsafe { a.release(block) };
    }

    #[test]
    fn fail_above_refuses_large_resize_only() {
        let a = CountingAllocator::new();
        a.fail_above(16);
        let mut block = a.allocate(16, 1).unwrap();
        let addr = block.addr();
        let err = unsafe { a.resize(&mut block, 17, 1) }.unwrap_err();
        assert_eq!(err, MemError::OutOfMemory { requested: 17 });
        assert_eq!(block.addr(), addr);
        assert!(a.is_live(addr));
        a.clear_failures();
        unsafe { a.resize(&mut block, 17, 1).unwrap() };
        assert_eq!(a.resizes(), 1);
        assert_eq!(a.live_bytes(), 17);
        unsafe { a.release(block) };
    }
}
