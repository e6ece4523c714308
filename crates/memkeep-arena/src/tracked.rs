//! A single allocation guarded by an explicit reference count.
//!
//! [`TrackedPointer`] is for hosts that manage sharing themselves: every
//! holder calls [`increment_reference`](TrackedPointer::increment_reference)
//! when it takes a share and
//! [`decrement_reference`](TrackedPointer::decrement_reference) when it lets
//! go. The block is freed when the last share is released.
//!
//! ```text
//! Empty --allocate--> Live(1) --increment--> Live(2) --decrement--> Live(1)
//!   ^                    |
//!   +----decrement-------+   (frees the block)
//! ```
//!
//! Dropping a pointer that is still live frees its block too.

use std::ptr::NonNull;

use memkeep_core::{MemError, RawAllocation, RawAllocator, Result, SystemAllocator};
use tracing::{debug, trace};

/// Observable state of a [`TrackedPointer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerState {
    /// No block is owned and the count is zero.
    Empty,
    /// A block is owned and the count is the contained value (always > 0).
    Live(usize),
}

/// One reference-counted, zero-initialised block.
///
/// Invariant: `refs > 0` exactly when `allocation` is `Some`.
#[derive(Debug)]
pub struct TrackedPointer<A: RawAllocator = SystemAllocator> {
    allocator: A,
    allocation: Option<RawAllocation>,
    refs: usize,
}

impl TrackedPointer<SystemAllocator> {
    /// An empty pointer over the global allocator.
    pub fn new() -> Self {
        Self::with_allocator(SystemAllocator)
    }

    /// A pointer over the global allocator that already owns
    /// `count * element_size` zeroed bytes, with one reference held.
    pub fn allocated(count: usize, element_size: usize) -> Result<Self> {
        let mut ptr = Self::new();
        ptr.allocate(count, element_size)?;
        Ok(ptr)
    }
}

impl Default for TrackedPointer<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator> TrackedPointer<A> {
    /// An empty pointer over `allocator`.
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            allocator,
            allocation: None,
            refs: 0,
        }
    }

    /// Allocate `count * element_size` zeroed bytes and take the first
    /// reference.
    ///
    /// Fails with [`MemError::AlreadyAllocated`] if a block is already owned;
    /// the existing block is kept.
    pub fn allocate(&mut self, count: usize, element_size: usize) -> Result<()> {
        if self.allocation.is_some() {
            return Err(MemError::AlreadyAllocated);
        }
        let block = self.allocator.allocate(count, element_size)?;
        trace!(address = block.addr(), bytes = block.size(), "pointer allocate");
        self.allocation = Some(block);
        self.refs = 1;
        Ok(())
    }

    /// Grow or shrink the owned block to `count * element_size` bytes.
    ///
    /// The address may change. On error the block is untouched.
    #[allow(unsafe_code)]
    pub fn resize(&mut self, count: usize, element_size: usize) -> Result<()> {
        let block = self.allocation.as_mut().ok_or(MemError::NotAllocated)?;
        let from = block.addr();
        // SAFETY: the block was produced by `self.allocator`.
        unsafe { self.allocator.resize(block, count, element_size)? };
        trace!(from, to = block.addr(), bytes = block.size(), "pointer resize");
        Ok(())
    }

    /// Take another reference to the owned block.
    pub fn increment_reference(&mut self) -> Result<()> {
        if self.refs == 0 {
            return Err(MemError::NotAllocated);
        }
        self.refs += 1;
        trace!(refs = self.refs, "pointer increment");
        Ok(())
    }

    /// Give up one reference, freeing the block when none remain.
    ///
    /// Fails with [`MemError::DoubleRelease`] if the count is already zero;
    /// nothing is freed in that case.
    #[allow(unsafe_code)]
    pub fn decrement_reference(&mut self) -> Result<()> {
        if self.refs == 0 {
            return Err(MemError::DoubleRelease);
        }
        self.refs -= 1;
        trace!(refs = self.refs, "pointer decrement");
        if self.refs == 0 {
            if let Some(block) = self.allocation.take() {
                // SAFETY: produced by `self.allocator`; taken out of
                // `allocation` so it cannot be released again.
                unsafe { self.allocator.release(block) };
            }
        }
        Ok(())
    }

    /// True when no block is owned.
    pub fn is_null(&self) -> bool {
        self.allocation.is_none()
    }

    /// Current reference count.
    pub fn ref_count(&self) -> usize {
        self.refs
    }

    /// Current state.
    pub fn state(&self) -> PointerState {
        match self.refs {
            0 => PointerState::Empty,
            n => PointerState::Live(n),
        }
    }

    /// Start of the owned block, if any.
    ///
    /// The address is only valid until the next `resize` or the final
    /// `decrement_reference`. Bounds are the caller's business.
    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.allocation.as_ref().map(RawAllocation::as_ptr)
    }

    /// Size of the owned block in bytes, zero when empty.
    pub fn size(&self) -> usize {
        self.allocation.as_ref().map_or(0, RawAllocation::size)
    }

    /// Contents of the owned block.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.allocation.as_ref().map(RawAllocation::as_bytes)
    }

    /// Contents of the owned block, mutably.
    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation.as_mut().map(RawAllocation::as_bytes_mut)
    }
}

impl<A: RawAllocator> Drop for TrackedPointer<A> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        if let Some(block) = self.allocation.take() {
            debug!(
                address = block.addr(),
                refs = self.refs,
                "live pointer dropped; freeing"
            );
            // SAFETY: produced by `self.allocator` and never released.
            unsafe { self.allocator.release(block) };
        }
    }
}
