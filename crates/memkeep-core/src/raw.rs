//! The raw allocation primitive.
//!
//! [`RawAllocator`] is the only place memory is actually obtained or
//! returned. [`SystemAllocator`] forwards to `std::alloc` with calloc-like
//! semantics: blocks are zeroed on allocation, bytes added by a resize are
//! zeroed, and failure is reported as [`MemError::OutOfMemory`] rather than
//! aborting.
//!
//! Every live block is at least one byte long. A request for zero bytes is
//! backed by a one-byte block so that distinct allocations always have
//! distinct addresses; its recorded size stays zero.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::slice;

use tracing::warn;

use crate::error::{MemError, Result};

/// Alignment of every block handed out by [`SystemAllocator`].
///
/// Matches what `calloc` guarantees on 64-bit platforms.
pub const ALIGNMENT: usize = 16;

/// Total byte size of `count` elements of `element_size` bytes.
///
/// Returns [`MemError::SizeOverflow`] if the product does not fit in `usize`.
pub fn byte_size(count: usize, element_size: usize) -> Result<usize> {
    count
        .checked_mul(element_size)
        .ok_or(MemError::SizeOverflow {
            count,
            element_size,
        })
}

fn layout_for(bytes: usize) -> Result<Layout> {
    Layout::from_size_align(bytes.max(1), ALIGNMENT)
        .map_err(|_| MemError::OutOfMemory { requested: bytes })
}

/// An owning token for one live block: `(address, element_count, element_size)`.
///
/// The token is neither `Copy` nor `Clone`, so a block can be
/// handed back to [`RawAllocator::release`] at most once through safe code.
/// Dropping a token without releasing it leaks the block.
#[derive(Debug, PartialEq, Eq)]
pub struct RawAllocation {
    ptr: NonNull<u8>,
    count: usize,
    element_size: usize,
}

impl RawAllocation {
    /// Assemble a token from its parts.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live block of at least
    /// `count * element_size` initialised bytes (and at least one byte),
    /// the product must not overflow, and no other token may refer to the
    /// same block.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, count: usize, element_size: usize) -> Self {
        Self {
            ptr,
            count,
            element_size,
        }
    }

    /// Start of the block.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Start of the block as an integer, the key the pool tracks it under.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Number of elements requested.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Usable size of the block in bytes (`count * element_size`).
    pub fn size(&self) -> usize {
        // Checked when the token was built.
        self.count * self.element_size
    }

    /// The block's contents.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the token owns a live block of `size()` initialised bytes
        // (from_raw_parts contract) and the borrow is tied to `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size()) }
    }

    /// The block's contents, mutably.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `as_bytes`; `&mut self` guarantees exclusivity
        // because no other token refers to the block.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size()) }
    }
}

/// The allocate / resize / release seam.
///
/// Methods take `&self` so an instrumented implementation can be shared
/// between the component under test and the test body.
///
/// # Safety
///
/// Implementors must only return tokens that satisfy the contract of
/// [`RawAllocation::from_raw_parts`]: safe code reads and writes through
/// them. Newly allocated bytes, and bytes added by a resize, must be zero.
pub unsafe trait RawAllocator {
    /// Allocate `count * element_size` zeroed bytes.
    ///
    /// A zero-byte request succeeds. Fails with
    /// [`MemError::SizeOverflow`] or [`MemError::OutOfMemory`].
    fn allocate(&self, count: usize, element_size: usize) -> Result<RawAllocation>;

    /// Grow or shrink `allocation` to `count * element_size` bytes.
    ///
    /// The first `min(old, new)` bytes are preserved and any added bytes are
    /// zeroed. The address may change; `allocation` is updated in place. On
    /// error `allocation` and its contents are left untouched.
    ///
    /// # Safety
    ///
    /// `allocation` must have been produced by this allocator.
    unsafe fn resize(
        &self,
        allocation: &mut RawAllocation,
        count: usize,
        element_size: usize,
    ) -> Result<()>;

    /// Return the block to the platform.
    ///
    /// # Safety
    ///
    /// `allocation` must have been produced by this allocator.
    unsafe fn release(&self, allocation: RawAllocation);
}

/// [`RawAllocator`] backed by the global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

// SAFETY: blocks come from `alloc_zeroed`, resized blocks have their tail
// zeroed before the token is updated, and sizes are validated through
// `Layout` before any call into `std::alloc`.
unsafe impl RawAllocator for SystemAllocator {
    fn allocate(&self, count: usize, element_size: usize) -> Result<RawAllocation> {
        let bytes = byte_size(count, element_size)?;
        let layout = layout_for(bytes)?;
        // SAFETY: `layout` has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            warn!(bytes, "platform allocator returned null");
            return Err(MemError::OutOfMemory { requested: bytes });
        };
        // SAFETY: freshly allocated, zeroed, at least `bytes.max(1)` long.
        Ok(unsafe { RawAllocation::from_raw_parts(ptr, count, element_size) })
    }

    unsafe fn resize(
        &self,
        allocation: &mut RawAllocation,
        count: usize,
        element_size: usize,
    ) -> Result<()> {
        let new_bytes = byte_size(count, element_size)?;
        let new_layout = layout_for(new_bytes)?;
        let old_bytes = allocation.size();
        // SAFETY: this layout was validated when the block was allocated.
        let old_layout =
            unsafe { Layout::from_size_align_unchecked(old_bytes.max(1), ALIGNMENT) };

        // SAFETY: the block came from this allocator with `old_layout`
        // (caller contract) and `new_layout.size()` is valid for ALIGNMENT.
        let ptr = unsafe {
            alloc::realloc(
                allocation.as_ptr().as_ptr(),
                old_layout,
                new_layout.size(),
            )
        };
        let Some(ptr) = NonNull::new(ptr) else {
            // realloc leaves the original block intact on failure.
            warn!(bytes = new_bytes, "platform allocator returned null on resize");
            return Err(MemError::OutOfMemory {
                requested: new_bytes,
            });
        };
        if new_bytes > old_bytes {
            // SAFETY: the new block is `new_bytes` long; the range
            // `old_bytes..new_bytes` lies inside it.
            unsafe { ptr.as_ptr().add(old_bytes).write_bytes(0, new_bytes - old_bytes) };
        }
        // SAFETY: `ptr` is the live, resized block and the old token is
        // overwritten, so it stays the only token for it.
        *allocation = unsafe { RawAllocation::from_raw_parts(ptr, count, element_size) };
        Ok(())
    }

    unsafe fn release(&self, allocation: RawAllocation) {
        // SAFETY: validated when the block was allocated or resized.
        let layout =
            unsafe { Layout::from_size_align_unchecked(allocation.size().max(1), ALIGNMENT) };
        // SAFETY: the block came from this allocator with `layout` and the
        // token is consumed, so it cannot be released again.
        unsafe { alloc::dealloc(allocation.as_ptr().as_ptr(), layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_zeroed_block() {
        let a = SystemAllocator;
        let block = a.allocate(10, 4).unwrap();
        assert_eq!(block.size(), 40);
        assert_eq!(block.count(), 10);
        assert_eq!(block.element_size(), 4);
        assert!(block.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(block.addr() % ALIGNMENT, 0);
        unsafe { a.release(block) };
    }

    #[test]
    fn zero_byte_requests_get_distinct_addresses() {
        let a = SystemAllocator;
        let x = a.allocate(0, 8).unwrap();
        let y = a.allocate(8, 0).unwrap();
        assert_eq!(x.size(), 0);
        assert_eq!(y.size(), 0);
        assert!(x.as_bytes().is_empty());
        assert_ne!(x.addr(), y.addr());
        unsafe {
            a.release(x);
            a.release(y);
        }
    }

    #[test]
    fn overflowing_size_is_rejected() {
        let a = SystemAllocator;
        let err = a.allocate(usize::MAX, 2).unwrap_err();
        assert_eq!(
            err,
            MemError::SizeOverflow {
                count: usize::MAX,
                element_size: 2
            }
        );
    }

    #[test]
    fn unrepresentable_layout_is_out_of_memory() {
        let a = SystemAllocator;
        let err = a.allocate(usize::MAX / 2, 1).unwrap_err();
        assert_eq!(
            err,
            MemError::OutOfMemory {
                requested: usize::MAX / 2
            }
        );
    }

    #[test]
    fn grow_preserves_prefix_and_zeroes_suffix() {
        let a = SystemAllocator;
        let mut block = a.allocate(4, 1).unwrap();
        block.as_bytes_mut().copy_from_slice(&[1, 2, 3, 4]);
        unsafe { a.resize(&mut block, 64, 1).unwrap() };
        assert_eq!(block.size(), 64);
        assert_eq!(&block.as_bytes()[..4], &[1, 2, 3, 4]);
        assert!(block.as_bytes()[4..].iter().all(|&b| b == 0));
        unsafe { a.release(block) };
    }

    #[test]
    fn shrink_preserves_prefix() {
        let a = SystemAllocator;
        let mut block = a.allocate(8, 1).unwrap();
        block.as_bytes_mut().copy_from_slice(&[9, 8, 7, 6, 5, 4, 3, 2]);
        unsafe { a.resize(&mut block, 3, 1).unwrap() };
        assert_eq!(block.as_bytes(), &[9, 8, 7]);
        unsafe { a.release(block) };
    }

    #[test]
    fn shrink_to_zero_then_grow_is_zeroed() {
        let a = SystemAllocator;
        let mut block = a.allocate(4, 1).unwrap();
        block.as_bytes_mut().fill(0xAB);
        unsafe {
            a.resize(&mut block, 0, 1).unwrap();
            a.resize(&mut block, 4, 1).unwrap();
        }
        assert_eq!(block.as_bytes(), &[0, 0, 0, 0]);
        unsafe { a.release(block) };
    }

    #[test]
    fn failed_resize_leaves_block_untouched() {
        let a = SystemAllocator;
        let mut block = a.allocate(4, 1).unwrap();
        block.as_bytes_mut().copy_from_slice(&[1, 2, 3, 4]);
        let before = block.addr();
        let err = unsafe { a.resize(&mut block, usize::MAX / 2, 1) }.unwrap_err();
        assert!(matches!(err, MemError::OutOfMemory { .. }));
        assert_eq!(block.addr(), before);
        assert_eq!(block.as_bytes(), &[1, 2, 3, 4]);
        unsafe { a.release(block) };
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn resize_keeps_min_prefix(
                old_len in 0usize..512,
                new_len in 0usize..512,
                seed in any::<u8>(),
            ) {
                let a = SystemAllocator;
                let mut block = a.allocate(old_len, 1).unwrap();
                for (i, b) in block.as_bytes_mut().iter_mut().enumerate() {
                    *b = seed.wrapping_add(i as u8) | 1;
                }
                let expected: Vec<u8> = block.as_bytes().to_vec();
                unsafe { a.resize(&mut block, new_len, 1).unwrap() };
                let keep = old_len.min(new_len);
                prop_assert_eq!(&block.as_bytes()[..keep], &expected[..keep]);
                prop_assert!(block.as_bytes()[keep..].iter().all(|&b| b == 0));
                unsafe { a.release(block) };
            }
        }
    }
}
