//! Bulk-owning allocation pool.
//!
//! A [`Pool`] hands out zeroed blocks and remembers every one of them. The
//! caller never frees individually: [`Pool::release_all`], or dropping the
//! pool, frees everything still tracked. [`Pool::free`] exists for the rare
//! case where one block must go early.

use std::ptr::NonNull;

use indexmap::IndexMap;
use memkeep_core::{byte_size, MemError, RawAllocation, RawAllocator, Result, SystemAllocator};
use tracing::{debug, trace, warn};

use crate::config::PoolConfig;

fn key(address: NonNull<u8>) -> usize {
    address.as_ptr() as usize
}

/// An arena of independently sized, zero-initialised blocks.
///
/// Every block is keyed by its start address. A resize that relocates a
/// block re-keys the same entry; the old address is never left in the table.
#[derive(Debug)]
pub struct Pool<A: RawAllocator = SystemAllocator> {
    allocator: A,
    entries: IndexMap<usize, RawAllocation>,
    bytes_allocated: usize,
    byte_limit: Option<usize>,
}

impl Pool<SystemAllocator> {
    /// Create an empty pool over the global allocator.
    pub fn new() -> Self {
        Self::with_allocator(SystemAllocator)
    }

    /// Create an empty pool over the global allocator with `config`.
    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_config_and_allocator(config, SystemAllocator)
    }
}

impl Default for Pool<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator> Pool<A> {
    /// Create an empty pool over `allocator` with the default config.
    pub fn with_allocator(allocator: A) -> Self {
        Self::with_config_and_allocator(PoolConfig::default(), allocator)
    }

    /// Create an empty pool over `allocator` with `config`.
    pub fn with_config_and_allocator(config: PoolConfig, allocator: A) -> Self {
        Self {
            allocator,
            entries: IndexMap::with_capacity(config.initial_capacity),
            bytes_allocated: 0,
            byte_limit: config.byte_limit,
        }
    }

    /// Allocate `count * element_size` zeroed bytes owned by the pool.
    ///
    /// On error nothing is recorded.
    pub fn allocate(&mut self, count: usize, element_size: usize) -> Result<NonNull<u8>> {
        let bytes = byte_size(count, element_size)?;
        self.check_limit(bytes)?;
        let block = self.allocator.allocate(count, element_size)?;
        let address = block.as_ptr();
        trace!(address = block.addr(), bytes, "pool allocate");
        self.bytes_allocated += bytes;
        self.entries.insert(block.addr(), block);
        Ok(address)
    }

    /// Grow or shrink a tracked block to `count * element_size` bytes.
    ///
    /// Returns the block's new address, which may differ from `address`;
    /// the old address must not be used again. Content up to the smaller
    /// size is preserved and added bytes are zero.
    ///
    /// Fails with [`MemError::InvalidAddress`] if `address` is not tracked.
    /// On any error the entry, its content and the byte total are unchanged.
    #[allow(unsafe_code)]
    pub fn resize(
        &mut self,
        address: NonNull<u8>,
        count: usize,
        element_size: usize,
    ) -> Result<NonNull<u8>> {
        let old_key = key(address);
        let index = self
            .entries
            .get_index_of(&old_key)
            .ok_or(MemError::InvalidAddress { address: old_key })?;
        let new_bytes = byte_size(count, element_size)?;
        let old_bytes = self.entries[index].size();
        if new_bytes > old_bytes {
            self.check_limit(new_bytes - old_bytes)?;
        }

        // SAFETY: every tracked block was produced by `self.allocator`.
        unsafe {
            self.allocator
                .resize(&mut self.entries[index], count, element_size)?
        };

        let new_address = self.entries[index].as_ptr();
        let new_key = key(new_address);
        if new_key != old_key {
            if let Some((_, block)) = self.entries.swap_remove_index(index) {
                self.entries.insert(new_key, block);
            }
        }
        self.bytes_allocated = self.bytes_allocated - old_bytes + new_bytes;
        trace!(
            from = old_key,
            to = new_key,
            old_bytes,
            new_bytes,
            "pool resize"
        );
        Ok(new_address)
    }

    /// Release one tracked block ahead of the rest.
    ///
    /// Fails with [`MemError::InvalidAddress`] if `address` is not tracked,
    /// which includes an address already freed.
    #[allow(unsafe_code)]
    pub fn free(&mut self, address: NonNull<u8>) -> Result<()> {
        let addr = key(address);
        let block = self
            .entries
            .swap_remove(&addr)
            .ok_or(MemError::InvalidAddress { address: addr })?;
        let bytes = block.size();
        self.bytes_allocated -= bytes;
        // SAFETY: the block was produced by `self.allocator` and is no
        // longer tracked, so teardown will not see it again.
        unsafe { self.allocator.release(block) };
        trace!(address = addr, bytes, "pool free");
        Ok(())
    }

    /// Free every tracked block and reset the byte total.
    ///
    /// Calling this on an empty pool does nothing.
    #[allow(unsafe_code)]
    pub fn release_all(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let entries = self.entries.len();
        let bytes = self.bytes_allocated;
        for (_, block) in self.entries.drain(..) {
            // SAFETY: produced by `self.allocator`; `drain` removes it from
            // the table so it cannot be released twice.
            unsafe { self.allocator.release(block) };
        }
        self.bytes_allocated = 0;
        debug!(entries, bytes, "pool released");
    }

    /// Sum of the sizes of all tracked blocks, in bytes.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of tracked blocks.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// True when the pool tracks no blocks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `address` is the start of a block this pool tracks.
    pub fn contains(&self, address: NonNull<u8>) -> bool {
        self.entries.contains_key(&key(address))
    }

    /// Size in bytes of the tracked block at `address`.
    pub fn size_of(&self, address: NonNull<u8>) -> Option<usize> {
        self.entries.get(&key(address)).map(RawAllocation::size)
    }

    /// Contents of the tracked block at `address`.
    pub fn bytes(&self, address: NonNull<u8>) -> Option<&[u8]> {
        self.entries.get(&key(address)).map(RawAllocation::as_bytes)
    }

    /// Contents of the tracked block at `address`, mutably.
    pub fn bytes_mut(&mut self, address: NonNull<u8>) -> Option<&mut [u8]> {
        self.entries
            .get_mut(&key(address))
            .map(RawAllocation::as_bytes_mut)
    }

    /// Iterate over `(address, size)` for every tracked block.
    pub fn iter(&self) -> impl Iterator<Item = (NonNull<u8>, usize)> + '_ {
        self.entries.values().map(|b| (b.as_ptr(), b.size()))
    }

    /// The allocator backing this pool.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    fn check_limit(&self, additional: usize) -> Result<()> {
        let Some(limit) = self.byte_limit else {
            return Ok(());
        };
        let requested = self.bytes_allocated.saturating_add(additional);
        if requested > limit {
            warn!(requested, limit, "pool byte limit exceeded");
            return Err(MemError::LimitExceeded { requested, limit });
        }
        Ok(())
    }
}

impl<A: RawAllocator> Drop for Pool<A> {
    fn drop(&mut self) {
        self.release_all();
    }
}
