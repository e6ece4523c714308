//! Benchmark workloads for memkeep.
//!
//! - [`small_objects`]: many small, mixed-size allocations, the pool's
//!   intended use
//! - [`growing_buffer`]: one block grown geometrically, as a vector would

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use memkeep_arena::Pool;
use memkeep_core::{byte_size, MemError, RawAllocator, Result};

/// Element sizes cycled through by [`small_objects`].
pub const SMALL_SIZES: [usize; 4] = [8, 16, 24, 64];

/// Allocate `n` small blocks from `pool`, cycling through [`SMALL_SIZES`].
///
/// Returns the total bytes requested.
pub fn small_objects<A: RawAllocator>(pool: &mut Pool<A>, n: usize) -> Result<usize> {
    let mut total = 0;
    for i in 0..n {
        let size = SMALL_SIZES[i % SMALL_SIZES.len()];
        pool.allocate(1, size)?;
        total += size;
    }
    Ok(total)
}

/// Allocate one byte from `pool` and double it `doublings` times.
///
/// Returns the final size in bytes. `doublings` must be below
/// `usize::BITS`; larger values fail with `SizeOverflow` before anything is
/// allocated.
pub fn growing_buffer<A: RawAllocator>(pool: &mut Pool<A>, doublings: u32) -> Result<usize> {
    if doublings >= usize::BITS {
        return Err(MemError::SizeOverflow {
            count: 1 << (usize::BITS - 1),
            element_size: 2,
        });
    }
    let mut len = 1usize;
    let mut address = pool.allocate(len, 1)?;
    for _ in 0..doublings {
        len = byte_size(len, 2)?;
        address = pool.resize(address, len, 1)?;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_objects_totals_match_pool() {
        let mut pool = Pool::new();
        let total = small_objects(&mut pool, 10).unwrap();
        assert_eq!(pool.size(), 10);
        assert_eq!(pool.bytes_allocated(), total);
    }

    #[test]
    fn growing_buffer_keeps_one_entry() {
        let mut pool = Pool::new();
        let len = growing_buffer(&mut pool, 10).unwrap();
        assert_eq!(len, 1024);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.bytes_allocated(), 1024);
    }

    #[test]
    fn growing_buffer_rejects_overflowing_doublings() {
        let mut pool = Pool::new();
        let err = growing_buffer(&mut pool, usize::BITS).unwrap_err();
        assert_eq!(
            err,
            MemError::SizeOverflow {
                count: 1 << (usize::BITS - 1),
                element_size: 2
            }
        );
        assert!(pool.is_empty());
    }
}
