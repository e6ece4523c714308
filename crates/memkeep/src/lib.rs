//! memkeep: allocation bookkeeping for code that works with raw memory.
//!
//! This is the facade crate that re-exports the public API of the memkeep
//! sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use memkeep::prelude::*;
//!
//! // Many blocks, freed together.
//! let mut pool = Pool::new();
//! let a = pool.allocate(10, 4).unwrap();
//! let _b = pool.allocate(5, 4).unwrap();
//! assert_eq!(pool.size(), 2);
//! assert_eq!(pool.bytes_allocated(), 60);
//!
//! let a = pool.resize(a, 20, 4).unwrap();
//! assert_eq!(pool.size_of(a), Some(80));
//! pool.release_all();
//! assert_eq!(pool.size(), 0);
//!
//! // One block, explicitly shared.
//! let mut ptr = TrackedPointer::new();
//! ptr.allocate(1, 8).unwrap();
//! ptr.increment_reference().unwrap();
//! ptr.decrement_reference().unwrap();
//! ptr.decrement_reference().unwrap();
//! assert!(ptr.is_null());
//! assert_eq!(ptr.decrement_reference(), Err(MemError::DoubleRelease));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`primitive`] | `memkeep-core` | `MemError`, `RawAllocation`, `RawAllocator`, `SystemAllocator` |
//! | [`arena`] | `memkeep-arena` | `Pool`, `PoolConfig`, `TrackedPointer` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Error type and the raw allocation primitive (`memkeep-core`).
pub use memkeep_core as primitive;

/// Pool and tracked pointer (`memkeep-arena`).
pub use memkeep_arena as arena;

/// Common imports.
///
/// ```rust
/// use memkeep::prelude::*;
/// ```
pub mod prelude {
    pub use memkeep_arena::{PointerState, Pool, PoolConfig, TrackedPointer};
    pub use memkeep_core::{MemError, RawAllocator, SystemAllocator};
}
