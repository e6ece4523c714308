//! Allocation bookkeeping over a raw allocator.
//!
//! Two independent owners, both generic over
//! [`RawAllocator`](memkeep_core::RawAllocator):
//!
//! ```text
//! Pool<A>            owns many blocks, frees them all on release_all()/drop
//! └── IndexMap<address, RawAllocation>
//!
//! TrackedPointer<A>  owns at most one block plus an explicit ref count
//! └── Option<RawAllocation>   (None <=> count == 0)
//! ```
//!
//! Neither type is `Send` or `Sync`. Callers that share one across threads
//! must wrap it in their own lock.
//!
//! Contract violations (untracked address, double release, operating on an
//! empty pointer) are reported as recoverable
//! [`MemError`](memkeep_core::MemError) values, never panics.
//!
//! `unsafe` is limited to the functions that hand blocks back to the
//! allocator through `RawAllocator::resize` and `RawAllocator::release`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod pool;
pub mod tracked;

pub use config::PoolConfig;
pub use pool::Pool;
pub use tracked::{PointerState, TrackedPointer};
