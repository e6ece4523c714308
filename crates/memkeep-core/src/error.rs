//! Error types shared by the allocation primitive, the pool and the
//! tracked pointer.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MemError>;

/// Errors from allocation bookkeeping.
///
/// Two families: resource exhaustion ([`OutOfMemory`](Self::OutOfMemory),
/// [`SizeOverflow`](Self::SizeOverflow),
/// [`LimitExceeded`](Self::LimitExceeded)) and caller contract violations
/// (everything else). Every operation that returns one of these leaves
/// the component in the state it had before the call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MemError {
    /// The platform allocator could not satisfy the request.
    #[error("out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
    },
    /// `count * element_size` does not fit in `usize`.
    #[error("allocation size overflows: {count} elements of {element_size} bytes")]
    SizeOverflow {
        /// Requested element count.
        count: usize,
        /// Requested element size in bytes.
        element_size: usize,
    },
    /// The pool's configured byte limit would be exceeded.
    #[error("pool byte limit exceeded: {requested} bytes requested, limit {limit} bytes")]
    LimitExceeded {
        /// Total bytes the pool would hold after the request.
        requested: usize,
        /// The configured limit.
        limit: usize,
    },
    /// The address is not tracked by the pool it was passed to.
    #[error("address {address:#x} is not tracked by this pool")]
    InvalidAddress {
        /// The untracked address.
        address: usize,
    },
    /// `allocate` was called on a pointer that already owns a block.
    #[error("pointer already owns an allocation")]
    AlreadyAllocated,
    /// The pointer owns no block (resize or increment on an empty pointer).
    #[error("pointer does not own an allocation")]
    NotAllocated,
    /// More references were released than were held.
    #[error("reference released after the count reached zero")]
    DoubleRelease,
}

impl MemError {
    /// True for caller misuse, false for resource exhaustion.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::AlreadyAllocated
                | Self::NotAllocated
                | Self::DoubleRelease
        )
    }
}
