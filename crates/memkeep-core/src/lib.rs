//! Core types for the memkeep allocation helpers.
//!
//! This is the leaf crate of the workspace. It defines the error type
//! shared by every component and the raw allocation primitive that the
//! pool and the tracked pointer are built on:
//!
//! - [`RawAllocation`]: an owning token for one zero-initialised block.
//! - [`RawAllocator`]: the allocate / resize / release seam, so tests can
//!   substitute an instrumented allocator.
//! - [`SystemAllocator`]: the platform implementation over `std::alloc`.
//!
//! All `unsafe` code in this crate lives in [`raw`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod raw;

pub use error::{MemError, Result};
pub use raw::{byte_size, RawAllocation, RawAllocator, SystemAllocator, ALIGNMENT};
