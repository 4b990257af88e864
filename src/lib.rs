//! Fixed-block memory pool and intrusive doubly-linked list for embedded and
//! resource-constrained environments.
//!
//! The two subsystems are specified jointly: [`list`] sits on top of [`pool`]
//! and its node lifecycle rules depend on the pool's block-classification
//! contract. A node may live in a pool-owned silo or in host-allocator
//! memory; the list does not care which, as long as the clear hook and pool
//! handle it was configured with stay consistent for the node's lifetime.
//!
//! This is not a general-purpose allocator: no variable-size allocation, no
//! memory debugging, no defragmentation, no persistence, and no thread
//! safety are in scope. See each module's documentation for its exact
//! contract.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::needless_pass_by_value)]

extern crate alloc;

/// Expanded-node adapter: link fields at a non-zero offset inside a record.
pub mod expanded;
/// Contract-violation and out-of-memory error types.
pub mod error;
/// The host allocator trait the pool and list delegate to.
pub mod host;
/// Directional, attach/detach/sort/compare intrusive doubly-linked list.
pub mod list;
/// Fixed-block memory pool: bitmap-indexed silo chain.
pub mod pool;
/// Interface-only SAX XML reader and encoding sniffer surface (external
/// collaborator; no parsing loop is implemented here, see module docs).
pub mod sax;

pub use error::{ListError, PoolError};
pub use host::HostAllocator;
pub use list::{Direction, Links, Linked, List, Verdict};
pub use pool::{Pool, Reservation, ReserveMode};
