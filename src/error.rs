//! Recoverable error types.
//!
//! Per the host contract, out-of-memory is the only recoverable failure mode
//! this crate surfaces; everything else (double-free, wrong-pool-free,
//! attaching with a dangling reference) is a contract violation the caller
//! is responsible for not committing, and is therefore either an
//! `unsafe fn` precondition or an `assert!` at the same call site the
//! reference design asserts at. The library never logs.

/// Failure from the memory pool: the host allocator declined a non-blocking
/// request. Blocking requests never produce this error; they simply take as
/// long as the host needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The host allocator returned nothing for a non-blocking request.
    #[error("host allocator declined a non-blocking allocation request")]
    HostDeclined,
}

/// Failure from a list operation. Most list misuse (null references into a
/// non-empty list, mismatched pools) is a contract violation guarded by
/// `assert!` rather than a recoverable `ListError`; this type only covers
/// failures that originate from the underlying allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    /// Node creation could not obtain storage from the pool or host
    /// allocator.
    #[error("no storage available for a new node")]
    OutOfMemory,
}

impl From<PoolError> for ListError {
    fn from(value: PoolError) -> Self {
        match value {
            PoolError::HostDeclined => ListError::OutOfMemory,
        }
    }
}
