//! Allocation failures surfaced by construction and insertion.

use thiserror::Error;

/// Failure to obtain memory for the table or one of its entries.
///
/// Growth never reports this error: a failed resize leaves the table
/// usable at a higher load factor.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The capacity hint cannot be turned into a power-of-two bucket count.
    #[error("capacity hint overflows the maximum bucket count")]
    CapacityOverflow,
    /// The bucket array could not be allocated.
    #[error("failed to allocate a bucket array of {buckets} slots")]
    Buckets { buckets: usize },
    /// A new entry could not be allocated; the table is unchanged.
    #[error("failed to allocate a table entry")]
    Entry,
}
