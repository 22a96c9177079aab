//! chain-table: a separately chained hash map with pluggable hash/equality
//! strategies and an explicit, caller-driven lock.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a small, dependable key/value table for embedding in larger
//!   systems, keyed by arbitrary data through user-supplied strategies.
//! - Layers:
//!   - Strategies (`KeyHasher`, `KeyEquality`): the only code that looks at
//!     key contents. Chosen at construction, immutable afterwards. The
//!     default pair reads keys as NUL-terminated byte strings.
//!   - ChainedMap<K, V, H, E>: structural layer. Power-of-two bucket array,
//!     singly-linked chains, growth by relinking. No synchronization.
//!   - HashTable<K, V, H, E>: owns a `ChainedMap` behind a mutex and exposes
//!     `lock`/`unlock`. Individual operations never lock on their own.
//!
//! Constraints
//! - Chains own their entries (`Option<Box<Entry>>`); removing or dropping
//!   an entry frees exactly that allocation.
//! - Each entry caches its `i32` hash. Growth and lookups compare cached
//!   hashes; a stored key is never rehashed.
//! - Bucket count is always a power of two; the index is
//!   `hash & (bucket_count - 1)`.
//! - Growth doubles the array once `len > bucket_count * 3 / 4`. There is
//!   no shrinking.
//!
//! Key matching
//! - A lookup key matches an entry when the equality strategy's
//!   `same_ref` says both keys are the same object (for reference keys, the
//!   same pointee address), or when the cached hashes agree and the
//!   equality strategy accepts the pair.
//!
//! Allocation failures
//! - Construction and entry allocation are fallible and report
//!   [`AllocError`]; a failed `set` leaves the map unchanged.
//! - A failed growth allocation is logged and skipped. The map stays
//!   correct at a higher load factor.
//!
//! Locking
//! - `&HashTable` gives no direct access to the map: every shared use goes
//!   through a [`TableGuard`], so atomicity spans exactly the calls made
//!   while the caller holds it.
//! - `&mut HashTable` proves exclusivity; `get_mut` skips the lock.
//! - The lock is not recursive. Debug builds turn a same-thread relock into
//!   a panic via the holder record in `reentrancy`.
//!
//! Notes and non-goals
//! - No persistence, no ordering guarantees, no duplicate keys.
//! - Iteration borrows the map, so structural mutation during a traversal
//!   is rejected at compile time; `retain` is the way to drop entries while
//!   walking the table.

mod chained_map;
mod error;
mod hash_table;
mod reentrancy;
pub mod strategy;

#[cfg(test)]
mod chained_map_proptest;

// Public surface
pub use chained_map::{ChainedMap, Iter, IterMut};
pub use error::AllocError;
pub use hash_table::{HashTable, TableGuard};
pub use strategy::{CStrEq, CStrHash, IdentityEq, IdentityHash, KeyEquality, KeyHasher, RefEq};
