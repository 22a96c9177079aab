//! HashTable: a `ChainedMap` behind a caller-driven lock.

use crate::chained_map::ChainedMap;
use crate::error::AllocError;
use crate::reentrancy::{DebugLockOwner, OwnerMark};
use crate::strategy::{CStrEq, CStrHash};
use core::fmt;
use core::ops::{Deref, DerefMut};
use parking_lot::{Mutex, MutexGuard};

/// Thread-safe hash table whose operations never lock on their own.
///
/// Shared access (`&HashTable`) reaches the map only through
/// [`lock`](Self::lock), so a critical section covers exactly the calls the
/// caller makes while holding the guard:
///
/// ```
/// use chain_table::HashTable;
///
/// let table: HashTable<&str, u32> = HashTable::with_capacity(16).unwrap();
/// let mut guard = table.lock();
/// let hits = guard.get(&"hits").copied().unwrap_or(0);
/// guard.set("hits", hits + 1).unwrap();
/// table.unlock(guard);
/// ```
///
/// The lock is exclusive and not recursive: a thread cannot nest `lock()`
/// calls the way it could with a recursive mutex, since the guard hands out
/// `&mut ChainedMap` and a nested acquisition would alias it. Locking again on
/// the thread that holds the guard deadlocks in release builds and panics
/// in debug builds. Exclusive owners can skip the lock entirely through
/// [`get_mut`](Self::get_mut).
pub struct HashTable<K, V, H = CStrHash, E = CStrEq> {
    owner: DebugLockOwner,
    map: Mutex<ChainedMap<K, V, H, E>>,
}

/// Scoped proof that the table lock is held. Dereferences to the map.
pub struct TableGuard<'a, K, V, H, E> {
    // Declared first: the holder record clears before the mutex unlocks.
    _owner: OwnerMark<'a>,
    map: MutexGuard<'a, ChainedMap<K, V, H, E>>,
}

impl<K, V> HashTable<K, V> {
    pub fn new() -> Self {
        Self::from(ChainedMap::new())
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        ChainedMap::with_capacity(capacity).map(Self::from)
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> HashTable<K, V, H, CStrEq> {
    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Result<Self, AllocError> {
        ChainedMap::with_capacity_and_hasher(capacity, hasher).map(Self::from)
    }
}

impl<K, V, E> HashTable<K, V, CStrHash, E> {
    pub fn with_capacity_and_equality(capacity: usize, equality: E) -> Result<Self, AllocError> {
        ChainedMap::with_capacity_and_equality(capacity, equality).map(Self::from)
    }
}

impl<K, V, H, E> From<ChainedMap<K, V, H, E>> for HashTable<K, V, H, E> {
    fn from(map: ChainedMap<K, V, H, E>) -> Self {
        Self {
            owner: DebugLockOwner::new(),
            map: Mutex::new(map),
        }
    }
}

impl<K, V, H, E> HashTable<K, V, H, E> {
    /// Table sized for `capacity` entries with an explicit strategy pair.
    pub fn with_capacity_and_strategy(
        capacity: usize,
        hasher: H,
        equality: E,
    ) -> Result<Self, AllocError> {
        ChainedMap::with_capacity_and_strategy(capacity, hasher, equality).map(Self::from)
    }

    /// Blocks until the lock is held and returns the guard.
    pub fn lock(&self) -> TableGuard<'_, K, V, H, E> {
        self.owner.check_relock();
        let map = self.map.lock();
        TableGuard {
            _owner: self.owner.enter(),
            map,
        }
    }

    /// Takes the lock only if no one holds it.
    pub fn try_lock(&self) -> Option<TableGuard<'_, K, V, H, E>> {
        let map = self.map.try_lock()?;
        Some(TableGuard {
            _owner: self.owner.enter(),
            map,
        })
    }

    /// Releases a guard obtained from this table.
    pub fn unlock(&self, guard: TableGuard<'_, K, V, H, E>) {
        debug_assert!(
            core::ptr::eq(MutexGuard::mutex(&guard.map), &self.map),
            "guard unlocked on a table it does not belong to"
        );
        drop(guard);
    }

    /// Runs `f` as one critical section.
    pub fn with_lock<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut ChainedMap<K, V, H, E>) -> R,
    {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Unsynchronized access; `&mut self` already rules out other users.
    pub fn get_mut(&mut self) -> &mut ChainedMap<K, V, H, E> {
        self.map.get_mut()
    }

    pub fn into_inner(self) -> ChainedMap<K, V, H, E> {
        self.map.into_inner()
    }

    /// Frees every entry and the bucket array. Same as dropping the table.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<K, V, H, E> Deref for TableGuard<'_, K, V, H, E> {
    type Target = ChainedMap<K, V, H, E>;

    fn deref(&self) -> &Self::Target {
        &self.map
    }
}

impl<K, V, H, E> DerefMut for TableGuard<'_, K, V, H, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.map
    }
}

impl<K, V, H, E> fmt::Debug for HashTable<K, V, H, E>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("HashTable");
        match self.map.try_lock() {
            Some(map) => d.field("map", &*map),
            None => d.field("map", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

impl<K, V, H, E> fmt::Debug for TableGuard<'_, K, V, H, E>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.map, f)
    }
}
