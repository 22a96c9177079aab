//! ChainedMap: structural layer. Power-of-two bucket array of singly-linked
//! chains, grown by relinking entries. No synchronization.

use crate::error::AllocError;
use crate::strategy::{CStrEq, CStrHash, KeyEquality, KeyHasher};
use core::fmt;
use core::iter::FusedIterator;
use std::alloc::{self, Layout};

struct Entry<K, V> {
    key: K,
    value: V,
    hash: i32,
    next: Link<K, V>,
}

type Link<K, V> = Option<Box<Entry<K, V>>>;

/// A separately chained hash map keyed through a [`KeyHasher`] /
/// [`KeyEquality`] pair.
///
/// Every entry caches the hash computed when it was inserted; growth and
/// lookups never hash a stored key again. The map grows by doubling once
/// `len > bucket_count * 3 / 4` and never shrinks.
///
/// `ChainedMap` does no locking of its own. Share it between threads through
/// [`HashTable`](crate::HashTable), which holds it behind an explicit lock.
pub struct ChainedMap<K, V, H = CStrHash, E = CStrEq> {
    buckets: Vec<Link<K, V>>,
    len: usize,
    hasher: H,
    equality: E,
}

#[inline]
fn bucket_index(hash: i32, bucket_count: usize) -> usize {
    // Sign-extend, then mask: bucket_count is a power of two.
    (hash as isize as usize) & (bucket_count - 1)
}

/// Smallest power of two that holds `capacity` entries under a 0.75 load factor.
pub(crate) fn bucket_count_for(capacity: usize) -> Result<usize, AllocError> {
    let min = capacity
        .checked_mul(4)
        .map(|n| n.div_ceil(3))
        .ok_or(AllocError::CapacityOverflow)?;
    min.max(1)
        .checked_next_power_of_two()
        .ok_or(AllocError::CapacityOverflow)
}

#[cfg(test)]
thread_local! {
    // Successful allocations left before one is forced to fail.
    static FAIL_AFTER: core::cell::Cell<Option<usize>> = const { core::cell::Cell::new(None) };
}

/// Makes the allocation after the next `successes` ones fail on this thread.
#[cfg(test)]
pub(crate) fn fail_alloc_after(successes: usize) {
    FAIL_AFTER.with(|f| f.set(Some(successes)));
}

#[inline]
fn forced_alloc_failure() -> bool {
    #[cfg(test)]
    {
        return FAIL_AFTER.with(|f| match f.get() {
            Some(0) => {
                f.set(None);
                true
            }
            Some(n) => {
                f.set(Some(n - 1));
                false
            }
            None => false,
        });
    }

    #[cfg(not(test))]
    {
        return false;
    }
}

fn alloc_buckets<K, V>(count: usize) -> Result<Vec<Link<K, V>>, AllocError> {
    if forced_alloc_failure() {
        return Err(AllocError::Buckets { buckets: count });
    }
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(count)
        .map_err(|_| AllocError::Buckets { buckets: count })?;
    buckets.resize_with(count, || None);
    Ok(buckets)
}

// Fallible `Box::new`. On failure the entry (and its key/value) is dropped.
fn alloc_entry<K, V>(entry: Entry<K, V>) -> Result<Box<Entry<K, V>>, AllocError> {
    if forced_alloc_failure() {
        return Err(AllocError::Entry);
    }
    let layout = Layout::new::<Entry<K, V>>();
    // The `next` link keeps the layout non-zero-sized.
    debug_assert!(layout.size() > 0);
    let ptr = unsafe { alloc::alloc(layout) } as *mut Entry<K, V>;
    if ptr.is_null() {
        return Err(AllocError::Entry);
    }
    unsafe {
        ptr.write(entry);
        Ok(Box::from_raw(ptr))
    }
}

// Unlinks iteratively so long chains cannot overflow the stack on drop.
fn drop_chain<K, V>(mut link: Link<K, V>) {
    while let Some(mut entry) = link {
        link = entry.next.take();
    }
}

#[inline]
fn same_key<K, V, E>(equality: &E, entry: &Entry<K, V>, key: &K, hash: i32) -> bool
where
    E: KeyEquality<K>,
{
    equality.same_ref(&entry.key, key) || (entry.hash == hash && equality.keys_equal(&entry.key, key))
}

impl<K, V> ChainedMap<K, V> {
    /// Empty map with a single bucket and the C-string strategy.
    pub fn new() -> Self {
        Self::from_parts(vec![None], CStrHash, CStrEq)
    }

    /// Map sized for `capacity` entries, keyed by the C-string strategy.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Self::with_capacity_and_strategy(capacity, CStrHash, CStrEq)
    }
}

impl<K, V> Default for ChainedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> ChainedMap<K, V, H, CStrEq> {
    /// Custom hash, default C-string equality.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Result<Self, AllocError> {
        Self::with_capacity_and_strategy(capacity, hasher, CStrEq)
    }
}

impl<K, V, E> ChainedMap<K, V, CStrHash, E> {
    /// Default C-string hash, custom equality.
    pub fn with_capacity_and_equality(capacity: usize, equality: E) -> Result<Self, AllocError> {
        Self::with_capacity_and_strategy(capacity, CStrHash, equality)
    }
}

impl<K, V, H, E> ChainedMap<K, V, H, E> {
    /// Map sized for `capacity` entries with an explicit strategy pair.
    ///
    /// The bucket count is the smallest power of two that is at least
    /// `ceil(capacity * 4 / 3)`, so `capacity` entries fit without growing.
    pub fn with_capacity_and_strategy(
        capacity: usize,
        hasher: H,
        equality: E,
    ) -> Result<Self, AllocError> {
        let bucket_count = bucket_count_for(capacity)?;
        let buckets = alloc_buckets(bucket_count)?;
        log::debug!("created chained map: capacity hint {capacity}, {bucket_count} buckets");
        Ok(Self::from_parts(buckets, hasher, equality))
    }

    fn from_parts(buckets: Vec<Link<K, V>>, hasher: H, equality: E) -> Self {
        debug_assert!(buckets.len().is_power_of_two());
        Self {
            buckets,
            len: 0,
            hasher,
            equality,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Same as [`len`](Self::len).
    pub fn count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bucket count; always a power of two.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.buckets.len() as f64
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn equality(&self) -> &E {
        &self.equality
    }

    /// Lazy traversal in bucket order, then chain order within a bucket.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            chain: None,
            remaining: self.len,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            buckets: self.buckets.iter_mut(),
            chain: None,
            remaining: self.len,
        }
    }

    /// Calls `callback` on every entry until it returns `false`.
    pub fn iterate<F>(&self, mut callback: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        for (key, value) in self.iter() {
            if !callback(key, value) {
                return;
            }
        }
    }

    /// Visits every entry in traversal order and unlinks the ones for which
    /// `keep` returns `false`.
    ///
    /// The entry being visited may be removed; the rest of its chain is
    /// untouched.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        for slot in self.buckets.iter_mut() {
            let mut cursor = slot;
            loop {
                let kept = match cursor.as_mut() {
                    Some(entry) => keep(&entry.key, &mut entry.value),
                    None => break,
                };
                if kept {
                    match cursor {
                        Some(entry) => cursor = &mut entry.next,
                        None => break,
                    }
                } else if let Some(mut removed) = cursor.take() {
                    *cursor = removed.next.take();
                    self.len -= 1;
                }
            }
        }
    }

    /// Frees every entry. The bucket array keeps its size.
    pub fn clear(&mut self) {
        for slot in self.buckets.iter_mut() {
            drop_chain(slot.take());
        }
        self.len = 0;
    }

    fn grow_if_needed(&mut self) {
        let bucket_count = self.buckets.len();
        if self.len <= bucket_count.saturating_mul(3) / 4 {
            return;
        }
        let Some(new_count) = bucket_count.checked_mul(2) else {
            log::warn!("bucket count {bucket_count} cannot double; staying over load factor");
            return;
        };
        let new_buckets = match alloc_buckets(new_count) {
            Ok(buckets) => buckets,
            Err(err) => {
                log::warn!("skipping growth past {bucket_count} buckets: {err}");
                return;
            }
        };
        let old = core::mem::replace(&mut self.buckets, new_buckets);
        for mut link in old {
            while let Some(mut entry) = link {
                link = entry.next.take();
                let index = bucket_index(entry.hash, new_count);
                entry.next = self.buckets[index].take();
                self.buckets[index] = Some(entry);
            }
        }
        log::trace!("grew from {bucket_count} to {new_count} buckets at {} entries", self.len);
    }
}

impl<K, V, H, E> ChainedMap<K, V, H, E>
where
    H: KeyHasher<K>,
    E: KeyEquality<K>,
{
    fn find(&self, key: &K) -> Option<&Entry<K, V>> {
        let hash = self.hasher.hash_key(key);
        let mut cur = self.buckets[bucket_index(hash, self.buckets.len())].as_deref();
        while let Some(entry) = cur {
            if same_key(&self.equality, entry, key, hash) {
                return Some(entry);
            }
            cur = entry.next.as_deref();
        }
        None
    }

    fn find_hashed_mut(&mut self, key: &K, hash: i32) -> Option<&mut Entry<K, V>> {
        let index = bucket_index(hash, self.buckets.len());
        let mut cur = self.buckets[index].as_deref_mut();
        while let Some(entry) = cur {
            if same_key(&self.equality, entry, key, hash) {
                return Some(entry);
            }
            cur = entry.next.as_deref_mut();
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|e| &e.value)
    }

    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.find(key).map(|e| (&e.key, &e.value))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hasher.hash_key(key);
        self.find_hashed_mut(key, hash).map(|e| &mut e.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Inserts or updates `key`.
    ///
    /// Returns `Ok(Some(old))` when the key was present (its value is replaced
    /// in place and the stored key kept), `Ok(None)` for a fresh insertion,
    /// and `Err(AllocError::Entry)` when no entry could be allocated; in that
    /// case the map is unchanged and `key`/`value` are dropped.
    pub fn set(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        let hash = self.hasher.hash_key(&key);
        if let Some(entry) = self.find_hashed_mut(&key, hash) {
            return Ok(Some(core::mem::replace(&mut entry.value, value)));
        }
        let mut entry = alloc_entry(Entry {
            key,
            value,
            hash,
            next: None,
        })?;
        let index = bucket_index(hash, self.buckets.len());
        let slot = &mut self.buckets[index];
        entry.next = slot.take();
        *slot = Some(entry);
        self.len += 1;
        self.grow_if_needed();
        Ok(None)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Unlinks the entry for `key` and hands back the stored key and value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hasher.hash_key(key);
        let index = bucket_index(hash, self.buckets.len());
        let equality = &self.equality;
        let mut link = &mut self.buckets[index];
        while link
            .as_deref()
            .is_some_and(|e| !same_key(equality, e, key, hash))
        {
            link = &mut link.as_mut()?.next;
        }
        let mut removed = link.take()?;
        *link = removed.next.take();
        self.len -= 1;
        let Entry { key, value, .. } = *removed;
        Some((key, value))
    }
}

impl<K, V, H, E> Drop for ChainedMap<K, V, H, E> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, H, E> fmt::Debug for ChainedMap<K, V, H, E>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over `(&K, &V)` in bucket order.
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Link<K, V>>,
    chain: Option<&'a Entry<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.chain {
                self.chain = entry.next.as_deref();
                self.remaining -= 1;
                return Some((&entry.key, &entry.value));
            }
            self.chain = self.buckets.next()?.as_deref();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over `(&K, &mut V)` in bucket order.
pub struct IterMut<'a, K, V> {
    buckets: core::slice::IterMut<'a, Link<K, V>>,
    chain: Option<&'a mut Entry<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.chain.take() {
                let Entry {
                    key, value, next, ..
                } = entry;
                self.chain = next.as_deref_mut();
                self.remaining -= 1;
                let key: &'a K = key;
                return Some((key, value));
            }
            self.chain = self.buckets.next()?.as_deref_mut();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

impl<'a, K, V, H, E> IntoIterator for &'a ChainedMap<K, V, H, E> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, H, E> IntoIterator for &'a mut ChainedMap<K, V, H, E> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
