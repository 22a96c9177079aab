//! Key strategies: the pluggable hash and equality pair a table is built with.
//!
//! A table never hashes or compares keys on its own. Every key operation
//! goes through a `KeyHasher` and a `KeyEquality` chosen at construction
//! and fixed for the table's lifetime. Plain functions and closures are
//! strategies too:
//!
//! ```
//! use chain_table::ChainedMap;
//!
//! let mut ids: ChainedMap<u32, &str, _, _> = ChainedMap::with_capacity_and_strategy(
//!     8,
//!     |k: &u32| *k as i32,
//!     |a: &u32, b: &u32| a == b,
//! )
//! .unwrap();
//! ids.set(7, "seven").unwrap();
//! assert_eq!(ids.get(&7), Some(&"seven"));
//! ```
//!
//! Equal keys must produce equal hashes. The table does not check this;
//! a strategy that breaks it makes lookups miss.

/// Maps a key to the signed hash code the table buckets it by.
pub trait KeyHasher<K: ?Sized> {
    fn hash_key(&self, key: &K) -> i32;
}

/// Decides whether two keys denote the same entry.
pub trait KeyEquality<K: ?Sized> {
    fn keys_equal(&self, a: &K, b: &K) -> bool;

    /// Identity check the table runs before comparing hashes. For reference
    /// keys this is "both point at the same object", which matches even when
    /// `keys_equal` would not (a NaN, say). It must only return `true` for
    /// keys `keys_equal` would also accept if it were reflexive.
    #[inline]
    fn same_ref(&self, a: &K, b: &K) -> bool {
        let _ = (a, b);
        false
    }
}

impl<K: ?Sized, F> KeyHasher<K> for F
where
    F: Fn(&K) -> i32,
{
    #[inline]
    fn hash_key(&self, key: &K) -> i32 {
        self(key)
    }
}

impl<K: ?Sized, F> KeyEquality<K> for F
where
    F: Fn(&K, &K) -> bool,
{
    #[inline]
    fn keys_equal(&self, a: &K, b: &K) -> bool {
        self(a, b)
    }
}

// Bytes up to (not including) the first NUL, like `strlen`.
#[inline]
fn c_str_bytes(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Default hash: the key is read as a NUL-terminated byte string.
///
/// Seeds the accumulator with the string length, then folds every byte
/// in as `h = h * 31 + byte`, treating bytes as signed chars. Arithmetic
/// wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CStrHash;

impl<K> KeyHasher<K> for CStrHash
where
    K: AsRef<[u8]> + ?Sized,
{
    fn hash_key(&self, key: &K) -> i32 {
        let bytes = c_str_bytes(key.as_ref());
        bytes.iter().fold(bytes.len() as i32, |h, &b| {
            h.wrapping_mul(31).wrapping_add(b as i8 as i32)
        })
    }
}

/// Default equality: byte-wise comparison of the NUL-terminated contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CStrEq;

impl<K> KeyEquality<K> for CStrEq
where
    K: AsRef<[u8]> + ?Sized,
{
    fn keys_equal(&self, a: &K, b: &K) -> bool {
        c_str_bytes(a.as_ref()) == c_str_bytes(b.as_ref())
    }

    // Same bytes at the same address: a `&str` key passed back in, or a
    // buffer the caller shares between entries.
    #[inline]
    fn same_ref(&self, a: &K, b: &K) -> bool {
        core::ptr::eq(a.as_ref(), b.as_ref())
    }
}

/// Hashes a reference key by the address it points to.
///
/// Pair with [`IdentityEq`] to key a table by object identity rather than
/// contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityHash;

impl<'a, T: ?Sized> KeyHasher<&'a T> for IdentityHash {
    fn hash_key(&self, key: &&'a T) -> i32 {
        let addr = *key as *const T as *const () as usize as u64;
        // Aligned addresses have zero low bits; mix them into the bits the mask keeps.
        (addr.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as i32
    }
}

/// Two reference keys are equal when they point at the same object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityEq;

impl<'a, T: ?Sized> KeyEquality<&'a T> for IdentityEq {
    fn keys_equal(&self, a: &&'a T, b: &&'a T) -> bool {
        core::ptr::eq(*a, *b)
    }

    #[inline]
    fn same_ref(&self, a: &&'a T, b: &&'a T) -> bool {
        core::ptr::eq(*a, *b)
    }
}

/// Compares reference keys by their pointees with `F`, after an identity
/// check on the references themselves.
///
/// A reference that is already in the table always finds its entry, even if
/// `F` is not reflexive for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefEq<F>(pub F);

impl<'a, T: ?Sized, F> KeyEquality<&'a T> for RefEq<F>
where
    F: Fn(&T, &T) -> bool,
{
    fn keys_equal(&self, a: &&'a T, b: &&'a T) -> bool {
        (self.0)(*a, *b)
    }

    #[inline]
    fn same_ref(&self, a: &&'a T, b: &&'a T) -> bool {
        core::ptr::eq(*a, *b)
    }
}
