//! Fixed-bucket hash map with chained entries
//!
//! Keys are resource paths. The bucket array is sized once at creation and
//! never grows; each bucket holds a singly linked chain, newest entry first.
//! Chain order carries no meaning.
//!
//! Keys are validated up front: an empty key or one longer than
//! [`MAX_KEY_LEN`](crate::constants::MAX_KEY_LEN) is rejected, so two long
//! paths can never collapse onto the same entry.

use crate::constants::{DEFAULT_BUCKETS, MAX_KEY_LEN};
use crate::error::{CoreError, CoreResult};

/// Decides whether a stored key matches a lookup key during chain traversal
pub trait KeyCompare: Send + Sync {
    fn matches(&self, stored: &str, candidate: &str) -> bool;
}

/// Byte-for-byte key equality
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactKey;

impl KeyCompare for ExactKey {
    #[inline]
    fn matches(&self, stored: &str, candidate: &str) -> bool {
        stored == candidate
    }
}

/// djb2 string hash
#[inline]
pub fn hash_key(key: &str) -> u64 {
    key.bytes()
        .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(b as u64))
}

struct Entry<V> {
    key: Box<str>,
    value: V,
    next: Option<Box<Entry<V>>>,
}

type Link<V> = Option<Box<Entry<V>>>;

/// Open-hashing map from string keys to `V`
pub struct ChainedMap<V, C = ExactKey> {
    buckets: Box<[Link<V>]>,
    len: usize,
    cmp: C,
}

impl<V> ChainedMap<V, ExactKey> {
    /// Map with the default bucket count and exact key matching
    pub fn new() -> Self {
        Self {
            buckets: empty_buckets(DEFAULT_BUCKETS),
            len: 0,
            cmp: ExactKey,
        }
    }

    /// Map with `buckets` chains and exact key matching
    pub fn with_buckets(buckets: usize) -> CoreResult<Self> {
        Self::with_comparator(buckets, ExactKey)
    }
}

impl<V> Default for ChainedMap<V, ExactKey> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C: KeyCompare> ChainedMap<V, C> {
    /// Map with `buckets` chains and a custom comparator
    pub fn with_comparator(buckets: usize, cmp: C) -> CoreResult<Self> {
        if buckets == 0 {
            return Err(CoreError::InvalidBuckets);
        }
        Ok(Self {
            buckets: empty_buckets(buckets),
            len: 0,
            cmp,
        })
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Insert or overwrite
    ///
    /// An existing key has its value replaced in place and the old value is
    /// returned. A new key is prepended to its bucket's chain.
    pub fn put(&mut self, key: &str, value: V) -> CoreResult<Option<V>> {
        check_key(key)?;
        if let Some(slot) = self.get_mut(key) {
            return Ok(Some(std::mem::replace(slot, value)));
        }
        let idx = self.bucket_of(key);
        let next = self.buckets[idx].take();
        self.buckets[idx] = Some(Box::new(Entry {
            key: key.into(),
            value,
            next,
        }));
        self.len += 1;
        Ok(None)
    }

    /// Look up `key`
    pub fn get(&self, key: &str) -> Option<&V> {
        let mut node = self.buckets[self.bucket_of(key)].as_deref();
        while let Some(e) = node {
            if self.cmp.matches(&e.key, key) {
                return Some(&e.value);
            }
            node = e.next.as_deref();
        }
        None
    }

    /// Look up `key` for in-place update
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let idx = self.bucket_of(key);
        let cmp = &self.cmp;
        let mut node = self.buckets[idx].as_deref_mut();
        while let Some(e) = node {
            if cmp.matches(&e.key, key) {
                return Some(&mut e.value);
            }
            node = e.next.as_deref_mut();
        }
        None
    }

    /// Unlink `key` and return its value
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.bucket_of(key);
        let cmp = &self.cmp;
        let mut cur = &mut self.buckets[idx];
        loop {
            let found = match cur.as_deref() {
                None => return None,
                Some(e) => cmp.matches(&e.key, key),
            };
            if found {
                let mut removed = cur.take()?;
                *cur = removed.next.take();
                self.len -= 1;
                return Some(removed.value);
            }
            match cur {
                Some(e) => cur = &mut e.next,
                None => return None,
            }
        }
    }

    /// Visit every entry, bucket by bucket
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            buckets: self.buckets.iter(),
            node: None,
        }
    }

    /// Remove every entry, handing each key and value to `cleanup`
    ///
    /// Returns how many entries were released. The bucket array survives, so
    /// calling this again is a no-op that returns 0.
    pub fn destroy_with<F>(&mut self, mut cleanup: F) -> usize
    where
        F: FnMut(Box<str>, V),
    {
        let mut released = 0;
        for slot in self.buckets.iter_mut() {
            let mut cur = slot.take();
            while let Some(boxed) = cur {
                let Entry { key, value, next } = *boxed;
                cleanup(key, value);
                released += 1;
                cur = next;
            }
        }
        self.len = 0;
        released
    }

    fn bucket_of(&self, key: &str) -> usize {
        (hash_key(key) % self.buckets.len() as u64) as usize
    }
}

impl<V, C> Drop for ChainedMap<V, C> {
    fn drop(&mut self) {
        // Unlink iteratively; long chains would overflow the stack otherwise.
        for slot in self.buckets.iter_mut() {
            let mut cur = slot.take();
            while let Some(mut boxed) = cur {
                cur = boxed.next.take();
            }
        }
    }
}

impl<V, C> std::fmt::Debug for ChainedMap<V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedMap")
            .field("buckets", &self.buckets.len())
            .field("len", &self.len)
            .finish()
    }
}

/// Iterator over `(key, value)` pairs
pub struct Iter<'a, V> {
    buckets: std::slice::Iter<'a, Link<V>>,
    node: Option<&'a Entry<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.node {
                self.node = e.next.as_deref();
                return Some((&e.key, &e.value));
            }
            self.node = self.buckets.next()?.as_deref();
        }
    }
}

fn empty_buckets<V>(n: usize) -> Box<[Link<V>]> {
    (0..n).map(|_| None).collect()
}

fn check_key(key: &str) -> CoreResult<()> {
    if key.is_empty() {
        return Err(CoreError::EmptyKey);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CoreError::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_LEN,
        });
    }
    Ok(())
}
