//! Bounded in-memory LRU response cache (§3 Cache entry/Cache, §4.2).
//!
//! The cache key is the raw request buffer exactly as the client sent
//! it (§4.1/§9): no normalization, no `Vary` handling. This is a
//! deliberate limitation inherited from the reference design, not an
//! oversight — see `DESIGN.md`.
//!
//! Lock discipline follows §5: `lookup` takes a shared (read) lock to
//! test for presence, then — only on a hit — escalates to an
//! exclusive (write) lock to bump recency/access-count and
//! re-validates that the key is still present (it may have been
//! evicted by a concurrent `admit` between the two locks). `admit`
//! evicts tail entries one at a time, each under its own exclusive
//! critical section, rather than holding the lock for the whole
//! eviction sweep.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::config::{MAX_ELEMENT_SIZE, MAX_SIZE};

/// Per-entry bookkeeping overhead counted toward `entry_bytes`,
/// standing in for the C reference's `sizeof(cache_element)`.
const ENTRY_OVERHEAD: usize = 64;

/// A cached response body plus the bookkeeping the spec requires to
/// be observable per entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub created_at: u64,
    pub last_access: u64,
    pub access_count: u64,
}

/// An element-count cap high enough to never bind in practice; the
/// real bound is the byte-size budget enforced in `admit`.
const CACHE_ELEMENT_CAP: usize = 1_000_000;

pub struct Cache {
    inner: RwLock<LruCache<Bytes, CacheEntry>>,
    total_size: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    max_size: usize,
    max_element_size: usize,
}

impl Cache {
    /// Builds a cache with the production size budget (§3: 200 MiB
    /// total, 10 MiB per entry).
    pub fn new() -> Self {
        Self::with_limits(MAX_SIZE, MAX_ELEMENT_SIZE)
    }

    /// Builds a cache with an explicit byte budget, for tests that
    /// need to force eviction without allocating hundreds of
    /// megabytes (§8 scenario 5).
    pub fn with_limits(max_size: usize, max_element_size: usize) -> Self {
        Self {
            inner: RwLock::new(LruCache::new(
                NonZeroUsize::new(CACHE_ELEMENT_CAP).expect("cap is non-zero"),
            )),
            total_size: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_size,
            max_element_size,
        }
    }

    fn entry_bytes(key: &Bytes, payload_len: usize) -> usize {
        key.len() + payload_len + ENTRY_OVERHEAD
    }

    /// Looks up `key`. On hit, refreshes recency/access-count and
    /// returns a clone of the cached payload; on miss, returns `None`.
    /// Never blocks concurrent lookups against each other.
    pub async fn lookup(&self, key: &Bytes) -> Option<Bytes> {
        {
            let guard = self.inner.read().await;
            if guard.peek(key).is_none() {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        let mut guard = self.inner.write().await;
        match guard.get_mut(key) {
            Some(entry) => {
                let now = now_secs();
                entry.last_access = now;
                entry.access_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload.clone())
            }
            // Evicted by a concurrent admit between the read and write locks.
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Admits `payload` under `key`. Rejects entries over
    /// `max_element_size` without mutating state. Evicts LRU tail
    /// entries one at a time (each its own exclusive section) until
    /// there is room. A repeated key replaces the existing entry
    /// (upsert) and moves it to the MRU head rather than inserting a
    /// duplicate — see `DESIGN.md`.
    pub async fn admit(&self, key: Bytes, payload: Bytes) -> bool {
        let entry_bytes = Self::entry_bytes(&key, payload.len());
        if entry_bytes > self.max_element_size {
            return false;
        }

        loop {
            let current = self.total_size.load(Ordering::Relaxed);
            if current + entry_bytes <= self.max_size {
                break;
            }
            let mut guard = self.inner.write().await;
            match guard.pop_lru() {
                Some((evicted_key, evicted)) => {
                    drop(guard);
                    let evicted_size = Self::entry_bytes(&evicted_key, evicted.payload.len());
                    self.total_size.fetch_sub(evicted_size, Ordering::Relaxed);
                }
                None => break,
            }
        }

        let now = now_secs();
        let mut guard = self.inner.write().await;
        if let Some(old) = guard.pop(&key) {
            let old_size = Self::entry_bytes(&key, old.payload.len());
            self.total_size.fetch_sub(old_size, Ordering::Relaxed);
        }
        guard.put(
            key,
            CacheEntry {
                payload,
                created_at: now,
                last_access: now,
                access_count: 1,
            },
        );
        self.total_size.fetch_add(entry_bytes, Ordering::Relaxed);
        true
    }

    pub fn total_size(&self) -> usize {
        self.total_size.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub async fn contains(&self, key: &Bytes) -> bool {
        self.inner.read().await.peek(key).is_some()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
