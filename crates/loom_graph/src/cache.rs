// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fingerprint-keyed value cache with shared in-flight computations.
//!
//! [`ComputeCache::get_or_compute`] guarantees at most one computation per
//! fingerprint at a time. Concurrent requesters park on a per-fingerprint
//! slot and receive the leader's result, so unrelated fingerprints never
//! contend on a global lock while computing.
//!
//! Failures are never stored. Requesters already parked on a failing slot
//! share its error; the next request after that recomputes.

use crate::error::{GraphError, Result};
use crate::fingerprint::Fingerprint;
use crate::plug::PlugId;
use crate::value::Value;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

/// Default number of values kept by a compute cache
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default number of fingerprints kept by a hash cache
pub const DEFAULT_HASH_CACHE_CAPACITY: usize = 100_000;

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests served from stored values
    pub hits: u64,
    /// Requests that led a computation
    pub misses: u64,
    /// Requests that waited on another thread's computation
    pub waits: u64,
    /// Computations that failed
    pub failures: u64,
    /// Values currently stored
    pub entries: usize,
    /// Maximum number of stored values
    pub capacity: usize,
}

struct InFlight {
    owner: ThreadId,
    result: Mutex<Option<Result<Value>>>,
    ready: Condvar,
}

/// Completes an in-flight slot, including when the computation panics
struct Leader<'a> {
    cache: &'a ComputeCache,
    fingerprint: Fingerprint,
    slot: Arc<InFlight>,
    finished: bool,
}

impl Leader<'_> {
    fn finish(&mut self, result: Result<Value>) {
        self.finished = true;
        self.cache.in_flight.lock().remove(&self.fingerprint);
        *self.slot.result.lock() = Some(result);
        self.slot.ready.notify_all();
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(GraphError::evaluation("computation panicked")));
        }
    }
}

/// Bounded LRU store of computed values keyed by fingerprint
pub struct ComputeCache {
    entries: Mutex<LruCache<Fingerprint, Value>>,
    in_flight: Mutex<HashMap<Fingerprint, Arc<InFlight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    waits: AtomicU64,
    failures: AtomicU64,
}

impl ComputeCache {
    /// Create a cache holding at most `max_entries` values
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity(max_entries))),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// The process-wide cache, created on first use
    pub fn global() -> Arc<ComputeCache> {
        static GLOBAL: OnceLock<Arc<ComputeCache>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(ComputeCache::new(DEFAULT_CACHE_CAPACITY)))
            .clone()
    }

    /// Stored value for a fingerprint
    pub fn get(&self, fingerprint: Fingerprint) -> Option<Value> {
        self.entries.lock().get(&fingerprint).cloned()
    }

    /// Store a value
    pub fn insert(&self, fingerprint: Fingerprint, value: Value) {
        self.entries.lock().put(fingerprint, value);
    }

    /// Return the stored value or run `compute` exactly once for this
    /// fingerprint across all threads
    pub fn get_or_compute<F>(&self, fingerprint: Fingerprint, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        let mut compute = Some(compute);
        loop {
            if let Some(value) = self.get(fingerprint) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }

            let (slot, leading) = {
                let mut in_flight = self.in_flight.lock();
                if let Some(value) = self.get(fingerprint) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                match in_flight.get(&fingerprint) {
                    Some(slot) => (slot.clone(), false),
                    None => {
                        let slot = Arc::new(InFlight {
                            owner: thread::current().id(),
                            result: Mutex::new(None),
                            ready: Condvar::new(),
                        });
                        in_flight.insert(fingerprint, slot.clone());
                        (slot, true)
                    }
                }
            };

            if !leading {
                if slot.owner == thread::current().id() {
                    // Re-entrant request from a pass-through sharing the
                    // fingerprint; the outer computation stores the value.
                    let Some(compute) = compute.take() else {
                        return Err(GraphError::InvalidState("computation already consumed".into()));
                    };
                    return compute();
                }

                self.waits.fetch_add(1, Ordering::Relaxed);
                let shared = {
                    let mut result = slot.result.lock();
                    loop {
                        if let Some(result) = result.as_ref() {
                            break result.clone();
                        }
                        slot.ready.wait(&mut result);
                    }
                };
                match shared {
                    // The leader was cancelled, not us.
                    Err(GraphError::Cancelled) => continue,
                    other => return other,
                }
            }

            self.misses.fetch_add(1, Ordering::Relaxed);
            let mut leader = Leader {
                cache: self,
                fingerprint,
                slot,
                finished: false,
            };
            let Some(compute) = compute.take() else {
                let err = GraphError::InvalidState("computation already consumed".into());
                leader.finish(Err(err.clone()));
                return Err(err);
            };
            let result = compute();
            match &result {
                Ok(value) => self.insert(fingerprint, value.clone()),
                Err(err) if !err.is_cancelled() => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {}
            }
            leader.finish(result.clone());
            return result;
        }
    }

    /// Drop every stored value
    pub fn clear(&self) {
        self.entries.lock().clear();
        tracing::debug!("Compute cache cleared");
    }

    /// Change the maximum number of stored values
    pub fn set_capacity(&self, max_entries: usize) {
        self.entries.lock().resize(capacity(max_entries));
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

impl std::fmt::Debug for ComputeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeCache").field("stats", &self.stats()).finish()
    }
}

/// Key of a memoized output hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    /// Output plug
    pub plug: PlugId,
    /// Fingerprint of the full context
    pub context: Fingerprint,
    /// Dirty counter of the plug when the hash was taken
    pub dirty_count: u64,
}

/// Per-graph memo of output hashes. Entries taken before a plug was last
/// dirtied are never looked up again and age out of the LRU.
pub struct HashCache {
    entries: Mutex<LruCache<HashKey, Fingerprint>>,
}

impl HashCache {
    /// Create a hash cache
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity(max_entries))),
        }
    }

    /// Memoized hash
    pub fn get(&self, key: &HashKey) -> Option<Fingerprint> {
        self.entries.lock().get(key).copied()
    }

    /// Memoize a hash
    pub fn insert(&self, key: HashKey, fingerprint: Fingerprint) {
        self.entries.lock().put(key, fingerprint);
    }

    /// Forget everything
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of memoized hashes
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is memoized
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCache").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_hit_skips_compute() {
        let cache = ComputeCache::new(16);
        let calls = AtomicUsize::new(0);
        let fp = Fingerprint(1);
        for _ in 0..3 {
            let v = cache
                .get_or_compute(fp, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Int(7))
                })
                .unwrap();
            assert_eq!(v, Value::Int(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let cache = Arc::new(ComputeCache::new(16));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_compute(Fingerprint(42), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        Ok(Value::from("done"))
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), Value::from("done"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_retried() {
        let cache = ComputeCache::new(16);
        let fp = Fingerprint(9);
        let err = cache.get_or_compute(fp, || Err(GraphError::evaluation("bad input")));
        assert_eq!(err, Err(GraphError::evaluation("bad input")));
        assert!(cache.get(fp).is_none());
        let ok = cache.get_or_compute(fp, || Ok(Value::Int(1))).unwrap();
        assert_eq!(ok, Value::Int(1));
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_reentrant_request_computes_inline() {
        let cache = ComputeCache::new(16);
        let fp = Fingerprint(5);
        let v = cache
            .get_or_compute(fp, || cache.get_or_compute(fp, || Ok(Value::Int(3))))
            .unwrap();
        assert_eq!(v, Value::Int(3));
        assert_eq!(cache.get(fp), Some(Value::Int(3)));
    }

    #[test]
    fn test_panicking_leader_releases_slot() {
        let cache = Arc::new(ComputeCache::new(16));
        let fp = Fingerprint(11);
        let c = cache.clone();
        let result = std::thread::spawn(move || {
            let _ = c.get_or_compute(fp, || -> Result<Value> { panic!("boom") });
        })
        .join();
        assert!(result.is_err());
        let v = cache.get_or_compute(fp, || Ok(Value::Bool(true))).unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ComputeCache::new(2);
        cache.insert(Fingerprint(1), Value::Int(1));
        cache.insert(Fingerprint(2), Value::Int(2));
        cache.insert(Fingerprint(3), Value::Int(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(Fingerprint(1)).is_none());
    }
}
