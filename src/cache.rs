//! C3 — generic TTL cache primitive.
//!
//! Keyed store with `get` (fresh-only), `get_stale` (ignore TTL, used for
//! fallback reads when an upstream fetch fails) and `set`/`invalidate`.
//! Backed by `DashMap` rather than `RwLock<HashMap>` so concurrent reads
//! and per-key writes don't contend on a single lock, matching the
//! per-key-dedup needs of C5 (balance service) and C6 (quote engine).

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// An injectable time source so cache-expiry tests don't need real sleeps.
/// Defaults to [`SystemClock`]; tests supply a [`FakeClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to, for deterministic TTL tests.
pub struct FakeClock {
    inner: std::sync::Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { inner: std::sync::Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, delta: Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += delta;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.lock().unwrap()
    }
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A generic keyed TTL cache.
///
/// `get` returns `Some` only while `now - inserted_at <= ttl`. `get_stale`
/// ignores the TTL entirely, used by callers that want to fall back to a
/// stale value when a refetch fails (spec.md §4.2/§4.4).
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), ttl, clock }
    }

    /// Fresh read: `None` if absent or past TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if self.clock.now().duration_since(entry.inserted_at) <= self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Stale read: returns the value regardless of TTL, if present at all.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// How long ago (from now) this entry was inserted, if present.
    pub fn age(&self, key: &K) -> Option<Duration> {
        self.entries.get(key).map(|entry| self.clock.now().duration_since(entry.inserted_at))
    }

    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, Entry { value, inserted_at: self.clock.now() });
    }

    /// Remove a single key, or clear the whole cache if `key` is `None`.
    pub fn invalidate(&self, key: Option<&K>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_get_returns_value_within_ttl() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[test]
    fn get_returns_none_and_get_stale_returns_value_after_ttl_expiry() {
        let clock = Arc::new(FakeClock::new());
        let cache: TtlCache<&str, u32> = TtlCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.set("a", 1);
        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get_stale(&"a"), Some(1));
    }

    #[test]
    fn invalidate_single_key() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate(Some(&"a"));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn invalidate_none_clears_everything() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate(None);
        assert!(cache.is_empty());
    }
}
