//! Short-lived in-memory result cache with an injectable clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotone time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Keyed cache whose entries expire after a per-entry time-to-live.
pub trait ResultCache<V>: Send + Sync {
    /// The stored value, unless absent or expired.
    fn get(&self, key: &str) -> Option<V>;
    fn put(&self, key: &str, value: V, ttl: Duration);
}

/// Mutex-guarded map of `(expires_at, value)`; expiry is checked on read.
pub struct MemoryCache<V, C: Clock = SystemClock> {
    clock: C,
    entries: Mutex<HashMap<String, (Duration, V)>>,
}

impl<V> MemoryCache<V, SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl<V> Default for MemoryCache<V, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C: Clock> MemoryCache<V, C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Live and expired entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V, C> ResultCache<V> for MemoryCache<V, C>
where
    V: Clone + Send,
    C: Clock,
{
    fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((expires_at, value)) if *expires_at > now => {
                tracing::debug!(key, "cache hit");
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                tracing::debug!(key, "cache entry expired");
                None
            }
            None => {
                tracing::debug!(key, "cache miss");
                None
            }
        }
    }

    fn put(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (expires_at, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_until_expiry() {
        let cache: MemoryCache<u32, ManualClock> = MemoryCache::with_clock(ManualClock::new());
        assert_eq!(cache.get("a"), None);
        cache.put("a", 7, Duration::from_secs(60));
        assert_eq!(cache.get("a"), Some(7));
        cache.clock().advance(Duration::from_secs(59));
        assert_eq!(cache.get("a"), Some(7));
        cache.clock().advance(Duration::from_secs(1));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_replaces_and_resets_ttl() {
        let cache = MemoryCache::with_clock(ManualClock::new());
        cache.put("k", "old".to_string(), Duration::from_secs(10));
        cache.clock().advance(Duration::from_secs(9));
        cache.put("k", "new".to_string(), Duration::from_secs(10));
        cache.clock().advance(Duration::from_secs(5));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn system_clock_is_monotone() {
        let c = SystemClock::new();
        let a = c.now();
        assert!(c.now() >= a);
    }
}
