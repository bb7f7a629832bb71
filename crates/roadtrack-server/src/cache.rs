//! Bounded, time-expiring cache for provider route responses.
//!
//! Keyed by rounded endpoints + profile so repeated requests for the same
//! origin/destination reuse one provider response within the TTL window.
//! Eviction is insertion-order once the capacity bound is exceeded; a read
//! does not refresh an entry.

use roadtrack_core::models::Coordinate;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::provider::ProviderRoute;

#[derive(Debug, Clone)]
struct CachedRoute {
    route: ProviderRoute,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CachedRoute>,
    insertion_order: VecDeque<String>,
}

#[derive(Debug)]
pub struct RouteCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

/// Cache key: both endpoints rounded to 6 decimal places plus the profile.
pub fn cache_key(start: Coordinate, end: Coordinate, profile: &str) -> String {
    format!(
        "{:.6},{:.6}|{:.6},{:.6}|{}",
        start.lat, start.lon, end.lat, end.lon, profile
    )
}

impl RouteCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up a fresh entry. An entry older than the TTL is evicted and
    /// reported as a miss.
    pub fn get(&self, key: &str) -> Option<ProviderRoute> {
        let mut inner = self.inner.lock().expect("route cache lock poisoned");
        match inner.entries.get(key) {
            None => return None,
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                return Some(entry.route.clone());
            }
            Some(_) => {}
        }
        // Stale: evict and report a miss.
        inner.entries.remove(key);
        inner.insertion_order.retain(|k| k != key);
        None
    }

    pub fn put(&self, key: String, route: ProviderRoute) {
        let mut inner = self.inner.lock().expect("route cache lock poisoned");
        if inner.entries.contains_key(&key) {
            // Re-insert refreshes the timestamp but keeps the original slot.
            inner.entries.insert(
                key,
                CachedRoute {
                    route,
                    inserted_at: Instant::now(),
                },
            );
            return;
        }

        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.insertion_order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        inner.insertion_order.push_back(key.clone());
        inner.entries.insert(
            key,
            CachedRoute {
                route,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    /// Called from the periodic prune loop.
    pub fn prune(&self) -> usize {
        let mut guard = self.inner.lock().expect("route cache lock poisoned");
        let inner = &mut *guard;
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        let entries = &inner.entries;
        inner.insertion_order.retain(|k| entries.contains_key(k));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("route cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(distance_m: f64) -> ProviderRoute {
        ProviderRoute {
            distance_m,
            duration_ms: 1_000,
            polyline: Vec::new(),
            instructions: Vec::new(),
        }
    }

    #[test]
    fn put_then_get_returns_stored_value() {
        let cache = RouteCache::new(100, Duration::from_millis(30_000));
        cache.put("a".to_string(), route(10.0));
        assert_eq!(cache.get("a").unwrap().distance_m, 10.0);
    }

    #[test]
    fn expired_entry_is_a_miss_and_evicted() {
        let cache = RouteCache::new(100, Duration::from_millis(10));
        cache.put("a".to_string(), route(10.0));
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_inserted_first() {
        let cache = RouteCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), route(1.0));
        cache.put("b".to_string(), route(2.0));
        cache.put("c".to_string(), route(3.0));

        assert!(cache.get("a").is_none(), "oldest entry should be evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn prune_drops_only_expired_entries() {
        let cache = RouteCache::new(100, Duration::from_millis(20));
        cache.put("a".to_string(), route(1.0));
        std::thread::sleep(Duration::from_millis(30));
        cache.put("b".to_string(), route(2.0));

        assert_eq!(cache.prune(), 1);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn key_rounds_to_six_decimals() {
        let a = Coordinate { lat: 37.774_900_4, lon: -122.419_400_4 };
        let b = Coordinate { lat: 37.774_900_1, lon: -122.419_400_1 };
        let end = Coordinate { lat: 37.7849, lon: -122.4094 };
        assert_eq!(cache_key(a, end, "car"), cache_key(b, end, "car"));
        assert_ne!(cache_key(a, end, "car"), cache_key(a, end, "bike"));
    }
}
