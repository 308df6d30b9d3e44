use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process TTL key/value store.
///
/// Backs the login-attempt counters, the refresh-token blacklist and the
/// category product-count cache. Values are plain strings; counters are stored
/// as their decimal representation.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.into(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Current counter value for `key`, 0 when absent or not numeric.
    pub fn get_count(&self, key: &str) -> u64 {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Increment a counter, refreshing its expiry window. Returns the new value.
    pub fn incr(&self, key: &str, ttl: Duration) -> u64 {
        let next = self.get_count(key) + 1;
        self.set(key, next.to_string(), Some(ttl));
        next
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let cache = Cache::new();
        cache.set("k", "v", None);
        assert_eq!(cache.get("k"), Some("v".to_string()));
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn expired_entries_are_gone() {
        let cache = Cache::new();
        cache.set("k", "v", Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn counters_increment_and_reset() {
        let cache = Cache::new();
        assert_eq!(cache.get_count("attempts"), 0);
        assert_eq!(cache.incr("attempts", Duration::from_secs(60)), 1);
        assert_eq!(cache.incr("attempts", Duration::from_secs(60)), 2);
        cache.delete("attempts");
        assert_eq!(cache.get_count("attempts"), 0);
    }
}
