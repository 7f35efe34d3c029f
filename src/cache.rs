//! TTL-bounded key-value cache shared by the token and filename lookups.
//!
//! Injected rather than ambient so tests (and any host that persists tokens
//! externally) can swap the storage. Expiry is enforced here, not by callers:
//! `get` never returns a stale entry. Writes are last-write-wins per key, so a
//! benign race re-fetching the same key twice self-corrects.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str, ttl: Duration);
}

/// Process-local cache behind a mutex. Entries carry their own deadline.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((value, deadline)) if Instant::now() < *deadline => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get_within_ttl() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_expired_entry_is_never_returned() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        // Expired entries are also evicted on read.
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = MemoryCache::new();
        cache.put("k", "old", Duration::from_secs(60));
        cache.put("k", "new", Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("new".to_string()));
    }

    #[test]
    fn test_missing_key() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("absent"), None);
    }
}
