use crate::runner::Os;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    command: String,
    os: Os,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

/// Per-run memo of command output keyed by (command, os).
#[derive(Debug)]
pub struct CommandCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl CommandCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached text if it is still fresh; a stale entry is evicted.
    pub fn get(&self, command: &str, os: Os) -> Option<String> {
        let key = CacheKey {
            command: command.to_string(),
            os,
        };
        let mut entries = self.lock();
        let fresh = entries
            .get(&key)
            .map(|entry| entry.inserted_at.elapsed() <= self.ttl)?;
        if fresh {
            entries.get(&key).map(|entry| entry.value.clone())
        } else {
            entries.remove(&key);
            None
        }
    }

    pub fn put(&self, command: &str, os: Os, value: String) {
        let key = CacheKey {
            command: command.to_string(),
            os,
        };
        self.lock().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = CommandCache::new(Duration::from_secs(300));
        cache.put("uname -a", Os::Linux, "Linux box".to_string());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("uname -a", Os::Linux).as_deref(), Some("Linux box"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("uname -a", Os::Linux), None);
        assert!(cache.lock().is_empty(), "stale entry should be evicted on read");
    }

    #[test]
    fn key_includes_platform() {
        let cache = CommandCache::new(Duration::from_secs(60));
        cache.put("hostname", Os::Linux, "a".to_string());
        assert_eq!(cache.get("hostname", Os::Windows), None);
        assert_eq!(cache.get("hostname", Os::Linux).as_deref(), Some("a"));
    }
}
