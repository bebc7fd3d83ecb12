use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Size-bounded map whose entries expire after a fixed time-to-live.
///
/// When full, inserting evicts the oldest entry.
pub struct TtlCache<V> {
    entries: HashMap<String, Entry<V>>,
    ttl: Duration,
    max_entries: usize,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Inserts `value` unless `key` is already live. Returns true if the key
    /// was already present.
    pub fn insert(&mut self, key: &str, value: V) -> bool {
        self.evict_expired();
        if self.entries.contains_key(key) {
            return true;
        }
        if self.entries.len() >= self.max_entries
            && let Some(oldest_key) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest_key);
        }
        self.entries.insert(key.to_string(), Entry {
            value,
            inserted_at: Instant::now(),
        });
        false
    }

    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.evict_expired();
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn contains(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&mut self) -> usize {
        self.evict_expired();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_reports_duplicate() {
        let mut cache = TtlCache::new(Duration::from_secs(60), 10);
        assert!(!cache.insert("a", 1));
        assert!(cache.insert("a", 2));
        assert_eq!(cache.get("a"), Some(&1));
    }

    #[test]
    fn oldest_entry_is_evicted_when_full() {
        let mut cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", ());
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b", ());
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c", ());
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn entries_expire() {
        let mut cache = TtlCache::new(Duration::from_millis(10), 10);
        cache.insert("a", ());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!cache.contains("a"));
        assert!(cache.is_empty());
    }
}
