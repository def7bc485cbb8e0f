//! A small bounded map with access-order eviction.

/// Bounded key→value map that drops the least-recently-used entry on
/// overflow.
///
/// Backed by a vector ordered most-recent-first; every cache in scry holds a
/// handful of entries (completion sessions, highlight entries), so linear
/// scans beat pointer-chasing. Thread safety is the caller's responsibility.
#[derive(Debug)]
pub struct LruCache<K, V> {
    max_entries: usize,
    entries: Vec<(K, V)>,
}

impl<K: Eq, V> LruCache<K, V> {
    pub fn new(max_entries: usize) -> LruCache<K, V> {
        assert!(max_entries > 0);
        LruCache {
            max_entries,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `value`, replacing and touching any existing entry for `key`.
    /// The least-recently-used entry is dropped if the cache is over
    /// capacity.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(pos) = self.position(&key) {
            self.entries.remove(pos);
        }
        self.entries.insert(0, (key, value));
        if self.entries.len() > self.max_entries {
            self.entries.pop();
        }
    }

    /// Returns the value for `key` without touching its access order.
    pub fn try_get(&self, key: &K) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns the value for `key`, promoting it to most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_mut(key).map(|v| &*v)
    }

    /// Mutable variant of [`Self::get`]; also promotes.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let pos = self.position(key)?;
        let entry = self.entries.remove(pos);
        self.entries.insert(0, entry);
        Some(&mut self.entries[0].1)
    }

    /// Returns the existing (promoted) entry or computes, inserts and
    /// returns a new one.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        match self.position(&key) {
            Some(pos) => {
                let entry = self.entries.remove(pos);
                self.entries.insert(0, entry);
            }
            None => {
                self.insert(key, make());
            }
        }
        &mut self.entries[0].1
    }

    /// Removes and returns the entry for `key`.
    pub fn take(&mut self, key: &K) -> Option<V> {
        let pos = self.position(key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Visits values in unspecified order. Return `false` from the callback
    /// to stop early.
    pub fn iter_values(&self, mut f: impl FnMut(&V) -> bool) {
        for (_, value) in &self.entries {
            if !f(value) {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(cache.try_get(&"a"), None);
        assert_eq!(cache.try_get(&"b"), Some(&2));
        assert_eq!(cache.try_get(&"c"), Some(&3));
    }

    #[test]
    fn get_promotes() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.insert("c", 3);
        // "b" was least recently used after the promote.
        assert_eq!(cache.try_get(&"b"), None);
        assert_eq!(cache.try_get(&"a"), Some(&1));
    }

    #[test]
    fn try_get_does_not_promote() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.try_get(&"a"), Some(&1));
        cache.insert("c", 3);
        assert_eq!(cache.try_get(&"a"), None);
    }

    #[test]
    fn insert_existing_replaces_and_touches() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        cache.insert("c", 3);
        assert_eq!(cache.try_get(&"a"), Some(&10));
        assert_eq!(cache.try_get(&"b"), None);
    }

    #[test]
    fn get_or_insert_with_creates_once() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        assert_eq!(*cache.get_or_insert_with("a", || 1), 1);
        assert_eq!(*cache.get_or_insert_with("a", || panic!("cached")), 1);
    }
}
