use std::collections::VecDeque;

/// A small least-recently-used cache.
///
/// Lookups scan the entries linearly, which is faster than hashing for the
/// handful of entries the flow keeps around.
#[derive(Debug, Clone)]
pub(crate) struct LruCache<K, V> {
    capacity: usize,
    entries: VecDeque<(K, V)>,
}

impl<K: PartialEq, V> LruCache<K, V> {
    #[must_use]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the cached value for `key`, marking it as most recently used.
    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        if position != 0 {
            let entry = self.entries.remove(position)?;
            self.entries.push_front(entry);
        }
        self.entries.front().map(|(_, v)| v)
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(position) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(position);
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((key, value));
    }
}
