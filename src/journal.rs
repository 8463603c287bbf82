//! Journaled Map
//!
//! HashMap that records the prior value of every key written while a
//! checkpoint is open. Rolling back replays those records in reverse, so the
//! cost of a checkpoint is proportional to the writes made under it rather
//! than to the size of the map.

use std::collections::HashMap;
use std::hash::Hash;

/// Position in the undo log returned by [`JournaledMap::checkpoint`]
pub type Mark = usize;

#[derive(Debug, Clone)]
pub struct JournaledMap<K, V> {
    entries: HashMap<K, V>,
    /// (key, value before the write); `None` means the key was absent
    undo: Vec<(K, Option<V>)>,
    /// Open checkpoints; writes are only recorded while this is non-zero
    depth: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> JournaledMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            undo: Vec::new(),
            depth: 0,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: K, value: V) {
        let previous = self.entries.insert(key.clone(), value);
        self.record(key, previous);
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(previous) = self.entries.remove(key) {
            self.record(key.clone(), Some(previous));
        }
    }

    /// Open a checkpoint; pair with exactly one `commit` or `rollback`
    pub fn checkpoint(&mut self) -> Mark {
        self.depth += 1;
        self.undo.len()
    }

    /// Keep every write made since `mark`
    pub fn commit(&mut self, _mark: Mark) {
        self.close();
    }

    /// Undo every write made since `mark`
    pub fn rollback(&mut self, mark: Mark) {
        while self.undo.len() > mark {
            let Some((key, previous)) = self.undo.pop() else {
                break;
            };
            match previous {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
        self.close();
    }

    /// Records currently held for open checkpoints
    pub fn pending(&self) -> usize {
        self.undo.len()
    }

    fn record(&mut self, key: K, previous: Option<V>) {
        if self.depth > 0 {
            self.undo.push((key, previous));
        }
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.undo.clear();
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality over contents only; the undo log is transient
impl<K: Eq + Hash, V: PartialEq> PartialEq for JournaledMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq + Hash, V: Eq> Eq for JournaledMap<K, V> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_restores_prior_values() {
        let mut map: JournaledMap<&str, u64> = JournaledMap::new();
        map.insert("a", 1);
        map.insert("b", 2);

        let mark = map.checkpoint();
        map.insert("a", 10);
        map.remove(&"b");
        map.insert("c", 3);
        map.insert("a", 11);
        assert_eq!(map.pending(), 4);

        map.rollback(mark);
        assert_eq!(map.get(&"a"), Some(&1));
        assert_eq!(map.get(&"b"), Some(&2));
        assert_eq!(map.get(&"c"), None);
        assert_eq!(map.pending(), 0);
    }

    #[test]
    fn test_commit_keeps_writes_and_clears_log() {
        let mut map: JournaledMap<&str, u64> = JournaledMap::new();
        let mark = map.checkpoint();
        map.insert("a", 1);
        map.commit(mark);

        assert_eq!(map.get(&"a"), Some(&1));
        assert_eq!(map.pending(), 0);

        // writes outside any checkpoint are not recorded
        map.insert("b", 2);
        assert_eq!(map.pending(), 0);
    }

    #[test]
    fn test_nested_checkpoints() {
        let mut map: JournaledMap<&str, u64> = JournaledMap::new();
        let outer = map.checkpoint();
        map.insert("a", 1);

        let inner = map.checkpoint();
        map.insert("a", 2);
        map.commit(inner);
        // the outer checkpoint can still undo the inner writes
        assert_eq!(map.pending(), 2);

        map.rollback(outer);
        assert_eq!(map.get(&"a"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_cost_tracks_writes_not_size() {
        let mut map: JournaledMap<u64, u64> = JournaledMap::new();
        for key in 0..10_000 {
            map.insert(key, key);
        }

        let mark = map.checkpoint();
        map.insert(7, 0);
        assert_eq!(map.pending(), 1);
        map.rollback(mark);

        assert_eq!(map.get(&7), Some(&7));
        assert_eq!(map.len(), 10_000);
    }
}
