//! Hash-based secondary index
//!
//! Maps an indexed key to the set of primary keys carrying it, and keeps the
//! reverse mapping so a primary key can be dropped without scanning.
//! Not synchronized: callers hold the graph lock.

use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;

/// Multi-map from index key to primary keys
#[derive(Debug, Clone)]
pub struct SecondaryIndex<K, P> {
    /// Index key -> primary keys
    forward: FxHashMap<K, FxHashSet<P>>,
    /// Primary key -> index keys
    reverse: FxHashMap<P, FxHashSet<K>>,
}

impl<K, P> SecondaryIndex<K, P>
where
    K: Eq + Hash + Clone,
    P: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            forward: FxHashMap::default(),
            reverse: FxHashMap::default(),
        }
    }

    /// Link an index key to a primary key (idempotent)
    pub fn set(&mut self, index_key: K, primary_key: P) {
        self.reverse
            .entry(primary_key.clone())
            .or_default()
            .insert(index_key.clone());
        self.forward.entry(index_key).or_default().insert(primary_key);
    }

    /// Primary keys for an index key; empty when absent
    pub fn lookup(&self, index_key: &K) -> Vec<P> {
        self.forward
            .get(index_key)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of primary keys linked to an index key
    pub fn count(&self, index_key: &K) -> usize {
        self.forward.get(index_key).map_or(0, |keys| keys.len())
    }

    /// Drop every link that references `primary_key`
    pub fn remove_primary_key(&mut self, primary_key: &P) -> bool {
        let Some(index_keys) = self.reverse.remove(primary_key) else {
            return false;
        };

        for index_key in index_keys {
            if let Some(keys) = self.forward.get_mut(&index_key) {
                keys.remove(primary_key);
                if keys.is_empty() {
                    self.forward.remove(&index_key);
                }
            }
        }
        true
    }

    pub fn contains_primary_key(&self, primary_key: &P) -> bool {
        self.reverse.contains_key(primary_key)
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Number of distinct index keys
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl<K, P> Default for SecondaryIndex<K, P>
where
    K: Eq + Hash + Clone,
    P: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_lookup() {
        let mut index: SecondaryIndex<String, u32> = SecondaryIndex::new();
        index.set("a".to_string(), 1);
        index.set("a".to_string(), 2);
        index.set("b".to_string(), 1);

        let mut found = index.lookup(&"a".to_string());
        found.sort();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(index.lookup(&"b".to_string()), vec![1]);
        assert!(index.lookup(&"zzz".to_string()).is_empty());
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut index: SecondaryIndex<&str, &str> = SecondaryIndex::new();
        index.set("k", "p");
        index.set("k", "p");
        assert_eq!(index.count(&"k"), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_primary_key() {
        let mut index: SecondaryIndex<&str, u32> = SecondaryIndex::new();
        index.set("x", 10);
        index.set("y", 10);
        index.set("y", 20);

        assert!(index.remove_primary_key(&10));
        assert!(index.lookup(&"x").is_empty());
        assert_eq!(index.lookup(&"y"), vec![20]);
        assert!(!index.contains_primary_key(&10));

        // Second removal is a no-op
        assert!(!index.remove_primary_key(&10));
        // Empty buckets are dropped
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut index: SecondaryIndex<&str, u32> = SecondaryIndex::new();
        index.set("x", 1);
        index.clear();
        assert!(index.is_empty());
        assert!(!index.contains_primary_key(&1));
    }
}
