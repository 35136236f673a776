//! Ordered local store
//!
//! The materialized view every instance reads from. Keys are kept sorted by a
//! caller-supplied [`Comparator`]; two keys the comparator reports as equal
//! are the same entry.

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Total order over cache keys
pub trait Comparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

impl<K, F> Comparator<K> for F
where
    F: Fn(&K, &K) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

/// The key type's own `Ord`
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<K: Ord> Comparator<K> for NaturalOrder {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Map key that orders itself with the store's comparator
struct SortKey<K> {
    key: K,
    order: Arc<dyn Comparator<K>>,
}

impl<K> PartialEq for SortKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K> Eq for SortKey<K> {}

impl<K> PartialOrd for SortKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for SortKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.key, &other.key)
    }
}

/// Thread-safe sorted map from keys to values
pub struct LocalStore<K, V> {
    entries: RwLock<BTreeMap<SortKey<K>, V>>,
    order: Arc<dyn Comparator<K>>,
}

impl<K: Clone, V: Clone> LocalStore<K, V> {
    /// Create an empty store ordered by `order`
    pub fn new(order: Arc<dyn Comparator<K>>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            order,
        }
    }

    fn sort_key(&self, key: &K) -> SortKey<K> {
        SortKey {
            key: key.clone(),
            order: Arc::clone(&self.order),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(&self.sort_key(key)).cloned()
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let key = SortKey {
            key,
            order: Arc::clone(&self.order),
        };
        self.entries.write().insert(key, value)
    }

    /// Remove a key, returning its value if it was present
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(&self.sort_key(key))
    }

    /// Entries accepted by `filter`, in key order
    pub fn select<F>(&self, mut filter: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.entries
            .read()
            .iter()
            .filter(|(k, v)| filter(&k.key, v))
            .map(|(k, v)| (k.key.clone(), v.clone()))
            .collect()
    }

    /// All keys in order
    pub fn keys(&self) -> Vec<K> {
        self.entries.read().keys().map(|k| k.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> fmt::Debug for LocalStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("len", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn natural() -> LocalStore<String, i64> {
        LocalStore::new(Arc::new(NaturalOrder))
    }

    #[test]
    fn test_insert_get_remove() {
        let store = natural();
        assert!(store.is_empty());
        assert_eq!(store.insert("a".to_string(), 1), None);
        assert_eq!(store.insert("a".to_string(), 2), Some(1));
        assert_eq!(store.get(&"a".to_string()), Some(2));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove(&"a".to_string()), Some(2));
        assert_eq!(store.remove(&"a".to_string()), None);
        assert_eq!(store.get(&"a".to_string()), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_in_natural_order() {
        let store = natural();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            store.insert(key.to_string(), 0);
        }
        assert_eq!(store.keys(), vec!["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn test_custom_comparator_order() {
        let reverse = |a: &i32, b: &i32| b.cmp(a);
        let store: LocalStore<i32, &str> = LocalStore::new(Arc::new(reverse));
        store.insert(1, "one");
        store.insert(3, "three");
        store.insert(2, "two");
        assert_eq!(store.keys(), vec![3, 2, 1]);
    }

    #[test]
    fn test_comparator_defines_key_identity() {
        let case_insensitive =
            |a: &String, b: &String| a.to_lowercase().cmp(&b.to_lowercase());
        let store: LocalStore<String, i32> = LocalStore::new(Arc::new(case_insensitive));
        store.insert("Key".to_string(), 1);
        assert_eq!(store.insert("KEY".to_string(), 2), Some(1));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"key".to_string()), Some(2));
    }

    #[test]
    fn test_select_filters_in_order() {
        let store = natural();
        for (i, key) in ["b1", "a1", "b2", "c1", "b0"].iter().enumerate() {
            store.insert((*key).to_string(), i as i64);
        }
        let selected = store.select(|k, _| k.starts_with('b'));
        assert_eq!(
            selected,
            vec![
                ("b0".to_string(), 4),
                ("b1".to_string(), 0),
                ("b2".to_string(), 2)
            ]
        );
        assert_eq!(store.select(|_, v| *v > 100), vec![]);
    }
}
