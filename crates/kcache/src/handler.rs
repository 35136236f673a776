//! Update notifications

/// Called by the apply loop after each record has been applied
///
/// `value` is `None` for a deletion. Calls happen on the apply loop in
/// per-partition offset order, before the record's offset is marked applied,
/// so a writer waiting on that offset observes the callback's effects.
///
/// Implementations must not write to the same cache: the write would wait on
/// the apply loop that is running the callback and never complete.
pub trait CacheUpdateHandler<K, V>: Send + Sync {
    fn on_update(&self, key: &K, value: Option<&V>);
}

impl<K, V, F> CacheUpdateHandler<K, V> for F
where
    F: Fn(&K, Option<&V>) + Send + Sync,
{
    fn on_update(&self, key: &K, value: Option<&V>) {
        self(key, value);
    }
}
