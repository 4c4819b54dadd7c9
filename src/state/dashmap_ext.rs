use dashmap::DashMap;
use std::hash::Hash;

/// Read helpers for `DashMap` that never hand out a shard guard.
///
/// Feed handles and cached values are read right before an `.await`; a guard
/// kept alive across that point blocks every writer to the same shard.
pub trait DashMapExt<K, V> {
    /// Clone the value for `key`.
    fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone;

    /// Clone every entry, ordered by key.
    fn sorted_cloned(&self) -> Vec<(K, V)>
    where
        K: Clone + Ord,
        V: Clone;
}

impl<K, V> DashMapExt<K, V> for DashMap<K, V>
where
    K: Eq + Hash,
{
    fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get(key).map(|r| r.value().clone())
    }

    fn sorted_cloned(&self) -> Vec<(K, V)>
    where
        K: Clone + Ord,
        V: Clone,
    {
        let mut entries: Vec<(K, V)> = self
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
