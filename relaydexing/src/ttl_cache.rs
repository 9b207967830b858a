//! Keyed cache with time-based expiry and a bounded number of entries.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, (V, Instant)>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub async fn get_if_valid(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;

        entries
            .get(key)
            .filter(|(_value, inserted_at)| inserted_at.elapsed() < self.ttl)
            .map(|(value, _inserted_at)| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_key, (_value, inserted_at)| inserted_at.elapsed() < self.ttl);
        }
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest_key = entries
                .iter()
                .min_by_key(|(_key, (_value, inserted_at))| *inserted_at)
                .map(|(key, _entry)| key.clone());
            if let Some(oldest_key) = oldest_key {
                entries.remove(&oldest_key);
            }
        }

        entries.insert(key, (value, Instant::now()));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
