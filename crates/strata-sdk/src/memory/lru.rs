//! Recency-ordered map shared by the tier stores and the embedding memo.

use std::collections::{BTreeMap, HashMap};

struct Slot<V> {
    value: V,
    tick: u64,
}

/// String-keyed map that remembers access order.
///
/// Every insert or [`get`](Self::get) stamps the key with a fresh tick; the
/// oldest tick is the least recently used entry.
pub(crate) struct LruStore<V> {
    entries: HashMap<String, Slot<V>>,
    order: BTreeMap<u64, String>,
    tick: u64,
}

impl<V> LruStore<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace, marking the key most recently used. Returns the
    /// previous value.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        let tick = self.next_tick();
        self.order.insert(tick, key.clone());
        match self.entries.insert(key, Slot { value, tick }) {
            Some(old) => {
                self.order.remove(&old.tick);
                Some(old.value)
            }
            None => None,
        }
    }

    /// Look up and mark most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.tick);
        self.order.insert(tick, key.to_string());
        slot.tick = tick;
        Some(&slot.value)
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Mutable access without touching recency.
    pub fn peek_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key).map(|slot| &mut slot.value)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    /// Remove the least recently used entry accepted by `evictable`.
    pub fn pop_lru_where(&mut self, mut evictable: impl FnMut(&str, &V) -> bool) -> Option<(String, V)> {
        let key = self
            .order
            .values()
            .find(|key| {
                self.entries
                    .get(key.as_str())
                    .is_some_and(|slot| evictable(key, &slot.value))
            })?
            .clone();
        let value = self.remove(&key)?;
        Some((key, value))
    }

    /// Remove the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(String, V)> {
        self.pop_lru_where(|_, _| true)
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    /// Values from least to most recently used.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|slot| &slot.value))
    }

    /// Drop entries rejected by `keep`, returning how many went.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, slot)| !keep(key, &slot.value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}
