//! Tiered in-memory cache.
//!
//! One bounded LRU store per tier, each behind its own lock. Pinned entries
//! are never evicted; a pin is held by any operation that must not lose the
//! cached copy while it is in flight (a semantic write waiting for the
//! vector store, an entry being moved between tiers).
//!
//! When every entry of a full tier is pinned, inserts are admitted over
//! capacity and the tier is trimmed back as pins are released.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use strata_core::{MemoryItem, MemoryTier};
use tracing::{debug, warn};

use super::lru::LruStore;
use super::types::TierStats;
use crate::config::{MemoryConfig, TierCapacity};

/// Token returned by a pin; releasing it requires the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PinId(pub(crate) u64);

struct CacheEntry {
    item: MemoryItem,
    size: usize,
    pins: Vec<PinId>,
}

impl CacheEntry {
    fn new(item: MemoryItem) -> Self {
        Self {
            size: item.approx_size(),
            item,
            pins: Vec::new(),
        }
    }

    fn is_pinned(&self) -> bool {
        !self.pins.is_empty()
    }
}

struct TierStore {
    tier: MemoryTier,
    capacity: TierCapacity,
    entries: LruStore<CacheEntry>,
    bytes: usize,
    hits: u64,
    evictions: u64,
}

impl TierStore {
    fn new(tier: MemoryTier, capacity: TierCapacity) -> Self {
        Self {
            tier,
            capacity,
            entries: LruStore::new(),
            bytes: 0,
            hits: 0,
            evictions: 0,
        }
    }

    fn over_capacity(&self) -> bool {
        self.entries.len() > self.capacity.max_items
            || self.capacity.max_bytes.is_some_and(|max| self.bytes > max)
    }

    /// Insert or replace. Pins on a replaced entry carry over.
    fn insert(&mut self, mut entry: CacheEntry) {
        if let Some(previous) = self.entries.remove(&entry.item.id) {
            self.bytes -= previous.size;
            entry.pins.extend(previous.pins);
        }
        self.bytes += entry.size;
        self.entries.insert(entry.item.id.clone(), entry);
    }

    fn remove(&mut self, id: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(id)?;
        self.bytes -= entry.size;
        Some(entry)
    }

    /// Evict unpinned LRU entries until within capacity. `protect` is never
    /// evicted. Returns the evicted ids.
    fn evict(&mut self, protect: Option<&str>) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            let victim = self
                .entries
                .pop_lru_where(|id, entry| !entry.is_pinned() && Some(id) != protect);
            let Some((id, entry)) = victim else {
                warn!(
                    tier = %self.tier,
                    items = self.entries.len(),
                    max_items = self.capacity.max_items,
                    "every cached entry is pinned; tier admitted over capacity"
                );
                break;
            };
            self.bytes -= entry.size;
            self.evictions += 1;
            if self.tier.is_durable() {
                debug!(id = %id, tier = %self.tier, "dropped cache copy of persisted item");
            } else {
                debug!(id = %id, tier = %self.tier, "evicted cache entry");
            }
            evicted.push(id);
        }
        evicted
    }

    fn stats(&self) -> TierStats {
        TierStats {
            tier: self.tier,
            items: self.entries.len(),
            bytes: self.bytes,
            max_items: self.capacity.max_items,
            max_bytes: self.capacity.max_bytes,
            pinned: self.entries.values().filter(|e| e.is_pinned()).count(),
            hits: self.hits,
            evictions: self.evictions,
        }
    }
}

/// Per-tier bounded caches with LRU eviction, pinning and promotion.
pub struct TieredCacheManager {
    tiers: [Mutex<TierStore>; 3],
    misses: AtomicU64,
    next_pin: AtomicU64,
}

impl TieredCacheManager {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            tiers: MemoryTier::ALL.map(|tier| Mutex::new(TierStore::new(tier, config.capacity(tier)))),
            misses: AtomicU64::new(0),
            next_pin: AtomicU64::new(1),
        }
    }

    fn tier(&self, tier: MemoryTier) -> MutexGuard<'_, TierStore> {
        self.tiers[tier.rank()].lock()
    }

    fn new_pin(&self) -> PinId {
        PinId(self.next_pin.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert or replace `item` in `tier`, evicting LRU unpinned entries if
    /// the tier is full. Returns the evicted ids.
    pub fn put(&self, tier: MemoryTier, item: MemoryItem) -> Vec<String> {
        let id = item.id.clone();
        let mut store = self.tier(tier);
        store.insert(CacheEntry::new(item));
        store.evict(Some(id.as_str()))
    }

    /// Insert `item` and pin it in the same critical section.
    pub fn put_pinned(&self, tier: MemoryTier, item: MemoryItem) -> PinId {
        let pin = self.new_pin();
        let id = item.id.clone();
        let mut entry = CacheEntry::new(item);
        entry.pins.push(pin);

        let mut store = self.tier(tier);
        store.insert(entry);
        store.evict(Some(id.as_str()));
        pin
    }

    /// Insert unless the tier already holds the same or a newer version.
    /// Returns whether the item was inserted.
    pub fn put_if_newer(&self, tier: MemoryTier, item: MemoryItem) -> bool {
        let id = item.id.clone();
        let mut store = self.tier(tier);
        if store
            .entries
            .peek(&id)
            .is_some_and(|existing| existing.item.version >= item.version)
        {
            return false;
        }
        store.insert(CacheEntry::new(item));
        store.evict(Some(id.as_str()));
        true
    }

    /// Look up in one tier, marking the entry recently used.
    pub fn get(&self, tier: MemoryTier, id: &str) -> Option<MemoryItem> {
        let mut store = self.tier(tier);
        let item = store.entries.get(id).map(|e| e.item.clone());
        if item.is_some() {
            store.hits += 1;
        }
        item
    }

    /// Probe tiers in rank order. Counts a miss when no tier has the id.
    pub fn lookup(&self, id: &str) -> Option<(MemoryTier, MemoryItem)> {
        for tier in MemoryTier::ALL {
            if let Some(item) = self.get(tier, id) {
                return Some((tier, item));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Look up in one tier without touching recency or statistics.
    pub fn peek(&self, tier: MemoryTier, id: &str) -> Option<MemoryItem> {
        self.tier(tier).entries.peek(id).map(|e| e.item.clone())
    }

    /// Find an id in any tier without touching recency or statistics.
    pub fn peek_any(&self, id: &str) -> Option<(MemoryTier, MemoryItem)> {
        MemoryTier::ALL
            .into_iter()
            .find_map(|tier| self.peek(tier, id).map(|item| (tier, item)))
    }

    /// Tier currently holding `id`.
    pub fn locate(&self, id: &str) -> Option<MemoryTier> {
        MemoryTier::ALL
            .into_iter()
            .find(|tier| self.tier(*tier).entries.contains(id))
    }

    /// Pin an entry in place.
    pub fn pin(&self, tier: MemoryTier, id: &str) -> Option<PinId> {
        let pin = self.new_pin();
        let mut store = self.tier(tier);
        let entry = store.entries.peek_mut(id)?;
        entry.pins.push(pin);
        Some(pin)
    }

    /// Release a pin wherever the entry now lives. Trims the tier if it was
    /// admitted over capacity. Returns false if the pin is unknown.
    pub fn unpin(&self, id: &str, pin: PinId) -> bool {
        for tier in MemoryTier::ALL {
            let mut store = self.tier(tier);
            let Some(entry) = store.entries.peek_mut(id) else {
                continue;
            };
            let Some(position) = entry.pins.iter().position(|p| *p == pin) else {
                return false;
            };
            entry.pins.swap_remove(position);
            if store.over_capacity() {
                store.evict(None);
            }
            return true;
        }
        false
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        MemoryTier::ALL
            .into_iter()
            .any(|tier| self.tier(tier).entries.peek(id).is_some_and(CacheEntry::is_pinned))
    }

    /// Move an entry from `from` to `to`, keeping its pins. Both tier locks
    /// are held for the move, taken in rank order. Returns false if the
    /// entry is not in `from`.
    pub fn relocate(&self, id: &str, from: MemoryTier, to: MemoryTier) -> bool {
        if from == to {
            return self.tier(from).entries.contains(id);
        }

        let (low, high) = if from.rank() < to.rank() { (from, to) } else { (to, from) };
        let mut low_guard = self.tier(low);
        let mut high_guard = self.tier(high);
        let (source, target) = if from == low {
            (&mut *low_guard, &mut *high_guard)
        } else {
            (&mut *high_guard, &mut *low_guard)
        };

        let Some(entry) = source.remove(id) else {
            return false;
        };
        target.insert(entry);
        // The moved entry is protected so the insert cannot evict it
        target.evict(Some(id));
        debug!(id = %id, from = %from, to = %to, "moved cache entry");
        true
    }

    /// Move an entry to a higher-ranked tier.
    pub fn promote(&self, id: &str, from: MemoryTier, to: MemoryTier) -> bool {
        from.rank() < to.rank() && self.relocate(id, from, to)
    }

    /// Move an entry to a lower-ranked tier.
    pub fn demote(&self, id: &str, from: MemoryTier, to: MemoryTier) -> bool {
        from.rank() > to.rank() && self.relocate(id, from, to)
    }

    /// Remove from every tier, pinned or not. Returns the removed item.
    pub fn remove(&self, id: &str) -> Option<MemoryItem> {
        let mut removed = None;
        for tier in MemoryTier::ALL {
            if let Some(entry) = self.tier(tier).remove(id) {
                removed = Some(entry.item);
            }
        }
        removed
    }

    /// Remove from one tier only.
    pub fn remove_from(&self, tier: MemoryTier, id: &str) -> Option<MemoryItem> {
        self.tier(tier).remove(id).map(|e| e.item)
    }

    /// Remove from every tier except `keep`.
    pub fn remove_elsewhere(&self, id: &str, keep: MemoryTier) {
        for tier in MemoryTier::ALL {
            if tier != keep {
                self.tier(tier).remove(id);
            }
        }
    }

    /// Ids in a tier, least recently used first.
    pub fn ids(&self, tier: MemoryTier) -> Vec<String> {
        self.tier(tier).entries.keys()
    }

    /// Items in a tier, least recently used first.
    pub fn items(&self, tier: MemoryTier) -> Vec<MemoryItem> {
        self.tier(tier).entries.values().map(|e| e.item.clone()).collect()
    }

    pub fn len(&self, tier: MemoryTier) -> usize {
        self.tier(tier).entries.len()
    }

    /// Drop every unpinned entry of a tier. Returns how many were dropped.
    pub fn clear(&self, tier: MemoryTier) -> usize {
        let mut store = self.tier(tier);
        let mut freed = 0;
        let dropped = store.entries.retain(|_, entry| {
            if entry.is_pinned() {
                true
            } else {
                freed += entry.size;
                false
            }
        });
        store.bytes -= freed;
        dropped
    }

    pub fn stats(&self) -> Vec<TierStats> {
        MemoryTier::ALL.into_iter().map(|tier| self.tier(tier).stats()).collect()
    }

    /// Lookups that found the id in no tier.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
