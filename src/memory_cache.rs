use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

use crate::odds_cache::{CacheKind, CachedOdds};

/// Process-local fallback for computed odds. Entries never expire; the oldest insert is
/// evicted once the tier is full.
#[derive(Debug)]
pub struct MemoryTier {
    capacity: usize,
    inner: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<(CacheKind, String), CachedOdds>,
    order: VecDeque<(CacheKind, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub capacity: usize,
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub keys: Vec<String>,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Slots::default()),
        }
    }

    pub fn get(&self, kind: CacheKind, cache_key: &str) -> Option<CachedOdds> {
        let slots = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        slots.entries.get(&(kind, cache_key.to_string())).cloned()
    }

    pub fn insert(&self, cache_key: String, payload: CachedOdds) {
        let key = (payload.kind(), cache_key);
        let mut slots = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if slots.entries.insert(key.clone(), payload).is_some() {
            return;
        }
        slots.order.push_back(key);
        while slots.order.len() > self.capacity {
            if let Some(oldest) = slots.order.pop_front() {
                slots.entries.remove(&oldest);
            }
        }
    }

    /// Drops every entry, or every entry of one kind. Returns how many were removed.
    pub fn clear(&self, kind: Option<CacheKind>) -> usize {
        let mut slots = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.entries.len();
        match kind {
            None => {
                slots.entries.clear();
                slots.order.clear();
            }
            Some(kind) => {
                slots.entries.retain(|(k, _), _| *k != kind);
                slots.order.retain(|(k, _)| *k != kind);
            }
        }
        before - slots.entries.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoryStats {
        let slots = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut by_kind = BTreeMap::new();
        for (kind, _) in &slots.order {
            *by_kind.entry(kind.as_str().to_string()).or_insert(0) += 1;
        }
        MemoryStats {
            capacity: self.capacity,
            total: slots.entries.len(),
            by_kind,
            keys: slots
                .order
                .iter()
                .map(|(kind, key)| format!("{}:{key}", kind.as_str()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group_sim::GroupWinnerOdds;

    fn group_payload(iterations: u32) -> CachedOdds {
        CachedOdds::GroupWinner(GroupWinnerOdds {
            teams: BTreeMap::new(),
            iterations,
        })
    }

    #[test]
    fn evicts_oldest_when_full() {
        let tier = MemoryTier::new(2);
        tier.insert("a".into(), group_payload(1));
        tier.insert("b".into(), group_payload(2));
        tier.insert("c".into(), group_payload(3));
        assert_eq!(tier.len(), 2);
        assert!(tier.get(CacheKind::GroupWinner, "a").is_none());
        assert_eq!(tier.get(CacheKind::GroupWinner, "c"), Some(group_payload(3)));
    }

    #[test]
    fn reinsert_keeps_single_slot() {
        let tier = MemoryTier::new(2);
        tier.insert("a".into(), group_payload(1));
        tier.insert("a".into(), group_payload(5));
        tier.insert("b".into(), group_payload(2));
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.get(CacheKind::GroupWinner, "a"), Some(group_payload(5)));
        assert_eq!(tier.stats().keys.len(), 2);
    }

    #[test]
    fn kinds_are_separate_namespaces() {
        let tier = MemoryTier::new(8);
        tier.insert("A|B_group".into(), group_payload(1));
        assert!(tier.get(CacheKind::MatchOdds, "A|B_group").is_none());
        assert_eq!(tier.clear(Some(CacheKind::MatchOdds)), 0);
        assert_eq!(tier.clear(Some(CacheKind::GroupWinner)), 1);
        assert!(tier.is_empty());
    }
}
