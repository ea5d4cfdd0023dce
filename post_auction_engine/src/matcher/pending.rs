use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PendingError {
    #[error("Cannot update an entry that is not in the pending map")]
    KeyNotFound,
}

#[derive(Debug, Clone)]
struct PendingEntry<V> {
    value: V,
    expiry: DateTime<Utc>,
}

/// A time-indexed associative store.
///
/// Every entry carries an expiry instant. [`PendingMap::expire`] visits the entries that are due and lets the
/// sweeper decide whether each one is dropped or retained with a fresh expiry. Keys are held in a sorted map so
/// that composite keys support completion on their first component (see [`PendingMap::complete_prefix`]).
#[derive(Debug, Clone)]
pub struct PendingMap<K, V> {
    entries: BTreeMap<K, PendingEntry<V>>,
    // Secondary index so the sweep only touches due entries instead of scanning the whole map.
    expiries: BTreeMap<(DateTime<Utc>, K), ()>,
}

impl<K, V> Default for PendingMap<K, V>
where K: Ord + Clone
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PendingMap<K, V>
where K: Ord + Clone
{
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), expiries: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a value under the key, replacing any existing entry (and its expiry).
    pub fn insert(&mut self, key: K, value: V, expiry: DateTime<Utc>) {
        if let Some(old) = self.entries.insert(key.clone(), PendingEntry { value, expiry }) {
            self.expiries.remove(&(old.expiry, key.clone()));
        }
        self.expiries.insert((expiry, key), ());
    }

    /// Replace the value in place, leaving the expiry untouched.
    ///
    /// Callers guarantee the key is present; updating an absent key is an error rather than an insert, since the
    /// caller would have no say in the expiry the entry received.
    pub fn update(&mut self, key: &K, value: V) -> Result<(), PendingError> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                Ok(())
            },
            None => Err(PendingError::KeyNotFound),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Remove the entry and return its value.
    pub fn pop(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.expiries.remove(&(entry.expiry, key.clone()));
        Some(entry.value)
    }

    /// Visit every entry whose expiry is at or before `now`.
    ///
    /// The sweeper returns `Some(new_expiry)` to retain the entry with that expiry, or `None` to drop it.
    /// Entries that become due during the sweep itself are not revisited; they are picked up by the next call.
    pub fn expire<F>(&mut self, mut sweeper: F, now: DateTime<Utc>)
    where F: FnMut(&K, &V) -> Option<DateTime<Utc>> {
        let due: Vec<(DateTime<Utc>, K)> =
            self.expiries.keys().take_while(|(expiry, _)| *expiry <= now).cloned().collect();
        for (expiry, key) in due {
            self.expiries.remove(&(expiry, key.clone()));
            let entry = match self.entries.remove(&key) {
                Some(entry) => entry,
                None => continue,
            };
            if let Some(new_expiry) = sweeper(&key, &entry.value) {
                self.entries.insert(key.clone(), PendingEntry { value: entry.value, expiry: new_expiry });
                self.expiries.insert((new_expiry, key), ());
            }
        }
    }
}

impl<A, B, V> PendingMap<(A, B), V>
where
    A: Ord + Clone,
    B: Ord + Clone + Default,
{
    /// Complete a composite key from its first component alone.
    ///
    /// Returns the smallest stored key whose first component equals `first`, which makes the selection
    /// deterministic when several second components exist. Relies on `B::default()` being the minimum value of
    /// `B` (the null id sorts before every real id).
    pub fn complete_prefix(&self, first: &A) -> Option<(A, B)> {
        let probe = (first.clone(), B::default());
        self.entries.range(probe..).next().map(|(key, _)| key.clone()).filter(|(a, _)| a == first)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use pag_common::Id;

    use super::*;

    fn key(a: &str, b: &str) -> (Id, Id) {
        (Id::from(a), Id::from(b))
    }

    #[test]
    fn insert_get_pop() {
        let mut map = PendingMap::new();
        let now = Utc::now();
        map.insert(key("a", "1"), "first", now + Duration::seconds(10));
        assert!(map.contains(&key("a", "1")));
        assert_eq!(map.get(&key("a", "1")), Some(&"first"));
        assert_eq!(map.pop(&key("a", "1")), Some("first"));
        assert!(map.is_empty());
        assert_eq!(map.pop(&key("a", "1")), None);
    }

    #[test]
    fn insert_replaces_value_and_expiry() {
        let mut map = PendingMap::new();
        let now = Utc::now();
        map.insert(key("a", "1"), 1u32, now + Duration::seconds(1));
        map.insert(key("a", "1"), 2u32, now + Duration::seconds(100));
        assert_eq!(map.len(), 1);
        // old expiry no longer fires
        let mut seen = Vec::new();
        map.expire(
            |k, v| {
                seen.push((k.clone(), *v));
                None
            },
            now + Duration::seconds(10),
        );
        assert!(seen.is_empty());
        assert_eq!(map.get(&key("a", "1")), Some(&2));
    }

    #[test]
    fn update_requires_presence() {
        let mut map = PendingMap::new();
        let now = Utc::now();
        assert!(matches!(map.update(&key("a", "1"), 5u32), Err(PendingError::KeyNotFound)));
        map.insert(key("a", "1"), 1u32, now + Duration::seconds(5));
        map.update(&key("a", "1"), 5u32).unwrap();
        assert_eq!(map.get(&key("a", "1")), Some(&5));
        // expiry untouched: still due at +5s
        let mut dropped = Vec::new();
        map.expire(
            |k, _| {
                dropped.push(k.clone());
                None
            },
            now + Duration::seconds(5),
        );
        assert_eq!(dropped, vec![key("a", "1")]);
    }

    #[test]
    fn expire_visits_due_entries_only() {
        let mut map = PendingMap::new();
        let now = Utc::now();
        map.insert(key("a", "1"), 1u32, now + Duration::seconds(1));
        map.insert(key("b", "1"), 2u32, now + Duration::seconds(100));
        let mut seen = Vec::new();
        map.expire(
            |k, v| {
                seen.push((k.clone(), *v));
                None
            },
            now + Duration::seconds(2),
        );
        assert_eq!(seen, vec![(key("a", "1"), 1)]);
        assert_eq!(map.len(), 1);
        assert!(map.contains(&key("b", "1")));
    }

    #[test]
    fn sweeper_can_retain_with_new_expiry() {
        let mut map = PendingMap::new();
        let now = Utc::now();
        map.insert(key("a", "1"), 1u32, now);
        map.expire(|_, _| Some(now + Duration::seconds(60)), now);
        assert!(map.contains(&key("a", "1")));
        // not due again until the new expiry
        let mut seen = 0;
        map.expire(
            |_, _| {
                seen += 1;
                None
            },
            now + Duration::seconds(30),
        );
        assert_eq!(seen, 0);
        map.expire(
            |_, _| {
                seen += 1;
                None
            },
            now + Duration::seconds(60),
        );
        assert_eq!(seen, 1);
    }

    #[test]
    fn complete_prefix_picks_smallest_spot() {
        let mut map = PendingMap::new();
        let now = Utc::now();
        map.insert(key("auction", "spot-2"), 2u32, now + Duration::seconds(10));
        map.insert(key("auction", "spot-1"), 1u32, now + Duration::seconds(10));
        map.insert(key("other", "spot-0"), 0u32, now + Duration::seconds(10));
        assert_eq!(map.complete_prefix(&Id::from("auction")), Some(key("auction", "spot-1")));
        assert_eq!(map.complete_prefix(&Id::from("missing")), None);
    }
}
