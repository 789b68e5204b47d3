//! Fixed-capacity map with oldest-first eviction.
//!
//! A ring of slots holds the entries; a hash index maps each key to its slot.
//! The two are updated together: an index entry is removed exactly when its
//! slot is overwritten, removed or evicted, so the index can never point at a
//! stale slot and memory stays bounded by `capacity` no matter how many
//! inserts arrive.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct BoundedMap<K, V> {
    slots: Vec<Option<(K, V)>>,
    index: HashMap<K, usize>,
    /// Next slot to write
    head: usize,
    capacity: usize,
}

impl<K, V> BoundedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            index: HashMap::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Inserts `value` under `key` as the newest entry.
    ///
    /// An existing entry for `key` is replaced and moves to the newest
    /// position. Returns the entry evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(old_slot) = self.index.remove(&key) {
            self.slots[old_slot] = None;
        }

        let slot = self.head;
        let evicted = self.slots[slot].take();
        if let Some((old_key, _)) = &evicted {
            if self.index.get(old_key) == Some(&slot) {
                self.index.remove(old_key);
            }
        }

        self.slots[slot] = Some((key.clone(), value));
        self.index.insert(key, slot);
        self.head = (self.head + 1) % self.capacity;
        evicted
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_ref().map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.slots[slot].take().map(|(_, v)| v)
    }

    /// Removes every entry matching `predicate`, returning them.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut removed = Vec::new();
        for slot in self.slots.iter_mut() {
            let matches = slot.as_ref().map_or(false, |(k, v)| predicate(k, v));
            if matches {
                if let Some((k, v)) = slot.take() {
                    self.index.remove(&k);
                    removed.push((k, v));
                }
            }
        }
        removed
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let (newer, older) = self.slots.split_at(self.head);
        older
            .iter()
            .chain(newer.iter())
            .filter_map(|slot| slot.as_ref().map(|(k, v)| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut map = BoundedMap::new(3);
        assert!(map.insert("a", 1).is_none());
        assert!(map.insert("b", 2).is_none());
        assert!(map.insert("c", 3).is_none());

        assert_eq!(map.insert("d", 4), Some(("a", 1)));
        assert!(!map.contains_key(&"a"));
        assert_eq!(map.len(), 3);

        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let mut map = BoundedMap::new(2);
        map.insert(1, "one");
        map.insert(2, "two");
        map.insert(1, "uno");

        assert_eq!(map.get(&1), Some(&"uno"));
        assert_eq!(map.len(), 2);

        // Key 2 is now the oldest
        map.insert(3, "three");
        assert!(!map.contains_key(&2));
        assert_eq!(map.get(&1), Some(&"uno"));
    }

    #[test]
    fn test_remove_where() {
        let mut map = BoundedMap::new(8);
        for i in 0..6 {
            map.insert(i, i * 10);
        }
        let removed = map.remove_where(|_, v| *v >= 30);
        assert_eq!(removed.len(), 3);
        assert_eq!(map.len(), 3);
        assert!(map.get(&4).is_none());
        assert_eq!(map.get(&2), Some(&20));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut map = BoundedMap::new(0);
        map.insert('x', 1);
        map.insert('y', 2);
        assert_eq!(map.capacity(), 1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&'y'), Some(&2));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(
            capacity in 1usize..32,
            ops in proptest::collection::vec((0u8..3, 0u16..64), 0..400),
        ) {
            let mut map = BoundedMap::new(capacity);
            for (op, key) in ops {
                match op {
                    0 | 1 => { map.insert(key, key as u32); }
                    _ => { map.remove(&key); }
                }
                prop_assert!(map.len() <= capacity);
                // Index and slots stay in lockstep
                prop_assert_eq!(map.iter().count(), map.len());
                for (k, v) in map.iter() {
                    prop_assert_eq!(*v, *k as u32);
                    prop_assert_eq!(map.get(k), Some(v));
                }
            }
        }
    }
}
