use crate::SmallKeyBuildHasher;

use core::hash::{BuildHasher, Hash};
use std::collections::{hash_map, HashMap};

/// A capacity-bounded map that evicts its Least Recently Used entry to make room for a new key.
///
/// Recency is updated by `insert` and `get_and_touch`. `peek` reads without changing the order.
#[derive(Clone, Debug)]
pub struct LruTable<K, V, H> {
    store: HashMap<K, (V, usize), H>,
    order: RecencyList<K>,
    capacity: usize,
}

pub type SmallKeyLruTable<K, V> = LruTable<K, V, SmallKeyBuildHasher>;

/// What happened to the table as a result of `LruTable::insert`.
#[derive(Debug, Eq, PartialEq)]
pub struct Insertion<K, V> {
    /// The previous value for the same key.
    pub replaced: Option<V>,
    /// The least recently used entry, if it was removed to stay within capacity.
    pub evicted: Option<(K, V)>,
}

impl<K, V, H> LruTable<K, V, H>
where
    K: Hash + Eq,
    H: Default,
{
    /// `capacity` is clamped to at least 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            store: HashMap::with_capacity_and_hasher(capacity.min(1 << 16), H::default()),
            order: RecencyList::new(),
            capacity,
        }
    }
}

impl<K, V, H> LruTable<K, V, H>
where
    K: Hash + Eq + Clone,
    H: BuildHasher,
{
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    /// Borrow the value for `key` without updating the LRU order.
    #[inline]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.store.get(key).map(|(val, _)| val)
    }

    /// Borrow the value for `key` and mark it as most recently used.
    #[inline]
    pub fn get_and_touch(&mut self, key: &K) -> Option<&V> {
        let Self { store, order, .. } = self;

        store.get(key).map(|(val, slot)| {
            order.move_to_front(*slot);

            val
        })
    }

    /// Inserts `new_val` for `key` as the most recently used entry. When a new key arrives at a full table, the least
    /// recently used entry is removed first.
    #[inline]
    pub fn insert(&mut self, key: K, new_val: V) -> Insertion<K, V> {
        if let Some((old_val, slot)) = self.store.get_mut(&key) {
            self.order.move_to_front(*slot);

            return Insertion {
                replaced: Some(std::mem::replace(old_val, new_val)),
                evicted: None,
            };
        }

        let evicted = if self.store.len() >= self.capacity {
            self.remove_lru()
        } else {
            None
        };

        let slot = self.order.push_front(key.clone());
        self.store.insert(key, (new_val, slot));

        Insertion {
            replaced: None,
            evicted,
        }
    }

    #[inline]
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.store.remove(key).map(|(val, slot)| {
            self.order.remove(slot);

            val
        })
    }

    /// Removes the least recently used entry.
    #[inline]
    pub fn remove_lru(&mut self) -> Option<(K, V)> {
        let key = self.order.pop_back()?;
        let (val, _) = self.store.remove(&key)?;

        Some((key, val))
    }

    /// Keys from least to most recently used.
    pub fn keys_lru_first(&self) -> impl Iterator<Item = &K> {
        self.order.iter_back_to_front()
    }

    /// Iterate over all `(key, value)` pairs in arbitrary order.
    #[inline]
    pub fn iter(&self) -> LruTableIter<K, V> {
        LruTableIter {
            inner: self.store.iter(),
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.store.clear();
        self.order = RecencyList::new();
    }
}

pub struct LruTableIter<'a, K, V> {
    inner: hash_map::Iter<'a, K, (V, usize)>,
}

impl<'a, K, V> Iterator for LruTableIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, (v, _))| (k, v))
    }
}

/// Doubly-linked list of keys, most recent at the front, stored in a `Vec` of slots. Freed slots are recycled.
#[derive(Clone, Debug)]
struct RecencyList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

#[derive(Clone, Debug)]
struct Slot<T> {
    value: Option<T>,
    next: usize,
    prev: usize,
}

impl<T> RecencyList<T> {
    /// Slot 0 is the sentinel of the cyclic list. Its `next` is the front and its `prev` is the back.
    const HEAD: usize = 0;

    fn new() -> Self {
        Self {
            slots: vec![Slot {
                value: None,
                next: Self::HEAD,
                prev: Self::HEAD,
            }],
            free: Vec::new(),
        }
    }

    fn unlink(&mut self, slot: usize) {
        let Slot { prev, next, .. } = self.slots[slot];
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
    }

    fn link_front(&mut self, slot: usize) {
        let old_front = self.slots[Self::HEAD].next;
        self.slots[slot].prev = Self::HEAD;
        self.slots[slot].next = old_front;
        self.slots[Self::HEAD].next = slot;
        self.slots[old_front].prev = slot;
    }

    fn move_to_front(&mut self, slot: usize) {
        self.unlink(slot);
        self.link_front(slot);
    }

    fn push_front(&mut self, value: T) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].value = Some(value);
                slot
            }
            None => {
                self.slots.push(Slot {
                    value: Some(value),
                    next: Self::HEAD,
                    prev: Self::HEAD,
                });
                self.slots.len() - 1
            }
        };
        self.link_front(slot);

        slot
    }

    fn remove(&mut self, slot: usize) -> Option<T> {
        debug_assert_ne!(slot, Self::HEAD);
        self.unlink(slot);
        self.free.push(slot);

        self.slots[slot].value.take()
    }

    fn pop_back(&mut self) -> Option<T> {
        let back = self.slots[Self::HEAD].prev;
        if back == Self::HEAD {
            return None;
        }

        self.remove(back)
    }

    fn iter_back_to_front(&self) -> impl Iterator<Item = &T> {
        let mut slot = self.slots[Self::HEAD].prev;

        std::iter::from_fn(move || {
            if slot == Self::HEAD {
                return None;
            }
            let entry = &self.slots[slot];
            slot = entry.prev;

            entry.value.as_ref()
        })
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, SeedableRng};

    #[test]
    fn get_after_insert_and_remove() {
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(4);
        assert_eq!(table.peek(&1), None);

        table.insert(1, 2);
        assert_eq!(table.peek(&1), Some(&2));
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(&1), Some(2));
        assert_eq!(table.peek(&1), None);
        assert!(table.is_empty());
    }

    #[test]
    fn insert_into_full_table_evicts_lru() {
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(3);

        table.insert(1, 10);
        table.insert(2, 20);
        table.insert(3, 30);

        let insertion = table.insert(4, 40);
        assert_eq!(insertion.evicted, Some((1, 10)));
        assert_eq!(insertion.replaced, None);
        assert_eq!(table.len(), 3);
        assert!(!table.contains_key(&1));
    }

    #[test]
    fn touch_moves_entry_to_the_back_of_the_eviction_line() {
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(3);

        table.insert(1, 10);
        table.insert(2, 20);
        table.insert(3, 30);
        assert_eq!(table.get_and_touch(&1), Some(&10));

        assert_eq!(table.insert(4, 40).evicted, Some((2, 20)));
        assert_eq!(table.insert(5, 50).evicted, Some((3, 30)));
        assert_eq!(table.insert(6, 60).evicted, Some((1, 10)));
    }

    #[test]
    fn peek_does_not_affect_lru_order() {
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(2);

        table.insert(1, 10);
        table.insert(2, 20);
        table.peek(&1);

        assert_eq!(table.remove_lru(), Some((1, 10)));
        assert_eq!(table.remove_lru(), Some((2, 20)));
        assert_eq!(table.remove_lru(), None);
    }

    #[test]
    fn reinserting_a_key_replaces_without_evicting() {
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(2);

        table.insert(1, 10);
        table.insert(2, 20);
        let insertion = table.insert(1, 11);

        assert_eq!(
            insertion,
            Insertion {
                replaced: Some(10),
                evicted: None
            }
        );
        assert_eq!(table.keys_lru_first().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(0);

        table.insert(1, 10);
        assert_eq!(table.insert(2, 20).evicted, Some((1, 10)));
        assert_eq!(table.capacity(), 1);
    }

    #[test]
    fn random_workload_matches_reference_recency() {
        let capacity = 16;
        let mut table: SmallKeyLruTable<u32, u32> = SmallKeyLruTable::with_capacity(capacity);
        // Most recently used last.
        let mut reference: Vec<u32> = Vec::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..10_000 {
            let key = rng.gen_range(0..48);
            if rng.gen_bool(0.5) {
                let insertion = table.insert(key, key * 2);
                if let Some(pos) = reference.iter().position(|&k| k == key) {
                    reference.remove(pos);
                    assert_eq!(insertion.evicted, None);
                } else if reference.len() == capacity {
                    let lru = reference.remove(0);
                    assert_eq!(insertion.evicted, Some((lru, lru * 2)));
                }
                reference.push(key);
            } else {
                let hit = table.get_and_touch(&key).copied();
                if let Some(pos) = reference.iter().position(|&k| k == key) {
                    assert_eq!(hit, Some(key * 2));
                    reference.remove(pos);
                    reference.push(key);
                } else {
                    assert_eq!(hit, None);
                }
            }
            assert!(table.len() <= capacity);
        }

        assert_eq!(table.keys_lru_first().copied().collect::<Vec<_>>(), reference);
    }
}
