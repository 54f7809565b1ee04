use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::InvariantViolation;

/// Zero-based position of an entry in the slot arena.
///
/// A slot index is assigned when an entry is inserted and never changes while
/// the entry is resident. Vacated slots are handed to the next insertion, so
/// the range `0..capacity` maps 1:1 onto a fixed external resource range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotIndex(pub usize);

impl SlotIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    /// Towards the front (more recently used).
    prev: Option<SlotIndex>,
    /// Towards the back (less recently used).
    next: Option<SlotIndex>,
}

#[derive(Debug)]
enum Slot<V> {
    Vacant,
    Occupied(Node<V>),
}

/// An entry removed from the back of the chain.
#[derive(Debug)]
pub(crate) struct Evicted<V> {
    pub slot: SlotIndex,
    pub key: String,
    pub value: V,
}

/// Fixed-capacity slot arena with a doubly linked recency chain threaded
/// through it by index.
///
/// Keys map to slots through the index; `prev`/`next` are plain indices.
/// The arena grows up to `capacity` slots and never beyond. Once a slot has
/// been vacated it sits on the free list until the next insertion takes it.
#[derive(Debug)]
pub(crate) struct SlotArena<V> {
    slots: Vec<Slot<V>>,
    free: Vec<SlotIndex>,
    index: HashMap<String, SlotIndex>,
    front: Option<SlotIndex>,
    back: Option<SlotIndex>,
    capacity: usize,
}

impl<V> SlotArena<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            front: None,
            back: None,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn lookup(&self, key: &str) -> Option<SlotIndex> {
        self.index.get(key).copied()
    }

    pub fn value(&self, slot: SlotIndex) -> Option<&V> {
        self.node(slot).map(|n| &n.value)
    }

    pub fn back_key(&self) -> Option<&str> {
        self.back.and_then(|s| self.node(s)).map(|n| n.key.as_str())
    }

    /// The slot the next insertion will occupy, if there is room.
    ///
    /// The most recently vacated slot wins; otherwise the arena grows by one,
    /// which makes the new index equal to the current occupancy.
    pub fn vacant_slot(&self) -> Option<SlotIndex> {
        if let Some(&slot) = self.free.last() {
            return Some(slot);
        }
        if self.slots.len() < self.capacity {
            return Some(SlotIndex(self.slots.len()));
        }
        None
    }

    /// Move the entry for `key` to the front and return its slot and value.
    pub fn touch(&mut self, key: &str) -> Option<(SlotIndex, &V)> {
        let slot = self.lookup(key)?;
        if self.front != Some(slot) {
            self.unlink(slot);
            self.link_front(slot);
        }
        self.node(slot).map(|n| (slot, &n.value))
    }

    /// Place a new entry at the front in a vacant slot.
    pub fn occupy(&mut self, slot: SlotIndex, key: String, value: V) -> Result<(), InvariantViolation> {
        if self.index.contains_key(&key) {
            return Err(InvariantViolation::DuplicateKey { key });
        }
        if slot.0 == self.slots.len() && slot.0 < self.capacity {
            self.slots.push(Slot::Vacant);
        }
        match self.slots.get(slot.0) {
            Some(Slot::Vacant) => {}
            _ => return Err(InvariantViolation::SlotNotVacant { slot }),
        }
        self.free.retain(|s| *s != slot);
        self.index.insert(key.clone(), slot);
        self.slots[slot.0] = Slot::Occupied(Node {
            key,
            value,
            prev: None,
            next: None,
        });
        self.link_front(slot);
        Ok(())
    }

    /// Remove the least recently used entry, vacating its slot.
    pub fn evict_back(&mut self) -> Option<Evicted<V>> {
        let slot = self.back?;
        self.unlink(slot);
        let Slot::Occupied(node) = std::mem::replace(&mut self.slots[slot.0], Slot::Vacant) else {
            return None;
        };
        self.index.remove(&node.key);
        self.free.push(slot);
        Some(Evicted {
            slot,
            key: node.key,
            value: node.value,
        })
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.front = None;
        self.back = None;
    }

    /// Resident entries from front (most recent) to back.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            arena: self,
            cursor: self.front,
        }
    }

    /// Verify the structural invariants of the arena and its chain.
    pub fn check(&self) -> Result<(), InvariantViolation> {
        if self.len() > self.capacity || self.slots.len() > self.capacity {
            return Err(InvariantViolation::OverCapacity {
                occupancy: self.len(),
                capacity: self.capacity,
            });
        }
        if let Some(front) = self.front {
            if self.node(front).is_none_or(|n| n.prev.is_some()) {
                return Err(InvariantViolation::DanglingEnd { slot: front });
            }
        }
        if let Some(back) = self.back {
            if self.node(back).is_none_or(|n| n.next.is_some()) {
                return Err(InvariantViolation::DanglingEnd { slot: back });
            }
        }

        let mut linked = 0;
        let mut prev = None;
        let mut cursor = self.front;
        while let Some(slot) = cursor {
            let node = self.node(slot).ok_or(InvariantViolation::BrokenLink { slot })?;
            if node.prev != prev {
                return Err(InvariantViolation::BrokenLink { slot });
            }
            if self.index.get(&node.key) != Some(&slot) {
                return Err(InvariantViolation::IndexMismatch {
                    key: node.key.clone(),
                });
            }
            linked += 1;
            if linked > self.slots.len() {
                return Err(InvariantViolation::BrokenLink { slot });
            }
            prev = Some(slot);
            cursor = node.next;
        }
        if prev != self.back {
            return Err(InvariantViolation::DanglingEnd {
                slot: prev.or(self.back).unwrap_or(SlotIndex(0)),
            });
        }
        if linked != self.index.len() {
            return Err(InvariantViolation::OccupancyMismatch {
                linked,
                indexed: self.index.len(),
            });
        }

        let vacant = self
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Vacant))
            .count();
        if vacant != self.free.len() {
            return Err(InvariantViolation::FreeListMismatch {
                vacant,
                free: self.free.len(),
            });
        }
        Ok(())
    }

    fn node(&self, slot: SlotIndex) -> Option<&Node<V>> {
        match self.slots.get(slot.0) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    fn node_mut(&mut self, slot: SlotIndex) -> Option<&mut Node<V>> {
        match self.slots.get_mut(slot.0) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    fn unlink(&mut self, slot: SlotIndex) {
        let Some(node) = self.node_mut(slot) else {
            return;
        };
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev.and_then(|p| self.node_mut(p)) {
            Some(p) => p.next = next,
            None => self.front = next,
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.back = prev,
        }
    }

    fn link_front(&mut self, slot: SlotIndex) {
        let old_front = self.front;
        let Some(node) = self.node_mut(slot) else {
            return;
        };
        node.prev = None;
        node.next = old_front;
        match old_front.and_then(|f| self.node_mut(f)) {
            Some(f) => f.prev = Some(slot),
            None => self.back = Some(slot),
        }
        self.front = Some(slot);
    }
}

/// Front-to-back iterator over resident entries.
pub struct Iter<'a, V> {
    arena: &'a SlotArena<V>,
    cursor: Option<SlotIndex>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (SlotIndex, &'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.arena.node(slot)?;
        self.cursor = node.next;
        Some((slot, node.key.as_str(), &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(arena: &SlotArena<u32>) -> Vec<&str> {
        arena.iter().map(|(_, k, _)| k).collect()
    }

    fn fill(arena: &mut SlotArena<u32>, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            let slot = arena.vacant_slot().unwrap();
            arena.occupy(slot, name.to_string(), i as u32).unwrap();
        }
    }

    #[test]
    fn first_entry_is_front_and_back() {
        let mut arena = SlotArena::new(3);
        fill(&mut arena, &["a"]);
        assert_eq!(arena.front, Some(SlotIndex(0)));
        assert_eq!(arena.back, Some(SlotIndex(0)));
        arena.check().unwrap();
    }

    #[test]
    fn slots_grow_with_occupancy() {
        let mut arena = SlotArena::new(3);
        fill(&mut arena, &["a", "b", "c"]);
        assert_eq!(arena.lookup("a"), Some(SlotIndex(0)));
        assert_eq!(arena.lookup("b"), Some(SlotIndex(1)));
        assert_eq!(arena.lookup("c"), Some(SlotIndex(2)));
        assert_eq!(arena.vacant_slot(), None);
        assert_eq!(keys(&arena), ["c", "b", "a"]);
    }

    #[test]
    fn touch_moves_to_front() {
        let mut arena = SlotArena::new(3);
        fill(&mut arena, &["a", "b", "c"]);

        let (slot, value) = arena.touch("a").unwrap();
        assert_eq!((slot, *value), (SlotIndex(0), 0));
        assert_eq!(keys(&arena), ["a", "c", "b"]);
        arena.check().unwrap();

        // middle entry
        arena.touch("c").unwrap();
        assert_eq!(keys(&arena), ["c", "a", "b"]);
        arena.check().unwrap();

        // front entry is a no-op
        arena.touch("c").unwrap();
        assert_eq!(keys(&arena), ["c", "a", "b"]);
        assert!(arena.touch("missing").is_none());
    }

    #[test]
    fn evict_back_frees_its_slot() {
        let mut arena = SlotArena::new(2);
        fill(&mut arena, &["a", "b"]);

        let evicted = arena.evict_back().unwrap();
        assert_eq!(evicted.key, "a");
        assert_eq!(evicted.slot, SlotIndex(0));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.vacant_slot(), Some(SlotIndex(0)));
        arena.check().unwrap();

        arena.occupy(SlotIndex(0), "c".into(), 9).unwrap();
        assert_eq!(keys(&arena), ["c", "b"]);
        arena.check().unwrap();
    }

    #[test]
    fn evicting_sole_entry_empties_both_ends() {
        let mut arena = SlotArena::new(1);
        fill(&mut arena, &["only"]);
        arena.evict_back().unwrap();
        assert!(arena.front.is_none());
        assert!(arena.back.is_none());
        assert!(arena.evict_back().is_none());
        arena.check().unwrap();
    }

    #[test]
    fn occupy_rejects_taken_slot_and_duplicate_key() {
        let mut arena = SlotArena::new(2);
        fill(&mut arena, &["a"]);
        assert!(matches!(
            arena.occupy(SlotIndex(0), "b".into(), 1),
            Err(InvariantViolation::SlotNotVacant { .. })
        ));
        assert!(matches!(
            arena.occupy(SlotIndex(1), "a".into(), 1),
            Err(InvariantViolation::DuplicateKey { .. })
        ));
        assert!(matches!(
            arena.occupy(SlotIndex(5), "z".into(), 1),
            Err(InvariantViolation::SlotNotVacant { .. })
        ));
        arena.check().unwrap();
    }

    #[test]
    fn clear_resets_everything() {
        let mut arena = SlotArena::new(2);
        fill(&mut arena, &["a", "b"]);
        arena.evict_back();
        arena.clear();
        assert_eq!(arena.len(), 0);
        assert_eq!(arena.vacant_slot(), Some(SlotIndex(0)));
        assert_eq!(keys(&arena), Vec::<&str>::new());
        arena.check().unwrap();
    }

    #[test]
    fn slot_index_display() {
        assert_eq!(SlotIndex(3).to_string(), "#3");
        assert_eq!(SlotIndex(3).get(), 3);
    }
}
