//! A resizable open-addressing hash table with linear probing.

use std::fmt;
use std::mem;

use tracing::trace;

use crate::hash::hash_key;

/// Capacity used by [`ProbeTable::new`]. Small on purpose; size tables with
/// many groups through [`ProbeTable::with_capacity`].
pub const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SlotState {
  #[default]
  Empty,
  Live,
  // A removed entry. Keeps probe chains running past it.
  Tombstone,
}

/// One storage cell of a [`ProbeTable`].
#[derive(Clone, Default)]
pub struct Slot {
  key: String,
  value: i64,
  state: SlotState,
}

impl Slot {
  fn live(key: String, value: i64) -> Self {
    Self {
      key,
      value,
      state: SlotState::Live,
    }
  }

  /// The key stored in this slot.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// The value stored in this slot.
  pub fn value(&self) -> i64 {
    self.value
  }

  /// Whether the slot currently holds an entry.
  pub fn is_live(&self) -> bool {
    self.state == SlotState::Live
  }
}

impl fmt::Debug for Slot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.state {
      SlotState::Live => write!(f, "{:?} => {}", self.key, self.value),
      SlotState::Empty => f.write_str("<empty>"),
      SlotState::Tombstone => f.write_str("<removed>"),
    }
  }
}

/// Outcome of walking a probe chain for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
  Found(usize),
  Vacant(usize),
  Full,
}

/// A single-owner hash table from text keys to integer values.
///
/// Collisions are resolved by linear probing. The table doubles when a probe
/// wraps around without finding room, and halves when occupancy falls to a
/// quarter of its capacity. Removed entries leave a tombstone so that keys
/// placed further along the same probe chain stay reachable.
///
/// Growth waits until the table is completely full, so probe chains get
/// long as occupancy nears capacity and inserts there cost up to O(capacity).
/// Pre-size with [`with_capacity`](Self::with_capacity) when the number of
/// distinct keys is known.
///
/// Every instance owns its own `count` and `capacity`.
#[derive(Clone)]
pub struct ProbeTable {
  slots: Box<[Slot]>,
  count: usize,
}

impl Default for ProbeTable {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for ProbeTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProbeTable")
      .field("count", &self.count)
      .field("capacity", &self.slots.len())
      .finish()
  }
}

fn empty_slots(capacity: usize) -> Box<[Slot]> {
  let mut slots = Vec::with_capacity(capacity);
  slots.resize_with(capacity, Slot::default);
  slots.into_boxed_slice()
}

impl ProbeTable {
  /// Creates an empty table with [`DEFAULT_CAPACITY`] slots.
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Creates an empty table with `capacity` slots (at least one).
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      slots: empty_slots(capacity.max(1)),
      count: 0,
    }
  }

  /// Number of live entries.
  pub fn len(&self) -> usize {
    self.count
  }

  /// Same as [`len`](Self::len).
  pub fn size(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  /// Number of slots currently allocated.
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  pub(crate) fn home_slot(&self, hash: u64) -> usize {
    (hash % self.slots.len() as u64) as usize
  }

  fn probe(&self, hash: u64, key: &str) -> Probe {
    let capacity = self.slots.len();
    let start = self.home_slot(hash);
    let mut index = start;
    let mut reusable = None;

    loop {
      let slot = &self.slots[index];
      match slot.state {
        SlotState::Empty => return Probe::Vacant(reusable.unwrap_or(index)),
        SlotState::Live if slot.key == key => return Probe::Found(index),
        SlotState::Live => {}
        SlotState::Tombstone => {
          if reusable.is_none() {
            reusable = Some(index);
          }
        }
      }

      index = (index + 1) % capacity;
      if index == start {
        return reusable.map_or(Probe::Full, Probe::Vacant);
      }
    }
  }

  fn find(&self, key: &str) -> Option<usize> {
    if key.is_empty() {
      return None;
    }
    match self.probe(hash_key(key), key) {
      Probe::Found(index) => Some(index),
      Probe::Vacant(_) | Probe::Full => None,
    }
  }

  /// Walks the probe chain, growing the table until the key either matches a
  /// live slot (`Ok`) or has a vacant slot to go into (`Err`).
  fn locate_or_grow(&mut self, hash: u64, key: &str) -> Result<usize, usize> {
    loop {
      match self.probe(hash, key) {
        Probe::Found(index) => return Ok(index),
        Probe::Vacant(index) => return Err(index),
        Probe::Full => self.resize(self.slots.len() * 2),
      }
    }
  }

  /// Inserts or replaces the value for `key` using a precomputed hash, with
  /// `f` computing the new value from the current one.
  ///
  /// Returns the value now stored.
  pub(crate) fn upsert_hashed<F>(&mut self, hash: u64, key: &str, f: F) -> i64
  where
    F: FnOnce(Option<i64>) -> i64,
  {
    match self.locate_or_grow(hash, key) {
      Ok(index) => {
        let slot = &mut self.slots[index];
        slot.value = f(Some(slot.value));
        slot.value
      }
      Err(index) => {
        let value = f(None);
        self.slots[index] = Slot::live(key.to_owned(), value);
        self.count += 1;
        value
      }
    }
  }

  // Rebuild path: the key is known to be absent, so ownership moves straight in.
  fn place_new(&mut self, key: String, value: i64) {
    let hash = hash_key(&key);
    match self.locate_or_grow(hash, &key) {
      Ok(index) => self.slots[index].value = value,
      Err(index) => {
        self.slots[index] = Slot::live(key, value);
        self.count += 1;
      }
    }
  }

  /// Stores `value` under `key`, overwriting any previous value.
  ///
  /// Empty keys are ignored.
  pub fn put(&mut self, key: &str, value: i64) {
    if key.is_empty() {
      return;
    }
    self.upsert_hashed(hash_key(key), key, |_| value);
  }

  /// Adds `delta` to the value under `key`, inserting it if absent.
  ///
  /// Returns the new total, or `None` for an empty key.
  pub fn add(&mut self, key: &str, delta: i64) -> Option<i64> {
    if key.is_empty() {
      return None;
    }
    Some(self.add_hashed(hash_key(key), key, delta))
  }

  #[inline]
  pub(crate) fn add_hashed(&mut self, hash: u64, key: &str, delta: i64) -> i64 {
    self.upsert_hashed(hash, key, |current| {
      current.unwrap_or(0).wrapping_add(delta)
    })
  }

  /// Returns the live slot for `key`.
  pub fn get(&self, key: &str) -> Option<&Slot> {
    self.find(key).map(|index| &self.slots[index])
  }

  pub(crate) fn get_hashed(&self, hash: u64, key: &str) -> Option<i64> {
    match self.probe(hash, key) {
      Probe::Found(index) => Some(self.slots[index].value),
      Probe::Vacant(_) | Probe::Full => None,
    }
  }

  /// Returns the value stored for `key`.
  pub fn get_value(&self, key: &str) -> Option<i64> {
    self.get(key).map(Slot::value)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.find(key).is_some()
  }

  /// Removes `key`, returning its value.
  ///
  /// Shrinks the table by half once a quarter or less of it is occupied.
  pub fn remove(&mut self, key: &str) -> Option<i64> {
    if key.is_empty() {
      return None;
    }
    self.remove_hashed(hash_key(key), key)
  }

  pub(crate) fn remove_hashed(&mut self, hash: u64, key: &str) -> Option<i64> {
    let Probe::Found(index) = self.probe(hash, key) else {
      return None;
    };
    let slot = &mut self.slots[index];
    slot.state = SlotState::Tombstone;
    let value = slot.value;
    slot.value = 0;
    slot.key = String::new();
    self.count -= 1;

    let capacity = self.slots.len();
    if self.count <= capacity / 4 && capacity / 2 != 0 {
      self.resize(capacity / 2);
    }
    Some(value)
  }

  /// Removes every entry, keeping the current capacity.
  pub fn clear(&mut self) {
    self.slots = empty_slots(self.slots.len());
    self.count = 0;
  }

  /// Rebuilds the table with `capacity` slots, re-inserting every live entry
  /// and dropping tombstones.
  fn resize(&mut self, capacity: usize) {
    let old_capacity = self.slots.len();
    let old = mem::replace(&mut self.slots, empty_slots(capacity));
    let live = self.count;
    self.count = 0;

    for slot in old.into_vec() {
      if slot.is_live() {
        self.place_new(slot.key, slot.value);
      }
    }

    debug_assert_eq!(self.count, live, "resize must keep every live entry");
    trace!(
      from = old_capacity,
      to = self.slots.len(),
      entries = self.count,
      "probe table resized"
    );
  }

  /// Folds `other` into this table, summing values of matching keys and
  /// inserting the rest.
  pub fn absorb(&mut self, other: ProbeTable) {
    for (key, value) in other {
      let hash = hash_key(&key);
      match self.locate_or_grow(hash, &key) {
        Ok(index) => {
          let slot = &mut self.slots[index];
          slot.value = slot.value.wrapping_add(value);
        }
        Err(index) => {
          self.slots[index] = Slot::live(key, value);
          self.count += 1;
        }
      }
    }
  }

  /// Iterates over live `(key, value)` pairs in slot order.
  pub fn iter(&self) -> Iter<'_> {
    Iter {
      slots: self.slots.iter(),
    }
  }
}

/// Borrowing iterator over the live entries of a [`ProbeTable`].
pub struct Iter<'a> {
  slots: std::slice::Iter<'a, Slot>,
}

impl<'a> Iterator for Iter<'a> {
  type Item = (&'a str, i64);

  fn next(&mut self) -> Option<Self::Item> {
    self
      .slots
      .by_ref()
      .find(|slot| slot.is_live())
      .map(|slot| (slot.key.as_str(), slot.value))
  }
}

/// Owning iterator over the live entries of a [`ProbeTable`].
pub struct IntoIter {
  slots: std::vec::IntoIter<Slot>,
}

impl Iterator for IntoIter {
  type Item = (String, i64);

  fn next(&mut self) -> Option<Self::Item> {
    self
      .slots
      .by_ref()
      .find(|slot| slot.is_live())
      .map(|slot| (slot.key, slot.value))
  }
}

impl IntoIterator for ProbeTable {
  type Item = (String, i64);
  type IntoIter = IntoIter;

  fn into_iter(self) -> IntoIter {
    IntoIter {
      slots: self.slots.into_vec().into_iter(),
    }
  }
}

impl<'a> IntoIterator for &'a ProbeTable {
  type Item = (&'a str, i64);
  type IntoIter = Iter<'a>;

  fn into_iter(self) -> Iter<'a> {
    self.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Finds keys whose home slot in a table of `capacity` is `slot`.
  fn keys_homed_at(slot: usize, capacity: usize, n: usize) -> Vec<String> {
    let table = ProbeTable::with_capacity(capacity);
    (0..)
      .map(|i| format!("k{i}"))
      .filter(|k| table.home_slot(hash_key(k)) == slot)
      .take(n)
      .collect()
  }

  #[test]
  fn test_put_overwrites_instead_of_summing() {
    let mut table = ProbeTable::new();
    table.put("android", 10);
    table.put("android", 5);
    assert_eq!(table.get_value("android"), Some(5));
    assert_eq!(table.len(), 1);
  }

  #[test]
  fn test_add_accumulates() {
    let mut table = ProbeTable::new();
    assert_eq!(table.add("ios", 20), Some(20));
    assert_eq!(table.add("ios", 7), Some(27));
    assert_eq!(table.get_value("ios"), Some(27));
  }

  #[test]
  fn test_empty_key_is_a_no_op() {
    let mut table = ProbeTable::new();
    table.put("", 1);
    assert_eq!(table.add("", 1), None);
    assert!(table.get("").is_none());
    assert_eq!(table.remove(""), None);
    assert!(table.is_empty());
  }

  #[test]
  fn test_full_table_grows_on_next_insert() {
    let mut table = ProbeTable::with_capacity(4);
    for i in 0..4 {
      table.put(&format!("key-{i}"), i);
    }
    // Filling every slot does not resize by itself.
    assert_eq!(table.capacity(), 4);

    table.put("key-4", 4);
    assert_eq!(table.capacity(), 8);
    for i in 0..5 {
      assert_eq!(table.get_value(&format!("key-{i}")), Some(i));
    }
  }

  #[test]
  fn test_presized_table_runs_full_without_growing() {
    let mut table = ProbeTable::with_capacity(64);
    for i in 0..64 {
      table.add(&format!("group-{i}"), i);
    }
    assert_eq!(table.capacity(), 64);
    assert_eq!(table.len(), 64);
    for i in 0..64 {
      assert_eq!(table.get_value(&format!("group-{i}")), Some(i));
    }
  }

  #[test]
  fn test_removal_keeps_probe_chain_intact() {
    let capacity = 8;
    let keys = keys_homed_at(3, capacity, 3);
    let mut table = ProbeTable::with_capacity(capacity);
    for (i, key) in keys.iter().enumerate() {
      table.put(key, i as i64);
    }

    // Removing the head of the chain must not hide the keys behind it.
    table.put("pad-a", 0);
    table.put("pad-b", 0);
    table.put("pad-c", 0);
    assert_eq!(table.remove(&keys[0]), Some(0));
    assert_eq!(table.get_value(&keys[1]), Some(1));
    assert_eq!(table.get_value(&keys[2]), Some(2));
  }

  #[test]
  fn test_tombstone_is_reused() {
    let capacity = 8;
    let keys = keys_homed_at(5, capacity, 2);
    let mut table = ProbeTable::with_capacity(capacity);
    for key in ["a", "b", "c", "d"] {
      table.put(key, 1);
    }
    table.put(&keys[0], 1);
    table.put(&keys[1], 2);
    table.remove(&keys[0]);

    // Re-inserting a removed key must not create a duplicate of a later one.
    table.put(&keys[1], 3);
    assert_eq!(table.len(), 5);
    assert_eq!(table.get_value(&keys[1]), Some(3));
    assert_eq!(table.iter().filter(|(k, _)| *k == keys[1]).count(), 1);
  }

  #[test]
  fn test_shrink_stops_at_one_slot() {
    let mut table = ProbeTable::with_capacity(2);
    table.put("x", 1);
    table.remove("x");
    assert_eq!(table.capacity(), 1);
    table.put("y", 2);
    table.put("z", 3);
    assert_eq!(table.capacity(), 2);
    assert_eq!(table.get_value("y"), Some(2));
    assert_eq!(table.get_value("z"), Some(3));
  }

  #[test]
  fn test_absorb_sums_matching_keys() {
    let mut left = ProbeTable::new();
    left.put("android", 10);
    left.put("ios", 20);
    let mut right = ProbeTable::new();
    right.put("android", 8);
    right.put("tizen", 1);

    left.absorb(right);
    assert_eq!(left.get_value("android"), Some(18));
    assert_eq!(left.get_value("ios"), Some(20));
    assert_eq!(left.get_value("tizen"), Some(1));
    assert_eq!(left.len(), 3);
  }

  #[test]
  fn test_instances_keep_their_own_counters() {
    let mut a = ProbeTable::with_capacity(4);
    let mut b = ProbeTable::with_capacity(32);
    for i in 0..10 {
      a.put(&format!("a{i}"), i);
    }
    b.put("only", 1);
    assert_eq!(a.len(), 10);
    assert_eq!(b.len(), 1);
    assert_eq!(b.capacity(), 32);
  }
}
