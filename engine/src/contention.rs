//! A probe table that concurrent writers can share without waiting on each
//! other's hot slots.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

use crate::hash::{bucket_index, hash_key};
use crate::probe::{ProbeTable, DEFAULT_CAPACITY};

/// Result of a write attempt on a [`ContentionAwareTable`].
#[must_use = "a contended write was not applied and must be retained by the caller"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contention {
  /// The write was applied.
  Accepted,
  /// Another writer held the target slot. Nothing was written.
  Contended,
}

impl Contention {
  pub fn is_contended(self) -> bool {
    self == Contention::Contended
  }
}

/// Number of independently locked segments in a [`ContentionAwareTable`].
pub const SEGMENTS: usize = 16;

struct Layout {
  table: ProbeTable,
  // One indicator per slot of `table`, rebuilt whenever the table resizes.
  indicators: Box<[AtomicBool]>,
  // Bumped on every rebuild of `indicators`.
  generation: u64,
}

fn clear_indicators(len: usize) -> Box<[AtomicBool]> {
  (0..len).map(|_| AtomicBool::new(false)).collect()
}

impl Layout {
  fn new(table: ProbeTable) -> Self {
    let indicators = clear_indicators(table.capacity());
    Self {
      table,
      indicators,
      generation: 0,
    }
  }

  fn sync_indicators(&mut self) {
    if self.indicators.len() != self.table.capacity() {
      self.indicators = clear_indicators(self.table.capacity());
      self.generation += 1;
    }
  }
}

// Segment selected by the top bits of a hash; home slots come from the hash
// modulo the segment capacity.
#[inline]
fn segment_index(hash: u64) -> usize {
  bucket_index(hash, SEGMENTS)
}

/// A [`ProbeTable`] with a per-slot contention indicator, split into
/// [`SEGMENTS`] independently locked segments.
///
/// A writer first claims the indicator of its key's home slot with an atomic
/// compare-and-swap. If another writer already holds it the write abstains
/// and returns [`Contention::Contended`]; the caller keeps the contribution
/// (usually in a thread-local table) and folds it in later. A claimed write
/// then mutates its segment under a short exclusive lock and releases the
/// indicator. Writers on other segments never wait for it, and a segment
/// that grows only blocks its own writers.
pub struct ContentionAwareTable {
  segments: Box<[CachePadded<RwLock<Layout>>]>,
  contended: CachePadded<AtomicU64>,
}

impl fmt::Debug for ContentionAwareTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ContentionAwareTable")
      .field("count", &self.len())
      .field("capacity", &self.capacity())
      .field("segments", &self.segments.len())
      .field("contended_writes", &self.contended_writes())
      .finish()
  }
}

impl Default for ContentionAwareTable {
  fn default() -> Self {
    Self::new()
  }
}

impl ContentionAwareTable {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Creates a table of roughly `capacity` slots spread over the segments.
  pub fn with_capacity(capacity: usize) -> Self {
    let per_segment = capacity.div_ceil(SEGMENTS).max(1);
    Self {
      segments: (0..SEGMENTS)
        .map(|_| CachePadded::new(RwLock::new(Layout::new(ProbeTable::with_capacity(per_segment)))))
        .collect(),
      contended: CachePadded::new(AtomicU64::new(0)),
    }
  }

  /// Redistributes an existing table over the segments. Every indicator
  /// starts clear.
  pub fn from_table(table: ProbeTable) -> Self {
    let mut shared = Self::with_capacity(table.capacity());
    shared.absorb(table);
    shared
  }

  #[inline]
  fn segment(&self, hash: u64) -> &RwLock<Layout> {
    &self.segments[segment_index(hash)]
  }

  /// Stores `value` under `key`, overwriting any previous value, unless the
  /// key's slot is contended.
  pub fn put(&self, key: &str, value: i64) -> Contention {
    self.write_with(key, |_| value)
  }

  /// Adds `delta` to the total under `key` unless the key's slot is
  /// contended. The read of the old total and the write of the new one
  /// happen inside the same claimed slot.
  pub fn add(&self, key: &str, delta: i64) -> Contention {
    self.write_with(key, |current| current.unwrap_or(0).wrapping_add(delta))
  }

  fn write_with<F>(&self, key: &str, f: F) -> Contention
  where
    F: FnOnce(Option<i64>) -> i64,
  {
    if key.is_empty() {
      return Contention::Accepted;
    }
    let hash = hash_key(key);
    let segment = self.segment(hash);

    let (home, generation) = {
      let layout = segment.read();
      let home = layout.table.home_slot(hash);
      if layout.indicators[home]
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
      {
        self.contended.fetch_add(1, Ordering::Relaxed);
        return Contention::Contended;
      }
      (home, layout.generation)
    };

    let mut layout = segment.write();
    layout.table.upsert_hashed(hash, key, f);
    layout.sync_indicators();
    // A rebuild since the claim already discarded our indicator.
    if layout.generation == generation {
      layout.indicators[home].store(false, Ordering::Release);
    }
    Contention::Accepted
  }

  /// Returns the value stored for `key`.
  pub fn get(&self, key: &str) -> Option<i64> {
    if key.is_empty() {
      return None;
    }
    let hash = hash_key(key);
    self.segment(hash).read().table.get_hashed(hash, key)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  pub fn len(&self) -> usize {
    self.segments.iter().map(|segment| segment.read().table.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Total slots over every segment.
  pub fn capacity(&self) -> usize {
    self.segments.iter().map(|segment| segment.read().table.capacity()).sum()
  }

  /// Number of writes that abstained since this table was created.
  pub fn contended_writes(&self) -> u64 {
    self.contended.load(Ordering::Relaxed)
  }

  /// Folds a worker's fallback table in. Requires exclusive access, so it
  /// only runs once every writer is done.
  pub fn absorb(&mut self, local: ProbeTable) {
    for (key, value) in local {
      let hash = hash_key(&key);
      let layout = self.segments[segment_index(hash)].get_mut();
      layout.table.add_hashed(hash, &key, value);
      layout.sync_indicators();
    }
  }

  /// Collects every segment into one table for the merge phase.
  pub fn into_inner(self) -> ProbeTable {
    let layouts: Vec<Layout> = self
      .segments
      .into_vec()
      .into_iter()
      .map(|segment| CachePadded::into_inner(segment).into_inner())
      .collect();
    let capacity = layouts.iter().map(|layout| layout.table.capacity()).sum();
    let mut table = ProbeTable::with_capacity(capacity);
    for layout in layouts {
      table.absorb(layout.table);
    }
    table
  }

  /// Marks the home slot of `key` as claimed by a writer that never
  /// finishes. The claim lasts until that segment resizes.
  #[cfg(test)]
  pub(crate) fn hold_slot(&self, key: &str) {
    let hash = hash_key(key);
    let layout = self.segment(hash).read();
    let home = layout.table.home_slot(hash);
    layout.indicators[home].store(true, Ordering::Release);
  }
}
