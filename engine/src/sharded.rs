use core::fmt;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::debug;

use crate::hash::{hash_key, shard_index, NUM_SHARDS};
use crate::probe::{ProbeTable, DEFAULT_CAPACITY};

/// A two-level hash table partitioned into [`NUM_SHARDS`] independent
/// [`ProbeTable`]s.
///
/// A key's shard is chosen by the top bits of its hash, so two different
/// shards never hold the same key. That bounds the cost of any single resize
/// and lets several tables be merged shard by shard in parallel.
pub struct ShardedTable {
  shards: Box<[Option<ProbeTable>]>,
  shard_capacity: usize,
}

impl fmt::Debug for ShardedTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedTable")
      .field("num_shards", &self.shards.len())
      .field("allocated_shards", &self.allocated_shards())
      .field("len", &self.len())
      .finish()
  }
}

impl Default for ShardedTable {
  fn default() -> Self {
    Self::new()
  }
}

fn unallocated_shards() -> Box<[Option<ProbeTable>]> {
  (0..NUM_SHARDS).map(|_| None).collect()
}

impl ShardedTable {
  pub fn new() -> Self {
    Self::with_shard_capacity(DEFAULT_CAPACITY)
  }

  /// Creates a table whose shards start with `shard_capacity` slots once
  /// they are first written to.
  pub fn with_shard_capacity(shard_capacity: usize) -> Self {
    Self {
      shards: unallocated_shards(),
      shard_capacity: shard_capacity.max(1),
    }
  }

  #[inline]
  fn shard_mut(&mut self, index: usize) -> &mut ProbeTable {
    let capacity = self.shard_capacity;
    self.shards[index].get_or_insert_with(|| ProbeTable::with_capacity(capacity))
  }

  /// Stores `value` under `key`, overwriting any previous value.
  pub fn put(&mut self, key: &str, value: i64) {
    if key.is_empty() {
      return;
    }
    let hash = hash_key(key);
    self
      .shard_mut(shard_index(hash))
      .upsert_hashed(hash, key, |_| value);
  }

  /// Adds `delta` to the total under `key`, returning the new total.
  pub fn add(&mut self, key: &str, delta: i64) -> Option<i64> {
    if key.is_empty() {
      return None;
    }
    let hash = hash_key(key);
    Some(self.shard_mut(shard_index(hash)).add_hashed(hash, key, delta))
  }

  pub fn get(&self, key: &str) -> Option<i64> {
    if key.is_empty() {
      return None;
    }
    let hash = hash_key(key);
    self.shards[shard_index(hash)]
      .as_ref()?
      .get_hashed(hash, key)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  pub fn remove(&mut self, key: &str) -> Option<i64> {
    if key.is_empty() {
      return None;
    }
    let hash = hash_key(key);
    self.shards[shard_index(hash)]
      .as_mut()?
      .remove_hashed(hash, key)
  }

  /// Total number of live entries across all shards.
  pub fn len(&self) -> usize {
    self.shards.iter().flatten().map(ProbeTable::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.shards.iter().flatten().all(ProbeTable::is_empty)
  }

  /// Number of shards that have been written to at least once.
  pub fn allocated_shards(&self) -> usize {
    self.shards.iter().filter(|s| s.is_some()).count()
  }

  /// Returns shard `index`, if it has been allocated.
  pub fn shard(&self, index: usize) -> Option<&ProbeTable> {
    self.shards.get(index)?.as_ref()
  }

  /// Iterates over live `(key, value)` pairs shard by shard.
  pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
    self.shards.iter().flatten().flat_map(ProbeTable::iter)
  }

  /// Splits the table into its shards, in shard order.
  pub fn into_shards(self) -> Vec<Option<ProbeTable>> {
    self.shards.into_vec()
  }

  /// Merges worker tables shard by shard, one task per shard index.
  ///
  /// Shard `i` of every input is folded into the first input that allocated
  /// shard `i`. Shards are disjoint in keys, so the tasks share nothing.
  pub fn merge(tables: Vec<ShardedTable>) -> ShardedTable {
    let shard_capacity = tables
      .first()
      .map_or(DEFAULT_CAPACITY, |table| table.shard_capacity);
    let sources = tables.len();

    // Transpose: columns[i] holds shard i of every table that has one.
    let mut columns: Vec<Vec<ProbeTable>> = (0..NUM_SHARDS).map(|_| Vec::new()).collect();
    for table in tables {
      for (column, shard) in columns.iter_mut().zip(table.into_shards()) {
        if let Some(shard) = shard {
          column.push(shard);
        }
      }
    }

    let shards: Vec<Option<ProbeTable>> = columns
      .into_par_iter()
      .map(|column| {
        let mut column = column.into_iter();
        let mut acc = column.next()?;
        for table in column {
          acc.absorb(table);
        }
        Some(acc)
      })
      .collect();

    let merged = ShardedTable {
      shards: shards.into_boxed_slice(),
      shard_capacity,
    };
    debug!(
      sources,
      allocated_shards = merged.allocated_shards(),
      "merged sharded tables"
    );
    merged
  }
}

impl IntoIterator for ShardedTable {
  type Item = (String, i64);
  type IntoIter = std::iter::Flatten<std::iter::Flatten<std::vec::IntoIter<Option<ProbeTable>>>>;

  fn into_iter(self) -> Self::IntoIter {
    self.shards.into_vec().into_iter().flatten().flatten()
  }
}
