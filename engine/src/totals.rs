use std::collections::HashMap;

use crate::probe::ProbeTable;
use crate::record::Sink;
use crate::sharded::ShardedTable;

/// The final `(key, total)` pairs of an aggregation, in no particular order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTotals {
  pairs: Vec<(String, i64)>,
}

impl GroupTotals {
  /// Number of distinct keys.
  pub fn len(&self) -> usize {
    self.pairs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pairs.is_empty()
  }

  /// Looks up one key. Linear in the number of groups; use
  /// [`into_map`](Self::into_map) for repeated lookups.
  pub fn get(&self, key: &str) -> Option<i64> {
    self
      .pairs
      .iter()
      .find_map(|(k, total)| (k == key).then_some(*total))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
    self.pairs.iter().map(|(k, total)| (k.as_str(), *total))
  }

  /// Sum of every group's total.
  pub fn grand_total(&self) -> i64 {
    self
      .pairs
      .iter()
      .fold(0i64, |acc, (_, total)| acc.wrapping_add(*total))
  }

  /// Returns the pairs sorted by key.
  pub fn into_sorted(mut self) -> Vec<(String, i64)> {
    self.pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    self.pairs
  }

  pub fn into_map(self) -> HashMap<String, i64> {
    self.pairs.into_iter().collect()
  }

  pub fn into_vec(self) -> Vec<(String, i64)> {
    self.pairs
  }

  /// Hands every pair to `sink`.
  pub fn deliver<S: Sink + ?Sized>(self, sink: &mut S) {
    for (key, total) in self.pairs {
      sink.accept(key, total);
    }
  }
}

impl From<Vec<(String, i64)>> for GroupTotals {
  fn from(pairs: Vec<(String, i64)>) -> Self {
    Self { pairs }
  }
}

impl From<ProbeTable> for GroupTotals {
  fn from(table: ProbeTable) -> Self {
    Self {
      pairs: table.into_iter().collect(),
    }
  }
}

impl From<ShardedTable> for GroupTotals {
  fn from(table: ShardedTable) -> Self {
    Self {
      pairs: table.into_iter().collect(),
    }
  }
}

impl IntoIterator for GroupTotals {
  type Item = (String, i64);
  type IntoIter = std::vec::IntoIter<(String, i64)>;

  fn into_iter(self) -> Self::IntoIter {
    self.pairs.into_iter()
  }
}
