//! Grouping by sorting: a parallel merge sort on the key followed by one
//! linear pass that sums runs of equal keys.

use std::cmp::Ordering;

use tracing::trace;

use crate::record::Record;

/// Slices at or below this many records are sorted sequentially.
pub const DEFAULT_SEQUENTIAL_CUTOFF: usize = 1024;

/// Direction of the key order produced by [`SortMergeReducer::sort`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SortOrder {
  #[default]
  Ascending,
  Descending,
}

impl SortOrder {
  #[inline]
  fn compare(self, a: &Record, b: &Record) -> Ordering {
    match self {
      SortOrder::Ascending => a.key.cmp(&b.key),
      SortOrder::Descending => b.key.cmp(&a.key),
    }
  }
}

/// Divide-and-conquer merge sort plus contiguous-run summation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortMergeReducer {
  cutoff: usize,
  order: SortOrder,
}

impl Default for SortMergeReducer {
  fn default() -> Self {
    Self::new(DEFAULT_SEQUENTIAL_CUTOFF, SortOrder::Ascending)
  }
}

impl SortMergeReducer {
  /// A `cutoff` of zero is treated as one, which recurses all the way down
  /// to single records.
  pub fn new(cutoff: usize, order: SortOrder) -> Self {
    Self {
      cutoff: cutoff.max(1),
      order,
    }
  }

  pub fn cutoff(&self) -> usize {
    self.cutoff
  }

  pub fn order(&self) -> SortOrder {
    self.order
  }

  /// Sorts records by key. Records with equal keys keep their input order.
  ///
  /// Above the cutoff the input is halved and both halves are sorted in
  /// parallel on the rayon pool, then merged.
  pub fn sort(&self, mut records: Vec<Record>) -> Vec<Record> {
    if records.len() <= self.cutoff {
      let order = self.order;
      records.sort_by(|a, b| order.compare(a, b));
      return records;
    }
    let right = records.split_off(records.len() / 2);
    let (left, right) = rayon::join(|| self.sort(records), || self.sort(right));
    self.merge(left, right)
  }

  /// Merges two runs sorted in this reducer's order into one.
  ///
  /// On equal keys the record from `left` comes first.
  pub fn merge(&self, left: Vec<Record>, right: Vec<Record>) -> Vec<Record> {
    if left.is_empty() {
      return right;
    }
    if right.is_empty() {
      return left;
    }

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
      let take_left = match (left.peek(), right.peek()) {
        (Some(l), Some(r)) => self.order.compare(l, r) != Ordering::Greater,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => break,
      };
      let next = if take_left { left.next() } else { right.next() };
      merged.extend(next);
    }
    merged
  }

  /// Merges any number of sorted runs by a balanced tree of pairwise merges,
  /// with sibling merges running in parallel.
  pub fn merge_runs(&self, mut runs: Vec<Vec<Record>>) -> Vec<Record> {
    match runs.len() {
      0 => Vec::new(),
      1 => runs.pop().unwrap_or_default(),
      n => {
        let right = runs.split_off(n / 2);
        let (left, right) = rayon::join(|| self.merge_runs(runs), || self.merge_runs(right));
        self.merge(left, right)
      }
    }
  }

  /// Sums each run of equal keys in sorted input, emitting one
  /// `(key, total)` per run in the input's order. Empty keys are dropped.
  pub fn reduce(&self, sorted: Vec<Record>) -> Vec<(String, i64)> {
    let mut totals: Vec<(String, i64)> = Vec::new();
    for Record { key, value } in sorted {
      if key.is_empty() {
        continue;
      }
      match totals.last_mut() {
        Some((last, total)) if *last == key => *total = total.wrapping_add(value),
        _ => totals.push((key, value)),
      }
    }
    trace!(groups = totals.len(), "reduced sorted runs");
    totals
  }

  /// Sorts then reduces.
  pub fn aggregate(&self, records: Vec<Record>) -> Vec<(String, i64)> {
    self.reduce(self.sort(records))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recs(pairs: &[(&str, i64)]) -> Vec<Record> {
    pairs.iter().map(|&(k, v)| Record::new(k, v)).collect()
  }

  fn keys(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.key.as_str()).collect()
  }

  #[test]
  fn test_single_record_base_case() {
    let reducer = SortMergeReducer::new(1, SortOrder::Ascending);
    let sorted = reducer.sort(recs(&[("d", 1), ("b", 2), ("a", 3), ("c", 4), ("b", 5)]));
    assert_eq!(keys(&sorted), vec!["a", "b", "b", "c", "d"]);
    // Equal keys keep input order.
    assert_eq!(sorted[1].value, 2);
    assert_eq!(sorted[2].value, 5);
  }

  #[test]
  fn test_descending_order() {
    let reducer = SortMergeReducer::new(2, SortOrder::Descending);
    let sorted = reducer.sort(recs(&[("a", 1), ("c", 2), ("b", 3), ("c", 4)]));
    assert_eq!(keys(&sorted), vec!["c", "c", "b", "a"]);
  }

  #[test]
  fn test_reduce_sums_contiguous_runs() {
    let reducer = SortMergeReducer::default();
    let totals = reducer.aggregate(recs(&[
      ("android", 10),
      ("ios", 20),
      ("android", 5),
      ("ios", 7),
      ("android", 3),
    ]));
    assert_eq!(
      totals,
      vec![("android".to_string(), 18), ("ios".to_string(), 27)]
    );
  }

  #[test]
  fn test_reduce_drops_empty_keys() {
    let reducer = SortMergeReducer::default();
    let totals = reducer.aggregate(recs(&[("", 4), ("a", 1), ("", 2)]));
    assert_eq!(totals, vec![("a".to_string(), 1)]);
  }

  #[test]
  fn test_merge_runs_of_uneven_lengths() {
    let reducer = SortMergeReducer::default();
    let runs = vec![
      recs(&[("a", 1), ("d", 1)]),
      Vec::new(),
      recs(&[("b", 1)]),
      recs(&[("a", 2), ("c", 1), ("e", 1)]),
    ];
    let merged = reducer.merge_runs(runs);
    assert_eq!(keys(&merged), vec!["a", "a", "b", "c", "d", "e"]);
    assert!(reducer.merge_runs(Vec::new()).is_empty());
  }

  #[test]
  fn test_zero_cutoff_is_one() {
    assert_eq!(SortMergeReducer::new(0, SortOrder::Ascending).cutoff(), 1);
  }
}
