#![allow(dead_code)]

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tally_engine::{GroupTotals, Record};

/// The records of the device-popularity example.
pub fn devices() -> Vec<Record> {
  vec![
    Record::new("android", 10),
    Record::new("ios", 20),
    Record::new("android", 5),
    Record::new("ios", 7),
    Record::new("android", 3),
  ]
}

pub fn expected_devices() -> BTreeMap<String, i64> {
  BTreeMap::from([("android".to_string(), 18), ("ios".to_string(), 27)])
}

// Deterministic records drawn from `distinct` keys, with the occasional
// empty key and negative value mixed in.
pub fn random_records(seed: u64, count: usize, distinct: usize) -> Vec<Record> {
  let mut rng = Pcg64::seed_from_u64(seed);
  (0..count)
    .map(|_| {
      let key = if rng.random_bool(0.01) {
        String::new()
      } else {
        format!("key-{}", rng.random_range(0..distinct))
      };
      Record::new(key, rng.random_range(-1_000..10_000))
    })
    .collect()
}

/// The obvious single-threaded group-by, for comparison.
pub fn naive_fold(records: &[Record]) -> BTreeMap<String, i64> {
  let mut totals = BTreeMap::new();
  for record in records.iter().filter(|r| !r.key.is_empty()) {
    let total = totals.entry(record.key.clone()).or_insert(0i64);
    *total = total.wrapping_add(record.value);
  }
  totals
}

pub fn to_map(totals: GroupTotals) -> BTreeMap<String, i64> {
  totals.into_iter().collect()
}
