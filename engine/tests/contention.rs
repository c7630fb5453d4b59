use std::collections::BTreeMap;
use std::sync::Barrier;
use std::thread;

use pretty_assertions::assert_eq;
use tally_engine::{ContentionAwareTable, ProbeTable};

mod common;

// Several writers hammer a handful of keys through the shared table,
// keeping abstained writes in a local table, then fold the locals in.
#[test]
fn test_contended_writes_are_never_lost() {
  const WRITERS: usize = 8;
  const PER_WRITER: usize = 5_000;

  let records = common::random_records(42, WRITERS * PER_WRITER, 6);
  let expected = common::naive_fold(&records);

  let mut global = ContentionAwareTable::with_capacity(4);
  let barrier = Barrier::new(WRITERS);
  let locals: Vec<ProbeTable> = thread::scope(|s| {
    let handles: Vec<_> = records
      .chunks(PER_WRITER)
      .map(|chunk| {
        let global = &global;
        let barrier = &barrier;
        s.spawn(move || {
          let mut local = ProbeTable::new();
          barrier.wait();
          for record in chunk {
            if local.contains_key(&record.key) || global.add(&record.key, record.value).is_contended() {
              local.add(&record.key, record.value);
            }
          }
          local
        })
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  for local in locals {
    global.absorb(local);
  }
  let actual: BTreeMap<String, i64> = global.into_inner().into_iter().collect();
  assert_eq!(actual, expected);
}

#[test]
fn test_concurrent_distinct_keys_survive_resizes() {
  let table = ContentionAwareTable::with_capacity(1);
  let retained: Vec<Vec<(String, i64)>> = thread::scope(|s| {
    let handles: Vec<_> = (0..4)
      .map(|t| {
        let table = &table;
        s.spawn(move || {
          let mut retained = Vec::new();
          for i in 0..500 {
            let key = format!("t{t}-{i}");
            if table.put(&key, i).is_contended() {
              retained.push((key, i));
            }
          }
          retained
        })
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  let retained: usize = retained.iter().map(Vec::len).sum();
  assert_eq!(table.len() + retained, 2_000);
  assert!(table.capacity() >= table.len());
}
