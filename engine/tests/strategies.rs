use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use tally_engine::{FnSink, Pipeline, SortOrder, Strategy};

mod common;

fn pipeline(strategy: Strategy, workers: usize, block_size: usize) -> Pipeline {
  Pipeline::builder()
    .strategy(strategy)
    .workers(workers)
    .block_size(block_size)
    .table_capacity(4)
    .sort_cutoff(16)
    .build()
    .unwrap()
}

#[test]
fn test_devices_under_every_strategy() {
  for strategy in Strategy::ALL {
    for (workers, block_size) in [(1, 24), (2, 1), (3, 2), (8, 1)] {
      let aggregation = pipeline(strategy, workers, block_size).run(common::devices());
      assert_eq!(aggregation.totals.len(), 2);
      assert_eq!(
        common::to_map(aggregation.totals),
        common::expected_devices(),
        "{strategy} with {workers} workers, block size {block_size}"
      );
    }
  }
}

#[test]
fn test_every_strategy_matches_naive_fold() {
  let records = common::random_records(7, 20_000, 1_500);
  let expected = common::naive_fold(&records);

  for strategy in Strategy::ALL {
    for (workers, block_size) in [(1, 24), (4, 24), (7, 100), (16, 3)] {
      let aggregation = pipeline(strategy, workers, block_size).run(records.clone());
      assert_eq!(aggregation.stats.records, records.len());
      assert_eq!(aggregation.totals.len(), expected.len(), "{strategy}: duplicate groups");
      assert_eq!(
        common::to_map(aggregation.totals),
        expected,
        "{strategy} with {workers} workers, block size {block_size}"
      );
    }
  }
}

#[test]
fn test_sort_merge_agrees_with_hash_strategies() {
  let records = common::random_records(99, 5_000, 40);
  let sharded = pipeline(Strategy::Sharded, 4, 24).run(records.clone()).totals;
  let single = pipeline(Strategy::SingleTable, 4, 24).run(records.clone()).totals;
  let sorted = pipeline(Strategy::SortMerge, 4, 24).run(records).totals;

  let sorted = sorted.into_sorted();
  assert_eq!(sharded.into_sorted(), sorted);
  assert_eq!(single.into_sorted(), sorted);
}

#[test]
fn test_descending_sort_merge_sums_the_same() {
  let records = common::random_records(3, 2_000, 30);
  let descending = Pipeline::builder()
    .strategy(Strategy::SortMerge)
    .workers(3)
    .sort_order(SortOrder::Descending)
    .sort_cutoff(1)
    .build()
    .unwrap()
    .run(records.clone())
    .totals;
  assert_eq!(common::to_map(descending), common::naive_fold(&records));
}

#[test]
fn test_global_local_reports_contention_consistently() {
  let records = common::random_records(11, 50_000, 4);
  let aggregation = pipeline(Strategy::GlobalLocal, 8, 16).run(records.clone());
  let stats = &aggregation.stats;
  assert!(stats.partials_merged <= stats.workers);
  if stats.contended_writes == 0 {
    assert_eq!(stats.partials_merged, 0);
  }
  assert_eq!(common::to_map(aggregation.totals), common::naive_fold(&records));
}

#[test]
fn test_run_into_sink() {
  let mut sorted: BTreeMap<String, i64> = BTreeMap::new();
  let stats = pipeline(Strategy::Sharded, 2, 2).run_into(common::devices(), &mut sorted);
  assert_eq!(sorted, common::expected_devices());
  assert_eq!(stats.blocks, 3);

  let mut calls = 0;
  pipeline(Strategy::SortMerge, 2, 2).run_into(
    common::devices(),
    &mut FnSink(|_key: String, _total: i64| calls += 1),
  );
  assert_eq!(calls, 2);
}

#[test]
fn test_run_reader_with_header() {
  let input = "id,brand,os,popularity\n1,a,android,10\n2,b,ios,20\n3,c,android,5\n4,d,ios,7\n5,e,android,3\n";
  let mapping = tally_engine::FieldMapping::new(2, 3).skip_header(true);
  let aggregation = pipeline(Strategy::GlobalLocal, 2, 2)
    .run_reader(std::io::Cursor::new(input), mapping)
    .unwrap();
  assert_eq!(common::to_map(aggregation.totals), common::expected_devices());
}

#[test]
fn test_metrics_are_cumulative() {
  let pipeline = pipeline(Strategy::Sharded, 2, 2);
  let mut input = common::devices();
  input.push(tally_engine::Record::new("", 1));
  pipeline.run(input.clone());
  pipeline.with_strategy(Strategy::SingleTable).run(input);

  let metrics = pipeline.metrics();
  assert_eq!(metrics.runs, 2);
  assert_eq!(metrics.records, 12);
  assert_eq!(metrics.skipped, 2);
  assert_eq!(metrics.blocks, 6);
}
