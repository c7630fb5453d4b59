use tally_engine::{shard_of, ShardedTable, NUM_SHARDS};

#[test]
fn test_shard_of_is_independent_of_table_history() {
  let keys: Vec<String> = (0..500).map(|i| format!("user-{i}")).collect();
  let before: Vec<usize> = keys.iter().map(|k| shard_of(k)).collect();

  let mut small = ShardedTable::with_shard_capacity(1);
  let mut large = ShardedTable::with_shard_capacity(1024);
  for (i, key) in keys.iter().enumerate() {
    small.add(key, i as i64);
    large.add(key, i as i64);
  }
  for key in keys.iter().step_by(3) {
    small.remove(key);
  }

  let after: Vec<usize> = keys.iter().map(|k| shard_of(k)).collect();
  assert_eq!(before, after);
  for (key, shard) in keys.iter().zip(&after) {
    assert!(*shard < NUM_SHARDS);
    assert!(large.shard(*shard).is_some_and(|t| t.contains_key(key)));
  }
}

#[test]
fn test_keys_spread_over_many_shards() {
  let mut table = ShardedTable::new();
  for i in 0..10_000 {
    table.add(&format!("k{i}"), 1);
  }
  assert_eq!(table.len(), 10_000);
  assert!(
    table.allocated_shards() > NUM_SHARDS / 2,
    "only {} shards used",
    table.allocated_shards()
  );
}

#[test]
fn test_merge_of_worker_tables() {
  let mut workers: Vec<ShardedTable> = (0..4).map(|_| ShardedTable::with_shard_capacity(2)).collect();
  for i in 0..2_000i64 {
    let worker = (i % 4) as usize;
    workers[worker].add(&format!("k{}", i % 97), i);
  }

  let merged = ShardedTable::merge(workers);
  assert_eq!(merged.len(), 97);
  for k in 0..97i64 {
    let expected: i64 = (0..2_000i64).filter(|i| i % 97 == k).sum();
    assert_eq!(merged.get(&format!("k{k}")), Some(expected));
  }
}
