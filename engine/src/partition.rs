//! Splitting input into fixed-size blocks and handing each block to exactly
//! one worker.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::record::Record;

/// Records per block when nothing else is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 24;

/// An ordered window over the input, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
  index: usize,
  records: Vec<Record>,
}

impl DataBlock {
  /// Position of this block in its partition.
  pub fn index(&self) -> usize {
    self.index
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn records(&self) -> &[Record] {
    &self.records
  }

  /// Consumes the block, yielding its records in input order.
  pub fn into_records(self) -> Vec<Record> {
    self.records
  }
}

impl IntoIterator for DataBlock {
  type Item = Record;
  type IntoIter = std::vec::IntoIter<Record>;

  fn into_iter(self) -> Self::IntoIter {
    self.records.into_iter()
  }
}

/// The ordered sequence of blocks covering an input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
  blocks: Vec<DataBlock>,
}

/// Splits `records` into blocks of `block_size` (the last one may be shorter).
///
/// A `block_size` of zero is treated as one.
pub fn partition<I>(records: I, block_size: usize) -> Partition
where
  I: IntoIterator<Item = Record>,
{
  let block_size = block_size.max(1);
  let mut blocks = Vec::new();
  let mut current = Vec::with_capacity(block_size);

  for record in records {
    current.push(record);
    if current.len() == block_size {
      let index = blocks.len();
      let records = std::mem::replace(&mut current, Vec::with_capacity(block_size));
      blocks.push(DataBlock { index, records });
    }
  }
  if !current.is_empty() {
    let index = blocks.len();
    blocks.push(DataBlock {
      index,
      records: current,
    });
  }

  Partition { blocks }
}

impl Partition {
  /// Number of blocks.
  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Number of records across all blocks.
  pub fn record_count(&self) -> usize {
    self.blocks.iter().map(DataBlock::len).sum()
  }

  pub fn blocks(&self) -> &[DataBlock] {
    &self.blocks
  }

  pub fn into_blocks(self) -> Vec<DataBlock> {
    self.blocks
  }

  /// Turns the partition into a queue workers can pull blocks from.
  pub fn into_queue(self) -> BlockQueue {
    BlockQueue::new(self.blocks)
  }
}

/// Hands out the blocks of a partition, each to exactly one caller.
///
/// Blocks are claimed in increasing index order, so any one worker sees its
/// blocks in input order.
#[derive(Debug)]
pub struct BlockQueue {
  cells: Box<[Mutex<Option<DataBlock>>]>,
  next: AtomicUsize,
}

impl BlockQueue {
  fn new(blocks: Vec<DataBlock>) -> Self {
    Self {
      cells: blocks.into_iter().map(|b| Mutex::new(Some(b))).collect(),
      next: AtomicUsize::new(0),
    }
  }

  /// Claims the next unconsumed block.
  pub fn take(&self) -> Option<DataBlock> {
    let index = self.next.fetch_add(1, Ordering::Relaxed);
    self.cells.get(index)?.lock().take()
  }

  /// Total number of blocks this queue started with.
  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn records(n: usize) -> Vec<Record> {
    (0..n).map(|i| Record::new(format!("k{i}"), i as i64)).collect()
  }

  #[test]
  fn test_last_block_may_be_shorter() {
    let partition = partition(records(50), 24);
    let sizes: Vec<usize> = partition.blocks().iter().map(DataBlock::len).collect();
    assert_eq!(sizes, vec![24, 24, 2]);
    assert_eq!(partition.record_count(), 50);
  }

  #[test]
  fn test_blocks_preserve_input_order() {
    let input = records(10);
    let flattened: Vec<Record> = partition(input.clone(), 3)
      .into_blocks()
      .into_iter()
      .flatten()
      .collect();
    assert_eq!(flattened, input);
  }

  #[test]
  fn test_empty_input_has_no_blocks() {
    assert!(partition(Vec::new(), 24).is_empty());
  }

  #[test]
  fn test_zero_block_size_is_one() {
    assert_eq!(partition(records(3), 0).len(), 3);
  }

  #[test]
  fn test_queue_hands_out_each_block_once() {
    let queue = partition(records(10), 2).into_queue();
    let mut seen = Vec::new();
    while let Some(block) = queue.take() {
      seen.push(block.index());
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert!(queue.take().is_none());
  }

  #[test]
  fn test_queue_under_concurrent_workers() {
    let queue = partition(records(1000), 7).into_queue();
    let total = AtomicUsize::new(0);
    std::thread::scope(|s| {
      for _ in 0..8 {
        s.spawn(|| {
          while let Some(block) = queue.take() {
            total.fetch_add(block.len(), Ordering::Relaxed);
          }
        });
      }
    });
    assert_eq!(total.load(Ordering::Relaxed), 1000);
  }
}
