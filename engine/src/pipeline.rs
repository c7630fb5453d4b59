use std::fmt;
use std::io::BufRead;
use std::panic;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::builder::PipelineBuilder;
use crate::contention::ContentionAwareTable;
use crate::error::Result;
use crate::hash::{bucket_index, hash_key};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::partition::{partition, BlockQueue};
use crate::probe::ProbeTable;
use crate::record::{FieldMapping, LineSource, Record, Sink};
use crate::sharded::ShardedTable;
use crate::sort_merge::SortMergeReducer;
use crate::totals::GroupTotals;

/// How a pipeline spreads records over workers and merges what they produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Strategy {
  /// One thread folds everything into one table. The reference result.
  Sequential,
  /// Every worker fills its own [`ProbeTable`]; the tables are folded into
  /// the first one after all workers finish.
  SingleTable,
  /// Workers write into one shared [`ContentionAwareTable`] and fall back to
  /// a local table when a slot is contended.
  GlobalLocal,
  /// Every worker fills its own [`ShardedTable`]; the merge runs one task
  /// per shard.
  #[default]
  Sharded,
  /// Every worker sorts its records; the sorted runs are merged and summed
  /// run by run.
  SortMerge,
  /// Workers first scatter records into one bucket per worker by key hash,
  /// then each worker aggregates one bucket. Buckets never share a key, so
  /// their tables are concatenated without a merge.
  Partitioned,
}

impl Strategy {
  pub const ALL: [Strategy; 6] = [
    Strategy::Sequential,
    Strategy::SingleTable,
    Strategy::GlobalLocal,
    Strategy::Sharded,
    Strategy::SortMerge,
    Strategy::Partitioned,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Strategy::Sequential => "sequential",
      Strategy::SingleTable => "single_table",
      Strategy::GlobalLocal => "global_local",
      Strategy::Sharded => "sharded",
      Strategy::SortMerge => "sort_merge",
      Strategy::Partitioned => "partitioned",
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// What happened during one [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
  pub strategy: Strategy,
  /// Records fed in, skipped ones included.
  pub records: usize,
  /// Records dropped for having an empty key.
  pub skipped: usize,
  pub blocks: usize,
  /// Worker threads actually spawned.
  pub workers: usize,
  /// Writes to the shared table that abstained and were kept locally.
  pub contended_writes: u64,
  /// Partial results folded during the merge phase.
  pub partials_merged: usize,
  pub elapsed: Duration,
}

/// The outcome of one run: the totals and how they were produced.
#[derive(Debug, Clone)]
pub struct Aggregation {
  pub totals: GroupTotals,
  pub stats: RunStats,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
  pub(crate) workers: usize,
  pub(crate) block_size: usize,
  pub(crate) strategy: Strategy,
  pub(crate) table_capacity: usize,
  pub(crate) reducer: SortMergeReducer,
}

// Per-strategy results the caller folds into `RunStats`.
#[derive(Default)]
struct MergeOutcome {
  skipped: usize,
  contended_writes: u64,
  partials_merged: usize,
}

/// A configured group-by-and-sum aggregation.
///
/// Cloning is cheap; clones share one set of [`Metrics`].
#[derive(Clone)]
pub struct Pipeline {
  settings: Settings,
  metrics: Arc<Metrics>,
}

impl fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("strategy", &self.settings.strategy)
      .field("workers", &self.settings.workers)
      .field("block_size", &self.settings.block_size)
      .finish_non_exhaustive()
  }
}

impl Default for Pipeline {
  fn default() -> Self {
    Self::from_settings(PipelineBuilder::new().settings())
  }
}

impl Pipeline {
  pub fn builder() -> PipelineBuilder {
    PipelineBuilder::new()
  }

  pub(crate) fn from_settings(settings: Settings) -> Self {
    Self {
      settings,
      metrics: Arc::new(Metrics::new()),
    }
  }

  pub fn strategy(&self) -> Strategy {
    self.settings.strategy
  }

  pub fn workers(&self) -> usize {
    self.settings.workers
  }

  pub fn block_size(&self) -> usize {
    self.settings.block_size
  }

  /// Returns a copy of this pipeline using `strategy`, sharing its metrics.
  pub fn with_strategy(&self, strategy: Strategy) -> Self {
    let mut pipeline = self.clone();
    pipeline.settings.strategy = strategy;
    pipeline
  }

  /// Cumulative metrics over every run of this pipeline and its clones.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }

  /// Partitions `records`, aggregates them with the configured strategy and
  /// returns the per-key totals.
  ///
  /// Panics raised inside a worker are resumed on the calling thread.
  pub fn run<I>(&self, records: I) -> Aggregation
  where
    I: IntoIterator<Item = Record>,
  {
    let started = Instant::now();
    let Settings {
      workers,
      block_size,
      strategy,
      ..
    } = self.settings;

    let partition = partition(records, block_size);
    let record_count = partition.record_count();
    let blocks = partition.len();
    let workers = match strategy {
      Strategy::Sequential => 1,
      _ => workers.min(blocks).max(1),
    };
    debug!(%strategy, records = record_count, blocks, workers, "starting aggregation");

    let queue = partition.into_queue();
    let (totals, outcome) = match strategy {
      Strategy::Sequential => self.sequential(&queue),
      Strategy::SingleTable => self.single_table(&queue, workers),
      Strategy::GlobalLocal => self.global_local(&queue, workers),
      Strategy::Sharded => self.sharded(&queue, workers),
      Strategy::SortMerge => self.sort_merge(&queue, workers),
      Strategy::Partitioned => self.partitioned(&queue, workers),
    };

    let stats = RunStats {
      strategy,
      records: record_count,
      skipped: outcome.skipped,
      blocks,
      workers,
      contended_writes: outcome.contended_writes,
      partials_merged: outcome.partials_merged,
      elapsed: started.elapsed(),
    };
    self.metrics.record_run(&stats);
    debug!(
      %strategy,
      groups = totals.len(),
      skipped = stats.skipped,
      contended_writes = stats.contended_writes,
      elapsed_us = stats.elapsed.as_micros() as u64,
      "aggregation finished"
    );

    Aggregation { totals, stats }
  }

  /// Runs the aggregation and hands every `(key, total)` pair to `sink`.
  pub fn run_into<I, S>(&self, records: I, sink: &mut S) -> RunStats
  where
    I: IntoIterator<Item = Record>,
    S: Sink + ?Sized,
  {
    let Aggregation { totals, stats } = self.run(records);
    totals.deliver(sink);
    stats
  }

  /// Reads every record from `reader` and aggregates them.
  ///
  /// The whole input is read before any worker starts; a read failure
  /// aborts the run.
  pub fn run_reader<R: BufRead>(&self, reader: R, mapping: FieldMapping) -> Result<Aggregation> {
    let records = LineSource::new(reader, mapping).collect::<Result<Vec<_>>>()?;
    Ok(self.run(records))
  }

  /// Reads every record from the file at `path` and aggregates them.
  pub fn run_file(&self, path: impl AsRef<Path>, mapping: FieldMapping) -> Result<Aggregation> {
    let records = LineSource::open(path, mapping)?.collect::<Result<Vec<_>>>()?;
    Ok(self.run(records))
  }

  fn sequential(&self, queue: &BlockQueue) -> (GroupTotals, MergeOutcome) {
    let mut table = ProbeTable::with_capacity(self.settings.table_capacity);
    let skipped = drain(queue, |record| {
      table.add(&record.key, record.value);
    });
    let outcome = MergeOutcome {
      skipped,
      ..MergeOutcome::default()
    };
    (GroupTotals::from(table), outcome)
  }

  fn single_table(&self, queue: &BlockQueue, workers: usize) -> (GroupTotals, MergeOutcome) {
    let capacity = self.settings.table_capacity;
    let partials = run_workers(workers, |_| {
      let mut table = ProbeTable::with_capacity(capacity);
      let skipped = drain(queue, |record| {
        table.add(&record.key, record.value);
      });
      (table, skipped)
    });

    let mut outcome = MergeOutcome {
      partials_merged: partials.len(),
      ..MergeOutcome::default()
    };
    let mut merged: Option<ProbeTable> = None;
    for (table, skipped) in partials {
      outcome.skipped += skipped;
      match merged.as_mut() {
        Some(acc) => acc.absorb(table),
        None => merged = Some(table),
      }
    }
    (GroupTotals::from(merged.unwrap_or_default()), outcome)
  }

  fn global_local(&self, queue: &BlockQueue, workers: usize) -> (GroupTotals, MergeOutcome) {
    let global = ContentionAwareTable::with_capacity(self.settings.table_capacity);
    self.global_local_with(global, queue, workers)
  }

  fn global_local_with(
    &self,
    mut global: ContentionAwareTable,
    queue: &BlockQueue,
    workers: usize,
  ) -> (GroupTotals, MergeOutcome) {
    let capacity = self.settings.table_capacity;
    let shared = &global;
    let partials = run_workers(workers, |worker| {
      let mut local = ProbeTable::with_capacity(capacity);
      let skipped = drain(queue, |record| {
        // A key that already spilled into the local table stays there.
        if local.contains_key(&record.key) || shared.add(&record.key, record.value).is_contended() {
          local.add(&record.key, record.value);
        }
      });
      trace!(worker, retained = local.len(), "worker finished");
      (local, skipped)
    });

    let mut outcome = MergeOutcome {
      contended_writes: global.contended_writes(),
      ..MergeOutcome::default()
    };
    for (local, skipped) in partials {
      outcome.skipped += skipped;
      if !local.is_empty() {
        outcome.partials_merged += 1;
        global.absorb(local);
      }
    }
    (GroupTotals::from(global.into_inner()), outcome)
  }

  fn sharded(&self, queue: &BlockQueue, workers: usize) -> (GroupTotals, MergeOutcome) {
    let capacity = self.settings.table_capacity;
    let partials = run_workers(workers, |_| {
      let mut table = ShardedTable::with_shard_capacity(capacity);
      let skipped = drain(queue, |record| {
        table.add(&record.key, record.value);
      });
      (table, skipped)
    });

    let mut outcome = MergeOutcome {
      partials_merged: partials.len(),
      ..MergeOutcome::default()
    };
    let tables: Vec<ShardedTable> = partials
      .into_iter()
      .map(|(table, skipped)| {
        outcome.skipped += skipped;
        table
      })
      .collect();
    (GroupTotals::from(ShardedTable::merge(tables)), outcome)
  }

  fn sort_merge(&self, queue: &BlockQueue, workers: usize) -> (GroupTotals, MergeOutcome) {
    let reducer = self.settings.reducer;
    let partials = run_workers(workers, |_| {
      let mut run = Vec::new();
      let skipped = drain(queue, |record| run.push(record));
      (reducer.sort(run), skipped)
    });

    let mut outcome = MergeOutcome {
      partials_merged: partials.len(),
      ..MergeOutcome::default()
    };
    let runs: Vec<Vec<Record>> = partials
      .into_iter()
      .map(|(run, skipped)| {
        outcome.skipped += skipped;
        run
      })
      .collect();
    let totals = reducer.reduce(reducer.merge_runs(runs));
    (GroupTotals::from(totals), outcome)
  }

  fn partitioned(&self, queue: &BlockQueue, workers: usize) -> (GroupTotals, MergeOutcome) {
    let capacity = self.settings.table_capacity;
    let scattered = run_workers(workers, |_| {
      let mut buckets: Vec<Vec<Record>> = (0..workers).map(|_| Vec::new()).collect();
      let skipped = drain(queue, |record| {
        buckets[bucket_index(hash_key(&record.key), workers)].push(record);
      });
      (buckets, skipped)
    });

    // Worker `bucket` reads its bucket out of every scatter result.
    let tables = run_workers(workers, |bucket| {
      let mut table = ProbeTable::with_capacity(capacity);
      for (buckets, _) in &scattered {
        for record in &buckets[bucket] {
          table.add(&record.key, record.value);
        }
      }
      trace!(bucket, groups = table.len(), "bucket aggregated");
      table
    });

    let outcome = MergeOutcome {
      skipped: scattered.iter().map(|(_, skipped)| skipped).sum(),
      ..MergeOutcome::default()
    };
    let pairs: Vec<(String, i64)> = tables.into_iter().flatten().collect();
    (GroupTotals::from(pairs), outcome)
  }
}

/// Feeds every record of every block this caller claims to `f`, returning
/// how many empty-key records were skipped.
fn drain<F>(queue: &BlockQueue, mut f: F) -> usize
where
  F: FnMut(Record),
{
  let mut skipped = 0;
  while let Some(block) = queue.take() {
    for record in block {
      if record.key.is_empty() {
        skipped += 1;
        continue;
      }
      f(record);
    }
  }
  skipped
}

/// Runs `work` on `workers` scoped threads and collects their results in
/// worker order once all of them have finished.
fn run_workers<T, F>(workers: usize, work: F) -> Vec<T>
where
  T: Send,
  F: Fn(usize) -> T + Sync,
{
  thread::scope(|scope| {
    let work = &work;
    let handles: Vec<_> = (0..workers)
      .map(|worker| scope.spawn(move || work(worker)))
      .collect();
    handles
      .into_iter()
      .map(|handle| match handle.join() {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
      })
      .collect()
  })
}
