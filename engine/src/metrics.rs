use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// Cumulative counters across every run of one pipeline.
/// All fields are atomic so clones of the pipeline can run concurrently.
#[derive(Debug)]
pub struct Metrics {
  pub(crate) runs: CachePadded<AtomicU64>,
  pub(crate) records: CachePadded<AtomicU64>,
  pub(crate) skipped: CachePadded<AtomicU64>,
  pub(crate) blocks: CachePadded<AtomicU64>,

  // --- Merge phase ---
  pub(crate) contended_writes: CachePadded<AtomicU64>,
  pub(crate) partials_merged: CachePadded<AtomicU64>,

  pub(crate) busy_micros: CachePadded<AtomicU64>,
  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      runs: CachePadded::new(AtomicU64::new(0)),
      records: CachePadded::new(AtomicU64::new(0)),
      skipped: CachePadded::new(AtomicU64::new(0)),
      blocks: CachePadded::new(AtomicU64::new(0)),
      contended_writes: CachePadded::new(AtomicU64::new(0)),
      partials_merged: CachePadded::new(AtomicU64::new(0)),
      busy_micros: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_run(&self, stats: &crate::pipeline::RunStats) {
    self.runs.fetch_add(1, Ordering::Relaxed);
    self.records.fetch_add(stats.records as u64, Ordering::Relaxed);
    self.skipped.fetch_add(stats.skipped as u64, Ordering::Relaxed);
    self.blocks.fetch_add(stats.blocks as u64, Ordering::Relaxed);
    self
      .contended_writes
      .fetch_add(stats.contended_writes, Ordering::Relaxed);
    self
      .partials_merged
      .fetch_add(stats.partials_merged as u64, Ordering::Relaxed);
    self.busy_micros.fetch_add(
      u64::try_from(stats.elapsed.as_micros()).unwrap_or(u64::MAX),
      Ordering::Relaxed,
    );
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let records = self.records.load(Ordering::Relaxed);
    let busy_micros = self.busy_micros.load(Ordering::Relaxed);

    MetricsSnapshot {
      runs: self.runs.load(Ordering::Relaxed),
      records,
      skipped: self.skipped.load(Ordering::Relaxed),
      blocks: self.blocks.load(Ordering::Relaxed),
      contended_writes: self.contended_writes.load(Ordering::Relaxed),
      partials_merged: self.partials_merged.load(Ordering::Relaxed),
      records_per_sec: if busy_micros == 0 {
        0.0
      } else {
        records as f64 * 1_000_000.0 / busy_micros as f64
      },
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time snapshot of a pipeline's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Completed runs.
  pub runs: u64,
  /// Records fed into all runs, skipped ones included.
  pub records: u64,
  /// Records dropped for having an empty key.
  pub skipped: u64,
  /// Blocks handed to workers.
  pub blocks: u64,
  /// Writes to a shared table that abstained and were kept locally.
  pub contended_writes: u64,
  /// Worker partial results folded in merge phases.
  pub partials_merged: u64,
  /// Records per second of time spent inside runs.
  pub records_per_sec: f64,
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("runs", &self.runs)
      .field("records", &self.records)
      .field("skipped", &self.skipped)
      .field("blocks", &self.blocks)
      .field("contended_writes", &self.contended_writes)
      .field("partials_merged", &self.partials_merged)
      .field("records_per_sec", &format!("{:.0}", self.records_per_sec))
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
