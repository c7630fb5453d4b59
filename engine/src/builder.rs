use core::fmt;

use crate::error::BuildError;
use crate::partition::DEFAULT_BLOCK_SIZE;
use crate::pipeline::{Pipeline, Settings, Strategy};
use crate::probe::DEFAULT_CAPACITY;
use crate::sort_merge::{SortMergeReducer, SortOrder, DEFAULT_SEQUENTIAL_CUTOFF};

/// A builder for [`Pipeline`]s.
#[derive(Clone)]
pub struct PipelineBuilder {
  workers: usize,
  block_size: usize,
  strategy: Strategy,
  table_capacity: usize,
  sort_cutoff: usize,
  sort_order: SortOrder,
}

impl fmt::Debug for PipelineBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PipelineBuilder")
      .field("workers", &self.workers)
      .field("block_size", &self.block_size)
      .field("strategy", &self.strategy)
      .field("table_capacity", &self.table_capacity)
      .finish_non_exhaustive()
  }
}

impl Default for PipelineBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineBuilder {
  /// Creates a builder with one worker per logical CPU and the sharded
  /// strategy.
  pub fn new() -> Self {
    Self {
      workers: num_cpus::get().max(1),
      block_size: DEFAULT_BLOCK_SIZE,
      strategy: Strategy::default(),
      table_capacity: DEFAULT_CAPACITY,
      sort_cutoff: DEFAULT_SEQUENTIAL_CUTOFF,
      sort_order: SortOrder::default(),
    }
  }

  /// Sets the number of worker threads. Runs never spawn more workers than
  /// there are blocks.
  pub fn workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  /// Sets the number of records per block.
  pub fn block_size(mut self, block_size: usize) -> Self {
    self.block_size = block_size;
    self
  }

  pub fn strategy(mut self, strategy: Strategy) -> Self {
    self.strategy = strategy;
    self
  }

  /// Sets the starting slot count of every worker table (and of every shard
  /// in the sharded strategy).
  pub fn table_capacity(mut self, capacity: usize) -> Self {
    self.table_capacity = capacity;
    self
  }

  /// Sets the slice length at or below which sort-merge stops recursing and
  /// sorts sequentially. A cutoff of one recurses down to single records.
  pub fn sort_cutoff(mut self, cutoff: usize) -> Self {
    self.sort_cutoff = cutoff;
    self
  }

  pub fn sort_order(mut self, order: SortOrder) -> Self {
    self.sort_order = order;
    self
  }

  /// Applies every setting present in `config` over this builder.
  pub fn config(mut self, config: &PipelineConfig) -> Self {
    if let Some(workers) = config.workers {
      self.workers = workers;
    }
    self.block_size = config.block_size;
    self.strategy = config.strategy;
    self.table_capacity = config.table_capacity;
    self.sort_cutoff = config.sort_cutoff;
    self.sort_order = config.sort_order;
    self
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.workers == 0 {
      return Err(BuildError::ZeroWorkers);
    }
    if self.block_size == 0 {
      return Err(BuildError::ZeroBlockSize);
    }
    if self.table_capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    if self.sort_cutoff == 0 {
      return Err(BuildError::ZeroSortCutoff);
    }
    Ok(())
  }

  pub(crate) fn settings(&self) -> Settings {
    Settings {
      workers: self.workers.max(1),
      block_size: self.block_size.max(1),
      strategy: self.strategy,
      table_capacity: self.table_capacity.max(1),
      reducer: SortMergeReducer::new(self.sort_cutoff, self.sort_order),
    }
  }

  /// Validates the settings and builds the pipeline.
  pub fn build(self) -> Result<Pipeline, BuildError> {
    self.validate()?;
    Ok(Pipeline::from_settings(self.settings()))
  }
}

/// Pipeline settings as they appear in a configuration file.
///
/// Every field is optional in serialized form. A missing `workers` means one
/// per logical CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PipelineConfig {
  pub workers: Option<usize>,
  pub block_size: usize,
  pub strategy: Strategy,
  pub table_capacity: usize,
  pub sort_cutoff: usize,
  pub sort_order: SortOrder,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      workers: None,
      block_size: DEFAULT_BLOCK_SIZE,
      strategy: Strategy::default(),
      table_capacity: DEFAULT_CAPACITY,
      sort_cutoff: DEFAULT_SEQUENTIAL_CUTOFF,
      sort_order: SortOrder::default(),
    }
  }
}

impl PipelineConfig {
  /// Validates the configuration and builds the pipeline it describes.
  pub fn build(&self) -> Result<Pipeline, BuildError> {
    PipelineBuilder::new().config(self).build()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let pipeline = PipelineBuilder::new().build().unwrap();
    assert_eq!(pipeline.strategy(), Strategy::Sharded);
    assert_eq!(pipeline.block_size(), DEFAULT_BLOCK_SIZE);
    assert_eq!(pipeline.workers(), num_cpus::get().max(1));
  }

  #[test]
  fn test_zero_settings_are_rejected() {
    assert_eq!(
      PipelineBuilder::new().workers(0).build().unwrap_err(),
      BuildError::ZeroWorkers
    );
    assert_eq!(
      PipelineBuilder::new().block_size(0).build().unwrap_err(),
      BuildError::ZeroBlockSize
    );
    assert_eq!(
      PipelineBuilder::new().table_capacity(0).build().unwrap_err(),
      BuildError::ZeroCapacity
    );
    assert_eq!(
      PipelineBuilder::new().sort_cutoff(0).build().unwrap_err(),
      BuildError::ZeroSortCutoff
    );
  }

  #[test]
  fn test_config_overrides_builder() {
    let config = PipelineConfig {
      workers: Some(3),
      strategy: Strategy::GlobalLocal,
      ..PipelineConfig::default()
    };
    let pipeline = config.build().unwrap();
    assert_eq!(pipeline.workers(), 3);
    assert_eq!(pipeline.strategy(), Strategy::GlobalLocal);
  }
}
