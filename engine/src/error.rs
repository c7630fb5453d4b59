use thiserror::Error;

/// Errors that can occur when building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The pipeline was configured with zero workers.
  #[error("worker count cannot be zero")]
  ZeroWorkers,
  /// Records cannot be partitioned into empty blocks.
  #[error("block size cannot be zero")]
  ZeroBlockSize,
  /// Tables need at least one slot to start from.
  #[error("initial table capacity cannot be zero")]
  ZeroCapacity,
  /// The sort-merge reducer needs a positive sequential cutoff.
  #[error("sort cutoff cannot be zero")]
  ZeroSortCutoff,
}

/// The main error type for `tally_engine`.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Failed to read records: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid pipeline configuration: {0}")]
  Build(#[from] BuildError),
}

/// A specialized `Result` type for `tally_engine` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
