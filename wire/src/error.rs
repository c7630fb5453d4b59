use tally_engine::BuildError;
use thiserror::Error;

/// The main error type for `tally_wire`.
#[derive(Debug, Error)]
pub enum WireError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Aggregation failed: {0}")]
  Engine(#[from] tally_engine::Error),

  #[error("Invalid configuration: {0}")]
  Config(#[from] serde_yaml::Error),

  #[error("Background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl From<BuildError> for WireError {
  fn from(e: BuildError) -> Self {
    WireError::Engine(e.into())
  }
}

/// A specialized `Result` type for `tally_wire` operations.
pub type Result<T, E = WireError> = std::result::Result<T, E>;
