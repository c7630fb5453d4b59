//! Partitioned group-by-and-sum aggregation: given a stream of keyed integer
//! records, compute the sum of values for every distinct key in parallel.
//!
//! # Features
//! - **Custom tables**: an open-addressing [`ProbeTable`] with linear probing,
//!   tombstones and grow/shrink, a segment-locked [`ContentionAwareTable`] whose
//!   writers abstain instead of blocking, and a 256-way [`ShardedTable`].
//! - **Strategies**: single-table, global+local with fallback, sharded with a
//!   per-shard parallel merge, sort-merge, and hash-partitioned buckets. See
//!   [`Strategy`].
//! - **Observability**: per-run [`RunStats`] and cumulative [`MetricsSnapshot`]s.
//! - **Configuration**: a fluent [`PipelineBuilder`], or a [`PipelineConfig`]
//!   loaded through the optional `serde` feature.

// Public modules that form the API
pub mod builder;
pub mod contention;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod probe;
pub mod record;
pub mod sharded;
pub mod sort_merge;
pub mod totals;

// Re-export the primary user-facing types for convenience
pub use builder::{PipelineBuilder, PipelineConfig};
pub use contention::{Contention, ContentionAwareTable};
pub use error::{BuildError, Error, Result};
pub use hash::{hash_key, shard_of, NUM_SHARDS};
pub use metrics::MetricsSnapshot;
pub use partition::{partition, BlockQueue, DataBlock, Partition, DEFAULT_BLOCK_SIZE};
pub use pipeline::{Aggregation, Pipeline, RunStats, Strategy};
pub use probe::ProbeTable;
pub use record::{read_records, FieldMapping, FnSink, LineSource, Record, Sink};
pub use sharded::ShardedTable;
pub use sort_merge::{SortMergeReducer, SortOrder};
pub use totals::GroupTotals;
