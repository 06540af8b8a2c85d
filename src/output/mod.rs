//! Output stage: per-catalog shard files and partition merging
//!
//! The orchestrator hands each assembled record to the [`ShardWriter`], which
//! owns one partition file per catalog. Overlapping partition files from
//! separate page-range runs are combined by [`merge_partitions`].

mod merge;
mod shard;

pub use merge::{find_partitions, merge_partitions, partition_start, MergeReport};
pub use shard::{slugify, PartitionSummary, ShardWriter};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No partition files matched: {0}")]
    NoInputs(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
