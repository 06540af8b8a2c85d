//! Configuration loading, types, and validation
//!
//! Configuration is a TOML file with kebab-case keys. Loading always
//! validates; a bad config never reaches the orchestrator.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    parse_range, Config, FetchConfig, HarvestConfig, OutputConfig, SessionConfig, ShardFormat,
};
pub use validation::validate;
