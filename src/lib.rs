//! Modharvest: a session-scoped mod catalog harvester
//!
//! This crate crawls a paginated download catalog: list pages, detail pages,
//! version branches, per-branch file listings, and assembles exactly one record
//! per resource, and ships those records through a shard/merge/import
//! pipeline into a relational store.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod import;
pub mod model;
pub mod output;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Import error: {0}")]
    Import(#[from] import::ImportError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid catalog range: {0}")]
    InvalidRange(String),

    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Failed to read cookies file: {0}")]
    Cookies(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{AggregatedRecord, CrawlTarget, DownloadEntry, VersionBranch};
