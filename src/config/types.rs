use crate::model::CrawlTarget;
use crate::ConfigError;
use serde::Deserialize;

/// Main configuration structure for modharvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub output: OutputConfig,
}

/// Harvest scope configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Base URL of the catalog site (e.g. "https://bbs.eyeuc.com")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Explicit catalog ids to crawl
    #[serde(rename = "catalog-ids", default)]
    pub catalog_ids: Vec<u32>,

    /// Inclusive catalog id range, "start-end"
    #[serde(rename = "catalog-range", default)]
    pub catalog_range: Option<String>,

    /// Inclusive list-page range, "start-end". When set, only those pages
    /// are crawled and output files carry the partition segment.
    #[serde(rename = "page-range", default)]
    pub page_range: Option<String>,

    /// Maximum number of fetches in flight per catalog
    #[serde(rename = "max-concurrent-fetches", default = "default_concurrency")]
    pub max_concurrent_fetches: u32,
}

/// Fetch service configuration: timeout, retry, and pacing policy
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(rename = "retry-max", default = "default_retry_max")]
    pub retry_max: u32,

    /// Delay between retry attempts in milliseconds
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Pacing delay before each request in milliseconds
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_max: default_retry_max(),
            retry_delay_ms: default_retry_delay_ms(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Session credential configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Path to a JSON file of pre-obtained cookies
    /// (array of `{name, value, domain}` objects)
    #[serde(rename = "cookies-file", default)]
    pub cookies_file: Option<String>,
}

/// Serialization mode for shard output files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardFormat {
    /// One record per line, no inter-record separators
    Jsonl,
    /// Comma-separated, bracket-wrapped array; needs a finalize step
    Json,
}

impl ShardFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving per-catalog partition files
    #[serde(rename = "directory")]
    pub directory: String,

    /// Shard serialization mode
    #[serde(default = "default_format")]
    pub format: ShardFormat,

    /// File name prefix for partition files
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_concurrency() -> u32 {
    12
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_max() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_delay_ms() -> u64 {
    300
}

fn default_format() -> ShardFormat {
    ShardFormat::Jsonl
}

fn default_prefix() -> String {
    "catalog".to_string()
}

/// Parses an inclusive "start-end" range string
pub fn parse_range(raw: &str) -> Result<(u32, u32), ConfigError> {
    let trimmed = raw.trim();
    let (start, end) = trimmed
        .split_once('-')
        .ok_or_else(|| ConfigError::InvalidRange(raw.to_string()))?;

    let start: u32 = start
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidRange(raw.to_string()))?;
    let end: u32 = end
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidRange(raw.to_string()))?;

    if start == 0 || end < start {
        return Err(ConfigError::InvalidRange(raw.to_string()));
    }

    Ok((start, end))
}

impl HarvestConfig {
    /// Merges `catalog-ids` and `catalog-range` into the final target list:
    /// deduplicated and sorted ascending.
    pub fn targets(&self) -> Result<Vec<CrawlTarget>, ConfigError> {
        let mut ids: Vec<u32> = self.catalog_ids.clone();

        if let Some(range) = &self.catalog_range {
            let (start, end) = parse_range(range)?;
            ids.extend(start..=end);
        }

        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            return Err(ConfigError::Missing(
                "harvest.catalog-ids or harvest.catalog-range".to_string(),
            ));
        }

        Ok(ids.into_iter().map(CrawlTarget::new).collect())
    }

    /// Resolved inclusive page range, if one was configured
    pub fn pages(&self) -> Result<Option<(u32, u32)>, ConfigError> {
        self.page_range.as_deref().map(parse_range).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvest_config(ids: Vec<u32>, range: Option<&str>) -> HarvestConfig {
        HarvestConfig {
            base_url: "https://bbs.example.com".to_string(),
            catalog_ids: ids,
            catalog_range: range.map(|s| s.to_string()),
            page_range: None,
            max_concurrent_fetches: 12,
        }
    }

    #[test]
    fn test_parse_range_valid() {
        assert_eq!(parse_range("180-185").unwrap(), (180, 185));
        assert_eq!(parse_range(" 3-3 ").unwrap(), (3, 3));
    }

    #[test]
    fn test_parse_range_invalid() {
        assert!(parse_range("185-180").is_err());
        assert!(parse_range("abc").is_err());
        assert!(parse_range("1..5").is_err());
        assert!(parse_range("0-5").is_err());
    }

    #[test]
    fn test_targets_merge_dedup_sort() {
        let config = harvest_config(vec![183, 181, 183], Some("180-182"));
        let targets = config.targets().unwrap();
        let ids: Vec<u32> = targets.iter().map(|t| t.catalog_id).collect();
        assert_eq!(ids, vec![180, 181, 182, 183]);
    }

    #[test]
    fn test_targets_empty_is_error() {
        let config = harvest_config(vec![], None);
        assert!(matches!(config.targets(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_shard_format_extension() {
        assert_eq!(ShardFormat::Jsonl.extension(), "jsonl");
        assert_eq!(ShardFormat::Json.extension(), "json");
    }
}
