//! Per-catalog shard writer
//!
//! One output file per catalog, created lazily on that catalog's first record
//! and held open for the whole run. Two serialization modes: line-delimited
//! (one record per line) and array-delimited (comma-separated inside
//! brackets, closed by `finalize`). Every record is flushed as soon as it is
//! written, since records cost four fetches each and must survive a crash.

use crate::config::{OutputConfig, ShardFormat};
use crate::model::AggregatedRecord;
use crate::output::OutputResult;
use chrono::Local;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

/// Closing stats for one partition file
#[derive(Debug, Clone)]
pub struct PartitionSummary {
    pub catalog_id: u32,
    pub catalog_name: String,
    pub records: u64,
    pub bytes: u64,
    pub path: PathBuf,
}

struct Partition {
    file: File,
    path: PathBuf,
    catalog_name: String,
    records: u64,
}

/// Appends assembled records to the partition owned by their catalog id
pub struct ShardWriter {
    directory: PathBuf,
    format: ShardFormat,
    prefix: String,
    page_range: Option<(u32, u32)>,
    timestamp: String,
    partitions: HashMap<u32, Partition>,
}

impl ShardWriter {
    /// Creates a writer rooted at the configured output directory.
    /// `page_range` is embedded in file names when this run covers an
    /// explicit page slice (the merger sorts on that segment later).
    pub fn new(config: &OutputConfig, page_range: Option<(u32, u32)>) -> OutputResult<Self> {
        let directory = PathBuf::from(&config.directory);
        fs::create_dir_all(&directory)?;

        Ok(Self {
            directory,
            format: config.format,
            prefix: config.prefix.clone(),
            page_range,
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            partitions: HashMap::new(),
        })
    }

    /// Appends one record to its catalog's partition, creating the partition
    /// on first write. Flushes before returning.
    pub fn append(&mut self, record: &AggregatedRecord) -> OutputResult<()> {
        if !self.partitions.contains_key(&record.catalog_id) {
            let partition = self.open_partition(record.catalog_id, &record.catalog_name)?;
            self.partitions.insert(record.catalog_id, partition);
        }

        // Safe: inserted above
        let partition = self
            .partitions
            .get_mut(&record.catalog_id)
            .ok_or_else(|| std::io::Error::other("partition vanished"))?;

        match self.format {
            ShardFormat::Jsonl => {
                let line = serde_json::to_string(record)?;
                partition.file.write_all(line.as_bytes())?;
                partition.file.write_all(b"\n")?;
            }
            ShardFormat::Json => {
                if partition.records > 0 {
                    partition.file.write_all(b",\n")?;
                }
                let body = serde_json::to_string_pretty(record)?;
                partition.file.write_all(body.as_bytes())?;
            }
        }

        partition.file.flush()?;
        partition.records += 1;
        Ok(())
    }

    fn open_partition(&self, catalog_id: u32, catalog_name: &str) -> OutputResult<Partition> {
        let path = self.directory.join(partition_file_name(
            &self.prefix,
            catalog_id,
            catalog_name,
            self.page_range,
            &self.timestamp,
            self.format,
        ));

        let mut file = File::create(&path)?;
        if self.format == ShardFormat::Json {
            file.write_all(b"[\n")?;
        }

        tracing::info!("Created partition file: {}", path.display());

        Ok(Partition {
            file,
            path,
            catalog_name: catalog_name.to_string(),
            records: 0,
        })
    }

    /// Closes every partition (writing the array terminator in JSON mode) and
    /// returns per-partition counts for operational visibility.
    pub fn finalize(&mut self) -> OutputResult<Vec<PartitionSummary>> {
        let mut summaries = Vec::new();

        for (catalog_id, mut partition) in self.partitions.drain() {
            if self.format == ShardFormat::Json {
                partition.file.write_all(b"\n]")?;
            }
            partition.file.flush()?;

            let bytes = fs::metadata(&partition.path).map(|m| m.len()).unwrap_or(0);
            summaries.push(PartitionSummary {
                catalog_id,
                catalog_name: partition.catalog_name,
                records: partition.records,
                bytes,
                path: partition.path,
            });
        }

        summaries.sort_by_key(|s| s.catalog_id);

        for summary in &summaries {
            tracing::info!(
                "Partition {} ({}): {} records, {} bytes -> {}",
                summary.catalog_id,
                summary.catalog_name,
                summary.records,
                summary.bytes,
                summary.path.display()
            );
        }

        Ok(summaries)
    }
}

/// Builds the partition file name:
/// `<prefix>_<catalog_id>[_<slug>][_p<start>-<end>]_<timestamp>.<ext>`
fn partition_file_name(
    prefix: &str,
    catalog_id: u32,
    catalog_name: &str,
    page_range: Option<(u32, u32)>,
    timestamp: &str,
    format: ShardFormat,
) -> String {
    let mut name = format!("{}_{}", prefix, catalog_id);

    let slug = slugify(catalog_name);
    if !slug.is_empty() {
        name.push('_');
        name.push_str(&slug);
    }

    if let Some((start, end)) = page_range {
        name.push_str(&format!("_p{}-{}", start, end));
    }

    name.push('_');
    name.push_str(timestamp);
    name.push('.');
    name.push_str(format.extension());
    name
}

/// Turns a catalog display name into a file-name-safe slug
/// (lowercased, spaces to underscores, everything else alphanumeric only,
/// capped at 50 characters)
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    slug.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionBranch;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(catalog_id: u32, resource_id: u64) -> AggregatedRecord {
        AggregatedRecord {
            resource_id: Some(resource_id),
            catalog_id,
            catalog_name: "NBA 2K25".to_string(),
            title: format!("Mod {}", resource_id),
            cover_image: None,
            images: vec![],
            intro_html: String::new(),
            metadata: BTreeMap::new(),
            branches: vec![VersionBranch::synthetic_default(None)],
            detail_url: format!("https://x/down/view/{}", resource_id),
            list_url: format!("https://x/down/list/{}", catalog_id),
        }
    }

    fn config(dir: &TempDir, format: ShardFormat) -> OutputConfig {
        OutputConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            format,
            prefix: "catalog".to_string(),
        }
    }

    #[test]
    fn test_jsonl_one_record_per_line() {
        let dir = TempDir::new().unwrap();
        let mut writer = ShardWriter::new(&config(&dir, ShardFormat::Jsonl), None).unwrap();

        writer.append(&record(182, 1)).unwrap();
        writer.append(&record(182, 2)).unwrap();
        let summaries = writer.finalize().unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].records, 2);

        let content = std::fs::read_to_string(&summaries[0].path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: AggregatedRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.catalog_id, 182);
        }
    }

    #[test]
    fn test_json_array_mode_is_valid_json_after_finalize() {
        let dir = TempDir::new().unwrap();
        let mut writer = ShardWriter::new(&config(&dir, ShardFormat::Json), None).unwrap();

        writer.append(&record(182, 1)).unwrap();
        writer.append(&record(182, 2)).unwrap();
        let summaries = writer.finalize().unwrap();

        let content = std::fs::read_to_string(&summaries[0].path).unwrap();
        let parsed: Vec<AggregatedRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_one_partition_per_catalog() {
        let dir = TempDir::new().unwrap();
        let mut writer = ShardWriter::new(&config(&dir, ShardFormat::Jsonl), None).unwrap();

        writer.append(&record(182, 1)).unwrap();
        writer.append(&record(172, 2)).unwrap();
        writer.append(&record(182, 3)).unwrap();
        let summaries = writer.finalize().unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].catalog_id, 172);
        assert_eq!(summaries[0].records, 1);
        assert_eq!(summaries[1].catalog_id, 182);
        assert_eq!(summaries[1].records, 2);
    }

    #[test]
    fn test_partition_file_name_segments() {
        let name = partition_file_name(
            "catalog",
            182,
            "NBA 2K25",
            Some((1, 5)),
            "20240301_120000",
            ShardFormat::Jsonl,
        );
        assert_eq!(name, "catalog_182_nba_2k25_p1-5_20240301_120000.jsonl");

        let no_range = partition_file_name(
            "catalog",
            182,
            "NBA 2K25",
            None,
            "20240301_120000",
            ShardFormat::Json,
        );
        assert_eq!(no_range, "catalog_182_nba_2k25_20240301_120000.json");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("NBA 2K25"), "nba_2k25");
        assert_eq!(slugify("  Weird / Name! "), "weird__name");
        assert_eq!(slugify("中文名称"), "");
        let long = "a".repeat(80);
        assert_eq!(slugify(&long).len(), 50);
    }
}
