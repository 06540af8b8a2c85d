//! Partition merging with resource-level deduplication
//!
//! Overlapping page-range runs of the same catalog produce partition files
//! that share resources. Merging keeps the first occurrence of each resource
//! id and discards later ones, processing files in page order: the order of
//! the `p<start>-<end>` segment in the file name, not insertion or id order.

use crate::model::AggregatedRecord;
use crate::output::{OutputError, OutputResult};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PARTITION_RANGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_p(\d+)-(\d+)_").unwrap());

/// Outcome counters for one merge run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub files: usize,
    pub written: u64,
    pub duplicates: u64,
    pub malformed: u64,
}

/// Extracts the partition's starting page from its file name.
/// Files without a range segment sort first (key 0).
pub fn partition_start(path: &Path) -> u32 {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| PARTITION_RANGE_REGEX.captures(name))
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Finds a catalog's partition files in the output directory
///
/// Matches `<prefix>_<catalog_id>*_p*-*_*`; only ranged partition files are
/// candidates for merging.
pub fn find_partitions(directory: &Path, prefix: &str, catalog_id: u32) -> OutputResult<Vec<PathBuf>> {
    let needle = format!("{}_{}", prefix, catalog_id);
    let mut paths = Vec::new();

    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(&needle) && PARTITION_RANGE_REGEX.is_match(name) {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(OutputError::NoInputs(format!(
            "{}/{}*_p*",
            directory.display(),
            needle
        )));
    }

    Ok(paths)
}

/// Merges partition files into one deduplicated output file
///
/// Inputs are sorted by their embedded page-range start. Deduplication is
/// keyed on `resource_id` with first occurrence winning; degraded records
/// (no resource id) always pass through. Malformed lines are logged and
/// skipped, never fatal.
pub fn merge_partitions(inputs: &[PathBuf], output: &Path) -> OutputResult<MergeReport> {
    if inputs.is_empty() {
        return Err(OutputError::NoInputs("empty input set".to_string()));
    }

    let mut sorted: Vec<&PathBuf> = inputs.iter().collect();
    sorted.sort_by_key(|path| partition_start(path));

    tracing::info!("Merging {} partition files into {}", sorted.len(), output.display());
    for path in &sorted {
        tracing::debug!("  input: {}", path.display());
    }

    let mut seen: HashSet<u64> = HashSet::new();
    let mut report = MergeReport {
        files: sorted.len(),
        ..Default::default()
    };

    let mut out = BufWriter::new(File::create(output)?);

    for path in sorted {
        let reader = BufReader::new(File::open(path)?);

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: AggregatedRecord = match serde_json::from_str(trimmed) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping malformed line in {}: {}", path.display(), e);
                    report.malformed += 1;
                    continue;
                }
            };

            if let Some(resource_id) = record.resource_id {
                if !seen.insert(resource_id) {
                    report.duplicates += 1;
                    continue;
                }
            }

            out.write_all(trimmed.as_bytes())?;
            out.write_all(b"\n")?;
            report.written += 1;
        }
    }

    out.flush()?;

    tracing::info!(
        "Merge complete: {} records written, {} duplicates dropped, {} malformed skipped",
        report.written,
        report.duplicates,
        report.malformed
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionBranch;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record_line(catalog_id: u32, resource_id: Option<u64>, title: &str) -> String {
        let record = AggregatedRecord {
            resource_id,
            catalog_id,
            catalog_name: "NBA 2K25".to_string(),
            title: title.to_string(),
            cover_image: None,
            images: vec![],
            intro_html: String::new(),
            metadata: BTreeMap::new(),
            branches: vec![VersionBranch::synthetic_default(None)],
            detail_url: "https://x/d".to_string(),
            list_url: "https://x/l".to_string(),
        };
        serde_json::to_string(&record).unwrap()
    }

    fn write_partition(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        path
    }

    fn read_titles(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| {
                serde_json::from_str::<AggregatedRecord>(l)
                    .unwrap()
                    .title
            })
            .collect()
    }

    #[test]
    fn test_partition_start_parsing() {
        assert_eq!(
            partition_start(Path::new("catalog_182_nba_2k25_p6-10_20240301_120000.jsonl")),
            6
        );
        assert_eq!(
            partition_start(Path::new("catalog_182_nba_2k25_20240301_120000.jsonl")),
            0
        );
    }

    #[test]
    fn test_merge_dedups_by_resource_id_first_wins() {
        let dir = TempDir::new().unwrap();
        let a = write_partition(
            &dir,
            "catalog_182_p1-5_20240301_100000.jsonl",
            &[
                record_line(182, Some(1), "one-from-a"),
                record_line(182, Some(2), "two"),
            ],
        );
        let b = write_partition(
            &dir,
            "catalog_182_p6-10_20240301_100000.jsonl",
            &[
                record_line(182, Some(1), "one-from-b"),
                record_line(182, Some(3), "three"),
            ],
        );

        let out = dir.path().join("merged.jsonl");
        // Pass inputs in reverse to prove name-embedded ordering wins
        let report = merge_partitions(&[b, a], &out).unwrap();

        assert_eq!(report.written, 3); // 2 + 2 - 1 overlap
        assert_eq!(report.duplicates, 1);
        assert_eq!(read_titles(&out), vec!["one-from-a", "two", "three"]);
    }

    #[test]
    fn test_merge_with_itself_is_identity() {
        let dir = TempDir::new().unwrap();
        let lines = vec![
            record_line(182, Some(1), "one"),
            record_line(182, Some(2), "two"),
        ];
        let a = write_partition(&dir, "catalog_182_p1-5_t.jsonl", &lines);

        let once = dir.path().join("once.jsonl");
        merge_partitions(std::slice::from_ref(&a), &once).unwrap();

        let twice = dir.path().join("twice.jsonl");
        let report = merge_partitions(&[once.clone(), once.clone()], &twice).unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.duplicates, 2);
        assert_eq!(
            std::fs::read_to_string(&once).unwrap(),
            std::fs::read_to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_degraded_records_never_dedup() {
        let dir = TempDir::new().unwrap();
        let a = write_partition(
            &dir,
            "catalog_182_p1-2_t.jsonl",
            &[
                record_line(182, None, "degraded-a"),
                record_line(182, None, "degraded-b"),
            ],
        );

        let out = dir.path().join("merged.jsonl");
        let report = merge_partitions(&[a], &out).unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(report.duplicates, 0);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog_182_p1-2_t.jsonl");
        std::fs::write(
            &path,
            format!("{}\nnot json at all\n\n{}\n", record_line(182, Some(1), "one"), record_line(182, Some(2), "two")),
        )
        .unwrap();

        let out = dir.path().join("merged.jsonl");
        let report = merge_partitions(&[path], &out).unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(report.malformed, 1);
    }

    #[test]
    fn test_find_partitions_only_ranged_files() {
        let dir = TempDir::new().unwrap();
        write_partition(&dir, "catalog_182_p1-5_t.jsonl", &[record_line(182, Some(1), "x")]);
        write_partition(&dir, "catalog_182_t.jsonl", &[record_line(182, Some(2), "y")]);
        write_partition(&dir, "catalog_172_p1-5_t.jsonl", &[record_line(172, Some(3), "z")]);

        let found = find_partitions(dir.path(), "catalog", 182).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].to_string_lossy().contains("catalog_182_p1-5"));

        assert!(matches!(
            find_partitions(dir.path(), "catalog", 999),
            Err(OutputError::NoInputs(_))
        ));
    }
}
