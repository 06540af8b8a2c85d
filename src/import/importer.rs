//! Idempotent importer: merged partitions into the relational store
//!
//! Re-importing a record refreshes its fields but never duplicates a row or
//! trips a constraint. Parent and branch rows upsert on their natural keys;
//! download rows (which have none) are replaced per branch inside the same
//! savepoint. Batches commit every `batch_size` records, and a poison record
//! rolls back only its own savepoint; the batch continues without it.

use crate::import::{ImportError, ImportOptions};
use crate::import::schema::{initialize_schema, TABLES_CHILD_FIRST};
use crate::model::{AggregatedRecord, DownloadEntry, VersionBranch};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Counters for one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub files: usize,
    pub imported: u64,

    /// Records without a resource id (degraded) - not importable
    pub skipped: u64,

    /// Records rolled back after a per-record failure
    pub failed: u64,
}

impl ImportReport {
    fn absorb(&mut self, other: &ImportReport) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// SQLite-backed record importer
pub struct Importer {
    conn: Connection,
}

impl Importer {
    /// Opens (or creates) the import database and ensures the schema
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Deletes every row from every table. Destructive; only runs when the
    /// operator explicitly asked for full-replace mode.
    pub fn full_replace(&mut self) -> Result<(), ImportError> {
        tracing::warn!("Full-replace mode: deleting all existing rows");
        let tx = self.conn.transaction()?;
        for table in TABLES_CHILD_FIRST {
            let deleted = tx.execute(&format!("DELETE FROM {}", table), [])?;
            tracing::info!("  cleared {} ({} rows)", table, deleted);
        }
        tx.commit()?;
        Ok(())
    }

    /// Imports one partition file (JSONL or JSON array)
    pub fn import_file(
        &mut self,
        path: &Path,
        batch_size: usize,
    ) -> Result<ImportReport, ImportError> {
        tracing::info!("Importing {}", path.display());
        let records = read_records(path);
        self.import_records(&records, batch_size)
    }

    /// Imports a slice of records with per-record savepoint isolation
    pub fn import_records(
        &mut self,
        records: &[AggregatedRecord],
        batch_size: usize,
    ) -> Result<ImportReport, ImportError> {
        let batch_size = batch_size.max(1);
        let mut report = ImportReport::default();

        for chunk in records.chunks(batch_size) {
            let mut tx = self.conn.transaction()?;

            for record in chunk {
                let Some(resource_id) = record.resource_id else {
                    tracing::warn!(
                        "Skipping degraded record without resource id: {}",
                        record.detail_url
                    );
                    report.skipped += 1;
                    continue;
                };

                let mut savepoint = tx.savepoint()?;
                match upsert_record(&savepoint, resource_id, record) {
                    Ok(()) => {
                        savepoint.commit()?;
                        report.imported += 1;
                    }
                    Err(e) => {
                        // Poison record: roll back its statements only
                        tracing::warn!(
                            "Record {} failed, rolling back and continuing: {}",
                            resource_id,
                            e
                        );
                        savepoint.rollback()?;
                        report.failed += 1;
                    }
                }
            }

            tx.commit()?;
            tracing::debug!("Committed batch of {} record(s)", chunk.len());
        }

        Ok(report)
    }
}

/// One record's statements, executed inside its savepoint
fn upsert_record(
    conn: &Connection,
    resource_id: u64,
    record: &AggregatedRecord,
) -> rusqlite::Result<()> {
    let now = Utc::now().to_rfc3339();

    // Catalog row keyed by catalog_id
    conn.execute(
        "INSERT INTO catalogs (catalog_id, name, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(catalog_id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
        params![record.catalog_id, record.catalog_name, now],
    )?;

    // Parent row keyed by resource_id
    let md = &record.metadata;
    conn.execute(
        "INSERT INTO resources
         (resource_id, catalog_id, title, intro_html, cover_image,
          author, author_url, publisher, publisher_url,
          views, downloads, likes, created_at, last_updated,
          detail_url, list_url, raw_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(resource_id) DO UPDATE SET
            catalog_id = excluded.catalog_id,
            title = excluded.title,
            intro_html = excluded.intro_html,
            cover_image = excluded.cover_image,
            author = excluded.author,
            author_url = excluded.author_url,
            publisher = excluded.publisher,
            publisher_url = excluded.publisher_url,
            views = excluded.views,
            downloads = excluded.downloads,
            likes = excluded.likes,
            created_at = excluded.created_at,
            last_updated = excluded.last_updated,
            detail_url = excluded.detail_url,
            list_url = excluded.list_url,
            raw_json = excluded.raw_json",
        params![
            resource_id,
            record.catalog_id,
            record.title,
            record.intro_html,
            record.cover_image,
            md.get("author"),
            md.get("author_url"),
            md.get("publisher"),
            md.get("publisher_url"),
            md.get("views").and_then(|v| parse_count(v)),
            md.get("downloads").and_then(|v| parse_count(v)),
            md.get("likes").and_then(|v| parse_count(v)),
            md.get("created_at").and_then(|v| parse_datetime(v)),
            md.get("last_updated")
                .or_else(|| md.get("current_version_updated"))
                .and_then(|v| parse_datetime(v)),
            record.detail_url,
            record.list_url,
            serde_json::to_string(record).unwrap_or_default(),
        ],
    )?;

    // Image rows keyed by (resource_id, url), ordered by index
    for (idx, url) in record.images.iter().enumerate() {
        if url.is_empty() {
            continue;
        }
        conn.execute(
            "INSERT INTO images (resource_id, url, idx) VALUES (?1, ?2, ?3)
             ON CONFLICT(resource_id, url) DO UPDATE SET idx = excluded.idx",
            params![resource_id, url, idx as i64],
        )?;
    }

    for branch in &record.branches {
        upsert_branch(conn, resource_id, branch)?;
    }

    Ok(())
}

fn upsert_branch(
    conn: &Connection,
    resource_id: u64,
    branch: &VersionBranch,
) -> rusqlite::Result<()> {
    // Synthetic branches carry no site id; 0 keeps the natural key total
    let branch_id = branch.branch_id.unwrap_or(0);

    conn.execute(
        "INSERT INTO branches
         (resource_id, branch_id, name, is_default, description_html, updated_at, views, downloads)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(resource_id, branch_id) DO UPDATE SET
            name = excluded.name,
            is_default = excluded.is_default,
            description_html = excluded.description_html,
            updated_at = excluded.updated_at,
            views = excluded.views,
            downloads = excluded.downloads",
        params![
            resource_id,
            branch_id,
            branch.name,
            branch.is_default as i64,
            branch.description_html,
            branch.stats.updated_at.as_deref().and_then(parse_datetime),
            branch.stats.views.as_deref().and_then(parse_count),
            branch.stats.downloads.as_deref().and_then(parse_count),
        ],
    )?;

    // Downloads hang off the surrogate key, which must be looked up right
    // after the upsert - the insert may have been turned into an update
    let branch_row: i64 = conn
        .query_row(
            "SELECT id FROM branches WHERE resource_id = ?1 AND branch_id = ?2",
            params![resource_id, branch_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(rusqlite::Error::QueryReturnedNoRows)?;

    // Download entries have no natural key; replace the branch's set wholesale
    conn.execute("DELETE FROM downloads WHERE branch_row = ?1", params![branch_row])?;

    for entry in &branch.downloads {
        let (kind, file_id, filename, size, url, note) = download_columns(entry);
        conn.execute(
            "INSERT INTO downloads (branch_row, type, file_id, filename, size, url, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![branch_row, kind, file_id, filename, size, url, note],
        )?;
    }

    Ok(())
}

type DownloadColumns<'a> = (
    &'static str,
    Option<u64>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

fn download_columns(entry: &DownloadEntry) -> DownloadColumns<'_> {
    match entry {
        DownloadEntry::Internal {
            file_id,
            filename,
            size,
        } => (
            entry.kind(),
            Some(*file_id),
            Some(filename.as_str()),
            size.as_deref(),
            None,
            None,
        ),
        DownloadEntry::External { name, url, note }
        | DownloadEntry::ForumRedirect { name, url, note } => (
            entry.kind(),
            None,
            name.as_deref(),
            None,
            url.as_deref(),
            note.as_deref(),
        ),
        DownloadEntry::Empty { note } | DownloadEntry::Unknown { note } => {
            (entry.kind(), None, None, None, None, Some(note.as_str()))
        }
    }
}

/// Lenient count parsing: "1,234" and padded values become integers,
/// anything else becomes NULL
pub fn parse_count(value: &str) -> Option<i64> {
    value.replace(',', "").trim().parse().ok()
}

/// Lenient datetime parsing over the formats the site displays.
/// Relative times ("6 天前") and garbage become NULL.
pub fn parse_datetime(value: &str) -> Option<String> {
    let trimmed = value.trim();

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ];

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Some(dt.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }

    None
}

/// Reads records from a partition file, accepting both serialization modes.
/// Unreadable files and malformed lines are logged and skipped - a bad
/// partition must not abort the run.
pub fn read_records(path: &Path) -> Vec<AggregatedRecord> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::error!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<AggregatedRecord>>(trimmed) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to parse JSON array {}: {}", path.display(), e);
                Vec::new()
            }
        }
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed line in {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }
}

/// Expands a `*`-wildcard file pattern against its parent directory.
/// Patterns without a wildcard are treated as literal paths.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, ImportError> {
    let path = Path::new(pattern);

    if !pattern.contains('*') {
        return if path.is_file() {
            Ok(vec![path.to_path_buf()])
        } else {
            Err(ImportError::NoFiles(pattern.to_string()))
        };
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Some(name_pattern) = path.file_name().and_then(|n| n.to_str()) else {
        return Err(ImportError::NoFiles(pattern.to_string()));
    };

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let entry_path = entry.path();
        if !entry_path.is_file() {
            continue;
        }
        if let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) {
            if wildcard_match(name_pattern, name) {
                matches.push(entry_path);
            }
        }
    }

    if matches.is_empty() {
        return Err(ImportError::NoFiles(pattern.to_string()));
    }

    matches.sort();
    Ok(matches)
}

/// Minimal `*` glob matcher (any run of characters, including empty)
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}

/// Deletes successfully imported source files, then removes any directory
/// the deletions emptied out.
pub fn cleanup_imported_files(files: &[PathBuf]) {
    let mut dirs = std::collections::BTreeSet::new();

    for file in files {
        match std::fs::remove_file(file) {
            Ok(()) => {
                tracing::info!("Removed imported file {}", file.display());
                if let Some(parent) = file.parent() {
                    dirs.insert(parent.to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!("Failed to remove {}: {}", file.display(), e);
            }
        }
    }

    for dir in dirs {
        match std::fs::read_dir(&dir) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    if std::fs::remove_dir(&dir).is_ok() {
                        tracing::info!("Removed empty directory {}", dir.display());
                    }
                }
            }
            Err(_) => continue,
        }
    }
}

/// Full import entrypoint: expand the pattern, optionally wipe the tables,
/// import file by file, and clean up sources on success.
///
/// A connection-level failure aborts with uncommitted work rolled back;
/// per-record failures never do.
pub fn run_import(
    db_path: &Path,
    pattern: &str,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let files = expand_pattern(pattern)?;
    tracing::info!("Found {} file(s) for pattern {}", files.len(), pattern);

    let mut importer = Importer::open(db_path)?;

    if options.full_replace {
        importer.full_replace()?;
    }

    let mut report = ImportReport {
        files: files.len(),
        ..Default::default()
    };

    for file in &files {
        let file_report = importer.import_file(file, options.batch_size)?;
        tracing::info!(
            "{}: {} imported, {} skipped, {} failed",
            file.display(),
            file_report.imported,
            file_report.skipped,
            file_report.failed
        );
        report.absorb(&file_report);
    }

    if options.cleanup {
        cleanup_imported_files(&files);
    }

    tracing::info!(
        "Import complete: {} record(s) from {} file(s) ({} skipped, {} failed)",
        report.imported,
        report.files,
        report.skipped,
        report.failed
    );

    Ok(report)
}
