//! Idempotent import of merged partitions into SQLite
//!
//! Records map to a five-table relational schema with natural-key upserts;
//! re-importing is always safe. See [`run_import`] for the entrypoint the
//! CLI uses.

mod importer;
mod schema;

pub use importer::{
    cleanup_imported_files, expand_pattern, parse_count, parse_datetime, read_records,
    run_import, ImportReport, Importer,
};
pub use schema::{initialize_schema, SCHEMA_SQL, TABLES_CHILD_FIRST};

use thiserror::Error;

/// Errors that can occur during import operations
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No files matched: {0}")]
    NoFiles(String),
}

/// Operator-facing toggles for an import run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Records per transaction commit
    pub batch_size: usize,

    /// Delete all rows before importing. Destructive; never the default.
    pub full_replace: bool,

    /// Remove source files (and emptied directories) after a successful run
    pub cleanup: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: 200,
            full_replace: false,
            cleanup: true,
        }
    }
}
