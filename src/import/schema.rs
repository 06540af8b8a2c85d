//! Relational schema for imported records
//!
//! Five tables: catalogs, resources (parent), images and branches (children),
//! downloads (grandchildren keyed by the branch surrogate id). Natural keys
//! carry UNIQUE constraints so every import path can use
//! `INSERT .. ON CONFLICT .. DO UPDATE`.
//!
//! Synthetic branches have no site-assigned id; they are stored with
//! `branch_id = 0` so the `(resource_id, branch_id)` uniqueness holds on
//! re-import (SQLite treats NULLs as distinct in unique constraints, which
//! would duplicate synthetic branches on every replay).

/// SQL schema for the import database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawled catalog
CREATE TABLE IF NOT EXISTS catalogs (
    catalog_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per resource (parent)
CREATE TABLE IF NOT EXISTS resources (
    resource_id INTEGER PRIMARY KEY,
    catalog_id INTEGER NOT NULL REFERENCES catalogs(catalog_id),
    title TEXT NOT NULL,
    intro_html TEXT,
    cover_image TEXT,
    author TEXT,
    author_url TEXT,
    publisher TEXT,
    publisher_url TEXT,
    views INTEGER,
    downloads INTEGER,
    likes INTEGER,
    created_at TEXT,
    last_updated TEXT,
    detail_url TEXT,
    list_url TEXT,
    raw_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_catalog ON resources(catalog_id);

-- Body images, ordered by their position on the page
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL REFERENCES resources(resource_id),
    url TEXT NOT NULL,
    idx INTEGER NOT NULL,
    UNIQUE(resource_id, url)
);

CREATE INDEX IF NOT EXISTS idx_images_resource ON images(resource_id);

-- Version branches; branch_id 0 marks a synthesized default branch
CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL REFERENCES resources(resource_id),
    branch_id INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    description_html TEXT,
    updated_at TEXT,
    views INTEGER,
    downloads INTEGER,
    UNIQUE(resource_id, branch_id)
);

CREATE INDEX IF NOT EXISTS idx_branches_resource ON branches(resource_id);

-- Download entries, attached to their branch row's surrogate key.
-- No natural key of their own; the importer replaces them per branch.
CREATE TABLE IF NOT EXISTS downloads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    branch_row INTEGER NOT NULL REFERENCES branches(id),
    type TEXT NOT NULL,
    file_id INTEGER,
    filename TEXT,
    size TEXT,
    url TEXT,
    note TEXT
);

CREATE INDEX IF NOT EXISTS idx_downloads_branch ON downloads(branch_row);
"#;

/// Tables in child-before-parent order, for full-replace truncation
pub const TABLES_CHILD_FIRST: &[&str] =
    &["downloads", "branches", "images", "resources", "catalogs"];

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
