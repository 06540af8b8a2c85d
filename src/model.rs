//! Typed records flowing through the harvest pipeline
//!
//! Everything the orchestrator assembles and the output/import stages consume
//! is defined here: the per-catalog crawl unit, the intermediate parse
//! fragments, and the terminal `AggregatedRecord`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One paginated catalog to crawl
///
/// Created from user-supplied id lists/ranges; immutable for the lifetime of
/// the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CrawlTarget {
    /// The catalog (list) identifier on the remote site
    pub catalog_id: u32,
}

impl CrawlTarget {
    pub fn new(catalog_id: u32) -> Self {
        Self { catalog_id }
    }
}

/// A single entry on a list page: the detail link plus its cover image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Absolute URL of the resource detail page
    pub detail_url: String,

    /// Cover image captured from the list card, thumbnail suffix stripped
    pub cover_image: Option<String>,
}

/// The parsed contents of one list page
#[derive(Debug, Clone)]
pub struct ListPage {
    pub catalog_id: u32,
    pub page_number: u32,

    /// Detail links found on this page, deduplicated within the page only
    pub items: Vec<ListItem>,

    /// Highest page number advertised by the pagination links.
    /// Only resolved from page 1; `None` on later pages.
    pub pagination_max: Option<u32>,
}

/// The parsed contents of one resource detail page
///
/// `resource_id: None` means the page exposed no structured identifiers; the
/// resource is terminal and only coarse download links can be scraped.
#[derive(Debug, Clone)]
pub struct ResourceDetail {
    pub resource_id: Option<u64>,
    pub catalog_id: u32,
    pub title: String,
    pub images: Vec<String>,
    pub intro_html: String,
    pub metadata: BTreeMap<String, String>,

    /// The default branch id exposed by the detail page's inline data blob
    pub primary_branch_id: Option<u64>,

    /// Anti-forgery token carried by the page, needed by some AJAX endpoints
    pub session_token: Option<String>,
}

/// Raw per-branch statistics as displayed on the branch list
///
/// Values stay as display strings here; numeric and datetime parsing is an
/// import-time concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// One versioned variant of a resource's downloadable files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionBranch {
    /// Branch identifier; `None` only for synthesized fallback branches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<u64>,

    pub name: String,
    pub is_default: bool,

    #[serde(default)]
    pub description_html: String,

    #[serde(default)]
    pub stats: BranchStats,

    #[serde(default)]
    pub downloads: Vec<DownloadEntry>,
}

impl VersionBranch {
    /// Builds the synthetic branch used when branch discovery fails or
    /// returns nothing. Every resource always carries at least one branch.
    pub fn synthetic_default(branch_id: Option<u64>) -> Self {
        Self {
            branch_id,
            name: "Default".to_string(),
            is_default: true,
            description_html: String::new(),
            stats: BranchStats::default(),
            downloads: Vec::new(),
        }
    }
}

/// One download entry inside a branch's file listing
///
/// The variant is the classification outcome; each carries only the fields
/// that outcome actually has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEntry {
    /// A structured on-site attachment with a stable file id
    Internal {
        file_id: u64,
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<String>,
    },

    /// An off-site mirror (file host, cloud drive, ...)
    External {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },

    /// A redirect into the forum, typically behind a login wall
    ForumRedirect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },

    /// The branch explicitly advertises that it has no files
    Empty { note: String },

    /// Nothing recognizable in the fragment at all
    Unknown { note: String },
}

impl DownloadEntry {
    /// Stable discriminant string, matching the serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Internal { .. } => "internal",
            Self::External { .. } => "external",
            Self::ForumRedirect { .. } => "forum_redirect",
            Self::Empty { .. } => "empty",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// The terminal, immutable output unit: one fully assembled resource
///
/// Emitted exactly once per resource, only after every branch's download
/// listing has resolved. `resource_id: None` marks a degraded record built
/// from coarse link scraping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<u64>,

    pub catalog_id: u32,

    /// Resolved catalog display name (page-1 resolution, inherited by
    /// everything under that catalog)
    pub catalog_name: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub intro_html: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    pub branches: Vec<VersionBranch>,

    pub detail_url: String,
    pub list_url: String,
}
