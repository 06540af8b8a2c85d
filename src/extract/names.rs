//! Catalog display-name resolution
//!
//! Resolution order is a contract: regex over aggregated heading/title/
//! breadcrumb text, then the static id lookup table, then a synthesized
//! `list_<id>` fallback. A catalog always ends up with *some* name.

use crate::extract::consts::{
    BREADCRUMB_SELECTOR, CATALOG_NAME_REGEX, H1_SELECTOR, TITLE_TAG_SELECTOR,
};
use crate::extract::collapse_whitespace;
use scraper::Html;

/// Static id-to-name table for catalogs whose pages don't spell the name out
const CATALOG_NAME_MAP: &[(u32, &str)] = &[
    (182, "NBA 2K25"),
    (172, "NBA 2K24"),
    (162, "NBA 2K23"),
];

/// Resolves the display name of a catalog from its first list page
pub fn resolve_catalog_name(html: &str, catalog_id: u32) -> String {
    let document = Html::parse_document(html);

    // Gather the text signals the name usually hides in
    let mut texts: Vec<String> = Vec::new();

    if let Some(h1) = document.select(&H1_SELECTOR).next() {
        texts.push(h1.text().collect::<String>());
    }
    if let Some(title) = document.select(&TITLE_TAG_SELECTOR).next() {
        texts.push(title.text().collect::<String>());
    }
    for crumb in document.select(&BREADCRUMB_SELECTOR) {
        texts.push(crumb.text().collect::<String>());
    }

    for text in &texts {
        if let Some(caps) = CATALOG_NAME_REGEX.captures(text) {
            return collapse_whitespace(&caps[1].to_uppercase());
        }
    }

    if let Some((_, name)) = CATALOG_NAME_MAP.iter().find(|(id, _)| *id == catalog_id) {
        return name.to_string();
    }

    format!("list_{}", catalog_id)
}
