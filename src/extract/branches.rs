//! Branch list extraction from the version-discovery AJAX fragment
//!
//! The endpoint returns an XML-ish envelope whose CDATA payload holds one
//! `div.verlist` block per branch. Each block carries the branch link (with
//! the branch id in its href), a default-branch marker, an optional note, and
//! an icon-keyed stats row.

use crate::extract::consts::{
    BRANCH_HREF_REGEX, ICON_SELECTOR, SPAN_SELECTOR, VERLIST_ANCHOR_SELECTOR,
    VERLIST_INFO_SELECTOR, VERLIST_NOTE_SELECTOR, VERLIST_SELECTOR,
};
use crate::extract::unwrap_cdata;
use crate::model::{BranchStats, VersionBranch};
use scraper::{ElementRef, Html};

// Icon glyphs keying the stats row entries
const ICON_TIME: char = '\u{e67d}';
const ICON_VIEWS: char = '\u{e636}';
const ICON_DOWNLOADS: char = '\u{e893}';

const DEFAULT_BRANCH_MARKER: &str = "默认分支";

/// Parses the branch-discovery fragment into the resource's branch list
///
/// Returns an empty vector when nothing parses; the orchestrator synthesizes
/// a default branch in that case, so callers never see a branchless resource.
pub fn parse_branches(fragment: &str) -> Vec<VersionBranch> {
    let html = unwrap_cdata(fragment);
    let document = Html::parse_document(html);

    let mut branches = Vec::new();

    for block in document.select(&VERLIST_SELECTOR) {
        let Some(anchor) = block.select(&VERLIST_ANCHOR_SELECTOR).next() else {
            continue;
        };

        let name = anchor.text().collect::<String>().trim().to_string();
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let Some(branch_id) = BRANCH_HREF_REGEX
            .captures(href)
            .and_then(|c| c[1].parse::<u64>().ok())
        else {
            continue;
        };

        let is_default = anchor.html().contains(DEFAULT_BRANCH_MARKER);

        let description_html = block
            .select(&VERLIST_NOTE_SELECTOR)
            .next()
            .map(|note| note.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        branches.push(VersionBranch {
            branch_id: Some(branch_id),
            name,
            is_default,
            description_html,
            stats: extract_stats(block),
            downloads: Vec::new(),
        });
    }

    branches
}

/// Per-branch stats: each `em` in the info row leads with an icon glyph that
/// says whether the value is a timestamp, a view count, or a download count.
fn extract_stats(block: ElementRef<'_>) -> BranchStats {
    let mut stats = BranchStats::default();

    for info in block.select(&VERLIST_INFO_SELECTOR) {
        let Some(icon) = info
            .select(&ICON_SELECTOR)
            .next()
            .map(|i| i.text().collect::<String>())
        else {
            continue;
        };

        if icon.contains(ICON_TIME) {
            stats.updated_at = info_time(info);
        } else if icon.contains(ICON_VIEWS) {
            stats.views = info_value(info);
        } else if icon.contains(ICON_DOWNLOADS) {
            stats.downloads = info_value(info);
        }
    }

    stats
}

/// Timestamp value: absolute time from the span's `title` attribute wins over
/// the relative display text; bare text nodes (no span at all) come last,
/// with the icon glyph stripped out.
fn info_time(info: ElementRef<'_>) -> Option<String> {
    if let Some(span) = info.select(&SPAN_SELECTOR).next() {
        if let Some(absolute) = span.value().attr("title") {
            return Some(absolute.trim().to_string());
        }
        let relative = span.text().collect::<String>().trim().to_string();
        if !relative.is_empty() {
            return Some(relative);
        }
    }

    let bare: String = info
        .text()
        .filter(|t| !t.contains(ICON_TIME))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("");
    (!bare.is_empty()).then_some(bare)
}

fn info_value(info: ElementRef<'_>) -> Option<String> {
    let value = info
        .select(&SPAN_SELECTOR)
        .next()
        .map(|span| span.text().collect::<String>().trim().to_string())?;
    (!value.is_empty()).then_some(value)
}
