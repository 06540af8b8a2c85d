//! Detail page extraction: title, images, intro, metadata, identifiers
//!
//! The detail page is the richest response in the pipeline. Everything here
//! degrades gracefully: a missing region produces an empty field, never an
//! error, and the resource identifiers come back as `None` when the inline
//! data blob is absent (which routes the resource onto the degraded path).

use crate::extract::consts::{
    DEFAULT_BRANCH_ID_REGEX, EM_SELECTOR, IMGLIST_IMG_SELECTOR, INFO_LABEL_SELECTOR,
    LINK_SELECTOR, MARKDOWN_BODY_SELECTOR, MESSAGE_IMG_SELECTOR, MESSAGE_LINK_SELECTOR,
    GT_SPACE_REGEX, RESOURCE_ID_REGEX, SCRIPT_SELECTOR, SESSION_TOKEN_REGEX, SPACE_LT_REGEX,
    SPAN_SELECTOR, STATS_SPAN_SELECTOR, TITLE_H1_SELECTOR, TITLE_TAG_SELECTOR,
    UPLOAD_INFO_SELECTOR, VIEW_MESSAGE_SELECTOR,
};
use crate::extract::{canonicalize, collapse_whitespace, strip_scripts, strip_thumbnail_suffix};
use crate::model::{DownloadEntry, ResourceDetail};
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use std::collections::HashSet;
use url::Url;

/// Site suffix removed from `<title>` fallback titles
const TITLE_SUFFIX: &str = " - EYE资源中心";

/// URL fragments that mark an image as an icon/smiley rather than content
const ICON_MARKERS: &[&str] = &[
    "/smilies/",
    "/icon/",
    "/static/image/smiley/",
    "emoji",
    "loading",
];

/// Link substrings that qualify an anchor as a download mirror
const DOWNLOAD_LINK_MARKERS: &[&str] = &[
    "pan.baidu.com",
    "mega.nz",
    "mediafire.com",
    "onedrive",
    "1drv.ms",
    "github.com",
    "attachment.php",
    "down.php?",
    "download",
];

/// Parses one resource detail page
pub fn parse_detail_page(html: &str, page_url: &Url, catalog_id: u32) -> ResourceDetail {
    let document = Html::parse_document(html);

    let (resource_id, primary_branch_id, session_token) = extract_identifiers(&document);

    ResourceDetail {
        resource_id,
        catalog_id,
        title: extract_title(&document),
        images: extract_images(&document, page_url),
        intro_html: extract_intro(&document),
        metadata: extract_metadata(&document, page_url),
        primary_branch_id,
        session_token,
    }
}

/// Title: the aggregate H1 text, falling back to `<title>` with the site
/// suffix removed. Empty string when neither exists.
fn extract_title(document: &Html) -> String {
    if let Some(h1) = document.select(&TITLE_H1_SELECTOR).next() {
        let title = h1.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            return title;
        }
    }

    document
        .select(&TITLE_TAG_SELECTOR)
        .next()
        .map(|t| {
            t.text()
                .collect::<String>()
                .replace(TITLE_SUFFIX, "")
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

fn is_small_icon(url: &str) -> bool {
    let lower = url.to_lowercase();
    ICON_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Body images, lazy-loaded attribute first, thumbnail suffixes stripped,
/// icons and loading placeholders filtered, deduplicated in document order.
fn extract_images(document: &Html, page_url: &Url) -> Vec<String> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    let sources = document
        .select(&IMGLIST_IMG_SELECTOR)
        .chain(document.select(&MESSAGE_IMG_SELECTOR));

    for img in sources {
        for attr in ["data-original", "src"] {
            let Some(raw) = img.value().attr(attr) else {
                continue;
            };

            if raw.is_empty() || raw.ends_with("loading_blue.gif") || is_small_icon(raw) {
                continue;
            }

            let Some(absolute) = canonicalize(raw, page_url) else {
                continue;
            };
            let full_size = strip_thumbnail_suffix(&absolute);

            if seen.insert(full_size.clone()) {
                images.push(full_size);
            }
        }
    }

    images
}

/// Intro HTML: the markdown body when the resource uses markdown, otherwise
/// the whole message region with inter-tag whitespace squeezed out. Script
/// tags are always removed.
fn extract_intro(document: &Html) -> String {
    if let Some(markdown) = document.select(&MARKDOWN_BODY_SELECTOR).next() {
        return strip_scripts(&markdown.html()).trim().to_string();
    }

    let Some(message) = document.select(&VIEW_MESSAGE_SELECTOR).next() else {
        return String::new();
    };

    let cleaned = strip_scripts(&message.html());
    let cleaned = GT_SPACE_REGEX.replace_all(&cleaned, ">");
    let cleaned = SPACE_LT_REGEX.replace_all(&cleaned, "<");
    cleaned.trim().to_string()
}

/// First `<span>` under `element`: `title` attribute (absolute time)
/// preferred over display text (relative time).
fn span_time(element: ElementRef<'_>) -> Option<String> {
    let span = element.select(&SPAN_SELECTOR).next()?;
    if let Some(absolute) = span.value().attr("title") {
        return Some(absolute.trim().to_string());
    }
    let relative = span.text().collect::<String>().trim().to_string();
    (!relative.is_empty()).then_some(relative)
}

/// Stats counters plus the labeled upload-info rows (author, publisher,
/// creation/update times), all as raw display strings.
fn extract_metadata(document: &Html, page_url: &Url) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    // View/download/like counters from the header stats strip
    for stat in document.select(&STATS_SPAN_SELECTOR) {
        let label = stat
            .select(&LINK_SELECTOR)
            .next()
            .map(|a| a.text().collect::<String>())
            .unwrap_or_default();
        let count = stat
            .select(&EM_SELECTOR)
            .next()
            .map(|em| em.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        if count.is_empty() {
            continue;
        }

        if label.contains("查看") {
            metadata.insert("views".to_string(), count);
        } else if label.contains("下载") {
            metadata.insert("downloads".to_string(), count);
        } else if label.contains("喜欢") {
            metadata.insert("likes".to_string(), count);
        }
    }

    // Labeled rows: timestamps, author, publisher
    for row in document.select(&UPLOAD_INFO_SELECTOR) {
        let Some(label) = row
            .select(&INFO_LABEL_SELECTOR)
            .next()
            .map(|p| p.text().collect::<String>().trim().to_string())
        else {
            continue;
        };

        if label.contains("当前版本最后更新") {
            if let Some(time) = span_time(row) {
                metadata.insert("current_version_updated".to_string(), time);
            }
        } else if label.contains("最后更新时间") {
            if let Some(time) = span_time(row) {
                metadata.insert("last_updated".to_string(), time);
            }
        } else if label.contains("资源创建时间") {
            if let Some(time) = span_time(row) {
                metadata.insert("created_at".to_string(), time);
            }
        } else if label.contains("资源作者") {
            insert_person(&mut metadata, row, page_url, "author");
        } else if label.contains("资源发布者") {
            insert_person(&mut metadata, row, page_url, "publisher");
        }
    }

    metadata
}

fn insert_person(
    metadata: &mut BTreeMap<String, String>,
    row: ElementRef<'_>,
    page_url: &Url,
    key: &str,
) {
    if let Some(anchor) = row.select(&LINK_SELECTOR).next() {
        let name = anchor.text().collect::<String>().trim().to_string();
        if !name.is_empty() {
            metadata.insert(key.to_string(), name);
        }
        if let Some(href) = anchor.value().attr("href") {
            if let Some(absolute) = canonicalize(href, page_url) {
                metadata.insert(format!("{}_url", key), absolute);
            }
        }
    }
}

/// Pulls `mid`/`vid`/`formhash` out of the inline `var _data` script blob
fn extract_identifiers(document: &Html) -> (Option<u64>, Option<u64>, Option<String>) {
    for script in document.select(&SCRIPT_SELECTOR) {
        let text = script.text().collect::<String>();
        if !text.contains("var _data") {
            continue;
        }

        let resource_id = RESOURCE_ID_REGEX
            .captures(&text)
            .and_then(|c| c[1].parse().ok());
        let branch_id = DEFAULT_BRANCH_ID_REGEX
            .captures(&text)
            .and_then(|c| c[1].parse().ok());
        let token = SESSION_TOKEN_REGEX
            .captures(&text)
            .map(|c| c[1].to_string());

        return (resource_id, branch_id, token);
    }

    (None, None, None)
}

/// Coarse download scraping for detail pages without structured identifiers
///
/// Scans the message body for anchors matching the known mirror/host
/// patterns. Best effort only; the degraded path must never drop a resource,
/// but it has no branch or file structure to offer.
pub fn extract_coarse_downloads(html: &str, page_url: &Url) -> Vec<DownloadEntry> {
    let document = Html::parse_document(html);

    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for anchor in document.select(&MESSAGE_LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(absolute) = canonicalize(href, page_url) else {
            continue;
        };

        let lower = absolute.to_lowercase();
        if !DOWNLOAD_LINK_MARKERS.iter().any(|m| lower.contains(m)) {
            continue;
        }
        if !seen.insert(absolute.clone()) {
            continue;
        }

        let name = collapse_whitespace(&anchor.text().collect::<String>());
        entries.push(DownloadEntry::External {
            name: (!name.is_empty()).then_some(name),
            url: Some(absolute),
            note: None,
        });
    }

    entries
}
