//! Download listing extraction and classification
//!
//! The per-branch download endpoint returns a CDATA-wrapped HTML fragment.
//! Classification order is a contract and must not be reordered:
//!
//! 1. An explicit "no files" marker wins over everything else on the page.
//! 2. If every download item is behind the login wall, one entry per item is
//!    synthesized from its display name.
//! 3. Structured `showprotocol(..)` entries are extracted in document order,
//!    with filename/size alignment; entries without a file id fall back to
//!    external/forum classification.
//! 4. Bare external anchors are scraped as a last resort.
//! 5. Nothing at all yields a single `unknown` entry.

use crate::extract::consts::{
    BRANCH_CONTENT_REGEX, BRANCH_LABEL_REGEX, EXTERNAL_ANCHOR_REGEX, FILENAME_REGEX,
    FILE_ID_REGEX, FRAGMENT_MARKDOWN_SELECTOR, PLAIN_NAME_REGEX, PROTOCOL_CALL_REGEX, SIZE_REGEX,
};
use crate::extract::{strip_scripts, unwrap_cdata};
use crate::model::DownloadEntry;
use scraper::Html;
use url::Url;

const NO_FILES_MARKER: &str = "暂无文件";
const NO_FILES_NOTE: &str = "当前版本暂无文件";
const LOGIN_WALL_MARKER: &str = "showWindow('login'";
const DOWNLOAD_ITEM_MARKER: &str = "veritem-download-item";

/// Display-name keywords that mark a login-walled item as a forum redirect
const FORUM_KEYWORDS: &[&str] = &["试用", "链接", "地址", "下载"];

/// Display-name keywords that mark an item as an off-site mirror
const MIRROR_KEYWORDS: &[&str] = &["baidu", "百度", "mediafire", "mega", "onedrive", "网盘"];

/// Everything extracted from one download-listing fragment
#[derive(Debug, Clone)]
pub struct BranchListing {
    /// Branch display label from the fragment header (e.g. "V1.1")
    pub display_name: Option<String>,

    /// Full branch description from the fragment body, when present
    pub description_html: Option<String>,

    /// Classified download entries, never empty
    pub entries: Vec<DownloadEntry>,
}

/// Parses one download-listing AJAX fragment
///
/// Always yields at least one entry; a fragment that resists every
/// classification step produces a single `unknown` entry rather than nothing.
pub fn parse_download_fragment(fragment: &str, base: &Url) -> BranchListing {
    let html = unwrap_cdata(fragment);

    let display_name = BRANCH_LABEL_REGEX
        .captures(html)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty());

    let description_html = extract_description(html);

    let entries = classify_entries(html, base);

    BranchListing {
        display_name,
        description_html,
        entries,
    }
}

/// The branch description sits in the `veritem-content` region: markdown
/// bodies are kept as HTML, anything else collapses to its text.
fn extract_description(html: &str) -> Option<String> {
    let content = BRANCH_CONTENT_REGEX.captures(html)?.get(1)?.as_str();
    let document = Html::parse_document(content);

    if let Some(markdown) = document.select(&FRAGMENT_MARKDOWN_SELECTOR).next() {
        let body = strip_scripts(&markdown.html()).trim().to_string();
        if !body.is_empty() {
            return Some(body);
        }
    }

    let text = document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn classify_entries(html: &str, base: &Url) -> Vec<DownloadEntry> {
    // (1) Explicit empty marker beats any stray structured strings
    if html.contains(NO_FILES_MARKER) {
        return vec![DownloadEntry::Empty {
            note: NO_FILES_NOTE.to_string(),
        }];
    }

    let protocol_urls: Vec<String> = PROTOCOL_CALL_REGEX
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect();

    let mut names: Vec<String> = FILENAME_REGEX
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect();
    if names.is_empty() {
        names = PLAIN_NAME_REGEX
            .captures_iter(html)
            .map(|c| c[1].trim().to_string())
            .collect();
    }

    // (2) All items login-walled: synthesize one entry per display name
    let login_walled = html.matches(LOGIN_WALL_MARKER).count();
    let item_count = html.matches(DOWNLOAD_ITEM_MARKER).count();
    if item_count > 0 && login_walled >= item_count && protocol_urls.is_empty() {
        let walled_names: Vec<String> = PLAIN_NAME_REGEX
            .captures_iter(html)
            .map(|c| c[1].trim().to_string())
            .collect();
        return walled_names.iter().map(|name| classify_walled(name)).collect();
    }

    // (3) Structured entries in document order
    if !protocol_urls.is_empty() {
        let sizes: Vec<String> = SIZE_REGEX
            .captures_iter(html)
            .map(|c| c[1].to_string())
            .collect();

        return protocol_urls
            .iter()
            .enumerate()
            .map(|(idx, raw_url)| {
                match FILE_ID_REGEX
                    .captures(raw_url)
                    .and_then(|c| c[1].parse::<u64>().ok())
                {
                    Some(file_id) => DownloadEntry::Internal {
                        file_id,
                        filename: names
                            .get(idx)
                            .cloned()
                            .unwrap_or_else(|| format!("file_{}", file_id)),
                        size: sizes.get(idx).cloned(),
                    },
                    None => classify_linked(raw_url, names.get(idx).map(String::as_str), base),
                }
            })
            .collect();
    }

    // (4) Bare external anchors
    let external: Vec<DownloadEntry> = EXTERNAL_ANCHOR_REGEX
        .captures_iter(html)
        .filter(|c| !c[1].starts_with("javascript:"))
        .map(|c| DownloadEntry::External {
            name: None,
            url: Some(absolutize(&c[1], base)),
            note: None,
        })
        .collect();
    if !external.is_empty() {
        return external;
    }

    // (5) Nothing recognizable
    vec![DownloadEntry::Unknown {
        note: "未找到下载链接".to_string(),
    }]
}

/// Classifies a login-walled item purely by its display name
fn classify_walled(name: &str) -> DownloadEntry {
    let lower = name.to_lowercase();

    if FORUM_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        DownloadEntry::ForumRedirect {
            name: Some(name.to_string()),
            url: None,
            note: Some("跳转到论坛帖子（需登录查看）".to_string()),
        }
    } else if MIRROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        DownloadEntry::External {
            name: Some(name.to_string()),
            url: None,
            note: Some(format!("外部网盘（{}）", name)),
        }
    } else {
        DownloadEntry::External {
            name: Some(name.to_string()),
            url: None,
            note: Some("外部链接或网盘".to_string()),
        }
    }
}

/// Classifies a structured entry that carried a link but no file id
fn classify_linked(raw_url: &str, name: Option<&str>, base: &Url) -> DownloadEntry {
    let name = name.unwrap_or("外部链接").to_string();
    let lower = name.to_lowercase();
    let url = Some(absolutize(raw_url, base));

    if MIRROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        DownloadEntry::External {
            note: Some(format!("外部网盘（{}）", name)),
            name: Some(name),
            url,
        }
    } else if raw_url.contains("/t/") || raw_url.contains("/thread-") {
        DownloadEntry::ForumRedirect {
            note: Some(format!("论坛帖子（{}）", name)),
            name: Some(name),
            url,
        }
    } else {
        DownloadEntry::External {
            note: Some(format!("外部链接（{}）", name)),
            name: Some(name),
            url,
        }
    }
}

fn absolutize(raw: &str, base: &Url) -> String {
    if raw.starts_with('/') {
        base.join(raw)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw.to_string())
    } else {
        raw.to_string()
    }
}
