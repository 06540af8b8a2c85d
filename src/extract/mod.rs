//! Pure extraction functions for catalog responses
//!
//! Every function in this module takes a response body plus whatever context
//! the caller already knows (catalog id, originating URL) and returns typed
//! fragments. Nothing here performs I/O, keeps state, or raises on malformed
//! input: a page that does not match simply yields sentinel values, and the
//! orchestrator's fallback policies take it from there.

mod branches;
mod consts;
mod detail;
mod downloads;
mod list;
mod names;

pub use branches::parse_branches;
pub use detail::{extract_coarse_downloads, parse_detail_page};
pub use downloads::{parse_download_fragment, BranchListing};
pub use list::parse_list_page;
pub use names::resolve_catalog_name;

use consts::{CDATA_REGEX, SCRIPT_TAG_REGEX, THUMB_SUFFIX_REGEX, WHITESPACE_REGEX};
use url::Url;

/// Resolves an href against the originating page URL
///
/// Returns `None` for empty hrefs, script/mail/data pseudo-links, fragment
/// anchors, and anything that does not resolve to http(s).
pub(crate) fn canonicalize(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    if href.starts_with('#') {
        return None;
    }

    match base.join(href) {
        Ok(absolute) => {
            if absolute.scheme() == "http" || absolute.scheme() == "https" {
                Some(absolute.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Strips the known thumbnail-size suffix (`/fw_285`, `/fh_140`, ...) so the
/// canonical full-size asset URL is recorded instead of a resized variant.
pub(crate) fn strip_thumbnail_suffix(url: &str) -> String {
    THUMB_SUFFIX_REGEX.replace(url, "").into_owned()
}

/// Unwraps a `<![CDATA[..]]>` envelope, returning the body unchanged when no
/// envelope is present. AJAX endpoints wrap their HTML fragments this way.
pub(crate) fn unwrap_cdata(body: &str) -> &str {
    match CDATA_REGEX.captures(body) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(body),
        None => body,
    }
}

/// Removes `<script>` blocks from an HTML snippet
pub(crate) fn strip_scripts(html: &str) -> String {
    SCRIPT_TAG_REGEX.replace_all(html, "").into_owned()
}

/// Collapses runs of whitespace into single spaces and trims
pub(crate) fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://bbs.example.com/down/list/182").unwrap()
    }

    #[test]
    fn test_canonicalize_relative() {
        assert_eq!(
            canonicalize("/down/view/31047", &base()).unwrap(),
            "https://bbs.example.com/down/view/31047"
        );
    }

    #[test]
    fn test_canonicalize_rejects_pseudo_links() {
        assert!(canonicalize("javascript:void(0)", &base()).is_none());
        assert!(canonicalize("data:image/png;base64,xyz", &base()).is_none());
        assert!(canonicalize("#files", &base()).is_none());
        assert!(canonicalize("", &base()).is_none());
    }

    #[test]
    fn test_strip_thumbnail_suffix() {
        assert_eq!(
            strip_thumbnail_suffix("https://img.example.com/pic/abc.jpg/fw_285"),
            "https://img.example.com/pic/abc.jpg"
        );
        assert_eq!(
            strip_thumbnail_suffix("https://img.example.com/pic/abc.jpg/fh_140"),
            "https://img.example.com/pic/abc.jpg"
        );
        // Suffix only strips at the end
        assert_eq!(
            strip_thumbnail_suffix("https://img.example.com/fw_285/abc.jpg"),
            "https://img.example.com/fw_285/abc.jpg"
        );
    }

    #[test]
    fn test_unwrap_cdata() {
        let body = "<root><![CDATA[<div class=\"verlist\">x</div>]]></root>";
        assert_eq!(unwrap_cdata(body), "<div class=\"verlist\">x</div>");
        assert_eq!(unwrap_cdata("plain"), "plain");
    }

    #[test]
    fn test_strip_scripts() {
        let html = "<p>keep</p><script>var _data = {};</script><p>also</p>";
        let cleaned = strip_scripts(html);
        assert!(!cleaned.contains("script"));
        assert!(cleaned.contains("keep"));
        assert!(cleaned.contains("also"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  NBA   2K\n25  "), "NBA 2K 25");
    }
}
