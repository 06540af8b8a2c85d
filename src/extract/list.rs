//! List page extraction: detail links, cover images, pagination
//!
//! One resource card on a list page carries the link to its detail page and a
//! lazily-loaded cover image. Pagination is only resolved on page 1 and the
//! maximum is propagated to sibling pages by the orchestrator, never
//! re-derived.

use crate::extract::consts::{
    ANCHOR_SELECTOR, COVER_IMG_SELECTOR, DETAIL_LINK_SELECTOR, LIST_ITEM_SELECTOR,
};
use crate::extract::{canonicalize, strip_thumbnail_suffix};
use crate::model::{ListItem, ListPage};
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use url::Url;

/// Parses one list page response
///
/// Detail links are deduplicated within this page only; the same resource
/// appearing on two different pages is resolved later at merge time.
pub fn parse_list_page(html: &str, page_url: &Url, catalog_id: u32, page_number: u32) -> ListPage {
    let document = Html::parse_document(html);

    let mut items = Vec::new();
    let mut seen_in_page = HashSet::new();

    for card in document.select(&LIST_ITEM_SELECTOR) {
        let Some(href) = card
            .select(&DETAIL_LINK_SELECTOR)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };

        let Some(detail_url) = canonicalize(href, page_url) else {
            continue;
        };

        if !seen_in_page.insert(detail_url.clone()) {
            continue;
        }

        let cover_image = card
            .select(&COVER_IMG_SELECTOR)
            .next()
            .and_then(|img| img.value().attr("data-original"))
            .filter(|src| !src.starts_with("data:image"))
            .map(strip_thumbnail_suffix)
            .and_then(|src| canonicalize(&src, page_url));

        items.push(ListItem {
            detail_url,
            cover_image,
        });
    }

    let pagination_max = if page_number == 1 {
        Some(parse_max_page(&document, catalog_id))
    } else {
        None
    };

    ListPage {
        catalog_id,
        page_number,
        items,
        pagination_max,
    }
}

/// Scans every link on the page for `/down/list/<catalog_id>/<n>` and
/// returns the highest page number seen, defaulting to 1.
fn parse_max_page(document: &Html, catalog_id: u32) -> u32 {
    let Ok(pattern) = Regex::new(&format!(r"/down/list/{}/(\d+)", catalog_id)) else {
        return 1;
    };

    let mut max_page = 1;
    for anchor in document.select(&ANCHOR_SELECTOR) {
        if let Some(href) = anchor.value().attr("href") {
            if let Some(caps) = pattern.captures(href) {
                if let Ok(page) = caps[1].parse::<u32>() {
                    max_page = max_page.max(page);
                }
            }
        }
    }

    max_page
}
