use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// List page
selector!(LIST_ITEM_SELECTOR, ".modlist ul li");
selector!(DETAIL_LINK_SELECTOR, r#"a[href*="/down/view/"]"#);
selector!(COVER_IMG_SELECTOR, ".modpic img");
selector!(ANCHOR_SELECTOR, "a[href]");

// Detail page
selector!(TITLE_H1_SELECTOR, "h1#title");
selector!(H1_SELECTOR, "h1");
selector!(TITLE_TAG_SELECTOR, "title");
selector!(BREADCRUMB_SELECTOR, ".crumb, .breadcrumb");
selector!(IMGLIST_IMG_SELECTOR, "#imglist img");
selector!(MESSAGE_IMG_SELECTOR, ".view-message img");
selector!(MARKDOWN_BODY_SELECTOR, ".view-message .markdown-body");
selector!(VIEW_MESSAGE_SELECTOR, ".view-message");
selector!(STATS_SPAN_SELECTOR, ".top-right-info span");
selector!(UPLOAD_INFO_SELECTOR, ".uploadinfo ul li");
selector!(INFO_LABEL_SELECTOR, "p.custom-tt");
selector!(SCRIPT_SELECTOR, "script");
selector!(LINK_SELECTOR, "a");
selector!(SPAN_SELECTOR, "span");
selector!(EM_SELECTOR, "em");

// Branch list fragment
selector!(VERLIST_SELECTOR, "div.verlist");
selector!(VERLIST_ANCHOR_SELECTOR, "h4 a");
selector!(VERLIST_NOTE_SELECTOR, "div.verlist-note");
selector!(VERLIST_INFO_SELECTOR, "div.verlist-info em");
selector!(ICON_SELECTOR, "i.iconfont");

// Download fragment / standalone fallback
selector!(FRAGMENT_MARKDOWN_SELECTOR, "div.markdown-body");
selector!(MESSAGE_LINK_SELECTOR, ".view-message a");

regex!(THUMB_SUFFIX_REGEX, r"/f[wh]_\d+$");
regex!(CDATA_REGEX, r"(?s)<!\[CDATA\[(.*?)\]\]>");
regex!(SCRIPT_TAG_REGEX, r"(?is)<script[^>]*>.*?</script>");
regex!(CATALOG_NAME_REGEX, r"(?i)(NBA\s*2K\s*\d{2,4})");
regex!(RESOURCE_ID_REGEX, r#""mid":\s*"(\d+)""#);
regex!(DEFAULT_BRANCH_ID_REGEX, r#""vid":\s*"(\d+)""#);
regex!(SESSION_TOKEN_REGEX, r#""formhash":\s*"([a-f0-9]+)""#);
regex!(BRANCH_HREF_REGEX, r"/down/view/\d+/(\d+)");
regex!(PROTOCOL_CALL_REGEX, r#"showprotocol\(['"]([^'"]+)['"]"#);
regex!(FILE_ID_REGEX, r"fileid=(\d+)");
regex!(
    FILENAME_REGEX,
    r#"(?is)<em[^>]*class="bupload"[^>]*>.*?([a-zA-Z0-9_\-\.]+\.(?:iff|rar|zip|7z|png|jpg))</em>"#
);
regex!(
    PLAIN_NAME_REGEX,
    r#"(?s)<em[^>]*class="bupload"[^>]*>.*?&nbsp;([^<]+)</em>"#
);
regex!(SIZE_REGEX, r"(?i)<span>(\d+\.?\d*\s*(?:KB|MB|GB))</span>");
regex!(
    BRANCH_LABEL_REGEX,
    r#"(?s)<div class="veritem-name">.*?<span>([^<]+)</span>"#
);
regex!(
    BRANCH_CONTENT_REGEX,
    r#"(?s)<div class="veritem-content">(.*?)</div>\s*</div>\s*<div class="veritem-footer">"#
);
regex!(
    EXTERNAL_ANCHOR_REGEX,
    r#"(?is)<a[^>]+href=["']([^"']+)["'][^>]*>.*?(?:外链|网盘|下载)</a>"#
);
regex!(WHITESPACE_REGEX, r"\s+");
regex!(GT_SPACE_REGEX, r">\s+");
regex!(SPACE_LT_REGEX, r"\s+<");
