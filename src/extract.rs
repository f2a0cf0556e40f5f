//! Lightweight text extraction from product-page HTML.
//!
//! Pulls the page title, meta description, and a bounded body-text snippet
//! for use as generation context. Regex-based on purpose: these pages are
//! fetched once per admin action and only need meta tags and rough text, not
//! a full DOM.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_FIELD_LEN: usize = 2000;
const MAX_SNIPPET_LEN: usize = 1500;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static OG_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property=["']og:title["'][^>]+content=["']([^"']+)["']"#).unwrap()
});
static DESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+name=["']description["'][^>]+content=["']([^"']+)["']"#).unwrap()
});
static OG_DESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property=["']og:description["'][^>]+content=["']([^"']+)["']"#)
        .unwrap()
});
static BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").unwrap());
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style.*?</style>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    pub description: String,
    pub snippet: String,
}

impl PageContent {
    /// Render the extracted fields as prompt context, skipping empty ones.
    pub fn as_context(&self) -> String {
        let mut parts = Vec::new();
        if !self.title.is_empty() {
            parts.push(format!("Page title: {}", self.title));
        }
        if !self.description.is_empty() {
            parts.push(format!("Meta description: {}", self.description));
        }
        if !self.snippet.is_empty() {
            parts.push(format!("Page content snippet: {}", self.snippet));
        }
        parts.join("\n\n")
    }
}

fn clamp(s: &str, max: usize) -> String {
    let collapsed = WS_RE.replace_all(s.trim(), " ");
    collapsed.chars().take(max).collect()
}

/// Extract meaningful content from a page's HTML. og: tags win over the
/// plain title/description when both are present and non-empty.
pub fn extract_page_content(html: &str) -> PageContent {
    let mut title = TITLE_RE
        .captures(html)
        .map(|c| TAG_RE.replace_all(&c[1], "").trim().to_string())
        .unwrap_or_default();
    if let Some(c) = OG_TITLE_RE.captures(html) {
        let og = c[1].trim();
        if !og.is_empty() {
            title = og.to_string();
        }
    }

    let mut description = DESC_RE
        .captures(html)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();
    if let Some(c) = OG_DESC_RE.captures(html) {
        let og = c[1].trim();
        if !og.is_empty() {
            description = og.to_string();
        }
    }

    let snippet = BODY_RE
        .captures(html)
        .map(|c| {
            let body = SCRIPT_RE.replace_all(&c[1], "");
            let body = STYLE_RE.replace_all(&body, "");
            let text = TAG_RE.replace_all(&body, " ");
            clamp(&text, MAX_SNIPPET_LEN)
        })
        .unwrap_or_default();

    PageContent {
        title: clamp(&title, MAX_FIELD_LEN),
        description: clamp(&description, MAX_FIELD_LEN),
        snippet,
    }
}
