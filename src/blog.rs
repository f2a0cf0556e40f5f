//! Blog content helpers: slugs, read time, category selection, and the
//! markdown → rich-text block conversion used when handing drafts to the CMS.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());
static STRONG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ORDERED_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s+(.*)$").unwrap());

const WORDS_PER_MINUTE: usize = 200;

/// Generate a URL slug from a title.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(lowered.trim(), "");
    let hyphenated = SEPARATOR_RE.replace_all(&stripped, "-");
    hyphenated.trim_matches('-').to_string()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated reading time, floored at one minute.
pub fn read_time(word_count: usize) -> String {
    let minutes = word_count.div_ceil(WORDS_PER_MINUTE).max(1);
    format!("{minutes} min read")
}

/// Choose the category for a generated article: the admin's pick when it is
/// one of the configured categories, otherwise the rotation slot.
pub fn pick_category<'a>(
    requested: Option<&'a str>,
    configured: &'a [String],
    idea_index: i64,
) -> &'a str {
    if let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) {
        if configured.iter().any(|c| c == requested) {
            return requested;
        }
    }
    let slot = ((idea_index - 1).max(0) as usize) % configured.len();
    &configured[slot]
}

/// Convert markdown to the CMS's rich-text block array.
///
/// Line-oriented: headings, blockquotes, bullet and numbered list items each
/// become one block; consecutive plain lines merge into paragraphs.
/// `**strong**` runs become marked spans. Anything fancier passes through as
/// plain text.
pub fn markdown_to_rich_text(markdown: &str) -> Value {
    let mut blocks: Vec<Value> = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();

    let flush = |paragraph: &mut Vec<String>, blocks: &mut Vec<Value>| {
        if !paragraph.is_empty() {
            let text = paragraph.join(" ");
            blocks.push(block("normal", None, &text));
            paragraph.clear();
        }
    };

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("### ") {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block("h3", None, rest));
        } else if let Some(rest) = trimmed.strip_prefix("## ") {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block("h2", None, rest));
        } else if let Some(rest) = trimmed.strip_prefix("# ") {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block("h1", None, rest));
        } else if let Some(rest) = trimmed.strip_prefix("> ") {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block("blockquote", None, rest));
        } else if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block("normal", Some("bullet"), rest));
        } else if let Some(caps) = ORDERED_ITEM_RE.captures(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block("normal", Some("number"), &caps[1]));
        } else {
            paragraph.push(trimmed.to_string());
        }
    }
    flush(&mut paragraph, &mut blocks);

    Value::Array(blocks)
}

fn block(style: &str, list_item: Option<&str>, text: &str) -> Value {
    let mut b = json!({
        "_type": "block",
        "style": style,
        "markDefs": [],
        "children": spans(text),
    });
    if let Some(list_item) = list_item {
        b["listItem"] = json!(list_item);
        b["level"] = json!(1);
    }
    b
}

/// Split a line into spans, marking `**strong**` runs.
fn spans(text: &str) -> Value {
    let mut children: Vec<Value> = Vec::new();
    let mut last = 0;
    for caps in STRONG_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        if whole.start() > last {
            children.push(span(&text[last..whole.start()], &[]));
        }
        children.push(span(&caps[1], &["strong"]));
        last = whole.end();
    }
    if last < text.len() {
        children.push(span(&text[last..], &[]));
    }
    if children.is_empty() {
        children.push(span("", &[]));
    }
    Value::Array(children)
}

fn span(text: &str, marks: &[&str]) -> Value {
    json!({ "_type": "span", "text": text, "marks": marks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("On Widgets"), "on-widgets");
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("Under_scores and--dashes"), "under-scores-and-dashes");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn read_time_rounds_up() {
        assert_eq!(read_time(0), "1 min read");
        assert_eq!(read_time(199), "1 min read");
        assert_eq!(read_time(201), "2 min read");
        assert_eq!(read_time(1000), "5 min read");
    }

    #[test]
    fn count_words_ignores_extra_whitespace() {
        assert_eq!(count_words("one  two\n three\t"), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn pick_category_prefers_valid_request() {
        let configured = vec!["Applied AI".to_string(), "Developer Tooling".to_string()];
        assert_eq!(
            pick_category(Some("Developer Tooling"), &configured, 1),
            "Developer Tooling"
        );
        // Unknown requests fall back to the rotation slot.
        assert_eq!(pick_category(Some("Gardening"), &configured, 1), "Applied AI");
        assert_eq!(pick_category(None, &configured, 2), "Developer Tooling");
        // Rotation wraps around the configured list.
        assert_eq!(pick_category(None, &configured, 3), "Applied AI");
        assert_eq!(pick_category(Some("   "), &configured, 1), "Applied AI");
    }

    #[test]
    fn markdown_headings_and_paragraphs() {
        let md = "# Title\n\nFirst line\nsecond line\n\n## Section\n\nBody.";
        let blocks = markdown_to_rich_text(md);
        let blocks = blocks.as_array().unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0]["style"], "h1");
        assert_eq!(blocks[0]["children"][0]["text"], "Title");
        // Consecutive plain lines merge into one paragraph.
        assert_eq!(blocks[1]["style"], "normal");
        assert_eq!(blocks[1]["children"][0]["text"], "First line second line");
        assert_eq!(blocks[2]["style"], "h2");
        assert_eq!(blocks[3]["children"][0]["text"], "Body.");
    }

    #[test]
    fn markdown_lists_and_quotes() {
        let md = "> wise words\n\n- first\n* second\n1. third\n2. fourth";
        let blocks = markdown_to_rich_text(md);
        let blocks = blocks.as_array().unwrap();
        assert_eq!(blocks[0]["style"], "blockquote");
        assert_eq!(blocks[1]["listItem"], "bullet");
        assert_eq!(blocks[2]["listItem"], "bullet");
        assert_eq!(blocks[2]["children"][0]["text"], "second");
        assert_eq!(blocks[3]["listItem"], "number");
        assert_eq!(blocks[4]["children"][0]["text"], "fourth");
    }

    #[test]
    fn strong_runs_become_marked_spans() {
        let blocks = markdown_to_rich_text("plain **bold** tail");
        let children = blocks[0]["children"].as_array().unwrap().clone();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0]["text"], "plain ");
        assert_eq!(children[0]["marks"].as_array().unwrap().len(), 0);
        assert_eq!(children[1]["text"], "bold");
        assert_eq!(children[1]["marks"][0], "strong");
        assert_eq!(children[2]["text"], " tail");
    }

    #[test]
    fn empty_markdown_yields_no_blocks() {
        let blocks = markdown_to_rich_text("\n\n   \n");
        assert_eq!(blocks.as_array().unwrap().len(), 0);
    }
}
