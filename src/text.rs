//! Plain-text rendering of stored HTML for full-text indexing.
//!
//! Remote statuses and account notes arrive as sanitized HTML. The search
//! engine only needs the words, so block boundaries become newlines, tags are
//! dropped, and the handful of entities the sanitizer emits are decoded.

use regex::Regex;
use std::sync::OnceLock;

static BLOCK_BREAK: OnceLock<Regex> = OnceLock::new();
static TAG: OnceLock<Regex> = OnceLock::new();
static BLANK_RUN: OnceLock<Regex> = OnceLock::new();

fn block_break_regex() -> &'static Regex {
    BLOCK_BREAK.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</p>\s*<p[^>]*>|</?(?:p|div|li|blockquote|h[1-6])[^>]*>")
            .expect("Invalid block break regex")
    })
}

fn tag_regex() -> &'static Regex {
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"))
}

fn blank_run_regex() -> &'static Regex {
    BLANK_RUN.get_or_init(|| Regex::new(r"\n{3,}").expect("Invalid blank run regex"))
}

/// Convert an HTML fragment to indexable plain text.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let with_breaks = block_break_regex().replace_all(html, "\n\n");
    let stripped = tag_regex().replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let lines: Vec<&str> = decoded.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");

    blank_run_regex()
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Join non-empty parts with blank lines.
pub fn join_paragraphs<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        // last, so "&amp;lt;" stays "&lt;"
        .replace("&amp;", "&")
}
