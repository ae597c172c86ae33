//! Restricted markdown to HTML rendering for answers.
//!
//! [`render`] runs a fixed sequence of pure text stages. The order matters:
//!
//! 1. strip leading whitespace
//! 2. drop preamble lines before the first line containing `|`
//! 3. strip `[Source N]` citation markers
//! 4. lift pipe-table blocks out behind placeholder tokens
//! 5. escape `&`, `<`, `>`
//! 6. put the pre-rendered tables back
//! 7. headings
//! 8. inline markup (strong, emphasis, fenced code, inline code)
//! 9. unordered list items, first run wrapped in `<ul>`
//! 10. ordered list items (not wrapped)
//! 11. paragraph breaks, then line breaks
//! 12. cleanup around tables and empty paragraphs
//! 13. outer paragraph wrapper
//!
//! Tables are extracted before escaping so their markup survives, and
//! escaping runs exactly once. Citations are removed before escaping because
//! brackets are never escaped.

mod table;

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub use table::table_to_html;

/// Renders answer text into an HTML fragment.
///
/// Pure and total: malformed markdown degrades to escaped literal text.
/// Cheap enough to call on every streamed delta.
pub fn render(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = strip_leading_whitespace(text);
    let text = drop_table_preamble(text);
    let text = strip_citations(text);
    let (text, tables) = extract_tables(&text);
    let text = escape_html(&text);
    let text = restore_tables(text, &tables);
    let text = headings(&text);
    let text = inline_markup(&text);
    let text = unordered_lists(&text);
    let text = ordered_lists(&text);
    let text = line_breaks(&text);
    let text = cleanup(&text);
    wrap_paragraph(text)
}

static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[source\s+\d+\]").expect("valid citation pattern"));
static TABLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^\|.+\|[ \t\r]*$\n?)+").expect("valid table block pattern")
});
static H3: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^### (.+)$").expect("valid h3 pattern"));
static H2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^## (.+)$").expect("valid h2 pattern"));
static H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid h1 pattern"));
static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid strong pattern"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.+?)\*").expect("valid emphasis pattern"));
static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.+?)```").expect("valid code block pattern"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(.+?)`").expect("valid inline code pattern"));
static UNORDERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*[-*+][ \t]+(.+)$").expect("valid list item pattern"));
static ORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+(.+)$").expect("valid ordered item pattern")
});
static BREAKS_BEFORE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:<br>\s*)+(<table)").expect("valid cleanup pattern"));
static BREAKS_AFTER_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(</table>)\s*(?:<br>)+").expect("valid cleanup pattern"));
static PARAGRAPH_BEFORE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p>\s*(<table)").expect("valid cleanup pattern"));
static PARAGRAPH_AFTER_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(</table>)\s*</p>").expect("valid cleanup pattern"));
static EMPTY_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p>\s*</p>").expect("valid cleanup pattern"));
static BREAK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:<br>\s*){2,}<br>").expect("valid cleanup pattern"));

/// Stage 1.
fn strip_leading_whitespace(text: &str) -> &str {
    text.trim_start()
}

/// Stage 2: when the text contains a pipe, everything before the first line
/// containing one is conversational preamble and is dropped.
fn drop_table_preamble(text: &str) -> &str {
    if !text.contains('|') {
        return text;
    }
    let mut offset = 0;
    for line in text.split('\n') {
        if line.contains('|') {
            return &text[offset..];
        }
        offset += line.len() + 1;
    }
    text
}

/// Stage 3: removes `[Source N]`, any case.
fn strip_citations(text: &str) -> Cow<'_, str> {
    CITATION.replace_all(text, "")
}

fn placeholder(index: usize) -> String {
    format!("\u{FFFC}TABLE{index}\u{FFFC}")
}

/// Stage 4: replaces each run of `|...|` lines with a placeholder and
/// returns the rendered tables in placeholder order.
fn extract_tables(text: &str) -> (String, Vec<String>) {
    let mut tables = Vec::new();
    let replaced = TABLE_BLOCK.replace_all(text, |caps: &Captures<'_>| {
        let token = placeholder(tables.len());
        tables.push(table_to_html(&caps[0]));
        token
    });
    (replaced.into_owned(), tables)
}

/// Stage 5: `&`, `<` and `>` only.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Stage 6: the restored markup is already HTML and is not escaped again.
fn restore_tables(mut text: String, tables: &[String]) -> String {
    for (index, html) in tables.iter().enumerate() {
        text = text.replacen(&placeholder(index), html, 1);
    }
    text
}

/// Stage 7.
fn headings(text: &str) -> String {
    let text = H3.replace_all(text, "<h3>${1}</h3>");
    let text = H2.replace_all(&text, "<h2>${1}</h2>");
    H1.replace_all(&text, "<h1>${1}</h1>").into_owned()
}

/// Stage 8. All four patterns are non-greedy; only fenced code spans lines.
fn inline_markup(text: &str) -> String {
    let text = STRONG.replace_all(text, "<strong>${1}</strong>");
    let text = EMPHASIS.replace_all(&text, "<em>${1}</em>");
    let text = CODE_BLOCK.replace_all(&text, "<pre><code>${1}</code></pre>");
    INLINE_CODE.replace_all(&text, "<code>${1}</code>").into_owned()
}

/// Stage 9: `-`, `*` or `+` items become `<li>`; only the first contiguous
/// run of items is wrapped in `<ul>`.
fn unordered_lists(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut first_run: Option<(usize, usize)> = None;
    let mut run_closed = false;

    for (index, line) in text.split('\n').enumerate() {
        if let Some(caps) = UNORDERED_ITEM.captures(line) {
            lines.push(format!("<li>{}</li>", &caps[1]));
            if !run_closed {
                first_run = match first_run {
                    Some((start, _)) => Some((start, index)),
                    None => Some((index, index)),
                };
            }
        } else {
            lines.push(line.to_string());
            if first_run.is_some() {
                run_closed = true;
            }
        }
    }

    if let Some((start, end)) = first_run {
        lines[start].insert_str(0, "<ul>");
        lines[end].push_str("</ul>");
    }
    lines.join("\n")
}

/// Stage 10: numbered items become bare `<li>` elements.
fn ordered_lists(text: &str) -> String {
    ORDERED_ITEM.replace_all(text, "<li>${1}</li>").into_owned()
}

/// Stage 11: blank lines split paragraphs, remaining newlines become `<br>`.
fn line_breaks(text: &str) -> String {
    text.replace("\n\n", "</p><p>").replace('\n', "<br>")
}

/// Stage 12.
fn cleanup(text: &str) -> String {
    let text = BREAKS_BEFORE_TABLE.replace_all(text, "${1}");
    let text = BREAKS_AFTER_TABLE.replace_all(&text, "${1}");
    let text = PARAGRAPH_BEFORE_TABLE.replace_all(&text, "${1}");
    let text = PARAGRAPH_AFTER_TABLE.replace_all(&text, "${1}");
    let text = EMPTY_PARAGRAPH.replace_all(&text, "");
    BREAK_RUN.replace_all(&text, "<br>").into_owned()
}

/// Stage 13: output led by a table is returned bare; output led by any
/// other block element is returned as is; everything else gets one `<p>`.
fn wrap_paragraph(text: String) -> String {
    const BLOCK_PREFIXES: [&str; 5] = ["<h", "<ul", "<ol", "<pre", "<table"];

    if text.trim_start().starts_with("<table") {
        return text;
    }
    if BLOCK_PREFIXES.iter().any(|prefix| text.starts_with(prefix)) {
        text
    } else {
        format!("<p>{text}</p>")
    }
}
