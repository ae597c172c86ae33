//! Markdown table block to HTML table conversion.

use std::sync::LazyLock;

use regex::Regex;

/// Header/body delimiter row, e.g. `|---|:---:|`.
static SEPARATOR_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|[\s\-:|]+\|$").expect("valid separator row pattern"));

const TABLE_OPEN: &str = r#"<table class="markdown-table" style="margin-top:0;">"#;

/// Converts a pipe-table block into an HTML table.
///
/// Lines before the first `|`-prefixed line are dropped, as are any later
/// lines that do not start with `|`. Separator rows are removed; the first
/// surviving row becomes the header and the rest become body rows. Empty
/// cells are dropped.
///
/// Returns an empty string when no pipe row survives.
///
/// Cell text is inserted verbatim. The caller escapes the text around the
/// table, not the cells.
pub fn table_to_html(block: &str) -> String {
    let normalized = block.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').map(str::trim).collect();

    let Some(start) = lines.iter().position(|line| line.starts_with('|')) else {
        return String::new();
    };

    let data_rows: Vec<&str> = lines[start..]
        .iter()
        .copied()
        .filter(|line| line.starts_with('|'))
        .filter(|line| !SEPARATOR_ROW.is_match(line))
        .collect();

    let Some((header, body)) = data_rows.split_first() else {
        return String::new();
    };

    let mut html = String::from(TABLE_OPEN);

    html.push_str("<thead><tr>");
    for cell in split_cells(header) {
        html.push_str("<th>");
        html.push_str(cell);
        html.push_str("</th>");
    }
    html.push_str("</tr></thead>");

    if !body.is_empty() {
        html.push_str("<tbody>");
        for row in body {
            html.push_str("<tr>");
            for cell in split_cells(row) {
                html.push_str("<td>");
                html.push_str(cell);
                html.push_str("</td>");
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody>");
    }

    html.push_str("</table>");
    html
}

fn split_cells(row: &str) -> impl Iterator<Item = &str> {
    row.split('|').map(str::trim).filter(|cell| !cell.is_empty())
}
