//! Rate extraction from the credit union's home-loans page.
//!
//! Markup contract (current page layout):
//! - rates live in `<table class="co-rates_table">`
//! - each product is a `<tr class="co-rates_table--row">`
//! - the first `<td>` holds the product label, the second holds one or more
//!   `<p>` elements, one of which is the rate ending in `%`
//!
//! When the page changes, update the constants and [`rate_text_from_row`] here;
//! nothing outside this module knows about the markup.

use rate_core::RateError;

pub const RATES_TABLE_CLASS: &str = "co-rates_table";
pub const RATE_ROW_CLASS: &str = "co-rates_table--row";

/// Find the rate for `term` (case-insensitive substring of the row label).
pub fn extract_rate(document: &str, term: &str) -> Result<f64, RateError> {
    let table = elements(document, "table", true)
        .into_iter()
        .find(|t| has_class(t.attrs, RATES_TABLE_CLASS))
        .ok_or_else(|| RateError::Extraction("Rates table not found in the HTML".to_string()))?;

    let needle = term.trim().to_lowercase();
    for row in elements(table.inner, "tr", true) {
        if !has_class(row.attrs, RATE_ROW_CLASS) {
            continue;
        }
        if let Some(text) = rate_text_from_row(&row, &needle) {
            return parse_percentage(&text);
        }
    }

    Err(RateError::Extraction(format!(
        "{} not found in the rates table",
        term
    )))
}

fn rate_text_from_row(row: &Element<'_>, needle: &str) -> Option<String> {
    let cells = elements(row.inner, "td", false);
    let label = text(cells.first()?.inner).to_lowercase();
    if !label.contains(needle) {
        return None;
    }
    elements(cells.get(1)?.inner, "p", true)
        .into_iter()
        .map(|p| text(p.inner))
        .find(|t| t.ends_with('%'))
}

fn parse_percentage(raw: &str) -> Result<f64, RateError> {
    let value: f64 = raw
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| RateError::Extraction(format!("Could not convert rate to float: {raw:?}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(RateError::Extraction(format!(
            "Rate out of range: {raw:?}"
        )));
    }
    Ok(value)
}

#[derive(Debug)]
struct Element<'a> {
    /// Raw text between the tag name and the closing `>` of the open tag.
    attrs: &'a str,
    inner: &'a str,
}

/// Collect `<tag>` elements in document order.
///
/// With `descend` set, elements nested inside earlier matches are returned
/// too; otherwise scanning resumes after each match's closing tag.
fn elements<'a>(html: &'a str, tag: &str, descend: bool) -> Vec<Element<'a>> {
    // ASCII lowercasing keeps byte offsets identical to `html`.
    let lower = html.to_ascii_lowercase();
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}", tag.to_ascii_lowercase());

    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(start) = find_tag(&lower, &open_pat, pos) {
        let attrs_start = start + open_pat.len();
        let Some(open_end) = open_tag_end(html, attrs_start) else {
            break;
        };
        let attrs = html[attrs_start..open_end].trim_end_matches('/');
        let inner_start = open_end + 1;

        let (inner_end, after) = match find_close(&lower, &open_pat, &close_pat, inner_start) {
            Some(close_start) => {
                let close_end = lower[close_start..]
                    .find('>')
                    .map(|i| close_start + i + 1)
                    .unwrap_or(lower.len());
                (close_start, close_end)
            }
            // Unclosed element: runs until the next sibling or the end.
            None => {
                let end = find_tag(&lower, &open_pat, inner_start).unwrap_or(lower.len());
                (end, end)
            }
        };

        out.push(Element {
            attrs,
            inner: &html[inner_start..inner_end],
        });
        pos = if descend { inner_start } else { after };
    }
    out
}

/// Find `pat` (`<tag` or `</tag`) followed by a tag-name boundary.
fn find_tag(lower: &str, pat: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(rel) = lower.get(pos..)?.find(pat) {
        let start = pos + rel;
        match lower.as_bytes().get(start + pat.len()) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(start),
            None => return None,
            _ => pos = start + pat.len(),
        }
    }
    None
}

fn find_close(lower: &str, open_pat: &str, close_pat: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = from;
    loop {
        let close = find_tag(lower, close_pat, pos)?;
        match find_tag(lower, open_pat, pos) {
            Some(open) if open < close => {
                depth += 1;
                pos = open + open_pat.len();
            }
            _ => {
                if depth == 0 {
                    return Some(close);
                }
                depth -= 1;
                pos = close + close_pat.len();
            }
        }
    }
}

/// Index of the `>` ending an open tag, skipping quoted attribute values.
fn open_tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, b) in html.as_bytes().iter().enumerate().skip(from) {
        match (quote, *b) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(*b),
            (None, b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn has_class(attrs: &str, class: &str) -> bool {
    attribute(attrs, "class")
        .map(|value| value.split_ascii_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let bytes = attrs.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    while i < len {
        while i < len && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let key_start = i;
        while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' && bytes[i] != b'/' {
            i += 1;
        }
        let key = &attrs[key_start..i];
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = "";
        if i < len && bytes[i] == b'=' {
            i += 1;
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let value_start = i;
                while i < len && bytes[i] != quote {
                    i += 1;
                }
                value = &attrs[value_start..i];
                i = (i + 1).min(len);
            } else {
                let value_start = i;
                while i < len && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = &attrs[value_start..i];
            }
        } else if key.is_empty() {
            // Stray '=' with no name.
            i += 1;
            continue;
        }

        if key.eq_ignore_ascii_case(name) {
            return Some(value);
        }
    }
    None
}

/// Visible text of an HTML fragment with whitespace collapsed.
fn text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&#37;", "%")
        .replace("&percnt;", "%")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
