// src/extractors/sanitize.rs
//! Cell text normalization. Every function here returns a string; none can fail.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

static FOOTNOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+\]").expect("Failed to compile FOOTNOTE_RE"));

// Editor links appended to headings, e.g. "Flyweights[edit]" or "[ edit ]".
static EDIT_FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[\s*edit\s*\]").expect("Failed to compile EDIT_FRAGMENT_RE"));

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("Failed to compile ANCHOR_SELECTOR"));

/// Collapses whitespace runs (including non-breaking spaces) and trims.
pub fn normalize_ws(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes `[<digits>]` footnote markers and normalizes whitespace.
pub fn clean_text(raw: &str) -> String {
    normalize_ws(&FOOTNOTE_RE.replace_all(raw, ""))
}

/// Heading text as compared against a target label: editor fragment removed, trimmed.
pub fn heading_text(element: ElementRef) -> String {
    let raw = element.text().collect::<String>();
    normalize_ws(&EDIT_FRAGMENT_RE.replace_all(&raw, ""))
}

/// Anchors that carry content, excluding footnote links inside `<sup>`.
pub fn content_anchors<'a>(cell: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    cell.select(&ANCHOR_SELECTOR).filter(move |a| !inside_sup(*a, cell))
}

fn inside_sup(anchor: ElementRef, cell: ElementRef) -> bool {
    for node in anchor.ancestors() {
        if node.id() == cell.id() {
            return false;
        }
        if let Some(el) = ElementRef::wrap(node) {
            if el.value().name() == "sup" {
                return true;
            }
        }
    }
    false
}

/// Label of the first content anchor in `cell`: its sanitized text, or its
/// `title` attribute when the link wraps only an image or other textless markup.
pub fn first_anchor_label(cell: ElementRef) -> Option<String> {
    let anchor = content_anchors(cell).next()?;
    let text = clean_text(&anchor.text().collect::<String>());
    if !text.is_empty() {
        return Some(text);
    }
    anchor
        .value()
        .attr("title")
        .map(clean_text)
        .filter(|title| !title.is_empty())
}

/// Sanitized text of a table cell.
///
/// When the cell holds exactly one content link and that link's text makes up
/// at least half of the cell, the link text is returned instead of the cell
/// text, which drops flag icons, qualifiers, and similar decoration around it.
pub fn clean_cell(cell: ElementRef) -> String {
    let text = clean_text(&cell.text().collect::<String>());

    let mut anchors = content_anchors(cell);
    let (Some(only), None) = (anchors.next(), anchors.next()) else {
        return text;
    };

    let link_text = clean_text(&only.text().collect::<String>());
    if !link_text.is_empty() && link_text.chars().count() * 2 >= text.chars().count() {
        link_text
    } else {
        text
    }
}
