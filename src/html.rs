//! Small helpers over the `scraper` DOM shared by the listing and retailer
//! parsers.

use scraper::{ElementRef, Html, Selector};

use crate::ScrapeError;

/// Parses a CSS selector string, returning a [`ScrapeError`] on failure.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if `selector` is not valid CSS.
pub fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Parse(format!("invalid CSS selector '{selector}': {e}")))
}

/// Collapses runs of whitespace into single spaces.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element with whitespace collapsed.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first element matching the first selector that yields
/// non-empty text, or an empty string.
#[must_use]
pub fn text_from_selectors(root: ElementRef<'_>, selectors: &[&str]) -> String {
    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str)
            && let Some(element) = root.select(&selector).next()
        {
            let cleaned = element_text(element);
            if !cleaned.is_empty() {
                return cleaned;
            }
        }
    }
    String::new()
}

/// Text of the document's `<title>`, whitespace collapsed.
#[must_use]
pub fn document_title(document: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|selector| document.select(&selector).next().map(element_text))
        .unwrap_or_default()
}

/// Text of an element with any `<sup>` subtrees left out, so a price
/// rendered as `$24<sup>95</sup>` reads as `$24`.
#[must_use]
pub fn text_without_sup(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child)
            && !child_element.value().name().eq_ignore_ascii_case("sup")
        {
            out.push_str(&text_without_sup(child_element));
        }
    }
    out
}
