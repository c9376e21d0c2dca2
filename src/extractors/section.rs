// src/extractors/section.rs

// --- Imports ---
use crate::extractors::sanitize::{heading_text, normalize_ws};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE_SELECTOR"));

static CAPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("caption").expect("Failed to compile CAPTION_SELECTOR"));

// Wrapper classes some skins put around headings; the scan starts after the wrapper.
const HEADING_WRAPPER_CLASS: &str = "mw-heading";

// --- Data Structures ---

/// A located table. Borrowed from the document; never outlives it.
#[derive(Debug, Clone, Copy)]
pub struct TableHandle<'a>(ElementRef<'a>);

impl<'a> TableHandle<'a> {
    pub fn element(&self) -> ElementRef<'a> {
        self.0
    }

    /// Lower-cased, whitespace-normalized caption text ("" when there is no caption).
    pub fn caption(&self) -> String {
        caption_text(self.0)
    }
}

/// How a target label is found in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Label equals the text of a heading-like element; the table follows it.
    Heading { selector: String },
    /// Label is a phrase contained in the table's caption.
    Caption,
}

/// Predicate deciding whether a table is the one a label refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMatcher {
    /// Required marker class, e.g. "wikitable".
    #[serde(default)]
    pub class: Option<String>,
    /// Accepted caption phrases (matched lower-cased). Empty means any caption.
    /// In caption mode these are alternatives for the `alias_of` label only.
    #[serde(default)]
    pub caption_phrases: Vec<String>,
    /// Label whose caption may also read as one of `caption_phrases`.
    #[serde(default)]
    pub alias_of: Option<String>,
    /// Maximum number of sibling elements to scan after a heading.
    #[serde(default)]
    pub scan_limit: Option<usize>,
}

impl TableMatcher {
    pub fn matches(&self, table: ElementRef) -> bool {
        if table.value().name() != "table" {
            return false;
        }
        if let Some(class) = &self.class {
            if !table.value().classes().any(|c| c == class) {
                return false;
            }
        }
        if self.caption_phrases.is_empty() {
            return true;
        }
        let caption = caption_text(table);
        self.caption_phrases
            .iter()
            .any(|phrase| caption.contains(&phrase.to_lowercase()))
    }

    /// Matcher for one caption-mode label: the label itself, plus the aliases
    /// when the label is the one they were configured for.
    fn for_caption_label(&self, label: &str) -> Self {
        let wanted = normalize_ws(label).to_lowercase();
        let mut phrases = vec![wanted.clone()];
        let aliased = self
            .alias_of
            .as_deref()
            .map_or(false, |target| normalize_ws(target).to_lowercase() == wanted);
        if aliased {
            phrases.extend(self.caption_phrases.iter().map(|p| p.to_lowercase()));
        }
        Self { caption_phrases: phrases, ..self.clone() }
    }
}

fn caption_text(table: ElementRef) -> String {
    table
        .select(&CAPTION_SELECTOR)
        .next()
        .map(|c| normalize_ws(&c.text().collect::<String>()).to_lowercase())
        .unwrap_or_default()
}

// --- Locator ---

/// Finds the one table belonging to a label.
pub struct SectionLocator {
    anchor: Anchor,
    heading_selector: Option<Selector>,
    matcher: TableMatcher,
}

impl SectionLocator {
    pub fn new(anchor: Anchor, matcher: TableMatcher) -> Result<Self, ExtractError> {
        let heading_selector = match &anchor {
            Anchor::Heading { selector } => Some(Selector::parse(selector).map_err(|e| {
                ExtractError::InvalidSelector {
                    selector: selector.clone(),
                    reason: e.to_string(),
                }
            })?),
            Anchor::Caption => None,
        };
        Ok(Self { anchor, heading_selector, matcher })
    }

    /// Returns the table for `label`, or `None` when the label or its table is absent.
    pub fn locate<'a>(&self, document: &'a Html, label: &str) -> Option<TableHandle<'a>> {
        match (&self.anchor, &self.heading_selector) {
            (Anchor::Heading { .. }, Some(selector)) => self.locate_after_heading(document, selector, label),
            _ => self.locate_by_caption(document, label),
        }
    }

    fn locate_after_heading<'a>(
        &self,
        document: &'a Html,
        selector: &Selector,
        label: &str,
    ) -> Option<TableHandle<'a>> {
        let wanted = label.trim();
        let heading = document
            .select(selector)
            .find(|h| heading_text(*h) == wanted)?;
        tracing::trace!("Found heading <{}> for label '{}'", heading.value().name(), label);

        let container = structural_container(heading);
        let limit = self.matcher.scan_limit.unwrap_or(usize::MAX);

        for sibling in container
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take(limit)
        {
            if self.matcher.matches(sibling) {
                tracing::debug!("Label '{}' resolved to sibling table", label);
                return Some(TableHandle(sibling));
            }
            if let Some(nested) = sibling.select(&TABLE_SELECTOR).find(|t| self.matcher.matches(*t)) {
                tracing::debug!("Label '{}' resolved to table nested in <{}>", label, sibling.value().name());
                return Some(TableHandle(nested));
            }
        }

        tracing::debug!("Heading for '{}' found but no matching table follows it", label);
        None
    }

    fn locate_by_caption<'a>(&self, document: &'a Html, label: &str) -> Option<TableHandle<'a>> {
        if label.trim().is_empty() {
            return None;
        }
        let matcher = self.matcher.for_caption_label(label);
        let found = document
            .select(&TABLE_SELECTOR)
            .find(|t| matcher.matches(*t))
            .map(TableHandle);
        match &found {
            Some(table) => tracing::debug!("Label '{}' resolved to table captioned '{}'", label, table.caption()),
            None => tracing::debug!("No table caption matches '{}'", label),
        }
        found
    }
}

/// The node whose following siblings hold the section content.
fn structural_container(heading: ElementRef) -> ElementRef {
    heading
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|p| p.value().classes().any(|c| c == HEADING_WRAPPER_CLASS))
        .unwrap_or(heading)
}
