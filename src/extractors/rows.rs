// src/extractors/rows.rs
use crate::extractors::columns::ColumnMap;
use crate::extractors::fields::{FieldKey, FieldValues, Record};
use crate::extractors::sanitize::{clean_cell, content_anchors, first_anchor_label};
use crate::extractors::section::TableHandle;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));

static HEAD_ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead tr").expect("Failed to compile HEAD_ROW_SELECTOR"));

// --- Table structure helpers ---

/// True when `element`'s closest enclosing table is `table`.
fn belongs_to(element: ElementRef, table: ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
        .map_or(false, |t| t.id() == table.id())
}

/// Rows of the table itself, skipping rows of nested tables.
pub fn own_rows<'a>(table: TableHandle<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    let element = table.element();
    element.select(&ROW_SELECTOR).filter(move |tr| belongs_to(*tr, element))
}

/// Direct cells of a row with the given tag name.
pub fn cells_named<'a>(row: ElementRef<'a>, tag: &'static str) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == tag)
        .collect()
}

/// Header cell texts: first `thead` row, else the first row; `th` cells, else `td`.
pub fn header_row(table: TableHandle) -> Vec<String> {
    let element = table.element();
    let row = element
        .select(&HEAD_ROW_SELECTOR)
        .find(|tr| belongs_to(*tr, element))
        .or_else(|| own_rows(table).next());
    let Some(row) = row else {
        return Vec::new();
    };

    let mut cells = cells_named(row, "th");
    if cells.is_empty() {
        cells = cells_named(row, "td");
    }
    cells.into_iter().map(clean_cell).collect()
}

/// Rows after the first one, in document order.
pub fn data_rows<'a>(table: TableHandle<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    own_rows(table).skip(1)
}

/// `td` count of the first data row; drives the positional fallback.
pub fn first_row_cell_count(table: TableHandle) -> usize {
    data_rows(table)
        .next()
        .map_or(0, |row| cells_named(row, "td").len())
}

// --- Relevance ---

/// Decides whether a well-formed row belongs in the output.
/// Implementations may fill empty fields from the row's cells.
pub trait RelevanceFilter {
    fn admit(&self, cells: &[ElementRef], fields: &mut FieldValues) -> bool;
}

impl<F> RelevanceFilter for F
where
    F: Fn(&[ElementRef], &mut FieldValues) -> bool,
{
    fn admit(&self, cells: &[ElementRef], fields: &mut FieldValues) -> bool {
        self(cells, fields)
    }
}

/// Declarative relevance rules usable from task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceRule {
    /// Every well-formed row qualifies.
    Always,
    /// All listed fields must be non-empty.
    RequireFields(Vec<FieldKey>),
    /// Some cell, or `field` if given, must mention `keyword` (case-insensitive).
    /// The first mentioning cell fills `backfill` when that field is empty.
    Mentions {
        keyword: String,
        #[serde(default)]
        field: Option<FieldKey>,
        #[serde(default)]
        backfill: Option<FieldKey>,
    },
}

impl RelevanceFilter for RelevanceRule {
    fn admit(&self, cells: &[ElementRef], fields: &mut FieldValues) -> bool {
        match self {
            RelevanceRule::Always => true,
            RelevanceRule::RequireFields(required) => required.iter().all(|f| !fields.get(*f).is_empty()),
            RelevanceRule::Mentions { keyword, field, backfill } => {
                let keyword = keyword.to_lowercase();
                let mentioning = cells
                    .iter()
                    .find(|c| c.text().collect::<String>().to_lowercase().contains(&keyword));

                if let (Some(cell), Some(target)) = (mentioning, backfill) {
                    if fields.get(*target).is_empty() {
                        fields.set(*target, clean_cell(*cell));
                    }
                }

                mentioning.is_some()
                    || field.map_or(false, |f| fields.get(f).to_lowercase().contains(&keyword))
            }
        }
    }
}

// --- Row extraction ---

/// Where a field's value comes from when it is not read from its own column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedSource {
    /// The target label the table was found under.
    Label,
    /// The first link target in the column mapped to another field.
    LinkOf(FieldKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedField {
    pub field: FieldKey,
    pub source: DerivedSource,
}

/// Per-task row settings shared by every table of one harvest.
#[derive(Debug, Clone, Copy)]
pub struct RowSpec<'c> {
    pub fields: &'c [FieldKey],
    pub derived: &'c [DerivedField],
    /// Field naming the row's subject; retried from its cell's first link when empty.
    pub subject: Option<FieldKey>,
    pub base_url: &'c Url,
}

/// Resolves `href` against `base` the way a browser would. `None` for unparseable links.
pub fn absolutize(href: &str, base: &Url) -> Option<String> {
    match base.join(href.trim()) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::trace!("Cannot resolve link '{}' against {}: {}", href, base, e);
            None
        }
    }
}

/// Walks the data rows of one table and emits qualifying records.
pub struct RowExtractor<'a, 'c> {
    table: TableHandle<'a>,
    columns: &'c ColumnMap,
    spec: RowSpec<'c>,
    filter: &'c dyn RelevanceFilter,
    label: &'c str,
}

impl<'a, 'c> RowExtractor<'a, 'c> {
    pub fn new(
        table: TableHandle<'a>,
        columns: &'c ColumnMap,
        spec: RowSpec<'c>,
        filter: &'c dyn RelevanceFilter,
        label: &'c str,
    ) -> Self {
        Self { table, columns, spec, filter, label }
    }

    /// Lazily extracts records. Each call walks the table again from the top.
    pub fn rows(&self) -> Rows<'_, 'a, 'c> {
        Rows {
            extractor: self,
            remaining: data_rows(self.table).collect::<Vec<_>>().into_iter(),
        }
    }

    fn cell_for<'r>(&self, cells: &[ElementRef<'r>], field: FieldKey) -> Option<ElementRef<'r>> {
        self.columns
            .index_of(field)
            .and_then(|i| cells.get(i).copied())
    }

    fn extract_row(&self, row: ElementRef) -> Option<Record> {
        let cells = cells_named(row, "td");
        if cells.len() < 2 {
            tracing::trace!("Skipping row with {} cells under '{}'", cells.len(), self.label);
            return None;
        }

        let mut fields = FieldValues::empty(self.spec.fields);
        for field in self.spec.fields {
            if let Some(cell) = self.cell_for(&cells, *field) {
                fields.set(*field, clean_cell(cell));
            }
        }

        for derived in self.spec.derived {
            let value = match &derived.source {
                DerivedSource::Label => self.label.trim().to_string(),
                DerivedSource::LinkOf(from) => self
                    .cell_for(&cells, *from)
                    .and_then(|cell| content_anchors(cell).next())
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| absolutize(href, self.spec.base_url))
                    .unwrap_or_default(),
            };
            fields.set(derived.field, value);
        }

        if !self.filter.admit(&cells, &mut fields) {
            tracing::trace!("Row not relevant under '{}'", self.label);
            return None;
        }

        if let Some(subject) = self.spec.subject {
            if fields.get(subject).is_empty() {
                if let Some(text) = self.cell_for(&cells, subject).and_then(first_anchor_label) {
                    fields.set(subject, text);
                }
            }
        }

        Some(fields.freeze())
    }
}

/// Records of one table, produced row by row.
pub struct Rows<'s, 'a, 'c> {
    extractor: &'s RowExtractor<'a, 'c>,
    remaining: std::vec::IntoIter<ElementRef<'a>>,
}

impl Iterator for Rows<'_, '_, '_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.remaining
            .by_ref()
            .find_map(|row| self.extractor.extract_row(row))
    }
}
