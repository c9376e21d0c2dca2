// src/extractors/columns.rs
use crate::extractors::fields::FieldKey;
use serde::{Deserialize, Serialize};

/// Test applied to one lower-cased, sanitized header cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPredicate {
    Contains(String),
    Equals(String),
}

impl HeaderPredicate {
    /// `header` is expected lower-cased; the configured text may use any case.
    pub fn matches(&self, header: &str) -> bool {
        match self {
            HeaderPredicate::Contains(needle) => !needle.is_empty() && header.contains(&needle.to_lowercase()),
            HeaderPredicate::Equals(expected) => header == expected.to_lowercase(),
        }
    }
}

/// Ordered predicates for one field. Earlier predicates take priority over later ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub field: FieldKey,
    pub predicates: Vec<HeaderPredicate>,
}

impl ColumnRule {
    pub fn contains(field: FieldKey, needles: &[&str]) -> Self {
        Self {
            field,
            predicates: needles.iter().map(|n| HeaderPredicate::Contains(n.to_string())).collect(),
        }
    }

    pub fn equals(field: FieldKey, expected: &str) -> Self {
        Self {
            field,
            predicates: vec![HeaderPredicate::Equals(expected.to_string())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionalGuess {
    pub field: FieldKey,
    pub index: usize,
    /// Assigned only when the first data row has at least this many cells.
    pub min_cells: usize,
}

/// Order-based assignment used when keyword matching resolves too few fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionalFallback {
    /// Below this cell count the fallback does not apply and the keyword map is kept.
    pub min_cells: usize,
    pub guesses: Vec<PositionalGuess>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    Keyword,
    Positional,
}

/// Field → column index for one table. Unresolved fields have no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    indices: Vec<(FieldKey, usize)>,
    strategy: MappingStrategy,
}

impl ColumnMap {
    pub fn index_of(&self, field: FieldKey) -> Option<usize> {
        self.indices.iter().find(|(k, _)| *k == field).map(|(_, i)| *i)
    }

    pub fn resolved(&self) -> usize {
        self.indices.len()
    }

    pub fn strategy(&self) -> MappingStrategy {
        self.strategy
    }
}

/// Maps header cells to fields: keyword rules first, positional fallback second.
///
/// Each rule is evaluated predicate by predicate; for every predicate the header
/// row is scanned left to right, and the first hit becomes the field's column.
/// Fields are resolved independently, so two fields may share a column.
pub fn map_columns(
    headers: &[String],
    rules: &[ColumnRule],
    min_confidence: usize,
    fallback: &PositionalFallback,
    first_row_cells: usize,
) -> ColumnMap {
    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

    let mut indices = Vec::new();
    for rule in rules {
        let hit = rule
            .predicates
            .iter()
            .find_map(|p| lowered.iter().position(|h| p.matches(h)));
        if let Some(index) = hit {
            indices.push((rule.field, index));
        }
    }

    let keyword_map = ColumnMap { indices, strategy: MappingStrategy::Keyword };
    if keyword_map.resolved() >= min_confidence {
        tracing::debug!("Keyword mapping resolved {} fields: {:?}", keyword_map.resolved(), keyword_map.indices);
        return keyword_map;
    }

    if first_row_cells < fallback.min_cells || fallback.guesses.is_empty() {
        tracing::debug!(
            "Only {} fields matched keywords but first row has {} cells; keeping keyword map",
            keyword_map.resolved(),
            first_row_cells
        );
        return keyword_map;
    }

    let indices = fallback
        .guesses
        .iter()
        .filter(|g| first_row_cells >= g.min_cells)
        .map(|g| (g.field, g.index))
        .collect();
    let positional = ColumnMap { indices, strategy: MappingStrategy::Positional };
    tracing::debug!(
        "Only {} fields matched keywords (need {}); positional guess from {} cells: {:?}",
        keyword_map.resolved(),
        min_confidence,
        first_row_cells,
        positional.indices
    );
    positional
}
