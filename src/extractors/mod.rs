// src/extractors/mod.rs
pub mod columns;
pub mod engine;
pub mod fields;
pub mod rows;
pub mod sanitize;
pub mod section;

// Re-export key extraction types for convenience
#[allow(unused_imports)]
pub use self::{
    columns::{ColumnMap, ColumnRule, HeaderPredicate, MappingStrategy, PositionalFallback, PositionalGuess},
    engine::{HarvestEngine, HarvestResult, SectionReport},
    fields::{FieldKey, FieldValues, Record},
    rows::{DerivedField, DerivedSource, RelevanceFilter, RelevanceRule, RowExtractor},
    section::{Anchor, SectionLocator, TableHandle, TableMatcher},
};
