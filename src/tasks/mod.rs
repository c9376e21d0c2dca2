// src/tasks/mod.rs
//! Declarative task configuration: which tables to find, how to map their
//! columns, and which rows to keep. Presets cover the two built-in tasks;
//! anything else can be supplied as JSON.

use crate::extractors::columns::{ColumnRule, PositionalFallback, PositionalGuess};
use crate::extractors::fields::FieldKey;
use crate::extractors::rows::{DerivedField, DerivedSource, RelevanceRule};
use crate::extractors::section::{Anchor, TableMatcher};
use crate::utils::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";

/// Environment override for the confidence threshold.
pub const MIN_CONFIDENCE_ENV: &str = "HARVEST_MIN_CONFIDENCE";

const HISTORY_LABEL: &str = "Mixed martial arts record";

const ROSTER_DIVISIONS: [&str; 12] = [
    "Debuted fighters",
    "Heavyweights (265lb, 120 kg)",
    "Light heavyweights (205 lb, 93 kg)",
    "Middleweights (185 lb, 84 kg)",
    "Welterweights (170 lb, 77 kg)",
    "Lightweights (155 lb, 70 kg)",
    "Featherweights (145 lb, 65 kg)",
    "Bantamweights (135 lb, 61 kg)",
    "Flyweights (125 lb, 56 kg)",
    "Women's bantamweights (135 lb, 61 kg)",
    "Women's flyweights (125 lb, 56 kg)",
    "Women's strawweights (115 lb, 52 kg)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Named entities listed in tables under section headings
    Roster,
    /// Dated events from a captioned table on an entity's own page
    History,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Roster => "roster",
            TaskKind::History => "history",
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub task: TaskKind,
    /// Every record carries exactly these fields, in this order.
    pub fields: Vec<FieldKey>,
    pub anchor: Anchor,
    #[serde(default)]
    pub table: TableMatcher,
    #[serde(default)]
    pub labels: Vec<String>,
    pub column_rules: Vec<ColumnRule>,
    pub min_confidence: usize,
    #[serde(default)]
    pub fallback: PositionalFallback,
    #[serde(default)]
    pub derived: Vec<DerivedField>,
    #[serde(default)]
    pub subject: Option<FieldKey>,
    pub relevance: RelevanceRule,
    /// Fields identifying a record when merging into storage.
    #[serde(default)]
    pub natural_key: Vec<FieldKey>,
    /// Whether the source identifier is part of the natural key.
    #[serde(default)]
    pub key_includes_source: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl TaskConfig {
    pub fn preset(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Roster => Self::roster(),
            TaskKind::History => Self::history(),
        }
    }

    /// Division rosters: one table per division heading.
    pub fn roster() -> Self {
        Self {
            task: TaskKind::Roster,
            fields: FieldKey::ROSTER.to_vec(),
            anchor: Anchor::Heading { selector: "h2, h3".to_string() },
            table: TableMatcher {
                class: Some("wikitable".to_string()),
                ..Default::default()
            },
            labels: ROSTER_DIVISIONS.iter().map(|s| s.to_string()).collect(),
            column_rules: vec![
                ColumnRule::equals(FieldKey::Name, "name"),
                ColumnRule::equals(FieldKey::Nickname, "nickname"),
            ],
            min_confidence: 1,
            fallback: PositionalFallback {
                min_cells: 2,
                guesses: vec![PositionalGuess { field: FieldKey::Name, index: 1, min_cells: 2 }],
            },
            derived: vec![
                DerivedField { field: FieldKey::Division, source: DerivedSource::Label },
                DerivedField { field: FieldKey::ProfileUrl, source: DerivedSource::LinkOf(FieldKey::Name) },
            ],
            subject: Some(FieldKey::Name),
            relevance: RelevanceRule::RequireFields(vec![FieldKey::Name, FieldKey::ProfileUrl]),
            natural_key: vec![FieldKey::Name, FieldKey::Division],
            key_includes_source: false,
            base_url: default_base_url(),
        }
    }

    /// Bout history: the record table on one fighter's page, UFC bouts only.
    pub fn history() -> Self {
        let guess = |field, index, min_cells| PositionalGuess { field, index, min_cells };
        Self {
            task: TaskKind::History,
            fields: FieldKey::HISTORY.to_vec(),
            anchor: Anchor::Caption,
            table: TableMatcher {
                class: Some("wikitable".to_string()),
                caption_phrases: vec!["professional record".to_string()],
                alias_of: Some(HISTORY_LABEL.to_string()),
                scan_limit: None,
            },
            labels: vec![HISTORY_LABEL.to_string()],
            column_rules: vec![
                ColumnRule::contains(FieldKey::Date, &["date", "when"]),
                ColumnRule::contains(FieldKey::Opponent, &["opponent", "res", "fighter"]),
                ColumnRule::contains(FieldKey::Event, &["event", "promotion"]),
                ColumnRule::contains(FieldKey::Result, &["result", "outcome", "res"]),
                ColumnRule::contains(FieldKey::Method, &["method", "type", "won by"]),
                ColumnRule::contains(FieldKey::Round, &["round"]),
                ColumnRule::contains(FieldKey::Time, &["time"]),
            ],
            min_confidence: 3,
            fallback: PositionalFallback {
                min_cells: 3,
                guesses: vec![
                    guess(FieldKey::Result, 0, 3),
                    guess(FieldKey::Opponent, 1, 3),
                    guess(FieldKey::Date, 2, 4),
                    guess(FieldKey::Event, 3, 5),
                    guess(FieldKey::Method, 4, 6),
                ],
            },
            derived: Vec::new(),
            subject: Some(FieldKey::Opponent),
            relevance: RelevanceRule::Mentions {
                keyword: "ufc".to_string(),
                field: Some(FieldKey::Event),
                backfill: Some(FieldKey::Event),
            },
            natural_key: vec![FieldKey::Date, FieldKey::Opponent, FieldKey::Event],
            key_includes_source: true,
            base_url: default_base_url(),
        }
    }

    /// Loads a full task configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: TaskConfig = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("Invalid task config {}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::info!("Loaded {} task config from {}", config.task.as_str(), path.display());
        Ok(config)
    }

    /// Applies the confidence override: explicit value first, then the environment.
    pub fn with_min_confidence(mut self, explicit: Option<usize>) -> Result<Self, AppError> {
        if let Some(value) = explicit {
            tracing::debug!("Setting min confidence to {} from command-line argument", value);
            self.min_confidence = value;
        } else if let Ok(raw) = std::env::var(MIN_CONFIDENCE_ENV) {
            self.min_confidence = raw.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a non-negative integer, got '{}'", MIN_CONFIDENCE_ENV, raw))
            })?;
            tracing::debug!("Using min confidence {} from {}", self.min_confidence, MIN_CONFIDENCE_ENV);
        }
        Ok(self)
    }

    /// Rejects rules that reference fields the task does not carry.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.fields.is_empty() {
            return Err(AppError::Config("Task config lists no fields".to_string()));
        }
        let referenced = self
            .column_rules
            .iter()
            .map(|r| r.field)
            .chain(self.fallback.guesses.iter().map(|g| g.field))
            .chain(self.derived.iter().map(|d| d.field))
            .chain(self.subject)
            .chain(self.natural_key.iter().copied());
        for field in referenced {
            if !self.fields.contains(&field) {
                return Err(AppError::Config(format!(
                    "Field '{}' is referenced but not listed in the {} task's fields",
                    field,
                    self.task.as_str()
                )));
            }
        }
        Ok(())
    }
}
