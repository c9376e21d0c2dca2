// src/extractors/engine.rs
use crate::extractors::columns::{map_columns, MappingStrategy};
use crate::extractors::fields::Record;
use crate::extractors::rows::{first_row_cell_count, header_row, RelevanceFilter, RowExtractor, RowSpec};
use crate::extractors::section::SectionLocator;
use crate::tasks::TaskConfig;
use crate::utils::error::ExtractError;
use scraper::Html;
use serde::Serialize;
use url::Url;

/// What happened to one label during a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    pub label: String,
    pub found: bool,
    pub strategy: Option<MappingStrategy>,
    pub resolved_fields: usize,
    pub records: usize,
}

/// Records of one harvest, in label order then row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestResult {
    pub records: Vec<Record>,
    pub sections: Vec<SectionReport>,
}

impl HarvestResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

/// Runs locate → map → extract for each label of one document.
/// Holds only compiled configuration; every call starts from scratch.
pub struct HarvestEngine {
    config: TaskConfig,
    locator: SectionLocator,
    base_url: Url,
}

impl HarvestEngine {
    pub fn new(config: TaskConfig) -> Result<Self, ExtractError> {
        let locator = SectionLocator::new(config.anchor.clone(), config.table.clone())?;
        let base_url = Url::parse(&config.base_url).map_err(|e| ExtractError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source: e,
        })?;
        Ok(Self { config, locator, base_url })
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Harvests the configured labels with the configured relevance rule.
    pub fn harvest_document(&self, document: &Html) -> HarvestResult {
        self.harvest(document, &self.config.labels)
    }

    pub fn harvest(&self, document: &Html, labels: &[String]) -> HarvestResult {
        self.harvest_with(document, labels, &self.config.relevance)
    }

    /// Harvests `labels` using a caller-supplied relevance filter.
    pub fn harvest_with(&self, document: &Html, labels: &[String], filter: &dyn RelevanceFilter) -> HarvestResult {
        let spec = RowSpec {
            fields: &self.config.fields,
            derived: &self.config.derived,
            subject: self.config.subject,
            base_url: &self.base_url,
        };

        let mut result = HarvestResult::default();
        for label in labels {
            let Some(table) = self.locator.locate(document, label) else {
                tracing::debug!("No table for label '{}'", label);
                result.sections.push(SectionReport {
                    label: label.clone(),
                    found: false,
                    strategy: None,
                    resolved_fields: 0,
                    records: 0,
                });
                continue;
            };

            let headers = header_row(table);
            let columns = map_columns(
                &headers,
                &self.config.column_rules,
                self.config.min_confidence,
                &self.config.fallback,
                first_row_cell_count(table),
            );

            let before = result.records.len();
            result
                .records
                .extend(RowExtractor::new(table, &columns, spec, filter, label).rows());
            let emitted = result.records.len() - before;

            tracing::debug!(
                "Label '{}': {:?} mapping of {} fields, {} records",
                label,
                columns.strategy(),
                columns.resolved(),
                emitted
            );
            result.sections.push(SectionReport {
                label: label.clone(),
                found: true,
                strategy: Some(columns.strategy()),
                resolved_fields: columns.resolved(),
                records: emitted,
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fields::{FieldKey, FieldValues};
    use scraper::ElementRef;

    const ROSTER_PAGE: &str = r#"
        <html><body>
        <div class="mw-heading mw-heading3"><h3>Heavyweights (265lb, 120 kg)</h3><span class="mw-editsection">[<a href="/edit">edit</a>]</span></div>
        <p>As of the latest event.</p>
        <table class="wikitable">
          <tr><th>ISO</th><th>Name</th><th>Age</th><th>Ht.</th><th>Nickname</th><th>Result / next fight / status</th></tr>
          <tr><td>USA</td><td><a href="/wiki/Jon_Roe">Jon Roe</a> (C)</td><td>37</td><td>6'4"</td><td>Bones[3]</td><td>Win</td></tr>
          <tr><td>BRA</td><td><a href="/wiki/Ze_Silva">Zé Silva</a></td><td>30</td><td>6'2"</td><td></td><td>Loss</td></tr>
          <tr><td>NZL</td><td>Unknown Prospect</td><td>22</td><td>6'0"</td><td>Kid</td><td>TBD</td></tr>
        </table>
        <h3>Light heavyweights (205 lb, 93 kg)<span>[edit]</span></h3>
        <table class="wikitable">
          <tr><th>ISO</th><th>Name</th><th>Nickname</th></tr>
          <tr><td>POL</td><td><a href="https://example.org/Jan">Jan Nowak</a></td><td>Prince</td></tr>
        </table>
        </body></html>
    "#;

    const HISTORY_PAGE: &str = r#"
        <html><body>
        <table class="infobox"><caption>Jane Doe</caption><tr><td>Born</td><td>1990</td></tr></table>
        <h2>Mixed martial arts record</h2>
        <table class="wikitable"><caption>Mixed martial arts record</caption>
          <tbody>
          <tr><th>Res.</th><th>Record</th><th>Opponent</th><th>Method</th><th>Event</th><th>Date</th><th>Round</th><th>Time</th><th>Location</th><th>Notes</th></tr>
          <tr><td>Win</td><td>12–3</td><td><a href="/wiki/Ann_Roe">Ann Roe</a></td><td>TKO (punches)</td><td><a href="/wiki/UFC_290">UFC 290</a></td><td>July 8, 2023</td><td>2</td><td>4:12</td><td>Las Vegas</td><td></td></tr>
          <tr><td>Loss</td><td>11–3</td><td>Kim Lee</td><td>Decision (unanimous)</td><td>Invicta FC 40</td><td>March 1, 2022</td><td>3</td><td>5:00</td><td>Kansas City</td><td></td></tr>
          <tr><td>Win</td><td>11–2</td><td><a href="/wiki/Mo_Park">Mo Park</a>[5]</td><td>Submission (armbar)</td><td>UFC Fight Night: Park vs. Doe</td><td>Jan 9, 2021</td><td>1</td><td>3:33</td><td>Abu Dhabi</td><td>Performance of the Night.[6]</td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_roster_harvest_across_labels() {
        let engine = HarvestEngine::new(TaskConfig::roster()).unwrap();
        let doc = Html::parse_document(ROSTER_PAGE);
        let result = engine.harvest_document(&doc);

        assert_eq!(result.len(), 3);
        let first = &result.records[0];
        assert_eq!(first.get(FieldKey::Name), Some("Jon Roe"));
        assert_eq!(first.get(FieldKey::Nickname), Some("Bones"));
        assert_eq!(first.get(FieldKey::Division), Some("Heavyweights (265lb, 120 kg)"));
        assert_eq!(first.get(FieldKey::ProfileUrl), Some("https://en.wikipedia.org/wiki/Jon_Roe"));
        assert_eq!(result.records[1].get(FieldKey::Nickname), Some(""));
        assert_eq!(result.records[2].get(FieldKey::Division), Some("Light heavyweights (205 lb, 93 kg)"));
        assert_eq!(result.records[2].get(FieldKey::ProfileUrl), Some("https://example.org/Jan"));

        let found: Vec<&str> = result.sections.iter().filter(|s| s.found).map(|s| s.label.as_str()).collect();
        assert_eq!(found, vec!["Heavyweights (265lb, 120 kg)", "Light heavyweights (205 lb, 93 kg)"]);
        assert_eq!(result.sections.len(), 12);
    }

    #[test]
    fn test_history_harvest_keeps_ufc_bouts_only() {
        let engine = HarvestEngine::new(TaskConfig::history()).unwrap();
        let doc = Html::parse_document(HISTORY_PAGE);
        let result = engine.harvest_document(&doc);

        assert_eq!(result.len(), 2);
        let bout = &result.records[1];
        assert_eq!(bout.get(FieldKey::Opponent), Some("Mo Park"));
        assert_eq!(bout.get(FieldKey::Result), Some("Win"));
        assert_eq!(bout.get(FieldKey::Method), Some("Submission (armbar)"));
        assert_eq!(bout.get(FieldKey::Event), Some("UFC Fight Night: Park vs. Doe"));
        assert_eq!(bout.get(FieldKey::Date), Some("Jan 9, 2021"));
        assert_eq!(bout.get(FieldKey::Round), Some("1"));
        assert_eq!(bout.get(FieldKey::Time), Some("3:33"));
        assert_eq!(result.sections[0].strategy, Some(MappingStrategy::Keyword));
    }

    #[test]
    fn test_missing_label_contributes_nothing() {
        let engine = HarvestEngine::new(TaskConfig::roster()).unwrap();
        let doc = Html::parse_document(ROSTER_PAGE);
        let labels = vec![
            "Catchweights".to_string(),
            "Heavyweights (265lb, 120 kg)".to_string(),
        ];
        let result = engine.harvest(&doc, &labels);

        assert_eq!(result.len(), 2);
        assert!(!result.sections[0].found);
        assert_eq!(result.sections[0].records, 0);
        assert_eq!(result.sections[1].records, 2);
    }

    #[test]
    fn test_harvest_is_idempotent() {
        let engine = HarvestEngine::new(TaskConfig::history()).unwrap();
        let doc = Html::parse_document(HISTORY_PAGE);
        assert_eq!(engine.harvest_document(&doc), engine.harvest_document(&doc));
    }

    #[test]
    fn test_no_footnote_markers_survive() {
        let engine = HarvestEngine::new(TaskConfig::history()).unwrap();
        let doc = Html::parse_document(HISTORY_PAGE);
        let marker = regex::Regex::new(r"\[\d+\]").unwrap();
        for record in engine.harvest_document(&doc).iter() {
            assert!(record.iter().all(|(_, v)| !marker.is_match(v)), "{:?}", record);
        }
    }

    #[test]
    fn test_injected_filter_replaces_configured_rule() {
        fn everything(_: &[ElementRef], _: &mut FieldValues) -> bool {
            true
        }
        let engine = HarvestEngine::new(TaskConfig::history()).unwrap();
        let doc = Html::parse_document(HISTORY_PAGE);
        let result = engine.harvest_with(&doc, &engine.config().labels, &everything);
        assert_eq!(result.len(), 3);
        assert_eq!(result.records[1].get(FieldKey::Event), Some("Invicta FC 40"));
    }

    #[test]
    fn test_each_caption_label_gets_its_own_table() {
        let page = r#"
            <table class="wikitable"><caption>Professional record breakdown</caption>
              <tr><th>Res.</th><th>Opponent</th><th>Event</th><th>Date</th></tr>
              <tr><td>Win</td><td>Pro Opp</td><td>UFC 1</td><td>1993</td></tr></table>
            <table class="wikitable"><caption>Amateur record</caption>
              <tr><th>Res.</th><th>Opponent</th><th>Event</th><th>Date</th></tr>
              <tr><td>Win</td><td>Am Opp</td><td>UFC Amateur Series 2</td><td>1990</td></tr></table>
        "#;
        let engine = HarvestEngine::new(TaskConfig::history()).unwrap();
        let doc = Html::parse_document(page);
        let opponents = |labels: &[&str]| -> Vec<String> {
            let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
            engine
                .harvest(&doc, &labels)
                .iter()
                .map(|r| r.get(FieldKey::Opponent).unwrap_or_default().to_string())
                .collect()
        };

        assert_eq!(opponents(&["Amateur record"]), vec!["Am Opp"]);
        assert_eq!(opponents(&["Mixed martial arts record", "Amateur record"]), vec!["Pro Opp", "Am Opp"]);
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        let mut config = TaskConfig::roster();
        config.base_url = "en.wikipedia.org".to_string();
        assert!(matches!(HarvestEngine::new(config), Err(ExtractError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_document_without_tables() {
        let engine = HarvestEngine::new(TaskConfig::history()).unwrap();
        let doc = Html::parse_document("<p>No record here.</p>");
        let result = engine.harvest_document(&doc);
        assert!(result.is_empty());
        assert_eq!(result.sections.len(), 1);
    }
}
