// src/main.rs
mod extractors;
mod source;
mod storage;
mod tasks;
mod utils;

use clap::Parser;
use extractors::engine::{HarvestEngine, HarvestResult};
use scraper::Html;
use source::{DocumentProvider, FileProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{JsonFileSink, NaturalKey, PersistenceSink};
use tasks::{TaskConfig, TaskKind};
use utils::AppError;

/// Harvest roster and bout-history records from saved encyclopedia pages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Built-in task to run (ignored when --config is given)
    #[arg(short, long, value_enum, default_value_t = TaskKind::History)]
    task: TaskKind,

    /// Saved HTML documents to harvest
    #[arg(required = true)]
    sources: Vec<String>,

    /// Target label (repeatable); replaces the task's default labels
    #[arg(short, long = "label")]
    labels: Vec<String>,

    /// JSON task configuration replacing the built-in preset
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum keyword-matched fields before the positional fallback is skipped
    #[arg(long)]
    min_confidence: Option<usize>,

    /// Base URL for resolving relative profile links
    #[arg(long)]
    base_url: Option<String>,

    /// Output directory for harvested records
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Debug mode - verbose logs and annotated HTML copies of each source
    #[arg(short, long)]
    debug: bool,
}

/// Builds the effective task configuration from the preset or file plus CLI overrides.
fn build_config(args: &Args) -> Result<TaskConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => TaskConfig::from_json_file(path)?,
        None => TaskConfig::preset(args.task),
    };
    if !args.labels.is_empty() {
        config.labels = args.labels.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    let config = config.with_min_confidence(args.min_confidence)?;
    config.validate()?;
    Ok(config)
}

/// Fetches, parses, and harvests one source. Runs on a blocking thread.
fn harvest_source(
    engine: &HarvestEngine,
    provider: &dyn DocumentProvider,
    source: &str,
    debug_dir: Option<&Path>,
) -> Result<HarvestResult, AppError> {
    let markup = provider.fetch(source)?;

    if let Some(dir) = debug_dir {
        std::fs::create_dir_all(dir)?;
        let stem = Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let patterns = utils::html_debug::harvest_patterns(&engine.config().labels);
        if let Err(e) = utils::html_debug::create_debug_html(&markup, dir.join(format!("{}_annotated.html", stem)), &patterns) {
            tracing::warn!("Failed to create debug HTML for {}: {}", source, e);
        }
    }

    let document = Html::parse_document(&markup);
    let result = engine.harvest_document(&document);
    tracing::info!("Harvested {} records from {}", result.len(), source);
    for section in result.sections.iter().filter(|s| !s.found) {
        tracing::debug!("{}: no table found for '{}'", source, section.label);
    }
    Ok(result)
}

/// Harvests every source concurrently; results come back in input order.
async fn harvest_sources(
    engine: Arc<HarvestEngine>,
    provider: Arc<dyn DocumentProvider>,
    sources: &[String],
    debug_dir: Option<PathBuf>,
) -> Result<Vec<(String, Result<HarvestResult, AppError>)>, AppError> {
    let mut set = tokio::task::JoinSet::new();
    for (index, source) in sources.iter().enumerate() {
        let engine = Arc::clone(&engine);
        let provider = Arc::clone(&provider);
        let source = source.clone();
        let debug_dir = debug_dir.clone();
        set.spawn_blocking(move || {
            let result = harvest_source(&engine, provider.as_ref(), &source, debug_dir.as_deref());
            (index, source, result)
        });
    }

    let mut slots: Vec<Option<(String, Result<HarvestResult, AppError>)>> = (0..sources.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, source, result) =
            joined.map_err(|e| AppError::Processing(format!("Harvest task failed: {}", e)))?;
        slots[index] = Some((source, result));
    }
    Ok(slots.into_iter().flatten().collect())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let args = Args::parse();

    // 2. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging(args.debug);
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Build the task configuration and engine
    let config = build_config(&args)?;
    tracing::info!(
        "Running {} task over {} sources with {} labels",
        config.task.as_str(),
        args.sources.len(),
        config.labels.len()
    );
    let key = NaturalKey {
        fields: config.natural_key.clone(),
        include_source: config.key_includes_source,
    };
    let task_name = config.task.as_str();
    let engine = Arc::new(HarvestEngine::new(config)?);

    // 4. Initialize storage
    let mut sink = JsonFileSink::open(&args.output_dir, task_name, key)?;

    // 5. Harvest every source
    let provider: Arc<dyn DocumentProvider> = Arc::new(FileProvider::new("."));
    let debug_dir = args.debug.then(|| Path::new(&args.output_dir).join("debug"));
    let outcomes = harvest_sources(engine, provider, &args.sources, debug_dir).await?;

    // 6. Persist in input order
    let mut success_count = 0;
    let mut failure_count = 0;
    let mut record_count = 0;
    for (source, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                success_count += 1;
                record_count += result.len();
                let inserted = sink.persist(&source, &result)?;
                tracing::info!("{}: {} records ({} new)", source, result.len(), inserted);
            }
            Err(e) => {
                failure_count += 1;
                tracing::error!("Failed to harvest {}: {}", source, e);
            }
        }
    }
    sink.flush()?;

    tracing::info!(
        "Processing finished. Sources ok: {}, failed: {}, records: {}",
        success_count,
        failure_count,
        record_count
    );

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!("Failed to harvest any of {} sources", failure_count)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fields::FieldKey;
    use crate::utils::error::SourceError;
    use std::collections::HashMap;

    struct MemoryProvider(HashMap<String, String>);

    impl DocumentProvider for MemoryProvider {
        fn fetch(&self, source: &str) -> Result<String, SourceError> {
            self.0
                .get(source)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(source.to_string()))
        }
    }

    fn record_page(opponent: &str) -> String {
        format!(
            r#"<table class="wikitable"><caption>Professional record breakdown</caption>
            <tr><th>Res.</th><th>Opponent</th><th>Event</th><th>Date</th></tr>
            <tr><td>Win</td><td>{}</td><td>UFC 1</td><td>1993</td></tr></table>"#,
            opponent
        )
    }

    #[test]
    fn test_sources_harvested_concurrently_in_input_order() {
        let pages: HashMap<String, String> = ["a", "b", "c"]
            .iter()
            .map(|name| (name.to_string(), record_page(&format!("Opponent {}", name))))
            .collect();
        let provider: Arc<dyn DocumentProvider> = Arc::new(MemoryProvider(pages));
        let engine = Arc::new(HarvestEngine::new(TaskConfig::history()).unwrap());
        let sources: Vec<String> = vec!["c".into(), "missing".into(), "a".into()];

        let outcomes = tokio_test::block_on(harvest_sources(engine, provider, &sources, None)).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].0, "c");
        let first = outcomes[0].1.as_ref().unwrap();
        assert_eq!(first.records[0].get(FieldKey::Opponent), Some("Opponent c"));
        assert!(matches!(outcomes[1].1, Err(AppError::Source(SourceError::NotFound(_)))));
        assert_eq!(outcomes[2].0, "a");
    }

    #[test]
    fn test_cli_overrides_apply_to_preset() {
        let args = Args::parse_from([
            "table_harvest",
            "--task",
            "roster",
            "--label",
            "Catchweights",
            "--min-confidence",
            "2",
            "--base-url",
            "https://example.org",
            "page.html",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.task, TaskKind::Roster);
        assert_eq!(config.labels, vec!["Catchweights".to_string()]);
        assert_eq!(config.min_confidence, 2);
        assert_eq!(config.base_url, "https://example.org");
    }
}
