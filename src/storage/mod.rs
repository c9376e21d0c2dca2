// src/storage/mod.rs
use crate::extractors::engine::HarvestResult;
use crate::extractors::fields::{FieldKey, Record};
use crate::utils::error::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Accepts harvested records and stores them, merging on a natural key.
pub trait PersistenceSink {
    /// Merges one source's records; returns how many were new.
    fn persist(&mut self, source: &str, result: &HarvestResult) -> Result<usize, StorageError>;
}

/// A record together with the document it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub source: String,
    #[serde(flatten)]
    pub record: Record,
}

/// Which values identify a stored record.
#[derive(Debug, Clone)]
pub struct NaturalKey {
    pub fields: Vec<FieldKey>,
    pub include_source: bool,
}

impl NaturalKey {
    fn of(&self, stored: &StoredRecord) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.fields.len() + 1);
        if self.include_source {
            parts.push(&stored.source);
        }
        parts.extend(self.fields.iter().map(|f| stored.record.get(*f).unwrap_or("")));
        parts.join("\u{1f}")
    }
}

/// JSON file store: `<base_dir>/<task>.json` plus `<task>_meta.json`.
pub struct JsonFileSink {
    base_dir: PathBuf,
    task: String,
    key: NaturalKey,
    records: Vec<StoredRecord>,
    index: HashMap<String, usize>,
    updated: usize,
}

impl JsonFileSink {
    /// Opens the store, loading records from a previous run if present.
    pub fn open<P: AsRef<Path>>(base_dir: P, task: &str, key: NaturalKey) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        let mut sink = Self {
            base_dir: base_path,
            task: task.to_string(),
            key,
            records: Vec::new(),
            index: HashMap::new(),
            updated: 0,
        };

        let existing = sink.records_path();
        if existing.exists() {
            let text = fs::read_to_string(&existing)?;
            let previous: Vec<StoredRecord> = serde_json::from_str(&text)
                .map_err(|e| StorageError::SerializationError(format!("{}: {}", existing.display(), e)))?;
            tracing::info!("Loaded {} existing records from {}", previous.len(), existing.display());
            for stored in previous {
                sink.upsert(stored);
            }
            sink.updated = 0;
        }

        Ok(sink)
    }

    pub fn records_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.json", self.task))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}_meta.json", self.task))
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    /// Inserts or replaces by natural key. Returns true when the key was new.
    fn upsert(&mut self, stored: StoredRecord) -> bool {
        let key = self.key.of(&stored);
        match self.index.get(&key) {
            Some(&pos) => {
                self.records[pos] = stored;
                self.updated += 1;
                false
            }
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(stored);
                true
            }
        }
    }

    /// Writes the merged records and a metadata sidecar.
    pub fn flush(&self) -> Result<(PathBuf, PathBuf), StorageError> {
        let records_path = self.records_path();
        let body = serde_json::to_string_pretty(&self.records)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&records_path, body)?;
        tracing::info!("Saved {} records to {}", self.records.len(), records_path.display());

        let metadata = serde_json::json!({
            "task": self.task,
            "record_count": self.records.len(),
            "updated_in_place": self.updated,
            "natural_key": self.key.fields.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            "key_includes_source": self.key.include_source,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let metadata_path = self.metadata_path();
        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&metadata_path, metadata_str)?;
        tracing::info!("Saved metadata to {}", metadata_path.display());

        Ok((records_path, metadata_path))
    }
}

impl PersistenceSink for JsonFileSink {
    fn persist(&mut self, source: &str, result: &HarvestResult) -> Result<usize, StorageError> {
        let mut inserted = 0;
        for record in result.iter() {
            let stored = StoredRecord {
                source: source.to_string(),
                record: record.clone(),
            };
            if self.upsert(stored) {
                inserted += 1;
            }
        }
        tracing::debug!("Merged {} records from {} ({} new)", result.len(), source, inserted);
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fields::FieldValues;
    use tempfile::tempdir;

    fn fighter(name: &str, division: &str, nickname: &str) -> Record {
        let mut values = FieldValues::empty(&FieldKey::ROSTER);
        values.set(FieldKey::Name, name);
        values.set(FieldKey::Division, division);
        values.set(FieldKey::Nickname, nickname);
        values.freeze()
    }

    fn roster_key() -> NaturalKey {
        NaturalKey { fields: vec![FieldKey::Name, FieldKey::Division], include_source: false }
    }

    #[test]
    fn test_merges_on_natural_key() {
        let dir = tempdir().unwrap();
        let mut sink = JsonFileSink::open(dir.path(), "roster", roster_key()).unwrap();

        let first = HarvestResult {
            records: vec![fighter("Jon Roe", "Heavyweights", ""), fighter("Ann Roe", "Flyweights", "")],
            sections: Vec::new(),
        };
        assert_eq!(sink.persist("list.html", &first).unwrap(), 2);

        let second = HarvestResult {
            records: vec![fighter("Jon Roe", "Heavyweights", "Bones"), fighter("Jon Roe", "Middleweights", "")],
            sections: Vec::new(),
        };
        assert_eq!(sink.persist("list.html", &second).unwrap(), 1);

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.records()[0].record.get(FieldKey::Nickname), Some("Bones"));
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let mut sink = JsonFileSink::open(&out, "roster", roster_key()).unwrap();
        let result = HarvestResult { records: vec![fighter("Jon Roe", "Heavyweights", "Bones")], sections: Vec::new() };
        sink.persist("list.html", &result).unwrap();
        let (records_path, metadata_path) = sink.flush().unwrap();

        let written = fs::read_to_string(&records_path).unwrap();
        assert!(written.contains(r#""source": "list.html""#));
        assert!(written.contains(r#""nickname": "Bones""#));
        let meta: serde_json::Value = serde_json::from_str(&fs::read_to_string(metadata_path).unwrap()).unwrap();
        assert_eq!(meta["record_count"], 1);

        let mut reopened = JsonFileSink::open(&out, "roster", roster_key()).unwrap();
        assert_eq!(reopened.records().len(), 1);
        assert_eq!(reopened.persist("list.html", &result).unwrap(), 0);
    }

    #[test]
    fn test_source_in_key_keeps_same_bout_from_two_pages() {
        let dir = tempdir().unwrap();
        let key = NaturalKey { fields: vec![FieldKey::Name], include_source: true };
        let mut sink = JsonFileSink::open(dir.path(), "history", key).unwrap();
        let result = HarvestResult { records: vec![fighter("Jon Roe", "", "")], sections: Vec::new() };
        sink.persist("a.html", &result).unwrap();
        sink.persist("b.html", &result).unwrap();
        assert_eq!(sink.records().len(), 2);
    }
}
