// src/extractors/fields.rs
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Canonical column roles. Roster tasks use the first four, history tasks the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    // Roster
    Name,
    Nickname,
    Division,
    ProfileUrl,
    // History
    Date,
    Opponent,
    Event,
    Result,
    Method,
    Round,
    Time,
}

impl FieldKey {
    pub const ROSTER: [FieldKey; 4] = [
        FieldKey::Name,
        FieldKey::Nickname,
        FieldKey::Division,
        FieldKey::ProfileUrl,
    ];

    pub const HISTORY: [FieldKey; 7] = [
        FieldKey::Date,
        FieldKey::Opponent,
        FieldKey::Event,
        FieldKey::Result,
        FieldKey::Method,
        FieldKey::Round,
        FieldKey::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Name => "name",
            FieldKey::Nickname => "nickname",
            FieldKey::Division => "division",
            FieldKey::ProfileUrl => "profileUrl",
            FieldKey::Date => "date",
            FieldKey::Opponent => "opponent",
            FieldKey::Event => "event",
            FieldKey::Result => "result",
            FieldKey::Method => "method",
            FieldKey::Round => "round",
            FieldKey::Time => "time",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-row scratch space. Every key of the task is present from the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValues {
    entries: Vec<(FieldKey, String)>,
}

impl FieldValues {
    pub fn empty(keys: &[FieldKey]) -> Self {
        Self {
            entries: keys.iter().map(|k| (*k, String::new())).collect(),
        }
    }

    pub fn get(&self, key: FieldKey) -> &str {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Sets a value. Keys outside the task's field set are ignored.
    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value.into();
        }
    }

    pub fn freeze(self) -> Record {
        Record { entries: self.entries }
    }
}

/// One extracted row: every task field present, string-valued, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "std::collections::BTreeMap<FieldKey, String>")]
pub struct Record {
    entries: Vec<(FieldKey, String)>,
}

impl Record {
    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl From<std::collections::BTreeMap<FieldKey, String>> for Record {
    fn from(map: std::collections::BTreeMap<FieldKey, String>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key.as_str(), value)?;
        }
        map.end()
    }
}
