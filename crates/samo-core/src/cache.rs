//! Local mirror of the subscribed key
//!
//! A `Cache` is either one `Entry` or an ordered list of them. Its shape is
//! fixed by the subscription mode and never changes after the first
//! snapshot; a patch batch that would change it is rejected.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::endpoint::Mode;
use crate::error::ProtocolError;
use crate::patch::{apply_patch, Operation};

/// One addressable record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(default)]
    pub index: String,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for Entry {
    /// `{created: 0, updated: 0, index: "", data: {}}`
    fn default() -> Self {
        Self {
            data: empty_object(),
            created: 0,
            updated: 0,
            index: String::new(),
        }
    }
}

impl Entry {
    /// True for the placeholder the server sends for a missing key
    pub fn is_empty(&self) -> bool {
        *self == Entry::default()
    }
}

/// Materialized state of one subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cache {
    Entry(Entry),
    Collection(Vec<Entry>),
}

impl Cache {
    /// The empty value for a mode
    pub fn empty(mode: &Mode) -> Self {
        match mode {
            Mode::Singular => Cache::Entry(Entry::default()),
            _ => Cache::Collection(Vec::new()),
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Cache::Entry(entry) => Some(entry),
            Cache::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[Entry]> {
        match self {
            Cache::Entry(_) => None,
            Cache::Collection(entries) => Some(entries),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Cache::Collection(_))
    }

    /// Entries held, in order
    pub fn entries(&self) -> &[Entry] {
        match self {
            Cache::Entry(entry) => std::slice::from_ref(entry),
            Cache::Collection(entries) => entries,
        }
    }

    /// Find an entry by index
    pub fn get(&self, index: &str) -> Option<&Entry> {
        self.entries().iter().find(|entry| entry.index == index)
    }

    pub fn to_value(&self) -> Value {
        // Entry only holds JSON-representable fields
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rebuild a cache of the same shape as `self` from a JSON document
    fn reshape(&self, value: Value) -> Result<Cache, ProtocolError> {
        match self {
            Cache::Entry(_) => serde_json::from_value(value)
                .map(Cache::Entry)
                .map_err(|e| ProtocolError::Shape(format!("expected an entry: {}", e))),
            Cache::Collection(_) => serde_json::from_value(value)
                .map(Cache::Collection)
                .map_err(|e| ProtocolError::Shape(format!("expected a list of entries: {}", e))),
        }
    }

    /// Apply a decoded patch batch as one transition.
    ///
    /// Returns the next cache; `self` is never modified, so a failure
    /// anywhere in the batch leaves the current state in place.
    pub fn apply(&self, ops: &[Operation]) -> Result<Cache, ProtocolError> {
        let patched = apply_patch(&self.to_value(), ops)?;
        let next = self.reshape(patched)?;
        self.check_transition(&next)?;
        Ok(next)
    }

    /// Indexes are unique and timestamps never move backwards
    fn check_transition(&self, next: &Cache) -> Result<(), ProtocolError> {
        let mut seen = HashSet::new();
        for entry in next.entries().iter().filter(|e| !e.index.is_empty()) {
            if !seen.insert(entry.index.as_str()) {
                return Err(ProtocolError::Invariant(format!(
                    "duplicate index '{}'",
                    entry.index
                )));
            }
        }

        let previous: HashMap<&str, &Entry> = self
            .entries()
            .iter()
            .filter(|e| !e.index.is_empty())
            .map(|e| (e.index.as_str(), e))
            .collect();

        for entry in next.entries() {
            let Some(old) = previous.get(entry.index.as_str()) else {
                continue;
            };
            if entry.created < old.created || entry.updated < old.updated {
                return Err(ProtocolError::Invariant(format!(
                    "timestamps of '{}' moved backwards",
                    entry.index
                )));
            }
        }

        Ok(())
    }
}
