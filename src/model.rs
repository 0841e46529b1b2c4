//! Record data model for digital object records.
//!
//! This module defines the core data types produced by the harvester:
//! - [`Record`]: a PID-identified, insertion-order-preserving multimap of
//!   attribute keys to entries
//! - [`Entry`]: one `(key, value, optional display name)` triple
//! - [`EntryValue`]: scalar or flat structured entry values
//!
//! Records round-trip losslessly through the wire format
//! `{"pid": ..., "entries": {key: [{key, value, name?}, ...]}}` used by the
//! remote record store and file persistence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by record and entry construction or manipulation.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Empty or otherwise unusable input to a constructor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempted to merge two records with different PIDs
    #[error("Identity mismatch: cannot merge record '{other}' into '{own}'")]
    IdentityMismatch { own: String, other: String },

    /// A wire-format document could not be interpreted as a record
    #[error("Malformed wire record: {0}")]
    MalformedWire(String),
}

// ============================================================================
// Entry values
// ============================================================================

/// Value of a record entry.
///
/// Values are either a primitive string or a flat mapping of sub-keys to
/// strings (used e.g. for compound "characterized compound" values carrying
/// several sub-fields). The untagged serde representation matches the wire
/// format, where a value is either a JSON string or a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryValue {
    /// A primitive string value
    Scalar(String),

    /// A flat sub-key → value mapping
    Structured(BTreeMap<String, String>),
}

impl EntryValue {
    /// Creates a scalar value.
    pub fn scalar(value: impl Into<String>) -> Self {
        EntryValue::Scalar(value.into())
    }

    /// Creates a structured value from `(sub-key, value)` pairs.
    pub fn structured<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        EntryValue::Structured(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns `true` for an empty scalar or an empty mapping.
    pub fn is_empty(&self) -> bool {
        match self {
            EntryValue::Scalar(s) => s.is_empty(),
            EntryValue::Structured(m) => m.is_empty(),
        }
    }

    /// Renders the value the way string-only remote APIs expect it:
    /// scalars verbatim, structured values as a JSON-encoded string.
    pub fn wire_string(&self) -> String {
        match self {
            EntryValue::Scalar(s) => s.clone(),
            EntryValue::Structured(m) => {
                let object: serde_json::Map<String, serde_json::Value> = m
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                serde_json::Value::Object(object).to_string()
            }
        }
    }
}

impl From<&str> for EntryValue {
    fn from(value: &str) -> Self {
        EntryValue::Scalar(value.to_string())
    }
}

impl From<String> for EntryValue {
    fn from(value: String) -> Self {
        EntryValue::Scalar(value)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One attribute entry of a record.
///
/// Entries are immutable once constructed. Two entries are equal when their
/// key and value are equal; the display name is cosmetic and does not take
/// part in equality or duplicate suppression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Attribute key (typically a handle-style data type PID)
    pub key: String,

    /// Entry value
    pub value: EntryValue,

    /// Human-readable display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Entry {
    /// Creates an entry.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] if the key or value is empty.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<EntryValue>,
        name: Option<String>,
    ) -> Result<Self, ModelError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(ModelError::InvalidArgument(
                "entry key must not be empty".to_string(),
            ));
        }
        if value.is_empty() {
            return Err(ModelError::InvalidArgument(format!(
                "entry value for key '{key}' must not be empty"
            )));
        }

        Ok(Self { key, value, name })
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl Eq for Entry {}

// ============================================================================
// Records
// ============================================================================

/// A digital object record: a PID plus an ordered multimap of attribute
/// keys to entries.
///
/// Invariants:
/// - the PID is non-empty and never changes after construction
/// - no key ever holds two entries with equal value (silent dedupe on add)
/// - entries preserve insertion order per key; keys preserve the insertion
///   order of their first occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pid: String,
    entries: Vec<(String, Vec<Entry>)>,
}

impl Record {
    /// Creates an empty record with the given PID.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] if the PID is empty.
    pub fn new(pid: impl Into<String>) -> Result<Self, ModelError> {
        let pid = pid.into();
        if pid.is_empty() {
            return Err(ModelError::InvalidArgument(
                "record PID must not be empty".to_string(),
            ));
        }
        Ok(Self {
            pid,
            entries: Vec::new(),
        })
    }

    /// Creates a record pre-populated with the given entries.
    pub fn with_entries(
        pid: impl Into<String>,
        entries: impl IntoIterator<Item = Entry>,
    ) -> Result<Self, ModelError> {
        let mut record = Self::new(pid)?;
        for entry in entries {
            record.add_record_entry(entry);
        }
        Ok(record)
    }

    /// Returns the PID of this record.
    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Constructs an entry and adds it to the record.
    ///
    /// Adding a `(key, value)` pair that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] if the key or value is empty.
    pub fn add_entry(
        &mut self,
        key: impl Into<String>,
        value: impl Into<EntryValue>,
        name: Option<String>,
    ) -> Result<(), ModelError> {
        let entry = Entry::new(key, value, name)?;
        self.add_record_entry(entry);
        Ok(())
    }

    /// Adds a pre-constructed entry, suppressing duplicates by `(key, value)`.
    pub fn add_record_entry(&mut self, entry: Entry) {
        match self.entries.iter_mut().find(|(key, _)| *key == entry.key) {
            Some((_, existing)) => {
                if !existing.contains(&entry) {
                    existing.push(entry);
                }
            }
            None => self.entries.push((entry.key.clone(), vec![entry])),
        }
    }

    /// Adds a list of pre-constructed entries.
    pub fn add_record_entries(&mut self, entries: impl IntoIterator<Item = Entry>) {
        for entry in entries {
            self.add_record_entry(entry);
        }
    }

    /// Returns all entries under a key, or an empty slice if the key is
    /// absent.
    pub fn entry(&self, key: &str) -> &[Entry] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Checks whether an entry exists.
    ///
    /// With `value` omitted, checks only for the presence of the key;
    /// otherwise checks for an entry under `key` with that exact value.
    pub fn entry_exists(&self, key: &str, value: Option<&EntryValue>) -> bool {
        let entries = self.entry(key);
        match value {
            None => !entries.is_empty(),
            Some(value) => entries.iter().any(|entry| entry.value == *value),
        }
    }

    /// Deletes entries.
    ///
    /// With `value` omitted, removes all entries under `key`; otherwise
    /// removes only the entry matching `value`. A key left without entries
    /// is dropped entirely.
    pub fn delete_entry(&mut self, key: &str, value: Option<&EntryValue>) {
        match value {
            None => self.entries.retain(|(k, _)| k != key),
            Some(value) => {
                if let Some((_, entries)) = self.entries.iter_mut().find(|(k, _)| k == key) {
                    entries.retain(|entry| entry.value != *value);
                }
                self.entries.retain(|(_, entries)| !entries.is_empty());
            }
        }
    }

    /// Iterates over `(key, entries)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Entry])> {
        self.entries
            .iter()
            .map(|(key, entries)| (key.as_str(), entries.as_slice()))
    }

    /// Number of distinct attribute keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of entries across all keys.
    pub fn entry_count(&self) -> usize {
        self.entries.iter().map(|(_, entries)| entries.len()).sum()
    }

    /// Merges another record into this one.
    ///
    /// Every entry of `other` not already present (by key and value) in
    /// `self` is added; insertion order of pre-existing keys is preserved.
    /// This is the identity-preserving union used by the resolver and the
    /// deduplicator.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::IdentityMismatch`] if the PIDs differ.
    pub fn merge(&mut self, other: &Record) -> Result<(), ModelError> {
        if self.pid != other.pid {
            return Err(ModelError::IdentityMismatch {
                own: self.pid.clone(),
                other: other.pid.clone(),
            });
        }
        for (_, entries) in &other.entries {
            for entry in entries {
                self.add_record_entry(entry.clone());
            }
        }
        Ok(())
    }

    /// Exports the record in the wire format.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut entries = serde_json::Map::new();
        for (key, list) in &self.entries {
            let wire_list: Vec<serde_json::Value> = list
                .iter()
                .map(|entry| {
                    // Entry serialization cannot fail for plain string data.
                    serde_json::to_value(entry).unwrap_or(serde_json::Value::Null)
                })
                .collect();
            entries.insert(key.clone(), serde_json::Value::Array(wire_list));
        }

        let mut root = serde_json::Map::new();
        root.insert(
            "pid".to_string(),
            serde_json::Value::String(self.pid.clone()),
        );
        root.insert("entries".to_string(), serde_json::Value::Object(entries));
        serde_json::Value::Object(root)
    }

    /// Builds a record from a wire-format document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedWire`] if the document lacks a PID or
    /// its entries cannot be interpreted, and [`ModelError::InvalidArgument`]
    /// if the PID is empty.
    pub fn from_wire(value: &serde_json::Value) -> Result<Self, ModelError> {
        let pid = value
            .get("pid")
            .and_then(|pid| pid.as_str())
            .ok_or_else(|| ModelError::MalformedWire("missing 'pid' field".to_string()))?;

        let mut record = Record::new(pid)?;

        let Some(entries) = value.get("entries") else {
            return Ok(record);
        };
        let entries = entries
            .as_object()
            .ok_or_else(|| ModelError::MalformedWire("'entries' must be an object".to_string()))?;

        for (key, list) in entries {
            let list = list.as_array().ok_or_else(|| {
                ModelError::MalformedWire(format!("entries under '{key}' must be an array"))
            })?;
            for wire_entry in list {
                let entry: Entry = serde_json::from_value(wire_entry.clone())
                    .map_err(|e| ModelError::MalformedWire(e.to_string()))?;
                record.add_record_entry(entry);
            }
        }

        Ok(record)
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Record::from_wire(&value).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: &str) -> Record {
        Record::new(pid).unwrap()
    }

    #[test]
    fn test_rejects_empty_pid_key_and_value() {
        assert!(Record::new("").is_err());
        let mut r = record("sandbox/1");
        assert!(r.add_entry("", "value", None).is_err());
        assert!(r.add_entry("key", "", None).is_err());
        assert!(r
            .add_entry("key", EntryValue::structured::<&str, &str, _>([]), None)
            .is_err());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut r = record("sandbox/1");
        r.add_entry("21.T11148/aa", "value", None).unwrap();
        r.add_entry("21.T11148/aa", "value", Some("other name".to_string()))
            .unwrap();

        assert_eq!(r.entry("21.T11148/aa").len(), 1);
        // The first insertion wins, display name included.
        assert_eq!(r.entry("21.T11148/aa")[0].name, None);
    }

    #[test]
    fn test_with_entries_dedupes_on_construction() {
        let entries = vec![
            Entry::new("key", "a", None).unwrap(),
            Entry::new("key", "a", Some("dup".to_string())).unwrap(),
            Entry::new("other", "b", None).unwrap(),
        ];
        let r = Record::with_entries("sandbox/1", entries).unwrap();

        assert_eq!(r.entry("key").len(), 1);
        assert_eq!(r.key_count(), 2);
        assert_eq!(r.entry_count(), 2);
        assert!(Record::with_entries("", Vec::new()).is_err());
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut r = record("sandbox/1");
        r.add_entry("b-key", "1", None).unwrap();
        r.add_entry("a-key", "2", None).unwrap();
        r.add_entry("b-key", "3", None).unwrap();

        let keys: Vec<&str> = r.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b-key", "a-key"]);

        let values: Vec<String> = r
            .entry("b-key")
            .iter()
            .map(|e| e.value.wire_string())
            .collect();
        assert_eq!(values, vec!["1", "3"]);
    }

    #[test]
    fn test_entry_exists_and_delete() {
        let mut r = record("sandbox/1");
        r.add_entry("key", "a", None).unwrap();
        r.add_entry("key", "b", None).unwrap();

        assert!(r.entry_exists("key", None));
        assert!(r.entry_exists("key", Some(&EntryValue::scalar("a"))));
        assert!(!r.entry_exists("key", Some(&EntryValue::scalar("c"))));

        r.delete_entry("key", Some(&EntryValue::scalar("a")));
        assert_eq!(r.entry("key").len(), 1);

        r.delete_entry("key", Some(&EntryValue::scalar("b")));
        // Last entry removed → key disappears entirely.
        assert!(!r.entry_exists("key", None));

        r.add_entry("key", "a", None).unwrap();
        r.delete_entry("key", None);
        assert!(!r.entry_exists("key", None));
    }

    #[test]
    fn test_merge_unions_entries() {
        let mut a = record("sandbox/1");
        a.add_entry("key", "shared", None).unwrap();
        a.add_entry("key", "only-a", None).unwrap();

        let mut b = record("sandbox/1");
        b.add_entry("key", "shared", None).unwrap();
        b.add_entry("key", "only-b", None).unwrap();
        b.add_entry("other", "x", None).unwrap();

        a.merge(&b).unwrap();

        let values: Vec<String> = a
            .entry("key")
            .iter()
            .map(|e| e.value.wire_string())
            .collect();
        assert_eq!(values, vec!["shared", "only-a", "only-b"]);
        assert!(a.entry_exists("other", Some(&EntryValue::scalar("x"))));
    }

    #[test]
    fn test_merge_rejects_foreign_pid() {
        let mut a = record("sandbox/1");
        let b = record("sandbox/2");
        assert!(matches!(
            a.merge(&b),
            Err(ModelError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn test_wire_round_trip() {
        let mut r = record("sandbox/compound");
        r.add_entry("scalar-key", "plain value", Some("displayName".to_string()))
            .unwrap();
        r.add_entry(
            "compound-key",
            EntryValue::structured([("formula", "C6H6"), ("inchi", "InChI=1S/C6H6")]),
            None,
        )
        .unwrap();

        let wire = r.to_wire();
        let restored = Record::from_wire(&wire).unwrap();

        assert_eq!(restored.pid(), r.pid());
        for (key, entries) in r.iter() {
            assert_eq!(restored.entry(key), entries);
        }
        // Display names survive the round trip even though they are not part
        // of entry equality.
        assert_eq!(
            restored.entry("scalar-key")[0].name.as_deref(),
            Some("displayName")
        );
    }

    #[test]
    fn test_wire_rejects_malformed_documents() {
        assert!(Record::from_wire(&serde_json::json!({})).is_err());
        assert!(Record::from_wire(&serde_json::json!({"pid": ""})).is_err());
        assert!(Record::from_wire(&serde_json::json!({"pid": "p", "entries": []})).is_err());
    }

    #[test]
    fn test_structured_value_wire_string() {
        let value = EntryValue::structured([("b", "2"), ("a", "1")]);
        assert_eq!(value.wire_string(), r#"{"a":"1","b":"2"}"#);
        assert_eq!(EntryValue::scalar("plain").wire_string(), "plain");
    }
}
