//! Input records and the output-field mapping
//!
//! A record is opaque key/value data. The builder only ever asks a record for
//! the text form of a field, and treats absent, null and empty values the
//! same way: as "not there".

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::Result;

/// One element of the caller-supplied input sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for tests and small callers
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The string form of a field, or `None` when it is absent, null or empty
    ///
    /// Strings are used verbatim, numbers and booleans use their JSON text,
    /// and nested arrays/objects are rendered as compact JSON.
    pub fn text(&self, key: &str) -> Option<String> {
        let text = match self.0.get(key)? {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Iterate fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

/// Parse a JSON array of objects into records
pub fn parse_records(json: &str) -> Result<Vec<Record>> {
    Ok(serde_json::from_str(json)?)
}

/// Load records from a JSON file holding an array of objects
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let json = std::fs::read_to_string(path)?;
    parse_records(&json)
}

/// Ordered mapping from output metadata key to input record key
///
/// Kept as a list rather than a hash map so the emitted metadata follows the
/// order the caller wrote the mapping in. Inserting an existing output key
/// replaces its source in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, output_key: impl Into<String>, record_key: impl Into<String>) {
        let output_key = output_key.into();
        let record_key = record_key.into();
        match self.entries.iter_mut().find(|(key, _)| *key == output_key) {
            Some(entry) => entry.1 = record_key,
            None => self.entries.push((output_key, record_key)),
        }
    }

    /// Record key mapped to an output key
    pub fn get(&self, output_key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == output_key)
            .map(|(_, source)| source.as_str())
    }

    /// Iterate `(output_key, record_key)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = FieldMapping::new();
        for (output_key, record_key) in iter {
            mapping.insert(output_key, record_key);
        }
        mapping
    }
}

impl Serialize for FieldMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (output_key, record_key) in &self.entries {
            map.serialize_entry(output_key, record_key)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = FieldMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping output keys to record keys")
            }

            // Visit entries directly so document order survives
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<FieldMapping, A::Error> {
                let mut mapping = FieldMapping::new();
                while let Some((output_key, record_key)) = access.next_entry::<String, String>()? {
                    mapping.insert(output_key, record_key);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_skips_absent_null_and_empty() {
        let record = Record::new()
            .with("id", "INV-001")
            .with("empty", "")
            .with("nothing", Value::Null);

        assert_eq!(record.text("id").as_deref(), Some("INV-001"));
        assert_eq!(record.text("empty"), None);
        assert_eq!(record.text("nothing"), None);
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn test_text_renders_non_strings() {
        let record = Record::new()
            .with("amount", 1000)
            .with("paid", true)
            .with("tags", json!(["a", "b"]));

        assert_eq!(record.text("amount").as_deref(), Some("1000"));
        assert_eq!(record.text("paid").as_deref(), Some("true"));
        assert_eq!(record.text("tags").as_deref(), Some(r#"["a","b"]"#));
    }

    #[test]
    fn test_parse_records() {
        let records = parse_records(r#"[{"id": "A"}, {}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("id").as_deref(), Some("A"));
        assert!(records[1].is_empty());

        assert!(parse_records(r#"{"id": "A"}"#).is_err());
    }

    #[test]
    fn test_mapping_preserves_document_order() {
        let mapping: FieldMapping =
            serde_json::from_str(r#"{"Zeta": "z", "RecordID": "id", "Alpha": "a"}"#).unwrap();
        let keys: Vec<&str> = mapping.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Zeta", "RecordID", "Alpha"]);
        assert_eq!(mapping.get("RecordID"), Some("id"));
    }

    #[test]
    fn test_mapping_insert_replaces_in_place() {
        let mut mapping: FieldMapping = [("A", "a"), ("B", "b")].into_iter().collect();
        mapping.insert("A", "other");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.iter().next(), Some(("A", "other")));
    }

    #[test]
    fn test_mapping_serializes_as_object() {
        let mapping: FieldMapping = [("RecordID", "id")].into_iter().collect();
        assert_eq!(serde_json::to_string(&mapping).unwrap(), r#"{"RecordID":"id"}"#);
    }
}
