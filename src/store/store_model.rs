use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed property value before schema validation.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    Text(String),
    Select(String),
    MultiSelect(Vec<String>),
    Number(f64),
    Checkbox(bool),
    Url(String),
    Date { value: String, is_datetime: bool },
    Relation(Vec<RecordId>),
}

/// A record as the pipeline builds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub properties: BTreeMap<String, PropertyValue>,
    pub content: Option<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn title(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, PropertyValue::Title(value.into()))
    }

    pub fn text(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, PropertyValue::Text(value.into()))
    }

    pub fn select(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, PropertyValue::Select(value.into()))
    }

    pub fn multi_select(self, name: &str, values: Vec<String>) -> Self {
        self.with(name, PropertyValue::MultiSelect(values))
    }

    pub fn number(self, name: &str, value: f64) -> Self {
        self.with(name, PropertyValue::Number(value))
    }

    pub fn checkbox(self, name: &str, value: bool) -> Self {
        self.with(name, PropertyValue::Checkbox(value))
    }

    pub fn url(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, PropertyValue::Url(value.into()))
    }

    pub fn date(self, name: &str, at: DateTime<Utc>) -> Self {
        self.with(
            name,
            PropertyValue::Date {
                value: at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                is_datetime: true,
            },
        )
    }

    pub fn relation(self, name: &str, ids: Vec<RecordId>) -> Self {
        self.with(name, PropertyValue::Relation(ids))
    }

    pub fn content(mut self, body: impl Into<String>) -> Self {
        self.content = Some(body.into());
        self
    }
}

/// What the store supports. Drives batching and list encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub batch_limit: usize,
    pub native_multi_value: bool,
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            native_multi_value: false,
        }
    }
}

/// A validated record in the store's wire encoding.
///
/// Each property maps to a single-key object naming its type, e.g.
/// `{"select": "Dark"}` or `{"number": 1}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Split a wire property into its type tag and payload.
pub fn wire_kind(value: &Value) -> Option<(&str, &Value)> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: RecordId,
    pub collection: String,
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub content: Option<String>,
}

impl StoredRecord {
    fn payload(&self, name: &str) -> Option<&Value> {
        wire_kind(self.properties.get(name)?).map(|(_, v)| v)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.payload(name)?.as_str()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.payload(name)?.as_f64()
    }

    pub fn checkbox(&self, name: &str) -> Option<bool> {
        self.payload(name)?.as_bool()
    }

    /// List payloads, whether stored natively or as a JSON string.
    pub fn list(&self, name: &str) -> Vec<String> {
        match self.payload(name) {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            Some(Value::String(encoded)) => serde_json::from_str(encoded).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn relation_ids(&self, name: &str) -> Vec<RecordId> {
        self.list(name).into_iter().map(RecordId).collect()
    }
}
