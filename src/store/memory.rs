use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::StoreError;
use crate::store::client::KnowledgeStore;
use crate::store::schema::{RESERVED_PREFIX, SchemaRules};
use crate::store::store_model::{RecordId, StoreCapabilities, StoredRecord, WireRecord, wire_kind};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    records: BTreeMap<RecordId, StoredRecord>,
    /// Insertion order, since ids sort lexically
    order: Vec<RecordId>,
    create_calls: usize,
    credentials_expired: bool,
}

/// In-process knowledge store that enforces the remote store's write
/// contract. Backs `--dry-run` and the test suite.
#[derive(Debug)]
pub struct MemoryStore {
    capabilities: StoreCapabilities,
    rules: SchemaRules,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreCapabilities::default())
    }
}

impl MemoryStore {
    pub fn new(capabilities: StoreCapabilities) -> Self {
        Self {
            capabilities,
            rules: SchemaRules::default(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every record in `collection`, in creation order.
    pub fn records_in(&self, collection: &str) -> Vec<StoredRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.collection == collection)
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Number of `create_records` calls accepted so far.
    pub fn create_call_count(&self) -> usize {
        self.lock().create_calls
    }

    /// Make every later call fail with `AuthExpired` until restored.
    pub fn expire_credentials(&self, expired: bool) {
        self.lock().credentials_expired = expired;
    }

    fn check_record(&self, record: &WireRecord) -> Result<(), StoreError> {
        let reject = |field: &str, reason: &str| StoreError::SchemaValidation {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        for (name, value) in &record.properties {
            if self.rules.is_reserved(name) {
                return Err(reject(name, "reserved property name must be prefixed"));
            }
            if name.starts_with(RESERVED_PREFIX) && name.len() == RESERVED_PREFIX.len() {
                return Err(reject(name, "empty property name"));
            }

            let Some((kind, payload)) = wire_kind(value) else {
                return Err(reject(name, "property must be a single-key typed object"));
            };

            match (kind, payload) {
                ("select", Value::String(option)) => self.check_option(name, option)?,
                ("multi_select", Value::Array(_)) | ("relation", Value::Array(_))
                    if !self.capabilities.native_multi_value =>
                {
                    return Err(reject(name, "list values must be JSON-string encoded"));
                }
                ("multi_select", payload) => {
                    for option in decode_list(payload).ok_or_else(|| reject(name, "malformed list"))? {
                        self.check_option(name, &option)?;
                    }
                }
                ("relation", payload) => {
                    decode_list(payload).ok_or_else(|| reject(name, "malformed relation"))?;
                }
                ("date", Value::String(_)) => {
                    let Some(base) = name.strip_prefix("date:").and_then(|n| n.strip_suffix(":start")) else {
                        return Err(reject(name, "date values must use the date:<name>:start key"));
                    };
                    let flag = format!("date:{}:is_datetime", base);
                    match record.properties.get(&flag).and_then(wire_kind) {
                        Some(("number", Value::Number(_))) => {}
                        _ => return Err(reject(name, "missing numeric is_datetime flag")),
                    }
                }
                ("number", Value::Number(_)) | ("checkbox", Value::Bool(_)) => {}
                ("title", Value::String(s)) | ("text", Value::String(s)) | ("url", Value::String(s)) => {
                    if s.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
                        return Err(reject(name, "control characters are not allowed"));
                    }
                }
                _ => return Err(reject(name, "unsupported property encoding")),
            }
        }
        Ok(())
    }

    fn check_option(&self, field: &str, option: &str) -> Result<(), StoreError> {
        if option.contains(self.rules.separator) || option.chars().any(char::is_control) {
            return Err(StoreError::SchemaValidation {
                field: field.to_string(),
                reason: format!("option '{}' contains a forbidden character", option),
            });
        }
        Ok(())
    }

    fn check_auth(state: &MemoryState) -> Result<(), StoreError> {
        if state.credentials_expired {
            Err(StoreError::AuthExpired("store token expired".to_string()))
        } else {
            Ok(())
        }
    }
}

fn decode_list(payload: &Value) -> Option<Vec<String>> {
    match payload {
        Value::Array(items) => items.iter().map(|v| v.as_str().map(String::from)).collect(),
        Value::String(encoded) => serde_json::from_str(encoded).ok(),
        _ => None,
    }
}

impl KnowledgeStore for MemoryStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn create_records(&self, collection: &str, records: &[WireRecord]) -> Result<Vec<RecordId>, StoreError> {
        Self::check_auth(&self.lock())?;

        if records.len() > self.capabilities.batch_limit {
            return Err(StoreError::Http {
                status: 413,
                body: format!("batch of {} exceeds limit {}", records.len(), self.capabilities.batch_limit),
            });
        }

        for (index, record) in records.iter().enumerate() {
            if let Err(err) = self.check_record(record) {
                return Err(if records.len() > 1 {
                    StoreError::BatchWrite {
                        index,
                        reason: err.to_string(),
                    }
                } else {
                    err
                });
            }
        }

        let mut state = self.lock();
        state.create_calls += 1;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            state.next_id += 1;
            let id = RecordId(format!("rec-{:06}", state.next_id));
            state.records.insert(
                id.clone(),
                StoredRecord {
                    id: id.clone(),
                    collection: collection.to_string(),
                    properties: record.properties.clone(),
                    content: record.content.clone(),
                },
            );
            state.order.push(id.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_record(&self, id: &RecordId, record: &WireRecord) -> Result<(), StoreError> {
        Self::check_auth(&self.lock())?;
        self.check_record(record)?;

        let mut state = self.lock();
        let stored = state
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        for (name, value) in &record.properties {
            stored.properties.insert(name.clone(), value.clone());
        }
        if record.content.is_some() {
            stored.content = record.content.clone();
        }
        Ok(())
    }

    fn fetch_record(&self, id: &RecordId) -> Result<StoredRecord, StoreError> {
        let state = self.lock();
        Self::check_auth(&state)?;
        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
