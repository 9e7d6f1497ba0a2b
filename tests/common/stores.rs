use std::sync::atomic::{AtomicUsize, Ordering};

use screen_inventory::error::StoreError;
use screen_inventory::store::client::KnowledgeStore;
use screen_inventory::store::memory::MemoryStore;
use screen_inventory::store::store_model::{RecordId, StoreCapabilities, StoredRecord, WireRecord, wire_kind};
use serde_json::Value;

/// A store that refuses, by batch index, every record with a given title.
///
/// The refused records pass local validation, so only the store's own
/// answer can keep them out. Rejections are reported the way the HTTP
/// store reports them, even for one-record calls.
pub struct RejectingStore {
    pub inner: MemoryStore,
    refused_title: String,
    rejected_calls: AtomicUsize,
}

impl RejectingStore {
    pub fn new(capabilities: StoreCapabilities, refused_title: &str) -> Self {
        Self {
            inner: MemoryStore::new(capabilities),
            refused_title: refused_title.to_string(),
            rejected_calls: AtomicUsize::new(0),
        }
    }

    pub fn rejected_calls(&self) -> usize {
        self.rejected_calls.load(Ordering::SeqCst)
    }

    fn is_refused(&self, record: &WireRecord) -> bool {
        record.properties.values().any(|value| {
            matches!(wire_kind(value), Some(("title", Value::String(title))) if *title == self.refused_title)
        })
    }
}

impl KnowledgeStore for RejectingStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }

    fn create_records(&self, collection: &str, records: &[WireRecord]) -> Result<Vec<RecordId>, StoreError> {
        if let Some(index) = records.iter().position(|r| self.is_refused(r)) {
            self.rejected_calls.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::BatchWrite {
                index,
                reason: "rejected".to_string(),
            });
        }
        self.inner.create_records(collection, records)
    }

    fn update_record(&self, id: &RecordId, record: &WireRecord) -> Result<(), StoreError> {
        self.inner.update_record(id, record)
    }

    fn fetch_record(&self, id: &RecordId) -> Result<StoredRecord, StoreError> {
        self.inner.fetch_record(id)
    }
}
