use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::StoreError;
use crate::store::store_model::{RecordId, StoreCapabilities, StoredRecord, WireRecord};

/// The structured knowledge store the pipeline writes to.
///
/// Shared by all page workers; implementations must be safe to call from
/// several threads at once.
pub trait KnowledgeStore: Send + Sync {
    fn capabilities(&self) -> StoreCapabilities;

    /// Create records under a collection, all or nothing. Ids come back in
    /// input order.
    fn create_records(&self, collection: &str, records: &[WireRecord]) -> Result<Vec<RecordId>, StoreError>;

    /// Merge the given properties into a record; replaces content when set.
    fn update_record(&self, id: &RecordId, record: &WireRecord) -> Result<(), StoreError>;

    fn fetch_record(&self, id: &RecordId) -> Result<StoredRecord, StoreError>;
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    ids: Vec<RecordId>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}

/// JSON-over-HTTP knowledge store client.
pub struct HttpKnowledgeStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: String,
    capabilities: StoreCapabilities,
}

impl HttpKnowledgeStore {
    pub fn new(endpoint: &str, token: &str, capabilities: StoreCapabilities, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
            capabilities,
        })
    }

    fn check(response: reqwest::blocking::Response, subject: &str) -> Result<reqwest::blocking::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let detail: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let reason = if detail.message.is_empty() { body.clone() } else { detail.message };

        Err(match status.as_u16() {
            400 => match detail.index {
                Some(index) => StoreError::BatchWrite { index, reason },
                None => StoreError::SchemaValidation {
                    field: detail.field.unwrap_or_else(|| "unknown".to_string()),
                    reason,
                },
            },
            401 | 403 => StoreError::AuthExpired(reason),
            404 => StoreError::NotFound(subject.to_string()),
            code => StoreError::Http { status: code, body },
        })
    }
}

impl KnowledgeStore for HttpKnowledgeStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn create_records(&self, collection: &str, records: &[WireRecord]) -> Result<Vec<RecordId>, StoreError> {
        debug!(collection, count = records.len(), "creating records");

        let url = format!("{}/collections/{}/records", self.endpoint, collection);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "records": records }))
            .send()?;

        let created: CreateResponse = Self::check(response, collection)?.json()?;
        if created.ids.len() != records.len() {
            return Err(StoreError::Http {
                status: 200,
                body: format!("expected {} ids, store returned {}", records.len(), created.ids.len()),
            });
        }
        Ok(created.ids)
    }

    fn update_record(&self, id: &RecordId, record: &WireRecord) -> Result<(), StoreError> {
        let url = format!("{}/records/{}", self.endpoint, id);
        let response = self.client.patch(&url).bearer_auth(&self.token).json(record).send()?;
        Self::check(response, id.as_str())?;
        Ok(())
    }

    fn fetch_record(&self, id: &RecordId) -> Result<StoredRecord, StoreError> {
        let url = format!("{}/records/{}", self.endpoint, id);
        let response = self.client.get(&url).bearer_auth(&self.token).send()?;
        Ok(Self::check(response, id.as_str())?.json()?)
    }
}
