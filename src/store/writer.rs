use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capture::capture_model::{CaptureStatus, EntryOutcome, PageVariant};
use crate::discovery::inventory_model::ComponentInventory;
use crate::error::{CaptureError, Result, StoreError};
use crate::pipeline::page_record::PageRecord;
use crate::store::client::KnowledgeStore;
use crate::store::records::{
    capture_record, component_record, page_content, page_record, parse_manifest, superseded_component, variant_record,
};
use crate::store::schema::SchemaRules;
use crate::store::store_model::{Record, RecordId, WireRecord};

/// Collection names in the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreCollections {
    pub pages: String,
    pub components: String,
    pub captures: String,
    pub variants: String,
}

impl Default for StoreCollections {
    fn default() -> Self {
        Self {
            pages: "Pages".to_string(),
            components: "Components".to_string(),
            captures: "Captures".to_string(),
            variants: "Page Variants".to_string(),
        }
    }
}

/// Ids of everything persisted for one page so far.
///
/// Saved next to the checkpoint so a resumed run neither duplicates nor
/// drops records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRefs {
    pub page_id: Option<RecordId>,
    /// Locator key -> component record
    pub components: BTreeMap<String, RecordId>,
    /// Locator key -> capture records
    pub captures: BTreeMap<String, Vec<RecordId>>,
    /// Variant name -> variant record
    pub variants: BTreeMap<String, RecordId>,
    /// Variants observed but not yet written
    pub pending_variants: Vec<PageVariant>,
    /// Terminal status per locator key
    pub statuses: BTreeMap<String, CaptureStatus>,
    pub unrestored: BTreeSet<String>,
    /// Records that could not be persisted even after sanitizing
    pub errors: Vec<String>,
}

impl PersistedRefs {
    pub fn count(&self, status: CaptureStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    fn page_id(&self) -> Result<RecordId> {
        self.page_id
            .clone()
            .ok_or_else(|| CaptureError::Config("page record has not been written yet".to_string()))
    }
}

/// Validates and persists page records, inventory, captures and variants.
pub struct KnowledgeStoreWriter<'a> {
    store: &'a dyn KnowledgeStore,
    rules: SchemaRules,
    collections: StoreCollections,
}

impl<'a> KnowledgeStoreWriter<'a> {
    pub fn new(store: &'a dyn KnowledgeStore, rules: SchemaRules, collections: StoreCollections) -> Self {
        Self {
            store,
            rules,
            collections,
        }
    }

    pub fn collections(&self) -> &StoreCollections {
        &self.collections
    }

    /// Most records the store accepts in one create call.
    pub fn batch_limit(&self) -> usize {
        self.store.capabilities().batch_limit.max(1)
    }

    /// Write the whole page graph in store order: page, components and
    /// captures, then variants.
    pub fn write(
        &self,
        page: &PageRecord,
        inventory: &ComponentInventory,
        outcomes: &[EntryOutcome],
        variants: &[PageVariant],
    ) -> Result<PersistedRefs> {
        let mut refs = PersistedRefs {
            page_id: Some(self.write_page_record(page, None)?),
            ..PersistedRefs::default()
        };
        self.write_inventory(page, inventory, &mut refs)?;
        self.write_captures(outcomes, &mut refs)?;
        self.write_variants(variants, &mut refs)?;
        Ok(refs)
    }

    /// Create the page record, or refresh it when `existing` still resolves.
    #[instrument(skip_all, fields(url = %page.url))]
    pub fn write_page_record(&self, page: &PageRecord, existing: Option<&RecordId>) -> Result<RecordId> {
        if let Some(id) = existing {
            match self.store.fetch_record(id) {
                Ok(stored) => {
                    let manifest = parse_manifest(stored.content.as_deref().unwrap_or(""));
                    self.update(id, &page_record(page).content(page_content(page, None, &manifest)))?;
                    debug!(%id, "page record refreshed");
                    return Ok(id.clone());
                }
                Err(StoreError::NotFound(_)) => warn!(%id, "checkpointed page record is gone, creating a new one"),
                Err(err) => return Err(err.into()),
            }
        }

        let record = page_record(page).content(page_content(page, None, &BTreeMap::new()));
        let mut errors = Vec::new();
        let ids = self.create_batched(&self.collections.pages, &[record], &mut errors)?;

        match ids.into_iter().next().flatten() {
            Some(id) => {
                info!(%id, "page record created");
                Ok(id)
            }
            None => Err(CaptureError::SchemaValidationError {
                field: "page".to_string(),
                reason: errors.join("; "),
            }),
        }
    }

    /// Persist inventory entries under the page record.
    ///
    /// Entries whose locator key is already in the page manifest are updated
    /// in place; keys that vanished from this scan are marked superseded.
    #[instrument(skip_all, fields(url = %page.url, entries = inventory.entries.len()))]
    pub fn write_inventory(&self, page: &PageRecord, inventory: &ComponentInventory, refs: &mut PersistedRefs) -> Result<()> {
        let page_id = refs.page_id()?;
        let title = page.display_title();

        let stored = self.store.fetch_record(&page_id)?;
        let mut manifest = parse_manifest(stored.content.as_deref().unwrap_or(""));
        for (key, id) in &refs.components {
            manifest.entry(key.clone()).or_insert_with(|| id.clone());
        }

        // Body text first; child records come after
        let body = Record::new()
            .title("Name", &title)
            .content(page_content(page, Some(inventory), &manifest));
        self.update(&page_id, &body)?;

        let mut fresh = Vec::new();
        let mut updated = 0;
        for entry in &inventory.entries {
            match manifest.get(&entry.key()) {
                Some(id) => {
                    self.update(id, &component_record(entry, &page_id))?;
                    updated += 1;
                }
                None => fresh.push(entry),
            }
        }

        let records: Vec<Record> = fresh.iter().map(|e| component_record(e, &page_id)).collect();
        let ids = self.create_batched(&self.collections.components, &records, &mut refs.errors)?;
        for (entry, id) in fresh.iter().zip(ids) {
            if let Some(id) = id {
                manifest.insert(entry.key(), id);
            }
        }

        let current = inventory.locator_keys();
        let mut superseded = 0;
        for (key, id) in &manifest {
            if !current.contains(key) {
                self.update(id, &superseded_component(key, ""))?;
                superseded += 1;
            }
        }

        let body = Record::new()
            .title("Name", &title)
            .content(page_content(page, Some(inventory), &manifest));
        self.update(&page_id, &body)?;

        info!(created = fresh.len(), updated, superseded, "inventory persisted");
        refs.components = manifest;
        Ok(())
    }

    /// Persist capture results, skipping entries already written.
    pub fn write_captures(&self, outcomes: &[EntryOutcome], refs: &mut PersistedRefs) -> Result<usize> {
        let page_id = refs.page_id()?;

        let mut records = Vec::new();
        let mut owners = Vec::new();
        for outcome in outcomes {
            let key = outcome.entry_key();
            if refs.captures.contains_key(&key) {
                debug!(%key, "captures already persisted");
                continue;
            }

            refs.statuses.insert(key.clone(), outcome.status);
            if !outcome.restored {
                refs.unrestored.insert(key.clone());
            }

            let Some(component_id) = refs.components.get(&key).cloned() else {
                refs.errors.push(format!("{}: no component record to attach captures to", key));
                continue;
            };
            for result in &outcome.results {
                records.push(capture_record(result, outcome.locator.display_name(), &component_id, &page_id));
                owners.push(key.clone());
            }
        }

        if records.is_empty() {
            return Ok(0);
        }

        let ids = self.create_batched(&self.collections.captures, &records, &mut refs.errors)?;
        let mut written = 0;
        for (key, id) in owners.into_iter().zip(ids) {
            let slot = refs.captures.entry(key).or_default();
            if let Some(id) = id {
                slot.push(id);
                written += 1;
            }
        }

        debug!(written, "capture results persisted");
        Ok(written)
    }

    /// Persist page variants, default first, each pointing back at the page.
    pub fn write_variants(&self, variants: &[PageVariant], refs: &mut PersistedRefs) -> Result<()> {
        let page_id = refs.page_id()?;

        let mut pending: Vec<&PageVariant> = variants.iter().filter(|v| !refs.variants.contains_key(&v.name)).collect();
        pending.sort_by(|a, b| a.order.total_cmp(&b.order));

        let records: Vec<Record> = pending.iter().map(|v| variant_record(v, &page_id)).collect();
        let ids = self.create_batched(&self.collections.variants, &records, &mut refs.errors)?;
        for (variant, id) in pending.iter().zip(ids) {
            if let Some(id) = id {
                refs.variants.insert(variant.name.clone(), id);
            }
        }

        refs.pending_variants.retain(|v| !refs.variants.contains_key(&v.name));
        info!(variants = refs.variants.len(), "page variants persisted");
        Ok(())
    }

    /// Mark the page record complete.
    pub fn close_page(&self, page: &PageRecord, refs: &PersistedRefs) -> Result<()> {
        let page_id = refs.page_id()?;
        self.update(&page_id, &page_record(page))
    }

    /// Validate, falling back to a strict sanitize exactly once.
    fn prepare(&self, record: &Record) -> std::result::Result<WireRecord, StoreError> {
        let caps = self.store.capabilities();
        match self.rules.validate(record, &caps) {
            Err(StoreError::SchemaValidation { field, reason }) => {
                debug!(%field, %reason, "sanitizing record and re-validating");
                self.rules.validate(&self.rules.strict_sanitize(record), &caps)
            }
            other => other,
        }
    }

    fn update(&self, id: &RecordId, record: &Record) -> Result<()> {
        let wire = self.prepare(record)?;
        match self.store.update_record(id, &wire) {
            Err(StoreError::SchemaValidation { field, reason }) => {
                warn!(%id, %field, %reason, "store rejected update, retrying sanitized");
                let wire = self.rules.validate(&self.rules.strict_sanitize(record), &self.store.capabilities())?;
                Ok(self.store.update_record(id, &wire)?)
            }
            other => Ok(other?),
        }
    }

    /// Create records in as few calls as the store allows.
    ///
    /// An invalid record never blocks its siblings. A rejected batch is
    /// re-validated as a whole and retried once, then created one record at
    /// a time. Slots are `None` for records that could not be persisted and
    /// the reason is appended to `errors`.
    pub fn create_batched(&self, collection: &str, records: &[Record], errors: &mut Vec<String>) -> Result<Vec<Option<RecordId>>> {
        let caps = self.store.capabilities();
        let mut ids = vec![None; records.len()];

        let mut valid: Vec<(usize, WireRecord)> = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            match self.prepare(record) {
                Ok(wire) => valid.push((i, wire)),
                Err(StoreError::SchemaValidation { field, reason }) => {
                    let err = CaptureError::SchemaValidationError { field, reason };
                    warn!(collection, error = %err, "record left out of batch");
                    errors.push(format!("{} #{}: {}", collection, i, err));
                }
                Err(other) => return Err(other.into()),
            }
        }

        for chunk in valid.chunks(caps.batch_limit.max(1)) {
            let wires: Vec<WireRecord> = chunk.iter().map(|(_, w)| w.clone()).collect();

            let rejected = match self.store.create_records(collection, &wires) {
                Ok(created) => {
                    for ((i, _), id) in chunk.iter().zip(created) {
                        ids[*i] = Some(id);
                    }
                    continue;
                }
                Err(StoreError::BatchWrite { index, reason }) => format!("record {}: {}", index, reason),
                Err(StoreError::SchemaValidation { field, reason }) => format!("{}: {}", field, reason),
                Err(err) => return Err(err.into()),
            };
            warn!(collection, size = chunk.len(), %rejected, "batch rejected, re-validating every record");

            let mut retry: Vec<(usize, WireRecord)> = Vec::with_capacity(chunk.len());
            for (i, _) in chunk {
                match self.rules.validate(&self.rules.strict_sanitize(&records[*i]), &caps) {
                    Ok(wire) => retry.push((*i, wire)),
                    Err(err) => errors.push(format!("{} #{}: {}", collection, i, err)),
                }
            }
            if retry.is_empty() {
                continue;
            }

            let wires: Vec<WireRecord> = retry.iter().map(|(_, w)| w.clone()).collect();
            match self.store.create_records(collection, &wires) {
                Ok(created) => {
                    for ((i, _), id) in retry.iter().zip(created) {
                        ids[*i] = Some(id);
                    }
                }
                Err(StoreError::BatchWrite { .. }) | Err(StoreError::SchemaValidation { .. }) => {
                    warn!(collection, size = retry.len(), "batch rejected twice, creating records one at a time");
                    for (i, wire) in &retry {
                        match self.store.create_records(collection, std::slice::from_ref(wire)) {
                            Ok(mut created) => ids[*i] = created.pop(),
                            Err(StoreError::SchemaValidation { field, reason }) => {
                                let err = CaptureError::SchemaValidationError { field, reason };
                                warn!(collection, error = %err, "record rejected by store");
                                errors.push(format!("{} #{}: {}", collection, i, err));
                            }
                            Err(StoreError::BatchWrite { reason, .. }) => {
                                warn!(collection, %reason, "record rejected by store");
                                errors.push(format!("{} #{}: store rejected record: {}", collection, i, reason));
                            }
                            Err(err) => return Err(err.into()),
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(ids)
    }
}
