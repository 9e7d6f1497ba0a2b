use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discovery::inventory_model::ComponentInventory;
use crate::error::{CaptureError, Result};
use crate::locator::identity::text_fingerprint;
use crate::pipeline::page_record::PageStage;
use crate::store::store_model::RecordId;
use crate::store::writer::PersistedRefs;

const CHECKPOINT_FILE: &str = "checkpoints.json";

/// Durable progress marker for one page: (stage, page record id, last
/// persisted entry index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub page_url: String,
    pub page_id: Option<RecordId>,
    pub stage: PageStage,
    /// Index of the last inventory entry whose captures are persisted
    pub last_index: Option<usize>,
    #[serde(default)]
    pub errored: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(page_url: &str) -> Self {
        Self {
            page_url: page_url.to_string(),
            page_id: None,
            stage: PageStage::Discovering,
            last_index: None,
            errored: None,
            updated_at: Utc::now(),
        }
    }

    /// First inventory index still to capture.
    pub fn resume_index(&self) -> usize {
        self.last_index.map_or(0, |i| i + 1)
    }
}

/// Checkpoint directory: one shared table plus per-page snapshots.
///
/// Every file is replaced atomically (write to a temp file, then rename).
pub struct CheckpointStore {
    dir: PathBuf,
    table_lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CaptureError::checkpoint(&dir, e))?;
        Ok(Self {
            dir,
            table_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn page_file(&self, url: &str, kind: &str) -> PathBuf {
        let key: String = text_fingerprint(url).chars().take(16).collect();
        self.dir.join(format!("{}.{}.json", key, kind))
    }

    fn table_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Every checkpoint, keyed by page URL.
    pub fn load_all(&self) -> Result<BTreeMap<String, Checkpoint>> {
        Ok(read_json(&self.table_path())?.unwrap_or_default())
    }

    pub fn load(&self, url: &str) -> Result<Option<Checkpoint>> {
        Ok(self.load_all()?.remove(url))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let _guard = self.table_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut table = self.load_all()?;
        let mut checkpoint = checkpoint.clone();
        checkpoint.updated_at = Utc::now();
        debug!(url = %checkpoint.page_url, stage = %checkpoint.stage, last_index = ?checkpoint.last_index, "checkpoint");
        table.insert(checkpoint.page_url.clone(), checkpoint);

        write_json_atomic(&self.table_path(), &table)
    }

    pub fn save_inventory(&self, url: &str, inventory: &ComponentInventory) -> Result<()> {
        write_json_atomic(&self.page_file(url, "inventory"), inventory)
    }

    pub fn load_inventory(&self, url: &str) -> Result<Option<ComponentInventory>> {
        read_json(&self.page_file(url, "inventory"))
    }

    pub fn save_refs(&self, url: &str, refs: &PersistedRefs) -> Result<()> {
        write_json_atomic(&self.page_file(url, "refs"), refs)
    }

    pub fn load_refs(&self, url: &str) -> Result<Option<PersistedRefs>> {
        read_json(&self.page_file(url, "refs"))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CaptureError::checkpoint(path, e)),
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, json).map_err(|e| CaptureError::checkpoint(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CaptureError::checkpoint(path, e))
}
