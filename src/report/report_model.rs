use serde::{Deserialize, Serialize};

use crate::capture::capture_model::CaptureStatus;
use crate::discovery::inventory_model::ComponentInventory;
use crate::pipeline::checkpoint::Checkpoint;
use crate::pipeline::page_record::PageStage;
use crate::store::store_model::RecordId;
use crate::store::writer::PersistedRefs;

// ============================================================================
// Pipeline report: per-page outcome counts
// ============================================================================

/// Outcome of one page run. Partial success is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    pub url: String,

    pub title: String,

    /// Last completed stage
    pub stage: PageStage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<RecordId>,

    /// Inventory entries discovered
    pub components: usize,

    pub captured: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Page variants persisted (or observed, before they are persisted)
    pub variants: usize,

    /// Locator keys whose protocol did not restore the starting state
    pub unrestored: Vec<String>,

    /// Page-level failure that stopped the run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Records the store refused even after sanitizing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_errors: Vec<String>,
}

impl PageReport {
    /// Build a report purely from persisted state.
    pub fn from_state(
        url: &str,
        checkpoint: Option<&Checkpoint>,
        inventory: Option<&ComponentInventory>,
        refs: Option<&PersistedRefs>,
        error: Option<String>,
    ) -> Self {
        let empty = PersistedRefs::default();
        let refs = refs.unwrap_or(&empty);

        let variants = if refs.variants.is_empty() {
            refs.pending_variants.len()
        } else {
            refs.variants.len()
        };

        Self {
            url: url.to_string(),
            title: inventory.map(|i| i.title.clone()).unwrap_or_default(),
            stage: checkpoint.map_or(PageStage::Discovering, |c| c.stage),
            page_id: checkpoint.and_then(|c| c.page_id.clone()).or_else(|| refs.page_id.clone()),
            components: inventory.map_or(0, |i| i.entries.len()),
            captured: refs.count(CaptureStatus::Ok),
            skipped: refs.count(CaptureStatus::Skipped),
            failed: refs.count(CaptureStatus::Failed),
            variants,
            unrestored: refs.unrestored.iter().cloned().collect(),
            error: error.or_else(|| checkpoint.and_then(|c| c.errored.clone())),
            write_errors: refs.errors.clone(),
        }
    }

    /// A page the pipeline never got to.
    pub fn not_started(url: &str, reason: &str) -> Self {
        Self::from_state(url, None, None, None, Some(reason.to_string()))
    }

    pub fn is_complete(&self) -> bool {
        self.stage == PageStage::Complete && self.error.is_none()
    }
}

/// Aggregated report for one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub pages: Vec<PageReport>,

    /// True when an `AuthExpired` stopped the pipeline
    pub halted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

impl PipelineReport {
    pub fn from_pages(pages: Vec<PageReport>, halted: bool) -> Self {
        Self {
            pages,
            halted,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u128) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// (captured, skipped, failed) across all pages.
    pub fn totals(&self) -> (usize, usize, usize) {
        self.pages.iter().fold((0, 0, 0), |(c, s, f), p| (c + p.captured, s + p.skipped, f + p.failed))
    }

    pub fn all_complete(&self) -> bool {
        !self.halted && self.pages.iter().all(PageReport::is_complete)
    }
}
