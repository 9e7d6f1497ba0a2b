use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};

/// Top-level entity for one target page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub tags: Vec<String>,
    pub captured_at: DateTime<Utc>,
    pub complete: bool,
}

impl PageRecord {
    pub fn new(url: &str, tags: Vec<String>) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            tags,
            captured_at: Utc::now(),
            complete: false,
        }
    }

    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            self.url.clone()
        } else {
            self.title.trim().to_string()
        }
    }
}

/// Milestones of a page run, in order. Each names the last completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageStage {
    Discovering,
    InventoryPersisted,
    Capturing,
    VariantsPersisted,
    Complete,
}

impl PageStage {
    pub fn next(self) -> Option<PageStage> {
        match self {
            PageStage::Discovering => Some(PageStage::InventoryPersisted),
            PageStage::InventoryPersisted => Some(PageStage::Capturing),
            PageStage::Capturing => Some(PageStage::VariantsPersisted),
            PageStage::VariantsPersisted => Some(PageStage::Complete),
            PageStage::Complete => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageStage::Discovering => "discovering",
            PageStage::InventoryPersisted => "inventoryPersisted",
            PageStage::Capturing => "capturing",
            PageStage::VariantsPersisted => "variantsPersisted",
            PageStage::Complete => "complete",
        }
    }
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-page stage machine with an `Errored` side state.
///
/// `Errored` is reachable from any stage. The only way out is `recover`,
/// which returns to the stage that was current when the failure happened.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLifecycle {
    stage: PageStage,
    errored: Option<String>,
}

impl Default for PageLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLifecycle {
    pub fn new() -> Self {
        Self {
            stage: PageStage::Discovering,
            errored: None,
        }
    }

    pub fn resume(stage: PageStage, errored: Option<String>) -> Self {
        Self { stage, errored }
    }

    pub fn stage(&self) -> PageStage {
        self.stage
    }

    pub fn error(&self) -> Option<&str> {
        self.errored.as_deref()
    }

    pub fn is_errored(&self) -> bool {
        self.errored.is_some()
    }

    pub fn advance(&mut self, to: PageStage) -> Result<()> {
        if self.is_errored() {
            return Err(CaptureError::IllegalTransition {
                from: "errored".to_string(),
                to: to.to_string(),
            });
        }
        if self.stage.next() != Some(to) {
            return Err(CaptureError::IllegalTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }

        self.stage = to;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.errored = Some(reason.into());
    }

    /// Leave `Errored` for the last completed stage.
    pub fn recover(&mut self) -> Result<PageStage> {
        if self.errored.take().is_none() {
            return Err(CaptureError::IllegalTransition {
                from: self.stage.to_string(),
                to: self.stage.to_string(),
            });
        }
        Ok(self.stage)
    }
}
