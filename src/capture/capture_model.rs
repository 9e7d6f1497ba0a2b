use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::driver::ImageHandle;
use crate::locator::locator_model::ComponentLocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    Ok,
    Skipped,
    Failed,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Ok => "ok",
            CaptureStatus::Skipped => "skipped",
            CaptureStatus::Failed => "failed",
        }
    }
}

/// One observed state of a component. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    /// Locator key of the owning inventory entry
    pub entry_key: String,
    pub state_name: String,
    pub trigger: String,
    pub screenshot_ref: Option<ImageHandle>,
    pub restored: bool,
    pub status: CaptureStatus,
    pub notes: String,
}

/// Everything one protocol run produced for one inventory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryOutcome {
    pub locator: ComponentLocator,
    pub results: Vec<CaptureResult>,
    pub restored: bool,
    /// Terminal status of the entry: failed beats skipped beats ok
    pub status: CaptureStatus,
}

impl EntryOutcome {
    pub fn entry_key(&self) -> String {
        self.locator.key()
    }

    pub fn results_with(&self, status: CaptureStatus) -> impl Iterator<Item = &CaptureResult> {
        self.results.iter().filter(move |r| r.status == status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariantKind {
    Default,
    Loading,
    Empty,
    Error,
    Mobile,
    Desktop,
    ThemeAlt,
    Other,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Default => "default",
            VariantKind::Loading => "loading",
            VariantKind::Empty => "empty",
            VariantKind::Error => "error",
            VariantKind::Mobile => "mobile",
            VariantKind::Desktop => "desktop",
            VariantKind::ThemeAlt => "themeAlt",
            VariantKind::Other => "other",
        }
    }
}

/// A full-page state, sibling to (not child of) component entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVariant {
    pub name: String,
    pub kind: VariantKind,
    /// Sort key for consumers; the default variant is always 0
    pub order: f64,
    pub notes: String,
    pub screenshot_ref: Option<ImageHandle>,
    /// URL of the page record this variant belongs to
    pub page_url: String,
}

/// Tunables for the interaction protocols.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Wait after each trigger before capturing
    pub stabilize_ms: u64,

    /// Per-component protocol budget
    pub component_budget: Duration,

    /// Per-page capture budget
    pub page_budget: Duration,

    /// Representative value typed into free-text inputs
    pub text_value: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            stabilize_ms: 600,
            component_budget: Duration::from_secs(8),
            page_budget: Duration::from_secs(300),
            text_value: "Sample text".to_string(),
        }
    }
}
