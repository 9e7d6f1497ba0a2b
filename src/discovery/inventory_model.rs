use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::driver::ImageHandle;
use crate::browser::snapshot::{PageState, Region, Viewport};
use crate::locator::locator_model::{ComponentLocator, InteractionType};

/// A discovered component with its anticipated interaction and states.
///
/// Immutable once created; a fresh scan supersedes it instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub locator: ComponentLocator,
    pub has_children: bool,
    pub interaction_type: InteractionType,
    /// Ordered anticipated state names; the first is the default state.
    pub states: Vec<String>,
}

impl InventoryEntry {
    pub fn key(&self) -> String {
        self.locator.key()
    }

    pub fn default_state(&self) -> &str {
        self.states.first().map(String::as_str).unwrap_or("default")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSummary {
    pub viewport: Viewport,
    pub scroll_height: u32,
    pub regions: Vec<Region>,
}

/// A default-state screenshot taken during the read-only scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineShot {
    pub name: String,
    pub screenshot: ImageHandle,
}

/// Output of one discovery pass over a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInventory {
    pub page_url: String,
    pub title: String,
    pub scanned_at: DateTime<Utc>,
    pub page_state: PageState,
    pub layout: LayoutSummary,
    pub baselines: Vec<BaselineShot>,
    pub entries: Vec<InventoryEntry>,
}

impl ComponentInventory {
    /// Order-independent identity of the inventory.
    pub fn locator_keys(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.key()).collect()
    }

    pub fn entry(&self, key: &str) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }
}
