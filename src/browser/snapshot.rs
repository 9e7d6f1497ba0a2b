use serde::{Deserialize, Serialize};

use crate::locator::identity::text_fingerprint;

// ============================================================================
// Accessibility snapshot returned by the browser surface
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

/// Page-wide state signals. A change here after a trigger is a page variant,
/// not a component-local state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub layout: Option<String>,
}

/// A landmark region of the page (header, nav, main, aside, footer...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub selector: String,
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub height: u32,
}

/// A control that switches a chart to a named layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutControl {
    pub name: String,
    pub selector: String,
}

/// One element of the accessibility / interactive-element tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub selector: String,
    pub tag: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Accessible name (aria-label or computed name)
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
    /// Name of the nearest landmark ancestor
    #[serde(default)]
    pub landmark: Option<String>,
    /// aria-haspopup value
    #[serde(default)]
    pub has_popup: Option<String>,
    #[serde(default)]
    pub expanded: Option<bool>,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub pressed: Option<bool>,
    #[serde(default)]
    pub selected: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// aria-sort of the active sort column, if any
    #[serde(default)]
    pub sort: Option<String>,
    /// Selector of the first sortable column header
    #[serde(default)]
    pub sort_selector: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub layouts: Vec<LayoutControl>,
    #[serde(default)]
    pub active_layout: Option<String>,
    #[serde(default)]
    pub child_count: usize,
    /// Inline handler source (onclick attribute) when present
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// Externally observable state of a single component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

impl ComponentState {
    /// Compact single-line rendering for notes and logs.
    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl SnapshotNode {
    pub fn observable_state(&self) -> ComponentState {
        ComponentState {
            expanded: self.expanded,
            checked: self.checked,
            pressed: self.pressed,
            selected: self.selected.clone(),
            value: self.value.clone(),
            sort: self.sort.clone(),
            layout: self.active_layout.clone(),
        }
    }

    pub fn is_dialog(&self) -> bool {
        matches!(self.role.as_deref(), Some("dialog") | Some("alertdialog")) || self.tag == "dialog"
    }
}

/// Full structural snapshot of the current page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub scroll_height: u32,
    #[serde(default)]
    pub page_state: PageState,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
}

impl PageSnapshot {
    pub fn find(&self, selector: &str) -> Option<&SnapshotNode> {
        self.nodes.iter().find(|n| n.selector == selector)
    }

    pub fn count(&self, selector: &str) -> usize {
        self.nodes.iter().filter(|n| n.selector == selector).count()
    }

    pub fn has_open_dialog(&self) -> bool {
        self.nodes.iter().any(|n| n.is_dialog() && !n.hidden)
    }

    pub fn exceeds_viewport(&self) -> bool {
        self.scroll_height > self.viewport.height
    }

    /// Fingerprint of the page structure. Text and component state are left
    /// out so tickers and clocks don't keep the page "unstable".
    pub fn structure_fingerprint(&self) -> String {
        let mut parts: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| !n.hidden)
            .map(|n| format!("{}|{}|{}", n.selector, n.tag, n.role.as_deref().unwrap_or("")))
            .collect();
        parts.sort();
        parts.push(format!("scroll:{}", self.scroll_height));
        text_fingerprint(&parts.join("\n"))
    }
}
