use std::fmt;

use serde::{Deserialize, Serialize};

use crate::browser::driver::BrowserDriver;
use crate::error::{CaptureError, Result};
use crate::locator::identity::text_fingerprint;

/// Widget taxonomy used to pick an interaction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentRole {
    Button,
    Dropdown,
    Toggle,
    Expandable,
    Table,
    Chart,
    Form,
    Modal,
    Nav,
    Link,
    Display,
}

impl ComponentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentRole::Button => "button",
            ComponentRole::Dropdown => "dropdown",
            ComponentRole::Toggle => "toggle",
            ComponentRole::Expandable => "expandable",
            ComponentRole::Table => "table",
            ComponentRole::Chart => "chart",
            ComponentRole::Form => "form",
            ComponentRole::Modal => "modal",
            ComponentRole::Nav => "nav",
            ComponentRole::Link => "link",
            ComponentRole::Display => "display",
        }
    }
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the capture engine drives a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionType {
    Click,
    Hover,
    Select,
    Input,
    Drag,
    None,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Click => "click",
            InteractionType::Hover => "hover",
            InteractionType::Select => "select",
            InteractionType::Input => "input",
            InteractionType::Drag => "drag",
            InteractionType::None => "none",
        }
    }
}

/// Stable structural identity of a UI component.
///
/// `selector + section` is unique within one page snapshot. The same pair is
/// used to re-find the element across navigations and retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentLocator {
    pub selector: String,
    pub role: ComponentRole,
    pub section: String,
    pub label: String,
}

impl ComponentLocator {
    pub fn key(&self) -> String {
        format!("{}::{}", self.section, self.selector)
    }

    pub fn fingerprint(&self) -> String {
        text_fingerprint(&self.key())
    }

    /// Locator for a sub-element (sort header, layout control) of this component.
    pub fn child(&self, selector: &str, label: &str) -> ComponentLocator {
        ComponentLocator {
            selector: selector.to_string(),
            role: self.role,
            section: self.section.clone(),
            label: label.to_string(),
        }
    }

    /// Display name: the label, falling back to the selector.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.selector
        } else {
            &self.label
        }
    }
}

/// Require the selector to resolve to exactly one live element.
pub fn resolve(driver: &mut dyn BrowserDriver, locator: &ComponentLocator) -> Result<()> {
    let matches = driver
        .match_count(&locator.selector)
        .map_err(|e| CaptureError::from_driver(e, &locator.selector))?;

    if matches == 1 {
        Ok(())
    } else {
        Err(CaptureError::LocatorUnresolved {
            selector: locator.selector.clone(),
            matches,
        })
    }
}
