use crate::browser::driver::BrowserDriver;
use crate::browser::snapshot::{PageSnapshot, SnapshotNode};
use crate::error::{CaptureError, Result};
use crate::locator::classifier::label_for;

/// Handler fragments that open a native dialog and stall the driver.
const BLOCKING_PATTERNS: [&str; 5] = ["confirm(", "alert(", "prompt(", "onbeforeunload", "beforeunload"];

/// Labels accepted as a cancel-equivalent dismissal.
const CANCEL_LABELS: [&str; 6] = ["cancel", "close", "dismiss", "no", "not now", "\u{00d7}"];

/// Labels that must never be clicked to dismiss a dialog.
const DESTRUCTIVE_LABELS: [&str; 8] = ["delete", "remove", "confirm", "ok", "yes", "submit", "discard", "save"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Safe,
    Blocking(String),
}

/// Statically check that triggering a modal will not raise a native dialog.
///
/// Looks at the handler captured in the snapshot and at the live `onclick`
/// attribute; nothing is clicked.
pub fn inspect_trigger(driver: &mut dyn BrowserDriver, node: &SnapshotNode) -> Result<GuardVerdict> {
    if let Some(pattern) = node.handler.as_deref().and_then(blocking_pattern) {
        return Ok(GuardVerdict::Blocking(pattern.to_string()));
    }

    let live = driver
        .handler_source(&node.selector)
        .map_err(|e| CaptureError::from_driver(e, &node.selector))?;

    Ok(match live.as_deref().and_then(blocking_pattern) {
        Some(pattern) => GuardVerdict::Blocking(pattern.to_string()),
        None => GuardVerdict::Safe,
    })
}

fn blocking_pattern(source: &str) -> Option<&'static str> {
    let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();
    BLOCKING_PATTERNS.iter().copied().find(|p| compact.contains(p))
}

pub fn is_destructive_label(label: &str) -> bool {
    let lower = label.trim().to_lowercase();
    DESTRUCTIVE_LABELS.iter().any(|d| lower == *d || lower.starts_with(&format!("{} ", d)))
}

/// First visible cancel-equivalent button on the page, never a destructive one.
pub fn find_cancel_control(snapshot: &PageSnapshot) -> Option<&SnapshotNode> {
    snapshot.nodes.iter().find(|n| {
        if n.hidden || !(n.tag == "button" || n.role.as_deref() == Some("button")) {
            return false;
        }
        let Some(label) = label_for(n) else {
            return false;
        };
        let lower = label.to_lowercase();
        !is_destructive_label(&lower) && CANCEL_LABELS.iter().any(|c| lower == *c)
    })
}
