use std::collections::BTreeMap;

use crate::capture::capture_model::{CaptureResult, PageVariant};
use crate::discovery::inventory_model::{ComponentInventory, InventoryEntry};
use crate::pipeline::page_record::PageRecord;
use crate::store::store_model::{Record, RecordId};

const MANIFEST_PREFIX: &str = "manifest: ";

// ============================================================================
// Domain -> store record mapping
// ============================================================================

pub fn page_record(page: &PageRecord) -> Record {
    Record::new()
        .title("Name", page.display_title())
        .url("URL", &page.url)
        .multi_select("Tags", page.tags.clone())
        .date("Captured", page.captured_at)
        .select("Status", if page.complete { "complete" } else { "in progress" })
}

/// Page body: a readable summary followed by the component manifest.
///
/// Body text is written before any child record is created.
pub fn page_content(page: &PageRecord, inventory: Option<&ComponentInventory>, manifest: &BTreeMap<String, RecordId>) -> String {
    let mut lines = vec![format!("# {}", page.display_title()), String::new(), format!("URL: {}", page.url)];

    if let Some(inv) = inventory {
        let layout = &inv.layout;
        lines.push(format!(
            "Viewport: {}x{}, scroll height {}",
            layout.viewport.width, layout.viewport.height, layout.scroll_height
        ));
        if !layout.regions.is_empty() {
            let names: Vec<&str> = layout.regions.iter().map(|r| r.name.as_str()).collect();
            lines.push(format!("Regions: {}", names.join(" | ")));
        }
        lines.push(format!("Components: {}", inv.entries.len()));
        for shot in &inv.baselines {
            lines.push(format!("Baseline {}: {}", shot.name, shot.screenshot.as_str()));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{}{}",
        MANIFEST_PREFIX,
        serde_json::to_string(manifest).unwrap_or_else(|_| "{}".to_string())
    ));
    lines.join("\n")
}

/// Locator key -> component record id, as written by `page_content`.
pub fn parse_manifest(content: &str) -> BTreeMap<String, RecordId> {
    content
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(MANIFEST_PREFIX))
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

pub fn component_record(entry: &InventoryEntry, page_id: &RecordId) -> Record {
    let locator = &entry.locator;
    Record::new()
        .title("Name", locator.display_name())
        .select("Role", locator.role.as_str())
        .select("Section", &locator.section)
        .text("Selector", &locator.selector)
        .text("Locator Key", locator.key())
        .select("Interaction", entry.interaction_type.as_str())
        .multi_select("States", entry.states.clone())
        .checkbox("Has Children", entry.has_children)
        .checkbox("Superseded", false)
        .relation("Page", vec![page_id.clone()])
}

/// Marks a component that a later scan no longer found.
pub fn superseded_component(entry_key: &str, label: &str) -> Record {
    Record::new()
        .title("Name", if label.is_empty() { entry_key } else { label })
        .checkbox("Superseded", true)
}

pub fn capture_record(result: &CaptureResult, label: &str, component_id: &RecordId, page_id: &RecordId) -> Record {
    let mut record = Record::new()
        .title("Name", format!("{} / {}", label, result.state_name))
        .select("State", &result.state_name)
        .text("Trigger", &result.trigger)
        .checkbox("Restored", result.restored)
        .select("Status", result.status.as_str())
        .relation("Component", vec![component_id.clone()])
        .relation("Page", vec![page_id.clone()]);

    if let Some(shot) = &result.screenshot_ref {
        record = record.text("Screenshot", shot.as_str());
    }
    if !result.notes.is_empty() {
        record = record.text("Notes", &result.notes);
    }
    record
}

pub fn variant_record(variant: &PageVariant, page_id: &RecordId) -> Record {
    let mut record = Record::new()
        .title("Name", &variant.name)
        .select("Kind", variant.kind.as_str())
        .number("Order", variant.order)
        .text("Notes", &variant.notes)
        .relation("Page", vec![page_id.clone()]);

    if let Some(shot) = &variant.screenshot_ref {
        record = record.text("Screenshot", shot.as_str());
    }
    record
}
