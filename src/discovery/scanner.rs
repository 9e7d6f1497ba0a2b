use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::browser::driver::BrowserDriver;
use crate::browser::snapshot::PageSnapshot;
use crate::discovery::inventory_model::{BaselineShot, ComponentInventory, InventoryEntry, LayoutSummary};
use crate::discovery::states::{anticipated_states, interaction_for};
use crate::error::{CaptureError, Result};
use crate::locator::classifier::{classify_node, locator_for};

/// Controls the read-only discovery pass.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Bounded wait for a stable render
    pub settle_timeout_ms: u64,

    /// Interval between stability probes
    pub poll_ms: u64,

    /// Dropdowns with more options than this are sampled
    pub dropdown_sample_limit: usize,

    /// Upper bound on alternate chart layouts
    pub max_chart_layouts: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 3000,
            poll_ms: 500,
            dropdown_sample_limit: 5,
            max_chart_layouts: 4,
        }
    }
}

/// Scan, retrying once with a doubled settle timeout on `ScanIncomplete`.
pub fn scan_with_retry(driver: &mut dyn BrowserDriver, options: &ScanOptions) -> Result<ComponentInventory> {
    match scan(driver, options) {
        Err(CaptureError::ScanIncomplete { url, waited_ms }) => {
            warn!(%url, waited_ms, "page not stable, retrying scan with extended wait");
            let extended = ScanOptions {
                settle_timeout_ms: options.settle_timeout_ms.saturating_mul(2),
                ..options.clone()
            };
            scan(driver, &extended)
        }
        other => other,
    }
}

/// Walk the rendered page and emit a component inventory.
///
/// Read-only: structural queries and screenshots, no clicks. The only page
/// mutation is scroll exploration, and scroll is restored to the top before
/// returning.
#[instrument(skip_all)]
pub fn scan(driver: &mut dyn BrowserDriver, options: &ScanOptions) -> Result<ComponentInventory> {
    let snapshot = wait_for_stable(driver, options.settle_timeout_ms, options.poll_ms)?;
    let entries = build_entries(&snapshot, options);

    let mut baselines = capture_baselines(driver, &snapshot)?;
    explore_scroll(driver, &snapshot, options.poll_ms, &mut baselines)?;

    info!(
        url = %snapshot.url,
        components = entries.len(),
        regions = snapshot.regions.len(),
        "discovery complete"
    );

    Ok(ComponentInventory {
        page_url: snapshot.url.clone(),
        title: snapshot.title.clone(),
        scanned_at: chrono::Utc::now(),
        page_state: snapshot.page_state.clone(),
        layout: LayoutSummary {
            viewport: snapshot.viewport,
            scroll_height: snapshot.scroll_height,
            regions: snapshot.regions.clone(),
        },
        baselines,
        entries,
    })
}

/// Poll snapshots until two consecutive structural fingerprints agree.
pub fn wait_for_stable(driver: &mut dyn BrowserDriver, settle_timeout_ms: u64, poll_ms: u64) -> Result<PageSnapshot> {
    let poll_ms = poll_ms.max(1);
    let mut previous = driver.snapshot()?;
    let mut waited = 0;

    while waited < settle_timeout_ms {
        driver.wait_for(poll_ms)?;
        waited = waited.saturating_add(poll_ms);

        let current = driver.snapshot()?;
        if current.structure_fingerprint() == previous.structure_fingerprint() {
            debug!(waited_ms = waited, "render stable");
            return Ok(current);
        }
        previous = current;
    }

    Err(CaptureError::ScanIncomplete {
        url: previous.url,
        waited_ms: waited,
    })
}

/// Classify snapshot nodes into inventory entries, in document order.
/// Later nodes with an already-seen `(section, selector)` are dropped.
pub fn build_entries(snapshot: &PageSnapshot, options: &ScanOptions) -> Vec<InventoryEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for node in &snapshot.nodes {
        let Some(role) = classify_node(node) else {
            continue;
        };

        let locator = locator_for(node, role);
        if !seen.insert(locator.key()) {
            debug!(key = %locator.key(), "duplicate locator dropped");
            continue;
        }

        entries.push(InventoryEntry {
            has_children: node.child_count > 0 || !node.options.is_empty(),
            interaction_type: interaction_for(role, node),
            states: anticipated_states(role, node, options.dropdown_sample_limit, options.max_chart_layouts),
            locator,
        });
    }

    entries
}

/// Full viewport plus one screenshot per landmark region.
fn capture_baselines(driver: &mut dyn BrowserDriver, snapshot: &PageSnapshot) -> Result<Vec<BaselineShot>> {
    let mut shots = vec![BaselineShot {
        name: "viewport".to_string(),
        screenshot: driver.screenshot(None)?,
    }];

    for region in &snapshot.regions {
        shots.push(BaselineShot {
            name: format!("region: {}", region.name),
            screenshot: driver.screenshot(Some(&region.selector))?,
        });
    }

    Ok(shots)
}

/// Capture the bottom of the page, then restore scroll to the top.
fn explore_scroll(
    driver: &mut dyn BrowserDriver,
    snapshot: &PageSnapshot,
    poll_ms: u64,
    shots: &mut Vec<BaselineShot>,
) -> Result<()> {
    if !snapshot.exceeds_viewport() {
        return Ok(());
    }

    driver.scroll_to(snapshot.scroll_height)?;
    driver.wait_for(poll_ms)?;
    shots.push(BaselineShot {
        name: "scroll-bottom".to_string(),
        screenshot: driver.screenshot(None)?,
    });

    // Later stages assume a top-of-page start
    for _ in 0..2 {
        driver.scroll_to(0)?;
        if driver.scroll_y()? == 0 {
            return Ok(());
        }
        driver.wait_for(poll_ms)?;
    }

    Err(CaptureError::RestorationFailed {
        selector: "window".to_string(),
        detail: "scroll position did not return to 0".to_string(),
    })
}
