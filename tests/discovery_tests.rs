use screen_inventory::browser::driver::BrowserDriver;
use screen_inventory::browser::snapshot::SnapshotNode;
use screen_inventory::discovery::scanner::{ScanOptions, build_entries, scan, scan_with_retry};
use screen_inventory::error::CaptureError;
use screen_inventory::locator::locator_model::{ComponentRole, InteractionType};

mod common;
use crate::common::fixtures::{dashboard_page, node, range_dropdown, settings_page};
use crate::common::mock_driver::MockDriver;

fn fast_scan() -> ScanOptions {
    ScanOptions {
        settle_timeout_ms: 10,
        poll_ms: 1,
        ..ScanOptions::default()
    }
}

// ============================================================================
// Inventory contents
// ============================================================================

#[test]
fn dashboard_inventory_in_document_order() {
    let mut driver = MockDriver::on(dashboard_page());
    let inventory = scan(&mut driver, &fast_scan()).unwrap();

    let roles: Vec<ComponentRole> = inventory.entries.iter().map(|e| e.locator.role).collect();
    assert_eq!(roles, vec![ComponentRole::Button, ComponentRole::Dropdown, ComponentRole::Expandable]);

    let theme = &inventory.entries[0];
    assert_eq!(theme.locator.section, "header");
    assert_eq!(theme.locator.label, "Theme");
    assert_eq!(theme.interaction_type, InteractionType::Click);
    assert_eq!(theme.states, vec!["default", "toggled"]);

    let range = &inventory.entries[1];
    assert_eq!(range.interaction_type, InteractionType::Select);
    assert_eq!(range.states.len(), 5);
    assert_eq!(range.default_state(), "Last 24 hours");
    assert!(range.has_children);

    let advanced = &inventory.entries[2];
    assert_eq!(advanced.states, vec!["collapsed", "expanded"]);
    assert_eq!(inventory.title, "Dashboard");
}

#[test]
fn every_role_gets_its_anticipated_states() {
    let mut driver = MockDriver::on(settings_page());
    let inventory = scan(&mut driver, &fast_scan()).unwrap();

    let states = |selector: &str| {
        inventory
            .entries
            .iter()
            .find(|e| e.locator.selector == selector)
            .map(|e| e.states.clone())
            .unwrap()
    };

    assert_eq!(states("#email"), vec!["empty", "filled", "error"]);
    assert_eq!(states("#notify"), vec!["off", "on"]);
    assert_eq!(states("#users"), vec!["default", "sorted"]);
    assert_eq!(states("#invite"), vec!["closed", "open"]);
    assert_eq!(states("#delete"), vec!["closed", "open"]);
    assert_eq!(states("#traffic"), vec!["default", "layout: Bar"]);
    assert_eq!(states("#home"), vec!["default"]);
}

#[test]
fn hidden_dialog_contents_are_not_components() {
    let mut driver = MockDriver::on(settings_page());
    let inventory = scan(&mut driver, &fast_scan()).unwrap();

    assert_eq!(inventory.entries.len(), 7);
    assert!(inventory.entries.iter().all(|e| !e.locator.selector.starts_with("#invite-")));

    let home = inventory.entries.iter().find(|e| e.locator.selector == "#home").unwrap();
    assert_eq!(home.locator.role, ComponentRole::Nav);
    assert_eq!(home.locator.section, "sidebar nav");
    assert_eq!(home.interaction_type, InteractionType::None);
}

#[test]
fn large_dropdown_is_sampled_to_three_states() {
    let options: Vec<String> = (1..=12).map(|i| format!("Option {}", i)).collect();
    let refs: Vec<&str> = options.iter().map(String::as_str).collect();
    let mut page = dashboard_page();
    page.nodes = vec![range_dropdown(&refs, "Option 6")];

    let entries = build_entries(&page, &ScanOptions::default());
    assert_eq!(entries[0].states, vec!["Option 6", "Option 1", "Option 12"]);
}

#[test]
fn duplicate_locators_are_dropped() {
    let mut page = dashboard_page();
    page.nodes.push(SnapshotNode {
        name: Some("Theme again".to_string()),
        landmark: Some("header".to_string()),
        ..node("#theme-toggle", "button")
    });

    let entries = build_entries(&page, &ScanOptions::default());
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].locator.label, "Theme");
}

#[test]
fn disabled_controls_are_observed_only() {
    let mut page = dashboard_page();
    page.nodes = vec![SnapshotNode {
        text: Some("Export report".to_string()),
        disabled: true,
        ..node("#export", "button")
    }];

    let entries = build_entries(&page, &ScanOptions::default());
    assert_eq!(entries[0].locator.role, ComponentRole::Display);
    assert_eq!(entries[0].interaction_type, InteractionType::None);
    assert_eq!(entries[0].states, vec!["default"]);
}

// ============================================================================
// Read-only scan behaviour
// ============================================================================

#[test]
fn scan_never_interacts_with_components() {
    let mut driver = MockDriver::on(settings_page());
    scan(&mut driver, &fast_scan()).unwrap();

    for verb in ["click", "hover", "fill", "select", "press"] {
        assert_eq!(driver.count_calls(verb), 0, "scan issued a {} call", verb);
    }
    assert_eq!(driver.page(), &settings_page());
}

#[test]
fn baselines_cover_viewport_and_regions() {
    let mut driver = MockDriver::on(dashboard_page());
    let inventory = scan(&mut driver, &fast_scan()).unwrap();

    let names: Vec<&str> = inventory.baselines.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["viewport", "region: Header"]);
    assert_eq!(driver.count_calls("scroll"), 0);
}

#[test]
fn long_page_is_scrolled_and_restored() {
    let mut page = dashboard_page();
    page.scroll_height = 2400;
    let mut driver = MockDriver::on(page);

    let inventory = scan(&mut driver, &fast_scan()).unwrap();

    assert!(inventory.baselines.iter().any(|b| b.name == "scroll-bottom"));
    assert_eq!(inventory.layout.scroll_height, 2400);
    assert!(driver.calls.contains(&"scroll 2400".to_string()));
    assert_eq!(driver.scroll_y().unwrap(), 0);
}

#[test]
fn rediscovery_yields_the_same_locator_set() {
    let mut driver = MockDriver::on(settings_page());
    let first = scan_with_retry(&mut driver, &fast_scan()).unwrap();
    let second = scan_with_retry(&mut driver, &fast_scan()).unwrap();

    assert_eq!(first.locator_keys(), second.locator_keys());
    assert_eq!(first.entries, second.entries);
}

#[test]
fn expired_session_surfaces_from_scan() {
    let mut driver = MockDriver::on(dashboard_page()).expire_session_after(1);
    let err = scan(&mut driver, &fast_scan()).unwrap_err();
    assert!(err.is_auth_expired());
}

// ============================================================================
// Settling
// ============================================================================

#[test]
fn unsettled_page_is_rescanned_with_a_longer_wait() {
    let options = ScanOptions {
        settle_timeout_ms: 1,
        poll_ms: 1,
        ..ScanOptions::default()
    };

    let mut driver = MockDriver::on(dashboard_page()).loading_for(2);
    let err = scan(&mut driver, &options).unwrap_err();
    assert!(matches!(err, CaptureError::ScanIncomplete { waited_ms: 1, .. }));

    let mut driver = MockDriver::on(dashboard_page()).loading_for(2);
    let inventory = scan_with_retry(&mut driver, &options).unwrap();
    assert_eq!(inventory.entries.len(), 3);
    assert!(inventory.entries.iter().all(|e| !e.locator.selector.starts_with("#loading")));
}

#[test]
fn extreme_settle_timeout_does_not_overflow() {
    let options = ScanOptions {
        settle_timeout_ms: u64::MAX,
        poll_ms: u64::MAX,
        ..ScanOptions::default()
    };

    let mut driver = MockDriver::on(dashboard_page()).loading_for(2);
    let inventory = scan_with_retry(&mut driver, &options).unwrap();
    assert_eq!(inventory.entries.len(), 3);
}
