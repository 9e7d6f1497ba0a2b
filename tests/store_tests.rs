use screen_inventory::capture::capture_model::{CaptureOptions, EntryOutcome, PageVariant};
use screen_inventory::capture::engine::CaptureEngine;
use screen_inventory::capture::variants::VariantLog;
use screen_inventory::discovery::inventory_model::ComponentInventory;
use screen_inventory::discovery::scanner::{ScanOptions, scan};
use screen_inventory::pipeline::page_record::PageRecord;
use screen_inventory::store::schema::SchemaRules;
use screen_inventory::store::store_model::{Record, StoreCapabilities};
use screen_inventory::store::writer::{KnowledgeStoreWriter, PersistedRefs, StoreCollections};
use screen_inventory::trace::logger::TraceLogger;

mod common;
use crate::common::fixtures::{DASHBOARD, Workspace, dashboard_page};
use crate::common::mock_driver::MockDriver;
use crate::common::stores::RejectingStore;

// ============================================================================
// Helpers
// ============================================================================

struct Captured {
    page: PageRecord,
    inventory: ComponentInventory,
    outcomes: Vec<EntryOutcome>,
    variants: Vec<PageVariant>,
}

fn captured_dashboard() -> Captured {
    let mut driver = MockDriver::on(dashboard_page());
    let scan_options = ScanOptions {
        settle_timeout_ms: 10,
        poll_ms: 1,
        ..ScanOptions::default()
    };
    let inventory = scan(&mut driver, &scan_options).unwrap();

    let options = CaptureOptions {
        stabilize_ms: 0,
        ..CaptureOptions::default()
    };
    let trace = TraceLogger::disabled();
    let mut log = VariantLog::new(DASHBOARD, inventory.page_state.clone(), None);
    let capture = CaptureEngine::new(&options, &trace)
        .capture_page(&mut driver, &inventory, 0, &mut log, |_, _, _| Ok(()))
        .unwrap();

    let mut page = PageRecord::new(DASHBOARD, vec!["smoke".to_string()]);
    page.title = inventory.title.clone();

    Captured {
        page,
        inventory,
        outcomes: capture.outcomes,
        variants: log.into_variants(),
    }
}

// ============================================================================
// Record graph
// ============================================================================

#[test]
fn page_graph_is_written_with_relations() {
    let ws = Workspace::new();
    let c = captured_dashboard();

    let refs = ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();
    let page_id = refs.page_id.clone().unwrap();

    assert_eq!(ws.pages().len(), 1);
    assert_eq!(ws.components().len(), 3);
    assert_eq!(ws.captures().len(), 9);
    assert_eq!(ws.variants().len(), 2);

    for component in ws.components() {
        assert_eq!(component.relation_ids("Page"), vec![page_id.clone()]);
    }
    for capture in ws.captures() {
        assert_eq!(capture.relation_ids("Page"), vec![page_id.clone()]);
        assert_eq!(capture.relation_ids("Component").len(), 1);
    }
    assert!(refs.errors.is_empty());
}

#[test]
fn page_record_uses_namespaced_url_and_manifest_body() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    let page = &ws.pages()[0];
    assert_eq!(page.string("userDefined:URL"), Some(DASHBOARD));
    assert!(!page.properties.contains_key("URL"));
    assert_eq!(page.list("Tags"), vec!["smoke"]);
    assert!(page.properties.contains_key("date:Captured:start"));

    let body = page.content.as_deref().unwrap();
    assert!(body.starts_with("# Dashboard"));
    assert!(body.contains("Components: 3"));
    assert!(body.contains("manifest: "));
}

#[test]
fn select_options_never_carry_the_separator() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    let states: Vec<String> = ws.captures_of("Date range").iter().filter_map(|r| r.string("State").map(String::from)).collect();
    assert!(states.contains(&"Last 7 days/ hourly".to_string()));
    assert!(states.iter().all(|s| !s.contains(',')));

    let range = ws
        .components()
        .into_iter()
        .find(|r| r.string("Selector") == Some("#range"))
        .unwrap();
    assert!(range.list("States").iter().all(|s| !s.contains(',')));
}

#[test]
fn variants_are_written_default_first() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    let variants = ws.variants();
    assert_eq!(variants[0].string("Name"), Some("default"));
    assert_eq!(variants[0].number("Order"), Some(0.0));
    assert_eq!(variants[1].string("Name"), Some("theme: light"));
    assert_eq!(variants[1].string("Kind"), Some("themeAlt"));
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn creates_are_split_at_the_batch_limit() {
    let ws = Workspace::with_capabilities(StoreCapabilities {
        batch_limit: 3,
        native_multi_value: false,
    });
    let c = captured_dashboard();

    ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    // page 1, components 1, captures 9/3, variants 1
    assert_eq!(ws.store.create_call_count(), 6);
    assert_eq!(ws.captures().len(), 9);
}

#[test]
fn default_limit_writes_a_page_of_captures_in_one_call() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    assert_eq!(ws.store.create_call_count(), 4);
}

#[test]
fn invalid_record_does_not_block_its_batch() {
    let ws = Workspace::new();
    let records = vec![
        Record::new().title("Name", "first"),
        Record::new().text("Notes", "no title at all"),
        Record::new().title("Name", "third\u{0007}"),
    ];

    let mut errors = Vec::new();
    let ids = ws.writer().create_batched("Captures", &records, &mut errors).unwrap();

    assert!(ids[0].is_some());
    assert!(ids[1].is_none());
    assert!(ids[2].is_some());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Captures #1"));
    assert_eq!(ws.captures()[1].string("Name"), Some("third"));
}

fn records_with_refused_middle() -> Vec<Record> {
    vec![
        Record::new().title("Name", "first"),
        Record::new().title("Name", "refused"),
        Record::new().title("Name", "third"),
    ]
}

fn names_in(store: &RejectingStore, collection: &str) -> Vec<String> {
    store
        .inner
        .records_in(collection)
        .iter()
        .filter_map(|r| r.string("Name").map(String::from))
        .collect()
}

#[test]
fn store_rejected_record_does_not_block_its_batch() {
    let store = RejectingStore::new(StoreCapabilities::default(), "refused");
    let writer = KnowledgeStoreWriter::new(&store, SchemaRules::default(), StoreCollections::default());

    let mut errors = Vec::new();
    let ids = writer.create_batched("Captures", &records_with_refused_middle(), &mut errors).unwrap();

    assert!(ids[0].is_some());
    assert!(ids[1].is_none());
    assert!(ids[2].is_some());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Captures #1"));
    assert_eq!(names_in(&store, "Captures"), vec!["first", "third"]);
    // whole batch, re-validated batch, then the record on its own
    assert_eq!(store.rejected_calls(), 3);
}

#[test]
fn store_rejected_record_in_single_record_batches() {
    let store = RejectingStore::new(
        StoreCapabilities {
            batch_limit: 1,
            native_multi_value: false,
        },
        "refused",
    );
    let writer = KnowledgeStoreWriter::new(&store, SchemaRules::default(), StoreCollections::default());

    let mut errors = Vec::new();
    let ids = writer.create_batched("Captures", &records_with_refused_middle(), &mut errors).unwrap();

    assert_eq!(ids.iter().map(Option::is_some).collect::<Vec<_>>(), vec![true, false, true]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("rejected"));
    assert_eq!(names_in(&store, "Captures"), vec!["first", "third"]);
}

#[test]
fn single_record_batches_leave_the_same_records() {
    let c = captured_dashboard();
    let batched = Workspace::new();
    let single = Workspace::with_capabilities(StoreCapabilities {
        batch_limit: 1,
        native_multi_value: false,
    });

    batched.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();
    single.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    assert_eq!(single.pages(), batched.pages());
    assert_eq!(single.components(), batched.components());
    assert_eq!(single.captures(), batched.captures());
    assert_eq!(single.variants(), batched.variants());
    assert!(single.store.create_call_count() > batched.store.create_call_count());
}

#[test]
fn native_multi_value_stores_arrays() {
    let ws = Workspace::with_capabilities(StoreCapabilities {
        batch_limit: 100,
        native_multi_value: true,
    });
    let c = captured_dashboard();
    ws.writer().write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();

    let component = &ws.components()[0];
    assert!(component.properties["States"]["multi_select"].is_array());
    assert_eq!(component.list("States"), vec!["default", "toggled"]);
}

// ============================================================================
// Idempotent rewrites
// ============================================================================

#[test]
fn existing_page_record_is_refreshed_not_duplicated() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    let writer = ws.writer();

    let first = writer.write_page_record(&c.page, None).unwrap();
    let second = writer.write_page_record(&c.page, Some(&first)).unwrap();

    assert_eq!(first, second);
    assert_eq!(ws.pages().len(), 1);
}

#[test]
fn rewriting_inventory_updates_components_in_place() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    let writer = ws.writer();

    let mut refs = PersistedRefs {
        page_id: Some(writer.write_page_record(&c.page, None).unwrap()),
        ..PersistedRefs::default()
    };
    writer.write_inventory(&c.page, &c.inventory, &mut refs).unwrap();
    let first = refs.components.clone();

    // A fresh run that lost its refs still finds the manifest on the page
    let mut fresh = PersistedRefs {
        page_id: refs.page_id.clone(),
        ..PersistedRefs::default()
    };
    writer.write_inventory(&c.page, &c.inventory, &mut fresh).unwrap();

    assert_eq!(fresh.components, first);
    assert_eq!(ws.components().len(), 3);
}

#[test]
fn vanished_components_are_marked_superseded() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    let writer = ws.writer();

    let mut refs = PersistedRefs {
        page_id: Some(writer.write_page_record(&c.page, None).unwrap()),
        ..PersistedRefs::default()
    };
    writer.write_inventory(&c.page, &c.inventory, &mut refs).unwrap();

    let mut smaller = c.inventory.clone();
    smaller.entries.retain(|e| e.locator.selector != "#advanced");
    writer.write_inventory(&c.page, &smaller, &mut refs).unwrap();

    let superseded: Vec<bool> = ws.components().iter().map(|r| r.checkbox("Superseded").unwrap()).collect();
    assert_eq!(superseded, vec![false, false, true]);
}

#[test]
fn captures_already_persisted_are_not_written_again() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    let writer = ws.writer();

    let mut refs = writer.write(&c.page, &c.inventory, &c.outcomes, &c.variants).unwrap();
    let written = writer.write_captures(&c.outcomes, &mut refs).unwrap();

    assert_eq!(written, 0);
    assert_eq!(ws.captures().len(), 9);
}

#[test]
fn expired_store_credentials_surface_as_auth_expired() {
    let ws = Workspace::new();
    let c = captured_dashboard();
    ws.store.expire_credentials(true);

    let err = ws.writer().write_page_record(&c.page, None).unwrap_err();
    assert!(err.is_auth_expired());
}
