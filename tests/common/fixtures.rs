use screen_inventory::browser::snapshot::{LayoutControl, PageSnapshot, PageState, Region, SnapshotNode, Viewport};
use screen_inventory::pipeline::checkpoint::CheckpointStore;
use screen_inventory::pipeline::orchestrator::{Orchestrator, PipelineOptions};
use screen_inventory::store::memory::MemoryStore;
use screen_inventory::store::schema::SchemaRules;
use screen_inventory::store::store_model::{StoreCapabilities, StoredRecord};
use screen_inventory::store::writer::{KnowledgeStoreWriter, StoreCollections};
use screen_inventory::trace::logger::TraceLogger;
use tempfile::TempDir;

pub const DASHBOARD: &str = "https://app.test/dashboard";
pub const SETTINGS: &str = "https://app.test/settings";

// ============================================================================
// Snapshot nodes
// ============================================================================

pub fn node(selector: &str, tag: &str) -> SnapshotNode {
    SnapshotNode {
        selector: selector.to_string(),
        tag: tag.to_string(),
        landmark: Some("main".to_string()),
        ..SnapshotNode::default()
    }
}

pub fn theme_toggle() -> SnapshotNode {
    SnapshotNode {
        name: Some("Theme".to_string()),
        landmark: Some("header".to_string()),
        pressed: Some(false),
        ..node("#theme-toggle", "button")
    }
}

pub fn range_dropdown(options: &[&str], selected: &str) -> SnapshotNode {
    SnapshotNode {
        name: Some("Date range".to_string()),
        options: options.iter().map(|o| o.to_string()).collect(),
        selected: Some(selected.to_string()),
        child_count: options.len(),
        ..node("#range", "select")
    }
}

pub fn five_ranges() -> Vec<&'static str> {
    vec!["Last 24 hours", "Last 7 days, hourly", "Last 30 days", "Quarter to date", "Year to date"]
}

pub fn advanced_section() -> SnapshotNode {
    SnapshotNode {
        text: Some("Advanced settings".to_string()),
        expanded: Some(false),
        child_count: 3,
        ..node("#advanced", "details")
    }
}

// ============================================================================
// Pages
// ============================================================================

fn page(url: &str, title: &str, nodes: Vec<SnapshotNode>) -> PageSnapshot {
    PageSnapshot {
        url: url.to_string(),
        title: title.to_string(),
        viewport: Viewport::default(),
        scroll_height: 900,
        page_state: PageState {
            theme: Some("dark".to_string()),
            layout: None,
        },
        regions: vec![Region {
            name: "Header".to_string(),
            selector: "header".to_string(),
            top: 0,
            height: 64,
        }],
        nodes,
    }
}

/// Theme toggle, five-option dropdown, expandable section.
pub fn dashboard_page() -> PageSnapshot {
    page(
        DASHBOARD,
        "Dashboard",
        vec![theme_toggle(), range_dropdown(&five_ranges(), "Last 24 hours"), advanced_section()],
    )
}

/// One component of every other role.
pub fn settings_page() -> PageSnapshot {
    let email = SnapshotNode {
        name: Some("Email".to_string()),
        input_type: Some("email".to_string()),
        value: Some(String::new()),
        ..node("#email", "input")
    };
    let notify = SnapshotNode {
        role: Some("switch".to_string()),
        name: Some("Notifications".to_string()),
        checked: Some(false),
        ..node("#notify", "button")
    };
    let users = SnapshotNode {
        text: Some("Users".to_string()),
        sort_selector: Some("#users th.name".to_string()),
        child_count: 12,
        ..node("#users", "table")
    };
    let invite = SnapshotNode {
        name: Some("Invite".to_string()),
        has_popup: Some("dialog".to_string()),
        ..node("#invite", "button")
    };
    let dialog = SnapshotNode {
        role: Some("dialog".to_string()),
        landmark: Some("dialog".to_string()),
        hidden: true,
        ..node("#invite-dialog", "div")
    };
    let cancel = SnapshotNode {
        name: Some("Cancel".to_string()),
        landmark: Some("dialog".to_string()),
        hidden: true,
        ..node("#invite-cancel", "button")
    };
    let delete = SnapshotNode {
        name: Some("Delete account".to_string()),
        has_popup: Some("dialog".to_string()),
        handler: Some("if (confirm('Delete this account?')) removeAccount()".to_string()),
        ..node("#delete", "button")
    };
    let traffic = SnapshotNode {
        text: Some("Traffic".to_string()),
        layouts: vec![
            LayoutControl {
                name: "Line".to_string(),
                selector: "#traffic .line".to_string(),
            },
            LayoutControl {
                name: "Bar".to_string(),
                selector: "#traffic .bar".to_string(),
            },
        ],
        active_layout: Some("Line".to_string()),
        ..node("#traffic", "canvas")
    };
    let home = SnapshotNode {
        text: Some("Home".to_string()),
        landmark: Some("Sidebar nav".to_string()),
        ..node("#home", "a")
    };

    page(
        SETTINGS,
        "Settings",
        vec![email, notify, users, invite, dialog, cancel, delete, traffic, home],
    )
}

// ============================================================================
// Workspace: in-memory store plus a temporary checkpoint directory
// ============================================================================

pub struct Workspace {
    pub store: MemoryStore,
    pub checkpoints: CheckpointStore,
    pub trace: TraceLogger,
    _dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::default())
    }

    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            store: MemoryStore::new(capabilities),
            checkpoints: CheckpointStore::open(dir.path()).unwrap(),
            trace: TraceLogger::disabled(),
            _dir: dir,
        }
    }

    pub fn writer(&self) -> KnowledgeStoreWriter<'_> {
        KnowledgeStoreWriter::new(&self.store, SchemaRules::default(), StoreCollections::default())
    }

    pub fn orchestrator(&self, options: PipelineOptions) -> Orchestrator<'_> {
        Orchestrator::new(self.writer(), &self.checkpoints, &self.trace, options)
    }

    pub fn pages(&self) -> Vec<StoredRecord> {
        self.store.records_in("Pages")
    }

    pub fn components(&self) -> Vec<StoredRecord> {
        self.store.records_in("Components")
    }

    pub fn captures(&self) -> Vec<StoredRecord> {
        self.store.records_in("Captures")
    }

    pub fn variants(&self) -> Vec<StoredRecord> {
        self.store.records_in("Page Variants")
    }

    /// Capture records of one component, by its display name prefix.
    pub fn captures_of(&self, label: &str) -> Vec<StoredRecord> {
        let prefix = format!("{} / ", label);
        self.captures()
            .into_iter()
            .filter(|r| r.string("Name").is_some_and(|n| n.starts_with(&prefix)))
            .collect()
    }
}

/// Options that keep the mock runs fast.
pub fn fast_options() -> PipelineOptions {
    let mut options = PipelineOptions::default();
    options.scan.poll_ms = 1;
    options.scan.settle_timeout_ms = 10;
    options.capture.stabilize_ms = 0;
    options
}
