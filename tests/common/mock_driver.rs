use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use screen_inventory::browser::driver::{BrowserDriver, ImageHandle, NavigateOptions};
use screen_inventory::browser::snapshot::{PageSnapshot, SnapshotNode};
use screen_inventory::error::{CaptureError, DriverError};
use screen_inventory::locator::locator_model::ComponentLocator;
use screen_inventory::pipeline::recovery::Reauthenticate;
use serde_json::Value;

pub const LOGIN_URL: &str = "https://app.test/login";

/// Script understood by `MockDriver::evaluate` as "log the session back in".
pub const REAUTH_SCRIPT: &str = "__reauthenticate()";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Stale,
    Timeout,
    Broken,
}

/// Scripted browser over an in-memory DOM.
///
/// Clicks, fills and selects mutate the current `PageSnapshot` the way the
/// real widgets would; `navigate` reloads the page fresh from `site`.
pub struct MockDriver {
    site: HashMap<String, PageSnapshot>,
    page: PageSnapshot,
    scroll: u32,
    shots: usize,
    unresolved: HashSet<String>,
    faults: Vec<(String, Fault, usize)>,
    expire_after_shots: Option<usize>,
    session_valid: bool,
    refuse_reauth: bool,
    loading_snapshots: usize,
    snapshots_taken: usize,
    pub calls: Vec<String>,
}

impl MockDriver {
    pub fn new(pages: Vec<PageSnapshot>) -> Self {
        let site: HashMap<String, PageSnapshot> = pages.into_iter().map(|p| (p.url.clone(), p)).collect();
        Self {
            site,
            page: PageSnapshot::default(),
            scroll: 0,
            shots: 0,
            unresolved: HashSet::new(),
            faults: Vec::new(),
            expire_after_shots: None,
            session_valid: true,
            refuse_reauth: false,
            loading_snapshots: 0,
            snapshots_taken: 0,
            calls: Vec::new(),
        }
    }

    /// A driver already showing `page`.
    pub fn on(page: PageSnapshot) -> Self {
        let mut driver = Self::new(vec![page.clone()]);
        driver.page = page;
        driver
    }

    /// `match_count` reports zero for this selector.
    pub fn unresolved(mut self, selector: &str) -> Self {
        self.unresolved.insert(selector.to_string());
        self
    }

    /// The next `times` actions on `selector` fail with `fault`.
    pub fn fault(mut self, selector: &str, fault: Fault, times: usize) -> Self {
        self.faults.push((selector.to_string(), fault, times));
        self
    }

    /// The session expires once this many screenshots have been taken.
    pub fn expire_session_after(mut self, shots: usize) -> Self {
        self.expire_after_shots = Some(shots);
        self
    }

    /// Start with an expired session; navigation lands on the login page.
    pub fn signed_out(mut self) -> Self {
        self.session_valid = false;
        self
    }

    /// The first `snapshots` snapshots each show a different loading node.
    pub fn loading_for(mut self, snapshots: usize) -> Self {
        self.loading_snapshots = snapshots;
        self
    }

    /// Re-authentication attempts leave the session expired.
    pub fn refuse_reauth(mut self) -> Self {
        self.refuse_reauth = true;
        self
    }

    pub fn page(&self) -> &PageSnapshot {
        &self.page
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&mut self, call: String) -> Result<(), DriverError> {
        self.calls.push(call);
        if self.session_valid {
            Ok(())
        } else {
            Err(DriverError::AuthExpired(format!("redirected to {}", LOGIN_URL)))
        }
    }

    fn inject(&mut self, command: &str, selector: &str) -> Result<(), DriverError> {
        let Some(slot) = self.faults.iter_mut().find(|(s, _, n)| s == selector && *n > 0) else {
            return Ok(());
        };
        slot.2 -= 1;

        Err(match slot.1 {
            Fault::Stale => DriverError::StaleElement(selector.to_string()),
            Fault::Timeout => DriverError::Timeout {
                command: command.to_string(),
                timeout_ms: 1500,
            },
            Fault::Broken => DriverError::Protocol {
                command: command.to_string(),
                error: "element is not interactable".to_string(),
            },
        })
    }

    fn node_mut(&mut self, selector: &str) -> Result<&mut SnapshotNode, DriverError> {
        self.page
            .nodes
            .iter_mut()
            .find(|n| n.selector == selector && !n.hidden)
            .ok_or_else(|| DriverError::Protocol {
                command: "query".to_string(),
                error: format!("no element matches {}", selector),
            })
    }

    fn set_dialogs_open(&mut self, open: bool) {
        for node in &mut self.page.nodes {
            if node.is_dialog() || node.landmark.as_deref() == Some("dialog") {
                node.hidden = !open;
            }
        }
    }

    fn apply_click(&mut self, selector: &str) -> Result<(), DriverError> {
        // Sort headers and layout controls belong to another node
        if let Some(table) = self.page.nodes.iter_mut().find(|n| n.sort_selector.as_deref() == Some(selector)) {
            table.sort = match table.sort.as_deref() {
                None => Some("ascending".to_string()),
                Some("ascending") => Some("descending".to_string()),
                _ => None,
            };
            return Ok(());
        }
        if let Some(chart) = self.page.nodes.iter_mut().find(|n| n.layouts.iter().any(|l| l.selector == selector)) {
            chart.active_layout = chart.layouts.iter().find(|l| l.selector == selector).map(|l| l.name.clone());
            return Ok(());
        }

        let node = self.node_mut(selector)?;
        let is_checkable = matches!(node.role.as_deref(), Some("switch") | Some("checkbox"))
            || node.input_type.as_deref() == Some("checkbox");
        if is_checkable {
            node.checked = Some(!node.checked.unwrap_or(false));
        }
        if let Some(expanded) = node.expanded {
            node.expanded = Some(!expanded);
        }
        if let Some(pressed) = node.pressed {
            node.pressed = Some(!pressed);
        }

        let label = node.name.clone().unwrap_or_default().to_lowercase();
        let opens_dialog = node.has_popup.as_deref() == Some("dialog");
        let in_dialog = node.landmark.as_deref() == Some("dialog");

        if label.contains("theme") {
            let theme = &mut self.page.page_state.theme;
            *theme = match theme.as_deref() {
                Some("dark") => Some("light".to_string()),
                _ => Some("dark".to_string()),
            };
        }
        if opens_dialog {
            self.set_dialogs_open(true);
        }
        if in_dialog && matches!(label.as_str(), "cancel" | "close") {
            self.set_dialogs_open(false);
        }
        Ok(())
    }
}

impl BrowserDriver for MockDriver {
    fn navigate(&mut self, url: &str, _opts: &NavigateOptions) -> Result<(), DriverError> {
        self.calls.push(format!("navigate {}", url));
        if !self.session_valid {
            self.page = PageSnapshot {
                url: LOGIN_URL.to_string(),
                title: "Sign in".to_string(),
                ..PageSnapshot::default()
            };
            return Ok(());
        }

        self.page = self.site.get(url).cloned().ok_or_else(|| DriverError::Protocol {
            command: "navigate".to_string(),
            error: format!("net::ERR_NAME_NOT_RESOLVED {}", url),
        })?;
        self.scroll = 0;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<PageSnapshot, DriverError> {
        self.record("snapshot".to_string())?;
        self.snapshots_taken += 1;

        let mut page = self.page.clone();
        if self.snapshots_taken <= self.loading_snapshots {
            page.nodes.push(SnapshotNode {
                selector: format!("#loading-{}", self.snapshots_taken),
                tag: "div".to_string(),
                ..SnapshotNode::default()
            });
        }
        Ok(page)
    }

    fn screenshot(&mut self, selector: Option<&str>) -> Result<ImageHandle, DriverError> {
        self.record(format!("screenshot {}", selector.unwrap_or("page")))?;
        if let Some(selector) = selector {
            self.inject("screenshot", selector)?;
        }

        self.shots += 1;
        if self.expire_after_shots.is_some_and(|n| self.shots >= n) {
            self.expire_after_shots = None;
            self.session_valid = false;
        }
        Ok(ImageHandle(format!("shot-{}", self.shots)))
    }

    fn click(&mut self, locator: &ComponentLocator) -> Result<(), DriverError> {
        self.record(format!("click {}", locator.selector))?;
        self.inject("click", &locator.selector)?;
        self.apply_click(&locator.selector)
    }

    fn hover(&mut self, locator: &ComponentLocator) -> Result<(), DriverError> {
        self.record(format!("hover {}", locator.selector))?;
        self.inject("hover", &locator.selector)
    }

    fn fill(&mut self, locator: &ComponentLocator, value: &str) -> Result<(), DriverError> {
        self.record(format!("fill {} {}", locator.selector, value))?;
        self.inject("fill", &locator.selector)?;
        self.node_mut(&locator.selector)?.value = Some(value.to_string());
        Ok(())
    }

    fn select_option(&mut self, locator: &ComponentLocator, option_label: &str) -> Result<(), DriverError> {
        self.record(format!("select {} {}", locator.selector, option_label))?;
        self.inject("select", &locator.selector)?;

        let node = self.node_mut(&locator.selector)?;
        if !node.options.iter().any(|o| o == option_label) {
            return Err(DriverError::Protocol {
                command: "select".to_string(),
                error: format!("no option '{}'", option_label),
            });
        }
        node.selected = Some(option_label.to_string());
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), DriverError> {
        self.record(format!("press {}", key))?;
        if key == "Escape" {
            self.set_dialogs_open(false);
        }
        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        self.calls.push(format!("evaluate {}", script));
        if script == REAUTH_SCRIPT {
            self.session_valid = !self.refuse_reauth;
            return Ok(Value::Bool(self.session_valid));
        }
        Ok(Value::Null)
    }

    fn wait_for(&mut self, ms: u64) -> Result<(), DriverError> {
        self.record(format!("wait {}", ms))
    }

    fn match_count(&mut self, selector: &str) -> Result<usize, DriverError> {
        self.record(format!("resolve {}", selector))?;
        if self.unresolved.contains(selector) {
            return Ok(0);
        }

        let visible = self.page.nodes.iter().filter(|n| !n.hidden);
        let count = visible
            .map(|n| {
                let own = usize::from(n.selector == selector);
                let header = usize::from(n.sort_selector.as_deref() == Some(selector));
                let layouts = n.layouts.iter().filter(|l| l.selector == selector).count();
                own + header + layouts
            })
            .sum();
        Ok(count)
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.page.url.clone())
    }

    fn scroll_to(&mut self, y: u32) -> Result<(), DriverError> {
        self.record(format!("scroll {}", y))?;
        self.scroll = y;
        Ok(())
    }

    fn scroll_y(&mut self) -> Result<u32, DriverError> {
        Ok(self.scroll)
    }

    fn handler_source(&mut self, selector: &str) -> Result<Option<String>, DriverError> {
        self.record(format!("handler {}", selector))?;
        Ok(self.page.find(selector).and_then(|n| n.handler.clone()))
    }
}

/// Re-authentication hook for `MockDriver`, counting its attempts.
#[derive(Default, Clone)]
pub struct ScriptedLogin {
    pub attempts: Arc<AtomicUsize>,
}

impl ScriptedLogin {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Reauthenticate for ScriptedLogin {
    fn reauthenticate(&self, driver: &mut dyn BrowserDriver) -> Result<(), CaptureError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match driver.evaluate(REAUTH_SCRIPT)? {
            Value::Bool(true) => Ok(()),
            _ => Err(CaptureError::AuthExpired("re-authentication failed".to_string())),
        }
    }
}
