use tracing::{debug, info, warn};

use crate::browser::driver::{BrowserDriver, ImageHandle};
use crate::browser::snapshot::{PageSnapshot, SnapshotNode};
use crate::capture::attempt::{AttemptState, StepOutcome, run_step};
use crate::capture::budget::{Budget, BudgetDecision, check_budgets};
use crate::capture::capture_model::{CaptureOptions, CaptureResult, CaptureStatus, EntryOutcome};
use crate::capture::guard::{GuardVerdict, find_cancel_control, inspect_trigger};
use crate::capture::variants::VariantLog;
use crate::discovery::inventory_model::InventoryEntry;
use crate::discovery::states::validates;
use crate::error::{CaptureError, Result};
use crate::locator::classifier::{is_toggle_like_button, label_for};
use crate::locator::locator_model::{ComponentLocator, ComponentRole};
use crate::trace::logger::TraceLogger;
use crate::trace::trace::TraceEvent;

// ============================================================================
// Protocol run state
// ============================================================================

/// Results accumulated by one component protocol, plus its halt state.
#[derive(Debug)]
pub struct ProtocolRun {
    locator: ComponentLocator,
    results: Vec<CaptureResult>,
    state: AttemptState,
    halt_reason: Option<String>,
}

impl ProtocolRun {
    pub fn new(locator: ComponentLocator) -> Self {
        Self {
            locator,
            results: Vec::new(),
            state: AttemptState::Pending,
            halt_reason: None,
        }
    }

    pub fn locator(&self) -> &ComponentLocator {
        &self.locator
    }

    pub fn results(&self) -> &[CaptureResult] {
        &self.results
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, AttemptState::Skipped | AttemptState::Failed)
    }

    /// Stop the protocol. Remaining states inherit `state` when finished.
    pub(crate) fn halt(&mut self, state: AttemptState, reason: impl Into<String>) {
        if !self.is_halted() {
            self.state = state;
            self.halt_reason = Some(reason.into());
        }
    }

    pub(crate) fn push(
        &mut self,
        state_name: &str,
        trigger: &str,
        shot: Option<ImageHandle>,
        status: CaptureStatus,
        notes: impl Into<String>,
    ) {
        self.results.push(CaptureResult {
            entry_key: self.locator.key(),
            state_name: state_name.to_string(),
            trigger: trigger.to_string(),
            screenshot_ref: shot,
            restored: true,
            status,
            notes: notes.into(),
        });
    }

    /// Append a note to the result recorded for `state_name`.
    pub(crate) fn annotate(&mut self, state_name: &str, note: &str) {
        if let Some(result) = self.results.iter_mut().find(|r| r.state_name == state_name) {
            if !result.notes.is_empty() {
                result.notes.push_str("; ");
            }
            result.notes.push_str(note);
        }
    }

    /// Close the run: every anticipated state gets exactly one result.
    pub fn finish(mut self, entry: &InventoryEntry, restored: bool) -> EntryOutcome {
        let fill = match self.state {
            AttemptState::Failed => CaptureStatus::Failed,
            _ => CaptureStatus::Skipped,
        };
        let reason = self.halt_reason.clone().unwrap_or_else(|| "state not reached".to_string());

        for state in &entry.states {
            if !self.results.iter().any(|r| &r.state_name == state) {
                self.push(state, "-", None, fill, reason.clone());
            }
        }

        for result in &mut self.results {
            result.restored = restored;
        }

        let status = if self.results.iter().any(|r| r.status == CaptureStatus::Failed) {
            CaptureStatus::Failed
        } else if self.results.iter().any(|r| r.status == CaptureStatus::Skipped) {
            CaptureStatus::Skipped
        } else {
            CaptureStatus::Ok
        };

        EntryOutcome {
            locator: self.locator,
            results: self.results,
            restored,
            status,
        }
    }

    /// Outcome for an entry whose protocol never started.
    pub fn abandon(mut self, entry: &InventoryEntry, status: CaptureStatus, reason: &str) -> EntryOutcome {
        let state = match status {
            CaptureStatus::Failed => AttemptState::Failed,
            _ => AttemptState::Skipped,
        };
        self.halt(state, reason);
        self.finish(entry, true)
    }
}

// ============================================================================
// Protocol context: guarded driver access
// ============================================================================

/// Everything a protocol may touch while it drives one component.
pub struct ProtocolContext<'a> {
    pub driver: &'a mut dyn BrowserDriver,
    pub options: &'a CaptureOptions,
    pub trace: &'a TraceLogger,
    pub variants: &'a mut VariantLog,
    pub page_budget: &'a Budget,
    pub component_budget: Budget,
}

impl<'a> ProtocolContext<'a> {
    fn journal(&self, run: &ProtocolRun, step: &str, outcome: &str, state: Option<&str>, detail: Option<&str>) {
        let mut event = TraceEvent::now(self.variants.page_url(), step)
            .with_component(&run.locator)
            .with_outcome(outcome);
        if let Some(state) = state {
            event = event.with_state(state);
        }
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.trace.log(&event);
    }

    /// Run a forward sub-step against `locator` with budget checks and the
    /// retry-once policy. `None` means the run has halted.
    fn step_on<T, F>(&mut self, run: &mut ProtocolRun, locator: &ComponentLocator, what: &str, f: F) -> Result<Option<T>>
    where
        F: FnMut(&mut dyn BrowserDriver) -> Result<T>,
    {
        if run.is_halted() {
            return Ok(None);
        }

        if let BudgetDecision::Block(reason) = check_budgets(self.page_budget, &self.component_budget) {
            self.journal(run, what, "skipped", None, Some(reason));
            run.halt(AttemptState::Skipped, reason);
            return Ok(None);
        }

        match run_step(&mut *self.driver, locator, f)? {
            StepOutcome::Done(value) => Ok(Some(value)),
            StepOutcome::Skipped(err) => {
                let detail = format!("{}: {}", what, err);
                warn!(component = %run.locator.key(), %detail, "step skipped after retry");
                self.journal(run, what, "skipped", None, Some(&detail));
                run.halt(AttemptState::Skipped, detail);
                Ok(None)
            }
            StepOutcome::Failed(err) => {
                let detail = format!("{}: {}", what, err);
                warn!(component = %run.locator.key(), %detail, "step failed");
                self.journal(run, what, "failed", None, Some(&detail));
                run.halt(AttemptState::Failed, detail);
                Ok(None)
            }
        }
    }

    fn step<T, F>(&mut self, run: &mut ProtocolRun, what: &str, f: F) -> Result<Option<T>>
    where
        F: FnMut(&mut dyn BrowserDriver) -> Result<T>,
    {
        let locator = run.locator.clone();
        self.step_on(run, &locator, what, f)
    }

    /// Restoration sub-step: runs even after a halt and ignores budgets.
    /// Failure is journaled and never halts the run.
    fn restore_on<T, F>(&mut self, run: &ProtocolRun, locator: &ComponentLocator, what: &str, f: F) -> Result<Option<T>>
    where
        F: FnMut(&mut dyn BrowserDriver) -> Result<T>,
    {
        match run_step(&mut *self.driver, locator, f)? {
            StepOutcome::Done(value) => {
                self.journal(run, what, "ok", None, None);
                Ok(Some(value))
            }
            StepOutcome::Skipped(err) | StepOutcome::Failed(err) => {
                let detail = format!("{}: {}", what, err);
                warn!(component = %run.locator.key(), %detail, "restore step failed");
                self.journal(run, what, "failed", None, Some(&detail));
                Ok(None)
            }
        }
    }

    pub fn click(&mut self, run: &mut ProtocolRun, locator: &ComponentLocator, what: &str) -> Result<bool> {
        let done = self.step_on(run, locator, what, |d| {
            d.click(locator).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        if done.is_some() {
            self.journal(run, what, "ok", None, Some(&locator.selector));
        }
        Ok(done.is_some())
    }

    pub fn hover(&mut self, run: &mut ProtocolRun, locator: &ComponentLocator) -> Result<bool> {
        let done = self.step_on(run, locator, "hover", |d| {
            d.hover(locator).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        Ok(done.is_some())
    }

    pub fn fill(&mut self, run: &mut ProtocolRun, locator: &ComponentLocator, value: &str) -> Result<bool> {
        let done = self.step_on(run, locator, "fill", |d| {
            d.fill(locator, value).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        Ok(done.is_some())
    }

    pub fn select(&mut self, run: &mut ProtocolRun, locator: &ComponentLocator, option: &str) -> Result<bool> {
        let done = self.step_on(run, locator, "select", |d| {
            d.select_option(locator, option).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        Ok(done.is_some())
    }

    pub fn press(&mut self, run: &mut ProtocolRun, key: &str) -> Result<bool> {
        let done = self.step(run, "press", |d| d.press_key(key).map_err(CaptureError::from))?;
        Ok(done.is_some())
    }

    pub fn snapshot(&mut self, run: &mut ProtocolRun) -> Result<Option<PageSnapshot>> {
        self.step(run, "observe", |d| d.snapshot().map_err(CaptureError::from))
    }

    pub fn screenshot_page(&mut self, run: &mut ProtocolRun) -> Result<Option<ImageHandle>> {
        self.step(run, "screenshot", |d| d.screenshot(None).map_err(CaptureError::from))
    }

    /// Wait for stabilization, screenshot, and record an ok result. Then
    /// check whether the trigger changed the page as a whole.
    pub fn capture(&mut self, run: &mut ProtocolRun, state_name: &str, trigger: &str, full_page: bool) -> Result<bool> {
        let selector = if full_page {
            None
        } else {
            Some(run.locator.selector.clone())
        };
        let settle = self.options.stabilize_ms;

        let shot = self.step(run, "capture", |d| {
            d.wait_for(settle)?;
            d.screenshot(selector.as_deref()).map_err(CaptureError::from)
        })?;
        let Some(shot) = shot else {
            return Ok(false);
        };

        self.journal(run, "capture", "ok", Some(state_name), Some(shot.as_str()));
        run.push(state_name, trigger, Some(shot), CaptureStatus::Ok, "");
        self.observe_page(run, trigger)?;
        Ok(true)
    }

    fn observe_page(&mut self, run: &mut ProtocolRun, trigger: &str) -> Result<()> {
        let Some(snapshot) = self.snapshot(run)? else {
            return Ok(());
        };
        if !self.variants.is_new(&snapshot.page_state) {
            return Ok(());
        }

        let shot = self.screenshot_page(run)?;
        let trigger = format!("{} on {}", trigger, run.locator.display_name());
        if let Some(variant) = self.variants.observe(&snapshot.page_state, &trigger, shot) {
            info!(variant = %variant.name, kind = variant.kind.as_str(), "page variant observed");
            let name = variant.name.clone();
            self.journal(run, "variant", "ok", Some(&name), None);
        }
        Ok(())
    }

    pub fn restore_click(&mut self, run: &ProtocolRun, locator: &ComponentLocator) -> Result<bool> {
        let done = self.restore_on(run, locator, "restore", |d| {
            d.click(locator).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        Ok(done.is_some())
    }

    pub fn restore_fill(&mut self, run: &ProtocolRun, value: &str) -> Result<bool> {
        let locator = run.locator.clone();
        let done = self.restore_on(run, &locator, "restore", |d| {
            d.fill(&locator, value).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        Ok(done.is_some())
    }

    pub fn restore_select(&mut self, run: &ProtocolRun, option: &str) -> Result<bool> {
        let locator = run.locator.clone();
        let done = self.restore_on(run, &locator, "restore", |d| {
            d.select_option(&locator, option).map_err(|e| CaptureError::from_driver(e, &locator.selector))
        })?;
        Ok(done.is_some())
    }

    pub fn restore_key(&mut self, run: &ProtocolRun, key: &str) -> Result<bool> {
        let locator = run.locator.clone();
        let done = self.restore_on(run, &locator, "restore", |d| d.press_key(key).map_err(CaptureError::from))?;
        Ok(done.is_some())
    }

    pub fn restore_snapshot(&mut self, run: &ProtocolRun) -> Result<Option<PageSnapshot>> {
        let locator = run.locator.clone();
        self.restore_on(run, &locator, "verify", |d| d.snapshot().map_err(CaptureError::from))
    }

    /// Compare the component and page against the pre-protocol snapshot.
    pub fn verify_restored(&mut self, run: &ProtocolRun, before: &PageSnapshot) -> Result<bool> {
        let Some(after) = self.restore_snapshot(run)? else {
            return Ok(false);
        };

        let selector = &run.locator.selector;
        let component_before = before.find(selector).map(|n| n.observable_state());
        let component_after = after.find(selector).map(|n| n.observable_state());

        let mismatch = if component_before != component_after {
            Some(format!(
                "component state {} became {}",
                component_before.map(|s| s.describe()).unwrap_or_default(),
                component_after.map(|s| s.describe()).unwrap_or_else(|| "missing".into())
            ))
        } else if before.page_state != after.page_state {
            Some("page-wide state did not return to baseline".to_string())
        } else if after.has_open_dialog() && !before.has_open_dialog() {
            Some("a dialog is still open".to_string())
        } else {
            None
        };

        match mismatch {
            None => Ok(true),
            Some(detail) => {
                let err = CaptureError::RestorationFailed {
                    selector: selector.clone(),
                    detail,
                };
                warn!(error = %err, "restoration failed, flagged for review");
                self.journal(run, "restore", "restorationFailed", None, Some(&err.to_string()));
                Ok(false)
            }
        }
    }
}

// ============================================================================
// Protocol table
// ============================================================================

/// Drive one component through the protocol for its role.
///
/// The default state is already recorded by the caller from the baseline
/// pass; protocols only produce interaction-induced states.
pub fn run_protocol(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry, node: &SnapshotNode) -> Result<()> {
    debug!(component = %entry.key(), role = %entry.locator.role, "running protocol");

    match entry.locator.role {
        ComponentRole::Button if is_toggle_like_button(node) => toggle_button(ctx, run, entry),
        ComponentRole::Button => hover_button(ctx, run, entry),
        ComponentRole::Dropdown => dropdown(ctx, run, entry, node),
        ComponentRole::Toggle | ComponentRole::Expandable => flip(ctx, run, entry),
        ComponentRole::Table => table(ctx, run, entry, node),
        ComponentRole::Form => form(ctx, run, entry, node),
        ComponentRole::Modal => modal(ctx, run, entry, node),
        ComponentRole::Chart => chart(ctx, run, entry, node),
        ComponentRole::Nav | ComponentRole::Link | ComponentRole::Display => Ok(()),
    }
}

fn state_at(entry: &InventoryEntry, index: usize, fallback: &str) -> String {
    entry.states.get(index).cloned().unwrap_or_else(|| fallback.to_string())
}

/// trigger, capture, trigger again, compare.
fn toggle_button(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry) -> Result<()> {
    let locator = run.locator.clone();
    let toggled = state_at(entry, 1, "toggled");

    if !ctx.click(run, &locator, "toggle")? {
        return Ok(());
    }
    ctx.capture(run, &toggled, "click", false)?;

    if ctx.restore_click(run, &locator)? {
        let settle = ctx.options.stabilize_ms;
        let shot = ctx.restore_on(run, &locator, "capture restored", |d| {
            d.wait_for(settle)?;
            d.screenshot(Some(&locator.selector)).map_err(CaptureError::from)
        })?;
        if let Some(shot) = shot {
            run.annotate(entry.default_state(), &format!("restored capture {}", shot.as_str()));
        }
    }
    Ok(())
}

fn hover_button(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry) -> Result<()> {
    let locator = run.locator.clone();
    if ctx.hover(run, &locator)? {
        ctx.capture(run, &state_at(entry, 1, "hover"), "hover", false)?;
    }
    Ok(())
}

/// Toggle switches and expandable sections: flip, capture, flip back.
fn flip(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry) -> Result<()> {
    let locator = run.locator.clone();
    let target = state_at(entry, 1, "flipped");

    if !ctx.click(run, &locator, "flip")? {
        return Ok(());
    }
    ctx.capture(run, &target, "click", false)?;
    ctx.restore_click(run, &locator)?;
    Ok(())
}

fn dropdown(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry, node: &SnapshotNode) -> Result<()> {
    let locator = run.locator.clone();

    // Custom listbox with no readable options: closed/open only
    if node.options.is_empty() {
        if ctx.click(run, &locator, "open")? {
            ctx.capture(run, &state_at(entry, 1, "open"), "click", true)?;
            ctx.restore_key(run, "Escape")?;
        }
        return Ok(());
    }

    let default = entry.default_state().to_string();

    if !ctx.click(run, &locator, "open")? {
        return Ok(());
    }
    if let Some(shot) = ctx.screenshot_page(run)? {
        run.annotate(&default, &format!("option list {}", shot.as_str()));
    }
    ctx.restore_key(run, "Escape")?;

    let mut changed = false;
    for option in entry.states.iter().filter(|s| **s != default) {
        if !ctx.select(run, &locator, option)? {
            break;
        }
        changed = true;
        if !ctx.capture(run, option, &format!("select '{}'", option), false)? {
            break;
        }
    }

    if changed {
        ctx.restore_select(run, &default)?;
    }
    Ok(())
}

fn table(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry, node: &SnapshotNode) -> Result<()> {
    let Some(header) = node.sort_selector.as_deref() else {
        return Ok(());
    };
    let header = run.locator.child(header, "sort header");
    let original = node.sort.clone();

    if !ctx.click(run, &header, "sort")? {
        return Ok(());
    }
    ctx.capture(run, &state_at(entry, 1, "sorted"), "click sort header", false)?;

    // Sort headers cycle; click until the original order is back
    for _ in 0..2 {
        if !ctx.restore_click(run, &header)? {
            break;
        }
        let current = ctx
            .restore_snapshot(run)?
            .and_then(|s| s.find(&run.locator.selector).map(|n| n.sort.clone()));
        match current {
            Some(sort) if sort != original => continue,
            _ => break,
        }
    }
    Ok(())
}

fn form(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry, node: &SnapshotNode) -> Result<()> {
    let locator = run.locator.clone();
    let original = node.value.clone().unwrap_or_default();
    let input_type = node.input_type.as_deref().unwrap_or("text");
    let sample = representative_value(input_type, &ctx.options.text_value);

    if !ctx.fill(run, &locator, &sample)? {
        return Ok(());
    }
    ctx.capture(run, &state_at(entry, 1, "filled"), &format!("fill '{}'", sample), false)?;

    if validates(node) && entry.states.len() > 2 {
        let invalid = invalid_value(input_type);
        if ctx.fill(run, &locator, invalid)? && ctx.press(run, "Tab")? {
            ctx.capture(run, &state_at(entry, 2, "error"), &format!("fill '{}' and blur", invalid), false)?;
        }
    }

    // Never submitted; just put the original value back
    ctx.restore_fill(run, &original)?;
    Ok(())
}

fn modal(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry, node: &SnapshotNode) -> Result<()> {
    let locator = run.locator.clone();
    let open = state_at(entry, 1, "open");

    match ctx.step(run, "guard", |d| inspect_trigger(d, node))? {
        None => return Ok(()),
        Some(GuardVerdict::Blocking(pattern)) => {
            let note = format!("trigger raises a blocking native dialog ({})", pattern);
            warn!(component = %entry.key(), %note, "modal trigger not exercised");
            ctx.journal(run, "guard", "skipped", Some(&open), Some(&note));
            run.push(&open, "click", None, CaptureStatus::Skipped, note);
            return Ok(());
        }
        Some(GuardVerdict::Safe) => {}
    }

    if !ctx.click(run, &locator, "open")? {
        return Ok(());
    }

    match ctx.snapshot(run)?.map(|s| s.has_open_dialog()) {
        Some(true) => {
            ctx.capture(run, &open, "click", true)?;
        }
        Some(false) => run.push(&open, "click", None, CaptureStatus::Skipped, "no dialog appeared after trigger"),
        None => {}
    }

    dismiss_dialog(ctx, run)
}

/// Escape first, then a cancel-equivalent button. Never a confirm.
fn dismiss_dialog(ctx: &mut ProtocolContext, run: &mut ProtocolRun) -> Result<()> {
    ctx.restore_key(run, "Escape")?;

    let Some(snapshot) = ctx.restore_snapshot(run)? else {
        return Ok(());
    };
    if !snapshot.has_open_dialog() {
        return Ok(());
    }

    match find_cancel_control(&snapshot) {
        Some(cancel) => {
            let label = label_for(cancel).unwrap_or_else(|| "cancel".to_string());
            let cancel = run.locator.child(&cancel.selector, &label);
            ctx.restore_click(run, &cancel)?;
        }
        None => warn!(component = %run.locator.key(), "dialog has no cancel-equivalent control"),
    }
    Ok(())
}

fn chart(ctx: &mut ProtocolContext, run: &mut ProtocolRun, entry: &InventoryEntry, node: &SnapshotNode) -> Result<()> {
    let active = node
        .active_layout
        .clone()
        .or_else(|| node.layouts.first().map(|l| l.name.clone()));
    let mut switched = false;

    for state in entry.states.iter().skip(1) {
        let Some(name) = state.strip_prefix("layout: ") else {
            continue;
        };
        let Some(control) = node.layouts.iter().find(|l| l.name == name) else {
            run.push(state, "-", None, CaptureStatus::Skipped, "layout control not found");
            continue;
        };

        let control = run.locator.child(&control.selector, &control.name);
        if !ctx.click(run, &control, "switch layout")? {
            break;
        }
        switched = true;
        if !ctx.capture(run, state, &format!("switch to {}", name), false)? {
            break;
        }
    }

    if switched {
        if let Some(original) = active.and_then(|a| node.layouts.iter().find(|l| l.name == a)) {
            let control = run.locator.child(&original.selector, &original.name);
            ctx.restore_click(run, &control)?;
        }
    }
    Ok(())
}

/// A value the input will accept.
pub fn representative_value(input_type: &str, text_value: &str) -> String {
    match input_type {
        "email" => "user@example.com".to_string(),
        "number" | "range" => "42".to_string(),
        "url" => "https://example.com".to_string(),
        "tel" => "+1 555 0100".to_string(),
        "date" => "2024-01-15".to_string(),
        "search" => "search".to_string(),
        _ => text_value.to_string(),
    }
}

/// A value that trips the input's built-in validation.
pub fn invalid_value(input_type: &str) -> &'static str {
    match input_type {
        "email" => "not-an-email",
        "number" => "abc",
        "url" => "not a url",
        "tel" => "abc",
        "date" => "99/99/9999",
        _ => "",
    }
}
