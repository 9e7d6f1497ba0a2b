use tracing::{info, instrument, warn};

use crate::browser::driver::{BrowserDriver, ImageHandle};
use crate::capture::attempt::{AttemptState, StepOutcome, run_step};
use crate::capture::budget::{Budget, BudgetDecision};
use crate::capture::capture_model::{CaptureOptions, CaptureStatus, EntryOutcome};
use crate::capture::protocols::{ProtocolContext, ProtocolRun, run_protocol};
use crate::capture::variants::VariantLog;
use crate::discovery::inventory_model::{ComponentInventory, InventoryEntry};
use crate::error::{CaptureError, Result};
use crate::trace::logger::TraceLogger;
use crate::trace::trace::TraceEvent;

/// Default-state capture from the baseline pass.
#[derive(Debug)]
enum Baseline {
    Shot(ImageHandle),
    Missing(CaptureStatus, String),
}

/// What one page capture produced, for the entries it was asked to cover.
#[derive(Debug)]
pub struct PageCapture {
    pub outcomes: Vec<EntryOutcome>,
    pub budget_exhausted: bool,
}

/// Dispatches inventory entries to their protocols, one at a time.
pub struct CaptureEngine<'a> {
    options: &'a CaptureOptions,
    trace: &'a TraceLogger,
}

impl<'a> CaptureEngine<'a> {
    pub fn new(options: &'a CaptureOptions, trace: &'a TraceLogger) -> Self {
        Self { options, trace }
    }

    /// Capture every entry from `start_index` on.
    ///
    /// Default states are captured for all of those entries before any
    /// protocol runs. Protocols then run strictly in inventory order, and
    /// `on_entry` sees each outcome as soon as it is terminal. Once the page
    /// budget runs out the remaining entries are closed as skipped.
    #[instrument(skip_all, fields(page = %inventory.page_url, start = start_index))]
    pub fn capture_page<F>(
        &self,
        driver: &mut dyn BrowserDriver,
        inventory: &ComponentInventory,
        start_index: usize,
        variants: &mut VariantLog,
        mut on_entry: F,
    ) -> Result<PageCapture>
    where
        F: FnMut(usize, &EntryOutcome, &VariantLog) -> Result<()>,
    {
        let page_budget = Budget::page(self.options.page_budget);
        let start = start_index.min(inventory.entries.len());
        let pending = &inventory.entries[start..];

        let baselines = self.capture_baselines(driver, pending, &page_budget)?;

        let mut outcomes = Vec::with_capacity(pending.len());
        let mut exhausted = false;

        for (offset, (entry, baseline)) in pending.iter().zip(baselines).enumerate() {
            if !exhausted && page_budget.check() != BudgetDecision::Allow {
                warn!(remaining = pending.len() - offset, "page budget exhausted, finalizing page");
                exhausted = true;
            }

            let outcome = if exhausted {
                ProtocolRun::new(entry.locator.clone()).abandon(entry, CaptureStatus::Skipped, "page_budget_exhausted")
            } else {
                self.capture(driver, entry, baseline, &page_budget, variants)?
            };

            on_entry(start + offset, &outcome, variants)?;
            outcomes.push(outcome);
        }

        let captured = outcomes.iter().filter(|o| o.status == CaptureStatus::Ok).count();
        info!(entries = outcomes.len(), captured, variants = variants.variants().len(), "page capture finished");

        Ok(PageCapture {
            outcomes,
            budget_exhausted: exhausted,
        })
    }

    fn capture_baselines(
        &self,
        driver: &mut dyn BrowserDriver,
        entries: &[InventoryEntry],
        page_budget: &Budget,
    ) -> Result<Vec<Baseline>> {
        let mut baselines = Vec::with_capacity(entries.len());

        for entry in entries {
            if let BudgetDecision::Block(reason) = page_budget.check() {
                baselines.push(Baseline::Missing(CaptureStatus::Skipped, reason.to_string()));
                continue;
            }

            let selector = entry.locator.selector.clone();
            let outcome = run_step(driver, &entry.locator, |d| {
                d.screenshot(Some(&selector)).map_err(|e| CaptureError::from_driver(e, &selector))
            })?;

            let baseline = match outcome {
                StepOutcome::Done(shot) => Baseline::Shot(shot),
                StepOutcome::Skipped(err) => Baseline::Missing(CaptureStatus::Skipped, format!("baseline: {}", err)),
                StepOutcome::Failed(err) => Baseline::Missing(CaptureStatus::Failed, format!("baseline: {}", err)),
            };
            if let Baseline::Missing(status, reason) = &baseline {
                warn!(component = %entry.key(), status = status.as_str(), %reason, "no default-state capture");
            }
            baselines.push(baseline);
        }

        Ok(baselines)
    }

    fn capture(
        &self,
        driver: &mut dyn BrowserDriver,
        entry: &InventoryEntry,
        baseline: Baseline,
        page_budget: &Budget,
        variants: &mut VariantLog,
    ) -> Result<EntryOutcome> {
        let mut run = ProtocolRun::new(entry.locator.clone());

        let shot = match baseline {
            Baseline::Shot(shot) => shot,
            Baseline::Missing(status, reason) => return Ok(run.abandon(entry, status, &reason)),
        };
        run.push(entry.default_state(), "baseline", Some(shot), CaptureStatus::Ok, "");

        let mut ctx = ProtocolContext {
            driver,
            options: self.options,
            trace: self.trace,
            variants,
            page_budget,
            component_budget: Budget::component(self.options.component_budget),
        };

        let Some(before) = ctx.snapshot(&mut run)? else {
            return Ok(run.finish(entry, true));
        };
        let Some(node) = before.find(&entry.locator.selector).cloned() else {
            let err = CaptureError::LocatorUnresolved {
                selector: entry.locator.selector.clone(),
                matches: 0,
            };
            run.halt(AttemptState::Skipped, err.to_string());
            return Ok(run.finish(entry, true));
        };

        run_protocol(&mut ctx, &mut run, entry, &node)?;
        let restored = ctx.verify_restored(&run, &before)?;

        let outcome = run.finish(entry, restored);
        self.trace.log(
            &TraceEvent::now(ctx.variants.page_url(), "entry")
                .with_component(&outcome.locator)
                .with_outcome(outcome.status.as_str())
                .with_detail(format!("{} results, restored={}", outcome.results.len(), outcome.restored)),
        );
        Ok(outcome)
    }
}
