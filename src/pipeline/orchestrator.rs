use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use crate::browser::driver::{BrowserDriver, NavigateOptions};
use crate::capture::capture_model::{CaptureOptions, EntryOutcome, PageVariant};
use crate::capture::engine::CaptureEngine;
use crate::capture::variants::VariantLog;
use crate::discovery::inventory_model::ComponentInventory;
use crate::discovery::scanner::{ScanOptions, scan_with_retry};
use crate::error::{CaptureError, Result};
use crate::pipeline::checkpoint::{Checkpoint, CheckpointStore};
use crate::pipeline::page_record::{PageLifecycle, PageRecord, PageStage};
use crate::pipeline::recovery::{AuthRedirect, Reauthenticate};
use crate::report::report_model::{PageReport, PipelineReport};
use crate::store::writer::{KnowledgeStoreWriter, PersistedRefs};
use crate::trace::logger::TraceLogger;
use crate::trace::trace::TraceEvent;

const HALTED: &str = "not started: pipeline halted on expired authentication";

/// Knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scan: ScanOptions,
    pub capture: CaptureOptions,
    pub navigate: NavigateOptions,

    /// Pages processed concurrently, one browser each
    pub workers: usize,

    /// Login-page detection after navigation
    pub auth_redirect: Option<AuthRedirect>,

    /// Stop each page once this stage is reached
    pub stop_after: Option<PageStage>,

    /// Tags written onto every page record
    pub tags: Vec<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            capture: CaptureOptions::default(),
            navigate: NavigateOptions::default(),
            workers: 1,
            auth_redirect: None,
            stop_after: None,
            tags: Vec::new(),
        }
    }
}

// ============================================================================
// Orchestrator: discover, persist inventory, capture, persist variants
// ============================================================================

/// Drives every page through its stages and records durable progress.
///
/// Shared across worker threads: each worker owns its driver, while the
/// store writer, checkpoint store and journal are shared.
pub struct Orchestrator<'a> {
    writer: KnowledgeStoreWriter<'a>,
    checkpoints: &'a CheckpointStore,
    trace: &'a TraceLogger,
    options: PipelineOptions,
    reauth: Option<&'a dyn Reauthenticate>,
    halted: AtomicBool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        writer: KnowledgeStoreWriter<'a>,
        checkpoints: &'a CheckpointStore,
        trace: &'a TraceLogger,
        options: PipelineOptions,
    ) -> Self {
        Self {
            writer,
            checkpoints,
            trace,
            options,
            reauth: None,
            halted: AtomicBool::new(false),
        }
    }

    pub fn with_reauth(mut self, reauth: &'a dyn Reauthenticate) -> Self {
        self.reauth = Some(reauth);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// True once an unrecovered `AuthExpired` stopped the pipeline.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Process pages across `options.workers` threads.
    ///
    /// Each worker builds its own driver from `factory` and pulls the next
    /// unclaimed URL. After a halt no new page is started; the rest are
    /// reported as not started.
    pub fn run<F>(&self, urls: &[String], factory: F) -> PipelineReport
    where
        F: Fn() -> Result<Box<dyn BrowserDriver>> + Sync,
    {
        let started = Instant::now();
        let next = AtomicUsize::new(0);
        let reports = Mutex::new(Vec::with_capacity(urls.len()));
        let workers = self.options.workers.clamp(1, urls.len().max(1));

        info!(pages = urls.len(), workers, "pipeline started");

        thread::scope(|scope| {
            for worker in 0..workers {
                let (next, reports, factory) = (&next, &reports, &factory);
                scope.spawn(move || self.work(worker, urls, next, reports, factory));
            }
        });

        let mut reports = reports.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        reports.sort_by_key(|(index, _)| *index);
        let pages: Vec<PageReport> = reports.into_iter().map(|(_, report)| report).collect();

        let report = PipelineReport::from_pages(pages, self.is_halted()).with_duration(started.elapsed().as_millis());
        let (captured, skipped, failed) = report.totals();
        info!(captured, skipped, failed, halted = report.halted, "pipeline finished");
        report
    }

    fn work<F>(&self, worker: usize, urls: &[String], next: &AtomicUsize, reports: &Mutex<Vec<(usize, PageReport)>>, factory: &F)
    where
        F: Fn() -> Result<Box<dyn BrowserDriver>> + Sync,
    {
        let mut driver: Option<Box<dyn BrowserDriver>> = None;

        loop {
            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(url) = urls.get(index) else {
                break;
            };

            let report = if self.is_halted() {
                PageReport::not_started(url, HALTED)
            } else {
                if driver.is_none() {
                    match factory() {
                        Ok(d) => driver = Some(d),
                        Err(err) => {
                            error!(worker, error = %err, "could not start browser");
                            if err.is_auth_expired() {
                                self.halted.store(true, Ordering::SeqCst);
                            }
                        }
                    }
                }
                match driver.as_mut() {
                    Some(d) => self.run_page(d.as_mut(), url),
                    None => PageReport::not_started(url, "not started: browser unavailable"),
                }
            };

            debug!(worker, %url, stage = %report.stage, "page done");
            reports
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((index, report));
        }
    }

    /// Run one page to completion (or as far as it gets) and report it.
    ///
    /// An `AuthExpired` is answered with at most one re-authentication; the
    /// page then resumes from its checkpoint. A second expiry, or a failed
    /// re-authentication, halts the pipeline.
    #[instrument(skip_all, fields(url = %url))]
    pub fn run_page(&self, driver: &mut dyn BrowserDriver, url: &str) -> PageReport {
        let mut reauthenticated = false;

        let error = loop {
            let err = match self.drive_page(driver, url) {
                Ok(()) => break None,
                Err(err) => err,
            };
            self.mark_errored(url, &err);

            if !err.is_auth_expired() || reauthenticated {
                break Some(err);
            }
            let Some(reauth) = self.reauth else {
                break Some(err);
            };

            reauthenticated = true;
            warn!(error = %err, "authentication expired, re-authenticating");
            if let Err(reauth_err) = reauth.reauthenticate(driver) {
                break Some(reauth_err);
            }
        };

        if let Some(err) = &error {
            if err.is_auth_expired() {
                self.halted.store(true, Ordering::SeqCst);
                error!(error = %err, "pipeline halted");
            } else {
                warn!(error = %err, "page run stopped");
            }
        }

        self.report(url, error.map(|e| e.to_string()))
    }

    fn drive_page(&self, driver: &mut dyn BrowserDriver, url: &str) -> Result<()> {
        let mut checkpoint = self.checkpoints.load(url)?.unwrap_or_else(|| Checkpoint::new(url));
        let mut lifecycle = PageLifecycle::resume(checkpoint.stage, checkpoint.errored.clone());

        if lifecycle.is_errored() {
            let stage = lifecycle.recover()?;
            info!(%stage, "resuming errored page from last completed stage");
            checkpoint.errored = None;
            self.checkpoints.save(&checkpoint)?;
        }
        if lifecycle.stage() == PageStage::Complete {
            info!("page already complete");
            return Ok(());
        }
        if self.stops_at(lifecycle.stage()) {
            return Ok(());
        }

        self.open_page(driver, url)?;

        let mut page = PageRecord::new(url, self.options.tags.clone());
        let mut refs = self.checkpoints.load_refs(url)?.unwrap_or_default();

        let inventory = if lifecycle.stage() == PageStage::Discovering {
            let inventory = scan_with_retry(driver, &self.options.scan)?;
            page.title = inventory.title.clone();

            let page_id = self.writer.write_page_record(&page, checkpoint.page_id.as_ref())?;
            refs.page_id = Some(page_id.clone());
            checkpoint.page_id = Some(page_id);
            self.checkpoints.save(&checkpoint)?;

            self.checkpoints.save_inventory(url, &inventory)?;
            self.writer.write_inventory(&page, &inventory, &mut refs)?;
            self.checkpoints.save_refs(url, &refs)?;
            self.advance(&mut lifecycle, &mut checkpoint, PageStage::InventoryPersisted)?;
            inventory
        } else {
            self.checkpoints.load_inventory(url)?.ok_or_else(|| {
                CaptureError::Config(format!("checkpoint for {} has no inventory snapshot", url))
            })?
        };
        page.title = inventory.title.clone();

        if self.stops_at(lifecycle.stage()) {
            return Ok(());
        }

        if lifecycle.stage() == PageStage::InventoryPersisted {
            self.advance(&mut lifecycle, &mut checkpoint, PageStage::Capturing)?;
        }

        if lifecycle.stage() == PageStage::Capturing {
            let variants = self.capture(driver, &inventory, &mut checkpoint, &mut refs)?;

            refs.pending_variants = variants.clone();
            self.writer.write_variants(&variants, &mut refs)?;
            self.checkpoints.save_refs(url, &refs)?;
            self.advance(&mut lifecycle, &mut checkpoint, PageStage::VariantsPersisted)?;

            if self.stops_at(lifecycle.stage()) {
                return Ok(());
            }
        }

        page.complete = true;
        self.writer.close_page(&page, &refs)?;
        self.advance(&mut lifecycle, &mut checkpoint, PageStage::Complete)?;
        Ok(())
    }

    /// Capture from the first unpersisted entry on.
    ///
    /// Outcomes are written as soon as a batch worth of results is pending,
    /// and the checkpoint index moves only after its captures are stored.
    fn capture(
        &self,
        driver: &mut dyn BrowserDriver,
        inventory: &ComponentInventory,
        checkpoint: &mut Checkpoint,
        refs: &mut PersistedRefs,
    ) -> Result<Vec<PageVariant>> {
        let url = checkpoint.page_url.clone();
        let start = checkpoint.resume_index();

        let mut variants = if refs.pending_variants.is_empty() {
            let default_shot = inventory.baselines.first().map(|b| b.screenshot.clone());
            VariantLog::new(&url, inventory.page_state.clone(), default_shot)
        } else {
            VariantLog::resume(&url, inventory.page_state.clone(), refs.pending_variants.clone())
        };

        let last = inventory.entries.len().saturating_sub(1);
        let batch_limit = self.writer.batch_limit();
        let mut buffered: Vec<EntryOutcome> = Vec::new();

        let engine = CaptureEngine::new(&self.options.capture, self.trace);
        let capture = engine.capture_page(driver, inventory, start, &mut variants, |index, outcome, log| {
            buffered.push(outcome.clone());
            let pending: usize = buffered.iter().map(|o| o.results.len()).sum();
            if pending < batch_limit && index < last {
                return Ok(());
            }

            self.writer.write_captures(&buffered, refs)?;
            buffered.clear();
            refs.pending_variants = log.variants().to_vec();
            self.checkpoints.save_refs(&url, refs)?;

            checkpoint.last_index = Some(index);
            self.checkpoints.save(checkpoint)
        })?;

        if capture.budget_exhausted {
            warn!(entries = capture.outcomes.len(), "page budget ran out, remaining entries skipped");
        }
        Ok(variants.into_variants())
    }

    fn open_page(&self, driver: &mut dyn BrowserDriver, url: &str) -> Result<()> {
        driver.navigate(url, &self.options.navigate)?;

        if let Some(redirect) = &self.options.auth_redirect {
            let current = driver.current_url()?;
            if redirect.is_redirected(url, &current) {
                return Err(CaptureError::AuthExpired(format!("redirected to {}", current)));
            }
        }
        Ok(())
    }

    fn advance(&self, lifecycle: &mut PageLifecycle, checkpoint: &mut Checkpoint, to: PageStage) -> Result<()> {
        lifecycle.advance(to)?;
        checkpoint.stage = to;
        self.checkpoints.save(checkpoint)?;

        info!(stage = %to, "stage reached");
        self.trace
            .log(&TraceEvent::now(&checkpoint.page_url, "stage").with_state(to).with_outcome("ok"));
        Ok(())
    }

    fn stops_at(&self, stage: PageStage) -> bool {
        let stop = self.options.stop_after.is_some_and(|s| stage >= s);
        if stop {
            info!(%stage, "stopping at requested stage");
        }
        stop
    }

    fn mark_errored(&self, url: &str, err: &CaptureError) {
        let result = self.checkpoints.load(url).and_then(|cp| {
            let mut cp = cp.unwrap_or_else(|| Checkpoint::new(url));
            cp.errored = Some(err.to_string());
            self.checkpoints.save(&cp)
        });
        if let Err(save_err) = result {
            warn!(error = %save_err, "could not record page error in checkpoint");
        }
    }

    /// Build the page report from what is durably persisted.
    fn report(&self, url: &str, error: Option<String>) -> PageReport {
        let checkpoint = self.checkpoints.load(url).ok().flatten();
        let inventory = self.checkpoints.load_inventory(url).ok().flatten();
        let refs = self.checkpoints.load_refs(url).ok().flatten();
        PageReport::from_state(url, checkpoint.as_ref(), inventory.as_ref(), refs.as_ref(), error)
    }
}
