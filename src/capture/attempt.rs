use tracing::debug;

use crate::browser::driver::BrowserDriver;
use crate::error::{CaptureError, Result};
use crate::locator::locator_model::{ComponentLocator, resolve};

/// Per-step retry state machine: `Pending -> Retrying -> {Ok, Skipped, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Retrying,
    Ok,
    Skipped,
    Failed,
}

impl AttemptState {
    pub fn succeed(self) -> Self {
        match self {
            AttemptState::Pending | AttemptState::Retrying => AttemptState::Ok,
            terminal => terminal,
        }
    }

    /// A retryable failure earns one retry; a second one skips the entry.
    /// Non-retryable failures fail it immediately.
    pub fn fail(self, retryable: bool) -> Self {
        match (self, retryable) {
            (AttemptState::Pending, true) => AttemptState::Retrying,
            (AttemptState::Retrying, true) => AttemptState::Skipped,
            (AttemptState::Pending, false) | (AttemptState::Retrying, false) => AttemptState::Failed,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Ok | AttemptState::Skipped | AttemptState::Failed)
    }
}

/// How one protocol sub-step ended.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Done(T),
    Skipped(CaptureError),
    Failed(CaptureError),
}

/// Run one sub-step against a freshly resolved locator.
///
/// Each attempt re-queries the element first so a stale reference from a
/// re-render elsewhere on the page is replaced. Only `AuthExpired` escapes as
/// `Err`; every other failure is folded into the returned outcome.
pub fn run_step<T, F>(driver: &mut dyn BrowserDriver, locator: &ComponentLocator, mut step: F) -> Result<StepOutcome<T>>
where
    F: FnMut(&mut dyn BrowserDriver) -> Result<T>,
{
    let mut state = AttemptState::Pending;

    loop {
        let attempt = match resolve(driver, locator) {
            Ok(()) => step(driver),
            Err(e) => Err(e),
        };

        let err = match attempt {
            Ok(value) => {
                state = state.succeed();
                debug_assert!(state.is_terminal());
                return Ok(StepOutcome::Done(value));
            }
            Err(e) if e.is_auth_expired() => return Err(e),
            Err(e) => e,
        };

        state = state.fail(err.is_retryable());
        match state {
            AttemptState::Retrying => {
                debug!(selector = %locator.selector, error = %err, "step failed, re-querying and retrying once");
            }
            AttemptState::Skipped => return Ok(StepOutcome::Skipped(err)),
            _ => return Ok(StepOutcome::Failed(err)),
        }
    }
}
