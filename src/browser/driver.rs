use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser::snapshot::{PageSnapshot, Viewport};
use crate::error::DriverError;
use crate::locator::locator_model::ComponentLocator;

/// Opaque handle to a persisted screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHandle(pub String);

impl ImageHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateOptions {
    pub viewport: Viewport,
    pub timeout_ms: u64,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timeout_ms: 3000,
        }
    }
}

/// The narrow browser-control surface the pipeline depends on.
///
/// Every mutating call may fail with `DriverError::StaleElement` or
/// `DriverError::Timeout`; callers treat both as retryable once.
pub trait BrowserDriver {
    fn navigate(&mut self, url: &str, opts: &NavigateOptions) -> Result<(), DriverError>;

    /// Structural read of the accessibility / interactive-element tree.
    fn snapshot(&mut self) -> Result<PageSnapshot, DriverError>;

    /// Full viewport when `selector` is `None`, otherwise the element's box.
    fn screenshot(&mut self, selector: Option<&str>) -> Result<ImageHandle, DriverError>;

    fn click(&mut self, locator: &ComponentLocator) -> Result<(), DriverError>;

    fn hover(&mut self, locator: &ComponentLocator) -> Result<(), DriverError>;

    fn fill(&mut self, locator: &ComponentLocator, value: &str) -> Result<(), DriverError>;

    fn select_option(&mut self, locator: &ComponentLocator, option_label: &str) -> Result<(), DriverError>;

    fn press_key(&mut self, key: &str) -> Result<(), DriverError>;

    fn evaluate(&mut self, script: &str) -> Result<Value, DriverError>;

    fn wait_for(&mut self, ms: u64) -> Result<(), DriverError>;

    /// Number of live elements matching a CSS selector.
    fn match_count(&mut self, selector: &str) -> Result<usize, DriverError> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector)?);
        let value = self.evaluate(&script)?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        let value = self.evaluate("window.location.href")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn scroll_to(&mut self, y: u32) -> Result<(), DriverError> {
        self.evaluate(&format!("window.scrollTo(0, {})", y))?;
        Ok(())
    }

    fn scroll_y(&mut self) -> Result<u32, DriverError> {
        let value = self.evaluate("Math.round(window.scrollY)")?;
        Ok(value.as_u64().unwrap_or(0) as u32)
    }

    /// Source of the element's inline click handler, if any.
    fn handler_source(&mut self, selector: &str) -> Result<Option<String>, DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.getAttribute('onclick') : null; }})()",
            js_string(selector)?
        );
        let value = self.evaluate(&script)?;
        Ok(value.as_str().map(|s| s.to_string()))
    }
}

/// Quote a string as a JavaScript literal.
fn js_string(raw: &str) -> Result<String, DriverError> {
    serde_json::to_string(raw).map_err(|e| DriverError::Json {
        context: "selector literal".into(),
        source: e,
    })
}
