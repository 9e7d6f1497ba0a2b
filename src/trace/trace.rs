use serde::Serialize;

use crate::locator::locator_model::ComponentLocator;

/// One line of the interaction journal.
#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: i64,
    pub page: String,

    pub component: Option<String>,
    pub role: Option<String>,

    pub step: String,
    pub outcome: String,

    pub state: Option<String>,
    pub detail: Option<String>,
}

impl TraceEvent {
    pub fn now(page: &str, step: impl ToString) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            page: page.to_string(),
            component: None,
            role: None,
            step: step.to_string(),
            outcome: "ok".to_string(),
            state: None,
            detail: None,
        }
    }

    pub fn with_component(mut self, locator: &ComponentLocator) -> Self {
        self.component = Some(locator.key());
        self.role = Some(locator.role.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: impl ToString) -> Self {
        self.outcome = outcome.to_string();
        self
    }

    pub fn with_state(mut self, state: impl ToString) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}
