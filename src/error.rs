use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the browser automation surface.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Element reference went stale (DOM re-rendered under us)
    #[error("stale element reference: {0}")]
    StaleElement(String),

    /// Command did not complete within its timeout
    #[error("{command} timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// Session was bounced to a login page or the server reported 401
    #[error("browser session is no longer authenticated: {0}")]
    AuthExpired(String),

    /// browser_server.js reported failure for a command
    #[error("{command} failed: {error}")]
    Protocol { command: String, error: String },

    /// Node.js subprocess failed to spawn
    #[error("failed to spawn {script} (is Node.js installed?): {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the session pipes failed
    #[error("browser session I/O: {0}")]
    Io(String),

    /// JSON parsing or serialization failed
    #[error("JSON error ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DriverError {
    /// Stale references and timeouts are worth exactly one more attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::StaleElement(_) | DriverError::Timeout { .. })
    }
}

/// Failures reported by the structured knowledge store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected field '{field}': {reason}")]
    SchemaValidation { field: String, reason: String },

    #[error("batch record {index} rejected: {reason}")]
    BatchWrite { index: usize, reason: String },

    #[error("store credentials rejected: {0}")]
    AuthExpired(String),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("store transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline error taxonomy.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Page never reached a stable render
    #[error("page {url} did not reach a stable render within {waited_ms}ms")]
    ScanIncomplete { url: String, waited_ms: u64 },

    /// Selector matched zero or several live elements
    #[error("selector '{selector}' matched {matches} elements")]
    LocatorUnresolved { selector: String, matches: usize },

    #[error("interaction with '{selector}' timed out: {detail}")]
    InteractionTimeout { selector: String, detail: String },

    /// Non-fatal: recorded on the capture results, never aborts the run
    #[error("'{selector}' was not restored: {detail}")]
    RestorationFailed { selector: String, detail: String },

    #[error("schema validation failed for '{field}': {reason}")]
    SchemaValidationError { field: String, reason: String },

    /// Session-level; halts the pipeline until re-authentication
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    #[error("batch write failed at record {index}: {reason}")]
    BatchWriteError { index: usize, reason: String },

    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error(transparent)]
    Driver(DriverError),

    #[error(transparent)]
    Store(StoreError),

    #[error("checkpoint I/O at {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint format: {0}")]
    CheckpointFormat(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Map a driver failure for a specific selector, naming timeouts after it.
    pub fn from_driver(err: DriverError, selector: &str) -> Self {
        match err {
            DriverError::Timeout { command, timeout_ms } => CaptureError::InteractionTimeout {
                selector: selector.to_string(),
                detail: format!("{} exceeded {}ms", command, timeout_ms),
            },
            other => other.into(),
        }
    }

    pub fn checkpoint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::Checkpoint {
            path: path.into(),
            source,
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, CaptureError::AuthExpired(_))
    }

    /// Component-local failures that earn one fresh re-query and retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptureError::LocatorUnresolved { .. } | CaptureError::InteractionTimeout { .. } => true,
            CaptureError::Driver(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<DriverError> for CaptureError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::AuthExpired(msg) => CaptureError::AuthExpired(msg),
            other => CaptureError::Driver(other),
        }
    }
}

impl From<StoreError> for CaptureError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AuthExpired(msg) => CaptureError::AuthExpired(msg),
            StoreError::SchemaValidation { field, reason } => {
                CaptureError::SchemaValidationError { field, reason }
            }
            StoreError::BatchWrite { index, reason } => CaptureError::BatchWriteError { index, reason },
            other => CaptureError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_auth_expiry_becomes_pipeline_auth_expiry() {
        let err: CaptureError = DriverError::AuthExpired("redirected to /login".into()).into();
        assert!(err.is_auth_expired());
        assert!(!err.is_retryable());
    }

    #[test]
    fn timeouts_are_named_after_the_selector() {
        let err = CaptureError::from_driver(
            DriverError::Timeout {
                command: "click".into(),
                timeout_ms: 3000,
            },
            "#theme",
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("#theme"));
    }

    #[test]
    fn store_batch_error_maps_to_batch_write_error() {
        let err: CaptureError = StoreError::BatchWrite {
            index: 4,
            reason: "bad select".into(),
        }
        .into();
        assert!(matches!(err, CaptureError::BatchWriteError { index: 4, .. }));
    }
}
