use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::driver::{BrowserDriver, ImageHandle, NavigateOptions};
use crate::browser::snapshot::{PageSnapshot, Viewport};
use crate::error::DriverError;
use crate::locator::locator_model::ComponentLocator;

pub const DEFAULT_SERVER_SCRIPT: &str = "node/browser_server.js";

/// Request sent to browser_server.js over stdin (one JSON line).
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BrowserRequest {
    Navigate {
        url: String,
        viewport: Viewport,
        timeout_ms: u64,
    },
    Snapshot,
    Screenshot {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        dir: String,
    },
    Action {
        action: &'static str,
        selector: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        timeout_ms: u64,
    },
    PressKey {
        key: String,
        timeout_ms: u64,
    },
    Evaluate {
        script: String,
    },
    Wait {
        duration_ms: u64,
    },
    Quit,
}

impl BrowserRequest {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserRequest::Navigate { .. } => "navigate",
            BrowserRequest::Snapshot => "snapshot",
            BrowserRequest::Screenshot { .. } => "screenshot",
            BrowserRequest::Action { action, .. } => *action,
            BrowserRequest::PressKey { .. } => "press_key",
            BrowserRequest::Evaluate { .. } => "evaluate",
            BrowserRequest::Wait { .. } => "wait",
            BrowserRequest::Quit => "quit",
        }
    }

    fn timeout_ms(&self) -> u64 {
        match self {
            BrowserRequest::Navigate { timeout_ms, .. }
            | BrowserRequest::Action { timeout_ms, .. }
            | BrowserRequest::PressKey { timeout_ms, .. } => *timeout_ms,
            BrowserRequest::Wait { duration_ms } => *duration_ms,
            _ => 0,
        }
    }

    /// How long the client waits for the server to answer this request.
    fn response_deadline(&self, grace_ms: u64) -> Duration {
        Duration::from_millis(self.timeout_ms().saturating_add(grace_ms))
    }
}

/// Response received from browser_server.js over stdout (one JSON line).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// "stale", "timeout" or "auth" when the failure has a known kind
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
}

/// Per-command timeouts, within the 500-3000ms band the server honours.
#[derive(Debug, Clone)]
pub struct SessionTimeouts {
    pub navigate_ms: u64,
    pub action_ms: u64,
    pub key_ms: u64,
    /// Added to a command's own timeout before the client gives up on the server
    pub response_grace_ms: u64,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            navigate_ms: 3000,
            action_ms: 1500,
            key_ms: 500,
            response_grace_ms: 15_000,
        }
    }
}

#[derive(Debug)]
enum LineError {
    TimedOut,
    Closed,
    Io(io::Error),
}

/// Reads server output on its own thread so every wait can be bounded.
struct LineReader {
    lines: Receiver<io::Result<String>>,
}

impl LineReader {
    fn spawn<R: Read + Send + 'static>(source: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(source);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        Self { lines: rx }
    }

    fn next_line(&self, wait: Duration) -> Result<String, LineError> {
        match self.lines.recv_timeout(wait) {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(LineError::Io(e)),
            Err(RecvTimeoutError::Timeout) => Err(LineError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(LineError::Closed),
        }
    }
}

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A persistent browser session backed by browser_server.js.
///
/// Launches a long-lived Node.js process that keeps a Chromium context open.
/// Commands are sent as NDJSON over stdin, responses read from stdout. One
/// session belongs to exactly one page capture at a time.
pub struct BrowserSession {
    child: Child,
    stdin: ChildStdin,
    reader: LineReader,
    screenshot_dir: String,
    timeouts: SessionTimeouts,
    /// Set once a command went unanswered and the server was killed
    stalled: Option<&'static str>,
}

impl BrowserSession {
    /// Launch a new browser session by spawning the server script.
    pub fn launch(script: &str, screenshot_dir: &str) -> Result<Self, DriverError> {
        let mut child = Command::new("node")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DriverError::Spawn {
                script: script.to_string(),
                source: e,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Io("failed to capture stdin of browser server".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Io("failed to capture stdout of browser server".into()))?;

        let reader = LineReader::spawn(stdout);

        // Wait for the ready signal
        let line = match reader.next_line(LAUNCH_TIMEOUT) {
            Ok(line) => line,
            Err(LineError::TimedOut) => {
                let _ = child.kill();
                return Err(DriverError::Timeout {
                    command: "launch".into(),
                    timeout_ms: LAUNCH_TIMEOUT.as_millis() as u64,
                });
            }
            Err(LineError::Closed) => return Err(DriverError::Io("browser server exited before it was ready".into())),
            Err(LineError::Io(e)) => return Err(DriverError::Io(format!("failed to read ready signal: {}", e))),
        };

        let response: BrowserResponse =
            serde_json::from_str(line.trim()).map_err(|e| DriverError::Json {
                context: "browser server ready signal".into(),
                source: e,
            })?;

        if !response.ok || response.ready != Some(true) {
            return Err(DriverError::Protocol {
                command: "launch".into(),
                error: "did not receive ready signal from browser server".into(),
            });
        }

        debug!(script, "browser session ready");

        Ok(BrowserSession {
            child,
            stdin,
            reader,
            screenshot_dir: screenshot_dir.to_string(),
            timeouts: SessionTimeouts::default(),
            stalled: None,
        })
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Send a request and read the response.
    ///
    /// A server that stays silent past the request's deadline is killed; every
    /// later command on this session fails fast.
    fn send(&mut self, request: &BrowserRequest) -> Result<BrowserResponse, DriverError> {
        if let Some(command) = self.stalled {
            return Err(DriverError::Io(format!(
                "browser server was stopped after an unanswered {} command",
                command
            )));
        }

        let json = serde_json::to_string(request).map_err(|e| DriverError::Json {
            context: "BrowserRequest".into(),
            source: e,
        })?;

        writeln!(self.stdin, "{}", json)
            .map_err(|e| DriverError::Io(format!("failed to write to browser server: {}", e)))?;

        self.stdin
            .flush()
            .map_err(|e| DriverError::Io(format!("failed to flush browser server stdin: {}", e)))?;

        let deadline = request.response_deadline(self.timeouts.response_grace_ms);
        let line = match self.reader.next_line(deadline) {
            Ok(line) => line,
            Err(LineError::TimedOut) => {
                warn!(command = request.name(), waited_ms = deadline.as_millis() as u64, "browser server unresponsive, stopping it");
                self.stalled = Some(request.name());
                let _ = self.child.kill();
                return Err(DriverError::Timeout {
                    command: request.name().to_string(),
                    timeout_ms: deadline.as_millis() as u64,
                });
            }
            Err(LineError::Closed) => String::new(),
            Err(LineError::Io(e)) => return Err(DriverError::Io(format!("failed to read from browser server: {}", e))),
        };

        if line.trim().is_empty() {
            return Err(DriverError::Io(
                "empty response from browser server (process may have died)".into(),
            ));
        }

        serde_json::from_str(line.trim()).map_err(|e| DriverError::Json {
            context: "browser server response".into(),
            source: e,
        })
    }

    /// Send a request and map a failed response onto the error taxonomy.
    fn send_ok(&mut self, request: &BrowserRequest) -> Result<BrowserResponse, DriverError> {
        let response = self.send(request)?;
        if response.ok {
            return Ok(response);
        }

        let command = request.name().to_string();
        let error = response.error.unwrap_or_else(|| "unknown error".into());

        Err(match response.error_kind.as_deref() {
            Some("stale") => DriverError::StaleElement(error),
            Some("timeout") => DriverError::Timeout {
                command,
                timeout_ms: request.timeout_ms(),
            },
            Some("auth") => DriverError::AuthExpired(error),
            _ => DriverError::Protocol { command, error },
        })
    }

    fn action(
        &mut self,
        action: &'static str,
        locator: &ComponentLocator,
        value: Option<&str>,
    ) -> Result<(), DriverError> {
        let request = BrowserRequest::Action {
            action,
            selector: locator.selector.clone(),
            value: value.map(|v| v.to_string()),
            timeout_ms: self.timeouts.action_ms,
        };
        self.send_ok(&request)?;
        Ok(())
    }

    /// Quit the browser session.
    pub fn quit(&mut self) -> Result<(), DriverError> {
        // Best-effort quit, the process may already be gone
        if self.stalled.is_none() {
            let _ = self.send(&BrowserRequest::Quit);
        }
        let _ = self.child.wait();
        Ok(())
    }
}

impl BrowserDriver for BrowserSession {
    fn navigate(&mut self, url: &str, opts: &NavigateOptions) -> Result<(), DriverError> {
        let request = BrowserRequest::Navigate {
            url: url.to_string(),
            viewport: opts.viewport,
            timeout_ms: opts.timeout_ms.max(self.timeouts.navigate_ms),
        };
        self.send_ok(&request)?;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<PageSnapshot, DriverError> {
        let response = self.send_ok(&BrowserRequest::Snapshot)?;
        let data = response.data.ok_or_else(|| DriverError::Protocol {
            command: "snapshot".into(),
            error: "no data in snapshot response".into(),
        })?;

        serde_json::from_value(data).map_err(|e| DriverError::Json {
            context: "snapshot payload".into(),
            source: e,
        })
    }

    fn screenshot(&mut self, selector: Option<&str>) -> Result<ImageHandle, DriverError> {
        let request = BrowserRequest::Screenshot {
            selector: selector.map(|s| s.to_string()),
            dir: self.screenshot_dir.clone(),
        };
        let response = self.send_ok(&request)?;
        response.path.map(ImageHandle).ok_or_else(|| DriverError::Protocol {
            command: "screenshot".into(),
            error: "no path in screenshot response".into(),
        })
    }

    fn click(&mut self, locator: &ComponentLocator) -> Result<(), DriverError> {
        self.action("click", locator, None)
    }

    fn hover(&mut self, locator: &ComponentLocator) -> Result<(), DriverError> {
        self.action("hover", locator, None)
    }

    fn fill(&mut self, locator: &ComponentLocator, value: &str) -> Result<(), DriverError> {
        self.action("fill", locator, Some(value))
    }

    fn select_option(&mut self, locator: &ComponentLocator, option_label: &str) -> Result<(), DriverError> {
        self.action("select", locator, Some(option_label))
    }

    fn press_key(&mut self, key: &str) -> Result<(), DriverError> {
        let request = BrowserRequest::PressKey {
            key: key.to_string(),
            timeout_ms: self.timeouts.key_ms,
        };
        self.send_ok(&request)?;
        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        let request = BrowserRequest::Evaluate {
            script: script.to_string(),
        };
        let response = self.send_ok(&request)?;
        Ok(response.data.unwrap_or(Value::Null))
    }

    fn wait_for(&mut self, ms: u64) -> Result<(), DriverError> {
        self.send_ok(&BrowserRequest::Wait { duration_ms: ms })?;
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!(error = %e, "browser session did not quit cleanly");
        }
    }
}
