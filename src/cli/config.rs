use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::browser::driver::NavigateOptions;
use crate::browser::session::{DEFAULT_SERVER_SCRIPT, SessionTimeouts};
use crate::browser::snapshot::Viewport;
use crate::capture::capture_model::CaptureOptions;
use crate::discovery::scanner::ScanOptions;
use crate::error::{CaptureError, Result};
use crate::pipeline::orchestrator::PipelineOptions;
use crate::pipeline::recovery::{AuthRedirect, FormLogin};
use crate::store::schema::SchemaRules;
use crate::store::store_model::StoreCapabilities;
use crate::store::writer::StoreCollections;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "screen-inventory",
    version,
    about = "Discover UI components and capture every state into a knowledge store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: screen-inventory.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) the capture pipeline for one or more pages
    Capture {
        /// Page URL; repeat for several pages
        #[arg(long = "url", required = true)]
        urls: Vec<String>,

        /// Write to an in-memory store; checkpoints go to <checkpoint-dir>/dry-run
        #[arg(long)]
        dry_run: bool,

        /// Pages processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// Output format: console, junit, json
        #[arg(long, default_value = "console")]
        format: String,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,

        /// Checkpoint directory (overrides config)
        #[arg(long)]
        checkpoint_dir: Option<String>,
    },

    /// Discover components on a page and print the inventory as YAML
    Scan {
        #[arg(long)]
        url: String,
    },

    /// Print the checkpoint table
    Status {
        #[arg(long)]
        checkpoint_dir: Option<String>,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `screen-inventory.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Re-authentication through the login form; disabled when absent
    #[serde(default)]
    pub login: Option<LoginConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_settle_ms")]
    pub settle_timeout_ms: u64,

    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    #[serde(default = "default_stabilize_ms")]
    pub stabilize_ms: u64,

    #[serde(default = "default_component_budget")]
    pub component_budget_secs: u64,

    #[serde(default = "default_page_budget")]
    pub page_budget_secs: u64,

    #[serde(default = "default_sample_limit")]
    pub dropdown_sample_limit: usize,

    #[serde(default = "default_chart_layouts")]
    pub max_chart_layouts: usize,

    #[serde(default = "default_text_value")]
    pub text_value: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            settle_timeout_ms: default_settle_ms(),
            poll_ms: default_poll_ms(),
            stabilize_ms: default_stabilize_ms(),
            component_budget_secs: default_component_budget(),
            page_budget_secs: default_page_budget(),
            dropdown_sample_limit: default_sample_limit(),
            max_chart_layouts: default_chart_layouts(),
            text_value: default_text_value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the knowledge store API
    pub endpoint: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub collections: StoreCollections,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    #[serde(default)]
    pub native_multi_value: bool,

    #[serde(default = "default_separator_replacement")]
    pub separator_replacement: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: default_token_env(),
            timeout_secs: default_store_timeout(),
            collections: StoreCollections::default(),
            batch_limit: default_batch_limit(),
            native_multi_value: false,
            separator_replacement: default_separator_replacement(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// JSONL interaction journal; no journal when unset
    pub trace_file: Option<String>,

    /// URL fragment that identifies the login page
    pub auth_redirect_pattern: Option<String>,

    #[serde(default = "default_browser_script")]
    pub browser_script: String,

    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            checkpoint_dir: default_checkpoint_dir(),
            trace_file: None,
            auth_redirect_pattern: None,
            browser_script: default_browser_script(),
            screenshot_dir: default_screenshot_dir(),
            tags: Vec::new(),
        }
    }
}

/// Credentials are read from the environment, never from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub login_url: String,

    #[serde(default = "default_username_env")]
    pub username_env: String,

    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default = "default_username_selector")]
    pub username_selector: String,

    #[serde(default = "default_password_selector")]
    pub password_selector: String,

    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,

    #[serde(default = "default_login_settle")]
    pub settle_ms: u64,
}

// Serde default helpers
fn default_viewport_width() -> u32 { 1440 }
fn default_viewport_height() -> u32 { 900 }
fn default_settle_ms() -> u64 { 3000 }
fn default_poll_ms() -> u64 { 500 }
fn default_stabilize_ms() -> u64 { 600 }
fn default_component_budget() -> u64 { 8 }
fn default_page_budget() -> u64 { 300 }
fn default_sample_limit() -> usize { 5 }
fn default_chart_layouts() -> usize { 4 }
fn default_text_value() -> String { "Sample text".to_string() }
fn default_token_env() -> String { "KNOWLEDGE_STORE_TOKEN".to_string() }
fn default_store_timeout() -> u64 { 30 }
fn default_batch_limit() -> usize { 100 }
fn default_separator_replacement() -> String { "/".to_string() }
fn default_workers() -> usize { 1 }
fn default_checkpoint_dir() -> String { ".screen-inventory".to_string() }
fn default_browser_script() -> String { DEFAULT_SERVER_SCRIPT.to_string() }
fn default_screenshot_dir() -> String { "screenshots".to_string() }
fn default_username_env() -> String { "SCREEN_INVENTORY_USER".to_string() }
fn default_password_env() -> String { "SCREEN_INVENTORY_PASSWORD".to_string() }
fn default_username_selector() -> String { "input[name=username]".to_string() }
fn default_password_selector() -> String { "input[type=password]".to_string() }
fn default_submit_selector() -> String { "button[type=submit]".to_string() }
fn default_login_settle() -> u64 { 1000 }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or("screen-inventory.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Config Builders (merge CLI args with config file)
// ============================================================================

/// Dry-run checkpoints live below the real table, never in it.
pub const DRY_RUN_CHECKPOINTS: &str = "dry-run";

/// Checkpoint directory for a run; `--checkpoint-dir` overrides the config.
///
/// A dry run records in-memory record ids, so it gets its own table that a
/// run against the real store never resumes from.
pub fn build_checkpoint_dir(config: &PipelineConfig, cli_dir: Option<&str>, dry_run: bool) -> PathBuf {
    let base = PathBuf::from(cli_dir.unwrap_or(&config.checkpoint_dir));
    if dry_run { base.join(DRY_RUN_CHECKPOINTS) } else { base }
}

pub fn build_scan_options(config: &CaptureConfig) -> ScanOptions {
    ScanOptions {
        settle_timeout_ms: config.settle_timeout_ms,
        poll_ms: config.poll_ms,
        dropdown_sample_limit: config.dropdown_sample_limit,
        max_chart_layouts: config.max_chart_layouts,
    }
}

pub fn build_capture_options(config: &CaptureConfig) -> CaptureOptions {
    CaptureOptions {
        stabilize_ms: config.stabilize_ms,
        component_budget: Duration::from_secs(config.component_budget_secs),
        page_budget: Duration::from_secs(config.page_budget_secs),
        text_value: config.text_value.clone(),
    }
}

pub fn build_navigate_options(config: &CaptureConfig) -> NavigateOptions {
    NavigateOptions {
        viewport: Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
        },
        timeout_ms: config.settle_timeout_ms,
    }
}

/// Per-command browser timeouts, clamped to what the browser server honours.
pub fn build_session_timeouts(config: &CaptureConfig) -> SessionTimeouts {
    SessionTimeouts {
        navigate_ms: config.settle_timeout_ms.clamp(500, 3000),
        ..SessionTimeouts::default()
    }
}

pub fn build_schema_rules(config: &StoreConfig) -> SchemaRules {
    SchemaRules {
        separator_replacement: config.separator_replacement.clone(),
        ..SchemaRules::default()
    }
}

pub fn build_capabilities(config: &StoreConfig) -> StoreCapabilities {
    StoreCapabilities {
        batch_limit: config.batch_limit.max(1),
        native_multi_value: config.native_multi_value,
    }
}

/// Pipeline options from config; a CLI worker count wins.
pub fn build_pipeline_options(config: &AppConfig, workers: Option<usize>) -> PipelineOptions {
    PipelineOptions {
        scan: build_scan_options(&config.capture),
        capture: build_capture_options(&config.capture),
        navigate: build_navigate_options(&config.capture),
        workers: workers.unwrap_or(config.pipeline.workers).max(1),
        auth_redirect: config.pipeline.auth_redirect_pattern.as_deref().map(AuthRedirect::new),
        stop_after: None,
        tags: config.pipeline.tags.clone(),
    }
}

/// Form login from config, with credentials taken from the environment.
pub fn build_form_login(config: &LoginConfig, redirect_pattern: Option<&str>) -> Result<FormLogin> {
    let env = |name: &str| {
        std::env::var(name).map_err(|_| CaptureError::Config(format!("login configured but ${} is not set", name)))
    };

    Ok(FormLogin {
        login_url: config.login_url.clone(),
        username: env(&config.username_env)?,
        password: env(&config.password_env)?,
        username_selector: config.username_selector.clone(),
        password_selector: config.password_selector.clone(),
        submit_selector: config.submit_selector.clone(),
        redirect: AuthRedirect::new(redirect_pattern.unwrap_or("")),
        settle_ms: config.settle_ms,
    })
}
