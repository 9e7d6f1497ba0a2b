use std::time::Duration;

use crate::browser::driver::BrowserDriver;
use crate::browser::session::BrowserSession;
use crate::cli::config::{
    AppConfig, build_capabilities, build_checkpoint_dir, build_form_login, build_navigate_options, build_pipeline_options,
    build_scan_options, build_schema_rules, build_session_timeouts,
};
use crate::discovery::scanner::scan_with_retry;
use crate::error::Result;
use crate::pipeline::checkpoint::CheckpointStore;
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::recovery::FormLogin;
use crate::report::console::format_console_report;
use crate::report::junit::generate_junit_xml;
use crate::store::client::{HttpKnowledgeStore, KnowledgeStore};
use crate::store::memory::MemoryStore;
use crate::store::writer::KnowledgeStoreWriter;
use crate::trace::logger::TraceLogger;

// ============================================================================
// capture subcommand
// ============================================================================

/// Run the pipeline and return whether every page completed.
#[allow(clippy::too_many_arguments)]
pub fn cmd_capture(
    config: &AppConfig,
    urls: &[String],
    dry_run: bool,
    workers: Option<usize>,
    format: &str,
    output: Option<&str>,
    checkpoint_dir: Option<&str>,
    verbose: u8,
) -> std::result::Result<bool, Box<dyn std::error::Error>> {
    let memory = MemoryStore::new(build_capabilities(&config.store));
    let http = if dry_run { None } else { Some(connect_store(config)?) };
    let store: &dyn KnowledgeStore = match &http {
        Some(http) => http,
        None => &memory,
    };

    let checkpoints = CheckpointStore::open(build_checkpoint_dir(&config.pipeline, checkpoint_dir, dry_run))?;
    let trace = match &config.pipeline.trace_file {
        Some(path) => TraceLogger::new(path),
        None => TraceLogger::disabled(),
    };

    let options = build_pipeline_options(config, workers);
    let login: Option<FormLogin> = config
        .login
        .as_ref()
        .map(|l| build_form_login(l, config.pipeline.auth_redirect_pattern.as_deref()))
        .transpose()?;

    let writer = KnowledgeStoreWriter::new(store, build_schema_rules(&config.store), config.store.collections.clone());
    let mut orchestrator = Orchestrator::new(writer, &checkpoints, &trace, options);
    if let Some(login) = &login {
        orchestrator = orchestrator.with_reauth(login);
    }

    if verbose > 0 {
        eprintln!(
            "Capturing {} page(s) with {} worker(s), checkpoints in {}",
            urls.len(),
            orchestrator.options().workers,
            checkpoints.dir().display()
        );
    }

    let report = orchestrator.run(urls, || launch_browser(config));

    let output_content = match format {
        "junit" => generate_junit_xml(&report),
        "json" => serde_json::to_string_pretty(&report)?,
        _ => format_console_report(&report),
    };

    match output {
        Some(path) => std::fs::write(path, &output_content)?,
        None => print!("{}", output_content),
    }

    if dry_run && verbose > 0 {
        eprintln!("Dry run: {} record(s) kept in memory", memory.record_count());
    }

    Ok(report.all_complete())
}

fn connect_store(config: &AppConfig) -> std::result::Result<HttpKnowledgeStore, Box<dyn std::error::Error>> {
    let endpoint = config
        .store
        .endpoint
        .as_deref()
        .ok_or("store.endpoint is not configured (use --dry-run to write in memory)")?;
    let token =
        std::env::var(&config.store.token_env).map_err(|_| format!("${} is not set", config.store.token_env))?;

    Ok(HttpKnowledgeStore::new(
        endpoint,
        &token,
        build_capabilities(&config.store),
        Duration::from_secs(config.store.timeout_secs),
    )?)
}

fn launch_browser(config: &AppConfig) -> Result<Box<dyn BrowserDriver>> {
    let session = BrowserSession::launch(&config.pipeline.browser_script, &config.pipeline.screenshot_dir)?
        .with_timeouts(build_session_timeouts(&config.capture));
    Ok(Box::new(session))
}

// ============================================================================
// scan subcommand
// ============================================================================

/// Discovery only; prints the inventory as YAML.
pub fn cmd_scan(config: &AppConfig, url: &str, verbose: u8) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut session = launch_browser(config)?;

    if verbose > 0 {
        eprintln!("Scanning {}...", url);
    }

    session.navigate(url, &build_navigate_options(&config.capture))?;
    let inventory = scan_with_retry(session.as_mut(), &build_scan_options(&config.capture))?;

    print!("{}", serde_yaml::to_string(&inventory)?);
    Ok(())
}

// ============================================================================
// status subcommand
// ============================================================================

pub fn cmd_status(config: &AppConfig, checkpoint_dir: Option<&str>) -> Result<()> {
    let dir = checkpoint_dir.unwrap_or(&config.pipeline.checkpoint_dir);
    let checkpoints = CheckpointStore::open(dir)?;
    let table = checkpoints.load_all()?;

    if table.is_empty() {
        println!("No checkpoints in {}", dir);
        return Ok(());
    }

    println!("{:<20} {:>6} {:<16} {}", "STAGE", "INDEX", "PAGE RECORD", "URL");
    for (url, checkpoint) in &table {
        let index = checkpoint.last_index.map_or("-".to_string(), |i| i.to_string());
        let page_id = checkpoint.page_id.as_ref().map_or("-", |id| id.as_str());
        println!("{:<20} {:>6} {:<16} {}", checkpoint.stage.as_str(), index, page_id, url);
        if let Some(error) = &checkpoint.errored {
            println!("{:<20} {}", "", error);
        }
    }
    Ok(())
}
