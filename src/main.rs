use clap::Parser;
use screen_inventory::cli::commands::{cmd_capture, cmd_scan, cmd_status};
use screen_inventory::cli::config::{Cli, Commands, load_config};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Capture {
            urls,
            dry_run,
            workers,
            format,
            output,
            checkpoint_dir,
        } => {
            let all_complete = cmd_capture(
                &config,
                &urls,
                dry_run,
                workers,
                &format,
                output.as_deref(),
                checkpoint_dir.as_deref(),
                cli.verbose,
            )?;
            if !all_complete {
                std::process::exit(1);
            }
        }
        Commands::Scan { url } => {
            cmd_scan(&config, &url, cli.verbose)?;
        }
        Commands::Status { checkpoint_dir } => {
            cmd_status(&config, checkpoint_dir.as_deref())?;
        }
    }

    Ok(())
}

/// RUST_LOG wins; otherwise -v raises the level one step per flag.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("screen_inventory={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
