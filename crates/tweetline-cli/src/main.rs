//! tweetline - incremental tweet search harvester
//!
//! Paginates the search API per topic, writes Parquet per record kind and
//! keeps id ledgers so repeated runs never store a record twice.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tweetline_core::shutdown_flag;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "tweetline")]
#[command(about = "Incremental tweet search harvester with cross-session deduplication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./tweetline.toml or ~/.config/tweetline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest search results for one or more topics
    Fetch(cmd::fetch::FetchArgs),
    /// Manage id ledgers
    Ledger(cmd::ledger::LedgerArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(tweetline_core::ProgressContext::new());

    // Logging: warn on a TTY (spinner shows activity), info otherwise
    let multi = progress.is_tty().then(|| progress.multi());
    if let Err(e) = tweetline_core::init_logging(cli.debug, multi) {
        eprintln!("Failed to init logger: {e}");
    }

    match dispatch(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            if !log::log_enabled!(log::Level::Error) {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, progress: &tweetline_core::SharedProgress) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Fetch(args) => {
            setup_signal_handler()?;
            cmd::fetch::run(args, &config, progress)
        }
        Command::Ledger(args) => cmd::ledger::run(args, &config),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn setup_signal_handler() -> Result<()> {
    // First signal: set graceful shutdown flag
    // Second signal: force exit
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        let registered = unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
        };
        registered.with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let token = if config.api.settings().resolve_bearer_token().is_some() {
        "configured"
    } else {
        "not set"
    };
    let ledger = if config.ledger.enabled {
        config.ledger.dir.display().to_string()
    } else {
        "disabled".to_string()
    };

    table.add_row(vec![
        "Output directory",
        &config.output.default_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Compression level",
        &config.output.compression_level.to_string(),
    ]);
    table.add_row(vec!["Recent search URL", &config.api.recent_url]);
    table.add_row(vec!["Archive search URL", &config.api.archive_url]);
    table.add_row(vec!["Bearer token", token]);
    table.add_row(vec!["Language", &config.api.lang]);
    table.add_row(vec!["Max results", &config.api.max_results.to_string()]);
    table.add_row(vec!["Conditions", &config.api.conditions]);
    table.add_row(vec![
        "Batch size",
        &format!(
            "{} x {} batches",
            config.pagination.batch_size, config.pagination.num_batches
        ),
    ]);
    table.add_row(vec!["Sleep", &format!("{}s", config.pagination.sleep_secs)]);
    table.add_row(vec!["Ledger", &ledger]);

    eprintln!("\n{table}");
}
