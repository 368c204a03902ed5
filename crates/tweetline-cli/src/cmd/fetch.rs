//! Fetch subcommand - harvest search results into Parquet

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use tweetline_core::SharedProgress;
use tweetline_twitter::{HarvestConfig, Topic};

use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Topics to search, as NAME=QUERY or a bare QUERY
    #[arg(required = true, value_parser = parse_topic)]
    pub topics: Vec<Topic>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Tweet language (lang: operator)
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Use the full-archive search endpoint
    #[arg(long)]
    pub archive: bool,

    /// Primary records to accumulate before each flush
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Maximum number of batches per topic
    #[arg(short, long)]
    pub num_batches: Option<usize>,

    /// Seconds to wait before each continuation request
    #[arg(short, long)]
    pub sleep: Option<f64>,

    /// Split written batches into files of at most this many rows
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Skip cross-session deduplication
    #[arg(long)]
    pub no_ledger: bool,

    /// Ledger directory
    #[arg(long)]
    pub ledger_dir: Option<PathBuf>,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,
}

fn parse_topic(s: &str) -> Result<Topic, String> {
    Topic::parse(s).map_err(|e| e.to_string())
}

fn parse_sleep(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| anyhow::anyhow!("Invalid sleep: {secs}s"))
}

/// Merge config file values with CLI overrides
pub fn harvest_config(args: FetchArgs, config: &Config) -> Result<HarvestConfig> {
    let ledger_dir = if args.no_ledger || !config.ledger.enabled {
        None
    } else {
        Some(args.ledger_dir.unwrap_or_else(|| config.ledger.dir.clone()))
    };
    Ok(HarvestConfig {
        output_dir: args
            .output
            .unwrap_or_else(|| config.output.default_dir.clone()),
        lang: args.lang.unwrap_or_else(|| config.api.lang.clone()),
        archive: args.archive,
        topics: args.topics,
        api: config.api.settings(),
        batch_size: args.batch_size.unwrap_or(config.pagination.batch_size),
        num_batches: args.num_batches.unwrap_or(config.pagination.num_batches),
        sleep: parse_sleep(args.sleep.unwrap_or(config.pagination.sleep_secs))?,
        chunk_size: args.chunk_size.or(config.pagination.chunk_size),
        ledger_dir,
        zstd_level: args.zstd_level.unwrap_or(config.output.compression_level),
    })
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let harvest = harvest_config(args, config)?;
    log::debug!("{harvest:?}");

    let summary = tweetline_twitter::run(&harvest, progress.clone())?;

    if summary.interrupted() {
        log::warn!("Interrupted; flushed data and ledgers are consistent");
        return Ok(ExitCode::from(130));
    }
    if progress.is_tty() {
        print_summary(
            "Harvest",
            &[
                ("Session", summary.session_dir.display().to_string()),
                ("Batches", summary.batches_written().to_string()),
                ("Elapsed", format!("{:.1}s", summary.elapsed.as_secs_f64())),
            ],
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
