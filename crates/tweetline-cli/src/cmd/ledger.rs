//! Ledger subcommand - provision, inspect and rebuild id ledgers

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tweetline_core::{IdLedger, LEDGER_KINDS, fmt_num, init_ledger, ledger, ledger_path, recover_ids};

use crate::cmd::fetch::print_summary;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub action: LedgerAction,

    /// Ledger directory (default: [ledger] dir from config)
    #[arg(long, global = true)]
    pub ledger_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum LedgerAction {
    /// Create empty ledger files for every tracked kind (never truncates)
    Init,
    /// Show id counts per kind
    Stats,
    /// Add ids found in previously written Parquet files
    Recover {
        /// Directory to scan (default: output directory from config)
        #[arg(long)]
        from: Option<PathBuf>,
    },
}

pub fn run(args: LedgerArgs, config: &Config) -> Result<ExitCode> {
    let dir = args.ledger_dir.unwrap_or_else(|| config.ledger.dir.clone());
    match args.action {
        LedgerAction::Init => {
            let mut rows = Vec::new();
            for kind in &LEDGER_KINDS {
                let path = ledger_path(&dir, kind);
                let created = init_ledger(&path)?;
                rows.push((kind.name(), if created { "created" } else { "exists" }.to_string()));
            }
            print_summary(&format!("Ledgers in {}", dir.display()), &rows);
        }
        LedgerAction::Stats => {
            let mut rows = Vec::new();
            for kind in &LEDGER_KINDS {
                let path = ledger_path(&dir, kind);
                let value = match ledger::read_ids(&path) {
                    Ok(ids) => fmt_num(ids.len()),
                    Err(tweetline_core::LedgerError::NotFound(_)) => "missing".to_string(),
                    Err(e) => return Err(e.into()),
                };
                rows.push((kind.name(), value));
            }
            print_summary(&format!("Ledgers in {}", dir.display()), &rows);
        }
        LedgerAction::Recover { from } => {
            let source = from.unwrap_or_else(|| config.output.default_dir.clone());
            let mut rows = Vec::new();
            for kind in &LEDGER_KINDS {
                let recovered = recover_ids(&source, kind);
                let path = ledger_path(&dir, kind);
                init_ledger(&path)?;
                let mut ledger = IdLedger::load(kind.clone(), &path)?;
                let found = recovered.len();
                let added = ledger
                    .extend(recovered)
                    .with_context(|| format!("Cannot update {}", path.display()))?;
                log::info!("{kind}: {found} ids found, {added} new, {} total", ledger.len());
                rows.push((
                    kind.name(),
                    format!("+{} ({} total)", fmt_num(added), fmt_num(ledger.len())),
                ));
            }
            print_summary(&format!("Recovered from {}", source.display()), &rows);
        }
    }
    Ok(ExitCode::SUCCESS)
}
