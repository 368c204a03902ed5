//! Harvest run: one session directory, every topic paginated in turn

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use tweetline_core::{
    BatchWriter, Fetcher, LEDGER_KINDS, LedgerSet, Paginator, ParquetWriter, Query,
    SharedProgress, cleanup_tmp_files,
};

use crate::client::SearchClient;
use crate::config::HarvestConfig;
use crate::stats::{RunSummary, TopicSummary};

/// Session directory name, e.g. `2024-03-01-at-14-05-09`
pub fn session_dir_name(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y-%m-%d-at-%H-%M-%S").to_string()
}

/// Main entry point for the fetch command
pub fn run(config: &HarvestConfig, progress: SharedProgress) -> anyhow::Result<RunSummary> {
    let client = SearchClient::new(config.api.clone(), config.archive)?;
    let writer = ParquetWriter::new(config.zstd_level);
    let session_dir = config
        .output_dir
        .join(session_dir_name(chrono::Local::now()));
    run_with(config, client, writer, &session_dir, progress)
}

/// Run every topic with the given fetcher and writer into `session_dir`
pub fn run_with<F: Fetcher, W: BatchWriter>(
    config: &HarvestConfig,
    fetcher: F,
    writer: W,
    session_dir: &Path,
    progress: SharedProgress,
) -> anyhow::Result<RunSummary> {
    config.validate()?;
    let started = Instant::now();
    std::fs::create_dir_all(session_dir)
        .with_context(|| format!("Cannot create output directory {}", session_dir.display()))?;

    log::info!(
        "tweetline starting: lang={}, endpoint={}, topics={}, batch_size={}, num_batches={}",
        config.lang,
        if config.archive { "archive" } else { "recent" },
        config.topics.len(),
        config.batch_size,
        config.num_batches
    );

    if config.output_dir.exists() {
        let removed =
            cleanup_tmp_files(&config.output_dir).context("Failed to clean stale tmp files")?;
        if removed > 0 {
            log::info!("Removed {removed} stale tmp files");
        }
    }

    let mut paginator = Paginator::new(fetcher, writer);
    if let Some(dir) = &config.ledger_dir {
        let ledgers = LedgerSet::load(dir, &LEDGER_KINDS)
            .with_context(|| format!("Cannot load ledgers from {}", dir.display()))?;
        for ledger in ledgers.iter() {
            log::info!("{}: {} known ids", ledger.kind(), ledger.len());
        }
        paginator = paginator.with_ledgers(ledgers);
    } else {
        log::warn!("Ledger disabled: records are deduplicated within each batch only");
    }

    let options = config.paginate_options();
    let mut summary = RunSummary {
        session_dir: session_dir.to_path_buf(),
        ..Default::default()
    };

    for topic in &config.topics {
        let query = Query::new(&topic.name, &topic.query, &config.lang);
        paginator.set_progress(progress.page_line(&query.name_scheme()));

        let topic_started = Instant::now();
        let stats = paginator
            .paginate_with_stats(session_dir, &query, &options)
            .with_context(|| format!("Harvest of '{}' failed", topic.query))?;
        let interrupted = stats.interrupted;
        summary.topics.push(TopicSummary {
            name: topic.name.clone(),
            stats,
            elapsed: topic_started.elapsed(),
        });
        if interrupted {
            log::warn!("Shutdown requested, skipping remaining topics");
            break;
        }
    }

    summary.elapsed = started.elapsed();
    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    Ok(summary)
}

/// Default ledger location under an output directory
pub fn default_ledger_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("ids")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topic;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tweetline_core::{FetchError, ProgressContext, RecordKind, init_ledger, ledger_path};

    struct Canned(VecDeque<Value>);

    impl Fetcher for Canned {
        fn fetch(&mut self, _query: &Query, _token: Option<&str>) -> Result<Value, FetchError> {
            self.0.pop_front().ok_or_else(|| FetchError::Transport {
                status: Some(500),
                body: "exhausted".to_string(),
            })
        }
    }

    fn response(ids: &[&str]) -> Value {
        let data: Vec<_> = ids.iter().map(|id| json!({"id": id, "text": "t"})).collect();
        json!({"data": data, "meta": {"result_count": ids.len()}})
    }

    fn config(output: &Path, ledger_dir: Option<PathBuf>) -> HarvestConfig {
        HarvestConfig {
            output_dir: output.to_path_buf(),
            topics: vec![
                Topic::parse("covid=covid").unwrap(),
                Topic::parse("flu=gripe").unwrap(),
            ],
            sleep: std::time::Duration::ZERO,
            ledger_dir,
            ..Default::default()
        }
    }

    fn progress() -> SharedProgress {
        Arc::new(ProgressContext::with_tty(false))
    }

    #[test]
    fn session_dir_format() {
        let t = chrono::Local.with_ymd_and_hms(2022, 2, 22, 9, 5, 7).unwrap();
        assert_eq!(session_dir_name(t), "2022-02-22-at-09-05-07");
    }

    #[test]
    fn topics_share_ledgers() {
        let out = TempDir::new().unwrap();
        let ids = default_ledger_dir(out.path());
        for kind in &LEDGER_KINDS {
            init_ledger(&ledger_path(&ids, kind)).unwrap();
        }
        let session = out.path().join("session");
        let fetcher = Canned(VecDeque::from(vec![response(&["1", "2"]), response(&["2", "3"])]));

        let summary = run_with(
            &config(out.path(), Some(ids.clone())),
            fetcher,
            ParquetWriter::default(),
            &session,
            progress(),
        )
        .unwrap();

        assert_eq!(summary.topics.len(), 2);
        assert_eq!(summary.written(&RecordKind::Tweets), 3);
        assert!(session.join("tweets").join("es-covid-1-2.parquet").exists());
        assert!(session.join("tweets").join("es-flu-1-1.parquet").exists());
        let ledger = std::fs::read_to_string(ledger_path(&ids, &RecordKind::Tweets)).unwrap();
        assert_eq!(ledger, "1,2,3");
    }

    #[test]
    fn missing_ledgers_abort_before_fetching() {
        let out = TempDir::new().unwrap();
        let fetcher = Canned(VecDeque::from(vec![response(&["1"])]));
        let err = run_with(
            &config(out.path(), Some(out.path().join("ids"))),
            fetcher,
            ParquetWriter::default(),
            &out.path().join("session"),
            progress(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("ledger init"));
    }

    #[test]
    fn ledger_disabled_dedups_within_batch_only() {
        let out = TempDir::new().unwrap();
        let fetcher = Canned(VecDeque::from(vec![response(&["1", "1"]), response(&["1"])]));
        let summary = run_with(
            &config(out.path(), None),
            fetcher,
            ParquetWriter::default(),
            &out.path().join("session"),
            progress(),
        )
        .unwrap();
        assert_eq!(summary.written(&RecordKind::Tweets), 2);
    }
}
