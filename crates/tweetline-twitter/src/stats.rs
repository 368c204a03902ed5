//! Run statistics and summary tables.
//!
//! One `TopicSummary` per pagination session, aggregated into a
//! `RunSummary` printed as a table on TTY or logged otherwise.

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use tweetline_core::{RecordKind, SessionStats, fmt_num};

/// Outcome of paginating one topic
#[derive(Debug, Clone)]
pub struct TopicSummary {
    pub name: String,
    pub stats: SessionStats,
    pub elapsed: Duration,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub session_dir: PathBuf,
    pub topics: Vec<TopicSummary>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// A shutdown request cut the run short
    pub fn interrupted(&self) -> bool {
        self.topics.iter().any(|t| t.stats.interrupted)
    }

    pub fn batches_written(&self) -> usize {
        self.topics.iter().map(|t| t.stats.batches_written).sum()
    }

    /// Rows of `kind` written across all topics
    pub fn written(&self, kind: &RecordKind) -> usize {
        self.topics.iter().map(|t| t.stats.kind(kind).written).sum()
    }

    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Topic")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Pages").fg(Color::Cyan),
                Cell::new("Batches").fg(Color::Cyan),
                Cell::new("Tweets").fg(Color::Cyan),
                Cell::new("Users").fg(Color::Cyan),
                Cell::new("Places").fg(Color::Cyan),
                Cell::new("Duplicates").fg(Color::Cyan),
                Cell::new("Note").fg(Color::Cyan),
            ]);

        for topic in &self.topics {
            let s = &topic.stats;
            let duplicates: usize = s
                .kinds
                .values()
                .map(|k| k.batch_duplicates + k.ledger_duplicates)
                .sum();
            let note = if s.interrupted {
                "interrupted"
            } else if s.stuck_token {
                "stuck token"
            } else {
                ""
            };
            table.add_row(vec![
                Cell::new(&topic.name),
                Cell::new(s.pages),
                Cell::new(s.batches_written),
                Cell::new(fmt_num(s.kind(&RecordKind::Tweets).written)).fg(Color::Green),
                Cell::new(fmt_num(s.kind(&RecordKind::Users).written)),
                Cell::new(fmt_num(s.kind(&RecordKind::Places).written)),
                Cell::new(fmt_num(duplicates)),
                Cell::new(note).fg(Color::Yellow),
            ]);
        }

        format!(
            "\n{table}\nSaved to {} in {:.1}s",
            self.session_dir.display(),
            self.elapsed.as_secs_f64()
        )
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        for topic in &self.topics {
            let s = &topic.stats;
            log::info!(
                "{}: {} pages, {} batches, {} tweets, {} users, {} places [{:.1}s]",
                topic.name,
                s.pages,
                s.batches_written,
                fmt_num(s.kind(&RecordKind::Tweets).written),
                fmt_num(s.kind(&RecordKind::Users).written),
                fmt_num(s.kind(&RecordKind::Places).written),
                topic.elapsed.as_secs_f64()
            );
        }
        log::info!(
            "Run complete: {} batches, {} tweets in {:.1}s -> {}",
            self.batches_written(),
            fmt_num(self.written(&RecordKind::Tweets)),
            self.elapsed.as_secs_f64(),
            self.session_dir.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tweetline_core::KindStats;

    fn topic(name: &str, tweets: usize, interrupted: bool) -> TopicSummary {
        let mut stats = SessionStats {
            pages: 2,
            batches_written: 1,
            interrupted,
            ..Default::default()
        };
        stats.kinds.insert(
            RecordKind::Tweets,
            KindStats {
                written: tweets,
                ledger_duplicates: 3,
                ..Default::default()
            },
        );
        TopicSummary {
            name: name.to_string(),
            stats,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn totals_across_topics() {
        let summary = RunSummary {
            topics: vec![topic("covid", 1200, false), topic("flu", 30, false)],
            ..Default::default()
        };
        assert_eq!(summary.written(&RecordKind::Tweets), 1230);
        assert_eq!(summary.written(&RecordKind::Users), 0);
        assert_eq!(summary.batches_written(), 2);
        assert!(!summary.interrupted());
    }

    #[test]
    fn table_lists_topics() {
        let summary = RunSummary {
            topics: vec![topic("covid", 1200, true)],
            ..Default::default()
        };
        assert!(summary.interrupted());
        let table = summary.format_table();
        assert!(table.contains("covid"));
        assert!(table.contains("1,200"));
        assert!(table.contains("interrupted"));
    }
}
