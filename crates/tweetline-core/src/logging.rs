//! Logging with indicatif integration

use indicatif::MultiProgress;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Default filter when `RUST_LOG` is unset.
///
/// On a TTY the spinner shows activity, so only warnings are logged.
pub fn default_level(debug: bool, tty: bool) -> &'static str {
    if debug {
        "debug"
    } else if tty {
        "warn"
    } else {
        "info"
    }
}

/// Logger that prints through `MultiProgress::suspend` so lines never tear
/// a spinner.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let (pre, label, post) = level_style(record.level(), true);
            let line = format!("[{pre}{label}{post}] {}", record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger.
///
/// With `multi` (TTY), logs go through [`IndicatifLogger`]; otherwise plain
/// uncolored lines suitable for log collection.
pub fn init_logging(debug: bool, multi: Option<&MultiProgress>) -> Result<(), log::SetLoggerError> {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(default_level(debug, multi.is_some()));

    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))?;
            log::set_max_level(max_level);
        }
        None => {
            env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    let (_, label, _) = level_style(record.level(), false);
                    writeln!(buf, "[{label}] {}", record.args())
                })
                .try_init()?;
        }
    }
    Ok(())
}
