//! Log output for interactive and scheduled runs
//!
//! On a terminal, lines are colored and printed around the progress bars.
//! Off a terminal (cron, CI), lines are plain and stamped in UTC so the log
//! files of successive scheduled runs can be told apart.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use indicatif::MultiProgress;
use log::{Level, Log};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStyle {
    Terminal,
    Plain,
}

impl LineStyle {
    fn render(self, level: Level, message: impl fmt::Display) -> String {
        match self {
            Self::Terminal => format!("[{}{level:<5}\x1b[0m] {message}", ansi_color(level)),
            Self::Plain => format!(
                "{} [{level:<5}] {message}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        }
    }
}

fn ansi_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[32m",
        Level::Debug => "\x1b[36m",
        Level::Trace => "\x1b[35m",
    }
}

/// Prints through the progress display so harvest bars and spinners
/// are redrawn below each line instead of torn.
pub struct ProgressLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
}

impl ProgressLogger {
    pub fn new(filter: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { filter, multi }
    }
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.filter.matches(record) {
            let line = LineStyle::Terminal.render(record.level(), record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.filter.flush();
    }
}

fn default_filter(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize logging; `multi` is set on a TTY to route lines around progress bars.
///
/// `RUST_LOG` takes precedence over the level picked from `quiet`/`debug`.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(quiet, debug)),
    );

    match multi {
        Some(multi) => {
            let filter = builder.build();
            let max_level = filter.filter();
            if log::set_boxed_logger(Box::new(ProgressLogger::new(filter, multi.clone()))).is_ok() {
                log::set_max_level(max_level);
            }
        }
        None => {
            let _ = builder
                .format(|buf, record| {
                    writeln!(buf, "{}", LineStyle::Plain.render(record.level(), record.args()))
                })
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_wins_over_quiet() {
        assert_eq!(default_filter(true, true), "debug");
        assert_eq!(default_filter(true, false), "warn");
        assert_eq!(default_filter(false, false), "info");
    }

    #[test]
    fn plain_lines_are_stamped_and_uncolored() {
        let line = LineStyle::Plain.render(Level::Warn, "gcs: quota exceeded");
        assert!(line.ends_with("Z [WARN ] gcs: quota exceeded"), "{line}");
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn terminal_lines_are_colored_by_level() {
        let line = LineStyle::Terminal.render(Level::Error, "failed at index 3");
        assert_eq!(line, "[\x1b[31mERROR\x1b[0m] failed at index 3");
    }
}
