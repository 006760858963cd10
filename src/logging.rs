use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Everything from this crate at debug, dependencies at info.
const FILE_DIRECTIVES: &str = "exam_scraper=debug,info";
const KEEP_LOG_FILES: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Scrape,
    Quiz,
    Convert,
}

impl LogTarget {
    pub fn file_prefix(self) -> &'static str {
        match self {
            LogTarget::Scrape => "scraper",
            LogTarget::Quiz => "quiz_session",
            LogTarget::Convert => "converter",
        }
    }

    /// Default console level, or `None` when the subcommand logs to file only.
    /// The quiz owns the terminal, so its log lines never go there.
    pub fn console_level(self) -> Option<&'static str> {
        match self {
            LogTarget::Quiz => None,
            LogTarget::Scrape | LogTarget::Convert => Some("info"),
        }
    }
}

/// Daily-rotated `<prefix>.<date>.log` in `dir`, keeping the last week.
pub fn file_appender(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(KEEP_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Install the global subscriber: a debug-level file log under `dir` plus,
/// where the target allows it, the usual stderr output honouring `RUST_LOG`.
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub fn init(target: LogTarget, dir: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(dir, target.file_prefix())?);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES));

    let console_layer = target.console_level().map(|level| {
        fmt::layer().with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn quiz_logs_to_file_only() {
        assert_eq!(LogTarget::Quiz.console_level(), None);
        assert_eq!(LogTarget::Quiz.file_prefix(), "quiz_session");
        assert_eq!(LogTarget::Scrape.console_level(), Some("info"));
        assert_eq!(LogTarget::Scrape.file_prefix(), "scraper");
    }

    #[test]
    fn appender_writes_into_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let mut appender = file_appender(&logs, "quiz_session").unwrap();
        appender
            .write_all(b"Question ID: Question 1 | Result: CORRECT\n")
            .unwrap();
        appender.flush().unwrap();

        let files: Vec<String> = fs::read_dir(&logs)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("quiz_session."));
        assert!(files[0].ends_with(".log"));
        let body = fs::read_to_string(logs.join(&files[0])).unwrap();
        assert!(body.contains("Result: CORRECT"));
    }
}
