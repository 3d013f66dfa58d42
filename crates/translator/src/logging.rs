//! Log sinks: stdout, plus two files under the log directory.
//!
//! * `bad_pulse_message.log` receives rejected messages (target `bad_message`).
//! * `error.log` receives every ERROR event.

use anyhow::{Context, Result};
use normalizer::BAD_MESSAGE_TARGET;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const BAD_MESSAGE_LOG: &str = "bad_pulse_message.log";
pub const ERROR_LOG: &str = "error.log";

/// Install the global subscriber.
pub fn init(logdir: &Path) -> Result<()> {
    let (bad_messages, errors) = open_log_files(logdir)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(env_filter))
        .with(
            fmt::layer()
                .with_writer(Arc::new(bad_messages))
                .with_ansi(false)
                .with_target(false)
                .with_filter(bad_message_filter()),
        )
        .with(
            fmt::layer()
                .with_writer(Arc::new(errors))
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

fn bad_message_filter() -> Targets {
    Targets::new().with_target(BAD_MESSAGE_TARGET, Level::TRACE)
}

/// Create the log directory if needed and open both log files for appending.
fn open_log_files(logdir: &Path) -> Result<(File, File)> {
    std::fs::create_dir_all(logdir)
        .with_context(|| format!("failed to create log directory {}", logdir.display()))?;

    Ok((
        open_append(&logdir.join(BAD_MESSAGE_LOG))?,
        open_append(&logdir.join(ERROR_LOG))?,
    ))
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_message_filter() {
        let filter = bad_message_filter();
        assert!(filter.would_enable(BAD_MESSAGE_TARGET, &Level::WARN));
        assert!(!filter.would_enable("normalizer::service", &Level::ERROR));
    }

    #[test]
    fn test_log_files_created() {
        let logdir = std::env::temp_dir()
            .join(format!("pulse-translator-logs-{}", std::process::id()))
            .join("nested");

        open_log_files(&logdir).unwrap();
        assert!(logdir.join(BAD_MESSAGE_LOG).exists());
        assert!(logdir.join(ERROR_LOG).exists());

        // Reopening appends instead of failing or truncating.
        std::fs::write(logdir.join(ERROR_LOG), "earlier\n").unwrap();
        open_log_files(&logdir).unwrap();
        assert_eq!(
            std::fs::read_to_string(logdir.join(ERROR_LOG)).unwrap(),
            "earlier\n"
        );

        let _ = std::fs::remove_dir_all(logdir.parent().unwrap());
    }
}
