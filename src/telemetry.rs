//! Logging setup
//!
//! Every event goes to stdout and to an append-only JSON-lines file. The file
//! side is owned by a [`LogSink`] that `main` opens before serving and shuts
//! down after the server stops.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, fmt::MakeWriter, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Shared handle to the log file.
#[derive(Debug, Clone)]
pub struct LogSink {
    file: Arc<Mutex<File>>,
    path: PathBuf,
}

impl LogSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and sync everything written so far.
    pub fn shutdown(&self) -> io::Result<()> {
        let mut file = self.lock();
        file.flush()?;
        file.sync_all()
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer handed to the fmt layer for one event.
pub struct SinkWriter<'a>(MutexGuard<'a, File>);

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter(self.lock())
    }
}

fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("ncdev=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    }
}

/// Install the global subscriber and return the file sink.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<LogSink> {
    let sink = LogSink::open(&config.file)
        .with_context(|| format!("failed to open log file {}", config.file.display()))?;

    tracing_subscriber::registry()
        .with(env_filter(config, verbose))
        .with(fmt::layer().json().with_target(false))
        .with(
            fmt::layer()
                .json()
                .with_target(false)
                .with_ansi(false)
                .with_writer(sink.clone()),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn events_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "{\"existing\":true}\n").unwrap();

        let sink = LogSink::open(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(sink.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            info!(method = "GET", url = "/api/health", "GET /api/health");
        });
        sink.shutdown().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2, "existing content must be kept");

        let event: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(event["level"], "INFO");
        assert_eq!(event["fields"]["message"], "GET /api/health");
        assert_eq!(event["fields"]["method"], "GET");
        assert!(event["timestamp"].is_string());
    }

    #[test]
    fn open_fails_for_missing_directory() {
        assert!(LogSink::open(Path::new("/nonexistent/dir/ncdev.log")).is_err());
    }
}
