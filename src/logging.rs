//! Logging setup
//!
//! Two `tracing-subscriber` fmt layers share one registry:
//! - console: stderr, filtered by `RUST_LOG` or the `-v` count
//! - run log: `{log_dir}/run.log.{epoch}`, plain text with timestamps
//!
//! The run log file is only known once the profile has been resolved and
//! validated, so the run-log layer writes into a [`RunLog`] handle that
//! discards output until [`RunLog::attach`] is called.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Target for fatal run errors. Hidden from the console layer because
/// `main` prints those itself as a single `ERROR:` line.
pub const FATAL_TARGET: &str = "snapback::fatal";

/// `{log_dir}/run.log.{epoch}`
pub fn run_log_path(log_dir: &Path, epoch: i64) -> PathBuf {
    log_dir.join(format!("run.log.{}", epoch))
}

/// Shared, late-bound run log file
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    file: Arc<Mutex<Option<File>>>,
}

impl RunLog {
    /// Start appending to `path`, creating it if needed.
    pub fn attach(&self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut slot = self.file.lock().map_err(|_| poisoned())?;
        *slot = Some(file);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.file.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

fn poisoned() -> io::Error {
    io::Error::other("run log lock poisoned")
}

impl Write for RunLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self.file.lock().map_err(|_| poisoned())?;
        match slot.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self.file.lock().map_err(|_| poisoned())?;
        match slot.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Console level for a `-v` count
pub fn console_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. Call once, first thing in `main`.
pub fn init_logging(verbosity: u8, run_log: RunLog) -> anyhow::Result<()> {
    build_subscriber(verbosity, io::stderr, run_log)?.try_init()?;
    Ok(())
}

/// Console layer on `console`, run-log layer on `run_log`.
pub fn build_subscriber<W>(
    verbosity: u8,
    console: W,
    run_log: RunLog,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level(verbosity)))
        .add_directive(format!("{}=off", FATAL_TARGET).parse()?);

    let run_log_level = if verbosity >= 2 { LevelFilter::DEBUG } else { LevelFilter::INFO };

    Ok(tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(console)
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(move || run_log.clone())
                .with_filter(run_log_level),
        ))
}
