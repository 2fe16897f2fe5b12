use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use std::path::{Path, PathBuf};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::sync::Mutex;

/// Initialize logging to stderr and to an appended log file
pub fn init_logging(verbose: bool, log_file: &Path) -> Result<()> {
    let env_filter = if verbose {
        EnvFilter::from_default_env()
            .add_directive("job_scout=debug".parse()?)
            .add_directive("warn".parse()?)
    } else {
        EnvFilter::from_default_env()
            .add_directive("job_scout=info".parse()?)
            .add_directive("warn".parse()?)
    };

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);

    let (file, fallback) = open_log_file(log_file, &fallback_log_file())?;
    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();

    if let Some(e) = fallback {
        warn!("Cannot open log file {} ({}); logging to {}", log_file.display(), e, fallback_log_file().display());
    }

    Ok(())
}

/// Open `primary` for appending, or `fallback` if that fails.
/// Returns the error that forced the fallback, if any.
fn open_log_file(primary: &Path, fallback: &Path) -> Result<(File, Option<io::Error>)> {
    match append_to(primary) {
        Ok(file) => Ok((file, None)),
        Err(e) => {
            let file = append_to(fallback)
                .with_context(|| format!("Cannot open log file {} or {}", primary.display(), fallback.display()))?;
            Ok((file, Some(e)))
        }
    }
}

// Keep history across runs
fn append_to(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

fn fallback_log_file() -> PathBuf {
    PathBuf::from("./logs").join("scraper.log")
}

/// Create a default log file path
pub fn default_log_file() -> PathBuf {
    match directories::ProjectDirs::from("com", "job-scout", "job-scout") {
        Some(proj_dirs) => proj_dirs.data_dir().join("scraper.log"),
        None => fallback_log_file(),
    }
}
