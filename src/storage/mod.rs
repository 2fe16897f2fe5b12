pub mod worksheet;

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

// Re-export common types
pub use worksheet::CsvWorksheet;

/// Failures at the storage boundary
#[derive(Debug, Error)]
pub enum SinkError {
    /// The store cannot be opened or created; fatal before any fetching
    #[error("cannot provision worksheet at {path}: {source}")]
    Provisioning {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("header row has no '{0}' column")]
    MissingColumn(String),

    #[error("worksheet I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worksheet CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("worksheet task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Persistent destination for scraped rows
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Make the first row exactly `headers`: create it if absent, overwrite it if different
    async fn ensure_headers(&self, headers: &[&str]) -> Result<(), SinkError>;

    /// Every URL already stored. Read failures are logged and give an empty set.
    async fn existing_urls(&self) -> HashSet<String>;

    /// Append the rows whose URL is not in `existing`; returns how many were written.
    /// Nothing is written when every row is filtered out.
    async fn append_rows(
        &self,
        headers: &[&str],
        rows: Vec<Vec<String>>,
        existing: &HashSet<String>,
    ) -> Result<usize, SinkError>;
}
