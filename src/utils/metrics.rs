use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::crawler::task::FetchOutcome;

/// Counters for one crawl run
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Start time of the run
    pub started_at: DateTime<Utc>,

    pub pages_requested: usize,
    pub pages_succeeded: usize,
    pub pages_blocked: usize,
    pub pages_failed: usize,

    /// Records the extractor produced, duplicates included
    pub records_extracted: usize,

    /// Records discarded because their URL was already seen this run
    pub duplicates_dropped: usize,

    clock: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            pages_requested: 0,
            pages_succeeded: 0,
            pages_blocked: 0,
            pages_failed: 0,
            records_extracted: 0,
            duplicates_dropped: 0,
            clock: Instant::now(),
        }
    }

    /// Count one fetch by its outcome
    pub fn record_fetch(&mut self, outcome: &FetchOutcome) {
        self.pages_requested += 1;

        match outcome {
            FetchOutcome::Success(_) => self.pages_succeeded += 1,
            FetchOutcome::Blocked(_) => self.pages_blocked += 1,
            FetchOutcome::TransientError | FetchOutcome::FatalError => self.pages_failed += 1,
        }
    }

    pub fn record_extraction(&mut self, extracted: usize, duplicates: usize) {
        self.records_extracted += extracted;
        self.duplicates_dropped += duplicates;
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Log a one-line summary
    pub fn log_summary(&self, kept: usize) {
        info!(
            started_at = %self.started_at.to_rfc3339(),
            pages = self.pages_requested,
            succeeded = self.pages_succeeded,
            blocked = self.pages_blocked,
            failed = self.pages_failed,
            extracted = self.records_extracted,
            duplicates = self.duplicates_dropped,
            kept,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Crawl finished"
        );
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}
