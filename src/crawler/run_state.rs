use std::collections::HashSet;
use tracing::debug;

/// Per-run memory of posting URLs already accepted.
///
/// Created empty for each run and dropped with it; nothing is persisted.
#[derive(Debug, Default)]
pub struct RunState {
    /// Set of already seen URLs to avoid duplicates
    seen_urls: HashSet<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a URL, returning `true` the first time it is seen in this run
    pub fn first_seen(&mut self, url: &str) -> bool {
        if self.seen_urls.contains(url) {
            debug!("Skipping duplicate posting: {}", url);
            return false;
        }

        self.seen_urls.insert(url.to_string());
        true
    }

    /// Get the current count of seen URLs
    pub fn seen_count(&self) -> usize {
        self.seen_urls.len()
    }
}
