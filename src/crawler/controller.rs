use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cli::config::CrawlerSettings;
use crate::crawler::extractor::ListingExtractor;
use crate::crawler::fetcher::PageSource;
use crate::crawler::run_state::RunState;
use crate::crawler::task::{CrawlRequest, FetchOutcome, JobRecord};
use crate::utils::metrics::RunStats;

/// Drives the keyword x page loop: fetch, extract, dedupe, pace
pub struct CrawlerController<S: PageSource> {
    settings: CrawlerSettings,
    source: S,
    extractor: ListingExtractor,
}

impl<S: PageSource> CrawlerController<S> {
    /// Create a controller over a page source and an extractor
    pub fn new(settings: CrawlerSettings, source: S, extractor: ListingExtractor) -> Self {
        Self {
            settings,
            source,
            extractor,
        }
    }

    /// Crawl every page of every keyword, one request at a time.
    ///
    /// Pages that fail are dropped; the run always completes with whatever
    /// was gathered, in first-seen order and without duplicate URLs.
    pub async fn run(&self, keywords: &[String], location: &str, pages_per_keyword: u32) -> Vec<JobRecord> {
        let run_id = Uuid::new_v4();
        let span = info_span!("crawl", %run_id);

        self.run_inner(keywords, location, pages_per_keyword)
            .instrument(span)
            .await
    }

    async fn run_inner(&self, keywords: &[String], location: &str, pages_per_keyword: u32) -> Vec<JobRecord> {
        let mut state = RunState::new();
        let mut stats = RunStats::new();
        let mut results = Vec::new();
        let delay = Duration::from_millis(self.settings.request_delay_ms);

        info!(
            "Crawling {} keyword(s) x {} page(s) in '{}'",
            keywords.len(), pages_per_keyword, location
        );

        for request in CrawlRequest::plan(keywords, pages_per_keyword) {
            let url = match request.search_url(&self.settings.site_origin, &self.settings.search_path, location) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping '{}' at offset {}: cannot build URL: {}", request.keyword, request.page_offset, e);
                    continue;
                }
            };

            info!("Fetching: {}", url);
            let outcome = self.source.fetch(url.as_str()).await;
            stats.record_fetch(&outcome);

            if let FetchOutcome::Success(markup) = outcome {
                let records = self.extractor.extract(&markup);
                let extracted = records.len();
                let before = results.len();

                results.extend(records.into_iter().filter(|record| state.first_seen(&record.url)));

                let kept = results.len() - before;
                stats.record_extraction(extracted, extracted - kept);
                debug!("Kept {} of {} records from {}", kept, extracted, url);
            }

            // Pace every request, failed ones included
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        debug!("{} unique postings seen this run", state.seen_count());
        stats.log_summary(results.len());
        results
    }
}
