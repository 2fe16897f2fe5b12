pub mod controller;
pub mod extractor;
pub mod fetcher;
pub mod run_state;
pub mod task;

// Re-export common types
pub use controller::CrawlerController;
pub use extractor::ListingExtractor;
pub use fetcher::PageFetcher;
