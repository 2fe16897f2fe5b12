use anyhow::{Result, Context};
use tracing::{debug, info, warn};

use crate::cli::config::ScraperConfig;
use crate::cli::ScrapeArgs;
use crate::crawler::{CrawlerController, ListingExtractor, PageFetcher};
use crate::crawler::task::{records_to_rows, JOB_HEADERS};
use crate::session::Session;
use crate::storage::{CsvWorksheet, ResultSink};

/// Load configuration, crawl, and append new postings to the worksheet
pub async fn scrape(args: ScrapeArgs) -> Result<usize> {
    let mut config = match &args.profile {
        Some(profile) => ScraperConfig::load_profile(profile)
            .context(format!("Failed to load profile: {}", profile))?,
        None => ScraperConfig::load_default()?,
    };

    config.apply_env().context("Invalid environment override")?;
    apply_args(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    run_pipeline(&config, args.dry_run).await
}

/// Command line values win over the profile and the environment
fn apply_args(config: &mut ScraperConfig, args: &ScrapeArgs) {
    let keywords: Vec<String> = args.keywords.iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if !keywords.is_empty() {
        config.crawler.keywords = keywords;
    }

    if let Some(location) = &args.location {
        config.crawler.location = location.clone();
    }
    if let Some(pages) = args.pages {
        config.crawler.pages_per_keyword = pages;
    }
    if let Some(delay) = args.delay_ms {
        config.crawler.request_delay_ms = delay;
    }
}

/// Run one crawl end to end.
///
/// The worksheet and the HTTP session are prepared before the first request;
/// failing to prepare either aborts the run.
pub async fn run_pipeline(config: &ScraperConfig, dry_run: bool) -> Result<usize> {
    let sink = if dry_run {
        None
    } else {
        let sink = CsvWorksheet::open(&config.sink.root_dir, &config.sink.spreadsheet, &config.sink.worksheet)
            .context("Failed to open the result worksheet")?;
        sink.ensure_headers(&JOB_HEADERS).await
            .context("Failed to write the worksheet header row")?;
        Some(sink)
    };

    let session = Session::new(&config.session, &config.crawler.site_origin)
        .context("Failed to prepare the HTTP session")?;
    debug!("Presenting identity '{}'", session.identity());
    let extractor = ListingExtractor::new(&config.extractor, &config.crawler.site_origin)?;
    let controller = CrawlerController::new(config.crawler.clone(), PageFetcher::new(session), extractor);

    let keywords: Vec<String> = config.crawler.keywords.iter()
        .filter(|k| !k.trim().is_empty())
        .cloned()
        .collect();

    let records = controller
        .run(&keywords, &config.crawler.location, config.crawler.pages_per_keyword)
        .await;
    let rows = records_to_rows(records);
    info!("Scraped {} rows.", rows.len());

    let Some(sink) = sink else {
        warn!("Dry run: {} rows not written", rows.len());
        return Ok(0);
    };

    debug!("Appending to {}", sink.path().display());
    let appended = publish(&sink, rows).await?;
    info!("Done. New rows appended: {}", appended);

    Ok(appended)
}

/// Dedupe against what the store already holds, then append
pub async fn publish(sink: &dyn ResultSink, rows: Vec<Vec<String>>) -> Result<usize> {
    let existing = sink.existing_urls().await;

    sink.append_rows(&JOB_HEADERS, rows, &existing).await
        .context("Failed to append rows to the worksheet")
}

/// List all available configuration profiles
pub fn list_profiles() -> Result<()> {
    let profiles = ScraperConfig::list_profiles()?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Manage a specific configuration profile
pub fn manage_profile(profile_name: String) -> Result<()> {
    match ScraperConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("Profile: {}", profile_name);
            println!("{:#?}", config);
        },
        Err(_) => {
            // Profile doesn't exist, create a new one
            warn!("Profile '{}' does not exist. Creating a default profile.", profile_name);
            let config = ScraperConfig::default();
            config.save_as_profile(&profile_name)?;
            println!("Created default profile: {}", profile_name);
        }
    }

    Ok(())
}

/// Show the current configuration
pub fn show_config() -> Result<()> {
    let config = ScraperConfig::load_default()?;
    println!("Current configuration:");
    println!("{:#?}", config);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::RetrySettings;
    use std::fs;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <div class="job_seen_beacon"><h2><a href="/viewjob?jk=1">Data Engineer</a></h2><span class="companyName">Acme</span><div class="companyLocation">Remote</div></div>
        <div class="job_seen_beacon"><h2><a href="/viewjob?jk=2">Backend Engineer</a></h2></div>
    </body></html>"#;

    fn config(server: &MockServer, root: &std::path::Path) -> ScraperConfig {
        let mut config = ScraperConfig::default();
        config.crawler.site_origin = server.uri();
        config.crawler.keywords = vec!["data engineer".to_string()];
        config.crawler.location = "Remote".to_string();
        config.crawler.request_delay_ms = 0;
        config.session.retry = RetrySettings {
            total_attempts: 1,
            ..RetrySettings::default()
        };
        config.sink.root_dir = root.to_path_buf();
        config
    }

    #[test]
    fn test_args_override_config() {
        let mut config = ScraperConfig::default();
        let args = ScrapeArgs {
            keywords: vec!["  ".to_string(), "rust developer".to_string()],
            location: Some("Remote".to_string()),
            pages: Some(2),
            delay_ms: Some(250),
            ..ScrapeArgs::default()
        };

        apply_args(&mut config, &args);

        assert_eq!(config.crawler.keywords, vec!["rust developer".to_string()]);
        assert_eq!(config.crawler.location, "Remote");
        assert_eq!(config.crawler.pages_per_keyword, 2);
        assert_eq!(config.crawler.request_delay_ms, 250);
    }

    #[tokio::test]
    async fn test_pipeline_appends_only_new_postings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .and(query_param("q", "data engineer"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(&server, dir.path());

        assert_eq!(run_pipeline(&config, false).await.unwrap(), 2);
        // Same content on the next run: everything is already stored
        assert_eq!(run_pipeline(&config, false).await.unwrap(), 0);

        let sheet = dir.path().join("Job Scraper Prototype").join("Indeed Jobs.csv");
        let contents = fs::read_to_string(sheet).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.starts_with("Job Title,Company,Location,Posting Date,Job URL\n"));
        assert!(contents.contains(&format!("Data Engineer,Acme,Remote,,{}/viewjob?jk=1", server.uri())));
    }

    #[tokio::test]
    async fn test_blocked_run_completes_without_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(&server, dir.path());

        assert_eq!(run_pipeline(&config, false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config(&server, dir.path());

        assert_eq!(run_pipeline(&config, true).await.unwrap(), 0);
        assert!(!dir.path().join("Job Scraper Prototype").exists());
    }

    #[tokio::test]
    async fn test_unprovisionable_store_aborts_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let config = config(&server, &blocker);

        assert!(run_pipeline(&config, false).await.is_err());
    }
}
