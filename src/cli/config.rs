use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};
use std::collections::HashMap;

use crate::crawler::task::MAX_PAGES_PER_KEYWORD;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScraperConfig {
    pub crawler: CrawlerSettings,
    pub session: SessionSettings,
    pub extractor: ExtractorSettings,
    pub sink: SinkSettings,
}

/// Crawl loop settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Scheme and host of the target site, also used to absolutize relative links
    pub site_origin: String,
    pub search_path: String,
    pub keywords: Vec<String>,
    pub location: String,
    pub pages_per_keyword: u32,
    pub request_delay_ms: u64,  // Delay after every request in milliseconds
}

/// HTTP identity and retry settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionSettings {
    /// Pool of identities a session picks from
    pub identities: Vec<IdentityProfile>,

    /// Pin a single identity by name instead of picking at random
    pub identity: Option<String>,

    pub user_agent: Option<String>,
    pub accept_language: Option<String>,

    /// Extra headers as a JSON object string, e.g. `{"Referer": "https://www.indeed.com/"}`
    pub extra_headers: Option<String>,

    /// Raw `Cookie` header value
    pub cookie: Option<String>,

    pub proxy: Option<String>,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

/// Browser identity a session can present
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdentityProfile {
    pub name: String,
    pub user_agent: String,
    pub accept_language: String,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

/// Retry and backoff settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per request, including the first one
    pub total_attempts: u32,
    pub backoff_factor: f64,
    pub max_backoff_secs: f64,
    pub status_forcelist: Vec<u16>,
}

/// Fallback selector chains, tried in order
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractorSettings {
    pub card: Vec<String>,
    pub title_link: Vec<String>,
    pub company: Vec<String>,
    pub location: Vec<String>,
    pub posted_date: Vec<String>,
}

/// Worksheet storage settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SinkSettings {
    pub root_dir: PathBuf,
    pub spreadsheet: String,
    pub worksheet: String,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            site_origin: "https://www.indeed.com".to_string(),
            search_path: "/jobs".to_string(),
            keywords: vec![
                "python developer".to_string(),
                "data engineer".to_string(),
                "backend engineer".to_string(),
            ],
            location: "United States".to_string(),
            pages_per_keyword: 1,
            request_delay_ms: 1000,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            identities: vec![
                IdentityProfile {
                    name: "windows_chrome".to_string(),
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36".to_string(),
                    accept_language: "en-US,en;q=0.9".to_string(),
                    extra_headers: HashMap::new(),
                },
                IdentityProfile {
                    name: "mac_chrome".to_string(),
                    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                    accept_language: "en-US,en;q=0.9".to_string(),
                    extra_headers: HashMap::new(),
                },
                IdentityProfile {
                    name: "windows_firefox".to_string(),
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".to_string(),
                    accept_language: "en-US,en;q=0.5".to_string(),
                    extra_headers: HashMap::new(),
                },
            ],
            identity: None,
            user_agent: None,
            accept_language: None,
            extra_headers: None,
            cookie: None,
            proxy: None,
            timeout_secs: 20,
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            total_attempts: 5,
            backoff_factor: 2.0,
            max_backoff_secs: 120.0,
            status_forcelist: vec![403, 429, 500, 502, 503, 504],
        }
    }
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        fn chain(selectors: &[&str]) -> Vec<String> {
            selectors.iter().map(|s| s.to_string()).collect()
        }

        Self {
            card: chain(&["div.job_seen_beacon", "div.cardOutline", "li div.result"]),
            title_link: chain(&["h2 a", "a.jcs-JobTitle", "a[data-jk]"]),
            company: chain(&["span.companyName", "[data-testid='company-name']"]),
            location: chain(&["div.companyLocation", "[data-testid='text-location']"]),
            posted_date: chain(&[
                "span.date",
                "span[data-testid='myJobsStateDate']",
                "span[aria-label*='date']",
            ]),
        }
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("sheets"),
            spreadsheet: "Job Scraper Prototype".to_string(),
            worksheet: "Indeed Jobs".to_string(),
        }
    }
}

impl ScraperConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "job-scout", "job-scout") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        // Create the sites directory if it doesn't exist
        path.push("sites");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path.pop();
        path
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_as_default()?;
            Ok(config)
        }
    }

    /// Load a configuration profile
    pub fn load_profile(profile: &str) -> Result<Self> {
        let config_dir = Self::config_dir();
        let profile_path = config_dir.join("sites").join(format!("{}.yaml", profile));

        if profile_path.exists() {
            Self::load_from_file(&profile_path)
        } else {
            anyhow::bail!("Profile '{}' not found", profile)
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))
    }

    /// Parse a configuration document; missing sections fall back to defaults
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("default.yaml");

        self.save_to_file(&config_path)
    }

    /// Save the configuration as a profile
    pub fn save_as_profile(&self, profile: &str) -> Result<()> {
        let sites_dir = Self::config_dir().join("sites");

        if !sites_dir.exists() {
            fs::create_dir_all(&sites_dir)
                .context(format!("Failed to create sites directory: {}", sites_dir.display()))?;
        }

        let profile_path = sites_dir.join(format!("{}.yaml", profile));
        self.save_to_file(&profile_path)
    }

    /// Save the configuration to a file
    fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// List all available profiles
    pub fn list_profiles() -> Result<Vec<String>> {
        let sites_dir = Self::config_dir().join("sites");

        if !sites_dir.exists() {
            return Ok(vec![]);
        }

        let mut profiles = Vec::new();

        for entry in fs::read_dir(sites_dir)? {
            let path = entry?.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    profiles.push(name.to_string());
                }
            }
        }

        profiles.sort();
        Ok(profiles)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply recognized overrides from any key/value source.
    ///
    /// Empty values are treated as unset. Numeric values that fail to parse
    /// are configuration errors.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("USER_AGENT") {
            self.session.user_agent = Some(value);
        }
        if let Some(value) = get("ACCEPT_LANGUAGE") {
            self.session.accept_language = Some(value);
        }
        if let Some(value) = get("EXTRA_HEADERS_JSON") {
            self.session.extra_headers = Some(value);
        }
        if let Some(value) = get("SCRAPER_COOKIE") {
            self.session.cookie = Some(value);
        }
        if let Some(value) = get("SCRAPER_PROXY") {
            self.session.proxy = Some(value);
        }
        if let Some(value) = get("RETRY_TOTAL") {
            self.session.retry.total_attempts = value.trim().parse()
                .context(format!("RETRY_TOTAL must be a positive integer, got '{}'", value))?;
        }
        if let Some(value) = get("RETRY_BACKOFF_FACTOR") {
            self.session.retry.backoff_factor = value.trim().parse()
                .context(format!("RETRY_BACKOFF_FACTOR must be a number, got '{}'", value))?;
        }
        if let Some(value) = get("REQUEST_DELAY_MS") {
            self.crawler.request_delay_ms = value.trim().parse()
                .context(format!("REQUEST_DELAY_MS must be an integer, got '{}'", value))?;
        }
        if let Some(value) = get("JOB_LOCATION") {
            self.crawler.location = value;
        }
        if let Some(value) = get("PAGES_PER_KEYWORD") {
            self.crawler.pages_per_keyword = value.trim().parse()
                .context(format!("PAGES_PER_KEYWORD must be an integer, got '{}'", value))?;
        }
        if let Some(value) = get("SHEET_DIR") {
            self.sink.root_dir = PathBuf::from(value);
        }
        if let Some(value) = get("SHEET_NAME") {
            self.sink.spreadsheet = value;
        }
        if let Some(value) = get("SHEET_TAB") {
            self.sink.worksheet = value;
        }

        Ok(())
    }

    /// Check that the configuration can drive a run
    pub fn validate(&self) -> Result<()> {
        let retry = &self.session.retry;
        if retry.total_attempts == 0 {
            anyhow::bail!("session.retry.total_attempts must be at least 1");
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 0.0 {
            anyhow::bail!("session.retry.backoff_factor must be a non-negative number");
        }
        if !retry.max_backoff_secs.is_finite() || retry.max_backoff_secs < 0.0 {
            anyhow::bail!("session.retry.max_backoff_secs must be a non-negative number");
        }
        if self.session.identities.is_empty() && self.session.user_agent.is_none() {
            anyhow::bail!("session needs at least one identity or an explicit user_agent");
        }

        let origin = url::Url::parse(&self.crawler.site_origin)
            .context(format!("crawler.site_origin is not a valid URL: '{}'", self.crawler.site_origin))?;
        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("crawler.site_origin must be an http(s) URL, got '{}'", self.crawler.site_origin);
        }
        if self.crawler.pages_per_keyword > MAX_PAGES_PER_KEYWORD {
            anyhow::bail!(
                "crawler.pages_per_keyword must be at most {}, got {}",
                MAX_PAGES_PER_KEYWORD, self.crawler.pages_per_keyword
            );
        }
        if self.crawler.keywords.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!("crawler.keywords must contain at least one keyword");
        }

        if self.extractor.card.is_empty() {
            anyhow::bail!("extractor.card must list at least one selector");
        }
        if self.extractor.title_link.is_empty() {
            anyhow::bail!("extractor.title_link must list at least one selector");
        }
        if self.sink.spreadsheet.trim().is_empty() || self.sink.worksheet.trim().is_empty() {
            anyhow::bail!("sink.spreadsheet and sink.worksheet must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ScraperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.retry.total_attempts, 5);
        assert_eq!(config.session.retry.backoff_factor, 2.0);
        assert_eq!(config.session.timeout_secs, 20);
        assert_eq!(config.crawler.request_delay_ms, 1000);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "crawler:\n  keywords: [\"rust engineer\"]\n  pages_per_keyword: 3\n";
        let config = ScraperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.crawler.keywords, vec!["rust engineer".to_string()]);
        assert_eq!(config.crawler.pages_per_keyword, 3);
        assert_eq!(config.crawler.site_origin, "https://www.indeed.com");
        assert_eq!(config.session.retry.status_forcelist, vec![403, 429, 500, 502, 503, 504]);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ScraperConfig::default();
        config.apply_overrides(lookup(&[
            ("USER_AGENT", "TestAgent/1.0"),
            ("EXTRA_HEADERS_JSON", "{\"Referer\": \"https://example.com\"}"),
            ("RETRY_TOTAL", "2"),
            ("RETRY_BACKOFF_FACTOR", "0.5"),
            ("JOB_LOCATION", "Remote"),
            ("PAGES_PER_KEYWORD", "4"),
            ("SHEET_TAB", ""),
        ])).unwrap();

        assert_eq!(config.session.user_agent.as_deref(), Some("TestAgent/1.0"));
        assert!(config.session.extra_headers.is_some());
        assert_eq!(config.session.retry.total_attempts, 2);
        assert_eq!(config.session.retry.backoff_factor, 0.5);
        assert_eq!(config.crawler.location, "Remote");
        assert_eq!(config.crawler.pages_per_keyword, 4);
        // Empty values leave the default alone
        assert_eq!(config.sink.worksheet, "Indeed Jobs");
    }

    #[test]
    fn test_bad_numeric_override_is_an_error() {
        let mut config = ScraperConfig::default();
        let result = config.apply_overrides(lookup(&[("RETRY_TOTAL", "many")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = ScraperConfig::default();
        config.session.retry.total_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.session.retry.backoff_factor = -1.0;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.crawler.site_origin = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.crawler.keywords = vec!["  ".to_string()];
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.extractor.title_link.clear();
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.crawler.pages_per_keyword = 500_000_000;
        assert!(config.validate().is_err());
        config.crawler.pages_per_keyword = MAX_PAGES_PER_KEYWORD;
        assert!(config.validate().is_ok());
    }
}
