use serde::{Serialize, Deserialize};
use url::Url;

/// Offset step between consecutive result pages
pub const PAGE_STRIDE: u32 = 10;

/// Upper bound on result pages per keyword
pub const MAX_PAGES_PER_KEYWORD: u32 = 100;

/// Canonical worksheet column order
pub const JOB_HEADERS: [&str; 5] = ["Job Title", "Company", "Location", "Posting Date", "Job URL"];

/// Column holding the identity key of a row
pub const URL_HEADER: &str = "Job URL";

/// One scraped job posting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: String,
    pub company: String,
    pub location: String,

    /// Free text as shown on the site, e.g. "Posted 3 days ago"
    pub posted_date: String,

    /// Absolute URL of the posting; never empty
    pub url: String,
}

impl JobRecord {
    /// Row in `JOB_HEADERS` order
    pub fn into_row(self) -> Vec<String> {
        vec![self.title, self.company, self.location, self.posted_date, self.url]
    }
}

/// Convert records to worksheet rows, preserving order
pub fn records_to_rows(records: Vec<JobRecord>) -> Vec<Vec<String>> {
    records.into_iter().map(JobRecord::into_row).collect()
}

/// Outcome of fetching one search page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 2xx with the page markup
    Success(String),

    /// Soft block by the site (403)
    Blocked(u16),

    /// Rate limiting, 5xx or network failure that outlived the retries
    TransientError,

    /// Failure that retrying cannot fix
    FatalError,
}

/// One search page to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub keyword: String,
    pub page_offset: u32,
}

impl CrawlRequest {
    pub fn new(keyword: &str, page_index: u32) -> Self {
        Self {
            keyword: keyword.to_string(),
            page_offset: page_index.saturating_mul(PAGE_STRIDE),
        }
    }

    /// Every request of a run, keyword-major, pages in increasing order
    pub fn plan(keywords: &[String], pages_per_keyword: u32) -> impl Iterator<Item = CrawlRequest> + '_ {
        keywords.iter()
            .flat_map(move |keyword| (0..pages_per_keyword).map(move |page| CrawlRequest::new(keyword, page)))
    }

    /// Search URL: `{origin}{path}?q={keyword}&l={location}&start={offset}`
    pub fn search_url(&self, site_origin: &str, search_path: &str, location: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(site_origin)?.join(search_path)?;
        url.query_pairs_mut()
            .clear()
            .append_pair("q", &self.keyword)
            .append_pair("l", location)
            .append_pair("start", &self.page_offset.to_string());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_stride() {
        let keywords = vec!["data engineer".to_string()];
        let plan: Vec<CrawlRequest> = CrawlRequest::plan(&keywords, 3).collect();
        let offsets: Vec<u32> = plan.iter().map(|r| r.page_offset).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
    }

    #[test]
    fn test_plan_is_keyword_major() {
        let keywords = vec!["rust".to_string(), "go".to_string()];
        let plan: Vec<CrawlRequest> = CrawlRequest::plan(&keywords, 2).collect();

        assert_eq!(plan, vec![
            CrawlRequest::new("rust", 0),
            CrawlRequest::new("rust", 1),
            CrawlRequest::new("go", 0),
            CrawlRequest::new("go", 1),
        ]);
        assert!(CrawlRequest::plan(&keywords, 0).next().is_none());
    }

    #[test]
    fn test_huge_page_index_does_not_overflow() {
        let request = CrawlRequest::new("rust", u32::MAX);
        assert_eq!(request.page_offset, u32::MAX);
    }

    #[test]
    fn test_search_url() {
        let request = CrawlRequest::new("data engineer", 2);
        let url = request.search_url("https://www.indeed.com", "/jobs", "Remote").unwrap();

        assert_eq!(url.as_str(), "https://www.indeed.com/jobs?q=data+engineer&l=Remote&start=20");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("q".to_string(), "data engineer".to_string()));
    }

    #[test]
    fn test_row_matches_header_order() {
        let record = JobRecord {
            title: "Data Engineer".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            posted_date: "Just posted".to_string(),
            url: "https://www.indeed.com/viewjob?jk=1".to_string(),
        };

        let row = record.into_row();
        assert_eq!(row.len(), JOB_HEADERS.len());
        let url_idx = JOB_HEADERS.iter().position(|h| *h == URL_HEADER).unwrap();
        assert_eq!(row[url_idx], "https://www.indeed.com/viewjob?jk=1");
    }
}
