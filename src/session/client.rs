use reqwest::cookie::Jar;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::config::{RetrySettings, SessionSettings};
use crate::session::identity::{cookie_pairs, IdentityManager};
use crate::session::SessionError;

/// Retry policy for idempotent GET requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    total_attempts: u32,
    backoff_factor: f64,
    max_backoff: Duration,
    status_forcelist: Vec<u16>,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            total_attempts: settings.total_attempts.max(1),
            backoff_factor: settings.backoff_factor.max(0.0),
            max_backoff: Duration::try_from_secs_f64(settings.max_backoff_secs.max(0.0)).unwrap_or(Duration::MAX),
            status_forcelist: settings.status_forcelist.clone(),
        }
    }

    pub fn retries_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }

    /// Delay before the attempt following `attempt` (1-based):
    /// `backoff_factor * 2^(attempt - 1)` seconds, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay requested by the server through `Retry-After`, capped
    fn retry_after(&self, response: &Response) -> Option<Duration> {
        if !matches!(response.status(), StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE) {
            return None;
        }

        response.headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(self.max_backoff))
    }
}

/// Transport failures worth another attempt
fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// HTTP session shared by every fetch of a run
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    retry: RetryPolicy,
    identity: String,
}

impl Session {
    /// Build the client: identity headers, cookie jar, timeout and optional proxy.
    ///
    /// The injected cookie is scoped to `site_origin` and shares the jar with
    /// cookies the site sets during the run.
    pub fn new(settings: &SessionSettings, site_origin: &str) -> Result<Self, SessionError> {
        let identity = IdentityManager::new(settings.identities.clone()).resolve(settings)?;

        let origin = Url::parse(site_origin)
            .map_err(|e| SessionError::InvalidOrigin(site_origin.to_string(), e))?;
        let jar = Arc::new(Jar::default());
        if let Some(raw) = &settings.cookie {
            for pair in cookie_pairs(raw) {
                jar.add_cookie_str(pair, &origin);
            }
        }

        let mut builder = Client::builder()
            .default_headers(identity.headers)
            .cookie_provider(jar)
            .timeout(Duration::from_secs(settings.timeout_secs));

        if let Some(proxy_url) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| SessionError::InvalidProxy(proxy_url.clone(), e))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(SessionError::Client)?;

        info!("HTTP session ready with identity '{}'", identity.name);

        Ok(Self {
            client,
            retry: RetryPolicy::new(&settings.retry),
            identity: identity.name,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// GET with automatic retries.
    ///
    /// A response whose status is still retryable after the last attempt is
    /// returned as-is; only a transport failure on the last attempt is an error.
    pub async fn get(&self, url: &str) -> reqwest::Result<Response> {
        let mut attempt = 1;

        loop {
            let result = self.client.get(url).send().await;

            let delay = match &result {
                Ok(response) if self.retry.retries_status(response.status()) => {
                    debug!("Attempt {}/{} for {} returned {}", attempt, self.retry.total_attempts, url, response.status());
                    Some(self.retry.retry_after(response).unwrap_or_else(|| self.retry.backoff(attempt)))
                }
                Err(e) if is_transient(e) => {
                    debug!("Attempt {}/{} for {} failed: {}", attempt, self.retry.total_attempts, url, e);
                    Some(self.retry.backoff(attempt))
                }
                _ => None,
            };

            let Some(delay) = delay else {
                return result;
            };

            if attempt >= self.retry.total_attempts {
                warn!("Giving up on {} after {} attempts", url, attempt);
                return result;
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORIGIN: &str = "https://www.indeed.com";

    fn fast_settings(total_attempts: u32) -> SessionSettings {
        SessionSettings {
            identity: Some("windows_chrome".to_string()),
            extra_headers: Some(r#"{"X-Scout": "yes"}"#.to_string()),
            cookie: Some("CTK=test".to_string()),
            timeout_secs: 5,
            retry: RetrySettings {
                total_attempts,
                backoff_factor: 0.0,
                ..RetrySettings::default()
            },
            ..SessionSettings::default()
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::new(&RetrySettings::default());
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(120));
    }

    #[test]
    fn test_default_forcelist() {
        let policy = RetryPolicy::new(&RetrySettings::default());
        for code in [403, 429, 500, 502, 503, 504] {
            assert!(policy.retries_status(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!policy.retries_status(StatusCode::NOT_FOUND));
        assert!(!policy.retries_status(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let session = Session::new(&fast_settings(5), ORIGIN).unwrap();
        let response = session.get(&format!("{}/jobs", server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(3)
            .mount(&server)
            .await;

        let session = Session::new(&fast_settings(3), ORIGIN).unwrap();
        let response = session.get(&format!("{}/jobs", server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_non_retryable_status_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new(&fast_settings(5), ORIGIN).unwrap();
        let response = session.get(&server.uri()).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_identity_headers_are_sent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("cookie", "CTK=test"))
            .and(header("x-scout", "yes"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new(&fast_settings(1), &server.uri()).unwrap();
        let response = session.get(&server.uri()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(session.identity(), "windows_chrome");
    }

    #[tokio::test]
    async fn test_server_cookies_join_injected_cookie() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "session=fromserver; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .and(header_regex("cookie", "CTK=test"))
            .and(header_regex("cookie", "session=fromserver"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new(&fast_settings(1), &server.uri()).unwrap();
        session.get(&format!("{}/first", server.uri())).await.unwrap();
        let response = session.get(&format!("{}/second", server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        assert!(matches!(
            Session::new(&fast_settings(1), "not a url"),
            Err(SessionError::InvalidOrigin(..))
        ));
    }

    #[test]
    fn test_invalid_proxy_is_rejected() {
        let mut settings = fast_settings(1);
        settings.proxy = Some("ftp://proxy.example.com:21".to_string());
        assert!(matches!(Session::new(&settings, ORIGIN), Err(SessionError::InvalidProxy(..))));
    }
}
