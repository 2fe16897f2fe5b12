use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use crate::crawler::task::FetchOutcome;
use crate::session::Session;

/// Anything that can turn a search URL into a fetch outcome
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page; failures are reported through the outcome, never raised
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Fetches search pages over the shared HTTP session
pub struct PageFetcher {
    session: Session,
}

impl PageFetcher {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.session.get(url).await {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                error!("Cannot request {}: {}", url, e);
                return FetchOutcome::FatalError;
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                return FetchOutcome::TransientError;
            }
        };

        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            warn!(
                "Blocked with 403 at {}; rotate the identity (user agent, cookie or proxy) before retrying",
                url
            );
            return FetchOutcome::Blocked(status.as_u16());
        }

        if status.is_success() {
            return match response.text().await {
                Ok(body) => {
                    debug!("Fetched {} bytes from {}", body.len(), url);
                    FetchOutcome::Success(body)
                }
                Err(e) => {
                    warn!("Failed to read body from {}: {}", url, e);
                    FetchOutcome::TransientError
                }
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!("Giving up on {} with status {}", url, status);
            FetchOutcome::TransientError
        } else {
            error!("Unexpected status {} from {}", status, url);
            FetchOutcome::FatalError
        }
    }
}
