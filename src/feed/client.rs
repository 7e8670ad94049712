//! HTTP client for the notification feed.

use reqwest::Client;

use super::{FeedError, FeedReader};
use crate::config::AgentConfig;

/// HTTP client for the feed endpoint.
///
/// The client carries no total or connect timeout; only reads on an open body
/// are bounded, by the reader.
#[derive(Debug, Clone)]
pub struct FeedClient {
    config: AgentConfig,
    client: Client,
}

impl FeedClient {
    pub fn new(config: AgentConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    /// Open the feed, resuming after `since` when given.
    pub async fn open(&self, since: Option<i64>) -> Result<FeedReader, FeedError> {
        let url = self.config.feed_url(since);
        tracing::info!("Opening feed {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        tracing::debug!("Feed open ({})", status);
        Ok(FeedReader::from_response(response, self.config.read_timeout))
    }
}
