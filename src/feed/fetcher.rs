use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};

use crate::config::ImportSettings;
use crate::error::{AppError, Result};

pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

pub const JSON_ACCEPT: &str = "application/json";

/// A fully read HTTP response. `url` is the final URL after redirects.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: u16,
    pub url: String,
    pub body: Vec<u8>,
}

impl FetchedBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS.as_u16()
    }
}

/// Everything the importers need from the network. Non-2xx statuses are
/// returned as values; only transport failures are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, accept: &str) -> Result<FetchedBody>;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(settings: &ImportSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for FeedFetcher {
    async fn get(&self, url: &str, accept: &str) -> Result<FetchedBody> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| AppError::Unreachable {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.bytes().await?.to_vec();
        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        Ok(FetchedBody {
            status,
            url: final_url,
            body,
        })
    }
}
