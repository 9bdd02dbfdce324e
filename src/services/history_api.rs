use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::feed::{HttpTransport, JSON_ACCEPT};
use crate::models::DiscoveredPost;
use crate::text;

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ApiId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ApiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiId::Number(n) => write!(f, "{}", n),
            ApiId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiFeed {
    pub id: ApiId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "url")]
    pub feed_url: String,
    #[serde(default, alias = "link")]
    pub site_url: Option<String>,
}

impl ApiFeed {
    /// Whether this feed is the one the user named, by feed or site URL.
    pub fn matches(&self, url: &str) -> bool {
        let key = text::source_key(url);
        text::source_key(&self.feed_url) == key
            || self.site_url.as_deref().map(text::source_key).as_deref() == Some(key.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPost {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "url")]
    pub link: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, alias = "published_at")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<ApiPost> for DiscoveredPost {
    fn from(post: ApiPost) -> Self {
        DiscoveredPost {
            title: post.title.unwrap_or_default(),
            link: post.link,
            published_at: post.published,
            author: post.author,
            categories: post.tags,
            content: post.content.filter(|c| !c.trim().is_empty()).or(post.summary),
        }
    }
}

/// Client for a REST service that keeps the full post history of feeds.
pub struct HistoryApiClient {
    http: Arc<dyn HttpTransport>,
    api_base: String,
}

impl HistoryApiClient {
    pub fn new(http: Arc<dyn HttpTransport>, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn feeds_url(&self) -> String {
        format!("{}/feeds/", self.api_base)
    }

    pub fn posts_url(&self, feed_id: &ApiId) -> String {
        format!(
            "{}/feeds/{}/posts/",
            self.api_base,
            urlencoding::encode(&feed_id.to_string())
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url, JSON_ACCEPT).await?;

        if !response.is_success() {
            return Err(AppError::HistoryApi(format!(
                "{} returned HTTP {}",
                url, response.status
            )));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| AppError::HistoryApi(format!("unexpected response from {}: {}", url, e)))
    }

    /// Every feed the service knows about, following `next` to the end.
    pub async fn list_feeds(&self) -> Result<Vec<ApiFeed>> {
        let mut feeds = Vec::new();
        let mut next = Some(self.feeds_url());
        let mut seen = 0;

        while let Some(url) = next.take() {
            let page: Page<ApiFeed> = self.get_json(&url).await?;
            feeds.extend(page.results);
            seen += 1;
            next = page
                .next
                .and_then(|n| resolve_next(&url, &n))
                .filter(|n| *n != url && seen < MAX_PAGES);
        }

        Ok(feeds)
    }

    pub async fn find_feed(&self, url: &str) -> Result<ApiFeed> {
        self.list_feeds()
            .await?
            .into_iter()
            .find(|f| f.matches(url))
            .ok_or_else(|| AppError::NotFound(format!("no feed for {} at {}", url, self.api_base)))
    }

    pub async fn fetch_posts_page(&self, url: &str) -> Result<Page<ApiPost>> {
        self.get_json(url).await
    }
}

/// Upper bound on pages followed in one listing.
pub const MAX_PAGES: usize = 10_000;

/// Resolve a `next` pointer against the page it came from. Servers send both
/// absolute and relative links.
pub fn resolve_next(current: &str, next: &str) -> Option<String> {
    let next = next.trim();
    if next.is_empty() {
        return None;
    }
    let base = Url::parse(current).ok()?;
    base.join(next).ok().map(|u| u.to_string())
}
