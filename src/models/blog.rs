use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SourceKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub feed_url: String,
    pub site_url: Option<String>,
    pub post_count: i64,
    pub earliest_post: Option<DateTime<Utc>>,
    pub latest_post: Option<DateTime<Utc>>,
    pub imported_at: DateTime<Utc>,
    pub import_source: SourceKind,
    pub total_words: i64,
}

/// Metadata an importer knows about a blog before any post is stored.
#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub description: Option<String>,
    pub feed_url: String,
    pub site_url: Option<String>,
    pub import_source: SourceKind,
}
