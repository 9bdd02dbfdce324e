use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub blog_id: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub word_count: i64,
    pub reading_time: i64,
    pub is_full_text: bool,
    pub tags: BTreeSet<String>,
    pub summary: Option<String>,
}

/// A post as an importer found it, before text extraction. Never stored as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveredPost {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: String,
    pub blog_id: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub word_count: usize,
    pub reading_time: usize,
    pub is_full_text: bool,
    pub tags: BTreeSet<String>,
}

impl NewPost {
    /// Run a discovered post through text extraction and the derived counters.
    pub fn from_discovered(blog_id: &str, post: DiscoveredPost) -> Self {
        let content_text = post
            .content
            .as_deref()
            .map(text::strip_html)
            .filter(|t| !t.is_empty());
        let word_count = content_text.as_deref().map(text::word_count).unwrap_or(0);
        let is_full_text = content_text.as_deref().is_some_and(text::is_full_text);
        let tags = post
            .categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        Self {
            id: text::new_id(),
            blog_id: blog_id.to_string(),
            title: if post.title.trim().is_empty() {
                "Untitled".to_string()
            } else {
                post.title.trim().to_string()
            },
            link: post.link,
            author: post.author,
            published_at: post.published_at,
            content_html: post.content,
            content_text,
            word_count,
            reading_time: text::reading_time_minutes(word_count),
            is_full_text,
            tags,
        }
    }
}
