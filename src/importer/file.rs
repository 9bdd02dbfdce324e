//! Static export files: a compact platform export, or this application's
//! own export produced by [`export_blog`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{DiscoveredPost, ImportProgress, NewBlog, SourceKind};

use super::{persist_posts, ImportContext, PostSet, ProgressSink};

pub const EXPORT_FORMAT: &str = "blog-archiver";
pub const EXPORT_VERSION: u32 = 1;

// Platform export shape

#[derive(Debug, Deserialize)]
struct PlatformExport {
    site: PlatformSite,
    posts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PlatformSite {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    feed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlatformPost {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default, deserialize_with = "lenient_date")]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

// Own export shape

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogExport {
    pub format: String,
    pub version: u32,
    pub blog: ExportedBlog,
    pub articles: Vec<ExportedPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedBlog {
    pub title: String,
    pub description: Option<String>,
    pub feed_url: String,
    pub site_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPost {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_html: Option<String>,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Header of an own export; articles are decoded one by one.
#[derive(Debug, Deserialize)]
struct OwnExport {
    version: u32,
    blog: ExportedBlog,
    articles: Vec<Value>,
}

/// RFC 3339 or a bare `YYYY-MM-DD`; anything else reads as undated.
fn lenient_date<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_export_date))
}

fn parse_export_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Decode each post on its own so one bad entry only costs that entry.
fn decode_items<T: DeserializeOwned>(items: Vec<Value>, origin: &str) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::warn!("Skipping post {} in {}: {}", i + 1, origin, e);
                None
            }
        })
        .collect()
}

/// What a file turned out to contain, reduced to importer terms.
struct Decoded {
    blog: NewBlog,
    posts: Vec<DiscoveredPost>,
    summaries: Vec<(String, String)>,
}

fn decode(bytes: &[u8], origin: &str) -> Result<Decoded> {
    let unrecognized = || AppError::UnrecognizedFormat(origin.to_string());
    let value: Value = serde_json::from_slice(bytes).map_err(|_| unrecognized())?;
    let object = value.as_object().ok_or_else(unrecognized)?;

    if object.get("format").and_then(Value::as_str) == Some(EXPORT_FORMAT) && object.contains_key("articles") {
        let export: OwnExport = serde_json::from_value(value).map_err(|_| unrecognized())?;
        if export.version > EXPORT_VERSION {
            return Err(AppError::UnrecognizedFormat(format!(
                "{} (export version {})",
                origin, export.version
            )));
        }
        return Ok(decode_own(export, origin));
    }

    if object.contains_key("site") && object.contains_key("posts") {
        let export: PlatformExport = serde_json::from_value(value).map_err(|_| unrecognized())?;
        return Ok(decode_platform(export, origin));
    }

    Err(unrecognized())
}

fn decode_own(export: OwnExport, origin: &str) -> Decoded {
    let articles: Vec<ExportedPost> = decode_items(export.articles, origin);
    let summaries = articles
        .iter()
        .filter_map(|a| a.summary.clone().map(|s| (a.link.clone(), s)))
        .collect();
    let posts = articles
        .into_iter()
        .map(|a| DiscoveredPost {
            title: a.title,
            link: a.link,
            published_at: a.published_at,
            author: a.author,
            categories: a.tags,
            content: a.content_html.or(a.content_text),
        })
        .collect();

    Decoded {
        blog: NewBlog {
            title: export.blog.title,
            description: export.blog.description,
            feed_url: export.blog.feed_url,
            site_url: export.blog.site_url,
            import_source: SourceKind::File,
        },
        posts,
        summaries,
    }
}

fn decode_platform(export: PlatformExport, origin: &str) -> Decoded {
    let site = export.site;
    let posts = decode_items::<PlatformPost>(export.posts, origin)
        .into_iter()
        .map(|p| DiscoveredPost {
            title: p.title.unwrap_or_default(),
            link: p.url,
            published_at: p.date,
            author: p.author,
            categories: p.tags,
            content: p.html,
        })
        .collect();

    Decoded {
        blog: NewBlog {
            title: site.title.unwrap_or_else(|| site.url.clone()),
            description: site.description,
            feed_url: site.feed_url.unwrap_or_else(|| site.url.clone()),
            site_url: Some(site.url),
            import_source: SourceKind::File,
        },
        posts,
        summaries: Vec::new(),
    }
}

pub async fn import_file(ctx: &ImportContext, path: &Path, sink: &ProgressSink) -> Result<String> {
    let origin = path.display().to_string();
    tracing::info!("Importing export file {}", origin);
    sink.emit(ImportProgress::new("reading", format!("Reading {}", origin)));

    let bytes = tokio::fs::read(path).await?;
    let decoded = decode(&bytes, &origin)?;

    let mut posts = PostSet::default();
    posts.extend(decoded.posts);
    if posts.is_empty() {
        return Err(AppError::EmptyFeed(origin));
    }
    sink.emit(
        ImportProgress::new("discovering", format!("{} posts in file", posts.len()))
            .with_counts(0, posts.len())
            .with_title(decoded.blog.title.clone()),
    );

    let blog_id = ctx.repo.find_or_create_blog(decoded.blog).await?;
    let total = posts.len();
    let summary = persist_posts(ctx, &blog_id, posts.into_posts(), sink).await;

    if !decoded.summaries.is_empty() {
        restore_summaries(&ctx.repo, &blog_id, decoded.summaries).await;
    }

    let blog = ctx.repo.recompute_blog_stats(&blog_id).await?;
    sink.emit(
        ImportProgress::new(
            "finalizing",
            format!("Imported {} posts ({} new), blog now has {}", summary.saved, summary.inserted, blog.post_count),
        )
        .with_counts(summary.saved, total),
    );

    Ok(blog_id)
}

/// Carry exported summaries over to posts that have none yet.
async fn restore_summaries(repo: &Repository, blog_id: &str, summaries: Vec<(String, String)>) {
    let posts = match repo.list_posts(blog_id).await {
        Ok(posts) => posts,
        Err(e) => {
            tracing::warn!("Could not restore summaries: {}", e);
            return;
        }
    };

    for (link, summary) in summaries {
        let Some(post) = posts.iter().find(|p| p.link == link && p.summary.is_none()) else {
            continue;
        };
        if let Err(e) = repo.save_summary(&post.id, summary).await {
            tracing::warn!("Could not restore summary for {}: {}", link, e);
        }
    }
}

pub async fn export_blog(repo: &Repository, blog_id: &str) -> Result<BlogExport> {
    let blog = repo
        .get_blog(blog_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("blog {}", blog_id)))?;
    let posts = repo.list_posts(blog_id).await?;

    Ok(BlogExport {
        format: EXPORT_FORMAT.to_string(),
        version: EXPORT_VERSION,
        blog: ExportedBlog {
            title: blog.title,
            description: blog.description,
            feed_url: blog.feed_url,
            site_url: blog.site_url,
        },
        articles: posts
            .into_iter()
            .map(|p| ExportedPost {
                title: p.title,
                link: p.link,
                author: p.author,
                published_at: p.published_at,
                content_html: p.content_html,
                content_text: p.content_text,
                tags: p.tags.into_iter().collect(),
                summary: p.summary,
            })
            .collect(),
    })
}

pub async fn write_export(export: &BlogExport, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(export)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
