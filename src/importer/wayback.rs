//! Live feed plus Wayback Machine snapshots.
//!
//! Discovery runs entirely before the first database write: live feed,
//! paginated feed pages, then archived copies of the feed. Only the live
//! feed can fail the import; everything after it degrades instead.

use tokio::time::sleep;

use crate::error::{AppError, Result};
use crate::feed::{
    archive, looks_like_feed, parse_feed, FeedPlatform, FetchedBody, ParsedFeed, FEED_ACCEPT,
    JSON_ACCEPT,
};
use crate::models::{ImportProgress, NewBlog, SourceKind};
use crate::text;

use super::{persist_posts, ImportContext, PostSet, ProgressSink};

/// Pages in a row that may add nothing new before pagination stops.
const MAX_EMPTY_PAGES: usize = 2;

pub async fn import_wayback(ctx: &ImportContext, feed_url: &str, sink: &ProgressSink) -> Result<String> {
    let requested = feed_url;
    let feed_url = text::normalize_feed_url(requested);
    tracing::info!("Importing {} from live feed and archive", feed_url);
    sink.emit(ImportProgress::new("discovering", format!("Fetching {}", feed_url)));

    // An explicit http:// URL is tried over https first, then as given.
    let (feed_url, response, live) = match fetch_live_feed(ctx, &feed_url).await {
        Ok((response, live)) => (feed_url, response, live),
        Err(AppError::Unreachable { url, reason }) => match text::plain_http(requested) {
            Some(insecure) => {
                tracing::info!("{} unreachable ({}), retrying {}", url, reason, insecure);
                let (response, live) = fetch_live_feed(ctx, &insecure).await?;
                (insecure, response, live)
            }
            None => return Err(AppError::Unreachable { url, reason }),
        },
        Err(e) => return Err(e),
    };
    let title = live.title.clone().unwrap_or_else(|| feed_url.clone());
    if let Some(generator) = &live.generator {
        tracing::debug!("{} is generated by {}", feed_url, generator);
    }

    let mut posts = PostSet::default();
    posts.extend(live.posts);
    sink.emit(
        ImportProgress::new("discovering", format!("Live feed has {} posts", posts.len()))
            .with_counts(0, posts.len())
            .with_title(title.clone()),
    );

    if let Some(platform) = FeedPlatform::detect(&response.url, &response.body) {
        tracing::debug!("{} looks paginated ({:?})", response.url, platform);
        crawl_pages(ctx, &response.url, platform, &mut posts, sink).await;
    }

    let timestamps = query_snapshots(ctx, &feed_url, sink).await;
    crawl_snapshots(ctx, &feed_url, &timestamps, &mut posts, sink).await;

    if posts.is_empty() {
        return Err(AppError::EmptyFeed(feed_url));
    }

    let blog_id = ctx
        .repo
        .find_or_create_blog(NewBlog {
            title: title.clone(),
            description: live.description,
            feed_url: feed_url.clone(),
            site_url: live.site_url,
            import_source: SourceKind::Wayback,
        })
        .await?;

    let total = posts.len();
    let summary = persist_posts(ctx, &blog_id, posts.into_posts(), sink).await;

    sink.emit(ImportProgress::new("finalizing", "Updating blog statistics").with_counts(summary.saved, total));
    let blog = ctx.repo.recompute_blog_stats(&blog_id).await?;

    sink.emit(
        ImportProgress::new(
            "finalizing",
            format!("Imported {} posts ({} new), blog now has {}", summary.saved, summary.inserted, blog.post_count),
        )
        .with_counts(summary.saved, total),
    );
    tracing::info!("Finished {}: {} of {} posts saved", feed_url, summary.saved, total);

    Ok(blog_id)
}

/// The only step allowed to fail the import: the feed must be reachable,
/// look like XML and parse.
async fn fetch_live_feed(ctx: &ImportContext, feed_url: &str) -> Result<(FetchedBody, ParsedFeed)> {
    let response = ctx.http.get(feed_url, FEED_ACCEPT).await?;

    if !response.is_success() {
        return Err(AppError::Unreachable {
            url: feed_url.to_string(),
            reason: format!("HTTP {}", response.status),
        });
    }
    if !looks_like_feed(&response.body) {
        return Err(AppError::NotAFeed(feed_url.to_string()));
    }

    let parsed = parse_feed(&response.body)?;
    Ok((response, parsed))
}

async fn fetch_feed_page(ctx: &ImportContext, url: &str) -> Result<ParsedFeed> {
    let response = ctx.http.get(url, FEED_ACCEPT).await?;
    if !response.is_success() {
        return Err(AppError::Unreachable {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status),
        });
    }
    if !looks_like_feed(&response.body) {
        return Err(AppError::NotAFeed(url.to_string()));
    }
    parse_feed(&response.body)
}

async fn crawl_pages(
    ctx: &ImportContext,
    feed_url: &str,
    platform: FeedPlatform,
    posts: &mut PostSet,
    sink: &ProgressSink,
) {
    let mut empty_pages = 0;

    for page in 2..=ctx.settings.max_pages {
        if empty_pages >= MAX_EMPTY_PAGES {
            break;
        }
        let Some(url) = platform.page_url(feed_url, page) else {
            break;
        };

        sleep(ctx.settings.page_delay()).await;

        let added = match fetch_feed_page(ctx, &url).await {
            Ok(parsed) => posts.extend(parsed.posts),
            Err(e) => {
                tracing::debug!("Page {} of {} unavailable: {}", page, feed_url, e);
                0
            }
        };

        if added == 0 {
            empty_pages += 1;
        } else {
            empty_pages = 0;
        }

        sink.emit(
            ImportProgress::new(
                format!("fetching page {}", page),
                format!("Page {}: {} new posts ({} total)", page, added, posts.len()),
            )
            .with_counts(0, posts.len()),
        );
    }
}

/// GET against the archive with its rate limit in mind: HTTP 429 is retried
/// with exponential backoff up to the retry cap, then abandoned. Every other
/// failure is abandoned at once. `None` means "skip this one".
async fn fetch_archived(ctx: &ImportContext, url: &str, accept: &str) -> Option<FetchedBody> {
    let max_retries = ctx.settings.max_retries;

    for attempt in 0..=max_retries {
        match ctx.http.get(url, accept).await {
            Ok(response) if response.is_rate_limited() => {
                if attempt == max_retries {
                    tracing::warn!("Giving up on {} after {} rate-limited attempts", url, attempt + 1);
                    return None;
                }
                let wait = ctx.settings.backoff(attempt);
                tracing::debug!("Rate limited on {}, retrying in {:?}", url, wait);
                sleep(wait).await;
            }
            Ok(response) if response.is_success() => return Some(response),
            Ok(response) => {
                tracing::warn!("Archive returned HTTP {} for {}", response.status, url);
                return None;
            }
            Err(e) => {
                tracing::warn!("Archive request failed for {}: {}", url, e);
                return None;
            }
        }
    }
    None
}

/// Capture timestamps for the feed, thinned to the configured cap. Any
/// failure yields an empty list.
async fn query_snapshots(ctx: &ImportContext, feed_url: &str, sink: &ProgressSink) -> Vec<String> {
    sink.emit(ImportProgress::new("querying archive", "Looking up archived copies"));

    let query = archive::cdx_query_url(&ctx.settings.cdx_endpoint, feed_url);
    let Some(response) = fetch_archived(ctx, &query, JSON_ACCEPT).await else {
        return Vec::new();
    };

    let timestamps = match archive::parse_cdx_timestamps(&response.body) {
        Ok(timestamps) => timestamps,
        Err(e) => {
            tracing::warn!("Unreadable snapshot index for {}: {}", feed_url, e);
            return Vec::new();
        }
    };

    let found = timestamps.len();
    let selected = archive::sample_evenly(timestamps, ctx.settings.max_snapshots);
    sink.emit(ImportProgress::new(
        "querying archive",
        format!("Found {} snapshots, fetching {}", found, selected.len()),
    ));
    selected
}

async fn crawl_snapshots(
    ctx: &ImportContext,
    feed_url: &str,
    timestamps: &[String],
    posts: &mut PostSet,
    sink: &ProgressSink,
) {
    let total = timestamps.len();

    for (i, timestamp) in timestamps.iter().enumerate() {
        sleep(ctx.settings.snapshot_delay()).await;

        let url = archive::snapshot_url(&ctx.settings.archive_base, timestamp, feed_url);
        let added = match fetch_archived(ctx, &url, FEED_ACCEPT).await {
            Some(response) if looks_like_feed(&response.body) => match parse_feed(&response.body) {
                Ok(parsed) => posts.extend(parsed.posts),
                Err(e) => {
                    tracing::warn!("Skipping unparseable snapshot {}: {}", timestamp, e);
                    0
                }
            },
            Some(_) => {
                tracing::debug!("Snapshot {} is not a feed", timestamp);
                0
            }
            None => 0,
        };

        sink.emit(
            ImportProgress::new(
                format!("fetching snapshot {}/{}", i + 1, total),
                format!("Snapshot {}: {} new posts ({} total)", timestamp, added, posts.len()),
            )
            .with_counts(0, posts.len()),
        );
    }
}
