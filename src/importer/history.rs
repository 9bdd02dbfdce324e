use std::collections::HashSet;

use crate::error::Result;
use crate::models::{DiscoveredPost, ImportProgress, NewBlog, NewPost, SourceKind};
use crate::services::history_api::{resolve_next, HistoryApiClient, MAX_PAGES};
use crate::text;

use super::{ImportContext, ProgressSink};

/// Walk a history service's post listing for one feed. The service is the
/// authority, so there is no discovery heuristic: every page is stored in
/// its own transaction before the next one is requested.
pub async fn import_history(
    ctx: &ImportContext,
    api_base: &str,
    feed_url: &str,
    sink: &ProgressSink,
) -> Result<String> {
    let client = HistoryApiClient::new(ctx.http.clone(), api_base);
    tracing::info!("Importing {} from history service {}", feed_url, api_base);
    sink.emit(ImportProgress::new("discovering", format!("Looking up {}", feed_url)));

    let feed = client.find_feed(feed_url).await?;
    let title = feed.title.clone().unwrap_or_else(|| feed.feed_url.clone());
    sink.emit(ImportProgress::new("discovering", format!("Found feed {}", feed.id)).with_title(title.clone()));

    let first_url = client.posts_url(&feed.id);
    let mut page = client.fetch_posts_page(&first_url).await?;

    let blog_id = ctx
        .repo
        .find_or_create_blog(NewBlog {
            title: title.clone(),
            description: feed.description.clone(),
            feed_url: text::normalize_feed_url(&feed.feed_url),
            site_url: feed.site_url.clone(),
            import_source: SourceKind::HistoryApi,
        })
        .await?;

    let mut visited = HashSet::from([first_url.clone()]);
    let mut current_url = first_url;
    let mut fetched = 0;
    let mut saved = 0;

    loop {
        let total = page.count.unwrap_or(0).max(fetched + page.results.len());
        fetched += page.results.len();

        let batch: Vec<NewPost> = page
            .results
            .into_iter()
            .map(DiscoveredPost::from)
            .filter(|p| !p.link.is_empty())
            .map(|p| NewPost::from_discovered(&blog_id, p))
            .collect();

        match ctx.repo.insert_posts_batch(batch).await {
            Ok(outcome) => saved += outcome.saved,
            Err(e) => tracing::warn!("Page {} rolled back: {}", current_url, e),
        }

        sink.emit(
            ImportProgress::new(
                format!("fetching page {}", visited.len()),
                format!("Saved {} of {} posts", saved, total),
            )
            .with_counts(saved, total),
        );

        let Some(next_url) = page.next.and_then(|n| resolve_next(&current_url, &n)) else {
            break;
        };
        if visited.len() >= MAX_PAGES || !visited.insert(next_url.clone()) {
            tracing::warn!("Stopping at {}: page already visited or page cap reached", next_url);
            break;
        }

        page = match client.fetch_posts_page(&next_url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Stopping history walk at {}: {}", next_url, e);
                break;
            }
        };
        current_url = next_url;
    }

    let blog = ctx.repo.recompute_blog_stats(&blog_id).await?;
    sink.emit(
        ImportProgress::new("finalizing", format!("Blog now has {} posts", blog.post_count))
            .with_counts(saved, fetched),
    );
    tracing::info!("Finished history import of {}: {} posts", feed_url, blog.post_count);

    Ok(blog_id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ImportSettings;
    use crate::db::Repository;
    use crate::error::AppError;
    use crate::testing::ScriptedTransport;

    const API: &str = "https://api.example/v1";
    const FEEDS: &str = "https://api.example/v1/feeds/";
    const POSTS: &str = "https://api.example/v1/feeds/9/posts/";

    fn feeds_body() -> &'static str {
        r#"{"count":1,"next":null,"results":[{"id":9,"title":"History Blog",
            "feed_url":"https://hist.example/feed.xml","site_url":"https://hist.example/"}]}"#
    }

    fn post(n: usize, date: &str) -> String {
        format!(
            r#"{{"title":"Post {n}","link":"https://hist.example/{n}","published":"{date}",
                "content":"<p>Body of post {n}.</p>","tags":["history"]}}"#
        )
    }

    async fn context(transport: ScriptedTransport) -> ImportContext {
        ImportContext {
            repo: Repository::open_in_memory().await.unwrap(),
            http: Arc::new(transport),
            settings: ImportSettings::default(),
        }
    }

    #[tokio::test]
    async fn walks_every_page() {
        let page1 = format!(
            r#"{{"count":3,"next":"?page=2","results":[{},{}]}}"#,
            post(1, "2010-01-01T00:00:00Z"),
            post(2, "2012-06-01T00:00:00Z")
        );
        // The server repeats post 2; storage keeps one row.
        let page2 = format!(
            r#"{{"count":3,"next":null,"results":[{},{}]}}"#,
            post(2, "2012-06-01T00:00:00Z"),
            post(3, "2015-12-31T00:00:00Z")
        );
        let transport = ScriptedTransport::new()
            .respond(FEEDS, 200, feeds_body())
            .respond(POSTS, 200, page1)
            .respond(&format!("{}?page=2", POSTS), 200, page2);
        let ctx = context(transport).await;

        let blog_id = import_history(&ctx, API, "http://hist.example", &ProgressSink::none())
            .await
            .unwrap();

        let blog = ctx.repo.get_blog(&blog_id).await.unwrap().unwrap();
        assert_eq!(blog.post_count, 3);
        assert_eq!(blog.import_source, SourceKind::HistoryApi);
        assert_eq!(blog.earliest_post.unwrap().to_rfc3339(), "2010-01-01T00:00:00+00:00");
        assert_eq!(blog.latest_post.unwrap().to_rfc3339(), "2015-12-31T00:00:00+00:00");
    }

    #[tokio::test]
    async fn unknown_feed_is_not_found() {
        let transport = ScriptedTransport::new().respond(FEEDS, 200, feeds_body());
        let ctx = context(transport).await;

        let err = import_history(&ctx, API, "https://elsewhere.example/feed", &ProgressSink::none())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_first_page_fails_without_a_blog() {
        let transport = ScriptedTransport::new()
            .respond(FEEDS, 200, feeds_body())
            .respond(POSTS, 500, "boom");
        let ctx = context(transport).await;

        let err = import_history(&ctx, API, "https://hist.example/feed.xml", &ProgressSink::none())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HistoryApi(_)));
        assert!(ctx.repo.list_blogs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_page_failure_keeps_what_was_saved() {
        let page1 = format!(
            r#"{{"count":4,"next":"{}?page=2","results":[{}]}}"#,
            POSTS,
            post(1, "2011-01-01T00:00:00Z")
        );
        let transport = ScriptedTransport::new()
            .respond(FEEDS, 200, feeds_body())
            .respond(POSTS, 200, page1)
            .respond(&format!("{}?page=2", POSTS), 502, "bad gateway");
        let ctx = context(transport).await;

        let blog_id = import_history(&ctx, API, "https://hist.example/feed.xml", &ProgressSink::none())
            .await
            .unwrap();
        assert_eq!(ctx.repo.get_blog(&blog_id).await.unwrap().unwrap().post_count, 1);
    }

    #[tokio::test]
    async fn self_referencing_next_does_not_loop() {
        let page = format!(
            r#"{{"count":1,"next":"{}","results":[{}]}}"#,
            POSTS,
            post(1, "2011-01-01T00:00:00Z")
        );
        let transport = ScriptedTransport::new()
            .respond(FEEDS, 200, feeds_body())
            .respond(POSTS, 200, page);
        let transport = Arc::new(transport);
        let ctx = ImportContext {
            repo: Repository::open_in_memory().await.unwrap(),
            http: transport.clone(),
            settings: ImportSettings::default(),
        };

        import_history(&ctx, API, "https://hist.example/feed.xml", &ProgressSink::none())
            .await
            .unwrap();
        assert_eq!(transport.request_count(POSTS), 1);
    }
}
