use std::collections::HashSet;

use crate::config::AnalysisSettings;
use crate::db::Repository;
use crate::error::Result;

use super::textrank;

/// Rows fetched per round of the backlog walk.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BacklogReport {
    pub summarized: usize,
    pub failed: usize,
}

/// Summarize every stored post that has no summary yet, one at a time.
/// Each summary is saved as soon as it exists, and the task yields every
/// `yield_every` posts so imports running alongside keep making progress.
/// A post that cannot be summarized is skipped for the rest of the walk.
pub async fn summarize_backlog(repo: &Repository, settings: &AnalysisSettings) -> Result<BacklogReport> {
    let mut report = BacklogReport::default();
    let mut skipped: HashSet<String> = HashSet::new();
    let yield_every = settings.yield_every.max(1);
    let mut processed = 0usize;

    loop {
        let pending: Vec<(String, String)> = repo
            .posts_missing_summary(PAGE_SIZE + skipped.len())
            .await?
            .into_iter()
            .filter(|(id, _)| !skipped.contains(id))
            .collect();
        if pending.is_empty() {
            break;
        }

        for (post_id, text) in pending {
            let summary = textrank::summarize(&text, settings.summary_sentences);
            let saved = if summary.is_empty() {
                Err("empty summary".to_string())
            } else {
                repo.save_summary(&post_id, summary).await.map_err(|e| e.to_string())
            };

            match saved {
                Ok(()) => report.summarized += 1,
                Err(e) => {
                    tracing::warn!("Could not summarize post {}: {}", post_id, e);
                    skipped.insert(post_id);
                    report.failed += 1;
                }
            }

            processed += 1;
            if processed % yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    tracing::info!("Summarized {} posts, {} failed", report.summarized, report.failed);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoveredPost, NewBlog, NewPost, SourceKind};

    async fn seeded(bodies: &[&str]) -> (Repository, String) {
        let repo = Repository::open_in_memory().await.unwrap();
        let blog_id = repo
            .find_or_create_blog(NewBlog {
                title: "Backlog".to_string(),
                description: None,
                feed_url: "https://backlog.example/feed".to_string(),
                site_url: None,
                import_source: SourceKind::File,
            })
            .await
            .unwrap();
        let posts = bodies
            .iter()
            .enumerate()
            .map(|(n, body)| {
                NewPost::from_discovered(
                    &blog_id,
                    DiscoveredPost {
                        title: format!("Post {}", n),
                        link: format!("https://backlog.example/{}", n),
                        content: Some(body.to_string()),
                        ..Default::default()
                    },
                )
            })
            .collect();
        repo.insert_posts_batch(posts).await.unwrap();
        (repo, blog_id)
    }

    #[tokio::test]
    async fn fills_every_missing_summary_once() {
        let bodies: Vec<String> = (0..25)
            .map(|n| format!("Post number {} talks about gardens. Tomatoes grow well in summer. Water them every single morning. Weeds should be pulled by hand.", n))
            .collect();
        let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
        let (repo, blog_id) = seeded(&refs).await;
        let settings = AnalysisSettings::default();

        let report = summarize_backlog(&repo, &settings).await.unwrap();
        assert_eq!(report, BacklogReport { summarized: 25, failed: 0 });

        let posts = repo.list_posts(&blog_id).await.unwrap();
        assert!(posts.iter().all(|p| p.summary.is_some()));
        let summary = posts[0].summary.as_deref().unwrap();
        assert_eq!(textrank::split_sentences(summary).len(), settings.summary_sentences);

        let again = summarize_backlog(&repo, &settings).await.unwrap();
        assert_eq!(again, BacklogReport::default());
    }

    #[tokio::test]
    async fn unsummarizable_posts_are_skipped_and_the_walk_ends() {
        // With zero sentences requested, any post holding a full sentence
        // yields an empty summary; fragments are kept as they are.
        let long = "Tomatoes grow well in the long summer. Water them every single morning.";
        let mut bodies = vec![long; PAGE_SIZE + 5];
        bodies.insert(3, "Short note.");
        bodies.push("Tiny.");
        let (repo, blog_id) = seeded(&bodies).await;
        let settings = AnalysisSettings {
            summary_sentences: 0,
            ..AnalysisSettings::default()
        };

        let report = tokio_test::assert_ok!(summarize_backlog(&repo, &settings).await);
        assert_eq!(report, BacklogReport { summarized: 2, failed: PAGE_SIZE + 5 });

        let posts = repo.list_posts(&blog_id).await.unwrap();
        let summarized: Vec<&str> = posts.iter().filter_map(|p| p.summary.as_deref()).collect();
        assert_eq!(summarized.len(), 2);
        assert!(summarized.contains(&"Short note."));
        assert!(summarized.contains(&"Tiny."));
    }

    #[tokio::test]
    async fn short_posts_keep_their_text_as_summary() {
        let (repo, blog_id) = seeded(&["<p>Only one sentence lives here.</p>"]).await;

        summarize_backlog(&repo, &AnalysisSettings::default()).await.unwrap();

        let posts = repo.list_posts(&blog_id).await.unwrap();
        assert_eq!(posts[0].summary.as_deref(), Some("Only one sentence lives here."));
    }
}
