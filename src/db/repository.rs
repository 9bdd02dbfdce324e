use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Blog, ImportJob, NewBlog, NewPost, Post, SourceKind};
use crate::text;

use super::schema::SCHEMA;

/// What one committed batch did. `saved` counts every post the batch
/// accepted, `inserted` only the rows that did not exist before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub saved: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub post_id: String,
    pub title: String,
    pub link: String,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Blog operations

    /// Reuse the blog already imported from the same source, refreshing its
    /// metadata, or create it. Returns the blog id.
    pub async fn find_or_create_blog(&self, blog: NewBlog) -> Result<String> {
        let id = text::new_id();
        let key = text::source_key(&blog.feed_url);
        let imported_at = format_datetime(&Utc::now());

        let blog_id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO blogs (id, source_key, title, description, feed_url, site_url, imported_at, import_source)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(source_key) DO UPDATE SET
                           title = excluded.title,
                           description = COALESCE(excluded.description, blogs.description),
                           site_url = COALESCE(excluded.site_url, blogs.site_url),
                           imported_at = excluded.imported_at,
                           import_source = excluded.import_source"#,
                    params![
                        id,
                        key,
                        blog.title,
                        blog.description,
                        blog.feed_url,
                        blog.site_url,
                        imported_at,
                        blog.import_source.as_str()
                    ],
                )?;
                let blog_id: String = conn.query_row(
                    "SELECT id FROM blogs WHERE source_key = ?1",
                    params![key],
                    |row| row.get(0),
                )?;
                Ok(blog_id)
            })
            .await?;
        Ok(blog_id)
    }

    pub async fn get_blog(&self, id: &str) -> Result<Option<Blog>> {
        let id = id.to_string();
        let blog = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BLOG_COLUMNS))?;
                let blog = stmt.query_row(params![id], blog_from_row).optional()?;
                Ok(blog)
            })
            .await?;
        Ok(blog)
    }

    pub async fn list_blogs(&self) -> Result<Vec<Blog>> {
        let blogs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY title", BLOG_COLUMNS))?;
                let blogs = stmt
                    .query_map([], blog_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(blogs)
            })
            .await?;
        Ok(blogs)
    }

    /// Recompute the aggregate counters from the stored posts.
    pub async fn recompute_blog_stats(&self, blog_id: &str) -> Result<Blog> {
        let id = blog_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE blogs SET
                           post_count = (SELECT COUNT(*) FROM posts WHERE blog_id = ?1),
                           earliest_post = (SELECT MIN(published_at) FROM posts WHERE blog_id = ?1),
                           latest_post = (SELECT MAX(published_at) FROM posts WHERE blog_id = ?1),
                           total_words = (SELECT COALESCE(SUM(word_count), 0) FROM posts WHERE blog_id = ?1)
                       WHERE id = ?1"#,
                    params![id],
                )?;
                Ok(())
            })
            .await?;

        self.get_blog(blog_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("blog {}", blog_id)))
    }

    /// Delete a blog and everything hanging off it. The search index is
    /// cleared explicitly since foreign keys do not reach it.
    pub async fn delete_blog(&self, blog_id: &str) -> Result<bool> {
        let id = blog_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM posts_fts WHERE post_id IN (SELECT id FROM posts WHERE blog_id = ?1)",
                    params![id],
                )?;
                let deleted = tx.execute("DELETE FROM blogs WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await?;
        Ok(deleted)
    }

    // Post operations

    /// Insert one batch inside a single transaction. Duplicate links are
    /// ignored. A failing tag or search-index row is logged and skipped; any
    /// other failure rolls the whole batch back.
    pub async fn insert_posts_batch(&self, posts: Vec<NewPost>) -> Result<BatchOutcome> {
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut outcome = BatchOutcome::default();
                {
                    let mut insert_post = tx.prepare_cached(
                        r#"INSERT OR IGNORE INTO posts
                           (id, blog_id, title, link, author, published_at, content_html, content_text,
                            word_count, reading_time, is_full_text)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                    )?;
                    let mut insert_tag = tx.prepare_cached(
                        "INSERT INTO post_tags (post_id, tag) VALUES (?1, ?2) ON CONFLICT(post_id, tag) DO NOTHING",
                    )?;
                    let mut insert_fts = tx.prepare_cached(
                        "INSERT INTO posts_fts (post_id, title, body) VALUES (?1, ?2, ?3)",
                    )?;

                    for post in &posts {
                        let changed = insert_post.execute(params![
                            post.id,
                            post.blog_id,
                            post.title,
                            post.link,
                            post.author,
                            post.published_at.as_ref().map(format_datetime),
                            post.content_html,
                            post.content_text,
                            post.word_count as i64,
                            post.reading_time as i64,
                            post.is_full_text,
                        ])?;
                        outcome.saved += 1;
                        if changed == 0 {
                            continue;
                        }
                        outcome.inserted += 1;

                        for tag in &post.tags {
                            if let Err(e) = insert_tag.execute(params![post.id, tag]) {
                                tracing::warn!("Skipping tag {:?} on {}: {}", tag, post.link, e);
                            }
                        }

                        let body = post.content_text.as_deref().unwrap_or_default();
                        if let Err(e) = insert_fts.execute(params![post.id, post.title, body]) {
                            tracing::warn!("Failed to index {} for search: {}", post.link, e);
                        }
                    }
                }
                tx.commit()?;
                Ok(outcome)
            })
            .await?;
        Ok(outcome)
    }

    pub async fn list_posts(&self, blog_id: &str) -> Result<Vec<Post>> {
        let id = blog_id.to_string();
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE blog_id = ?1 ORDER BY published_at, link",
                    POST_COLUMNS
                ))?;
                let mut posts = stmt
                    .query_map(params![id], post_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut tag_stmt = conn.prepare(
                    "SELECT t.post_id, t.tag FROM post_tags t JOIN posts p ON p.id = t.post_id WHERE p.blog_id = ?1",
                )?;
                let mut tags: HashMap<String, BTreeSet<String>> = HashMap::new();
                let rows = tag_stmt.query_map(params![id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    let (post_id, tag) = row?;
                    tags.entry(post_id).or_default().insert(tag);
                }
                for post in &mut posts {
                    if let Some(set) = tags.remove(&post.id) {
                        post.tags = set;
                    }
                }
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    /// `(post id, text)` pairs still waiting for a summary, oldest first.
    pub async fn posts_missing_summary(&self, limit: usize) -> Result<Vec<(String, String)>> {
        let pending = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, content_text FROM posts
                       WHERE summary IS NULL AND content_text IS NOT NULL AND content_text != ''
                       ORDER BY created_at, id LIMIT ?1"#,
                )?;
                let pending = stmt
                    .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(pending)
            })
            .await?;
        Ok(pending)
    }

    pub async fn save_summary(&self, post_id: &str, summary: String) -> Result<()> {
        let id = post_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("UPDATE posts SET summary = ?1 WHERE id = ?2", params![summary, id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// `(post id, title + body)` for every post, or only one blog's posts.
    pub async fn post_texts(&self, blog_id: Option<&str>) -> Result<Vec<(String, String)>> {
        let blog_id = blog_id.map(str::to_string);
        let texts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, title || ' ' || COALESCE(content_text, '') FROM posts
                       WHERE ?1 IS NULL OR blog_id = ?1 ORDER BY id"#,
                )?;
                let texts = stmt
                    .query_map(params![blog_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(texts)
            })
            .await?;
        Ok(texts)
    }

    pub async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query = query.to_string();
        let hits = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT p.id, p.title, p.link FROM posts_fts
                       JOIN posts p ON p.id = posts_fts.post_id
                       WHERE posts_fts MATCH ?1
                       ORDER BY bm25(posts_fts) LIMIT ?2"#,
                )?;
                let hits = stmt
                    .query_map(params![query, limit as i64], |row| {
                        Ok(SearchHit {
                            post_id: row.get(0)?,
                            title: row.get(1)?,
                            link: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(hits)
            })
            .await?;
        Ok(hits)
    }

    // Import job records

    pub async fn insert_import_job(&self, job: &ImportJob) -> Result<()> {
        let job = job.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO import_jobs (id, blog_id, title, source, status, started_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        job.id,
                        job.blog_id,
                        job.title,
                        job.source.as_str(),
                        job.status.as_str(),
                        format_datetime(&job.started_at)
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn finish_import_job(&self, job: &ImportJob) -> Result<()> {
        let job = job.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE import_jobs SET
                           blog_id = ?2, title = ?3, status = ?4, imported_items = ?5,
                           total_items = ?6, error = ?7, completed_at = ?8
                       WHERE id = ?1"#,
                    params![
                        job.id,
                        job.blog_id,
                        job.title,
                        job.status.as_str(),
                        job.imported_items as i64,
                        job.total_items as i64,
                        job.error,
                        job.completed_at.as_ref().map(format_datetime)
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Reading bookkeeping

    /// Best effort: failures are logged at debug level and otherwise ignored.
    pub async fn record_reading_session(&self, post_id: &str, started_at: DateTime<Utc>, duration_secs: u64) {
        let id = post_id.to_string();
        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO reading_sessions (post_id, started_at, duration_secs) VALUES (?1, ?2, ?3)",
                    params![id, format_datetime(&started_at), duration_secs as i64],
                )?;
                conn.execute(
                    r#"INSERT INTO reading_progress (post_id, position) VALUES (?1, 1.0)
                       ON CONFLICT(post_id) DO UPDATE SET position = 1.0, updated_at = datetime('now')"#,
                    params![id],
                )?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::debug!("Ignoring reading session failure for {}: {}", post_id, e);
        }
    }

    #[cfg(test)]
    pub(crate) async fn count(&self, sql: &'static str, arg: &str) -> i64 {
        let arg = arg.to_string();
        self.conn
            .call(move |conn| Ok(conn.query_row(sql, params![arg], |row| row.get(0))?))
            .await
            .unwrap()
    }
}

const BLOG_COLUMNS: &str = "SELECT id, title, description, feed_url, site_url, post_count, earliest_post, latest_post, imported_at, import_source, total_words FROM blogs";

const POST_COLUMNS: &str = "SELECT id, blog_id, title, link, author, published_at, content_html, content_text, word_count, reading_time, is_full_text, summary FROM posts";

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn blog_from_row(row: &Row) -> rusqlite::Result<Blog> {
    Ok(Blog {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        feed_url: row.get(3)?,
        site_url: row.get(4)?,
        post_count: row.get(5)?,
        earliest_post: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_datetime(&s)),
        latest_post: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| parse_datetime(&s)),
        imported_at: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        import_source: row
            .get::<_, String>(9)?
            .parse()
            .unwrap_or(SourceKind::File),
        total_words: row.get(10)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        blog_id: row.get(1)?,
        title: row.get(2)?,
        link: row.get(3)?,
        author: row.get(4)?,
        published_at: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| parse_datetime(&s)),
        content_html: row.get(6)?,
        content_text: row.get(7)?,
        word_count: row.get(8)?,
        reading_time: row.get(9)?,
        is_full_text: row.get::<_, i64>(10)? != 0,
        tags: BTreeSet::new(),
        summary: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoveredPost, ImportJob, JobStatus};
    use chrono::TimeZone;

    fn new_blog(feed_url: &str) -> NewBlog {
        NewBlog {
            title: "Example".to_string(),
            description: None,
            feed_url: feed_url.to_string(),
            site_url: Some("https://blog.example".to_string()),
            import_source: SourceKind::Wayback,
        }
    }

    fn post(blog_id: &str, n: u32, tags: &[&str]) -> NewPost {
        NewPost::from_discovered(
            blog_id,
            DiscoveredPost {
                title: format!("Post {}", n),
                link: format!("https://blog.example/{}", n),
                published_at: Some(Utc.with_ymd_and_hms(2020, 1, n, 0, 0, 0).unwrap()),
                categories: tags.iter().map(|t| t.to_string()).collect(),
                content: Some(format!("<p>body of post number {} about gardening</p>", n)),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn same_source_reuses_blog() {
        let repo = Repository::open_in_memory().await.unwrap();
        let a = repo.find_or_create_blog(new_blog("https://blog.example/feed")).await.unwrap();
        let b = repo.find_or_create_blog(new_blog("http://BLOG.example/feed/")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(repo.list_blogs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_links_are_ignored() {
        let repo = Repository::open_in_memory().await.unwrap();
        let blog_id = repo.find_or_create_blog(new_blog("https://blog.example/feed")).await.unwrap();

        let first = repo
            .insert_posts_batch(vec![post(&blog_id, 1, &["a"]), post(&blog_id, 2, &[])])
            .await
            .unwrap();
        let second = repo
            .insert_posts_batch(vec![post(&blog_id, 1, &["a"]), post(&blog_id, 3, &[])])
            .await
            .unwrap();

        assert_eq!(first, BatchOutcome { saved: 2, inserted: 2 });
        assert_eq!(second, BatchOutcome { saved: 2, inserted: 1 });
        assert_eq!(repo.list_posts(&blog_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stats_bound_the_stored_posts() {
        let repo = Repository::open_in_memory().await.unwrap();
        let blog_id = repo.find_or_create_blog(new_blog("https://blog.example/feed")).await.unwrap();
        repo.insert_posts_batch(vec![post(&blog_id, 3, &[]), post(&blog_id, 1, &[]), post(&blog_id, 9, &[])])
            .await
            .unwrap();

        let blog = repo.recompute_blog_stats(&blog_id).await.unwrap();
        assert_eq!(blog.post_count, 3);
        assert_eq!(blog.earliest_post, Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(blog.latest_post, Some(Utc.with_ymd_and_hms(2020, 1, 9, 0, 0, 0).unwrap()));
        assert_eq!(blog.total_words, 3 * 7);
    }

    #[tokio::test]
    async fn oversized_tag_does_not_sink_the_batch() {
        let repo = Repository::open_in_memory().await.unwrap();
        let blog_id = repo.find_or_create_blog(new_blog("https://blog.example/feed")).await.unwrap();
        let too_long = "x".repeat(200);

        let outcome = repo
            .insert_posts_batch(vec![post(&blog_id, 1, &["ok", &too_long]), post(&blog_id, 2, &["fine"])])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        let posts = repo.list_posts(&blog_id).await.unwrap();
        let first = posts.iter().find(|p| p.link.ends_with("/1")).unwrap();
        assert_eq!(first.tags.iter().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[tokio::test]
    async fn batch_for_unknown_blog_rolls_back() {
        let repo = Repository::open_in_memory().await.unwrap();
        let result = repo
            .insert_posts_batch(vec![post("missing-blog", 1, &[])])
            .await;

        assert!(result.is_err());
        assert_eq!(repo.count("SELECT COUNT(*) FROM posts WHERE blog_id = ?1", "missing-blog").await, 0);
    }

    #[tokio::test]
    async fn delete_cascades_and_clears_search_index() {
        let repo = Repository::open_in_memory().await.unwrap();
        let blog_id = repo.find_or_create_blog(new_blog("https://blog.example/feed")).await.unwrap();
        repo.insert_posts_batch(vec![post(&blog_id, 1, &["garden"])]).await.unwrap();
        let post_id = repo.list_posts(&blog_id).await.unwrap()[0].id.clone();
        repo.record_reading_session(&post_id, Utc::now(), 30).await;

        assert_eq!(repo.search_posts("gardening", 10).await.unwrap().len(), 1);
        assert!(repo.delete_blog(&blog_id).await.unwrap());

        assert!(repo.search_posts("gardening", 10).await.unwrap().is_empty());
        assert_eq!(repo.count("SELECT COUNT(*) FROM post_tags WHERE tag = ?1", "garden").await, 0);
        assert_eq!(repo.count("SELECT COUNT(*) FROM reading_sessions WHERE post_id = ?1", &post_id).await, 0);
        assert!(!repo.delete_blog(&blog_id).await.unwrap());
    }

    #[tokio::test]
    async fn reading_session_for_missing_post_is_swallowed() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.record_reading_session("nope", Utc::now(), 5).await;
        assert_eq!(repo.count("SELECT COUNT(*) FROM reading_sessions WHERE post_id = ?1", "nope").await, 0);
    }

    #[tokio::test]
    async fn summaries_drain_the_backlog_query() {
        let repo = Repository::open_in_memory().await.unwrap();
        let blog_id = repo.find_or_create_blog(new_blog("https://blog.example/feed")).await.unwrap();
        repo.insert_posts_batch(vec![post(&blog_id, 1, &[]), post(&blog_id, 2, &[])]).await.unwrap();

        let pending = repo.posts_missing_summary(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        repo.save_summary(&pending[0].0, "short".to_string()).await.unwrap();
        assert_eq!(repo.posts_missing_summary(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_job_rows_track_terminal_state() {
        let repo = Repository::open_in_memory().await.unwrap();
        let mut job = ImportJob::new("job-1".to_string(), "Example".to_string(), SourceKind::File);
        repo.insert_import_job(&job).await.unwrap();
        job.fail("bad file".to_string(), 10);
        repo.finish_import_job(&job).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            repo.count("SELECT COUNT(*) FROM import_jobs WHERE status = 'failed' AND id = ?1", "job-1").await,
            1
        );
    }
}
