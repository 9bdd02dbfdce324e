//! Source importers. Each strategy discovers posts, then goes through the
//! same batched persistence path, so all three share one storage contract.

mod file;
mod history;
mod wayback;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ImportSettings;
use crate::db::{BatchOutcome, Repository};
use crate::error::Result;
use crate::feed::HttpTransport;
use crate::models::{DiscoveredPost, ImportProgress, NewPost, SourceKind};
use crate::text;

pub use file::{export_blog, import_file, write_export};
pub use history::import_history;
pub use wayback::import_wayback;

/// Shared handles every importer runs against.
#[derive(Clone)]
pub struct ImportContext {
    pub repo: Repository,
    pub http: Arc<dyn HttpTransport>,
    pub settings: ImportSettings,
}

/// Optional receiver of progress events. Cloning shares the same callback.
#[derive(Clone, Default)]
pub struct ProgressSink(Option<Arc<dyn Fn(ImportProgress) + Send + Sync>>);

impl ProgressSink {
    pub fn new(f: impl Fn(ImportProgress) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, progress: ImportProgress) {
        if let Some(f) = &self.0 {
            f(progress);
        }
    }
}

/// What the caller asked to import.
#[derive(Debug, Clone)]
pub enum ImportRequest {
    Wayback { feed_url: String },
    HistoryApi { api_base: String, feed_url: String },
    File { path: PathBuf },
}

impl ImportRequest {
    pub fn kind(&self) -> SourceKind {
        match self {
            ImportRequest::Wayback { .. } => SourceKind::Wayback,
            ImportRequest::HistoryApi { .. } => SourceKind::HistoryApi,
            ImportRequest::File { .. } => SourceKind::File,
        }
    }

    /// Key used to refuse a second concurrent import of the same blog.
    /// File imports have no stable URL and are never deduplicated.
    pub fn dedupe_key(&self) -> Option<String> {
        match self {
            ImportRequest::Wayback { feed_url } | ImportRequest::HistoryApi { feed_url, .. } => {
                Some(text::source_key(feed_url))
            }
            ImportRequest::File { .. } => None,
        }
    }

    pub fn display_title(&self) -> String {
        match self {
            ImportRequest::Wayback { feed_url } | ImportRequest::HistoryApi { feed_url, .. } => {
                feed_url.clone()
            }
            ImportRequest::File { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    /// Run the matching importer to completion. Returns the blog id.
    pub async fn run(&self, ctx: &ImportContext, sink: &ProgressSink) -> Result<String> {
        match self {
            ImportRequest::Wayback { feed_url } => import_wayback(ctx, feed_url, sink).await,
            ImportRequest::HistoryApi { api_base, feed_url } => {
                import_history(ctx, api_base, feed_url, sink).await
            }
            ImportRequest::File { path } => import_file(ctx, path, sink).await,
        }
    }
}

/// Discovered posts in discovery order, unique by link. The first post seen
/// for a link wins.
#[derive(Debug, Default)]
pub struct PostSet {
    seen: HashSet<String>,
    posts: Vec<DiscoveredPost>,
}

impl PostSet {
    pub fn insert(&mut self, post: DiscoveredPost) -> bool {
        if post.link.is_empty() || !self.seen.insert(post.link.clone()) {
            return false;
        }
        self.posts.push(post);
        true
    }

    /// Add every post not already present; returns how many were new.
    pub fn extend(&mut self, posts: impl IntoIterator<Item = DiscoveredPost>) -> usize {
        let mut added = 0;
        for post in posts {
            if self.insert(post) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn into_posts(self) -> Vec<DiscoveredPost> {
        self.posts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub saved: usize,
    pub inserted: usize,
    pub failed_batches: usize,
}

/// Store one batch in one transaction. A failed batch is logged and
/// reported as `None`; it never aborts the caller.
async fn save_batch(
    ctx: &ImportContext,
    blog_id: &str,
    posts: Vec<DiscoveredPost>,
) -> Option<BatchOutcome> {
    let count = posts.len();
    let batch: Vec<NewPost> = posts
        .into_iter()
        .map(|p| NewPost::from_discovered(blog_id, p))
        .collect();

    match ctx.repo.insert_posts_batch(batch).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!("Batch of {} posts rolled back: {}", count, e);
            None
        }
    }
}

/// Persist posts in fixed-size batches, strictly in order, reporting
/// progress after each batch.
pub async fn persist_posts(
    ctx: &ImportContext,
    blog_id: &str,
    posts: Vec<DiscoveredPost>,
    sink: &ProgressSink,
) -> PersistSummary {
    let total = posts.len();
    let batch_size = ctx.settings.batch_size.max(1);
    let mut summary = PersistSummary::default();
    let mut remaining = posts.into_iter();

    loop {
        let batch: Vec<DiscoveredPost> = remaining.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }

        match save_batch(ctx, blog_id, batch).await {
            Some(outcome) => {
                summary.saved += outcome.saved;
                summary.inserted += outcome.inserted;
            }
            None => summary.failed_batches += 1,
        }

        sink.emit(
            ImportProgress::new("saving", format!("Saved {} of {} posts", summary.saved, total))
                .with_counts(summary.saved, total),
        );
    }

    if summary.failed_batches > 0 {
        tracing::warn!(
            "{} of {} posts saved; {} batches failed",
            summary.saved,
            total,
            summary.failed_batches
        );
    }
    summary
}
