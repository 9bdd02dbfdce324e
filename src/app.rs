use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;

use crate::analysis::{self, BacklogReport, SimilarPost};
use crate::config::Config;
use crate::db::{Repository, SearchHit};
use crate::error::{AppError, Result};
use crate::feed::FeedFetcher;
use crate::importer::{self, ImportContext, ImportRequest};
use crate::jobs::{Orchestrator, StartOutcome};
use crate::models::{Blog, ImportJob, JobStatus};

pub struct App {
    config: Config,
    pub repository: Repository,
    orchestrator: Orchestrator,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        if let Some(parent) = Path::new(&config.db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let repository = Repository::new(&config.db_path).await?;
        let fetcher = FeedFetcher::new(&config.import)?;

        let ctx = ImportContext {
            repo: repository.clone(),
            http: Arc::new(fetcher),
            settings: config.import.clone(),
        };
        let orchestrator = Orchestrator::init(ctx, config.jobs.clone());

        Ok(Self {
            config,
            repository,
            orchestrator,
        })
    }

    /// Start every request, print progress as it arrives, and wait until all
    /// started jobs have settled. Returns the final state of each job.
    pub async fn run_imports(&self, requests: Vec<ImportRequest>) -> Vec<ImportJob> {
        let mut job_ids = Vec::new();
        for request in requests {
            let title = request.display_title();
            match self.orchestrator.start(request).await {
                StartOutcome::Started(id) => job_ids.push(id),
                StartOutcome::AlreadyRunning => println!("{}: already being imported", title),
            }
        }

        let waits = job_ids.iter().map(|id| self.watch_job(id));
        join_all(waits).await.into_iter().flatten().collect()
    }

    /// Print one job's progress until it settles.
    async fn watch_job(&self, job_id: &str) -> Option<ImportJob> {
        let mut subscription = self.orchestrator.subscribe();
        let mut last_message = String::new();

        while let Some(jobs) = subscription.next().await {
            let job = jobs.iter().find(|j| j.id == job_id).cloned()?;

            if job.message != last_message && !job.message.is_empty() {
                println!("[{}] {}: {}", job.title, job.phase, job.message);
                last_message = job.message.clone();
            }
            if job.status.is_terminal() {
                if job.status == JobStatus::Failed {
                    println!("[{}] failed: {}", job.title, job.error.as_deref().unwrap_or("unknown error"));
                }
                self.orchestrator.dismiss(job_id);
                return Some(job);
            }
        }
        None
    }

    pub async fn summarize_backlog(&self) -> Result<BacklogReport> {
        analysis::summarize_backlog(&self.repository, &self.config.analysis).await
    }

    pub async fn similar(&self, post_id: &str, n: usize) -> Result<Vec<SimilarPost>> {
        analysis::similar_posts(&self.repository, post_id, n, self.config.analysis.similarity_floor).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.repository.search_posts(query, 20).await
    }

    pub async fn blogs(&self) -> Result<Vec<Blog>> {
        self.repository.list_blogs().await
    }

    pub async fn export(&self, blog_id: &str, path: &Path) -> Result<usize> {
        let export = importer::export_blog(&self.repository, blog_id).await?;
        importer::write_export(&export, path).await?;
        Ok(export.articles.len())
    }

    pub async fn delete(&self, blog_id: &str) -> Result<()> {
        if self.repository.delete_blog(blog_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("blog {}", blog_id)))
        }
    }

    /// Record that a post was read just now.
    pub async fn mark_read(&self, post_id: &str, seconds: u64) {
        let started = Utc::now() - chrono::Duration::seconds(seconds as i64);
        self.repository.record_reading_session(post_id, started, seconds).await;
    }
}
