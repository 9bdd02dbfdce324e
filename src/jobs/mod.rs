//! Import job tracking.
//!
//! One registry task owns every `ImportJob` record and is the only place
//! they are mutated. Everything else talks to it over a command channel:
//! importer tasks report progress through a `ProgressSink` that forwards
//! into the channel, and observers receive every new job set through a
//! `broadcast` channel, so a slow or dropped observer never affects the
//! others.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::JobSettings;
use crate::importer::{ImportContext, ImportRequest, ProgressSink};
use crate::models::{ImportJob, ImportProgress, JobStatus};
use crate::text;

pub type JobSnapshot = Arc<Vec<ImportJob>>;

/// Job sets buffered per observer before it starts missing updates.
const OBSERVER_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(String),
    /// A network import for the same blog is still running.
    AlreadyRunning,
}

enum Command {
    Start {
        request: ImportRequest,
        reply: oneshot::Sender<StartOutcome>,
    },
    Progress {
        job_id: String,
        progress: ImportProgress,
    },
    /// Current record of one job, `None` once dismissed.
    Lookup {
        job_id: String,
        reply: oneshot::Sender<Option<ImportJob>>,
    },
    Finished(ImportJob),
    Dismiss(String),
    Expire(String),
}

struct TrackedJob {
    job: ImportJob,
    dedupe_key: Option<String>,
}

/// State owned by the registry task.
struct Registry {
    ctx: ImportContext,
    settings: JobSettings,
    commands: mpsc::UnboundedSender<Command>,
    jobs: HashMap<String, TrackedJob>,
    removal_timers: HashMap<String, JoinHandle<()>>,
    current: watch::Sender<JobSnapshot>,
    events: broadcast::Sender<JobSnapshot>,
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Start { request, reply } => {
                    let outcome = self.start(request);
                    let _ = reply.send(outcome);
                }
                Command::Progress { job_id, progress } => {
                    if let Some(tracked) = self.jobs.get_mut(&job_id) {
                        tracked.job.apply_progress(progress, self.settings.log_cap);
                        self.publish();
                    }
                }
                Command::Lookup { job_id, reply } => {
                    let _ = reply.send(self.jobs.get(&job_id).map(|t| t.job.clone()));
                }
                Command::Finished(job) => self.finish(job),
                Command::Dismiss(job_id) => self.remove(&job_id, true),
                Command::Expire(job_id) => self.remove(&job_id, false),
            }
        }
        tracing::debug!("Job registry stopped");
    }

    fn start(&mut self, request: ImportRequest) -> StartOutcome {
        let dedupe_key = request.dedupe_key();
        if let Some(key) = &dedupe_key {
            let running = self
                .jobs
                .values()
                .any(|t| t.job.status == JobStatus::Running && t.dedupe_key.as_ref() == Some(key));
            if running {
                tracing::info!("Import of {} already running", key);
                return StartOutcome::AlreadyRunning;
            }
        }

        let job_id = text::new_id();
        let job = ImportJob::new(job_id.clone(), request.display_title(), request.kind());
        self.jobs.insert(
            job_id.clone(),
            TrackedJob {
                job: job.clone(),
                dedupe_key,
            },
        );
        self.publish();

        tracing::info!("Starting {} import job {}", request.kind(), job_id);
        let ctx = self.ctx.clone();
        let commands = self.commands.clone();
        let log_cap = self.settings.log_cap;
        tokio::spawn(run_job(ctx, commands, job, request, log_cap));

        StartOutcome::Started(job_id)
    }

    fn finish(&mut self, finished: ImportJob) {
        let Some(tracked) = self.jobs.get_mut(&finished.id) else {
            return;
        };
        if tracked.job.status.is_terminal() {
            return;
        }
        let completed = finished.status == JobStatus::Completed;
        let job_id = finished.id.clone();
        tracked.job = finished;

        // Failed jobs stay until dismissed.
        if completed {
            let commands = self.commands.clone();
            let id = job_id.clone();
            let grace = self.settings.grace_period();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = commands.send(Command::Expire(id));
            });
            self.removal_timers.insert(job_id, timer);
        }
        self.publish();
    }

    fn remove(&mut self, job_id: &str, cancel_timer: bool) {
        if let Some(timer) = self.removal_timers.remove(job_id) {
            if cancel_timer {
                timer.abort();
            }
        }
        if self.jobs.remove(job_id).is_some() {
            tracing::debug!("Removed import job {}", job_id);
            self.publish();
        }
    }

    fn publish(&self) {
        let mut jobs: Vec<ImportJob> = self.jobs.values().map(|t| t.job.clone()).collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        let snapshot = Arc::new(jobs);
        self.current.send_replace(snapshot.clone());
        // No receivers is fine.
        let _ = self.events.send(snapshot);
    }
}

/// Drive one import to its end. The terminal row is written even when the
/// job was dismissed while running, and before observers see the outcome.
async fn run_job(
    ctx: ImportContext,
    commands: mpsc::UnboundedSender<Command>,
    job: ImportJob,
    request: ImportRequest,
    log_cap: usize,
) {
    let job_id = job.id.clone();

    let result = match ctx.repo.insert_import_job(&job).await {
        Ok(()) => {
            let sink = progress_sink(commands.clone(), job_id.clone());
            request.run(&ctx, &sink).await
        }
        Err(e) => Err(e),
    };

    let (reply, latest) = oneshot::channel();
    let _ = commands.send(Command::Lookup {
        job_id: job_id.clone(),
        reply,
    });
    let mut finished = latest.await.ok().flatten().unwrap_or(job);

    match result {
        Ok(blog_id) => {
            finished.complete(blog_id, log_cap);
        }
        Err(e) => {
            tracing::error!("Import job {} failed: {}", job_id, e);
            finished.fail(e.to_string(), log_cap);
        }
    }
    if let Err(e) = ctx.repo.finish_import_job(&finished).await {
        tracing::warn!("Could not record outcome of job {}: {}", job_id, e);
    }

    let _ = commands.send(Command::Finished(finished));
}

fn progress_sink(commands: mpsc::UnboundedSender<Command>, job_id: String) -> ProgressSink {
    ProgressSink::new(move |progress: ImportProgress| {
        let _ = commands.send(Command::Progress {
            job_id: job_id.clone(),
            progress,
        });
    })
}

/// A live view of the job set. Yields the set as it was on subscription,
/// then one set per change. Dropping it unsubscribes.
pub struct Subscription {
    pending: Option<JobSnapshot>,
    rx: broadcast::Receiver<JobSnapshot>,
}

impl Subscription {
    /// `None` once the registry has stopped.
    pub async fn next(&mut self) -> Option<JobSnapshot> {
        if let Some(snapshot) = self.pending.take() {
            return Some(snapshot);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Job observer fell behind, skipped {} updates", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Cheap to clone; every clone talks to the same registry task.
#[derive(Clone)]
pub struct Orchestrator {
    commands: mpsc::UnboundedSender<Command>,
    current: watch::Receiver<JobSnapshot>,
    events: broadcast::Sender<JobSnapshot>,
}

impl Orchestrator {
    /// Spawn the registry task. Must be called inside a tokio runtime.
    pub fn init(ctx: ImportContext, settings: JobSettings) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (current_tx, current) = watch::channel(Arc::new(Vec::new()));
        let (events, _) = broadcast::channel(OBSERVER_BUFFER);

        let registry = Registry {
            ctx,
            settings,
            commands: commands.clone(),
            jobs: HashMap::new(),
            removal_timers: HashMap::new(),
            current: current_tx,
            events: events.clone(),
        };
        tokio::spawn(registry.run(rx));

        Self {
            commands,
            current,
            events,
        }
    }

    /// Register a job and launch its importer. Waits only for the registry
    /// to accept or refuse the job, never for import work.
    pub async fn start(&self, request: ImportRequest) -> StartOutcome {
        let (reply, outcome) = oneshot::channel();
        if self.commands.send(Command::Start { request, reply }).is_err() {
            tracing::error!("Job registry is not running");
            return StartOutcome::AlreadyRunning;
        }
        outcome.await.unwrap_or(StartOutcome::AlreadyRunning)
    }

    /// Remove a job and cancel its pending removal. Unknown ids are ignored.
    pub fn dismiss(&self, job_id: &str) {
        let _ = self.commands.send(Command::Dismiss(job_id.to_string()));
    }

    pub fn subscribe(&self) -> Subscription {
        // Subscribe before reading the current set so no change falls in
        // between; at worst one set arrives twice.
        let rx = self.events.subscribe();
        let pending = Some(self.current.borrow().clone());
        Subscription { pending, rx }
    }

    pub fn jobs(&self) -> JobSnapshot {
        self.current.borrow().clone()
    }
}
