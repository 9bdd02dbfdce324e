use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Wayback,
    HistoryApi,
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Wayback => "wayback",
            SourceKind::HistoryApi => "history_api",
            SourceKind::File => "file",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wayback" => Ok(SourceKind::Wayback),
            "history_api" => Ok(SourceKind::HistoryApi),
            "file" => Ok(SourceKind::File),
            other => Err(format!("unknown import source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// One progress report from an importer. Delivery is best effort and in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportProgress {
    pub phase: String,
    pub total_items: usize,
    pub imported_items: usize,
    pub message: String,
    pub discovered_title: Option<String>,
}

impl ImportProgress {
    pub fn new(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_counts(mut self, imported_items: usize, total_items: usize) -> Self {
        self.imported_items = imported_items;
        self.total_items = total_items;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.discovered_title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub blog_id: Option<String>,
    pub title: String,
    pub source: SourceKind,
    pub status: JobStatus,
    pub phase: String,
    pub total_items: usize,
    pub imported_items: usize,
    pub message: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub log: VecDeque<String>,
}

impl ImportJob {
    pub fn new(id: String, title: String, source: SourceKind) -> Self {
        Self {
            id,
            blog_id: None,
            title,
            source,
            status: JobStatus::Running,
            phase: "starting".to_string(),
            total_items: 0,
            imported_items: 0,
            message: String::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            log: VecDeque::new(),
        }
    }

    /// Fold a progress event into the record. Ignored once the job is terminal.
    pub fn apply_progress(&mut self, progress: ImportProgress, log_cap: usize) {
        if self.status.is_terminal() {
            return;
        }
        self.phase = progress.phase;
        self.total_items = progress.total_items;
        self.imported_items = progress.imported_items;
        if let Some(title) = progress.discovered_title {
            self.title = title;
        }
        if !progress.message.is_empty() {
            self.push_log(progress.message.clone(), log_cap);
            self.message = progress.message;
        }
    }

    pub fn complete(&mut self, blog_id: String, log_cap: usize) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.phase = "completed".to_string();
        self.blog_id = Some(blog_id);
        self.completed_at = Some(Utc::now());
        self.push_log("Import completed".to_string(), log_cap);
        true
    }

    pub fn fail(&mut self, error: String, log_cap: usize) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.phase = "failed".to_string();
        self.message = error.clone();
        self.push_log(format!("Failed: {}", error), log_cap);
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        true
    }

    fn push_log(&mut self, line: String, log_cap: usize) {
        self.log.push_back(line);
        while self.log.len() > log_cap {
            self.log.pop_front();
        }
    }
}
