use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub import: ImportSettings,

    #[serde(default)]
    pub jobs: JobSettings,

    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Network and persistence knobs shared by every importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Hard cap on live feed pages crawled after the first one.
    pub max_pages: u32,
    pub page_delay_ms: u64,
    /// Upper bound on archive snapshots fetched per import.
    pub max_snapshots: usize,
    pub snapshot_delay_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub cdx_endpoint: String,
    pub archive_base: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// How long a completed job stays visible before it is dropped.
    pub grace_period_secs: u64,
    pub log_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub summary_sentences: usize,
    pub similarity_floor: f64,
    pub yield_every: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blog-archiver");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("archive.db").to_string_lossy().to_string()
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            user_agent: "blog-archiver/0.1".to_string(),
            request_timeout_secs: 30,
            max_pages: 50,
            page_delay_ms: 500,
            max_snapshots: 60,
            snapshot_delay_ms: 1000,
            max_retries: 4,
            backoff_base_ms: 2000,
            cdx_endpoint: "https://web.archive.org/cdx/search/cdx".to_string(),
            archive_base: "https://web.archive.org/web".to_string(),
            batch_size: 50,
        }
    }
}

impl ImportSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn snapshot_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_delay_ms)
    }

    /// Backoff before retry number `attempt` (zero based): base, 2x base, 4x base...
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: 60,
            log_cap: 50,
        }
    }
}

impl JobSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            summary_sentences: 3,
            similarity_floor: 0.05,
            yield_every: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            import: ImportSettings::default(),
            jobs: JobSettings::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.import.batch_size == 0 {
            return Err(AppError::Config("import.batch_size must be at least 1".to_string()));
        }
        if self.import.max_snapshots < 2 {
            return Err(AppError::Config("import.max_snapshots must be at least 2".to_string()));
        }
        if self.analysis.summary_sentences == 0 {
            return Err(AppError::Config("analysis.summary_sentences must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blog-archiver")
            .join("config.toml")
    }
}
