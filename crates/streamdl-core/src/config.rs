use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default User-Agent handed to the fetch tool.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of fetch attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_secs: 5.0,
            max_delay_secs: 300,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/streamdl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamdlConfig {
    /// Worker pool capacity (fetches running at once).
    pub max_concurrent_fetches: usize,
    /// Thread count passed to the fetch tool.
    pub fetch_threads: u32,
    /// User-Agent passed to the fetch tool.
    pub user_agent: String,
    /// Wall-clock bound for one fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// Upper bound of the drain wait, in seconds.
    pub drain_timeout_secs: u64,
    /// Temp files older than this many days are evicted on drain.
    pub temp_retention_days: u64,
    /// Period of the active-job monitor log line, in seconds.
    pub monitor_interval_secs: u64,
    /// Final artifacts land under `<videos_dir>/<site>/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub videos_dir: Option<PathBuf>,
    /// In-progress artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// SQLite ledger file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
    /// Append-only list of completed titles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_exclusions: Option<PathBuf>,
    /// Append-only list of completed/blocked URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_exclusions: Option<PathBuf>,
    /// Fetch tool binary; discovered on PATH when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_binary: Option<PathBuf>,
    /// Optional retry policy; if missing, failed fetches are not retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl Default for StreamdlConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 5,
            fetch_threads: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: 3600,
            drain_timeout_secs: 7200,
            temp_retention_days: 7,
            monitor_interval_secs: 5,
            videos_dir: None,
            temp_dir: None,
            ledger_path: None,
            title_exclusions: None,
            url_exclusions: None,
            executor_binary: None,
            retry: None,
        }
    }
}

/// Every storage location with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub videos_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub title_exclusions: PathBuf,
    pub url_exclusions: PathBuf,
}

impl StoragePaths {
    /// Default layout rooted at `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            videos_dir: root.join("videos"),
            temp_dir: root.join("temp_downloads"),
            ledger_path: root.join("downloads.db"),
            title_exclusions: root.join("excluded_titles.txt"),
            url_exclusions: root.join("excluded_urls.txt"),
        }
    }
}

impl StreamdlConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn temp_retention(&self) -> Duration {
        Duration::from_secs(self.temp_retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    /// Resolve unset locations under the XDG data home (`~/.local/share/streamdl`).
    pub fn resolve_paths(&self) -> Result<StoragePaths> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("streamdl")?;
        Ok(self.resolve_paths_under(&xdg_dirs.get_data_home()))
    }

    /// Resolve unset locations under an explicit root.
    pub fn resolve_paths_under(&self, root: &Path) -> StoragePaths {
        let defaults = StoragePaths::under(root);
        StoragePaths {
            videos_dir: self.videos_dir.clone().unwrap_or(defaults.videos_dir),
            temp_dir: self.temp_dir.clone().unwrap_or(defaults.temp_dir),
            ledger_path: self.ledger_path.clone().unwrap_or(defaults.ledger_path),
            title_exclusions: self
                .title_exclusions
                .clone()
                .unwrap_or(defaults.title_exclusions),
            url_exclusions: self
                .url_exclusions
                .clone()
                .unwrap_or(defaults.url_exclusions),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("streamdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<StreamdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = StreamdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}

/// Load configuration from an explicit file (no default file is written).
pub fn load_from_path(path: &Path) -> Result<StreamdlConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: StreamdlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
