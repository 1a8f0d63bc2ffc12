use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::DownloadOptions;
use crate::planner::{ChunkPolicy, DEFAULT_CHUNK_SIZE};
use crate::retry::RetryPolicy;
use crate::transport::TransportOptions;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/73.0.3631.0 Safari/537.36";

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (including the first).
    pub max_attempts: u32,
    /// Delay added per failed attempt, in milliseconds.
    pub delay_step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_step_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay_step: Duration::from_millis(self.delay_step_ms),
        }
    }
}

/// Global configuration loaded from `~/.config/fatpipe/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatpipeConfig {
    /// Maximum concurrent range requests.
    pub concurrency: usize,
    /// Requested chunk size in bytes; 5000000 means "adapt to the resource".
    pub chunk_size: u64,
    /// Value of the `user-agent` request header.
    pub user_agent: String,
    /// Hide progress output.
    pub silent: bool,
    pub retry: RetryConfig,
    /// Options merged into every request.
    pub transport: TransportOptions,
}

impl Default for FatpipeConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            silent: false,
            retry: RetryConfig::default(),
            transport: TransportOptions::default(),
        }
    }
}

impl FatpipeConfig {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk size must be at least 1 byte");
        }
        Ok(())
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            concurrency: self.concurrency,
            chunk_size: self.chunk_size,
            chunk_policy: ChunkPolicy::default(),
        }
    }

    /// Deep-merges a JSON object onto the `[transport]` table. Objects merge
    /// key by key (so header maps extend); every other value replaces.
    pub fn merge_transport_json(&mut self, json: &str) -> Result<()> {
        let patch: serde_json::Value =
            serde_json::from_str(json).context("transport options are not valid JSON")?;
        if !patch.is_object() {
            anyhow::bail!("transport options must be a JSON object");
        }
        let mut base = serde_json::to_value(&self.transport)?;
        deep_merge(&mut base, patch);
        self.transport = serde_json::from_value(base).context("invalid transport options")?;
        Ok(())
    }
}

fn deep_merge(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (k, v) in patch {
                deep_merge(base.entry(k).or_insert(serde_json::Value::Null), v);
            }
        }
        (base, patch) => *base = patch,
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fatpipe")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FatpipeConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FatpipeConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: FatpipeConfig =
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}
