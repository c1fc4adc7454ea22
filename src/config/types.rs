//! Configuration types.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port for the REST server.
pub const DEFAULT_PORT: u16 = 3100;

/// Default OpenClaw gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:18789";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// HTTP server and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Initial retry delay in milliseconds when the listener cannot bind (default: 15000).
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Jitter range in milliseconds for the retry delay (default: 5000, meaning ±5s).
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Maximum retry interval in milliseconds (default: 240000 = 4 minutes).
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            retry_max_ms: default_retry_max_ms(),
            retry_multiplier: default_retry_multiplier(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/mission-control.db")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_retry_initial_ms() -> u64 {
    15_000
}

fn default_retry_jitter_ms() -> u64 {
    5_000
}

fn default_retry_max_ms() -> u64 {
    240_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

/// Connection to the agent-orchestration gateway and spawn defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Bearer token; empty means unauthenticated.
    #[serde(default)]
    pub token: String,

    /// Upper bound for every gateway call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Agent used when neither the request nor the task names one.
    #[serde(default = "default_agent")]
    pub default_agent: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_thinking")]
    pub thinking: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
            default_agent: default_agent(),
            model: default_model(),
            thinking: default_thinking(),
        }
    }
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_agent() -> String {
    "coder".to_string()
}

fn default_model() -> String {
    "anthropic/claude-opus-4-6".to_string()
}

fn default_thinking() -> String {
    "low".to_string()
}

/// What the reconciliation engine does with a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Move the task straight to `done`.
    AutoClose,
    /// Leave the task in progress and flag it for human review.
    #[default]
    FlagOnly,
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Run the periodic loop inside `serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// A session missing from the listing is presumed finished only after
    /// the task has been idle this long.
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,

    /// A missing session with too little history is finalized only after
    /// this long.
    #[serde(default = "default_vanish_confirm_secs")]
    pub vanish_confirm_secs: u64,

    #[serde(default = "default_min_history_messages")]
    pub min_history_messages: usize,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Output is cut to this many characters.
    #[serde(default = "default_output_max_chars")]
    pub output_max_chars: usize,

    #[serde(default)]
    pub completion_policy: CompletionPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            grace_window_secs: default_grace_window_secs(),
            vanish_confirm_secs: default_vanish_confirm_secs(),
            min_history_messages: default_min_history_messages(),
            history_limit: default_history_limit(),
            output_max_chars: default_output_max_chars(),
            completion_policy: CompletionPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    15
}

fn default_grace_window_secs() -> u64 {
    300
}

fn default_vanish_confirm_secs() -> u64 {
    600
}

fn default_min_history_messages() -> usize {
    1
}

fn default_history_limit() -> usize {
    10
}

fn default_output_max_chars() -> usize {
    2000
}

impl Config {
    /// Load a single configuration file, without tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.url.trim().is_empty() {
            bail!("gateway.url must not be empty");
        }
        if self.gateway.timeout_secs == 0 {
            bail!("gateway.timeout_secs must be greater than zero");
        }
        if self.reconcile.interval_secs == 0 {
            bail!("reconcile.interval_secs must be greater than zero");
        }
        if self.reconcile.output_max_chars == 0 {
            bail!("reconcile.output_max_chars must be greater than zero");
        }
        if self.server.retry_multiplier < 1.0 {
            bail!("server.retry_multiplier must be at least 1.0");
        }
        Ok(())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.gateway.url, "http://127.0.0.1:18789");
        assert_eq!(config.gateway.default_agent, "coder");
        assert_eq!(config.reconcile.grace_window_secs, 300);
        assert_eq!(config.reconcile.vanish_confirm_secs, 600);
        assert_eq!(config.reconcile.completion_policy, CompletionPolicy::FlagOnly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config: Config = serde_yaml::from_str(
            "reconcile:\n  completion_policy: auto_close\n  grace_window_secs: 120\n",
        )
        .unwrap();
        assert_eq!(config.reconcile.completion_policy, CompletionPolicy::AutoClose);
        assert_eq!(config.reconcile.grace_window_secs, 120);
        assert_eq!(config.reconcile.history_limit, 10);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = Config::default();
        config.reconcile.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn short_confirm_window_is_accepted() {
        let mut config = Config::default();
        config.reconcile.grace_window_secs = 120;
        config.reconcile.vanish_confirm_secs = 60;
        assert!(config.validate().is_ok());
    }
}
