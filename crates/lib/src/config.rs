//! Configuration types and loading.
//!
//! An optional JSON file (`--config` or `RELAY_CONFIG_PATH`) provides values, environment
//! variables override it, and the result is validated once into [`Settings`], which is passed
//! explicitly to every component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::DEFAULT_COMPLETIONS_URL;

pub const DEFAULT_QUEUE_URL: &str = "pulsar://localhost:6650";
pub const DEFAULT_SUBSCRIPTION: &str = "relay-subscription";

/// Top-level config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Optional HTTP health endpoint.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Broker connection and subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Broker URL. Overridden by PULSAR_URL.
    #[serde(default = "default_queue_url")]
    pub url: String,

    /// Token for broker authentication. Overridden by PULSAR_TOKEN.
    pub token: Option<String>,

    /// Topic to consume (required). Overridden by TOPIC.
    pub topic: Option<String>,

    /// Subscription name shared by all workers of one deployment. Overridden by RELAY_SUBSCRIPTION.
    #[serde(default = "default_subscription")]
    pub subscription: String,
}

/// Upstream completion API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Completions URL (default OpenAI chat completions). Overridden by OPENAI_API_URL.
    pub url: Option<String>,

    /// Bearer token (required). Overridden by OPENAI_API_KEY.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthConfig {
    /// Port for `GET /health`; disabled when unset. Overridden by HEALTH_PORT.
    pub port: Option<u16>,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_health_bind")]
    pub bind: String,
}

fn default_queue_url() -> String {
    DEFAULT_QUEUE_URL.to_string()
}

fn default_subscription() -> String {
    DEFAULT_SUBSCRIPTION.to_string()
}

fn default_health_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            token: None,
            topic: None,
            subscription: default_subscription(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind: default_health_bind(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not set (or {key} in the config file)")]
    Missing {
        var: &'static str,
        key: &'static str,
    },
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Validated, immutable process settings.
#[derive(Clone)]
pub struct Settings {
    pub queue_url: String,
    pub queue_token: Option<String>,
    pub topic: String,
    pub subscription: String,
    pub upstream_url: String,
    pub api_key: String,
    /// `bind:port` of the health endpoint, when enabled.
    pub health_addr: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("queue_url", &self.queue_url)
            .field("queue_token", &self.queue_token.as_ref().map(|_| "<redacted>"))
            .field("topic", &self.topic)
            .field("subscription", &self.subscription)
            .field("upstream_url", &self.upstream_url)
            .field("api_key", &"<redacted>")
            .field("health_addr", &self.health_addr)
            .finish()
    }
}

impl Settings {
    /// Validate a merged config: topic and API key are required.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let topic = trimmed(config.queue.topic.as_deref()).ok_or(ConfigError::Missing {
            var: "TOPIC",
            key: "queue.topic",
        })?;
        let api_key = trimmed(config.upstream.api_key.as_deref()).ok_or(ConfigError::Missing {
            var: "OPENAI_API_KEY",
            key: "upstream.apiKey",
        })?;
        let queue_url =
            trimmed(Some(config.queue.url.as_str())).unwrap_or_else(default_queue_url);
        let subscription = trimmed(Some(config.queue.subscription.as_str()))
            .unwrap_or_else(default_subscription);
        let upstream_url = trimmed(config.upstream.url.as_deref())
            .unwrap_or_else(|| DEFAULT_COMPLETIONS_URL.to_string());
        let health_addr = config
            .health
            .port
            .map(|port| format!("{}:{}", config.health.bind.trim(), port));
        Ok(Self {
            queue_url,
            queue_token: trimmed(config.queue.token.as_deref()),
            topic,
            subscription,
            upstream_url,
            api_key,
            health_addr,
        })
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Apply process environment overrides to `config`.
pub fn apply_env(config: &mut Config) -> Result<(), ConfigError> {
    apply_env_with(config, |var| std::env::var(var).ok())
}

/// Apply overrides from `env` (a variable lookup). Blank values are ignored.
pub fn apply_env_with<F>(config: &mut Config, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| trimmed(env(var).as_deref());
    if let Some(url) = get("PULSAR_URL") {
        config.queue.url = url;
    }
    if let Some(token) = get("PULSAR_TOKEN") {
        config.queue.token = Some(token);
    }
    if let Some(topic) = get("TOPIC") {
        config.queue.topic = Some(topic);
    }
    if let Some(subscription) = get("RELAY_SUBSCRIPTION") {
        config.queue.subscription = subscription;
    }
    if let Some(url) = get("OPENAI_API_URL") {
        config.upstream.url = Some(url);
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.upstream.api_key = Some(key);
    }
    if let Some(port) = get("HEALTH_PORT") {
        let parsed = port.parse::<u16>().map_err(|_| ConfigError::Invalid {
            var: "HEALTH_PORT",
            value: port.clone(),
        })?;
        config.health.port = Some(parsed);
    }
    Ok(())
}

/// Resolve config path from the argument or RELAY_CONFIG_PATH; none means no file.
pub fn config_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.or_else(|| {
        std::env::var("RELAY_CONFIG_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    })
}

/// Load the config file. No path or a missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let Some(path) = config_path(path) else {
        return Ok(Config::default());
    };
    if !path.exists() {
        log::warn!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let config = serde_json::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}
