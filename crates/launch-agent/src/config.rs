//! Agent configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by `main`)
//! 2. Values in a TOML file passed to `AgentConfig::load`
//! 3. Environment variables (`LAUNCH_*`)
//! 4. Built-in defaults
//!
//! Tokens are read, never stored or refreshed here.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use planner::EnvVar;
use serde::{Deserialize, Serialize};

const DEFAULT_HOSTING_URL: &str = "https://api.vercel.com";
const DEFAULT_SOURCE_URL: &str = "https://api.github.com";
const DEFAULT_TUNNEL_URL: &str = "http://127.0.0.1:4040/api";
const DEFAULT_TUNNEL_PROTO: &str = "http";
/// Local port the mobile bridge listens on.
const DEFAULT_MOBILE_PORT: u16 = 8787;
const DEFAULT_MOBILE_REPOSITORY: &str = "launchpad-dev/mobile-client";
const DEFAULT_MOBILE_BRANCH: &str = "main";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LIMIT: usize = 40;

const ENV_HOSTING_URL: &str = "LAUNCH_HOSTING_URL";
const ENV_HOSTING_TOKEN: &str = "LAUNCH_HOSTING_TOKEN";
const ENV_HOSTING_TEAM: &str = "LAUNCH_HOSTING_TEAM";
const ENV_SOURCE_URL: &str = "LAUNCH_SOURCE_URL";
const ENV_SOURCE_TOKEN: &str = "LAUNCH_SOURCE_TOKEN";
const ENV_TUNNEL_URL: &str = "LAUNCH_TUNNEL_URL";
const ENV_TUNNEL_TOKEN: &str = "LAUNCH_TUNNEL_TOKEN";
const ENV_MOBILE_PORT: &str = "LAUNCH_MOBILE_PORT";
const ENV_MOBILE_REPOSITORY: &str = "LAUNCH_MOBILE_REPOSITORY";
const ENV_POLL_INTERVAL_MS: &str = "LAUNCH_POLL_INTERVAL_MS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "LAUNCH_REQUEST_TIMEOUT_SECS";

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Hosting provider endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Team/organisation scope appended as `teamId`.
    pub team_id: Option<String>,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            base_url: env::var(ENV_HOSTING_URL).unwrap_or_else(|_| DEFAULT_HOSTING_URL.into()),
            token: env::var(ENV_HOSTING_TOKEN).ok(),
            team_id: env::var(ENV_HOSTING_TEAM).ok(),
        }
    }
}

/// Source repository (GitHub-compatible) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: env::var(ENV_SOURCE_URL).unwrap_or_else(|_| DEFAULT_SOURCE_URL.into()),
            token: env::var(ENV_SOURCE_TOKEN).ok(),
        }
    }
}

/// Tunnel agent API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub proto: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            api_url: env::var(ENV_TUNNEL_URL).unwrap_or_else(|_| DEFAULT_TUNNEL_URL.into()),
            token: env::var(ENV_TUNNEL_TOKEN).ok(),
            proto: DEFAULT_TUNNEL_PROTO.into(),
        }
    }
}

/// Mobile access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileConfig {
    /// Fixed local port exposed through the tunnel.
    pub local_port: u16,
    /// Default for `mobile deploy` when no repository is given (`owner/name`).
    pub client_repository: String,
    /// Default for `mobile deploy` when no `--branch` is given.
    pub client_branch: String,
}

impl Default for MobileConfig {
    fn default() -> Self {
        Self {
            local_port: env_parse(ENV_MOBILE_PORT).unwrap_or(DEFAULT_MOBILE_PORT),
            client_repository: env::var(ENV_MOBILE_REPOSITORY)
                .unwrap_or_else(|_| DEFAULT_MOBILE_REPOSITORY.into()),
            client_branch: DEFAULT_MOBILE_BRANCH.into(),
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub hosting: HostingConfig,
    pub source: SourceConfig,
    pub tunnel: TunnelConfig,
    pub mobile: MobileConfig,
    /// Fixed delay between deployment status polls.
    pub poll_interval_ms: u64,
    /// Per-request timeout for every provider call.
    pub request_timeout_secs: u64,
    /// Build log lines attached to a failed attempt.
    pub log_limit: usize,
    /// General deployment environment; per-call overrides win.
    pub env: BTreeMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hosting: HostingConfig::default(),
            source: SourceConfig::default(),
            tunnel: TunnelConfig::default(),
            mobile: MobileConfig::default(),
            poll_interval_ms: env_parse(ENV_POLL_INTERVAL_MS).unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            request_timeout_secs: env_parse(ENV_REQUEST_TIMEOUT_SECS)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_limit: DEFAULT_LOG_LIMIT,
            env: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    /// Load a TOML file; missing keys fall back to environment/defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be positive");
        anyhow::ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );
        anyhow::ensure!(self.mobile.local_port > 0, "mobile.local_port must be positive");
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// General environment as deployment variables, sorted by key.
    pub fn general_env(&self) -> Vec<EnvVar> {
        self.env
            .iter()
            .map(|(key, value)| EnvVar::new(key.as_str(), value.as_str()))
            .collect()
    }
}
