//! Core data model shared by the planner and the async agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

// ── Repository ──────────────────────────────────────────────────────────────

/// `owner/name` reference to a source repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`, tolerating a trailing `.git` and surrounding slashes.
    pub fn parse(input: &str) -> Result<Self, DeployError> {
        let trimmed = input.trim().trim_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(owner, name))
            }
            _ => Err(DeployError::InvalidRepository(input.to_string())),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ── Environment ─────────────────────────────────────────────────────────────

/// Hosting environment an env var applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvTarget {
    Production,
    Preview,
    Development,
}

impl EnvTarget {
    pub const ALL: [EnvTarget; 3] = [Self::Production, Self::Preview, Self::Development];
}

/// One deployment environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    pub targets: Vec<EnvTarget>,
}

impl EnvVar {
    /// Variable applied to every target scope.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            targets: EnvTarget::ALL.to_vec(),
        }
    }

    pub fn with_targets(mut self, targets: &[EnvTarget]) -> Self {
        self.targets = targets.to_vec();
        self
    }
}

/// Merge `overrides` on top of `base`.
///
/// Keys keep the position of their first appearance in `base`; an override
/// replaces the base entry in place. Override keys absent from `base` are
/// appended in override order.
pub fn merge_env(base: &[EnvVar], overrides: &[EnvVar]) -> Vec<EnvVar> {
    let mut merged: Vec<EnvVar> = Vec::with_capacity(base.len() + overrides.len());
    for var in base.iter().chain(overrides) {
        match merged.iter_mut().find(|existing| existing.key == var.key) {
            Some(existing) => *existing = var.clone(),
            None => merged.push(var.clone()),
        }
    }
    merged
}

// ── Framework ───────────────────────────────────────────────────────────────

/// Frameworks recognised by root detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    NextJs,
    Nuxt,
    SvelteKit,
    Astro,
    Vite,
    Expo,
    Node,
    Python,
    Static,
}

/// Default commands for a framework-defaulted strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkCommands {
    pub install: Option<&'static str>,
    pub build: &'static str,
    pub start: &'static str,
    pub output: Option<&'static str>,
}

impl Framework {
    /// Provider-facing framework slug.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::NextJs => "nextjs",
            Self::Nuxt => "nuxtjs",
            Self::SvelteKit => "sveltekit",
            Self::Astro => "astro",
            Self::Vite => "vite",
            Self::Expo => "expo",
            Self::Node => "node",
            Self::Python => "python",
            Self::Static => "static",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.trim().to_ascii_lowercase().as_str() {
            "nextjs" | "next" => Some(Self::NextJs),
            "nuxtjs" | "nuxt" => Some(Self::Nuxt),
            "sveltekit" | "svelte" => Some(Self::SvelteKit),
            "astro" => Some(Self::Astro),
            "vite" => Some(Self::Vite),
            "expo" => Some(Self::Expo),
            "node" => Some(Self::Node),
            "python" => Some(Self::Python),
            "static" => Some(Self::Static),
            _ => None,
        }
    }

    /// `true` for frameworks identified by a dedicated config file rather
    /// than a generic manifest.
    pub fn is_specific(&self) -> bool {
        !matches!(self, Self::Node | Self::Python | Self::Static)
    }

    pub fn commands(&self) -> FrameworkCommands {
        match self {
            Self::NextJs => FrameworkCommands {
                install: Some("npm install"),
                build: "npm run build",
                start: "npm run start",
                output: Some(".next"),
            },
            Self::Nuxt => FrameworkCommands {
                install: Some("npm install"),
                build: "npm run build",
                start: "node .output/server/index.mjs",
                output: Some(".output"),
            },
            Self::SvelteKit => FrameworkCommands {
                install: Some("npm install"),
                build: "npm run build",
                start: "node build",
                output: Some("build"),
            },
            Self::Astro | Self::Vite => FrameworkCommands {
                install: Some("npm install"),
                build: "npm run build",
                start: "npm run preview",
                output: Some("dist"),
            },
            Self::Expo => FrameworkCommands {
                install: Some("npm install"),
                build: "npx expo export --platform web",
                start: "npx serve dist",
                output: Some("dist"),
            },
            Self::Node => FrameworkCommands {
                install: Some("npm install"),
                build: "npm run build --if-present",
                start: "npm start",
                output: None,
            },
            Self::Python => FrameworkCommands {
                install: Some("pip install -r requirements.txt"),
                build: "python -m compileall -q .",
                start: "python main.py",
                output: None,
            },
            Self::Static => FrameworkCommands {
                install: None,
                build: "echo 'static site, nothing to build'",
                start: "npx serve .",
                output: Some("."),
            },
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

// ── Strategy ────────────────────────────────────────────────────────────────

/// One candidate deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStrategy {
    /// Unique within one `StrategyBuilder::build` call.
    pub label: String,
    /// `None` deploys from the repository root.
    pub root_directory: Option<String>,
    pub build_command: String,
    pub start_command: String,
    pub install_command: Option<String>,
    pub output_directory: Option<String>,
    pub framework: Option<Framework>,
    pub env: Vec<EnvVar>,
}

// ── Deployment status ───────────────────────────────────────────────────────

/// Remote build state reported by the hosting provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Queued,
    Building,
    Ready,
    Error,
    Canceled,
}

impl DeploymentStatus {
    /// READY, ERROR and CANCELED have no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error | Self::Canceled)
    }

    /// Parse a provider state string. `INITIALIZING` counts as building.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "BUILDING" | "INITIALIZING" => Some(Self::Building),
            "READY" => Some(Self::Ready),
            "ERROR" => Some(Self::Error),
            "CANCELED" | "CANCELLED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Building => write!(f, "BUILDING"),
            Self::Ready => write!(f, "READY"),
            Self::Error => write!(f, "ERROR"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// One observation of a deployment's remote state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: DeploymentStatus) -> Self {
        Self {
            status,
            url: None,
            inspector_url: None,
            error_code: None,
            error_message: None,
        }
    }
}

// ── Attempt ─────────────────────────────────────────────────────────────────

/// A started remote deployment for one strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    pub strategy_index: usize,
    pub deployment_id: String,
    pub project_id: String,
    pub status: DeploymentStatus,
    pub url: Option<String>,
    pub inspector_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DeploymentAttempt {
    pub fn started(
        strategy_index: usize,
        deployment_id: impl Into<String>,
        project_id: impl Into<String>,
        status: DeploymentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            strategy_index,
            deployment_id: deployment_id.into(),
            project_id: project_id.into(),
            status,
            url: None,
            inspector_url: None,
            error_code: None,
            error_message: None,
            started_at: now,
            ended_at: status.is_terminal().then_some(now),
        }
    }

    /// Fold a poll observation into the attempt. Once terminal the attempt
    /// no longer changes.
    pub fn apply(&mut self, update: &StatusUpdate) {
        if self.is_terminal() {
            return;
        }
        self.status = update.status;
        if update.url.is_some() {
            self.url = update.url.clone();
        }
        if update.inspector_url.is_some() {
            self.inspector_url = update.inspector_url.clone();
        }
        self.error_code = update.error_code.clone();
        self.error_message = update.error_message.clone();
        if update.status.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ── Tunnel ──────────────────────────────────────────────────────────────────

/// Local, advisory copy of a tunnel owned by the tunnel provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRecord {
    pub id: String,
    pub public_url: String,
    pub local_port: u16,
    pub created_at: DateTime<Utc>,
    /// Whether presence was confirmed against the provider.
    pub verified: bool,
}

/// A tunnel paired with the deployment that points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileDeployment {
    pub tunnel: TunnelRecord,
    pub deployment: DeploymentAttempt,
    pub repository: RepoRef,
    pub branch: String,
}
