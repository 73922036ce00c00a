//! External collaborators: hosting, source repository and tunnel providers.
//!
//! Each collaborator is a trait so the orchestration layer can run against
//! the HTTP clients in this module or against in-process fakes in tests.
//!
//! | Trait              | HTTP client            | Backing API                    |
//! |--------------------|------------------------|--------------------------------|
//! | `HostingProvider`  | `HttpHostingProvider`  | REST deployments API           |
//! | `SourceRepository` | `GitHubSource`         | GitHub REST v3                 |
//! | `TunnelProvider`   | `AgentTunnelProvider`  | local tunnel agent `/api`      |

pub mod hosting;
pub mod source;
pub mod tunnel;

use async_trait::async_trait;
use planner::{Detection, DeploymentStatus, EnvVar, Framework, RepoRef, StatusUpdate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hosting::HttpHostingProvider;
pub use source::GitHubSource;
pub use tunnel::AgentTunnelProvider;

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connect, timeout or other transport failure.
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Response arrived but could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Turn a non-success response into `ProviderError::Status`, keeping a
/// bounded excerpt of the body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let mut message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    Err(ProviderError::Status {
        status: status.as_u16(),
        message,
    })
}

// ── Hosting ─────────────────────────────────────────────────────────────────

/// Fields sent to the hosting provider's create-deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    pub repository: RepoRef,
    pub branch: String,
    pub root_directory: Option<String>,
    pub build_command: String,
    pub start_command: String,
    pub install_command: Option<String>,
    pub output_directory: Option<String>,
    pub framework: Option<Framework>,
    pub env: Vec<EnvVar>,
}

/// Provider answer to a successful create-deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDeployment {
    pub deployment_id: String,
    pub project_id: String,
    pub status: DeploymentStatus,
    pub url: Option<String>,
    pub inspector_url: Option<String>,
}

#[async_trait]
pub trait HostingProvider: Send + Sync {
    async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<CreatedDeployment, ProviderError>;

    async fn deployment_status(&self, deployment_id: &str) -> Result<StatusUpdate, ProviderError>;

    /// Most recent `limit` build log lines, oldest first.
    async fn deployment_logs(
        &self,
        deployment_id: &str,
        limit: usize,
    ) -> Result<String, ProviderError>;

    /// Upsert project-level environment variables.
    async fn update_environment(
        &self,
        project_id: &str,
        env: &[EnvVar],
    ) -> Result<(), ProviderError>;
}

// ── Source repository ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub default_branch: String,
    pub private: bool,
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// `Ok(None)` when the repository does not exist or is not visible.
    async fn get_repository(&self, repo: &RepoRef)
        -> Result<Option<RepositoryInfo>, ProviderError>;

    /// Deployable root directories found by file-marker probing.
    async fn root_candidates(&self, repo: &RepoRef, branch: &str)
        -> Result<Detection, ProviderError>;
}

// ── Tunnel ──────────────────────────────────────────────────────────────────

/// A tunnel as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTunnel {
    pub id: String,
    pub public_url: String,
    pub local_port: Option<u16>,
}

#[async_trait]
pub trait TunnelProvider: Send + Sync {
    async fn create_tunnel(&self, port: u16, proto: &str) -> Result<RemoteTunnel, ProviderError>;

    async fn list_tunnels(&self) -> Result<Vec<RemoteTunnel>, ProviderError>;

    /// `Ok(None)` when the provider has no tunnel with this id.
    async fn get_tunnel(&self, id: &str) -> Result<Option<RemoteTunnel>, ProviderError>;

    async fn delete_tunnel(&self, id: &str) -> Result<(), ProviderError>;
}
