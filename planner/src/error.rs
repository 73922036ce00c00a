//! Deployment error taxonomy.
//!
//! | Variant                  | Scope        | Retriable | Tunnel compensation |
//! |--------------------------|--------------|-----------|---------------------|
//! | ConfigRejected           | per strategy | yes       | n/a                 |
//! | ProviderUnavailable      | per strategy | yes       | n/a                 |
//! | AllStrategiesExhausted   | terminal     | no        | n/a                 |
//! | TunnelCreateFailed       | terminal     | no        | no (nothing made)   |
//! | RepositoryNotFound       | terminal     | no        | yes                 |
//! | AuthenticationFailed     | terminal     | no        | yes                 |
//! | GenericDeployFailed      | terminal     | no        | yes                 |
//! | InvalidRepository        | terminal     | no        | n/a                 |
//! | Cancelled                | caller       | no        | yes                 |

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::AttemptFailure;

pub type DeployResult<T> = Result<T, DeployError>;

/// Why a single strategy attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider answered create-deployment with a 4xx.
    ConfigRejected,
    /// 5xx or transport failure on create-deployment.
    ProviderUnavailable,
    /// Build reached ERROR.
    BuildFailed,
    /// Build reached CANCELED on the provider side.
    BuildCanceled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigRejected => write!(f, "config_rejected"),
            Self::ProviderUnavailable => write!(f, "provider_unavailable"),
            Self::BuildFailed => write!(f, "build_failed"),
            Self::BuildCanceled => write!(f, "build_canceled"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    // ── Per strategy ──────────────────────────────────────────────────────
    #[error("configuration rejected by hosting provider (HTTP {status}): {message}")]
    ConfigRejected { status: u16, message: String },

    #[error("hosting provider unavailable: {message}")]
    ProviderUnavailable {
        status: Option<u16>,
        message: String,
    },

    // ── Terminal ──────────────────────────────────────────────────────────
    #[error("all {} deployment strategies failed; last: {last}", .failures.len())]
    AllStrategiesExhausted {
        /// Most recently attempted failure.
        last: Box<AttemptFailure>,
        /// Every failure, in attempt order.
        failures: Vec<AttemptFailure>,
    },

    #[error("tunnel creation failed: {0}")]
    TunnelCreateFailed(String),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("deployment failed: {0}")]
    GenericDeployFailed(String),

    #[error("invalid repository reference '{0}', expected owner/name")]
    InvalidRepository(String),

    /// Caller-initiated; never a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl DeployError {
    /// The orchestrator advances to the next strategy after these.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConfigRejected { .. } | Self::ProviderUnavailable { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable machine-readable name, used in CLI output and logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigRejected { .. } => "config_rejected",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::AllStrategiesExhausted { .. } => "all_strategies_exhausted",
            Self::TunnelCreateFailed(_) => "tunnel_create_failed",
            Self::RepositoryNotFound(_) => "repository_not_found",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::GenericDeployFailed(_) => "generic_deploy_failed",
            Self::InvalidRepository(_) => "invalid_repository",
            Self::Cancelled => "cancelled",
        }
    }

    /// Structured HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::ConfigRejected { status, .. } => Some(*status),
            Self::ProviderUnavailable { status, .. } => *status,
            Self::AllStrategiesExhausted { last, .. } => last.http_status,
            _ => None,
        }
    }

    /// Per-strategy failure records, empty unless strategies were exhausted.
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            Self::AllStrategiesExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn auth_hint() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(401|403)\b").expect("valid regex"))
}

fn not_found_hint() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b404\b").expect("valid regex"))
}

/// Provider-written text searched when no HTTP status was recorded.
///
/// Labels, counts and paths are never included; a root such as
/// `pages/404` must not read as a missing repository.
fn provider_text(err: &DeployError) -> Option<String> {
    match err {
        DeployError::ConfigRejected { message, .. }
        | DeployError::ProviderUnavailable { message, .. } => Some(message.clone()),
        DeployError::AllStrategiesExhausted { last, .. } => Some(match &last.error_code {
            Some(code) => format!("{code} {}", last.message),
            None => last.message.clone(),
        }),
        _ => None,
    }
}

/// Map an orchestrator failure onto the user-visible mobile categories.
///
/// A structured HTTP status decides when one was recorded. Only without
/// it is the provider's own message searched for `401`/`403`/`404`, which
/// breaks if the provider rewords its errors.
pub fn categorize_deploy_failure(err: DeployError) -> DeployError {
    match err {
        DeployError::Cancelled
        | DeployError::AuthenticationFailed(_)
        | DeployError::RepositoryNotFound(_)
        | DeployError::GenericDeployFailed(_)
        | DeployError::TunnelCreateFailed(_)
        | DeployError::InvalidRepository(_) => err,
        other => {
            let message = other.to_string();
            match other.http_status() {
                Some(401) | Some(403) => DeployError::AuthenticationFailed(message),
                Some(404) => DeployError::RepositoryNotFound(message),
                Some(_) => DeployError::GenericDeployFailed(message),
                None => match provider_text(&other) {
                    Some(text) if auth_hint().is_match(&text) => {
                        DeployError::AuthenticationFailed(message)
                    }
                    Some(text) if not_found_hint().is_match(&text) => {
                        DeployError::RepositoryNotFound(message)
                    }
                    _ => DeployError::GenericDeployFailed(message),
                },
            }
        }
    }
}
