//! DeploymentAttemptRunner: starts one remote deployment for one strategy.
//!
//! A started deployment is a real remote resource. Nothing here cancels it,
//! even when a later strategy wins.

use std::sync::Arc;

use planner::{
    merge_env, DeployError, DeployResult, DeploymentAttempt, DeploymentStrategy, EnvVar, RepoRef,
};
use tracing::{debug, info};

use crate::providers::{CreateDeploymentRequest, HostingProvider, ProviderError};

/// Map a create-deployment failure onto the per-strategy taxonomy.
///
/// 4xx is `ConfigRejected`; 5xx, transport and decode failures are
/// `ProviderUnavailable`. The orchestrator treats both the same way.
pub fn classify_start_error(err: ProviderError) -> DeployError {
    match err {
        ProviderError::Status { status, message } if (400..500).contains(&status) => {
            DeployError::ConfigRejected { status, message }
        }
        ProviderError::Status { status, message } => DeployError::ProviderUnavailable {
            status: Some(status),
            message: format!("HTTP {status}: {message}"),
        },
        other => DeployError::ProviderUnavailable {
            status: None,
            message: other.to_string(),
        },
    }
}

#[derive(Clone)]
pub struct DeploymentAttemptRunner {
    hosting: Arc<dyn HostingProvider>,
}

impl DeploymentAttemptRunner {
    pub fn new(hosting: Arc<dyn HostingProvider>) -> Self {
        Self { hosting }
    }

    /// Build the provider request. `overrides` beat the strategy's own env.
    pub fn request_for(
        repository: &RepoRef,
        branch: &str,
        strategy: &DeploymentStrategy,
        overrides: &[EnvVar],
    ) -> CreateDeploymentRequest {
        CreateDeploymentRequest {
            repository: repository.clone(),
            branch: branch.to_string(),
            root_directory: strategy.root_directory.clone(),
            build_command: strategy.build_command.clone(),
            start_command: strategy.start_command.clone(),
            install_command: strategy.install_command.clone(),
            output_directory: strategy.output_directory.clone(),
            framework: strategy.framework,
            env: merge_env(&strategy.env, overrides),
        }
    }

    pub async fn start(
        &self,
        repository: &RepoRef,
        branch: &str,
        strategy_index: usize,
        strategy: &DeploymentStrategy,
        overrides: &[EnvVar],
    ) -> DeployResult<DeploymentAttempt> {
        let request = Self::request_for(repository, branch, strategy, overrides);
        debug!(
            strategy = %strategy.label,
            root = ?request.root_directory,
            env_count = request.env.len(),
            "creating deployment"
        );

        let created = self
            .hosting
            .create_deployment(&request)
            .await
            .map_err(classify_start_error)?;

        info!(
            strategy = %strategy.label,
            deployment_id = %created.deployment_id,
            status = %created.status,
            "deployment started"
        );

        let mut attempt = DeploymentAttempt::started(
            strategy_index,
            created.deployment_id,
            created.project_id,
            created.status,
        );
        attempt.url = created.url;
        attempt.inspector_url = created.inspector_url;
        Ok(attempt)
    }
}
