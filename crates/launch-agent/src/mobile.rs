//! MobileDeploymentCoordinator: tunnel + deployment as one unit.
//!
//! ## Deploy
//!
//! ```text
//! create tunnel (fixed local port)      ── fail → TunnelCreateFailed
//!   → confirm target repository exists  ── fail → delete tunnel, RepositoryNotFound
//!   → RetryOrchestrator on that repository and branch, with
//!     MOBILE_TUNNEL_URL / MOBILE_TUNNEL_ID / MOBILE_ACCESS_SECRET / MOBILE_REMOTE_MODE
//!                                       ── fail → delete tunnel, categorize
//!   → MobileDeployment { tunnel, deployment }
//! ```
//!
//! Recovery replaces a vanished tunnel and updates only the deployment's
//! environment; it never re-runs the strategy loop.
//!
//! Deploy and Recover for the same deployment must not overlap. Nothing
//! here enforces that.

use std::sync::Arc;

use planner::{
    categorize_deploy_failure, mobile, reconcile, DeployError, DeployResult, MobileDeployment,
    RepoRef, StrategyOverrides, TunnelRecord, TunnelStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::{resolve_inputs, ProgressTx, RetryOrchestrator};
use crate::providers::{HostingProvider, ProviderError, SourceRepository};
use crate::tunnel_lifecycle::TunnelLifecycleManager;

/// Settings shared by every mobile deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileTarget {
    /// Fixed local port exposed through the tunnel.
    pub local_port: u16,
    pub general_env: Vec<planner::EnvVar>,
}

/// Map a hosting/source error onto the user-visible categories.
fn categorize_provider_error(err: ProviderError) -> DeployError {
    categorize_deploy_failure(DeployError::ProviderUnavailable {
        status: err.status(),
        message: err.to_string(),
    })
}

pub struct MobileDeploymentCoordinator {
    tunnels: TunnelLifecycleManager,
    source: Arc<dyn SourceRepository>,
    hosting: Arc<dyn HostingProvider>,
    orchestrator: Arc<RetryOrchestrator>,
    target: MobileTarget,
}

impl MobileDeploymentCoordinator {
    pub fn new(
        tunnels: TunnelLifecycleManager,
        source: Arc<dyn SourceRepository>,
        hosting: Arc<dyn HostingProvider>,
        orchestrator: Arc<RetryOrchestrator>,
        target: MobileTarget,
    ) -> Self {
        Self {
            tunnels,
            source,
            hosting,
            orchestrator,
            target,
        }
    }

    pub fn tunnels(&self) -> &TunnelLifecycleManager {
        &self.tunnels
    }

    pub async fn deploy(
        &self,
        repository: &RepoRef,
        access_secret: &str,
        branch: &str,
        cancel: &CancellationToken,
        progress: Option<&ProgressTx>,
    ) -> DeployResult<MobileDeployment> {
        let tunnel = self.tunnels.create(self.target.local_port).await?;

        if let Err(err) = self.confirm_repository(repository).await {
            warn!(repository = %repository, tunnel_id = %tunnel.id, error = %err, "repository check failed; removing tunnel");
            self.tunnels.delete(&tunnel.id).await;
            return Err(err);
        }

        let inputs = resolve_inputs(
            self.source.as_ref(),
            repository.clone(),
            branch,
            StrategyOverrides::default(),
            self.target.general_env.clone(),
        )
        .await;
        let overrides = mobile::deploy_env(&tunnel, access_secret);

        match self
            .orchestrator
            .run(&inputs, &overrides, cancel, progress)
            .await
        {
            Ok(success) => {
                info!(
                    tunnel_id = %tunnel.id,
                    deployment_id = %success.attempt.deployment_id,
                    url = ?success.attempt.url,
                    "mobile deployment ready"
                );
                Ok(MobileDeployment {
                    tunnel,
                    deployment: success.attempt,
                    repository: repository.clone(),
                    branch: branch.to_string(),
                })
            }
            Err(err) => {
                self.tunnels.delete(&tunnel.id).await;
                let categorized = categorize_deploy_failure(err);
                warn!(category = categorized.category(), error = %categorized, "mobile deployment failed");
                Err(categorized)
            }
        }
    }

    async fn confirm_repository(&self, repository: &RepoRef) -> DeployResult<()> {
        match self.source.get_repository(repository).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(DeployError::RepositoryNotFound(repository.to_string())),
            Err(e) => match e.status() {
                Some(401) | Some(403) => Err(DeployError::AuthenticationFailed(e.to_string())),
                _ => Err(DeployError::RepositoryNotFound(format!("{repository}: {e}"))),
            },
        }
    }

    /// Provider-verified tunnel presence, degrading to `last_claimed_active`.
    pub async fn check_status(&self, tunnel_id: &str, last_claimed_active: bool) -> TunnelStatus {
        let lookup = self.tunnels.verify(tunnel_id).await;
        if let Err(e) = &lookup {
            warn!(tunnel_id, error = %e, "tunnel provider unreachable; trusting last known state");
        }
        let status = reconcile(lookup, last_claimed_active);
        if status.needs_recovery() {
            info!(tunnel_id, "tunnel no longer exists; recovery required");
        }
        status
    }

    /// Replace the tunnel and point the existing deployment at it.
    pub async fn recover(&self, record: &MobileDeployment) -> DeployResult<TunnelRecord> {
        if record.deployment.project_id.trim().is_empty() {
            return Err(DeployError::GenericDeployFailed(format!(
                "deployment {} has no project id; redeploy instead of recovering",
                record.deployment.deployment_id
            )));
        }
        let tunnel = self.tunnels.create(self.target.local_port).await?;
        let env = mobile::tunnel_env(&tunnel);
        match self
            .hosting
            .update_environment(&record.deployment.project_id, &env)
            .await
        {
            Ok(()) => {
                info!(
                    old_tunnel_id = %record.tunnel.id,
                    tunnel_id = %tunnel.id,
                    project_id = %record.deployment.project_id,
                    "mobile tunnel recovered"
                );
                Ok(tunnel)
            }
            Err(e) => {
                warn!(tunnel_id = %tunnel.id, error = %e, "environment update failed; removing new tunnel");
                self.tunnels.delete(&tunnel.id).await;
                Err(categorize_provider_error(e))
            }
        }
    }

    /// Best-effort.
    pub async fn stop(&self, tunnel_id: &str) {
        self.tunnels.delete(tunnel_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_by_status() {
        let err = categorize_provider_error(ProviderError::Status {
            status: 401,
            message: "bad token".into(),
        });
        assert!(matches!(err, DeployError::AuthenticationFailed(_)));

        let err = categorize_provider_error(ProviderError::Status {
            status: 404,
            message: "no such project".into(),
        });
        assert!(matches!(err, DeployError::RepositoryNotFound(_)));

        let err = categorize_provider_error(ProviderError::Transport("timeout".into()));
        assert!(matches!(err, DeployError::GenericDeployFailed(_)));
    }
}
