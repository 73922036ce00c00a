//! TunnelLifecycleManager: create, verify and delete tunnels.
//!
//! Tunnels can vanish or reappear without this process knowing (expiry,
//! manual deletion, agent restart). `verify` asks the provider every time;
//! callers reconcile cached flags against it with `planner::reconcile`.

use std::sync::Arc;

use chrono::Utc;
use planner::{DeployError, DeployResult, TunnelRecord};
use tracing::{debug, info, warn};

use crate::providers::{ProviderError, RemoteTunnel, TunnelProvider};

#[derive(Clone)]
pub struct TunnelLifecycleManager {
    provider: Arc<dyn TunnelProvider>,
    proto: String,
}

impl TunnelLifecycleManager {
    pub fn new(provider: Arc<dyn TunnelProvider>, proto: impl Into<String>) -> Self {
        Self {
            provider,
            proto: proto.into(),
        }
    }

    pub async fn create(&self, port: u16) -> DeployResult<TunnelRecord> {
        let remote = self
            .provider
            .create_tunnel(port, &self.proto)
            .await
            .map_err(|e| DeployError::TunnelCreateFailed(e.to_string()))?;
        info!(tunnel_id = %remote.id, public_url = %remote.public_url, port, "tunnel created");
        Ok(record_from(remote, port))
    }

    /// Whether the provider currently lists `tunnel_id`.
    pub async fn verify(&self, tunnel_id: &str) -> Result<bool, ProviderError> {
        let tunnels = self.provider.list_tunnels().await?;
        let present = tunnels.iter().any(|t| t.id == tunnel_id);
        debug!(tunnel_id, present, listed = tunnels.len(), "tunnel verified");
        Ok(present)
    }

    /// Fetch the provider's current view of one tunnel.
    pub async fn lookup(&self, tunnel_id: &str) -> Result<Option<TunnelRecord>, ProviderError> {
        let remote = self.provider.get_tunnel(tunnel_id).await?;
        Ok(remote.map(|r| {
            let port = r.local_port.unwrap_or_default();
            record_from(r, port)
        }))
    }

    /// Best-effort; the tunnel may already be gone.
    pub async fn delete(&self, tunnel_id: &str) {
        match self.provider.delete_tunnel(tunnel_id).await {
            Ok(()) => info!(tunnel_id, "tunnel deleted"),
            Err(e) => warn!(tunnel_id, error = %e, "tunnel delete failed; ignoring"),
        }
    }
}

fn record_from(remote: RemoteTunnel, fallback_port: u16) -> TunnelRecord {
    TunnelRecord {
        local_port: remote.local_port.unwrap_or(fallback_port),
        id: remote.id,
        public_url: remote.public_url,
        created_at: Utc::now(),
        verified: true,
    }
}
