//! In-process fake providers shared by the integration tests.
//!
//! Each fake records every call so tests can assert on ordering and counts
//! without a network.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use launch_agent::providers::{
    CreateDeploymentRequest, CreatedDeployment, HostingProvider, ProviderError, RemoteTunnel,
    TunnelProvider,
};
use planner::{DeploymentStatus, EnvVar, StatusUpdate};
use tokio_util::sync::CancellationToken;

// ── Hosting ─────────────────────────────────────────────────────────────────

pub fn update(status: DeploymentStatus) -> Result<StatusUpdate, ProviderError> {
    Ok(StatusUpdate::new(status))
}

pub fn failed(message: &str) -> Result<StatusUpdate, ProviderError> {
    let mut update = StatusUpdate::new(DeploymentStatus::Error);
    update.error_code = Some("BUILD_FAILED".into());
    update.error_message = Some(message.into());
    Ok(update)
}

pub fn ready(url: &str) -> Result<StatusUpdate, ProviderError> {
    let mut update = StatusUpdate::new(DeploymentStatus::Ready);
    update.url = Some(url.into());
    Ok(update)
}

pub fn transient() -> Result<StatusUpdate, ProviderError> {
    Err(ProviderError::Transport("connection reset by peer".into()))
}

/// Deployment ids are `dpl_1`, `dpl_2`, ... in create order. Status polls
/// for a deployment pop its script; an exhausted script reports BUILDING.
#[derive(Default)]
pub struct FakeHosting {
    create_errors: Mutex<VecDeque<Option<ProviderError>>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<StatusUpdate, ProviderError>>>>,
    pub creates: Mutex<Vec<CreateDeploymentRequest>>,
    pub polls: Mutex<Vec<String>>,
    pub log_requests: Mutex<Vec<(String, usize)>>,
    pub env_updates: Mutex<Vec<(String, Vec<EnvVar>)>>,
    env_update_error: Mutex<Option<ProviderError>>,
    cancel_at_poll: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeHosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status script for the `n`th created deployment (1-based).
    pub fn script(self, n: usize, statuses: Vec<Result<StatusUpdate, ProviderError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(format!("dpl_{n}"), statuses.into());
        self
    }

    /// Outcome of successive create calls; `None` succeeds.
    pub fn create_results(self, results: Vec<Option<ProviderError>>) -> Self {
        *self.create_errors.lock().unwrap() = results.into();
        self
    }

    pub fn fail_env_update(self, err: ProviderError) -> Self {
        *self.env_update_error.lock().unwrap() = Some(err);
        self
    }

    /// Cancel `token` while the `n`th status request (1-based) is in flight.
    pub fn cancel_at_poll(self, n: usize, token: CancellationToken) -> Self {
        *self.cancel_at_poll.lock().unwrap() = Some((n, token));
        self
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn created_roots(&self) -> Vec<Option<String>> {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.root_directory.clone())
            .collect()
    }
}

#[async_trait]
impl HostingProvider for FakeHosting {
    async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<CreatedDeployment, ProviderError> {
        let n = {
            let mut creates = self.creates.lock().unwrap();
            creates.push(request.clone());
            creates.len()
        };
        if let Some(Some(err)) = self.create_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(CreatedDeployment {
            deployment_id: format!("dpl_{n}"),
            project_id: "prj_client".into(),
            status: DeploymentStatus::Queued,
            url: None,
            inspector_url: Some(format!("https://hosting.example/inspect/dpl_{n}")),
        })
    }

    async fn deployment_status(&self, deployment_id: &str) -> Result<StatusUpdate, ProviderError> {
        let poll = {
            let mut polls = self.polls.lock().unwrap();
            polls.push(deployment_id.to_string());
            polls.len()
        };
        if let Some((at, token)) = self.cancel_at_poll.lock().unwrap().as_ref() {
            if *at == poll {
                token.cancel();
            }
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(deployment_id)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| update(DeploymentStatus::Building))
    }

    async fn deployment_logs(
        &self,
        deployment_id: &str,
        limit: usize,
    ) -> Result<String, ProviderError> {
        self.log_requests
            .lock()
            .unwrap()
            .push((deployment_id.to_string(), limit));
        Ok(format!("npm ERR! build failed in {deployment_id}"))
    }

    async fn update_environment(
        &self,
        project_id: &str,
        env: &[EnvVar],
    ) -> Result<(), ProviderError> {
        self.env_updates
            .lock()
            .unwrap()
            .push((project_id.to_string(), env.to_vec()));
        match self.env_update_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ── Tunnels ─────────────────────────────────────────────────────────────────

/// Tunnels are `tun-1`, `tun-2`, ... at `https://tun-N.tunnel.example`.
#[derive(Default)]
pub struct FakeTunnels {
    live: Mutex<Vec<RemoteTunnel>>,
    created: Mutex<usize>,
    pub deletes: Mutex<Vec<String>>,
    fail_create: Mutex<bool>,
    fail_delete: Mutex<bool>,
    unreachable: Mutex<bool>,
}

impl FakeTunnels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(self) -> Self {
        *self.fail_create.lock().unwrap() = true;
        self
    }

    pub fn failing_delete(self) -> Self {
        *self.fail_delete.lock().unwrap() = true;
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Simulate external expiry.
    pub fn vanish(&self, id: &str) {
        self.live.lock().unwrap().retain(|t| t.id != id);
    }

    pub fn create_count(&self) -> usize {
        *self.created.lock().unwrap()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), ProviderError> {
        if *self.unreachable.lock().unwrap() {
            return Err(ProviderError::Transport("tunnel agent unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TunnelProvider for FakeTunnels {
    async fn create_tunnel(&self, port: u16, _proto: &str) -> Result<RemoteTunnel, ProviderError> {
        if *self.fail_create.lock().unwrap() {
            return Err(ProviderError::Status {
                status: 502,
                message: "tunnel session limit reached".into(),
            });
        }
        let n = {
            let mut created = self.created.lock().unwrap();
            *created += 1;
            *created
        };
        let tunnel = RemoteTunnel {
            id: format!("tun-{n}"),
            public_url: format!("https://tun-{n}.tunnel.example"),
            local_port: Some(port),
        };
        self.live.lock().unwrap().push(tunnel.clone());
        Ok(tunnel)
    }

    async fn list_tunnels(&self) -> Result<Vec<RemoteTunnel>, ProviderError> {
        self.check_reachable()?;
        Ok(self.live.lock().unwrap().clone())
    }

    async fn get_tunnel(&self, id: &str) -> Result<Option<RemoteTunnel>, ProviderError> {
        self.check_reachable()?;
        Ok(self.live.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn delete_tunnel(&self, id: &str) -> Result<(), ProviderError> {
        self.deletes.lock().unwrap().push(id.to_string());
        if *self.fail_delete.lock().unwrap() {
            return Err(ProviderError::Status {
                status: 404,
                message: "tunnel not found".into(),
            });
        }
        self.vanish(id);
        Ok(())
    }
}
