//! Client for a local tunnel agent API (`/api/tunnels`).
//!
//! The agent names tunnels; the name is used as the tunnel id.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ensure_success, ProviderError, RemoteTunnel, TunnelProvider};
use crate::config::TunnelConfig;

pub struct AgentTunnelProvider {
    api_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateTunnelBody<'a> {
    name: String,
    proto: &'a str,
    addr: String,
}

#[derive(Debug, Deserialize)]
struct TunnelResponse {
    name: String,
    public_url: String,
    #[serde(default)]
    config: Option<TunnelResponseConfig>,
}

#[derive(Debug, Deserialize)]
struct TunnelResponseConfig {
    #[serde(default)]
    addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<TunnelResponse>,
}

/// Extract the port from `http://localhost:8787`, `localhost:8787` or `8787`.
fn addr_port(addr: &str) -> Option<u16> {
    addr.trim_end_matches('/')
        .rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
}

impl From<TunnelResponse> for RemoteTunnel {
    fn from(tunnel: TunnelResponse) -> Self {
        let local_port = tunnel
            .config
            .and_then(|c| c.addr)
            .as_deref()
            .and_then(addr_port);
        Self {
            id: tunnel.name,
            public_url: tunnel.public_url,
            local_port,
        }
    }
}

impl AgentTunnelProvider {
    pub fn new(config: &TunnelConfig, timeout: std::time::Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.api_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl TunnelProvider for AgentTunnelProvider {
    async fn create_tunnel(&self, port: u16, proto: &str) -> Result<RemoteTunnel, ProviderError> {
        let body = CreateTunnelBody {
            name: format!("mobile-{port}-{}", Utc::now().timestamp_millis()),
            proto,
            addr: port.to_string(),
        };
        let response = self
            .request(reqwest::Method::POST, "/tunnels")
            .json(&body)
            .send()
            .await?;
        let tunnel: TunnelResponse = ensure_success(response).await?.json().await?;
        let mut remote = RemoteTunnel::from(tunnel);
        remote.local_port.get_or_insert(port);
        Ok(remote)
    }

    async fn list_tunnels(&self) -> Result<Vec<RemoteTunnel>, ProviderError> {
        let response = self.request(reqwest::Method::GET, "/tunnels").send().await?;
        let list: TunnelList = ensure_success(response).await?.json().await?;
        Ok(list.tunnels.into_iter().map(RemoteTunnel::from).collect())
    }

    async fn get_tunnel(&self, id: &str) -> Result<Option<RemoteTunnel>, ProviderError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/tunnels/{id}"))
            .send()
            .await?;
        match ensure_success(response).await {
            Ok(response) => Ok(Some(response.json::<TunnelResponse>().await?.into())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn delete_tunnel(&self, id: &str) -> Result<(), ProviderError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/tunnels/{id}"))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
