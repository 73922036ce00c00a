//! GitHub REST client for repository existence and root probing.

use async_trait::async_trait;
use planner::{detect_roots, Detection, RepoRef};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ensure_success, ProviderError, RepositoryInfo, SourceRepository};
use crate::config::SourceConfig;

const USER_AGENT: &str = concat!("launch-agent/", env!("CARGO_PKG_VERSION"));

pub struct GitHubSource {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    default_branch: String,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl GitHubSource {
    pub fn new(config: &SourceConfig, timeout: std::time::Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl SourceRepository for GitHubSource {
    async fn get_repository(
        &self,
        repo: &RepoRef,
    ) -> Result<Option<RepositoryInfo>, ProviderError> {
        let response = self
            .get(&format!("/repos/{}/{}", repo.owner, repo.name))
            .send()
            .await?;
        match ensure_success(response).await {
            Ok(response) => {
                let info: RepoResponse = response.json().await?;
                Ok(Some(RepositoryInfo {
                    full_name: info.full_name,
                    default_branch: info.default_branch,
                    private: info.private,
                }))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn root_candidates(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Detection, ProviderError> {
        let response = self
            .get(&format!(
                "/repos/{}/{}/git/trees/{}",
                repo.owner, repo.name, branch
            ))
            .query(&[("recursive", "1")])
            .send()
            .await?;
        let tree: TreeResponse = ensure_success(response).await?.json().await?;
        if tree.truncated {
            warn!(repository = %repo, "repository tree truncated; deep roots may be missed");
        }
        let detection = detect_roots(
            tree.tree
                .iter()
                .filter(|entry| entry.kind == "blob")
                .map(|entry| entry.path.as_str()),
        );
        debug!(
            repository = %repo,
            candidates = detection.candidates.len(),
            primary = ?detection.primary,
            "root candidates detected"
        );
        Ok(detection)
    }
}
