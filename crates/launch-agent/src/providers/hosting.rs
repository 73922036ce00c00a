//! REST client for the hosting provider's deployments API.
//!
//! | Operation          | Request                                    |
//! |--------------------|--------------------------------------------|
//! | create-deployment  | `POST /v13/deployments`                    |
//! | deployment status  | `GET  /v13/deployments/{id}`               |
//! | deployment logs    | `GET  /v3/deployments/{id}/events?limit=N` |
//! | update env         | `POST /v10/projects/{id}/env?upsert=true`  |

use async_trait::async_trait;
use planner::{DeploymentStatus, EnvTarget, EnvVar, StatusUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ensure_success, CreateDeploymentRequest, CreatedDeployment, HostingProvider, ProviderError,
};
use crate::config::HostingConfig;

pub struct HttpHostingProvider {
    base_url: String,
    token: Option<String>,
    team_id: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    org: &'a str,
    repo: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSettings<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    framework: Option<&'static str>,
    build_command: &'a str,
    /// Runtime command; the provider maps it onto its server entrypoint.
    start_command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    install_command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_directory: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_directory: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EnvEntry<'a> {
    key: &'a str,
    value: &'a str,
    target: &'a [EnvTarget],
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<'a> From<&'a EnvVar> for EnvEntry<'a> {
    fn from(var: &'a EnvVar) -> Self {
        Self {
            key: &var.key,
            value: &var.value,
            target: &var.targets,
            kind: "encrypted",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    name: &'a str,
    git_source: GitSource<'a>,
    project_settings: ProjectSettings<'a>,
    env: Vec<EnvEntry<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentResponse {
    id: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    ready_state: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    inspector_url: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl DeploymentResponse {
    /// `readyState` is the build state; `status` is the older spelling.
    fn state(&self) -> Option<&str> {
        self.ready_state.as_deref().or(self.status.as_deref())
    }

    /// Recovery updates env by project, so a created deployment must name one.
    fn require_project_id(&self) -> Result<String, ProviderError> {
        match self.project_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(ProviderError::Decode(format!(
                "deployment {} response has no projectId",
                self.id
            ))),
        }
    }
}

fn https(url: Option<String>) -> Option<String> {
    url.map(|u| {
        if u.starts_with("http://") || u.starts_with("https://") {
            u
        } else {
            format!("https://{u}")
        }
    })
}

fn parse_status(raw: Option<&str>) -> Result<DeploymentStatus, ProviderError> {
    let raw = raw.ok_or_else(|| ProviderError::Decode("deployment has no status".into()))?;
    DeploymentStatus::parse(raw)
        .ok_or_else(|| ProviderError::Decode(format!("unknown deployment status '{raw}'")))
}

/// Flatten an events payload into plain log lines.
fn log_lines(events: &Value) -> Vec<String> {
    let Some(items) = events.as_array() else {
        return events.as_str().map(|s| vec![s.to_string()]).unwrap_or_default();
    };
    items
        .iter()
        .filter_map(|event| {
            event
                .get("text")
                .or_else(|| event.pointer("/payload/text"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

impl HttpHostingProvider {
    pub fn new(config: &HostingConfig, timeout: std::time::Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            team_id: config.team_id.clone(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(team) = &self.team_id {
            builder = builder.query(&[("teamId", team)]);
        }
        builder
    }
}

#[async_trait]
impl HostingProvider for HttpHostingProvider {
    async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<CreatedDeployment, ProviderError> {
        let body = CreateBody {
            name: &request.repository.name,
            git_source: GitSource {
                kind: "github",
                org: &request.repository.owner,
                repo: &request.repository.name,
                git_ref: &request.branch,
            },
            project_settings: ProjectSettings {
                framework: request.framework.map(|f| f.slug()),
                build_command: &request.build_command,
                start_command: &request.start_command,
                install_command: request.install_command.as_deref(),
                output_directory: request.output_directory.as_deref(),
                root_directory: request.root_directory.as_deref(),
            },
            env: request.env.iter().map(EnvEntry::from).collect(),
        };

        let response = self
            .request(reqwest::Method::POST, "/v13/deployments")
            .json(&body)
            .send()
            .await?;
        let deployment: DeploymentResponse = ensure_success(response).await?.json().await?;
        debug!(deployment_id = %deployment.id, "deployment created");

        Ok(CreatedDeployment {
            status: parse_status(deployment.state())?,
            project_id: deployment.require_project_id()?,
            url: https(deployment.url),
            inspector_url: deployment.inspector_url,
            deployment_id: deployment.id,
        })
    }

    async fn deployment_status(&self, deployment_id: &str) -> Result<StatusUpdate, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v13/deployments/{deployment_id}"),
            )
            .send()
            .await?;
        let deployment: DeploymentResponse = ensure_success(response).await?.json().await?;
        Ok(StatusUpdate {
            status: parse_status(deployment.state())?,
            url: https(deployment.url),
            inspector_url: deployment.inspector_url,
            error_code: deployment.error_code,
            error_message: deployment.error_message,
        })
    }

    async fn deployment_logs(
        &self,
        deployment_id: &str,
        limit: usize,
    ) -> Result<String, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v3/deployments/{deployment_id}/events"),
            )
            .query(&[("limit", limit.to_string()), ("direction", "backward".into())])
            .send()
            .await?;
        let events: Value = ensure_success(response).await?.json().await?;
        let mut lines = log_lines(&events);
        if lines.len() > limit {
            lines.drain(..lines.len() - limit);
        }
        Ok(lines.join("\n"))
    }

    async fn update_environment(
        &self,
        project_id: &str,
        env: &[EnvVar],
    ) -> Result<(), ProviderError> {
        let body: Vec<EnvEntry<'_>> = env.iter().map(EnvEntry::from).collect();
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v10/projects/{project_id}/env"),
            )
            .query(&[("upsert", "true")])
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        debug!(project_id, count = env.len(), "project environment updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_lines_accepts_flat_and_nested_events() {
        let events = json!([
            {"type": "stdout", "text": "Installing"},
            {"type": "stdout", "payload": {"text": "Building"}},
            {"type": "delimiter"}
        ]);
        assert_eq!(log_lines(&events), vec!["Installing", "Building"]);
        assert_eq!(log_lines(&json!("raw text")), vec!["raw text"]);
    }

    #[test]
    fn created_deployment_requires_project_id() {
        let parsed: DeploymentResponse =
            serde_json::from_value(json!({"id": "dpl_2", "readyState": "QUEUED"})).unwrap();
        assert!(matches!(
            parsed.require_project_id(),
            Err(ProviderError::Decode(msg)) if msg.contains("dpl_2")
        ));

        let parsed: DeploymentResponse =
            serde_json::from_value(json!({"id": "dpl_3", "projectId": ""})).unwrap();
        assert!(parsed.require_project_id().is_err());

        let parsed: DeploymentResponse =
            serde_json::from_value(json!({"id": "dpl_4", "projectId": "prj_4"})).unwrap();
        assert_eq!(parsed.require_project_id().unwrap(), "prj_4");
    }

    #[test]
    fn deployment_response_prefers_ready_state() {
        let parsed: DeploymentResponse = serde_json::from_value(json!({
            "id": "dpl_1",
            "projectId": "prj_1",
            "readyState": "BUILDING",
            "status": "QUEUED",
            "url": "shop-abc.example.app"
        }))
        .unwrap();
        assert_eq!(
            parse_status(parsed.state()).unwrap(),
            DeploymentStatus::Building
        );
        assert_eq!(
            https(parsed.url).as_deref(),
            Some("https://shop-abc.example.app")
        );
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        assert!(matches!(
            parse_status(Some("ARCHIVED")),
            Err(ProviderError::Decode(_))
        ));
        assert!(matches!(parse_status(None), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn env_entry_serializes_targets() {
        let var = EnvVar::new("A", "1").with_targets(&[EnvTarget::Preview]);
        let value = serde_json::to_value(EnvEntry::from(&var)).unwrap();
        assert_eq!(
            value,
            json!({"key": "A", "value": "1", "target": ["preview"], "type": "encrypted"})
        );
    }
}
