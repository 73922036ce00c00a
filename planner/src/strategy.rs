//! StrategyBuilder: ordered fallback deployment configurations.
//!
//! Output order is the attempt order. Explicit full overrides produce a
//! single strategy; otherwise one strategy per detected root (primary root
//! first) followed by a generic fallback that never sets a root.

use std::collections::HashSet;

use crate::detect::RootCandidate;
use crate::model::{DeploymentStrategy, EnvVar, Framework, RepoRef};

pub const EXPLICIT_LABEL: &str = "explicit";
pub const REPO_ROOT_LABEL: &str = "repo-root";
pub const FALLBACK_LABEL: &str = "generic-fallback";

const FALLBACK_INSTALL: &str = "npm install";
const FALLBACK_BUILD: &str = "npm run build";
const FALLBACK_START: &str = "npm start";

/// Normalize a root directory path.
///
/// Strips leading `./` and leading/trailing `/`; `.` and `/` become the
/// empty (repository root) path.
pub fn normalize_root(path: &str) -> String {
    let mut current = path.trim();
    loop {
        let next = current
            .strip_prefix("./")
            .unwrap_or(current)
            .trim_start_matches('/');
        if next == current {
            break;
        }
        current = next;
    }
    let current = current.trim_end_matches('/');
    if current == "." {
        String::new()
    } else {
        current.to_string()
    }
}

/// Caller-supplied configuration that beats autodetection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOverrides {
    pub framework: Option<Framework>,
    pub root_directory: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub install_command: Option<String>,
    pub output_directory: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl StrategyOverrides {
    /// Build and start commands are both present, so autodetection is skipped.
    pub fn is_full(&self) -> bool {
        non_empty(&self.build_command).is_some() && non_empty(&self.start_command).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.framework.is_none()
            && non_empty(&self.root_directory).is_none()
            && non_empty(&self.build_command).is_none()
            && non_empty(&self.start_command).is_none()
            && non_empty(&self.install_command).is_none()
            && non_empty(&self.output_directory).is_none()
    }
}

/// Everything StrategyBuilder needs; no field triggers I/O.
#[derive(Debug, Clone)]
pub struct StrategyInputs {
    pub repository: RepoRef,
    pub branch: String,
    pub overrides: StrategyOverrides,
    /// Ordered candidates from the source repository collaborator.
    pub candidates: Vec<RootCandidate>,
    /// Autodetected primary root, promoted to position 0.
    pub primary_root: Option<String>,
    /// General environment variables copied into every strategy.
    pub env: Vec<EnvVar>,
}

impl StrategyInputs {
    pub fn new(repository: RepoRef, branch: impl Into<String>) -> Self {
        Self {
            repository,
            branch: branch.into(),
            overrides: StrategyOverrides::default(),
            candidates: Vec::new(),
            primary_root: None,
            env: Vec::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: StrategyOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_candidates(
        mut self,
        candidates: Vec<RootCandidate>,
        primary_root: Option<String>,
    ) -> Self {
        self.candidates = candidates;
        self.primary_root = primary_root;
        self
    }

    pub fn with_env(mut self, env: Vec<EnvVar>) -> Self {
        self.env = env;
        self
    }
}

fn root_option(path: &str) -> Option<String> {
    let normalized = normalize_root(path);
    (!normalized.is_empty()).then_some(normalized)
}

fn root_label(path: &str) -> String {
    if path.is_empty() {
        REPO_ROOT_LABEL.to_string()
    } else {
        format!("root:{path}")
    }
}

pub struct StrategyBuilder;

impl StrategyBuilder {
    /// Produce the ordered strategy list. Never empty.
    pub fn build(inputs: &StrategyInputs) -> Vec<DeploymentStrategy> {
        let overrides = &inputs.overrides;
        if overrides.is_full() {
            return vec![Self::explicit(overrides, &inputs.env)];
        }

        let mut ordered: Vec<RootCandidate> = Vec::with_capacity(inputs.candidates.len() + 1);
        let promoted = non_empty(&overrides.root_directory)
            .map(str::to_string)
            .or_else(|| inputs.primary_root.clone());
        if let Some(primary) = promoted {
            let primary = normalize_root(&primary);
            let framework = inputs
                .candidates
                .iter()
                .find(|c| normalize_root(&c.path) == primary)
                .and_then(|c| c.framework);
            ordered.push(RootCandidate {
                path: primary,
                framework,
            });
        }
        ordered.extend(inputs.candidates.iter().map(|c| RootCandidate {
            path: normalize_root(&c.path),
            framework: c.framework,
        }));

        let mut seen: HashSet<String> = HashSet::new();
        let mut strategies: Vec<DeploymentStrategy> = ordered
            .into_iter()
            .filter(|c| seen.insert(c.path.clone()))
            .map(|c| Self::for_root(&c, overrides, &inputs.env))
            .collect();

        strategies.push(Self::fallback(overrides, &inputs.env));
        strategies
    }

    fn explicit(overrides: &StrategyOverrides, env: &[EnvVar]) -> DeploymentStrategy {
        DeploymentStrategy {
            label: EXPLICIT_LABEL.to_string(),
            root_directory: overrides.root_directory.as_deref().and_then(root_option),
            build_command: non_empty(&overrides.build_command)
                .unwrap_or_default()
                .to_string(),
            start_command: non_empty(&overrides.start_command)
                .unwrap_or_default()
                .to_string(),
            install_command: non_empty(&overrides.install_command).map(str::to_string),
            output_directory: non_empty(&overrides.output_directory).map(str::to_string),
            framework: overrides.framework,
            env: env.to_vec(),
        }
    }

    fn for_root(
        candidate: &RootCandidate,
        overrides: &StrategyOverrides,
        env: &[EnvVar],
    ) -> DeploymentStrategy {
        let framework = overrides.framework.or(candidate.framework);
        let defaults = framework.unwrap_or(Framework::Node).commands();
        DeploymentStrategy {
            label: root_label(&candidate.path),
            root_directory: root_option(&candidate.path),
            build_command: non_empty(&overrides.build_command)
                .unwrap_or(defaults.build)
                .to_string(),
            start_command: non_empty(&overrides.start_command)
                .unwrap_or(defaults.start)
                .to_string(),
            install_command: non_empty(&overrides.install_command)
                .or(defaults.install)
                .map(str::to_string),
            output_directory: non_empty(&overrides.output_directory)
                .or(defaults.output)
                .map(str::to_string),
            framework,
            env: env.to_vec(),
        }
    }

    fn fallback(overrides: &StrategyOverrides, env: &[EnvVar]) -> DeploymentStrategy {
        DeploymentStrategy {
            label: FALLBACK_LABEL.to_string(),
            root_directory: None,
            build_command: non_empty(&overrides.build_command)
                .unwrap_or(FALLBACK_BUILD)
                .to_string(),
            start_command: non_empty(&overrides.start_command)
                .unwrap_or(FALLBACK_START)
                .to_string(),
            install_command: Some(
                non_empty(&overrides.install_command)
                    .unwrap_or(FALLBACK_INSTALL)
                    .to_string(),
            ),
            output_directory: non_empty(&overrides.output_directory).map(str::to_string),
            framework: None,
            env: env.to_vec(),
        }
    }
}
