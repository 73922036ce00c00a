//! RetryOrchestrator: drives strategies through runner and poller.
//!
//! ## Lifecycle
//!
//! ```text
//! RetryOrchestrator::run(inputs)
//!   → StrategyBuilder::build       : ordered strategies, never empty
//!   → RetryPlan
//!   → loop plan.next_attempt():
//!       check cancellation
//!       runner.start(strategy)     : ConfigRejected / ProviderUnavailable → record, next
//!       poller.wait_for_terminal   : READY → success; ERROR/CANCELED → record, next
//!   → plan.into_error()            : AllStrategiesExhausted (last failure) or Cancelled
//! ```
//!
//! One cancellation token spans the whole loop. Invocations for the same
//! target must be serialized by the caller; nothing here locks.

use std::sync::Arc;
use std::time::Duration;

use planner::{
    AttemptFailure, DeployError, DeployResult, DeploymentAttempt, DeploymentStatus,
    DeploymentStrategy, EnvVar, FailureKind, RepoRef, RetryPlan, StatusUpdate, StrategyBuilder,
    StrategyInputs, StrategyOverrides,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::poller::StatusPoller;
use crate::providers::{HostingProvider, SourceRepository};
use crate::runner::DeploymentAttemptRunner;

const DEFAULT_LOG_LIMIT: usize = 40;

/// Live progress for UI/CLI rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ProgressEvent {
    StrategyStarted {
        index: usize,
        total: usize,
        label: String,
    },
    AttemptCreated {
        index: usize,
        deployment_id: String,
        inspector_url: Option<String>,
    },
    Status {
        index: usize,
        update: StatusUpdate,
    },
    StrategyFailed {
        failure: AttemptFailure,
    },
    Succeeded {
        index: usize,
        label: String,
        url: Option<String>,
    },
}

pub type ProgressTx = mpsc::UnboundedSender<ProgressEvent>;

fn emit(progress: Option<&ProgressTx>, event: ProgressEvent) {
    if let Some(tx) = progress {
        // Receiver may be gone; progress is advisory.
        let _ = tx.send(event);
    }
}

/// The winning attempt plus everything that failed before it.
#[derive(Debug, Clone)]
pub struct DeploymentSuccess {
    pub attempt: DeploymentAttempt,
    pub strategy: DeploymentStrategy,
    pub failures: Vec<AttemptFailure>,
}

impl DeploymentSuccess {
    pub fn url(&self) -> Option<&str> {
        self.attempt.url.as_deref()
    }

    pub fn inspector_url(&self) -> Option<&str> {
        self.attempt.inspector_url.as_deref()
    }
}

/// Build strategy inputs, probing the repository unless overrides are full.
///
/// A failed probe degrades to no candidates, leaving only the generic
/// fallback strategy.
pub async fn resolve_inputs(
    source: &dyn SourceRepository,
    repository: RepoRef,
    branch: &str,
    overrides: StrategyOverrides,
    env: Vec<EnvVar>,
) -> StrategyInputs {
    let mut inputs = StrategyInputs::new(repository, branch)
        .with_overrides(overrides)
        .with_env(env);
    if inputs.overrides.is_full() {
        debug!(repository = %inputs.repository, "full overrides supplied; skipping root detection");
        return inputs;
    }
    match source.root_candidates(&inputs.repository, branch).await {
        Ok(detection) => {
            inputs = inputs.with_candidates(detection.candidates, detection.primary);
        }
        Err(e) => {
            warn!(
                repository = %inputs.repository,
                error = %e,
                "root detection failed; using generic fallback only"
            );
        }
    }
    inputs
}

pub struct RetryOrchestrator {
    hosting: Arc<dyn HostingProvider>,
    runner: DeploymentAttemptRunner,
    poller: StatusPoller,
    log_limit: usize,
}

impl RetryOrchestrator {
    pub fn new(hosting: Arc<dyn HostingProvider>, poll_interval: Duration) -> Self {
        Self {
            runner: DeploymentAttemptRunner::new(hosting.clone()),
            poller: StatusPoller::new(hosting.clone(), poll_interval),
            hosting,
            log_limit: DEFAULT_LOG_LIMIT,
        }
    }

    /// Build log lines attached to an ERROR failure; 0 disables the fetch.
    pub fn with_log_limit(mut self, log_limit: usize) -> Self {
        self.log_limit = log_limit;
        self
    }

    /// Run every strategy in order until one reaches READY.
    ///
    /// `overrides` are strategy-specific env vars that beat general settings.
    pub async fn run(
        &self,
        inputs: &StrategyInputs,
        overrides: &[EnvVar],
        cancel: &CancellationToken,
        progress: Option<&ProgressTx>,
    ) -> DeployResult<DeploymentSuccess> {
        let mut plan = RetryPlan::new(StrategyBuilder::build(inputs));
        let total = plan.len();
        info!(
            repository = %inputs.repository,
            branch = %inputs.branch,
            strategies = total,
            "deployment starting"
        );

        while let Some((index, strategy)) = plan.next_attempt() {
            if cancel.is_cancelled() {
                plan.cancel();
                break;
            }

            info!(index, total, strategy = %strategy.label, "attempting strategy");
            emit(
                progress,
                ProgressEvent::StrategyStarted {
                    index,
                    total,
                    label: strategy.label.clone(),
                },
            );

            let mut attempt = match self
                .runner
                .start(
                    &inputs.repository,
                    &inputs.branch,
                    index,
                    &strategy,
                    overrides,
                )
                .await
            {
                Ok(attempt) => attempt,
                Err(err) => {
                    let failure = AttemptFailure::from_start_error(index, &strategy.label, &err);
                    warn!(strategy = %strategy.label, error = %err, "strategy could not start");
                    emit(
                        progress,
                        ProgressEvent::StrategyFailed {
                            failure: failure.clone(),
                        },
                    );
                    plan.record_failure(failure);
                    continue;
                }
            };

            emit(
                progress,
                ProgressEvent::AttemptCreated {
                    index,
                    deployment_id: attempt.deployment_id.clone(),
                    inspector_url: attempt.inspector_url.clone(),
                },
            );

            let terminal = if attempt.is_terminal() {
                StatusUpdate {
                    status: attempt.status,
                    url: attempt.url.clone(),
                    inspector_url: attempt.inspector_url.clone(),
                    error_code: attempt.error_code.clone(),
                    error_message: attempt.error_message.clone(),
                }
            } else {
                let deployment_id = attempt.deployment_id.clone();
                let polled = self
                    .poller
                    .wait_for_terminal(&deployment_id, cancel, |update| {
                        attempt.apply(update);
                        emit(
                            progress,
                            ProgressEvent::Status {
                                index,
                                update: update.clone(),
                            },
                        );
                    })
                    .await;
                match polled {
                    Ok(update) => update,
                    Err(_) => {
                        info!(
                            strategy = %strategy.label,
                            deployment_id = %attempt.deployment_id,
                            "deployment cancelled by caller; remote build left running"
                        );
                        plan.cancel();
                        break;
                    }
                }
            };

            if terminal.status == DeploymentStatus::Ready {
                plan.record_success();
                info!(
                    strategy = %strategy.label,
                    deployment_id = %attempt.deployment_id,
                    url = ?attempt.url,
                    "deployment ready"
                );
                emit(
                    progress,
                    ProgressEvent::Succeeded {
                        index,
                        label: strategy.label.clone(),
                        url: attempt.url.clone(),
                    },
                );
                return Ok(DeploymentSuccess {
                    attempt,
                    strategy,
                    failures: plan.failures().to_vec(),
                });
            }

            let failure = self.terminal_failure(index, &strategy, &attempt, &terminal).await;
            warn!(
                strategy = %strategy.label,
                deployment_id = %attempt.deployment_id,
                status = %terminal.status,
                error = %failure.message,
                "strategy failed"
            );
            emit(
                progress,
                ProgressEvent::StrategyFailed {
                    failure: failure.clone(),
                },
            );
            plan.record_failure(failure);
        }

        let err = plan.into_error();
        match &err {
            DeployError::Cancelled => info!("deployment cancelled"),
            other => {
                for failure in other.failures() {
                    debug!(%failure, "strategy failure");
                }
                warn!(error = %other, "deployment failed");
            }
        }
        Err(err)
    }

    async fn terminal_failure(
        &self,
        index: usize,
        strategy: &DeploymentStrategy,
        attempt: &DeploymentAttempt,
        terminal: &StatusUpdate,
    ) -> AttemptFailure {
        let kind = match terminal.status {
            DeploymentStatus::Canceled => FailureKind::BuildCanceled,
            _ => FailureKind::BuildFailed,
        };
        let message = terminal
            .error_message
            .clone()
            .unwrap_or_else(|| format!("deployment ended in {}", terminal.status));
        let log_tail = if kind == FailureKind::BuildFailed && self.log_limit > 0 {
            match self
                .hosting
                .deployment_logs(&attempt.deployment_id, self.log_limit)
                .await
            {
                Ok(tail) if !tail.trim().is_empty() => Some(tail),
                Ok(_) => None,
                Err(e) => {
                    debug!(deployment_id = %attempt.deployment_id, error = %e, "log fetch failed");
                    None
                }
            }
        } else {
            None
        };
        AttemptFailure::new(index, &strategy.label, kind, message)
            .with_deployment(attempt.deployment_id.clone())
            .with_error_code(terminal.error_code.clone())
            .with_log_tail(log_tail)
    }

    /// Spawn `run` and hand back a handle with a progress stream.
    pub fn start_deployment(
        self: &Arc<Self>,
        inputs: StrategyInputs,
        overrides: Vec<EnvVar>,
    ) -> DeploymentHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let orchestrator = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .run(&inputs, &overrides, &task_cancel, Some(&tx))
                .await
        });
        DeploymentHandle {
            progress: rx,
            cancel,
            task,
        }
    }
}

/// A running deployment: progress stream, cancellation and final result.
pub struct DeploymentHandle {
    progress: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancellationToken,
    task: JoinHandle<DeployResult<DeploymentSuccess>>,
}

impl DeploymentHandle {
    /// Next progress event; `None` once the deployment has finished.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> DeployResult<DeploymentSuccess> {
        self.task.await.unwrap_or_else(|e| {
            Err(DeployError::GenericDeployFailed(format!(
                "deployment task aborted: {e}"
            )))
        })
    }
}
