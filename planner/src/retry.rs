//! RetryPlan: the "try next strategy on failure" state machine.
//!
//! The plan owns the ordered strategies and the failure ledger. A driver
//! loop pulls attempts with `next_attempt()` and reports each outcome back;
//! the plan decides what happens next. No I/O happens here, so the same
//! plan drives real providers and in-process fakes alike.
//!
//! ```text
//!            next_attempt()              record_success()
//!  Ready ─────────────────▶ Running{i} ───────────────────▶ Succeeded{i}
//!    ▲                          │
//!    │   record_failure()       │ cancel()
//!    └──────────────────────────┤────────────────────────▶ Cancelled
//!                               │
//!          (no strategies left) └────────────────────────▶ Exhausted
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, FailureKind};
use crate::model::DeploymentStrategy;

/// Diagnostic record of one failed strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub strategy_index: usize,
    pub strategy_label: String,
    pub kind: FailureKind,
    /// Set when the provider accepted the deployment before it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Provider error code from the terminal status (e.g. `BUILD_FAILED`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
    /// Tail of the build log, when it could be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<String>,
}

impl AttemptFailure {
    pub fn new(
        strategy_index: usize,
        strategy_label: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            strategy_index,
            strategy_label: strategy_label.into(),
            kind,
            deployment_id: None,
            http_status: None,
            error_code: None,
            message: message.into(),
            log_tail: None,
        }
    }

    /// Build a failure record from a per-strategy start error.
    pub fn from_start_error(strategy_index: usize, label: &str, err: &DeployError) -> Self {
        let (kind, message) = match err {
            DeployError::ConfigRejected { message, .. } => {
                (FailureKind::ConfigRejected, message.clone())
            }
            DeployError::ProviderUnavailable { message, .. } => {
                (FailureKind::ProviderUnavailable, message.clone())
            }
            other => (FailureKind::ProviderUnavailable, other.to_string()),
        };
        let mut failure = Self::new(strategy_index, label, kind, message);
        failure.http_status = err.http_status();
        failure
    }

    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    pub fn with_error_code(mut self, code: Option<String>) -> Self {
        self.error_code = code;
        self
    }

    pub fn with_log_tail(mut self, tail: Option<String>) -> Self {
        self.log_tail = tail;
        self
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.strategy_label, self.kind)?;
        if let Some(status) = self.http_status {
            write!(f, " (HTTP {status})")?;
        }
        if let Some(code) = &self.error_code {
            write!(f, " {code}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Where the plan currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PlanState {
    /// Waiting for the driver to pull the next attempt.
    Ready,
    Running { index: usize },
    Succeeded { index: usize },
    Exhausted,
    Cancelled,
}

impl PlanState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Exhausted | Self::Cancelled
        )
    }
}

/// Ordered strategies plus the failure ledger.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    strategies: Vec<DeploymentStrategy>,
    cursor: usize,
    state: PlanState,
    failures: Vec<AttemptFailure>,
}

impl RetryPlan {
    pub fn new(strategies: Vec<DeploymentStrategy>) -> Self {
        let state = if strategies.is_empty() {
            PlanState::Exhausted
        } else {
            PlanState::Ready
        };
        Self {
            strategies,
            cursor: 0,
            state,
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn strategies(&self) -> &[DeploymentStrategy] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Failures recorded so far, in attempt order.
    pub fn failures(&self) -> &[AttemptFailure] {
        &self.failures
    }

    /// Number of strategies handed out so far.
    pub fn attempted(&self) -> usize {
        self.cursor
    }

    /// Pull the next strategy to attempt.
    ///
    /// Returns `None` once the plan is finished, or while an attempt is
    /// still running (its outcome must be recorded first).
    pub fn next_attempt(&mut self) -> Option<(usize, DeploymentStrategy)> {
        if self.state != PlanState::Ready {
            return None;
        }
        let index = self.cursor;
        let strategy = self.strategies.get(index)?.clone();
        self.cursor += 1;
        self.state = PlanState::Running { index };
        Some((index, strategy))
    }

    /// Record the running attempt's failure and move on.
    pub fn record_failure(&mut self, failure: AttemptFailure) {
        if !matches!(self.state, PlanState::Running { .. }) {
            return;
        }
        self.failures.push(failure);
        self.state = if self.cursor < self.strategies.len() {
            PlanState::Ready
        } else {
            PlanState::Exhausted
        };
    }

    /// Record that the running attempt reached READY.
    pub fn record_success(&mut self) -> Option<usize> {
        match self.state {
            PlanState::Running { index } => {
                self.state = PlanState::Succeeded { index };
                Some(index)
            }
            _ => None,
        }
    }

    /// Stop the plan. Remaining strategies are skipped and nothing is
    /// recorded as a failure.
    pub fn cancel(&mut self) {
        if !self.state.is_finished() {
            self.state = PlanState::Cancelled;
        }
    }

    /// The terminal error for a plan that did not succeed.
    ///
    /// The most recently recorded failure is the representative diagnostic.
    pub fn into_error(self) -> DeployError {
        if self.state == PlanState::Cancelled {
            return DeployError::Cancelled;
        }
        match self.failures.last() {
            Some(last) => DeployError::AllStrategiesExhausted {
                last: Box::new(last.clone()),
                failures: self.failures,
            },
            None => DeployError::GenericDeployFailed("no deployment strategy was attempted".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(label: &str) -> DeploymentStrategy {
        DeploymentStrategy {
            label: label.into(),
            root_directory: None,
            build_command: "npm run build".into(),
            start_command: "npm start".into(),
            install_command: None,
            output_directory: None,
            framework: None,
            env: Vec::new(),
        }
    }

    fn failure(index: usize, label: &str) -> AttemptFailure {
        AttemptFailure::new(index, label, FailureKind::BuildFailed, format!("{label} broke"))
    }

    #[test]
    fn walks_strategies_in_order_until_exhausted() {
        let mut plan = RetryPlan::new(vec![strategy("a"), strategy("b")]);
        let (i, s) = plan.next_attempt().unwrap();
        assert_eq!((i, s.label.as_str()), (0, "a"));
        assert!(plan.next_attempt().is_none(), "must record before advancing");
        plan.record_failure(failure(0, "a"));

        let (i, s) = plan.next_attempt().unwrap();
        assert_eq!((i, s.label.as_str()), (1, "b"));
        plan.record_failure(failure(1, "b"));

        assert_eq!(plan.state(), PlanState::Exhausted);
        assert!(plan.next_attempt().is_none());
        match plan.into_error() {
            DeployError::AllStrategiesExhausted { last, failures } => {
                assert_eq!(last.strategy_label, "b");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_stops_the_plan() {
        let mut plan = RetryPlan::new(vec![strategy("a"), strategy("b")]);
        plan.next_attempt();
        assert_eq!(plan.record_success(), Some(0));
        assert_eq!(plan.state(), PlanState::Succeeded { index: 0 });
        assert!(plan.next_attempt().is_none());
        assert_eq!(plan.attempted(), 1);
    }

    #[test]
    fn cancel_skips_remaining_without_recording() {
        let mut plan = RetryPlan::new(vec![strategy("a"), strategy("b"), strategy("c")]);
        plan.next_attempt();
        plan.cancel();
        assert!(plan.next_attempt().is_none());
        assert!(plan.failures().is_empty());
        assert!(plan.into_error().is_cancelled());
    }

    #[test]
    fn empty_plan_is_exhausted() {
        let mut plan = RetryPlan::new(Vec::new());
        assert!(plan.next_attempt().is_none());
        assert!(matches!(
            plan.into_error(),
            DeployError::GenericDeployFailed(_)
        ));
    }

    #[test]
    fn start_error_keeps_http_status() {
        let err = DeployError::ConfigRejected {
            status: 403,
            message: "token lacks scope".into(),
        };
        let failure = AttemptFailure::from_start_error(2, "root:web", &err);
        assert_eq!(failure.kind, FailureKind::ConfigRejected);
        assert_eq!(failure.http_status, Some(403));
        assert_eq!(
            failure.to_string(),
            "[root:web] config_rejected (HTTP 403): token lacks scope"
        );
    }
}
