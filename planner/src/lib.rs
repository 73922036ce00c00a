//! Deployment planner
//!
//! Deterministic, I/O-free building blocks for deploying a source repository
//! to a hosting provider:
//! - Data model shared by every layer (strategies, attempts, tunnels)
//! - Root directory detection from repository file markers
//! - `StrategyBuilder`: ordered fallback deployment configurations
//! - `RetryPlan`: the explicit "try next strategy on failure" state machine
//! - Error taxonomy and categorization for user-visible failures
//! - Drift reconciliation for tunnel status checks
//!
//! The async runtime that talks to real providers lives in `launch-agent`;
//! everything here can be exercised without a network.
//!
//! # Flow
//!
//! ```text
//! repo file list ──detect_roots──▶ Detection
//!                                     │
//!            StrategyInputs ◀─────────┘
//!                 │
//!          StrategyBuilder::build
//!                 │
//!                 ▼
//!            RetryPlan ──next_attempt──▶ (index, strategy)
//!                 ▲                            │
//!                 └── record_failure / record_success
//! ```

pub mod detect;
pub mod drift;
pub mod error;
pub mod mobile;
pub mod model;
pub mod retry;
pub mod strategy;

pub use detect::{detect_roots, Detection, RootCandidate};
pub use drift::{reconcile, TunnelStatus};
pub use error::{categorize_deploy_failure, DeployError, DeployResult, FailureKind};
pub use model::{
    merge_env, DeploymentAttempt, DeploymentStatus, DeploymentStrategy, EnvTarget, EnvVar,
    Framework, MobileDeployment, RepoRef, StatusUpdate, TunnelRecord,
};
pub use retry::{AttemptFailure, PlanState, RetryPlan};
pub use strategy::{normalize_root, StrategyBuilder, StrategyInputs, StrategyOverrides};
