//! Launch agent
//!
//! Async runtime around `planner`: talks to the hosting, source and tunnel
//! providers, runs deployment strategies in order until one is READY, and
//! keeps a tunnel paired with a mobile client deployment.
//!
//! - `runner`: one create-deployment call per strategy
//! - `poller`: fixed-interval status polling with cancellation
//! - `orchestrator`: the strategy loop, progress stream and handle
//! - `tunnel_lifecycle`: create / verify / delete tunnels
//! - `mobile`: deploy, status check, recover and stop
//! - `record`: JSON record so later invocations can find the tunnel

pub mod config;
pub mod mobile;
pub mod orchestrator;
pub mod poller;
pub mod providers;
pub mod record;
pub mod runner;
pub mod tunnel_lifecycle;

pub use mobile::{MobileDeploymentCoordinator, MobileTarget};
pub use orchestrator::{
    resolve_inputs, DeploymentHandle, DeploymentSuccess, ProgressEvent, ProgressTx,
    RetryOrchestrator,
};
pub use poller::StatusPoller;
pub use record::MobileRecord;
pub use runner::DeploymentAttemptRunner;
pub use tunnel_lifecycle::TunnelLifecycleManager;
