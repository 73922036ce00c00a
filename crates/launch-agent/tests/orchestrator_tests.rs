//! Orchestration tests: StatusPoller and RetryOrchestrator against a fake
//! hosting provider. Time is paused, so poll intervals cost nothing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{failed, ready, transient, update, FakeHosting};
use launch_agent::providers::ProviderError;
use launch_agent::{ProgressEvent, RetryOrchestrator, StatusPoller};
use planner::{
    DeployError, DeploymentStatus, EnvVar, FailureKind, Framework, RepoRef, RootCandidate,
    StrategyBuilder, StrategyInputs, StrategyOverrides,
};
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_millis(2_000);

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Two detected roots plus the generic fallback: three strategies.
fn three_strategy_inputs() -> StrategyInputs {
    StrategyInputs::new(RepoRef::new("acme", "shop"), "main").with_candidates(
        vec![
            RootCandidate::new("apps/web", Some(Framework::NextJs)),
            RootCandidate::new("apps/api", Some(Framework::Node)),
        ],
        None,
    )
}

fn orchestrator(hosting: &Arc<FakeHosting>) -> RetryOrchestrator {
    RetryOrchestrator::new(hosting.clone(), INTERVAL)
}

// ── Property: poller emits every transition, resolves only on terminal ──────

#[tokio::test(start_paused = true)]
async fn poller_reports_building_building_ready_in_order() {
    let hosting = Arc::new(FakeHosting::new().script(
        1,
        vec![
            update(DeploymentStatus::Building),
            update(DeploymentStatus::Building),
            ready("https://shop.example"),
        ],
    ));
    let poller = StatusPoller::new(hosting.clone(), INTERVAL);
    let started = tokio::time::Instant::now();

    let mut seen = Vec::new();
    let terminal = poller
        .wait_for_terminal("dpl_1", &CancellationToken::new(), |u| seen.push(u.status))
        .await
        .unwrap();

    assert_eq!(
        seen,
        vec![
            DeploymentStatus::Building,
            DeploymentStatus::Building,
            DeploymentStatus::Ready
        ]
    );
    assert_eq!(terminal.status, DeploymentStatus::Ready);
    assert_eq!(terminal.url.as_deref(), Some("https://shop.example"));
    assert_eq!(hosting.polls.lock().unwrap().len(), 3);
    assert!(started.elapsed() >= INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn poller_survives_transient_error_between_polls() {
    let hosting = Arc::new(FakeHosting::new().script(
        1,
        vec![
            update(DeploymentStatus::Building),
            transient(),
            update(DeploymentStatus::Building),
            ready("https://shop.example"),
        ],
    ));
    let poller = StatusPoller::new(hosting.clone(), INTERVAL);

    let mut seen = Vec::new();
    let terminal = poller
        .wait_for_terminal("dpl_1", &CancellationToken::new(), |u| seen.push(u.status))
        .await
        .unwrap();

    assert_eq!(terminal.status, DeploymentStatus::Ready);
    assert_eq!(seen.len(), 3);
    assert_eq!(hosting.polls.lock().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn poller_stops_before_next_tick_when_cancelled() {
    let cancel = CancellationToken::new();
    let hosting = Arc::new(FakeHosting::new().cancel_at_poll(2, cancel.clone()));
    let poller = StatusPoller::new(hosting.clone(), INTERVAL);

    let result = poller.wait_for_terminal("dpl_1", &cancel, |_| {}).await;

    assert!(matches!(result, Err(DeployError::Cancelled)));
    // The in-flight request completed; no third poll was issued.
    assert_eq!(hosting.polls.lock().unwrap().len(), 2);
}

// ── Property: strategies run in order, first READY wins ─────────────────────

#[tokio::test(start_paused = true)]
async fn third_strategy_succeeds_after_two_errors() {
    let hosting = Arc::new(
        FakeHosting::new()
            .script(1, vec![update(DeploymentStatus::Building), failed("missing next.config")])
            .script(2, vec![failed("no start script")])
            .script(
                3,
                vec![
                    update(DeploymentStatus::Building),
                    ready("https://shop.example"),
                ],
            ),
    );
    let inputs = three_strategy_inputs();
    let expected = StrategyBuilder::build(&inputs);
    assert_eq!(expected.len(), 3);

    let success = orchestrator(&hosting)
        .run(&inputs, &[], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(success.attempt.strategy_index, 2);
    assert_eq!(success.attempt.deployment_id, "dpl_3");
    assert_eq!(success.url(), Some("https://shop.example"));
    assert_eq!(success.strategy, expected[2]);
    assert_eq!(
        hosting.created_roots(),
        expected
            .iter()
            .map(|s| s.root_directory.clone())
            .collect::<Vec<_>>()
    );

    let failed_indices: Vec<usize> = success.failures.iter().map(|f| f.strategy_index).collect();
    assert_eq!(failed_indices, vec![0, 1]);
    assert!(success.failures.iter().all(|f| f.kind == FailureKind::BuildFailed));
    assert_eq!(
        success.failures[0].log_tail.as_deref(),
        Some("npm ERR! build failed in dpl_1")
    );
}

#[tokio::test(start_paused = true)]
async fn all_errors_report_the_last_failure() {
    let hosting = Arc::new(
        FakeHosting::new()
            .script(1, vec![failed("first broke")])
            .script(2, vec![failed("second broke")])
            .script(3, vec![failed("third broke")]),
    );

    let err = orchestrator(&hosting)
        .run(&three_strategy_inputs(), &[], &CancellationToken::new(), None)
        .await
        .unwrap_err();

    match &err {
        DeployError::AllStrategiesExhausted { last, failures } => {
            assert_eq!(last.strategy_index, 2);
            assert_eq!(last.message, "third broke");
            assert_eq!(last.deployment_id.as_deref(), Some("dpl_3"));
            assert_eq!(failures.len(), 3);
        }
        other => panic!("expected AllStrategiesExhausted, got {other:?}"),
    }
    assert!(err.to_string().contains("third broke"));
    assert!(!err.to_string().contains("first broke"));
}

#[tokio::test(start_paused = true)]
async fn rejected_config_advances_to_next_strategy() {
    let hosting = Arc::new(
        FakeHosting::new()
            .create_results(vec![Some(ProviderError::Status {
                status: 422,
                message: "rootDirectory apps/web does not exist".into(),
            })])
            .script(2, vec![ready("https://shop.example")]),
    );

    let success = orchestrator(&hosting)
        .run(&three_strategy_inputs(), &[], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(success.attempt.strategy_index, 1);
    assert_eq!(success.failures.len(), 1);
    assert_eq!(success.failures[0].kind, FailureKind::ConfigRejected);
    assert_eq!(success.failures[0].http_status, Some(422));
    assert!(success.failures[0].deployment_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn provider_canceled_build_is_not_a_caller_cancel() {
    let hosting = Arc::new(
        FakeHosting::new()
            .script(1, vec![update(DeploymentStatus::Canceled)])
            .script(2, vec![ready("https://shop.example")]),
    );

    let success = orchestrator(&hosting)
        .run(&three_strategy_inputs(), &[], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(success.failures[0].kind, FailureKind::BuildCanceled);
    assert!(success.failures[0].log_tail.is_none());
    assert!(hosting.log_requests.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_overrides_make_exactly_one_attempt() {
    let hosting = Arc::new(FakeHosting::new().script(1, vec![failed("crashed")]));
    let inputs = three_strategy_inputs().with_overrides(StrategyOverrides {
        build_command: Some("make build".into()),
        start_command: Some("make serve".into()),
        ..Default::default()
    });

    let err = orchestrator(&hosting)
        .run(&inputs, &[], &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.failures().len(), 1);
    let creates = hosting.creates.lock().unwrap();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].build_command, "make build");
    assert_eq!(creates[0].start_command, "make serve");
}

#[tokio::test(start_paused = true)]
async fn strategy_env_overrides_reach_the_provider() {
    let hosting = Arc::new(FakeHosting::new().script(1, vec![ready("https://shop.example")]));
    let inputs = three_strategy_inputs().with_env(vec![
        EnvVar::new("API_URL", "https://general"),
        EnvVar::new("NODE_ENV", "production"),
    ]);

    orchestrator(&hosting)
        .run(
            &inputs,
            &[EnvVar::new("API_URL", "https://override")],
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

    let creates = hosting.creates.lock().unwrap();
    let api = creates[0].env.iter().find(|v| v.key == "API_URL").unwrap();
    assert_eq!(api.value, "https://override");
    assert!(creates[0].env.iter().any(|v| v.key == "NODE_ENV"));
}

// ── Property: cancellation stops before any further create ──────────────────

#[tokio::test(start_paused = true)]
async fn cancel_during_poll_stops_before_next_create() {
    let cancel = CancellationToken::new();
    let hosting = Arc::new(FakeHosting::new().cancel_at_poll(1, cancel.clone()));

    let err = orchestrator(&hosting)
        .run(&three_strategy_inputs(), &[], &cancel, None)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(hosting.create_count(), 1);
    assert_eq!(hosting.polls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_creates_nothing() {
    let hosting = Arc::new(FakeHosting::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(&hosting)
        .run(&three_strategy_inputs(), &[], &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Cancelled));
    assert_eq!(hosting.create_count(), 0);
}

// ── Handle and progress stream ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn handle_streams_progress_in_order() {
    let hosting = Arc::new(FakeHosting::new().script(
        1,
        vec![
            update(DeploymentStatus::Building),
            ready("https://shop.example"),
        ],
    ));
    let orchestrator = Arc::new(orchestrator(&hosting));

    let mut handle = orchestrator.start_deployment(three_strategy_inputs(), Vec::new());
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    let success = handle.wait().await.unwrap();

    assert_eq!(success.attempt.deployment_id, "dpl_1");
    assert_eq!(events.len(), 5);
    assert!(matches!(
        events[0],
        ProgressEvent::StrategyStarted { index: 0, total: 3, .. }
    ));
    assert!(matches!(events[1], ProgressEvent::AttemptCreated { .. }));
    match (&events[2], &events[3]) {
        (ProgressEvent::Status { update: a, .. }, ProgressEvent::Status { update: b, .. }) => {
            assert_eq!(a.status, DeploymentStatus::Building);
            assert_eq!(b.status, DeploymentStatus::Ready);
        }
        other => panic!("expected two status events, got {other:?}"),
    }
    assert!(matches!(events[4], ProgressEvent::Succeeded { index: 0, .. }));
}

#[tokio::test(start_paused = true)]
async fn handle_cancel_reports_cancelled() {
    let hosting = Arc::new(FakeHosting::new());
    let orchestrator = Arc::new(orchestrator(&hosting));

    let mut handle = orchestrator.start_deployment(three_strategy_inputs(), Vec::new());
    // Wait until the first deployment exists, then cancel.
    while let Some(event) = handle.next_event().await {
        if matches!(event, ProgressEvent::AttemptCreated { .. }) {
            handle.cancel();
        }
    }

    assert!(handle.wait().await.unwrap_err().is_cancelled());
    assert_eq!(hosting.create_count(), 1);
}
