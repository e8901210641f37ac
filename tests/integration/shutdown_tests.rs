//! Integration tests for shutdown ordering, idempotency, and escalation.

use std::time::Duration;

use stack_warden::models::phase::SupervisorPhase;
use stack_warden::models::service::ServiceState;
use stack_warden::supervisor::{SessionOutcome, Supervisor};
use stack_warden::AppError;

use super::test_helpers::{process, refused_port, serve_ready_endpoint, sh_service, stack};

/// A shutdown request ends supervision cleanly and tears the stack down in
/// reverse start order.
#[tokio::test]
async fn shutdown_request_tears_down_in_reverse_order() {
    let (backend_port, backend_token) = serve_ready_endpoint().await;
    let (frontend_port, frontend_token) = serve_ready_endpoint().await;

    let config = stack(
        2000,
        vec![
            sh_service("backend", "sleep 30", backend_port, &[]),
            sh_service("frontend", "sleep 30", frontend_port, &["backend"]),
        ],
    );
    let mut supervisor = Supervisor::new(config);
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("launch should finish in time")
        .expect("launch should succeed");

    let handle = supervisor.handle();
    assert!(!handle.is_shutdown_requested());
    assert!(handle.request_shutdown());

    let outcome = tokio::time::timeout(Duration::from_secs(10), supervisor.supervise())
        .await
        .expect("supervision should end after the shutdown request");
    assert_eq!(outcome, SessionOutcome::CleanShutdown);
    assert_eq!(supervisor.phase(), SupervisorPhase::Terminated);

    let backend = process(&supervisor, "backend");
    let frontend = process(&supervisor, "frontend");
    assert_eq!(backend.state(), ServiceState::Stopped);
    assert_eq!(frontend.state(), ServiceState::Stopped);

    let backend_at = backend.exit_info().expect("backend exit info").at;
    let frontend_at = frontend.exit_info().expect("frontend exit info").at;
    assert!(
        frontend_at <= backend_at,
        "frontend must stop before backend: {frontend_at} vs {backend_at}"
    );

    backend_token.cancel();
    frontend_token.cancel();
}

/// A readiness failure partway through launch tears down the started
/// prefix in reverse start order.
#[tokio::test]
async fn mid_launch_failure_tears_down_prefix_in_reverse() {
    let (db_port, db_token) = serve_ready_endpoint().await;
    let (api_port, api_token) = serve_ready_endpoint().await;
    let mut web = sh_service("web", "sleep 30", refused_port(), &["api"]);
    web.readiness.interval_ms = 100;
    web.readiness.deadline_ms = 600;

    let config = stack(
        2000,
        vec![
            sh_service("db", "sleep 30", db_port, &[]),
            sh_service("api", "sleep 30", api_port, &["db"]),
            web,
        ],
    );
    let mut supervisor = Supervisor::new(config);
    let err = tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("launch should finish in time")
        .expect_err("web can never become ready");

    assert_eq!(err.service.as_deref(), Some("web"));
    assert_eq!(supervisor.phase(), SupervisorPhase::Terminated);

    let names: Vec<&str> = supervisor.processes().iter().map(|entry| entry.name()).collect();
    assert_eq!(names, ["db", "api", "web"], "all three must have been spawned");
    for entry in supervisor.processes() {
        assert_eq!(entry.state(), ServiceState::Stopped, "{}", entry.name());
    }

    let web_at = process(&supervisor, "web").exit_info().expect("web exit info").at;
    let api_at = process(&supervisor, "api").exit_info().expect("api exit info").at;
    let db_at = process(&supervisor, "db").exit_info().expect("db exit info").at;
    assert!(web_at <= api_at, "web must stop before api: {web_at} vs {api_at}");
    assert!(api_at <= db_at, "api must stop before db: {api_at} vs {db_at}");

    db_token.cancel();
    api_token.cancel();
}

/// Only the first shutdown request wins; later requests change nothing.
#[tokio::test]
async fn first_shutdown_request_wins() {
    let config = stack(1000, vec![sh_service("api", "sleep 30", 9001, &[])]);
    let supervisor = Supervisor::new(config);
    let handle = supervisor.handle();

    assert!(handle.request_shutdown());
    assert!(!handle.request_shutdown());
    assert!(handle.is_shutdown_requested());
}

/// Repeated shutdown calls after termination are no-ops.
#[tokio::test]
async fn shutdown_is_idempotent() {
    let (port, token) = serve_ready_endpoint().await;
    let config = stack(1000, vec![sh_service("api", "sleep 30", port, &[])]);
    let mut supervisor = Supervisor::new(config);
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("launch should finish in time")
        .expect("launch should succeed");

    tokio::time::timeout(Duration::from_secs(10), supervisor.shutdown())
        .await
        .expect("shutdown should finish in time");
    let first_exit = process(&supervisor, "api").exit_info().expect("exit info");

    supervisor.shutdown().await;
    assert_eq!(supervisor.phase(), SupervisorPhase::Terminated);
    let second_exit = process(&supervisor, "api").exit_info().expect("exit info");
    assert_eq!(first_exit.at, second_exit.at, "second shutdown must not re-stop");

    token.cancel();
}

/// A service that ignores SIGTERM is force-killed once its grace period
/// elapses.
#[tokio::test]
async fn stubborn_service_is_force_killed_after_grace() {
    let (port, token) = serve_ready_endpoint().await;
    let mut stubborn = sh_service("stubborn", r#"trap "" TERM; sleep 30"#, port, &[]);
    stubborn.grace_period_ms = Some(300);

    let config = stack(5000, vec![stubborn]);
    let mut supervisor = Supervisor::new(config);
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("launch should finish in time")
        .expect("launch should succeed");

    let started = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(10), supervisor.shutdown())
        .await
        .expect("shutdown should finish in time");
    let elapsed = started.elapsed();

    assert!(
        elapsed >= Duration::from_millis(300),
        "grace period must elapse before the kill, took {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(5),
        "escalation must not wait out the full sleep, took {elapsed:?}"
    );

    let entry = process(&supervisor, "stubborn");
    assert_eq!(entry.state(), ServiceState::Stopped);
    let info = entry.exit_info().expect("exit info after forced kill");
    assert_eq!(info.signal, Some(9), "expected SIGKILL, got {}", info.describe());

    token.cancel();
}

/// A shutdown request that lands before launch aborts it with nothing
/// spawned.
#[tokio::test]
async fn shutdown_before_launch_interrupts_it() {
    let config = stack(1000, vec![sh_service("api", "sleep 30", refused_port(), &[])]);
    let mut supervisor = Supervisor::new(config);
    assert!(supervisor.handle().request_shutdown());

    let err = supervisor.run().await.expect_err("interrupted launch should fail");

    assert!(err.service.is_none(), "interruption is not a service failure");
    assert_eq!(err.cause, AppError::Interrupted);
    assert_eq!(err.cause.exit_code(), 130);
    assert!(supervisor.processes().is_empty());
    assert_eq!(supervisor.phase(), SupervisorPhase::Terminated);
}
