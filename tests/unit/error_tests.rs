//! Unit tests for `AppError` display formats and exit-code mapping.

use std::error::Error as _;
use std::time::Duration;

use stack_warden::{AppError, LaunchError};

/// Each variant renders with its documented prefix or phrasing.
#[test]
fn display_formats_are_stable() {
    assert_eq!(
        AppError::Config("bad value".into()).to_string(),
        "config: bad value"
    );
    assert_eq!(
        AppError::InvalidPlan("cycle".into()).to_string(),
        "invalid plan: cycle"
    );
    assert_eq!(
        AppError::Spawn {
            service: "api".into(),
            reason: "No such file or directory".into(),
        }
        .to_string(),
        "spawn failed for 'api': No such file or directory"
    );
    assert_eq!(
        AppError::ReadinessTimeout {
            service: "api".into(),
            deadline_ms: 30_000,
        }
        .to_string(),
        "service 'api' not ready within 30000ms deadline"
    );
    assert_eq!(
        AppError::UnexpectedExit {
            service: "api".into(),
            status: "exit code 3".into(),
        }
        .to_string(),
        "service 'api' exited unexpectedly: exit code 3"
    );
    assert_eq!(
        AppError::Interrupted.to_string(),
        "startup interrupted by shutdown request"
    );
    assert_eq!(AppError::Io("pipe closed".into()).to_string(), "io: pipe closed");
}

/// Exit codes stay distinct per failure class so callers can branch on them.
#[test]
fn exit_codes_map_by_failure_class() {
    assert_eq!(AppError::Io("x".into()).exit_code(), 1);
    assert_eq!(AppError::Config("x".into()).exit_code(), 2);
    assert_eq!(AppError::InvalidPlan("x".into()).exit_code(), 3);
    assert_eq!(
        AppError::Spawn {
            service: "a".into(),
            reason: "b".into(),
        }
        .exit_code(),
        4
    );
    assert_eq!(
        AppError::ReadinessTimeout {
            service: "a".into(),
            deadline_ms: 1,
        }
        .exit_code(),
        5
    );
    assert_eq!(
        AppError::UnexpectedExit {
            service: "a".into(),
            status: "b".into(),
        }
        .exit_code(),
        6
    );
    assert_eq!(AppError::Interrupted.exit_code(), 130);
}

/// TOML deserialization failures convert into `Config` errors.
#[test]
fn toml_errors_convert_to_config() {
    let toml_err = toml::from_str::<toml::Table>("x = [").expect_err("parse should fail");
    let err: AppError = toml_err.into();
    assert_eq!(err.exit_code(), 2);
    match err {
        AppError::Config(msg) => assert!(msg.starts_with("invalid config:"), "got: {msg}"),
        other => panic!("expected Config error, got {other:?}"),
    }
}

/// A launch error attributed to a service names it with the elapsed time.
#[test]
fn launch_error_display_names_failed_service() {
    let err = LaunchError {
        service: Some("backend".into()),
        cause: AppError::ReadinessTimeout {
            service: "backend".into(),
            deadline_ms: 1000,
        },
        attempted: Duration::from_millis(1234),
    };
    assert_eq!(
        err.to_string(),
        "launch failed at 'backend' after 1234ms: service 'backend' not ready within 1000ms deadline"
    );
}

/// Plan-validation failures precede any service and render as a rejection.
#[test]
fn launch_error_display_without_service_is_a_rejection() {
    let err = LaunchError {
        service: None,
        cause: AppError::InvalidPlan("dependency cycle involving: a, b".into()),
        attempted: Duration::from_millis(2),
    };
    assert_eq!(
        err.to_string(),
        "launch rejected: invalid plan: dependency cycle involving: a, b"
    );
}

/// The underlying `AppError` stays reachable through the error source chain.
#[test]
fn launch_error_exposes_cause_as_source() {
    let err = LaunchError {
        service: Some("api".into()),
        cause: AppError::Interrupted,
        attempted: Duration::from_secs(1),
    };
    let source = err.source().expect("source should be set");
    assert_eq!(source.to_string(), AppError::Interrupted.to_string());
}

/// Sub-millisecond attempts report zero without losing the duration.
#[test]
fn attempted_ms_truncates_to_whole_milliseconds() {
    let err = LaunchError {
        service: None,
        cause: AppError::Interrupted,
        attempted: Duration::from_micros(900),
    };
    assert_eq!(err.attempted_ms(), 0);

    let err = LaunchError {
        service: None,
        cause: AppError::Interrupted,
        attempted: Duration::from_millis(86_400_000),
    };
    assert_eq!(err.attempted_ms(), 86_400_000);
}
