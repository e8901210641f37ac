//! Service specification and per-process lifecycle types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_interval_ms() -> u64 {
    500
}

fn default_deadline_ms() -> u64 {
    30_000
}

/// Probe protocol for a readiness endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeProtocol {
    /// HTTP GET; ready on any 2xx response.
    #[default]
    Http,
}

/// Readiness endpoint description for one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessSpec {
    /// Probe protocol.
    #[serde(default)]
    pub protocol: ProbeProtocol,
    /// Host the endpoint listens on.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port of the endpoint.
    pub port: u16,
    /// Request path, must begin with `/`.
    #[serde(default = "default_path")]
    pub path: String,
    /// Poll interval in milliseconds; also the per-attempt timeout.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Overall readiness deadline in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl ReadinessSpec {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Readiness deadline as a [`Duration`].
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Full probe URL for this endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Immutable launch description for one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Unique service name used in logs, errors, and dependency references.
    pub name: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the process; relative paths are resolved
    /// against the config file's directory at load time.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment overrides merged over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Names of services that must be ready before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Per-service shutdown grace period; falls back to the stack default.
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    /// Readiness endpoint polled after spawn.
    pub readiness: ReadinessSpec,
}

impl ServiceSpec {
    /// Shutdown grace period, preferring the per-service override.
    #[must_use]
    pub fn grace_period(&self, stack_default_ms: u64) -> Duration {
        Duration::from_millis(self.grace_period_ms.unwrap_or(stack_default_ms))
    }
}

/// Lifecycle state of one supervised process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Spec loaded, nothing spawned.
    Pending,
    /// Spawn in progress.
    Starting,
    /// Process alive, readiness probe running.
    AwaitingReadiness,
    /// Readiness probe succeeded; later services still launching.
    Ready,
    /// Whole stack up, process in steady state.
    Running,
    /// Termination requested, grace window open.
    Stopping,
    /// Process reaped after a requested stop.
    Stopped,
    /// Spawn failed, readiness timed out, or the process exited on its own.
    Failed,
}

impl ServiceState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        matches!(
            (self, next),
            (ServiceState::Pending, ServiceState::Starting)
                | (
                    ServiceState::Starting,
                    ServiceState::AwaitingReadiness
                        | ServiceState::Stopping
                        | ServiceState::Failed
                )
                | (
                    ServiceState::AwaitingReadiness,
                    ServiceState::Ready | ServiceState::Stopping | ServiceState::Failed
                )
                | (
                    ServiceState::Ready,
                    ServiceState::Running | ServiceState::Stopping | ServiceState::Failed
                )
                | (
                    ServiceState::Running,
                    ServiceState::Stopping | ServiceState::Failed
                )
                | (ServiceState::Stopping, ServiceState::Stopped)
                | (
                    ServiceState::Failed,
                    ServiceState::Stopping | ServiceState::Stopped
                )
        )
    }

    /// Whether a process in this state has an OS process to tear down.
    #[must_use]
    pub fn needs_teardown(self) -> bool {
        !matches!(self, ServiceState::Pending | ServiceState::Stopped)
    }
}

/// How a supervised process left the process table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, when killed (unix only).
    pub signal: Option<i32>,
    /// When the exit was observed.
    pub at: DateTime<Utc>,
}

impl ExitInfo {
    /// Capture exit details from a reaped [`ExitStatus`].
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
            at: Utc::now(),
        }
    }

    /// Human-readable exit description for logs and errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}
