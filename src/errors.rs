//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Dependency graph is cyclic, self-referential, or references an
    /// unknown or duplicated service. Never retried.
    InvalidPlan(String),
    /// Executable or working-directory problem while spawning a service.
    /// Fatal for the run, no retry.
    Spawn {
        /// Service whose process could not be spawned.
        service: String,
        /// OS-level reason reported by the spawn attempt.
        reason: String,
    },
    /// Service process started but never passed its readiness check
    /// within the configured deadline.
    ReadinessTimeout {
        /// Service that never became ready.
        service: String,
        /// Startup deadline that elapsed, in milliseconds.
        deadline_ms: u64,
    },
    /// A service that was still needed exited on its own.
    UnexpectedExit {
        /// Service whose process terminated.
        service: String,
        /// Human-readable exit description (code or signal).
        status: String,
    },
    /// Startup was aborted by an external shutdown request.
    Interrupted,
    /// File-system or runtime plumbing failure.
    Io(String),
}

impl AppError {
    /// Process exit code for this failure class.
    ///
    /// Calling tooling distinguishes configuration mistakes from transient
    /// startup failures by code: `2` config, `3` invalid plan, `4` spawn,
    /// `5` readiness timeout, `6` unexpected exit, `130` interrupted
    /// (conventional SIGINT code). Clean shutdown after the stack reached
    /// `Running` exits `0` and never goes through this mapping.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::InvalidPlan(_) => 3,
            Self::Spawn { .. } => 4,
            Self::ReadinessTimeout { .. } => 5,
            Self::UnexpectedExit { .. } => 6,
            Self::Interrupted => 130,
            Self::Io(_) => 1,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidPlan(msg) => write!(f, "invalid plan: {msg}"),
            Self::Spawn { service, reason } => {
                write!(f, "spawn failed for '{service}': {reason}")
            }
            Self::ReadinessTimeout {
                service,
                deadline_ms,
            } => {
                write!(
                    f,
                    "service '{service}' not ready within {deadline_ms}ms deadline"
                )
            }
            Self::UnexpectedExit { service, status } => {
                write!(f, "service '{service}' exited unexpectedly: {status}")
            }
            Self::Interrupted => write!(f, "startup interrupted by shutdown request"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

/// Terminal outcome of a failed launch attempt.
///
/// Produced by the supervisor when startup does not reach `Running`; the
/// session controller hands it to the fatal-failure reporter.
#[derive(Debug, Clone)]
pub struct LaunchError {
    /// Service the failure is tied to; `None` for plan-validation
    /// failures, which precede any service.
    pub service: Option<String>,
    /// Underlying failure.
    pub cause: AppError,
    /// Wall-clock duration of the whole launch attempt.
    pub attempted: Duration,
}

impl LaunchError {
    /// Attempt duration in whole milliseconds, saturating on overflow.
    #[must_use]
    pub fn attempted_ms(&self) -> u64 {
        u64::try_from(self.attempted.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Display for LaunchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.service {
            Some(service) => write!(
                f,
                "launch failed at '{service}' after {}ms: {}",
                self.attempted_ms(),
                self.cause
            ),
            None => write!(f, "launch rejected: {}", self.cause),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
