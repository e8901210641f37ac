//! Supervision core: launch walk, steady-state exit polling, teardown.
//!
//! The supervisor is the sole owner of the process table. All teardown runs
//! on its own sequential flow; external triggers only request shutdown
//! through a [`SupervisorHandle`] and never touch a process directly.

pub mod output;
pub mod process;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

use crate::models::phase::SupervisorPhase;
use crate::models::plan::DependencyPlan;
use crate::models::service::ServiceState;
use crate::supervisor::process::ServiceProcess;
use crate::{AppError, LaunchError, StackConfig};

/// Poll cadence for unexpected-exit detection while the stack is running.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Cloneable shutdown trigger for a supervision session.
///
/// Signal handlers and other tasks call [`SupervisorHandle::request_shutdown`];
/// the supervisor observes the request on its own flow. The first trigger
/// wins, every later one is a no-op.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    cancel: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl SupervisorHandle {
    /// Request session shutdown.
    ///
    /// Returns `true` for the first caller; later calls return `false` and
    /// change nothing. Safe to call from any task or thread.
    #[must_use]
    pub fn request_shutdown(&self) -> bool {
        let first = self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            info!("shutdown requested");
            self.cancel.cancel();
        } else {
            debug!("shutdown already requested, ignoring");
        }
        first
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Terminal outcome of a session that reached `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Shutdown was requested and teardown completed.
    CleanShutdown,
    /// A needed service exited on its own; the rest were torn down.
    UnexpectedExit {
        /// Service whose process died.
        service: String,
        /// Human-readable exit description.
        status: String,
    },
}

/// Drives one stack session: ordered launch, readiness gating, exit
/// polling, and reverse-order teardown.
#[derive(Debug)]
pub struct Supervisor {
    config: StackConfig,
    plan: Option<DependencyPlan>,
    processes: Vec<ServiceProcess>,
    phase: SupervisorPhase,
    cancel: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
}

impl Supervisor {
    /// Create a supervisor for one loaded configuration.
    ///
    /// Plan validation is deferred to [`Supervisor::run`] so that a
    /// malformed graph surfaces as a launch failure, not a construction
    /// panic.
    #[must_use]
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            plan: None,
            processes: Vec::new(),
            phase: SupervisorPhase::Idle,
            cancel: CancellationToken::new(),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shutdown trigger for this session.
    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            cancel: self.cancel.clone(),
            requested: Arc::clone(&self.shutdown_requested),
        }
    }

    /// Current session phase.
    #[must_use]
    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    /// Validated plan, once [`Supervisor::run`] has built it.
    #[must_use]
    pub fn plan(&self) -> Option<&DependencyPlan> {
        self.plan.as_ref()
    }

    /// Process table in start order.
    #[must_use]
    pub fn processes(&self) -> &[ServiceProcess] {
        &self.processes
    }

    /// Validate the plan and launch every service in dependency order.
    ///
    /// Services start strictly sequentially: each must pass its readiness
    /// probe before the next is spawned. On any failure, everything already
    /// spawned is torn down in reverse start order before this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] carrying the failing service (when one is
    /// attributable), the underlying cause, and the wall-clock duration of
    /// the whole attempt.
    pub async fn run(&mut self) -> std::result::Result<(), LaunchError> {
        let launch_started = Instant::now();
        if let Err((service, cause)) = self.launch().await {
            self.shutdown().await;
            return Err(LaunchError {
                service,
                cause,
                attempted: launch_started.elapsed(),
            });
        }

        self.advance(SupervisorPhase::AllReady);
        for process in &mut self.processes {
            if process.state() == ServiceState::Ready {
                process.mark_running();
            }
        }
        self.advance(SupervisorPhase::Running);
        info!(
            services = self.processes.len(),
            elapsed_ms = u64::try_from(launch_started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "all services ready"
        );
        Ok(())
    }

    /// The launch walk; on error, teardown is the caller's job.
    async fn launch(&mut self) -> std::result::Result<(), (Option<String>, AppError)> {
        let plan = match DependencyPlan::build(&self.config.services) {
            Ok(plan) => plan,
            Err(err) => return Err((None, err)),
        };
        info!(order = ?plan.start_order(), "launch plan resolved");
        let order = plan.services().to_vec();
        self.plan = Some(plan);
        self.advance(SupervisorPhase::Launching);

        for spec in order {
            // Services the walk has moved past are up for good.
            for passed in &mut self.processes {
                if passed.state() == ServiceState::Ready {
                    passed.mark_running();
                }
            }
            if self.shutdown_requested.load(Ordering::SeqCst) {
                return Err((None, AppError::Interrupted));
            }

            let name = spec.name.clone();
            let span = info_span!("launch_service", service = %name);
            let _guard = span.enter();

            let mut process = ServiceProcess::new(spec);
            let started = process.start();
            self.processes.push(process);
            if let Err(err) = started {
                return Err((Some(name), err));
            }
            if self.phase == SupervisorPhase::Launching {
                self.advance(SupervisorPhase::WaitingReady);
            }

            let index = self.processes.len() - 1;
            if let Err(err) = self.processes[index].await_ready(&self.cancel).await {
                // Interruption is not attributable to the service that
                // happened to be waiting.
                let service = if matches!(err, AppError::Interrupted) {
                    None
                } else {
                    Some(name)
                };
                return Err((service, err));
            }
        }

        Ok(())
    }

    /// Steady-state wait: poll for unexpected exits until one happens or
    /// shutdown is requested, then tear everything down.
    pub async fn supervise(&mut self) -> SessionOutcome {
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!("shutdown request received");
                    self.shutdown().await;
                    return SessionOutcome::CleanShutdown;
                }

                () = tokio::time::sleep(EXIT_POLL_INTERVAL) => {}
            }

            if let Some((service, status)) = self.poll_exits() {
                warn!(service = %service, status = %status, "service exited unexpectedly");
                self.shutdown().await;
                return SessionOutcome::UnexpectedExit { service, status };
            }
        }
    }

    /// Stop every tracked process in reverse start order.
    ///
    /// Valid from any phase; once the session is `Terminated` this is a
    /// no-op, so repeated calls cost nothing.
    pub async fn shutdown(&mut self) {
        if self.phase.is_terminal() {
            debug!("shutdown already complete");
            return;
        }
        self.advance(SupervisorPhase::ShuttingDown);
        let default_grace = self.config.grace_period_ms;
        for process in self.processes.iter_mut().rev() {
            let grace = process.spec().grace_period(default_grace);
            process.stop(grace).await;
        }
        self.advance(SupervisorPhase::Terminated);
        info!("all services stopped");
    }

    /// One sweep over the running processes; reports the first exit found.
    fn poll_exits(&mut self) -> Option<(String, String)> {
        for process in &mut self.processes {
            if process.state() != ServiceState::Running {
                continue;
            }
            if let Some(info) = process.poll_exit() {
                return Some((process.name().to_string(), info.describe()));
            }
        }
        None
    }

    fn advance(&mut self, next: SupervisorPhase) {
        if self.phase.can_advance_to(next) {
            debug!(from = ?self.phase, to = ?next, "phase advanced");
        } else {
            warn!(from = ?self.phase, to = ?next, "irregular phase advance");
        }
        self.phase = next;
    }
}
