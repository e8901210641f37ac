//! Single supervised process: spawn, readiness wait, graceful stop.
//!
//! Every child is spawned with `kill_on_drop(true)` so a panic or early
//! return in the supervisor can never leave an orphan behind. The normal
//! teardown path is explicit: SIGTERM, a bounded grace wait, then a forced
//! kill that is always logged.

use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::service::{ExitInfo, ServiceSpec, ServiceState};
use crate::probe::{ProbeOutcome, ReadinessProbe};
use crate::supervisor::output::spawn_drain;
use crate::{AppError, Result};

/// What ended a readiness wait first.
enum ReadyEvent {
    Cancelled,
    Exited(std::io::Result<std::process::ExitStatus>),
    Probe(ProbeOutcome),
}

/// One supervised OS process and its lifecycle bookkeeping.
#[derive(Debug)]
pub struct ServiceProcess {
    spec: ServiceSpec,
    state: ServiceState,
    child: Option<Child>,
    drain_cancel: CancellationToken,
    drain_tasks: Vec<JoinHandle<()>>,
    started_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    exit_info: Option<ExitInfo>,
}

impl ServiceProcess {
    /// Create the bookkeeping for one service; nothing is spawned yet.
    #[must_use]
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            state: ServiceState::Pending,
            child: None,
            drain_cancel: CancellationToken::new(),
            drain_tasks: Vec::new(),
            started_at: None,
            ready_at: None,
            exit_info: None,
        }
    }

    /// Service name from the spec.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Launch spec this process was created from.
    #[must_use]
    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// When the process was spawned.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the readiness probe first succeeded.
    #[must_use]
    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at
    }

    /// Exit details, once the process has been observed leaving the table.
    #[must_use]
    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit_info
    }

    /// Spawn the service process.
    ///
    /// The child inherits the supervisor's environment with the spec's
    /// overrides merged on top, runs in the spec's working directory, and
    /// has both output streams piped into drain tasks. A missing executable
    /// or working directory fails fast; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] naming the service when the OS spawn
    /// fails or the working directory does not exist.
    pub fn start(&mut self) -> Result<()> {
        self.transition(ServiceState::Starting);

        if let Some(dir) = &self.spec.working_dir {
            if !dir.is_dir() {
                let reason = format!("working directory '{}' does not exist", dir.display());
                self.transition(ServiceState::Failed);
                return Err(AppError::Spawn {
                    service: self.spec.name.clone(),
                    reason,
                });
            }
        }

        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args);
        for (key, value) in &self.spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.transition(ServiceState::Failed);
                return Err(AppError::Spawn {
                    service: self.spec.name.clone(),
                    reason: err.to_string(),
                });
            }
        };

        if let Some(stdout) = child.stdout.take() {
            self.drain_tasks.push(spawn_drain(
                self.spec.name.clone(),
                "stdout",
                stdout,
                self.drain_cancel.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            self.drain_tasks.push(spawn_drain(
                self.spec.name.clone(),
                "stderr",
                stderr,
                self.drain_cancel.clone(),
            ));
        }

        info!(
            service = %self.spec.name,
            pid = child.id().unwrap_or(0),
            command = %self.spec.command,
            "service spawned"
        );
        self.child = Some(child);
        self.started_at = Some(Utc::now());
        self.transition(ServiceState::AwaitingReadiness);
        Ok(())
    }

    /// Wait for the service to pass its readiness probe.
    ///
    /// Races the probe against the child exiting and against `cancel`. A
    /// readiness timeout marks the process `Failed` but does not kill it;
    /// that decision belongs to the teardown path. Cancellation returns
    /// promptly and leaves the state untouched so teardown still stops the
    /// process.
    ///
    /// # Errors
    ///
    /// - [`AppError::ReadinessTimeout`] — deadline passed with no 2xx.
    /// - [`AppError::UnexpectedExit`] — process exited before ready.
    /// - [`AppError::Interrupted`] — `cancel` fired first.
    pub async fn await_ready(&mut self, cancel: &CancellationToken) -> Result<()> {
        let probe = ReadinessProbe::new(&self.spec.readiness)?;
        let deadline = self.spec.readiness.deadline();
        info!(
            service = %self.spec.name,
            url = %probe.url(),
            deadline_ms = self.spec.readiness.deadline_ms,
            "waiting for readiness"
        );

        let event = {
            let Some(child) = self.child.as_mut() else {
                return Err(AppError::Io(format!(
                    "service '{}' has no process to await",
                    self.spec.name
                )));
            };
            tokio::select! {
                biased;

                () = cancel.cancelled() => ReadyEvent::Cancelled,
                result = child.wait() => ReadyEvent::Exited(result),
                outcome = probe.wait_ready(deadline) => ReadyEvent::Probe(outcome),
            }
        };

        match event {
            ReadyEvent::Cancelled => {
                debug!(service = %self.spec.name, "readiness wait interrupted");
                Err(AppError::Interrupted)
            }
            ReadyEvent::Exited(result) => {
                let info = match result {
                    Ok(status) => ExitInfo::from_status(status),
                    Err(err) => {
                        warn!(service = %self.spec.name, %err, "error waiting for service process");
                        ExitInfo {
                            code: None,
                            signal: None,
                            at: Utc::now(),
                        }
                    }
                };
                self.exit_info = Some(info);
                self.transition(ServiceState::Failed);
                Err(AppError::UnexpectedExit {
                    service: self.spec.name.clone(),
                    status: info.describe(),
                })
            }
            ReadyEvent::Probe(ProbeOutcome::Ready) => {
                self.ready_at = Some(Utc::now());
                self.transition(ServiceState::Ready);
                info!(service = %self.spec.name, "service ready");
                Ok(())
            }
            ReadyEvent::Probe(ProbeOutcome::TimedOut) => {
                self.transition(ServiceState::Failed);
                Err(AppError::ReadinessTimeout {
                    service: self.spec.name.clone(),
                    deadline_ms: self.spec.readiness.deadline_ms,
                })
            }
        }
    }

    /// Mark a `Ready` service as `Running` once the whole launch walk has
    /// moved past it.
    pub fn mark_running(&mut self) {
        self.transition(ServiceState::Running);
    }

    /// Check whether the process has exited on its own, recording details
    /// when it has. A poll error is treated as an exit so the dead entry is
    /// not re-polled forever.
    pub fn poll_exit(&mut self) -> Option<ExitInfo> {
        let child = self.child.as_mut()?;
        let info = match child.try_wait() {
            Ok(Some(status)) => ExitInfo::from_status(status),
            Ok(None) => return None,
            Err(err) => {
                warn!(service = %self.spec.name, %err, "failed to poll service process");
                ExitInfo {
                    code: None,
                    signal: None,
                    at: Utc::now(),
                }
            }
        };
        self.exit_info = Some(info);
        self.transition(ServiceState::Failed);
        Some(info)
    }

    /// Stop the process: SIGTERM, wait up to `grace`, then force kill.
    ///
    /// A process that was never spawned, already stopped, or already
    /// observed dead is a no-op apart from releasing its drain tasks.
    /// Escalation past the grace period is always logged at `warn`.
    pub async fn stop(&mut self, grace: Duration) {
        if !self.state.needs_teardown() {
            return;
        }
        let Some(mut child) = self.child.take() else {
            // Spawn failed; nothing alive to stop.
            self.release_drains().await;
            return;
        };
        if self.exit_info.is_some() {
            // Death already observed and recorded; just release the handle.
            self.release_drains().await;
            return;
        }

        self.transition(ServiceState::Stopping);
        info!(
            service = %self.spec.name,
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "stopping service"
        );

        Self::signal_terminate(&child, &self.spec.name);

        let status = match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                warn!(service = %self.spec.name, %err, "error waiting for service to exit");
                None
            }
            Err(_) => {
                warn!(
                    service = %self.spec.name,
                    "service did not exit within grace period, forcing kill"
                );
                if let Err(err) = child.kill().await {
                    warn!(service = %self.spec.name, %err, "failed to force-kill service");
                }
                child.try_wait().ok().flatten()
            }
        };

        let info = status.map_or_else(
            || ExitInfo {
                code: None,
                signal: None,
                at: Utc::now(),
            },
            ExitInfo::from_status,
        );
        self.exit_info = Some(info);
        // Drains are released only after the reap so grace-period output
        // still reaches the log.
        self.release_drains().await;
        self.transition(ServiceState::Stopped);
        info!(service = %self.spec.name, status = %info.describe(), "service stopped");
    }

    /// Cancel the drain tasks and wait for them to finish flushing.
    async fn release_drains(&mut self) {
        self.drain_cancel.cancel();
        for task in self.drain_tasks.drain(..) {
            if task.await.is_err() {
                debug!(service = %self.spec.name, "output drain task panicked");
            }
        }
    }

    /// Ask the process to terminate gracefully.
    #[cfg(unix)]
    fn signal_terminate(child: &Child, service: &str) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            return;
        };
        let Ok(pid) = i32::try_from(pid) else {
            return;
        };
        if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            warn!(service, %err, "failed to send SIGTERM");
        }
    }

    /// Non-unix platforms have no graceful signal; the grace wait in
    /// [`ServiceProcess::stop`] still gives the process time to exit on its
    /// own before the forced kill.
    #[cfg(not(unix))]
    fn signal_terminate(_child: &Child, _service: &str) {}

    fn transition(&mut self, next: ServiceState) {
        if self.state.can_transition_to(next) {
            debug!(service = %self.spec.name, from = ?self.state, to = ?next, "state transition");
        } else {
            warn!(service = %self.spec.name, from = ?self.state, to = ?next, "irregular state transition");
        }
        self.state = next;
    }
}
