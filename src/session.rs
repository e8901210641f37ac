//! Session controller: wires the supervisor to signals and the caller.
//!
//! The controller owns the session's outside edges. Signal delivery funnels
//! into [`SupervisorHandle::request_shutdown`], so however many triggers
//! arrive, teardown runs exactly once on the supervisor's own flow. The
//! caller supplies two collaborators: one invoked exactly once when the
//! whole stack is up, and one invoked with the [`LaunchError`] when startup
//! fails.

use tokio::task::JoinHandle;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::supervisor::{SessionOutcome, Supervisor, SupervisorHandle};
use crate::{AppError, LaunchError, StackConfig};

/// One supervised run of a service stack, end to end.
#[derive(Debug)]
pub struct SessionController {
    supervisor: Supervisor,
    session_id: String,
}

impl SessionController {
    /// Create a controller for one loaded configuration.
    #[must_use]
    pub fn new(config: StackConfig) -> Self {
        Self {
            supervisor: Supervisor::new(config),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Identifier for this run, included in log spans and fatal reports.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Shutdown trigger for this session.
    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        self.supervisor.handle()
    }

    /// Drive the whole session and return the process exit code.
    ///
    /// Launches the stack; on success calls `on_ready` once and holds the
    /// stack up until shutdown is requested or a service dies. On launch
    /// failure calls `on_fatal` with the [`LaunchError`]. Teardown has
    /// already completed by the time either path returns.
    pub async fn run<P, F>(mut self, on_ready: P, on_fatal: F) -> u8
    where
        P: FnOnce(),
        F: FnOnce(&LaunchError),
    {
        let _span = info_span!("session", id = %self.session_id).entered();
        info!("session starting");

        let signal_task = spawn_signal_listener(self.supervisor.handle());

        let code = match self.supervisor.run().await {
            Ok(()) => {
                on_ready();
                match self.supervisor.supervise().await {
                    SessionOutcome::CleanShutdown => 0,
                    SessionOutcome::UnexpectedExit { service, status } => {
                        AppError::UnexpectedExit { service, status }.exit_code()
                    }
                }
            }
            Err(launch_error) => {
                on_fatal(&launch_error);
                launch_error.cause.exit_code()
            }
        };

        signal_task.abort();
        info!(code, "session complete");
        code
    }
}

/// Spawn the task that turns OS signals into a shutdown request.
fn spawn_signal_listener(handle: SupervisorHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        debug!("signal listener triggering shutdown");
        let _ = handle.request_shutdown();
    })
}

/// Wait for SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}
