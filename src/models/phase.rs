//! Supervisor session phase machine.

use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase of a supervision session.
///
/// Phases advance forward only; any phase before `Terminated` may jump to
/// `ShuttingDown`, and `Terminated` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    /// Plan validated, nothing spawned yet.
    Idle,
    /// First spawn of the launch walk in progress.
    Launching,
    /// Launch walk interleaving spawns and readiness waits.
    WaitingReady,
    /// Every service passed its readiness probe.
    AllReady,
    /// Steady state; exit polling active.
    Running,
    /// Teardown in progress.
    ShuttingDown,
    /// Every tracked process stopped; session over.
    Terminated,
}

impl SupervisorPhase {
    /// Determine whether a phase transition is permitted.
    #[must_use]
    pub fn can_advance_to(self, next: SupervisorPhase) -> bool {
        matches!(
            (self, next),
            (SupervisorPhase::Idle, SupervisorPhase::Launching)
                | (SupervisorPhase::Launching, SupervisorPhase::WaitingReady)
                | (SupervisorPhase::WaitingReady, SupervisorPhase::AllReady)
                | (SupervisorPhase::AllReady, SupervisorPhase::Running)
                | (
                    SupervisorPhase::Idle
                        | SupervisorPhase::Launching
                        | SupervisorPhase::WaitingReady
                        | SupervisorPhase::AllReady
                        | SupervisorPhase::Running,
                    SupervisorPhase::ShuttingDown
                )
                | (SupervisorPhase::ShuttingDown, SupervisorPhase::Terminated)
        )
    }

    /// Whether the session has fully ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SupervisorPhase::Terminated)
    }
}
