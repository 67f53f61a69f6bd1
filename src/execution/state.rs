//! Execution lifecycle state machine.

use tokio::sync::watch;
use tracing::debug;

use crate::error::CommandError;

/// Lifecycle state of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    /// Command has been created but no process exists yet.
    #[default]
    Created,
    /// Pipes are open and the process is running.
    Started,
    /// Line readers are attached to both pipes.
    Merging,
    /// Merged output is being delivered to the caller.
    Draining,
    /// The wait call returned.
    Waited,
    /// Final state has been published.
    Finalized,
}

impl ExecState {
    /// Check if transition to target state is valid.
    ///
    /// Only single forward steps are allowed:
    /// Created -> Started -> Merging -> Draining -> Waited -> Finalized
    pub fn can_transition_to(&self, target: ExecState) -> bool {
        use ExecState::*;
        matches!(
            (*self, target),
            (Created, Started)
                | (Started, Merging)
                | (Merging, Draining)
                | (Draining, Waited)
                | (Waited, Finalized)
        )
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: ExecState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(CommandError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecState::Finalized)
    }

    /// Check if a process has been spawned for this execution.
    pub fn is_started(&self) -> bool {
        !matches!(self, ExecState::Created)
    }
}

/// Owner side of an execution's state.
///
/// The state is published through a watch channel so the command can
/// observe progress made by the finalize task without sharing a lock.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    tx: watch::Sender<ExecState>,
}

impl Lifecycle {
    pub(crate) fn new() -> (Self, watch::Receiver<ExecState>) {
        let (tx, rx) = watch::channel(ExecState::Created);
        (Self { tx }, rx)
    }

    pub(crate) fn current(&self) -> ExecState {
        *self.tx.borrow()
    }

    /// Advance to `target`, rejecting anything but the next step.
    pub(crate) fn advance(&self, target: ExecState) -> crate::Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|state| match state.transition_to(target) {
            Ok(()) => true,
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        if outcome.is_ok() {
            debug!(state = ?target, "execution state advanced");
        }
        outcome
    }
}
