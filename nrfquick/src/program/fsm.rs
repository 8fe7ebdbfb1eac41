//! Programming flow state machine.
//!
//! Tracks one kit's programming lifecycle across retries. The machine has
//! no terminal state: it is re-entered for the lifetime of a session and
//! force-reset whenever the surrounding flow restarts (new device
//! selection).

use log::warn;

/// State of the programming flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// Waiting for the user to pick a programming choice.
    SelectFirmware,
    /// A pipeline is running.
    Programming,
    /// The pipeline completed.
    Success,
    /// The pipeline failed.
    Error {
        /// The failure was the trailing reset step; retry replays only the
        /// reset instead of the whole pipeline.
        reset_failed: bool,
    },
}

/// Events driving the programming flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramEvent {
    /// A choice was selected and its pipeline started.
    Start,
    /// The pipeline completed.
    Succeed,
    /// The pipeline failed.
    Fail {
        /// Whether the failing step was the trailing reset.
        reset_failed: bool,
    },
    /// Retry after a failure.
    Retry,
    /// Go back to choice selection after a success.
    Back,
}

/// The programming flow state machine.
#[derive(Debug)]
pub struct ProgramSession {
    state: ProgramState,
}

impl Default for ProgramSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramSession {
    /// Create a session in [`ProgramState::SelectFirmware`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ProgramState::SelectFirmware,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// Whether a retry should replay only the trailing reset step.
    #[must_use]
    pub fn reset_retry_pending(&self) -> bool {
        matches!(self.state, ProgramState::Error { reset_failed: true })
    }

    /// Apply an event. Invalid events for the current state are logged and
    /// leave the state unchanged.
    pub fn apply(&mut self, event: ProgramEvent) {
        let next = match (self.state, event) {
            (ProgramState::SelectFirmware, ProgramEvent::Start)
            | (ProgramState::Error { .. }, ProgramEvent::Retry) => ProgramState::Programming,
            (ProgramState::Programming, ProgramEvent::Succeed) => ProgramState::Success,
            (ProgramState::Programming, ProgramEvent::Fail { reset_failed }) => {
                ProgramState::Error { reset_failed }
            },
            (ProgramState::Success, ProgramEvent::Back) => ProgramState::SelectFirmware,
            (state, event) => {
                warn!("Ignoring programming event {event:?} in state {state:?}");
                state
            },
        };
        self.state = next;
    }

    /// Force the session back to choice selection from any state.
    pub fn reset(&mut self) {
        self.state = ProgramState::SelectFirmware;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut session = ProgramSession::new();
        assert_eq!(session.state(), ProgramState::SelectFirmware);

        session.apply(ProgramEvent::Start);
        assert_eq!(session.state(), ProgramState::Programming);

        session.apply(ProgramEvent::Succeed);
        assert_eq!(session.state(), ProgramState::Success);

        session.apply(ProgramEvent::Back);
        assert_eq!(session.state(), ProgramState::SelectFirmware);
    }

    #[test]
    fn test_failure_and_retry() {
        let mut session = ProgramSession::new();
        session.apply(ProgramEvent::Start);
        session.apply(ProgramEvent::Fail {
            reset_failed: false,
        });
        assert_eq!(
            session.state(),
            ProgramState::Error {
                reset_failed: false
            }
        );
        assert!(!session.reset_retry_pending());

        session.apply(ProgramEvent::Retry);
        assert_eq!(session.state(), ProgramState::Programming);
    }

    #[test]
    fn test_reset_failure_marks_reset_retry() {
        let mut session = ProgramSession::new();
        session.apply(ProgramEvent::Start);
        session.apply(ProgramEvent::Fail { reset_failed: true });
        assert!(session.reset_retry_pending());

        session.apply(ProgramEvent::Retry);
        assert_eq!(session.state(), ProgramState::Programming);
    }

    #[test]
    fn test_invalid_events_are_ignored() {
        let mut session = ProgramSession::new();
        session.apply(ProgramEvent::Succeed);
        assert_eq!(session.state(), ProgramState::SelectFirmware);

        session.apply(ProgramEvent::Start);
        session.apply(ProgramEvent::Back);
        assert_eq!(session.state(), ProgramState::Programming);
    }

    #[test]
    fn test_force_reset_from_any_state() {
        let mut session = ProgramSession::new();
        session.apply(ProgramEvent::Start);
        session.apply(ProgramEvent::Fail { reset_failed: true });
        session.reset();
        assert_eq!(session.state(), ProgramState::SelectFirmware);
    }
}
