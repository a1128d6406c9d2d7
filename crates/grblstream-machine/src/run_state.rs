//! Run-state transition tables
//!
//! Two tables drive a job's run-state: one keyed by the status word the
//! controller reports, one keyed by the user's pause/resume intent. A pair
//! missing from a table leaves the state alone.

use grblstream_core::{ControllerStatus, RunState};

/// User intent that moves the run-state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    /// Feed hold requested
    Pause,
    /// Cycle start requested
    Resume,
}

/// Where a controller status report moves the run-state, if anywhere
pub fn status_transition(from: RunState, status: ControllerStatus) -> Option<RunState> {
    use ControllerStatus::*;
    use RunState::*;

    match (from, status) {
        (Running | Pausing | PausedDoorOpen, Hold) => Some(Paused),
        (Running | Pausing | Paused | Resuming, Door) => Some(PausedDoorOpen),
        (Paused | PausedDoorOpen | Resuming, Run | Idle) => Some(Running),
        _ => None,
    }
}

/// Where a user action moves the run-state, if anywhere
pub fn action_transition(from: RunState, action: RunAction) -> Option<RunState> {
    use RunState::*;

    match (from, action) {
        (Running | Resuming, RunAction::Pause) => Some(Pausing),
        (Paused | Pausing, RunAction::Resume) => Some(Resuming),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControllerStatus::{Door, Hold, Idle, Run};
    use RunState::*;

    const STATES: [RunState; 5] = [Running, Pausing, Paused, PausedDoorOpen, Resuming];

    #[test]
    fn test_status_table() {
        let expected = [
            (Running, [Some(Paused), Some(PausedDoorOpen), None, None]),
            (Pausing, [Some(Paused), Some(PausedDoorOpen), None, None]),
            (Paused, [None, Some(PausedDoorOpen), Some(Running), Some(Running)]),
            (PausedDoorOpen, [Some(Paused), None, Some(Running), Some(Running)]),
            (Resuming, [None, Some(PausedDoorOpen), Some(Running), Some(Running)]),
        ];

        for (from, row) in expected {
            for (status, to) in [Hold, Door, Run, Idle].into_iter().zip(row) {
                assert_eq!(status_transition(from, status), to, "{} + {}", from, status);
            }
        }
    }

    #[test]
    fn test_other_status_words_are_ignored() {
        for from in STATES {
            for status in [
                ControllerStatus::Alarm,
                ControllerStatus::Jog,
                ControllerStatus::Home,
                ControllerStatus::Unknown,
            ] {
                assert_eq!(status_transition(from, status), None);
            }
        }
    }

    #[test]
    fn test_action_table() {
        assert_eq!(action_transition(Running, RunAction::Pause), Some(Pausing));
        assert_eq!(action_transition(Paused, RunAction::Resume), Some(Resuming));
        assert_eq!(action_transition(Pausing, RunAction::Resume), Some(Resuming));
        assert_eq!(action_transition(Resuming, RunAction::Pause), Some(Pausing));

        assert_eq!(action_transition(Running, RunAction::Resume), None);
        assert_eq!(action_transition(Paused, RunAction::Pause), None);
        assert_eq!(action_transition(Pausing, RunAction::Pause), None);
        assert_eq!(action_transition(Resuming, RunAction::Resume), None);
        assert_eq!(action_transition(PausedDoorOpen, RunAction::Pause), None);
        assert_eq!(action_transition(PausedDoorOpen, RunAction::Resume), None);
    }
}
