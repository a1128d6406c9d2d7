//! Data models shared between the machine controller and its collaborators
//!
//! Provides:
//! - Axis triples and derived machine/work positions
//! - Controller status words and the job run-state
//! - Override snapshots, run-time records and port-lost diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the three linear axes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axes {
    /// X axis
    pub x: f64,
    /// Y axis
    pub y: f64,
    /// Z axis
    pub z: f64,
}

impl Axes {
    /// Create a new axis triple
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum
    pub fn add(&self, other: &Axes) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise difference
    pub fn subtract(&self, other: &Axes) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Machine and work coordinates of the tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Absolute machine coordinates
    pub machine: Axes,
    /// Coordinates relative to the active work offset
    pub work: Axes,
}

impl Position {
    /// Derive a full position from a partial controller report.
    ///
    /// A report carrying both coordinate sets is taken as is. Otherwise the
    /// missing set is reconstructed from the work coordinate offset, which
    /// must be known. Returns `None` when neither route applies.
    pub fn derive(report: &PositionReport, offset: Option<&Axes>) -> Option<Self> {
        match (report.machine, report.work, offset) {
            (Some(machine), Some(work), _) => Some(Self { machine, work }),
            (Some(machine), None, Some(offset)) => Some(Self {
                machine,
                work: machine.subtract(offset),
            }),
            (None, Some(work), Some(offset)) => Some(Self {
                machine: work.add(offset),
                work,
            }),
            _ => None,
        }
    }
}

/// Position fields carried by a single controller status report
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionReport {
    /// Machine position, if reported
    pub machine: Option<Axes>,
    /// Work position, if reported
    pub work: Option<Axes>,
    /// Work coordinate offset, if reported
    pub work_coordinate_offset: Option<Axes>,
}

/// Low-level status word reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerStatus {
    /// Idle, ready for motion
    Idle,
    /// Executing motion
    Run,
    /// Feed hold in progress or complete
    Hold,
    /// Safety door open
    Door,
    /// Jogging
    Jog,
    /// Alarm lock
    Alarm,
    /// Homing cycle
    Home,
    /// Check mode
    Check,
    /// Sleep mode
    Sleep,
    /// Anything else
    Unknown,
}

impl ControllerStatus {
    /// Map a status word (case-insensitive, with or without a `:substate`
    /// suffix) onto a status
    pub fn from_word(word: &str) -> Self {
        let head = word.split(':').next().unwrap_or_default();
        match head.trim().to_ascii_lowercase().as_str() {
            "idle" => Self::Idle,
            "run" => Self::Run,
            "hold" => Self::Hold,
            "door" => Self::Door,
            "jog" => Self::Jog,
            "alarm" => Self::Alarm,
            "home" => Self::Home,
            "check" => Self::Check,
            "sleep" => Self::Sleep,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Idle => "idle",
            Self::Run => "run",
            Self::Hold => "hold",
            Self::Door => "door",
            Self::Jog => "jog",
            Self::Alarm => "alarm",
            Self::Home => "home",
            Self::Check => "check",
            Self::Sleep => "sleep",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", word)
    }
}

/// Job-level pause/resume/door lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Streaming normally
    #[default]
    Running,
    /// Pause requested, waiting for the controller to hold
    Pausing,
    /// Controller is holding
    Paused,
    /// Controller stopped because the safety door opened
    PausedDoorOpen,
    /// Resume requested, waiting for the controller to run
    Resuming,
}

impl RunState {
    /// True for the states reported to clients as paused
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Pausing | Self::Paused | Self::PausedDoorOpen)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "RUNNING",
            Self::Pausing => "PAUSING",
            Self::Paused => "PAUSED",
            Self::PausedDoorOpen => "PAUSED_DOOR_OPEN",
            Self::Resuming => "RESUMING",
        };
        write!(f, "{}", name)
    }
}

/// Current state of one override class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Override percentage applied to the programmed rate
    pub percentage: u32,
    /// Effective rate, once a programmed rate has been seen
    pub value: Option<f64>,
    /// Unit of `value`
    pub unit: Option<String>,
}

/// Feed and spindle override state reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSnapshot {
    /// Feed rate override
    pub feed_rate: RateSnapshot,
    /// Spindle speed override
    pub spindle_speed: RateSnapshot,
}

/// Wall-clock span of uninterrupted running, in milliseconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTime {
    /// When running started
    pub start: u64,
    /// When running ended
    pub end: u64,
}

/// Diagnostic attached to a lost-port notification
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortLostDiagnostic {
    /// Last command acknowledged by the controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_instruction: Option<String>,
    /// Commands that were in flight when the port went away
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub active_buffer: Vec<String>,
    /// Human readable note
    pub sender_note: String,
}

impl PortLostDiagnostic {
    /// A diagnostic carrying only a note
    pub fn note(message: impl Into<String>) -> Self {
        Self {
            sender_note: message.into(),
            ..Default::default()
        }
    }
}

/// Which echo channels are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EchoFlags {
    /// Track sent lines against controller echoes
    #[serde(default)]
    pub file: bool,
    /// Mirror raw serial traffic to clients
    #[serde(default)]
    pub socket: bool,
}

/// Direction of mirrored serial traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoDirection {
    /// Data written to the controller
    Write,
    /// Data read from the controller
    Read,
}

/// Connection bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Whether the controller announced itself
    pub is_machine_connected: bool,
    /// Banner sent by the controller when it became ready
    pub machine_identification: Option<String>,
    /// Number of remote clients attached
    pub connected_client_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_position_with_both_sets() {
        let report = PositionReport {
            machine: Some(Axes::new(1.0, 2.0, 3.0)),
            work: Some(Axes::new(0.5, 0.5, 0.5)),
            work_coordinate_offset: None,
        };
        let position = Position::derive(&report, None).unwrap();
        assert_eq!(position.machine, Axes::new(1.0, 2.0, 3.0));
        assert_eq!(position.work, Axes::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_derive_position_from_offset() {
        let offset = Axes::new(10.0, 20.0, -5.0);

        let from_machine = PositionReport {
            machine: Some(Axes::new(15.0, 25.0, 0.0)),
            ..Default::default()
        };
        let position = Position::derive(&from_machine, Some(&offset)).unwrap();
        assert_eq!(position.work, Axes::new(5.0, 5.0, 5.0));

        let from_work = PositionReport {
            work: Some(Axes::new(5.0, 5.0, 5.0)),
            ..Default::default()
        };
        let position = Position::derive(&from_work, Some(&offset)).unwrap();
        assert_eq!(position.machine, Axes::new(15.0, 25.0, 0.0));
    }

    #[test]
    fn test_derive_position_without_offset() {
        let report = PositionReport {
            machine: Some(Axes::new(1.0, 1.0, 1.0)),
            ..Default::default()
        };
        assert!(Position::derive(&report, None).is_none());
    }

    #[test]
    fn test_status_words() {
        assert_eq!(ControllerStatus::from_word("Hold:0"), ControllerStatus::Hold);
        assert_eq!(ControllerStatus::from_word("door"), ControllerStatus::Door);
        assert_eq!(ControllerStatus::from_word("Idle"), ControllerStatus::Idle);
        assert_eq!(ControllerStatus::from_word("???"), ControllerStatus::Unknown);
    }

    #[test]
    fn test_run_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunState::PausedDoorOpen).unwrap(),
            "\"PAUSED_DOOR_OPEN\""
        );
        assert_eq!(RunState::Resuming.to_string(), "RESUMING");
        assert!(RunState::Pausing.is_paused());
        assert!(!RunState::Resuming.is_paused());
    }
}
