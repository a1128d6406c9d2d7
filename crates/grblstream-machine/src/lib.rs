//! GRBL job controller
//!
//! Streams gcode to a GRBL-class controller under its character-counting
//! flow control, tracks the job's run-state from status reports and user
//! intent, and sequences the multi-step stop and firmware upload handshakes.
//!
//! - [`Machine`] is the synchronous controller state
//! - [`driver`] runs a machine on a tokio task behind a command channel

pub mod driver;
pub mod echo;
pub mod gcode;
pub mod machine;
pub mod rate_tracker;
pub mod run_state;
pub mod scheduler;

pub use driver::{MachineCommand, MachineHandle};
pub use echo::{EchoLedger, EchoOutcome, ECHO_RING_SIZE};
pub use machine::{FirmwareContinuation, Job, Machine, StopStage};
pub use rate_tracker::{RateTracker, RateTrackerConfig};
pub use run_state::{action_transition, status_transition, RunAction};
pub use scheduler::{TimerId, TimerQueue};
