//! # grblstream Core
//!
//! Core types, errors and event plumbing for grblstream.
//! Provides the data model shared by the machine controller, the serial
//! transport and whatever bridge exposes the machine to clients.

pub mod clock;
pub mod data;
pub mod error;
pub mod event;

pub use clock::{Clock, ManualClock, SystemClock};

pub use data::{
    Axes, ConnectionState, ControllerStatus, EchoDirection, EchoFlags, OverrideSnapshot,
    PortLostDiagnostic, Position, PositionReport, RateSnapshot, RunState, RunTime,
};

pub use error::{ConnectionError, ControllerError, Error, Result};

pub use event::{EventDispatcher, MachineEvent, ProbeResult, SubscriptionId};
