//! # grblstream Communication
//!
//! The serial side of grblstream: the [`Transport`] boundary and its serial
//! binding, the two-lane byte-budgeted [`CommandQueue`], and classification
//! of GRBL output lines into [`ControllerMessage`]s.

pub mod communication;
pub mod firmware;

pub use communication::{
    list_ports, CommandQueue, CommandQueueConfig, Lane, SerialPortInfo, SerialTransport,
    Transport, TransportEvent, VendorQuirk, DEFAULT_BYTE_BUDGET,
};

pub use firmware::{ControllerMessage, GrblLineClassifier, LineClassifier};
