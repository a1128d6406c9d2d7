//! Controller firmware dialects
//!
//! Each dialect turns raw controller output lines into [`ControllerMessage`]s
//! the machine controller understands. GRBL 1.1 is the only dialect bundled.

pub mod grbl;

use grblstream_core::{Axes, ControllerStatus, PositionReport, ProbeResult};

pub use grbl::GrblLineClassifier;

/// One classified piece of controller output
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerMessage {
    /// The oldest in-flight command was accepted
    Ok,
    /// The controller announced itself after a reset
    Ready {
        /// Banner line, e.g. `Grbl 1.1h ['$' for help]`
        identification: String,
    },
    /// Low-level status word from a status report
    State {
        /// Parsed status word
        status: ControllerStatus,
        /// Substate, e.g. the hold or door code
        substate: Option<String>,
    },
    /// Position fields from a status report
    Position(PositionReport),
    /// Probe input state
    ProbeStatus(bool),
    /// Probe cycle outcome
    ProbeResult(ProbeResult),
    /// Spindle current draw
    SpindleCurrent(f64),
    /// A `$n=value` setting line
    Setting {
        /// Setting number
        number: u16,
        /// Raw value
        value: String,
    },
    /// Alarm line, verbatim
    Alarm(String),
    /// Error response to the oldest in-flight command, verbatim
    Error(String),
    /// The controller echoed a received line back
    Echo(String),
    /// Over-current report, verbatim
    OverCurrent(String),
    /// Version or option line
    BuildInfo(String),
    /// Anything unrecognized, verbatim
    Unknown(String),
}

/// Turns controller output lines into messages
pub trait LineClassifier: Send {
    /// Classify one line. A single line may carry several messages (a status
    /// report yields state, position and probe input); blank lines yield none.
    fn classify(&self, line: &str) -> Vec<ControllerMessage>;
}

/// Parse an `x,y,z[,...]` coordinate triple
pub(crate) fn parse_axes(text: &str) -> Option<Axes> {
    let mut coords = text.split(',').map(|s| s.trim().parse::<f64>());
    let x = coords.next()?.ok()?;
    let y = coords.next()?.ok()?;
    let z = coords.next()?.ok()?;
    Some(Axes::new(x, y, z))
}
