//! Event system for machine notifications
//!
//! Provides:
//! - The closed set of events the machine emits to the bridge
//! - An event dispatcher with a synchronous handler table and a broadcast
//!   channel for async consumers

use crate::data::{
    Axes, ControllerStatus, EchoDirection, OverrideSnapshot, PortLostDiagnostic, Position,
    RunState, RunTime,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Outcome of a probing cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Machine position where the probe stopped
    pub position: Axes,
    /// Whether the probe made contact
    pub success: bool,
}

/// Machine event types
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// The controller announced itself
    Connected,
    /// Connected and idle, no job running
    Ready,
    /// Position changed
    Position(Position),
    /// Controller reported its low-level status word
    ControllerState {
        /// Parsed status word
        status: ControllerStatus,
        /// Substate, e.g. the hold or door code
        substate: Option<String>,
    },
    /// Job run-state
    RunState(RunState),
    /// Job is running at the given completion percentage
    Running(f64),
    /// Job paused at the given completion percentage
    Paused(f64),
    /// Job resumed at the given completion percentage
    Resumed(f64),
    /// Staged stop in progress
    Stopping,
    /// Controller is held for a firmware upload
    UploadingFirmware,
    /// An override rate changed
    OverridesChanged,
    /// Current override state
    Overrides(OverrideSnapshot),
    /// A controller setting was reported
    Setting {
        /// Setting number
        number: u16,
        /// Raw value
        value: String,
    },
    /// Controller build information
    MachineBuildInfo(String),
    /// Probe input state
    ProbeStatus(bool),
    /// Probe cycle outcome
    ProbeResult(ProbeResult),
    /// Spindle current draw
    SpindleCurrent(f64),
    /// Controller alarm
    GrblAlarm(String),
    /// Controller error response
    GrblError(String),
    /// Controller reported over-current
    GrblOverCurrent(String),
    /// Unclassified controller output
    Unknown(String),
    /// Serial link went away
    PortLost(PortLostDiagnostic),
    /// Serial link reported an error
    PortError(String),
    /// Machine released to the requesting client
    Release(u64),
    /// A span of running time ended
    RunTime(RunTime),
    /// Mirrored serial traffic
    SerialEcho {
        /// Which way the data went
        direction: EchoDirection,
        /// The data
        data: String,
    },
}

impl MachineEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Position(_) => "position",
            Self::ControllerState { .. } => "grbl-state",
            Self::RunState(_) => "run-state",
            Self::Running(_) => "running",
            Self::Paused(_) => "paused",
            Self::Resumed(_) => "resumed",
            Self::Stopping => "stopping",
            Self::UploadingFirmware => "uploading-firmware",
            Self::OverridesChanged => "overrides-changed",
            Self::Overrides(_) => "overrides",
            Self::Setting { .. } => "settings",
            Self::MachineBuildInfo(_) => "machine-build-info",
            Self::ProbeStatus(_) => "probe-status",
            Self::ProbeResult(_) => "probe-result",
            Self::SpindleCurrent(_) => "spindle-current",
            Self::GrblAlarm(_) => "grbl-alarm",
            Self::GrblError(_) => "grbl-error",
            Self::GrblOverCurrent(_) => "grbl-over-current",
            Self::Unknown(_) => "unknown",
            Self::PortLost(_) => "port_lost",
            Self::PortError(_) => "port-error",
            Self::Release(_) => "release",
            Self::RunTime(_) => "run-time",
            Self::SerialEcho { .. } => "echo",
        }
    }
}

impl std::fmt::Display for MachineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineEvent::Position(p) => write!(
                f,
                "position - Machine: ({}, {}, {}), Work: ({}, {}, {})",
                p.machine.x, p.machine.y, p.machine.z, p.work.x, p.work.y, p.work.z
            ),
            MachineEvent::ControllerState { status, substate } => match substate {
                Some(sub) => write!(f, "grbl-state: {}:{}", status, sub),
                None => write!(f, "grbl-state: {}", status),
            },
            MachineEvent::RunState(state) => write!(f, "run-state: {}", state),
            MachineEvent::Running(pct) | MachineEvent::Paused(pct) | MachineEvent::Resumed(pct) => {
                write!(f, "{}: {:.1}%", self.name(), pct)
            }
            MachineEvent::GrblAlarm(msg)
            | MachineEvent::GrblError(msg)
            | MachineEvent::GrblOverCurrent(msg)
            | MachineEvent::Unknown(msg)
            | MachineEvent::PortError(msg)
            | MachineEvent::MachineBuildInfo(msg) => write!(f, "{}: {}", self.name(), msg),
            MachineEvent::PortLost(diag) => write!(f, "port_lost: {}", diag.sender_note),
            MachineEvent::RunTime(rt) => {
                write!(f, "run-time: {}ms", rt.end.saturating_sub(rt.start))
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Handle for a registered event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Type alias for event handler functions
type EventHandler = Box<dyn Fn(&MachineEvent) + Send + Sync>;

/// Event dispatcher for publishing machine events
///
/// Handlers registered with [`EventDispatcher::subscribe`] run synchronously
/// on the publishing thread, in no particular order. Async consumers can take
/// a broadcast receiver instead.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Arc<RwLock<HashMap<SubscriptionId, EventHandler>>>,
    tx: broadcast::Sender<MachineEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Capacity of the broadcast channel
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            tx,
        }
    }

    /// Register a synchronous handler
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&MachineEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, Box::new(handler));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Remove a handler. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get a receiver for async consumption
    pub fn receiver(&self) -> broadcast::Receiver<MachineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to every handler and receiver
    pub fn publish(&self, event: MachineEvent) {
        tracing::trace!("dispatch {}", event);
        for handler in self.handlers.read().values() {
            handler(&event);
        }
        // No receivers is not an error: handlers may be the only consumers.
        let _ = self.tx.send(event);
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let dispatcher = EventDispatcher::default();

        let id = dispatcher.subscribe(|_| {});
        assert_eq!(dispatcher.subscriber_count(), 1);

        assert!(dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert!(!dispatcher.unsubscribe(id));
    }

    #[test]
    fn test_event_delivery() {
        let dispatcher = EventDispatcher::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        dispatcher.subscribe(move |event| {
            if matches!(event, MachineEvent::Stopping) {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        dispatcher.publish(MachineEvent::Stopping);
        dispatcher.publish(MachineEvent::Ready);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let dispatcher = EventDispatcher::default();
        let mut receiver = dispatcher.receiver();

        dispatcher.publish(MachineEvent::Release(42));

        match receiver.try_recv() {
            Ok(MachineEvent::Release(ts)) => assert_eq!(ts, 42),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(MachineEvent::RunState(RunState::Paused).name(), "run-state");
        assert_eq!(
            MachineEvent::PortLost(PortLostDiagnostic::note("gone")).name(),
            "port_lost"
        );
        assert_eq!(
            MachineEvent::RunState(RunState::PausedDoorOpen).to_string(),
            "run-state: PAUSED_DOOR_OPEN"
        );
    }
}
