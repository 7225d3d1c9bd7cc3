//! Session diagnostics.
//!
//! Every non-fatal condition the session swallows (ignored discoveries,
//! malformed payloads, ignored relay commands, dropped links) is also
//! broadcast as a [`SessionDiagnostic`], so callers and tests can tell the
//! silent cases apart.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use picosense_types::{CharacteristicKind, PeripheralIdentity};

use crate::link::RadioState;
use crate::state::ConnectionPhase;

/// Why a relay command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// `index` was not below the relay count.
    IndexOutOfRange,
    /// No streaming session with a bound relay characteristic.
    NotStreaming,
}

/// Diagnostic events emitted by the session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionDiagnostic {
    /// The session moved between phases.
    PhaseChanged {
        from: ConnectionPhase,
        to: ConnectionPhase,
    },
    /// The radio is not usable; the session idles.
    RadioUnavailable { state: RadioState },
    /// A peripheral was discovered and a connection attempt started.
    PeripheralSelected { peripheral: PeripheralIdentity },
    /// A peripheral was discovered while another attempt was in progress.
    PeripheralIgnored { peripheral: PeripheralIdentity },
    /// The connection attempt failed.
    ConnectionFailed {
        peripheral: PeripheralIdentity,
        reason: String,
    },
    /// The required service or characteristics were not found; the session
    /// stays put until the link drops.
    DiscoveryIncomplete {
        peripheral: PeripheralIdentity,
        missing: Vec<CharacteristicKind>,
        reason: Option<String>,
    },
    /// Notifications could not be enabled for a characteristic.
    SubscribeFailed {
        characteristic: CharacteristicKind,
        reason: String,
    },
    /// A payload could not be decoded; the field keeps its previous value.
    MalformedPayload {
        characteristic: CharacteristicKind,
        reason: String,
    },
    /// The link dropped and the session was torn down.
    LinkLost { peripheral: PeripheralIdentity },
    /// A relay command was dropped.
    RelayWriteIgnored {
        index: usize,
        reason: IgnoreReason,
    },
    /// A relay write was handed to the link.
    RelayWritten { relays: Vec<bool> },
    /// The link rejected a write.
    WriteFailed { reason: String },
    /// A scan could not be started or stopped.
    DiscoveryFailed { reason: String },
}

/// Sender for session diagnostics.
pub type EventSender = broadcast::Sender<SessionDiagnostic>;

/// Receiver for session diagnostics.
pub type EventReceiver = broadcast::Receiver<SessionDiagnostic>;

/// Fan-out of diagnostics to any number of receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionDiagnostic) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatcher_fans_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(SessionDiagnostic::RelayWriteIgnored {
            index: 5,
            reason: IgnoreReason::IndexOutOfRange,
        });

        assert!(matches!(
            a.recv().await.unwrap(),
            SessionDiagnostic::RelayWriteIgnored { index: 5, .. }
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            SessionDiagnostic::RelayWriteIgnored { index: 5, .. }
        ));
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(SessionDiagnostic::WriteFailed {
            reason: "nobody listening".to_string(),
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_diagnostic_serialization() {
        let event = SessionDiagnostic::PhaseChanged {
            from: ConnectionPhase::Scanning,
            to: ConnectionPhase::Connecting,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"phase_changed","from":"scanning","to":"connecting"}"#
        );
    }
}
