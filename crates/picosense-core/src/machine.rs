//! The peripheral session state machine.
//!
//! [`SessionMachine`] is synchronous and does no I/O. It consumes
//! [`SessionEvent`]s one at a time and answers each with a [`Step`]: the
//! link operations to issue and the diagnostics to publish. The
//! [`session`](crate::session) actor feeds it events in arrival order and
//! carries out the actions, which keeps every mutation of session state on
//! one task.
//!
//! ```text
//! Idle -> Scanning -> Connecting -> DiscoveringServices
//!      -> DiscoveringCharacteristics -> Subscribing -> Streaming
//!      -> Disconnecting -> Scanning -> ...
//! ```

use tracing::{debug, info, warn};
use uuid::Uuid;

use picosense_types::{
    CharacteristicKind, PeripheralIdentity, RelayVector, SensorReading, codec, uuids,
};

use crate::events::{IgnoreReason, SessionDiagnostic};
use crate::link::{
    AckPolicy, CharacteristicHandle, ConnectionEvent, DiscoveredPeripheral, GattInventory,
    RadioState,
};
use crate::state::{CharacteristicSet, ConnectionPhase, SessionSnapshot};

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The radio reported a power state.
    RadioChanged(RadioState),
    /// A peripheral was seen while scanning.
    Discovered(DiscoveredPeripheral),
    /// Connection lifecycle event for `peripheral`.
    Connection {
        peripheral: String,
        event: ConnectionEvent,
    },
    /// Service and characteristic discovery finished.
    GattResolved {
        peripheral: String,
        result: Result<GattInventory, String>,
    },
    /// Notifications are enabled for `handle`. `initial` is the value read
    /// right after subscribing, if the read succeeded.
    Subscribed {
        handle: CharacteristicHandle,
        initial: Option<Vec<u8>>,
    },
    /// Notifications could not be enabled for `handle`.
    SubscribeFailed {
        handle: CharacteristicHandle,
        reason: String,
    },
    /// A value arrived for `handle`, by notification or initial read.
    Value {
        handle: CharacteristicHandle,
        data: Vec<u8>,
    },
    /// Request to switch one relay.
    SetRelay { index: usize, on: bool },
}

/// Link operations requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start (or restart) scanning for `services`.
    StartDiscovery { services: Vec<Uuid> },
    /// Stop scanning.
    StopDiscovery,
    /// Connect to a peripheral.
    Connect(PeripheralIdentity),
    /// Resolve the service and characteristics.
    Discover {
        peripheral: PeripheralIdentity,
        services: Vec<Uuid>,
        characteristics: Vec<Uuid>,
    },
    /// Enable notifications.
    Subscribe(CharacteristicHandle),
    /// Write a payload.
    Write {
        handle: CharacteristicHandle,
        data: Vec<u8>,
        ack: AckPolicy,
    },
    /// Abandon every task tied to the current connection.
    Release,
}

/// The outcome of handling one event.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Step {
    pub actions: Vec<Action>,
    pub diagnostics: Vec<SessionDiagnostic>,
}

impl Step {
    fn act(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn report(&mut self, diagnostic: SessionDiagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Everything tied to one selected peripheral. Dropped as a unit.
#[derive(Debug)]
struct Link {
    identity: PeripheralIdentity,
    connected: bool,
    /// Resolved during discovery, subscription requested.
    pending: CharacteristicSet,
    /// Subscription confirmed; the only handles readers see.
    bound: CharacteristicSet,
    temperature: Option<SensorReading>,
    humidity: Option<SensorReading>,
    relays: Option<RelayVector>,
}

impl Link {
    fn new(identity: PeripheralIdentity) -> Self {
        Self {
            identity,
            connected: false,
            pending: CharacteristicSet::default(),
            bound: CharacteristicSet::default(),
            temperature: None,
            humidity: None,
            relays: None,
        }
    }

    fn owns(&self, handle: &CharacteristicHandle) -> bool {
        handle.peripheral == self.identity.id
    }
}

/// The session state machine.
#[derive(Debug)]
pub struct SessionMachine {
    relay_count: usize,
    radio: RadioState,
    phase: ConnectionPhase,
    link: Option<Link>,
}

impl SessionMachine {
    /// Create a machine in `Idle` for a board with `relay_count` relays.
    pub fn new(relay_count: usize) -> Self {
        Self {
            relay_count,
            radio: RadioState::Unknown,
            phase: ConnectionPhase::Idle,
            link: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Last reported radio state.
    pub fn radio(&self) -> RadioState {
        self.radio
    }

    /// The peripheral currently selected, if any.
    pub fn peripheral(&self) -> Option<&PeripheralIdentity> {
        self.link.as_ref().map(|link| &link.identity)
    }

    /// Configured relay count.
    pub fn relay_count(&self) -> usize {
        self.relay_count
    }

    /// Build the observer view of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let Some(link) = &self.link else {
            return SessionSnapshot::detached(self.phase);
        };
        SessionSnapshot {
            phase: self.phase,
            is_connected: link.connected,
            peripheral_name: link.identity.name.clone(),
            temperature: link.temperature.map(|r| r.value()),
            humidity: link.humidity.map(|r| r.value()),
            relays: link
                .relays
                .as_ref()
                .map(|relays| relays.as_slice().to_vec())
                .unwrap_or_default(),
            characteristics: link.bound.clone(),
        }
    }

    /// Handle one event.
    pub fn handle(&mut self, event: SessionEvent) -> Step {
        let mut step = Step::default();
        match event {
            SessionEvent::RadioChanged(state) => self.on_radio(state, &mut step),
            SessionEvent::Discovered(peripheral) => self.on_discovered(peripheral, &mut step),
            SessionEvent::Connection { peripheral, event } => {
                self.on_connection(&peripheral, event, &mut step)
            }
            SessionEvent::GattResolved { peripheral, result } => {
                self.on_gatt_resolved(&peripheral, result, &mut step)
            }
            SessionEvent::Subscribed { handle, initial } => {
                self.on_subscribed(handle, initial, &mut step)
            }
            SessionEvent::SubscribeFailed { handle, reason } => {
                self.on_subscribe_failed(handle, reason, &mut step)
            }
            SessionEvent::Value { handle, data } => self.on_value(&handle, &data, &mut step),
            SessionEvent::SetRelay { index, on } => self.on_set_relay(index, on, &mut step),
        }
        step
    }

    fn transition(&mut self, to: ConnectionPhase, step: &mut Step) {
        if self.phase == to {
            return;
        }
        info!(from = %self.phase, to = %to, "Session phase changed");
        step.report(SessionDiagnostic::PhaseChanged {
            from: self.phase,
            to,
        });
        self.phase = to;
    }

    /// Go back to scanning, or to idle if the radio is not usable.
    fn resume_scanning(&mut self, step: &mut Step) {
        if self.radio.is_ready() {
            self.transition(ConnectionPhase::Scanning, step);
            step.act(Action::StartDiscovery {
                services: uuids::REQUIRED_SERVICES.to_vec(),
            });
        } else {
            self.transition(ConnectionPhase::Idle, step);
        }
    }

    fn on_radio(&mut self, state: RadioState, step: &mut Step) {
        self.radio = state;

        if state.is_ready() {
            if self.phase == ConnectionPhase::Idle {
                self.resume_scanning(step);
            }
            return;
        }

        step.report(SessionDiagnostic::RadioUnavailable { state });
        match self.phase {
            ConnectionPhase::Idle => {}
            ConnectionPhase::Scanning => {
                step.act(Action::StopDiscovery);
                self.transition(ConnectionPhase::Idle, step);
            }
            _ => {
                warn!(?state, "Radio lost during session");
                self.tear_down(step);
            }
        }
    }

    fn on_discovered(&mut self, discovered: DiscoveredPeripheral, step: &mut Step) {
        if self.phase != ConnectionPhase::Scanning || self.link.is_some() {
            debug!(peripheral = %discovered.identity, "Ignoring discovery, attempt in progress");
            step.report(SessionDiagnostic::PeripheralIgnored {
                peripheral: discovered.identity,
            });
            return;
        }

        info!(peripheral = %discovered.identity, rssi = ?discovered.rssi, "Discovered peripheral");
        let identity = discovered.identity;
        self.link = Some(Link::new(identity.clone()));
        step.report(SessionDiagnostic::PeripheralSelected {
            peripheral: identity.clone(),
        });
        self.transition(ConnectionPhase::Connecting, step);
        step.act(Action::Connect(identity));
        step.act(Action::StopDiscovery);
    }

    fn on_connection(&mut self, peripheral: &str, event: ConnectionEvent, step: &mut Step) {
        let Some(link) = self.link.as_mut().filter(|link| link.identity.id == peripheral) else {
            debug!(peripheral, ?event, "Ignoring connection event for stale peripheral");
            return;
        };

        match event {
            ConnectionEvent::Connected => {
                if self.phase != ConnectionPhase::Connecting {
                    return;
                }
                link.connected = true;
                let identity = link.identity.clone();
                self.transition(ConnectionPhase::DiscoveringServices, step);
                step.act(Action::Discover {
                    peripheral: identity,
                    services: uuids::REQUIRED_SERVICES.to_vec(),
                    characteristics: uuids::REQUIRED_CHARACTERISTICS.to_vec(),
                });
            }
            ConnectionEvent::ConnectionFailed(reason) => {
                if self.phase != ConnectionPhase::Connecting {
                    return;
                }
                warn!(peripheral, %reason, "Connection failed");
                step.report(SessionDiagnostic::ConnectionFailed {
                    peripheral: link.identity.clone(),
                    reason,
                });
                self.link = None;
                step.act(Action::Release);
                self.resume_scanning(step);
            }
            ConnectionEvent::Disconnected => self.tear_down(step),
        }
    }

    /// Drop the selected peripheral with all its handles and readings in one
    /// transition, then go back to scanning.
    fn tear_down(&mut self, step: &mut Step) {
        let Some(link) = self.link.take() else {
            return;
        };
        info!(peripheral = %link.identity, "Link lost");
        self.transition(ConnectionPhase::Disconnecting, step);
        step.report(SessionDiagnostic::LinkLost {
            peripheral: link.identity,
        });
        step.act(Action::Release);
        self.resume_scanning(step);
    }

    fn on_gatt_resolved(
        &mut self,
        peripheral: &str,
        result: Result<GattInventory, String>,
        step: &mut Step,
    ) {
        if self.phase != ConnectionPhase::DiscoveringServices {
            return;
        }
        let Some(link) = self.link.as_mut().filter(|link| link.identity.id == peripheral) else {
            return;
        };

        let inventory = match result {
            Ok(inventory) => inventory,
            Err(reason) => {
                warn!(peripheral, %reason, "Service discovery failed, session stalled");
                step.report(SessionDiagnostic::DiscoveryIncomplete {
                    peripheral: link.identity.clone(),
                    missing: CharacteristicKind::ALL.to_vec(),
                    reason: Some(reason),
                });
                return;
            }
        };

        if !inventory
            .services
            .contains(&uuids::ENVIRONMENTAL_SENSING_SERVICE)
        {
            warn!(peripheral, "Environmental sensing service not found, session stalled");
            step.report(SessionDiagnostic::DiscoveryIncomplete {
                peripheral: link.identity.clone(),
                missing: CharacteristicKind::ALL.to_vec(),
                reason: Some("service not found".to_string()),
            });
            return;
        }

        for handle in inventory.characteristics {
            match handle.kind() {
                Some(kind) if link.owns(&handle) && link.pending.get(kind).is_none() => {
                    link.pending.set(kind, handle);
                }
                _ => debug!(%handle, "Skipping unmatched characteristic"),
            }
        }

        let identity = link.identity.clone();
        let missing = link.pending.missing();
        let subscriptions: Vec<_> = link.pending.handles().cloned().collect();

        self.transition(ConnectionPhase::DiscoveringCharacteristics, step);
        if subscriptions.is_empty() {
            warn!(peripheral, "No sensor characteristics found, session stalled");
            step.report(SessionDiagnostic::DiscoveryIncomplete {
                peripheral: identity,
                missing,
                reason: None,
            });
            return;
        }
        if !missing.is_empty() {
            debug!(?missing, "Some characteristics are not exposed by the peripheral");
        }

        self.transition(ConnectionPhase::Subscribing, step);
        for handle in subscriptions {
            step.act(Action::Subscribe(handle));
        }
        // Values are accepted as they arrive; there is no wait for every
        // subscription to be acknowledged.
        self.transition(ConnectionPhase::Streaming, step);
    }

    fn on_subscribed(
        &mut self,
        handle: CharacteristicHandle,
        initial: Option<Vec<u8>>,
        step: &mut Step,
    ) {
        let relay_count = self.relay_count;
        let Some(link) = self.link.as_mut().filter(|link| link.owns(&handle)) else {
            return;
        };
        let Some(kind) = handle.kind() else {
            return;
        };
        if link.pending.get(kind) != Some(&handle) {
            return;
        }

        debug!(%kind, "Subscribed");
        if kind == CharacteristicKind::Relay {
            link.relays = Some(RelayVector::new(relay_count));
        }
        link.bound.set(kind, handle.clone());

        // Bound and first value become visible together.
        if let Some(data) = initial {
            self.on_value(&handle, &data, step);
        }
    }

    fn on_subscribe_failed(&mut self, handle: CharacteristicHandle, reason: String, step: &mut Step) {
        let Some(link) = self.link.as_mut().filter(|link| link.owns(&handle)) else {
            return;
        };
        let Some(kind) = handle.kind() else {
            return;
        };
        if link.pending.get(kind) != Some(&handle) {
            return;
        }

        warn!(%kind, %reason, "Subscription failed");
        link.pending.clear(kind);
        step.report(SessionDiagnostic::SubscribeFailed {
            characteristic: kind,
            reason,
        });
    }

    fn on_value(&mut self, handle: &CharacteristicHandle, data: &[u8], step: &mut Step) {
        let relay_count = self.relay_count;
        let Some(link) = self.link.as_mut().filter(|link| link.owns(handle)) else {
            debug!(%handle, "Dropping value for stale handle");
            return;
        };
        let Some(kind) = handle.kind() else {
            return;
        };
        if link.bound.get(kind) != Some(handle) {
            debug!(%handle, "Dropping value for unbound handle");
            return;
        }

        match kind {
            CharacteristicKind::Temperature | CharacteristicKind::Humidity => {
                match codec::decode_fixed_point(data) {
                    Ok(reading) => {
                        debug!(%kind, value = %reading, "Reading updated");
                        if kind == CharacteristicKind::Temperature {
                            link.temperature = Some(reading);
                        } else {
                            link.humidity = Some(reading);
                        }
                    }
                    Err(e) => {
                        warn!(%kind, error = %e, "Malformed payload, keeping previous value");
                        step.report(SessionDiagnostic::MalformedPayload {
                            characteristic: kind,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            CharacteristicKind::Relay => {
                let relays = codec::decode_relay_vector(data, relay_count);
                debug!(relays = ?relays.as_slice(), "Relay state updated");
                link.relays = Some(relays);
            }
        }
    }

    fn on_set_relay(&mut self, index: usize, on: bool, step: &mut Step) {
        if index >= self.relay_count {
            debug!(index, relay_count = self.relay_count, "Relay index out of range");
            step.report(SessionDiagnostic::RelayWriteIgnored {
                index,
                reason: IgnoreReason::IndexOutOfRange,
            });
            return;
        }

        let streaming = self.phase == ConnectionPhase::Streaming;
        let target = self.link.as_mut().filter(|_| streaming).and_then(|link| {
            let handle = link.bound.relay.clone()?;
            let relays = link.relays.as_mut()?;
            Some((handle, relays))
        });
        let Some((handle, relays)) = target else {
            debug!(index, "Relay command ignored, not streaming");
            step.report(SessionDiagnostic::RelayWriteIgnored {
                index,
                reason: IgnoreReason::NotStreaming,
            });
            return;
        };

        // Write-through: the local copy changes before the link confirms.
        relays.set(index, on);
        let data = codec::encode_relay_vector(relays);
        info!(index, on, relays = ?relays.as_slice(), "Writing relay state");
        step.report(SessionDiagnostic::RelayWritten {
            relays: relays.as_slice().to_vec(),
        });
        step.act(Action::Write {
            handle,
            data,
            ack: AckPolicy::FireAndForget,
        });
    }
}
