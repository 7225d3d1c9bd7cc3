//! The session actor.
//!
//! [`Session::spawn`] starts a task that owns a [`SessionMachine`] and a
//! [`LinkAdapter`]. Radio state, discoveries, connection events, GATT
//! results, notifications and relay commands all arrive on one queue and are
//! applied strictly in order. Adapter calls run on their own tasks and post
//! their outcome back to the queue, so the actor never blocks on the radio.
//!
//! Work belonging to one scan or one connection runs under a child
//! [`CancellationToken`]; releasing the connection cancels everything that
//! could still post events for it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use picosense_core::{MockLink, Session, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> picosense_core::Result<()> {
//! let link = Arc::new(MockLink::new());
//! link.advertise("AA:BB:CC:DD:EE:01", Some("Pi Pico Sensor")).await;
//!
//! let session = Session::spawn(link, SessionConfig::default())?;
//! let snapshot = session
//!     .observer()
//!     .wait_for(|s| s.is_streaming() && !s.relays.is_empty())
//!     .await?;
//! assert_eq!(snapshot.relays, vec![false, false]);
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use picosense_types::PeripheralIdentity;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, SessionDiagnostic};
use crate::link::{AckPolicy, CharacteristicHandle, LinkAdapter};
use crate::machine::{Action, SessionEvent, SessionMachine};
use crate::sink::{StateObserver, StateSink};
use crate::state::{ConnectionPhase, SessionSnapshot};

/// How long shutdown waits for queued writes to reach the peripheral.
const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A queued write for the connection's writer task.
#[derive(Debug)]
struct WriteRequest {
    handle: CharacteristicHandle,
    data: Vec<u8>,
    ack: AckPolicy,
}

/// Tasks tied to the current connection.
struct ConnectionTasks {
    peripheral: PeripheralIdentity,
    cancel: CancellationToken,
    writes: mpsc::UnboundedSender<WriteRequest>,
    writer: JoinHandle<()>,
}

/// The session actor. Created through [`Session::spawn`].
pub struct Session<A: LinkAdapter> {
    adapter: Arc<A>,
    machine: SessionMachine,
    sink: StateSink,
    events: EventDispatcher,
    inbox: mpsc::Sender<SessionEvent>,
    shutdown: CancellationToken,
    discovery: Option<CancellationToken>,
    connection: Option<ConnectionTasks>,
}

impl<A: LinkAdapter> Session<A> {
    /// Validate `config` and start a session on `adapter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(adapter: Arc<A>, config: SessionConfig) -> Result<SessionHandle> {
        config.validate()?;

        let (inbox, queue) = mpsc::channel(config.event_capacity);
        let sink = StateSink::new(SessionSnapshot::detached(ConnectionPhase::Idle));
        let observer = sink.observer();
        let events = EventDispatcher::new(config.event_capacity);
        let shutdown = CancellationToken::new();

        let session = Session {
            adapter,
            machine: SessionMachine::new(config.relay_count),
            sink,
            events: events.clone(),
            inbox: inbox.clone(),
            shutdown: shutdown.clone(),
            discovery: None,
            connection: None,
        };

        info!(relay_count = config.relay_count, "Starting session");
        let task = tokio::spawn(session.run(queue).instrument(info_span!("session")));

        Ok(SessionHandle {
            inbox,
            observer,
            events,
            shutdown,
            task: Some(task),
        })
    }

    async fn run(mut self, mut queue: mpsc::Receiver<SessionEvent>) {
        let radio = self.adapter.radio_states().await;
        tokio::spawn(forward(
            radio,
            self.shutdown.child_token(),
            self.inbox.clone(),
            SessionEvent::RadioChanged,
        ));

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = queue.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        // Relay commands accepted before shutdown still reach the board.
        queue.close();
        while let Ok(event) = queue.try_recv() {
            if matches!(event, SessionEvent::SetRelay { .. }) {
                self.dispatch(event);
            }
        }

        self.close().await;
    }

    fn dispatch(&mut self, event: SessionEvent) {
        let step = self.machine.handle(event);
        self.sink.publish(self.machine.snapshot());
        for diagnostic in step.diagnostics {
            self.events.send(diagnostic);
        }
        for action in step.actions {
            self.execute(action);
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::StartDiscovery { services } => self.start_discovery(services),
            Action::StopDiscovery => self.stop_discovery(),
            Action::Connect(peripheral) => self.connect(peripheral),
            Action::Discover {
                peripheral,
                services,
                characteristics,
            } => self.discover(peripheral, services, characteristics),
            Action::Subscribe(handle) => self.subscribe(handle),
            Action::Write { handle, data, ack } => self.write(handle, data, ack),
            Action::Release => self.release(),
        }
    }

    fn start_discovery(&mut self, services: Vec<uuid::Uuid>) {
        if let Some(previous) = self.discovery.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        self.discovery = Some(token.clone());

        let adapter = Arc::clone(&self.adapter);
        let inbox = self.inbox.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match adapter.start_discovery(&services).await {
                Ok(stream) => {
                    debug!("Scanning for peripherals");
                    forward(stream, token, inbox, SessionEvent::Discovered).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to start scan");
                    events.send(SessionDiagnostic::DiscoveryFailed {
                        reason: e.to_string(),
                    });
                }
            }
        });
    }

    fn stop_discovery(&mut self) {
        let Some(token) = self.discovery.take() else {
            return;
        };
        token.cancel();

        let adapter = Arc::clone(&self.adapter);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_discovery().await {
                warn!(error = %e, "Failed to stop scan");
                events.send(SessionDiagnostic::DiscoveryFailed {
                    reason: e.to_string(),
                });
            }
        });
    }

    fn connect(&mut self, peripheral: PeripheralIdentity) {
        self.release();

        let cancel = self.shutdown.child_token();
        let (writes, queue) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(
            Arc::clone(&self.adapter),
            queue,
            cancel.clone(),
            self.events.clone(),
        ));
        self.connection = Some(ConnectionTasks {
            peripheral: peripheral.clone(),
            cancel: cancel.clone(),
            writes,
            writer,
        });

        let adapter = Arc::clone(&self.adapter);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            info!(%peripheral, "Connecting");
            let id = peripheral.id.clone();
            let stream = tokio::select! {
                _ = cancel.cancelled() => return,
                stream = adapter.connect(&peripheral) => stream,
            };
            forward(stream, cancel, inbox, move |event| SessionEvent::Connection {
                peripheral: id.clone(),
                event,
            })
            .await;
        });
    }

    fn discover(
        &mut self,
        peripheral: PeripheralIdentity,
        services: Vec<uuid::Uuid>,
        characteristics: Vec<uuid::Uuid>,
    ) {
        let Some(cancel) = self.connection_token() else {
            return;
        };
        let adapter = Arc::clone(&self.adapter);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = adapter.discover(&peripheral, &services, &characteristics) => result,
            };
            let event = SessionEvent::GattResolved {
                peripheral: peripheral.id,
                result: result.map_err(|e| e.to_string()),
            };
            post(&cancel, &inbox, event).await;
        });
    }

    fn subscribe(&mut self, handle: CharacteristicHandle) {
        let Some(cancel) = self.connection_token() else {
            return;
        };
        let adapter = Arc::clone(&self.adapter);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => return,
                result = adapter.subscribe(&handle) => result,
            };
            let stream = match subscribed {
                Ok(stream) => stream,
                Err(e) => {
                    let event = SessionEvent::SubscribeFailed {
                        handle,
                        reason: e.to_string(),
                    };
                    post(&cancel, &inbox, event).await;
                    return;
                }
            };

            // The peripheral only notifies on change; read once so the
            // current value shows up without waiting for one.
            let initial = tokio::select! {
                _ = cancel.cancelled() => return,
                result = adapter.read(&handle) => result,
            };
            let initial = match initial {
                Ok(data) => Some(data),
                Err(e) => {
                    debug!(%handle, error = %e, "Initial read failed");
                    None
                }
            };

            let event = SessionEvent::Subscribed {
                handle: handle.clone(),
                initial,
            };
            if !post(&cancel, &inbox, event).await {
                return;
            }

            forward(stream, cancel, inbox, move |data| SessionEvent::Value {
                handle: handle.clone(),
                data,
            })
            .await;
        });
    }

    fn write(&mut self, handle: CharacteristicHandle, data: Vec<u8>, ack: AckPolicy) {
        let Some(connection) = &self.connection else {
            warn!(%handle, "Write requested without a connection");
            return;
        };
        if connection
            .writes
            .send(WriteRequest { handle, data, ack })
            .is_err()
        {
            debug!("Writer already stopped");
        }
    }

    fn release(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        connection.cancel.cancel();

        let adapter = Arc::clone(&self.adapter);
        tokio::spawn(async move {
            if let Err(e) = adapter.disconnect(&connection.peripheral).await {
                debug!(peripheral = %connection.peripheral, error = %e, "Disconnect failed");
            }
        });
    }

    fn connection_token(&self) -> Option<CancellationToken> {
        self.connection.as_ref().map(|c| c.cancel.clone())
    }

    async fn close(&mut self) {
        info!("Stopping session");
        if let Some(token) = self.discovery.take() {
            token.cancel();
            if let Err(e) = self.adapter.stop_discovery().await {
                debug!(error = %e, "Failed to stop scan on shutdown");
            }
        }
        if let Some(connection) = self.connection.take() {
            let ConnectionTasks {
                peripheral,
                cancel,
                writes,
                writer,
            } = connection;
            cancel.cancel();
            drop(writes);
            if tokio::time::timeout(WRITE_DRAIN_TIMEOUT, writer)
                .await
                .is_err()
            {
                warn!(%peripheral, "Queued writes not finished before shutdown");
            }
            if let Err(e) = self.adapter.disconnect(&peripheral).await {
                debug!(%peripheral, error = %e, "Failed to disconnect on shutdown");
            }
        }
    }
}

/// Post `event` unless `cancel` fires first. Returns `false` if the event
/// was not delivered.
async fn post(
    cancel: &CancellationToken,
    inbox: &mpsc::Sender<SessionEvent>,
    event: SessionEvent,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = inbox.send(event) => sent.is_ok(),
    }
}

/// Map every item of `stream` to an event and post it until the stream
/// ends or `cancel` fires.
async fn forward<T, F>(
    mut stream: BoxStream<'static, T>,
    cancel: CancellationToken,
    inbox: mpsc::Sender<SessionEvent>,
    map: F,
) where
    F: Fn(T) -> SessionEvent,
{
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };
        let Some(item) = item else {
            break;
        };
        if !post(&cancel, &inbox, map(item)).await {
            break;
        }
    }
}

/// Perform queued writes one at a time, in the order they were issued.
async fn write_loop<A: LinkAdapter>(
    adapter: Arc<A>,
    mut queue: mpsc::UnboundedReceiver<WriteRequest>,
    cancel: CancellationToken,
    events: EventDispatcher,
) {
    // Writes already queued go out before cancellation is honoured; closing
    // the queue ends the loop once they are done.
    loop {
        let request = tokio::select! {
            biased;
            request = queue.recv() => request,
            _ = cancel.cancelled() => break,
        };
        let Some(request) = request else {
            break;
        };
        debug!(handle = %request.handle, bytes = request.data.len(), "Writing");
        if let Err(e) = adapter
            .write(&request.handle, &request.data, request.ack)
            .await
        {
            warn!(handle = %request.handle, error = %e, "Write failed");
            events.send(SessionDiagnostic::WriteFailed {
                reason: e.to_string(),
            });
        }
    }
}

/// Handle to a running session.
///
/// Dropping the handle stops the session; [`shutdown`](Self::shutdown)
/// additionally waits for the peripheral to be released.
#[derive(Debug)]
pub struct SessionHandle {
    inbox: mpsc::Sender<SessionEvent>,
    observer: StateObserver,
    events: EventDispatcher,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// A new observer of the session state.
    pub fn observer(&self) -> StateObserver {
        self.observer.clone()
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.observer.snapshot()
    }

    /// Subscribe to session diagnostics.
    pub fn diagnostics(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Switch relay `index` on or off.
    ///
    /// The command is queued behind every event already received. It is
    /// dropped, with a [`SessionDiagnostic::RelayWriteIgnored`], if the index
    /// is out of range or the session is not streaming with a relay
    /// characteristic bound.
    pub async fn set_relay(&self, index: usize, on: bool) -> Result<()> {
        self.inbox
            .send(SessionEvent::SetRelay { index, on })
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Stop the session and release the peripheral.
    ///
    /// Relay commands sent before this call are still applied, and their
    /// writes are performed before the peripheral is disconnected.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Session task ended abnormally");
        }
    }

    /// Whether the session task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
