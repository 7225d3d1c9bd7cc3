//! In-memory link adapter for testing.
//!
//! [`MockLink`] implements [`LinkAdapter`] without a Bluetooth stack. Tests
//! script the peripheral side: which peripherals advertise, how connects
//! resolve, which GATT entries exist and what values are notified. Every
//! call the session makes is recorded for inspection.
//!
//! # Features
//!
//! - **Radio control**: power the radio on and off mid-session
//! - **Failure injection**: failed connects, failed discovery, failed
//!   subscriptions, partial GATT tables
//! - **Latency simulation**: delay connects and reads like a slow radio
//! - **Peripheral echo**: optionally notify relay writes back, as the board
//!   firmware does

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::{Mutex, mpsc, watch};
use uuid::Uuid;

use picosense_types::{PeripheralIdentity, uuids};

use crate::error::{Error, Result};
use crate::link::{
    AckPolicy, CharacteristicHandle, ConnectionEvent, DiscoveredPeripheral, GattInventory,
    LinkAdapter, RadioState,
};

/// A write the session issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub handle: CharacteristicHandle,
    pub data: Vec<u8>,
    pub ack: AckPolicy,
}

/// A scriptable [`LinkAdapter`].
///
/// # Example
///
/// ```
/// use picosense_core::{LinkAdapter, MockLink};
/// use picosense_types::uuids;
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() {
///     let link = MockLink::new();
///     link.advertise("AA:BB:CC:DD:EE:01", Some("Pi Pico Sensor")).await;
///
///     let mut scan = link.start_discovery(&uuids::REQUIRED_SERVICES).await.unwrap();
///     let found = scan.next().await.unwrap();
///     assert_eq!(found.identity.id, "AA:BB:CC:DD:EE:01");
/// }
/// ```
pub struct MockLink {
    radio: watch::Sender<RadioState>,
    advertisers: Mutex<Vec<DiscoveredPeripheral>>,
    scan: Mutex<Option<mpsc::UnboundedSender<DiscoveredPeripheral>>>,
    scan_starts: AtomicU32,
    scan_stops: AtomicU32,
    fail_scan: AtomicBool,
    connect_outcomes: Mutex<VecDeque<std::result::Result<(), String>>>,
    connects: Mutex<Vec<String>>,
    disconnects: Mutex<Vec<String>>,
    links: Mutex<HashMap<String, mpsc::UnboundedSender<ConnectionEvent>>>,
    services: Mutex<Vec<Uuid>>,
    characteristics: Mutex<Vec<Uuid>>,
    discovery_failure: Mutex<Option<String>>,
    failing_subscriptions: Mutex<HashSet<Uuid>>,
    subscribers: Mutex<HashMap<Uuid, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    values: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: watch::Sender<Vec<WriteRecord>>,
    echo_writes: AtomicBool,
    /// Delay before a connect resolves, in milliseconds (0 = none).
    connect_latency_ms: AtomicU64,
    /// Delay before reads and discovery answer, in milliseconds (0 = none).
    read_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("radio", &*self.radio.borrow())
            .field("scan_starts", &self.scan_starts.load(Ordering::Relaxed))
            .field("writes", &self.writes.borrow().len())
            .finish()
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// A powered-on radio with nothing advertising. Connects succeed and the
    /// peripheral exposes the full service.
    pub fn new() -> Self {
        let (radio, _) = watch::channel(RadioState::PoweredOn);
        let (writes, _) = watch::channel(Vec::new());
        Self {
            radio,
            advertisers: Mutex::new(Vec::new()),
            scan: Mutex::new(None),
            scan_starts: AtomicU32::new(0),
            scan_stops: AtomicU32::new(0),
            fail_scan: AtomicBool::new(false),
            connect_outcomes: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            links: Mutex::new(HashMap::new()),
            services: Mutex::new(uuids::REQUIRED_SERVICES.to_vec()),
            characteristics: Mutex::new(uuids::REQUIRED_CHARACTERISTICS.to_vec()),
            discovery_failure: Mutex::new(None),
            failing_subscriptions: Mutex::new(HashSet::new()),
            subscribers: Mutex::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
            writes,
            echo_writes: AtomicBool::new(false),
            connect_latency_ms: AtomicU64::new(0),
            read_latency_ms: AtomicU64::new(0),
        }
    }

    // --- Radio ---

    /// Report a new radio state to the session.
    pub fn set_radio(&self, state: RadioState) {
        self.radio.send_replace(state);
    }

    // --- Scanning ---

    /// Make `id` advertise the environmental sensing service. It is reported
    /// to the running scan, if any, and to every later scan.
    pub async fn advertise(&self, id: &str, name: Option<&str>) -> PeripheralIdentity {
        let identity = PeripheralIdentity {
            id: id.to_string(),
            name: name.map(str::to_string),
        };
        let peripheral = DiscoveredPeripheral {
            identity: identity.clone(),
            services: uuids::REQUIRED_SERVICES.to_vec(),
            rssi: Some(-55),
        };
        self.advertisers.lock().await.push(peripheral.clone());
        if let Some(scan) = self.scan.lock().await.as_ref() {
            let _ = scan.send(peripheral);
        }
        identity
    }

    /// Advertise a peripheral with a random address.
    pub async fn advertise_any(&self, name: &str) -> PeripheralIdentity {
        let id = format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF);
        self.advertise(&id, Some(name)).await
    }

    /// Stop advertising `id`.
    pub async fn withdraw(&self, id: &str) {
        self.advertisers
            .lock()
            .await
            .retain(|p| p.identity.id != id);
    }

    /// Make `start_discovery` fail.
    pub fn set_scan_failure(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::Relaxed);
    }

    /// Whether a scan is running.
    pub async fn is_scanning(&self) -> bool {
        self.scan.lock().await.is_some()
    }

    /// Number of `start_discovery` calls.
    pub fn scan_starts(&self) -> u32 {
        self.scan_starts.load(Ordering::Relaxed)
    }

    /// Number of `stop_discovery` calls.
    pub fn scan_stops(&self) -> u32 {
        self.scan_stops.load(Ordering::Relaxed)
    }

    // --- Connections ---

    /// Make the next connect attempt fail with `reason`. Attempts with no
    /// queued outcome succeed.
    pub async fn fail_next_connect(&self, reason: &str) {
        self.connect_outcomes
            .lock()
            .await
            .push_back(Err(reason.to_string()));
    }

    /// Drop the link to `id` as if the peripheral went away.
    pub async fn drop_link(&self, id: &str) {
        if let Some(link) = self.links.lock().await.remove(id) {
            let _ = link.send(ConnectionEvent::Disconnected);
        }
        self.subscribers.lock().await.clear();
    }

    /// Whether `id` is connected.
    pub async fn is_connected(&self, id: &str) -> bool {
        self.links.lock().await.contains_key(id)
    }

    /// Peripherals the session tried to connect to, in order.
    pub async fn connect_attempts(&self) -> Vec<String> {
        self.connects.lock().await.clone()
    }

    /// Peripherals the session disconnected, in order.
    pub async fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().await.clone()
    }

    // --- GATT ---

    /// Services the peripheral exposes.
    pub async fn set_services(&self, services: &[Uuid]) {
        *self.services.lock().await = services.to_vec();
    }

    /// Characteristics the peripheral exposes within its services.
    pub async fn set_characteristics(&self, characteristics: &[Uuid]) {
        *self.characteristics.lock().await = characteristics.to_vec();
    }

    /// Make service discovery fail with `reason`.
    pub async fn fail_discovery(&self, reason: &str) {
        *self.discovery_failure.lock().await = Some(reason.to_string());
    }

    /// Make subscribing to `uuid` fail.
    pub async fn fail_subscription(&self, uuid: Uuid) {
        self.failing_subscriptions.lock().await.insert(uuid);
    }

    /// Set the value returned by reads of `uuid` without notifying.
    pub async fn set_value(&self, uuid: Uuid, data: &[u8]) {
        self.values.lock().await.insert(uuid, data.to_vec());
    }

    /// Set the value of `uuid` and notify every subscriber.
    pub async fn notify(&self, uuid: Uuid, data: &[u8]) {
        self.set_value(uuid, data).await;
        if let Some(senders) = self.subscribers.lock().await.get_mut(&uuid) {
            senders.retain(|tx| tx.send(data.to_vec()).is_ok());
        }
    }

    /// Number of live subscriptions for `uuid`.
    pub async fn subscriber_count(&self, uuid: Uuid) -> usize {
        self.subscribers
            .lock()
            .await
            .get(&uuid)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    // --- Latency ---

    /// Delay every connect attempt by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Delay service discovery and characteristic reads by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    async fn simulate_latency(millis: &AtomicU64) {
        let ms = millis.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    // --- Writes ---

    /// Notify relay writes back to subscribers.
    pub fn set_echo_writes(&self, echo: bool) {
        self.echo_writes.store(echo, Ordering::Relaxed);
    }

    /// Every write so far.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.borrow().clone()
    }

    /// Wait until at least `count` writes were made and return them all.
    pub async fn wait_for_writes(&self, count: usize) -> Vec<WriteRecord> {
        let mut rx = self.writes.subscribe();
        match rx.wait_for(|writes| writes.len() >= count).await {
            Ok(writes) => writes.clone(),
            Err(_) => self.writes(),
        }
    }
}

/// Stream the items sent on `rx` until every sender is gone.
fn receiver_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

#[async_trait]
impl LinkAdapter for MockLink {
    async fn radio_states(&self) -> BoxStream<'static, RadioState> {
        let rx = self.radio.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let state = *rx.borrow_and_update();
            Some((state, (rx, false)))
        })
        .boxed()
    }

    async fn start_discovery(
        &self,
        services: &[Uuid],
    ) -> Result<BoxStream<'static, DiscoveredPeripheral>> {
        self.scan_starts.fetch_add(1, Ordering::Relaxed);
        if self.fail_scan.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::RuntimeError(
                "scan rejected".to_string(),
            )));
        }
        if !self.radio.borrow().is_ready() {
            return Err(Error::RadioUnavailable);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for peripheral in self.advertisers.lock().await.iter() {
            if peripheral.services.iter().any(|s| services.contains(s)) {
                let _ = tx.send(peripheral.clone());
            }
        }
        *self.scan.lock().await = Some(tx);
        Ok(receiver_stream(rx))
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.scan_stops.fetch_add(1, Ordering::Relaxed);
        self.scan.lock().await.take();
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralIdentity) -> BoxStream<'static, ConnectionEvent> {
        self.connects.lock().await.push(peripheral.id.clone());
        Self::simulate_latency(&self.connect_latency_ms).await;

        let (tx, rx) = mpsc::unbounded_channel();
        match self.connect_outcomes.lock().await.pop_front() {
            Some(Err(reason)) => {
                let _ = tx.send(ConnectionEvent::ConnectionFailed(reason));
            }
            Some(Ok(())) | None => {
                let _ = tx.send(ConnectionEvent::Connected);
                self.links.lock().await.insert(peripheral.id.clone(), tx);
            }
        }
        receiver_stream(rx)
    }

    async fn discover(
        &self,
        peripheral: &PeripheralIdentity,
        services: &[Uuid],
        characteristics: &[Uuid],
    ) -> Result<GattInventory> {
        Self::simulate_latency(&self.read_latency_ms).await;
        if !self.links.lock().await.contains_key(&peripheral.id) {
            return Err(Error::NotConnected);
        }
        if let Some(reason) = self.discovery_failure.lock().await.clone() {
            return Err(Error::connection_failed(&peripheral.id, reason));
        }

        let found_services: Vec<Uuid> = self
            .services
            .lock()
            .await
            .iter()
            .filter(|s| services.contains(s))
            .copied()
            .collect();
        let Some(service) = found_services.first().copied() else {
            return Ok(GattInventory::default());
        };
        let found_characteristics = self
            .characteristics
            .lock()
            .await
            .iter()
            .filter(|c| characteristics.contains(c))
            .map(|c| CharacteristicHandle::new(&peripheral.id, service, *c))
            .collect();

        Ok(GattInventory {
            services: found_services,
            characteristics: found_characteristics,
        })
    }

    async fn subscribe(&self, handle: &CharacteristicHandle) -> Result<BoxStream<'static, Vec<u8>>> {
        if !self.links.lock().await.contains_key(&handle.peripheral) {
            return Err(Error::NotConnected);
        }
        if self.failing_subscriptions.lock().await.contains(&handle.uuid) {
            return Err(Error::CharacteristicNotFound(handle.uuid));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(handle.uuid)
            .or_default()
            .push(tx);
        Ok(receiver_stream(rx))
    }

    async fn read(&self, handle: &CharacteristicHandle) -> Result<Vec<u8>> {
        Self::simulate_latency(&self.read_latency_ms).await;
        if !self.links.lock().await.contains_key(&handle.peripheral) {
            return Err(Error::NotConnected);
        }
        self.values
            .lock()
            .await
            .get(&handle.uuid)
            .cloned()
            .ok_or(Error::CharacteristicNotFound(handle.uuid))
    }

    async fn write(&self, handle: &CharacteristicHandle, data: &[u8], ack: AckPolicy) -> Result<()> {
        if !self.links.lock().await.contains_key(&handle.peripheral) {
            return Err(Error::NotConnected);
        }
        self.writes.send_modify(|writes| {
            writes.push(WriteRecord {
                handle: handle.clone(),
                data: data.to_vec(),
                ack,
            })
        });
        if self.echo_writes.load(Ordering::Relaxed) && handle.uuid == uuids::RELAY_CONTROL {
            self.notify(handle.uuid, data).await;
        }
        Ok(())
    }

    async fn disconnect(&self, peripheral: &PeripheralIdentity) -> Result<()> {
        self.disconnects.lock().await.push(peripheral.id.clone());
        if let Some(link) = self.links.lock().await.remove(&peripheral.id) {
            let _ = link.send(ConnectionEvent::Disconnected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picosense_types::CharacteristicKind;

    fn identity() -> PeripheralIdentity {
        PeripheralIdentity::with_name("AA:BB:CC:DD:EE:01", "Pi Pico Sensor")
    }

    #[tokio::test]
    async fn test_radio_states_start_with_current() {
        let link = MockLink::new();
        let mut states = link.radio_states().await;
        assert_eq!(states.next().await, Some(RadioState::PoweredOn));

        link.set_radio(RadioState::PoweredOff);
        assert_eq!(states.next().await, Some(RadioState::PoweredOff));
    }

    #[tokio::test]
    async fn test_scan_reports_existing_and_new_advertisers() {
        let link = MockLink::new();
        link.advertise("first", None).await;

        let mut scan = link.start_discovery(&uuids::REQUIRED_SERVICES).await.unwrap();
        assert_eq!(scan.next().await.unwrap().identity.id, "first");

        link.advertise("second", Some("Pico")).await;
        let found = scan.next().await.unwrap();
        assert_eq!(found.identity.name.as_deref(), Some("Pico"));

        link.stop_discovery().await.unwrap();
        assert!(scan.next().await.is_none());
        assert_eq!(link.scan_starts(), 1);
        assert_eq!(link.scan_stops(), 1);
    }

    #[tokio::test]
    async fn test_scan_fails_with_radio_off() {
        let link = MockLink::new();
        link.set_radio(RadioState::PoweredOff);
        assert!(matches!(
            link.start_discovery(&uuids::REQUIRED_SERVICES).await,
            Err(Error::RadioUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_connect_outcomes() {
        let link = MockLink::new();
        link.fail_next_connect("busy").await;

        let mut events = link.connect(&identity()).await;
        assert_eq!(
            events.next().await,
            Some(ConnectionEvent::ConnectionFailed("busy".to_string()))
        );
        assert!(events.next().await.is_none());

        let mut events = link.connect(&identity()).await;
        assert_eq!(events.next().await, Some(ConnectionEvent::Connected));
        link.drop_link(&identity().id).await;
        assert_eq!(events.next().await, Some(ConnectionEvent::Disconnected));
        assert_eq!(link.connect_attempts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_filters_to_exposed_entries() {
        let link = MockLink::new();
        let _events = link.connect(&identity()).await;
        link.set_characteristics(&[uuids::TEMPERATURE]).await;

        let inventory = link
            .discover(
                &identity(),
                &uuids::REQUIRED_SERVICES,
                &uuids::REQUIRED_CHARACTERISTICS,
            )
            .await
            .unwrap();
        assert_eq!(inventory.services, uuids::REQUIRED_SERVICES.to_vec());
        assert_eq!(inventory.characteristics.len(), 1);
        assert_eq!(
            inventory.characteristics[0].kind(),
            Some(CharacteristicKind::Temperature)
        );
    }

    #[tokio::test]
    async fn test_discover_requires_connection() {
        let link = MockLink::new();
        assert!(matches!(
            link.discover(&identity(), &uuids::REQUIRED_SERVICES, &[]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let link = MockLink::new();
        let _events = link.connect(&identity()).await;
        let handle = CharacteristicHandle::new(
            identity().id,
            uuids::ENVIRONMENTAL_SENSING_SERVICE,
            uuids::HUMIDITY,
        );

        let mut values = link.subscribe(&handle).await.unwrap();
        link.notify(uuids::HUMIDITY, &[0x88, 0x13]).await;
        assert_eq!(values.next().await, Some(vec![0x88, 0x13]));
        assert_eq!(link.read(&handle).await.unwrap(), vec![0x88, 0x13]);
    }

    #[tokio::test]
    async fn test_write_echo() {
        let link = MockLink::new();
        link.set_echo_writes(true);
        let _events = link.connect(&identity()).await;
        let handle = CharacteristicHandle::new(
            identity().id,
            uuids::ENVIRONMENTAL_SENSING_SERVICE,
            uuids::RELAY_CONTROL,
        );

        let mut values = link.subscribe(&handle).await.unwrap();
        link.write(&handle, &[0x01], AckPolicy::FireAndForget)
            .await
            .unwrap();
        assert_eq!(values.next().await, Some(vec![0x01]));
        assert_eq!(link.wait_for_writes(1).await[0].data, vec![0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_connect_and_read() {
        let link = MockLink::new();
        link.set_connect_latency(Duration::from_millis(200));
        link.set_read_latency(Duration::from_millis(50));
        link.set_value(uuids::TEMPERATURE, &[0x39, 0x09]).await;

        let start = tokio::time::Instant::now();
        let _events = link.connect(&identity()).await;
        assert!(start.elapsed() >= Duration::from_millis(200));

        let handle = CharacteristicHandle::new(
            identity().id,
            uuids::ENVIRONMENTAL_SENSING_SERVICE,
            uuids::TEMPERATURE,
        );
        let start = tokio::time::Instant::now();
        assert_eq!(link.read(&handle).await.unwrap(), vec![0x39, 0x09]);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_advertise_any_generates_mock_address() {
        let link = MockLink::new();
        let identity = link.advertise_any("Pico").await;
        assert!(identity.id.starts_with("MOCK-"));
    }
}
