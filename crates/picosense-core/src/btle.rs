//! [`LinkAdapter`] implementation on top of btleplug.
//!
//! Peripherals found while scanning are cached by identifier so later
//! connects can find them again. Characteristics are cached per peripheral
//! after service discovery and cleared on disconnect.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::future::ready;
use futures::stream::{self, BoxStream};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use picosense_types::PeripheralIdentity;

use crate::error::{Error, Result};
use crate::link::{
    AckPolicy, CharacteristicHandle, ConnectionEvent, DiscoveredPeripheral, GattInventory,
    LinkAdapter, RadioState,
};
use crate::util::create_identifier;

type PeripheralCache = Arc<RwLock<HashMap<String, Peripheral>>>;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::RadioUnavailable)
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

impl From<AckPolicy> for WriteType {
    fn from(ack: AckPolicy) -> Self {
        match ack {
            AckPolicy::FireAndForget => WriteType::WithoutResponse,
            AckPolicy::AwaitAck => WriteType::WithResponse,
        }
    }
}

/// The peripheral an advertisement event was heard from.
///
/// Peripherals the platform merely remembers from earlier scans are not
/// reported; only a fresh advertisement counts as a discovery.
fn advertised(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

/// Describe `peripheral` if it advertises one of `services`.
async fn describe(peripheral: &Peripheral, services: &[Uuid]) -> Option<DiscoveredPeripheral> {
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            debug!("Error reading peripheral properties: {}", e);
            return None;
        }
    };

    // Scan filters are not honoured on every platform.
    if !services.is_empty() && !properties.services.iter().any(|s| services.contains(s)) {
        return None;
    }

    let id = create_identifier(&properties.address.to_string(), &peripheral.id());
    Some(DiscoveredPeripheral {
        identity: PeripheralIdentity {
            id,
            name: properties.local_name,
        },
        services: properties.services,
        rssi: properties.rssi,
    })
}

/// Link adapter backed by the first local Bluetooth adapter.
pub struct BtleplugLink {
    adapter: Adapter,
    peripherals: PeripheralCache,
    characteristics: RwLock<HashMap<(String, Uuid), Characteristic>>,
}

impl std::fmt::Debug for BtleplugLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugLink").finish_non_exhaustive()
    }
}

impl BtleplugLink {
    /// Open the first available adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_adapter(get_adapter().await?))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            characteristics: RwLock::new(HashMap::new()),
        }
    }

    async fn lookup(&self, id: &str) -> Result<Peripheral> {
        self.peripherals
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound(id.to_string()))
    }

    async fn find_characteristic(
        &self,
        handle: &CharacteristicHandle,
    ) -> Result<(Peripheral, Characteristic)> {
        let characteristic = self
            .characteristics
            .read()
            .await
            .get(&(handle.peripheral.clone(), handle.uuid))
            .cloned()
            .ok_or(Error::CharacteristicNotFound(handle.uuid))?;
        let peripheral = self.lookup(&handle.peripheral).await?;
        Ok((peripheral, characteristic))
    }
}

#[async_trait]
impl LinkAdapter for BtleplugLink {
    async fn radio_states(&self) -> BoxStream<'static, RadioState> {
        // Platforms that cannot report the state still have a usable adapter.
        let initial = match self.adapter.adapter_state().await {
            Ok(state) => radio_state(state),
            Err(e) => {
                debug!("Adapter state unavailable, assuming powered on: {}", e);
                RadioState::PoweredOn
            }
        };

        let updates = match self.adapter.events().await {
            Ok(events) => events
                .filter_map(|event| {
                    ready(match event {
                        CentralEvent::StateUpdate(state) => Some(radio_state(state)),
                        _ => None,
                    })
                })
                .boxed(),
            Err(e) => {
                warn!("Adapter events unavailable: {}", e);
                stream::empty().boxed()
            }
        };

        stream::once(ready(initial)).chain(updates).boxed()
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn start_discovery(
        &self,
        services: &[Uuid],
    ) -> Result<BoxStream<'static, DiscoveredPeripheral>> {
        let events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await?;
        info!("Scan started");

        let adapter = self.adapter.clone();
        let filter = services.to_vec();
        let discovered = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move { adapter.peripheral(&advertised(event)?).await.ok() }
        });

        let cache = Arc::clone(&self.peripherals);
        let stream = discovered
            .filter_map(move |peripheral| {
                let cache = Arc::clone(&cache);
                let filter = filter.clone();
                async move {
                    let found = describe(&peripheral, &filter).await?;
                    let previous = cache
                        .write()
                        .await
                        .insert(found.identity.id.clone(), peripheral);
                    if previous.is_none() {
                        debug!("Found peripheral: {}", found.identity);
                    }
                    Some(found)
                }
            });

        Ok(stream.boxed())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        debug!("Scan stopped");
        Ok(())
    }

    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %peripheral))]
    async fn connect(&self, peripheral: &PeripheralIdentity) -> BoxStream<'static, ConnectionEvent> {
        fn failed(reason: String) -> BoxStream<'static, ConnectionEvent> {
            stream::once(ready(ConnectionEvent::ConnectionFailed(reason))).boxed()
        }

        let target = match self.lookup(&peripheral.id).await {
            Ok(target) => target,
            Err(e) => return failed(e.to_string()),
        };
        // Subscribe before connecting so an early drop is not missed.
        let events = match self.adapter.events().await {
            Ok(events) => events,
            Err(e) => return failed(e.to_string()),
        };

        info!("Connecting to peripheral...");
        if let Err(e) = target.connect().await {
            warn!("Connection failed: {}", e);
            return failed(e.to_string());
        }
        info!("Connected!");

        let id = target.id();
        let disconnected = events
            .filter_map(move |event| {
                ready(match event {
                    CentralEvent::DeviceDisconnected(dropped) if dropped == id => {
                        Some(ConnectionEvent::Disconnected)
                    }
                    _ => None,
                })
            })
            .take(1);

        stream::once(ready(ConnectionEvent::Connected))
            .chain(disconnected)
            .boxed()
    }

    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %peripheral))]
    async fn discover(
        &self,
        peripheral: &PeripheralIdentity,
        services: &[Uuid],
        characteristics: &[Uuid],
    ) -> Result<GattInventory> {
        let target = self.lookup(&peripheral.id).await?;
        target.discover_services().await?;

        let mut inventory = GattInventory::default();
        let mut cache = self.characteristics.write().await;
        for service in target.services() {
            debug!("  Service: {}", service.uuid);
            if !services.contains(&service.uuid) {
                continue;
            }
            inventory.services.push(service.uuid);
            for characteristic in service.characteristics {
                debug!("    Characteristic: {}", characteristic.uuid);
                if !characteristics.contains(&characteristic.uuid) {
                    continue;
                }
                inventory.characteristics.push(CharacteristicHandle::new(
                    &peripheral.id,
                    service.uuid,
                    characteristic.uuid,
                ));
                cache.insert((peripheral.id.clone(), characteristic.uuid), characteristic);
            }
        }
        debug!(
            "Resolved {} service(s), {} characteristic(s)",
            inventory.services.len(),
            inventory.characteristics.len()
        );
        Ok(inventory)
    }

    async fn subscribe(&self, handle: &CharacteristicHandle) -> Result<BoxStream<'static, Vec<u8>>> {
        let (peripheral, characteristic) = self.find_characteristic(handle).await?;
        // Open the notification stream first so no value slips through.
        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&characteristic).await?;
        debug!("Subscribed to {}", handle);

        let uuid = characteristic.uuid;
        Ok(notifications
            .filter_map(move |notification| {
                ready((notification.uuid == uuid).then_some(notification.value))
            })
            .boxed())
    }

    async fn read(&self, handle: &CharacteristicHandle) -> Result<Vec<u8>> {
        let (peripheral, characteristic) = self.find_characteristic(handle).await?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write(&self, handle: &CharacteristicHandle, data: &[u8], ack: AckPolicy) -> Result<()> {
        let (peripheral, characteristic) = self.find_characteristic(handle).await?;
        peripheral
            .write(&characteristic, data, WriteType::from(ack))
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %peripheral))]
    async fn disconnect(&self, peripheral: &PeripheralIdentity) -> Result<()> {
        self.characteristics
            .write()
            .await
            .retain(|(owner, _), _| owner != &peripheral.id);

        let target = self.lookup(&peripheral.id).await?;
        if target.is_connected().await.unwrap_or(false) {
            target.disconnect().await?;
            info!("Disconnected");
        }
        Ok(())
    }
}
