//! [`Transport`] over the platform Bluetooth stack, via btleplug.
//!
//! Every request runs on its own spawned task and reports back through the
//! transport event channel. Adapter events (discovery, connection and
//! disconnection) are forwarded by a listener task started on attach, and
//! each ready peripheral gets one notification forwarder.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use airturn_types::CentralState;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Transport, TransportEvent, TransportEventSender, WriteToken};
use crate::util::create_identifier;

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| {
        Error::connection_failed(None, ConnectionFailureReason::AdapterUnavailable)
    })
}

/// A transport driving a real Bluetooth adapter.
///
/// Must be created and used inside a tokio runtime.
pub struct BtleplugTransport {
    adapter: Adapter,
    peripherals: Shared<HashMap<String, Peripheral>>,
    /// Peripherals with a connect request in flight.
    connecting: Shared<HashSet<String>>,
    /// Peripherals with a running notification forwarder.
    forwarding: Shared<HashSet<String>>,
    events: Option<TransportEventSender>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for BtleplugTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugTransport")
            .field("known_peripherals", &lock(&self.peripherals).len())
            .field("attached", &self.events.is_some())
            .finish()
    }
}

impl BtleplugTransport {
    /// Use the first adapter on the system.
    pub async fn new() -> Result<Self> {
        Self::with_adapter(get_adapter().await?).await
    }

    /// Use a specific adapter. Peripherals the adapter already knows are
    /// recognised immediately, so saved identifiers can be reconciled.
    pub async fn with_adapter(adapter: Adapter) -> Result<Self> {
        let mut known = HashMap::new();
        for peripheral in adapter.peripherals().await? {
            if let Some(id) = identify(&peripheral).await {
                known.insert(id, peripheral);
            }
        }
        debug!(count = known.len(), "Known peripherals loaded");
        Ok(Self {
            adapter,
            peripherals: Arc::new(Mutex::new(known)),
            connecting: Arc::default(),
            forwarding: Arc::default(),
            events: None,
            cancel: CancellationToken::new(),
        })
    }

    fn lookup(&self, id: &str) -> Option<Peripheral> {
        lock(&self.peripherals).get(id).cloned()
    }

    fn sender(&self) -> Option<TransportEventSender> {
        if self.events.is_none() {
            warn!("Transport used before attach");
        }
        self.events.clone()
    }

    /// Run `task` with the peripheral, or report `missing` if it is unknown.
    fn with_peripheral<F, Fut>(&self, id: &str, missing: TransportEvent, task: F)
    where
        F: FnOnce(Peripheral, TransportEventSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(events) = self.sender() else {
            return;
        };
        match self.lookup(id) {
            Some(peripheral) => {
                tokio::spawn(task(peripheral, events));
            }
            None => {
                debug!(peripheral = %id, "Request for unknown peripheral");
                let _ = events.send(missing);
            }
        }
    }

    fn start_forwarding(&self, id: &str, peripheral: Peripheral, events: TransportEventSender) {
        if !lock(&self.forwarding).insert(id.to_string()) {
            return;
        }
        let id = id.to_string();
        let forwarding = self.forwarding.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            match peripheral.notifications().await {
                Ok(mut notifications) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = notifications.next() => {
                            let Some(notification) = next else { break };
                            let event = TransportEvent::Notify {
                                id: id.clone(),
                                characteristic: notification.uuid,
                                value: Bytes::from(notification.value),
                            };
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    }
                },
                Err(e) => warn!(peripheral = %id, error = %e, "Failed to open notification stream"),
            }
            debug!(peripheral = %id, "Notification forwarder stopped");
            lock(&forwarding).remove(&id);
        });
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for BtleplugTransport {
    fn attach(&mut self, events: TransportEventSender) {
        self.events = Some(events.clone());
        let listener = AdapterListener {
            adapter: self.adapter.clone(),
            peripherals: self.peripherals.clone(),
            connecting: self.connecting.clone(),
            forwarding: self.forwarding.clone(),
            events,
        };
        tokio::spawn(listener.run(self.cancel.clone()));
    }

    fn start_scan(&mut self, services: &[Uuid]) {
        let adapter = self.adapter.clone();
        let filter = ScanFilter {
            services: services.to_vec(),
        };
        tokio::spawn(async move {
            if let Err(e) = adapter.start_scan(filter).await {
                warn!(error = %e, "Failed to start scan");
            }
        });
    }

    fn stop_scan(&mut self) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!(error = %e, "Failed to stop scan");
            }
        });
    }

    fn connect(&mut self, id: &str) {
        let owned = id.to_string();
        let connecting = self.connecting.clone();
        let missing = TransportEvent::ConnectResult {
            id: owned.clone(),
            result: Err(ConnectionFailureReason::Other("unknown peripheral".into())),
        };
        self.with_peripheral(id, missing, move |peripheral, events| async move {
            lock(&connecting).insert(owned.clone());
            let result = match peripheral.connect().await {
                Ok(()) => peripheral.discover_services().await,
                Err(e) => Err(e),
            };
            lock(&connecting).remove(&owned);

            let result = result.map_err(|e| {
                warn!(peripheral = %owned, error = %e, "Connect failed");
                ConnectionFailureReason::BleError(e.to_string())
            });
            let _ = events.send(TransportEvent::ConnectResult { id: owned, result });
        });
    }

    fn disconnect(&mut self, id: &str) {
        let owned = id.to_string();
        let missing = TransportEvent::Disconnected { id: owned.clone() };
        // confirmation arrives as an adapter event
        self.with_peripheral(id, missing, move |peripheral, _events| async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!(peripheral = %owned, error = %e, "Disconnect failed");
            }
        });
    }

    fn read_characteristic(&mut self, id: &str, characteristic: Uuid) {
        let owned = id.to_string();
        let missing = TransportEvent::CharacteristicRead {
            id: owned.clone(),
            characteristic,
            result: Err("unknown peripheral".into()),
        };
        self.with_peripheral(id, missing, move |peripheral, events| async move {
            let result = match find_characteristic(&peripheral, characteristic) {
                Some(c) => peripheral
                    .read(&c)
                    .await
                    .map(Bytes::from)
                    .map_err(|e| e.to_string()),
                None => Err(format!("characteristic {characteristic} not found")),
            };
            let _ = events.send(TransportEvent::CharacteristicRead {
                id: owned,
                characteristic,
                result,
            });
        });
    }

    fn write_characteristic(
        &mut self,
        id: &str,
        characteristic: Uuid,
        value: Bytes,
        token: WriteToken,
    ) {
        let owned = id.to_string();
        let missing = TransportEvent::WriteComplete {
            id: owned.clone(),
            characteristic,
            token,
            result: Err("unknown peripheral".into()),
        };
        self.with_peripheral(id, missing, move |peripheral, events| async move {
            let result = match find_characteristic(&peripheral, characteristic) {
                Some(c) => peripheral
                    .write(&c, &value, WriteType::WithResponse)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err(format!("characteristic {characteristic} not found")),
            };
            let _ = events.send(TransportEvent::WriteComplete {
                id: owned,
                characteristic,
                token,
                result,
            });
        });
    }

    fn subscribe(&mut self, id: &str, characteristic: Uuid) {
        let (Some(peripheral), Some(events)) = (self.lookup(id), self.sender()) else {
            return;
        };
        self.start_forwarding(id, peripheral.clone(), events);

        let owned = id.to_string();
        tokio::spawn(async move {
            let Some(c) = find_characteristic(&peripheral, characteristic) else {
                // optional characteristics are absent on some models
                debug!(peripheral = %owned, %characteristic, "No such characteristic to subscribe");
                return;
            };
            if let Err(e) = peripheral.subscribe(&c).await {
                warn!(peripheral = %owned, %characteristic, error = %e, "Subscribe failed");
            }
        });
    }

    fn is_identifier_valid(&self, id: &str) -> bool {
        lock(&self.peripherals).contains_key(id)
    }
}

/// Forwards adapter events to the engine.
struct AdapterListener {
    adapter: Adapter,
    peripherals: Shared<HashMap<String, Peripheral>>,
    connecting: Shared<HashSet<String>>,
    forwarding: Shared<HashSet<String>>,
    events: TransportEventSender,
}

impl AdapterListener {
    async fn run(self, cancel: CancellationToken) {
        let mut stream = match self.adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Adapter events unavailable");
                let _ = self
                    .events
                    .send(TransportEvent::RadioStateChanged(CentralState::Unsupported));
                return;
            }
        };
        info!("Bluetooth adapter attached");
        let _ = self
            .events
            .send(TransportEvent::RadioStateChanged(CentralState::Disconnected));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => {
                    let Some(event) = next else {
                        warn!("Adapter event stream ended");
                        let _ = self
                            .events
                            .send(TransportEvent::RadioStateChanged(CentralState::Unknown));
                        break;
                    };
                    if !self.handle(event).await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns false once the engine has gone away.
    async fn handle(&self, event: CentralEvent) -> bool {
        let forwarded = match event {
            CentralEvent::DeviceDiscovered(pid) | CentralEvent::DeviceUpdated(pid) => {
                let Some((id, peripheral)) = self.resolve(&pid).await else {
                    return true;
                };
                let properties = peripheral.properties().await.ok().flatten();
                lock(&self.peripherals).insert(id.clone(), peripheral);
                TransportEvent::Advertisement {
                    id,
                    name: properties.as_ref().and_then(|p| p.local_name.clone()),
                    rssi: properties.and_then(|p| p.rssi),
                }
            }
            CentralEvent::DeviceConnected(pid) => {
                let Some((id, peripheral)) = self.resolve(&pid).await else {
                    return true;
                };
                if lock(&self.connecting).contains(&id) {
                    // reported by the connect request itself
                    return true;
                }
                debug!(peripheral = %id, "Link up without a connect request");
                let result = peripheral
                    .discover_services()
                    .await
                    .map_err(|e| ConnectionFailureReason::BleError(e.to_string()));
                TransportEvent::ConnectResult { id, result }
            }
            CentralEvent::DeviceDisconnected(pid) => {
                let Some((id, _)) = self.resolve(&pid).await else {
                    return true;
                };
                lock(&self.forwarding).remove(&id);
                TransportEvent::Disconnected { id }
            }
            _ => return true,
        };
        self.events.send(forwarded).is_ok()
    }

    async fn resolve(&self, pid: &PeripheralId) -> Option<(String, Peripheral)> {
        let peripheral = self.adapter.peripheral(pid).await.ok()?;
        let id = identify(&peripheral).await?;
        Some((id, peripheral))
    }
}

async fn identify(peripheral: &Peripheral) -> Option<String> {
    let properties = peripheral.properties().await.ok()??;
    Some(create_identifier(
        &properties.address.to_string(),
        &peripheral.id(),
    ))
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
}
