//! The peripheral engine.
//!
//! [`Engine`] holds every piece of mutable state: the registry, pending
//! writes, interrogations in progress and the timer queue. It is synchronous
//! and takes the current time as an argument, so the [`crate::Central`]
//! runtime can drive it from a single task and tests can drive it by hand.
//!
//! The connection state machine lives in `connection.rs`, interrogation in
//! `interrogation.rs`, the write protocol in `commands.rs` and notification
//! handling in `input.rs`; all of them extend `Engine`.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use airturn_types::{CentralState, ConnectionState, FeaturesAvailable, Port, PortState};

use crate::commands::PendingWrites;
use crate::config::CentralConfig;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{AirTurnEvent, EventBus, Subscription};
use crate::interrogation::Interrogation;
use crate::peripheral::Peripheral;
use crate::registry::Registry;
use crate::timers::{TimerKey, TimerQueue};
use crate::transport::{Transport, TransportEvent, TransportEventReceiver};

/// The synchronous peripheral engine.
///
/// # Example
///
/// ```
/// use airturn_core::{CentralConfig, Engine, MockTransport};
/// use tokio::time::Instant;
///
/// let transport = MockTransport::new();
/// let (mut engine, mut transport_events) = Engine::new(transport.clone(), CentralConfig::default());
///
/// // feed whatever the transport reports back into the engine
/// while let Ok(event) = transport_events.try_recv() {
///     engine.handle_transport_event(event, Instant::now());
/// }
/// assert!(engine.central_state().is_usable());
/// ```
pub struct Engine {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) config: CentralConfig,
    pub(crate) registry: Registry,
    pub(crate) timers: TimerQueue,
    pub(crate) writes: PendingWrites,
    pub(crate) interrogations: HashMap<String, Interrogation>,
    pub(crate) events: EventBus,
    radio_state: CentralState,
    central_state: CentralState,
    enabled: bool,
    scan_requested: bool,
    scanning: bool,
    reconciled: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("central_state", &self.central_state)
            .field("radio_state", &self.radio_state)
            .field("enabled", &self.enabled)
            .field("scanning", &self.scanning)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine and attach it to `transport`.
    ///
    /// Returns the receiving end of the transport's event channel; every
    /// event on it must be passed to [`handle_transport_event`](Self::handle_transport_event).
    pub fn new(
        transport: impl Transport,
        config: CentralConfig,
    ) -> (Self, TransportEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut transport: Box<dyn Transport> = Box::new(transport);
        transport.attach(tx);

        let events = EventBus::new(config.event_capacity);
        let engine = Self {
            transport,
            config,
            registry: Registry::default(),
            timers: TimerQueue::default(),
            writes: PendingWrites::default(),
            interrogations: HashMap::new(),
            events,
            radio_state: CentralState::Unknown,
            central_state: CentralState::Unknown,
            enabled: true,
            scan_requested: false,
            scanning: false,
            reconciled: false,
        };
        (engine, rx)
    }

    /// The event bus events are published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    // --- Event and timer dispatch ---

    /// Advance the engine on a transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        trace!(?event, "Transport event");
        match event {
            TransportEvent::Advertisement { id, name, rssi } => {
                self.on_advertisement(&id, name, rssi, now)
            }
            TransportEvent::ConnectResult { id, result } => {
                self.on_connect_result(&id, result, now)
            }
            TransportEvent::Disconnected { id } => self.on_disconnected(&id, now),
            TransportEvent::CharacteristicRead {
                id,
                characteristic,
                result,
            } => self.on_characteristic_read(&id, characteristic, result, now),
            TransportEvent::WriteComplete {
                id,
                characteristic,
                token,
                result,
            } => self.on_write_complete(&id, characteristic, token, result),
            TransportEvent::Notify {
                id,
                characteristic,
                value,
            } => self.on_notify(&id, characteristic, &value, now),
            TransportEvent::RadioStateChanged(state) => self.on_radio_state_changed(state, now),
        }
    }

    /// When the next timer is due, if any is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire every timer due at `now`.
    pub fn fire_due_timers(&mut self, now: Instant) {
        while let Some(key) = self.timers.pop_due(now) {
            trace!(?key, "Timer fired");
            match key {
                TimerKey::Lost(id) => self.on_lost_timeout(&id),
                TimerKey::Link(id) => self.on_link_timeout(&id, now),
                TimerKey::Write(id, write_type) => self.on_write_timeout(&id, write_type),
                TimerKey::Repeat(id, port) => self.on_repeat_tick(&id, port, now),
            }
        }
    }

    /// Cancel everything outstanding. Pending write callbacks resolve with
    /// [`Error::Shutdown`].
    pub fn shutdown(&mut self) {
        if self.scanning {
            self.transport.stop_scan();
            self.scanning = false;
        }
        for (id, write_type, pending) in self.writes.drain_all() {
            debug!(peripheral = %id, %write_type, "Write abandoned at shutdown");
            pending.resolve(Err(Error::Shutdown));
        }
        self.timers = TimerQueue::default();
        self.interrogations.clear();
    }

    // --- Queries ---

    pub fn central_state(&self) -> CentralState {
        self.central_state
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A snapshot of one peripheral.
    pub fn peripheral(&self, id: &str) -> Result<Peripheral> {
        self.registry.get(id).cloned().ok_or_else(|| Error::not_found(id))
    }

    /// Snapshots of every known peripheral.
    pub fn peripherals(&self) -> Vec<Peripheral> {
        let mut all: Vec<Peripheral> = self.registry.iter().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Snapshots of the peripherals currently in the discovered set.
    pub fn discovered(&self) -> Vec<Peripheral> {
        self.registry
            .discovered_ids()
            .iter()
            .filter_map(|id| self.registry.get(id).cloned())
            .collect()
    }

    pub fn has_features(&self, id: &str, features: FeaturesAvailable) -> Result<bool> {
        self.registry
            .get(id)
            .map(|p| p.has_features(features))
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn port_state(&self, id: &str, port: Port) -> Result<PortState> {
        self.registry
            .get(id)
            .map(|p| p.port_state(port))
            .ok_or_else(|| Error::not_found(id))
    }

    // --- Central operations ---

    /// Start scanning for peripherals.
    pub fn scan(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.scan_requested = true;
        self.start_scan_if_requested();
        Ok(())
    }

    /// Stop scanning.
    pub fn stop_scan(&mut self) -> Result<()> {
        self.scan_requested = false;
        if self.scanning {
            info!("Stopping scan");
            self.transport.stop_scan();
            self.scanning = false;
        }
        Ok(())
    }

    /// Enable or disable the central.
    ///
    /// Disabling stops scanning and disconnects every peripheral; the central
    /// reports [`CentralState::Disabled`] until it is enabled again.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) -> Result<()> {
        if self.enabled == enabled {
            return Ok(());
        }
        info!(enabled, "Central enabled state changed");
        self.enabled = enabled;
        if enabled {
            self.start_scan_if_requested();
        } else {
            if self.scanning {
                self.transport.stop_scan();
                self.scanning = false;
            }
            for id in self.registry.ids() {
                self.disconnect(&id, now)?;
            }
        }
        self.refresh_central_state();
        Ok(())
    }

    /// Set the bonding hint of a peripheral.
    pub fn set_has_bonding(&mut self, id: &str, has_bonding: bool) -> Result<()> {
        let peripheral = self.registry.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        peripheral.has_bonding = has_bonding;
        debug!(peripheral = %id, has_bonding, "Bonding hint set");
        Ok(())
    }

    /// Disconnect and remove a peripheral entirely.
    pub fn forget(&mut self, id: &str) -> Result<()> {
        let state = self
            .registry
            .get(id)
            .map(|p| p.connection_state)
            .ok_or_else(|| Error::not_found(id))?;
        if state.has_link() || state == ConnectionState::Connecting {
            self.transport.disconnect(id);
        }
        self.cancel_writes(id, || Error::Cancelled);
        self.timers.cancel_peripheral(id);
        self.interrogations.remove(id);

        if let Some(peripheral) = self.registry.remove(id) {
            info!(peripheral = %id, "Peripheral forgotten");
            self.events.send(AirTurnEvent::Removed {
                peripheral: peripheral.reference(),
            });
        }
        self.refresh_central_state();
        Ok(())
    }

    /// Start-up reconciliation of identifiers saved by the application.
    ///
    /// Every identifier the transport no longer recognises is dropped and
    /// reported with [`AirTurnEvent::Invalidated`]. Returns the invalid ones.
    /// May only run once.
    pub fn reconcile(&mut self, ids: Vec<String>) -> Result<Vec<String>> {
        if self.reconciled {
            return Err(Error::AlreadyReconciled);
        }
        self.reconciled = true;

        let invalid: Vec<String> = ids
            .into_iter()
            .filter(|id| !self.transport.is_identifier_valid(id))
            .collect();
        for id in &invalid {
            info!(peripheral = %id, "Identifier invalidated");
            if self.registry.contains(id) {
                self.cancel_writes(id, || Error::Cancelled);
                self.timers.cancel_peripheral(id);
                self.interrogations.remove(id);
                self.registry.remove(id);
            }
            self.events.send(AirTurnEvent::Invalidated { id: id.clone() });
        }
        self.refresh_central_state();
        Ok(invalid)
    }

    // --- Radio and discovery ---

    fn on_radio_state_changed(&mut self, state: CentralState, now: Instant) {
        let previous = self.radio_state;
        if previous == state {
            return;
        }
        info!(?previous, ?state, "Radio state changed");
        self.radio_state = state;

        if state.is_usable() {
            self.start_scan_if_requested();
        } else {
            self.scanning = false;
            for id in self.registry.ids() {
                self.force_disconnected(&id, ConnectionFailureReason::AdapterUnavailable, now);
            }
            self.lose_all();
        }
        self.refresh_central_state();
    }

    fn on_advertisement(&mut self, id: &str, name: Option<String>, rssi: Option<i16>, now: Instant) {
        if !self.enabled {
            return;
        }
        if self.registry.insert(Peripheral::new(id)) {
            debug!(peripheral = %id, "Peripheral added");
            if let Some(peripheral) = self.registry.get(id) {
                self.events.send(AirTurnEvent::Added {
                    peripheral: peripheral.reference(),
                });
            }
        }
        let Some(peripheral) = self.registry.get_mut(id) else {
            return;
        };
        peripheral.rssi = rssi;
        if !peripheral.has_custom_name && peripheral.default_name.is_none() && name.is_some() {
            peripheral.name = name;
        }
        let resting = peripheral.connection_state.is_resting();
        let reference = peripheral.reference();

        if self.registry.mark_discovered(id) {
            info!(peripheral = %id, ?rssi, "Peripheral discovered");
            self.events.send(AirTurnEvent::Discovered {
                peripheral: reference,
                rssi,
            });
        }
        if resting {
            self.arm_lost_timer(id, now);
        }
    }

    fn on_lost_timeout(&mut self, id: &str) {
        let Some(peripheral) = self.registry.get(id) else {
            return;
        };
        if !peripheral.connection_state.is_resting() {
            return;
        }
        let reference = peripheral.reference();
        if self.registry.mark_lost(id) {
            info!(peripheral = %id, "Peripheral lost");
            self.events.send(AirTurnEvent::Lost {
                peripheral: reference,
            });
        }
    }

    fn lose_all(&mut self) {
        for id in self.registry.discovered_ids() {
            self.timers.cancel(&TimerKey::Lost(id.clone()));
            self.registry.mark_lost(&id);
            if let Some(peripheral) = self.registry.get(&id) {
                info!(peripheral = %id, "Peripheral lost with radio");
                self.events.send(AirTurnEvent::Lost {
                    peripheral: peripheral.reference(),
                });
            }
        }
    }

    // --- Helpers shared with the other engine modules ---

    pub(crate) fn arm_lost_timer(&mut self, id: &str, now: Instant) {
        self.timers
            .schedule(TimerKey::Lost(id.to_string()), now + self.config.lost_timeout);
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        if !self.enabled || !self.radio_state.is_usable() {
            return Err(Error::CentralUnavailable {
                state: self.central_state,
            });
        }
        Ok(())
    }

    /// Recompute the central state and publish it if it changed.
    pub(crate) fn refresh_central_state(&mut self) {
        let state = if !self.enabled {
            CentralState::Disabled
        } else if self.radio_state.is_usable() {
            if self.registry.ready_count() > 0 {
                CentralState::Connected
            } else {
                CentralState::Disconnected
            }
        } else {
            self.radio_state
        };
        if state != self.central_state {
            info!(previous = ?self.central_state, ?state, "Central state changed");
            self.central_state = state;
            self.events.send(AirTurnEvent::CentralStateChanged { state });
        }
    }

    fn start_scan_if_requested(&mut self) {
        if self.scan_requested && !self.scanning && self.enabled && self.radio_state.is_usable() {
            info!(services = ?self.config.scan_filter_services, "Starting scan");
            self.transport.start_scan(&self.config.scan_filter_services);
            self.scanning = true;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockPeripheral, MockTransport};

    pub const PEDAL: &str = "AA:BB:CC:DD:EE:01";

    /// An engine wired to a mock transport, with a hand-driven clock.
    pub struct Harness {
        pub engine: Engine,
        pub transport: MockTransport,
        pub rx: TransportEventReceiver,
        pub events: Subscription,
        pub now: Instant,
    }

    impl Harness {
        pub fn new(transport: MockTransport) -> Self {
            Self::with_config(transport, CentralConfig::default())
        }

        pub fn with_config(transport: MockTransport, config: CentralConfig) -> Self {
            let (engine, rx) = Engine::new(transport.clone(), config);
            let events = engine.subscribe();
            let mut harness = Self {
                engine,
                transport,
                rx,
                events,
                now: Instant::now(),
            };
            harness.pump();
            harness
        }

        /// A harness with one PEDpro that has every feature.
        pub fn with_pedal() -> Self {
            let transport = MockTransport::builder()
                .peripheral(PEDAL, MockPeripheral::builder().build())
                .build();
            Self::new(transport)
        }

        /// Deliver every queued transport event.
        pub fn pump(&mut self) {
            while let Ok(event) = self.rx.try_recv() {
                self.engine.handle_transport_event(event, self.now);
            }
        }

        pub fn advance(&mut self, by: Duration) {
            self.now += by;
            self.engine.fire_due_timers(self.now);
            self.pump();
        }

        pub fn advertise(&mut self, id: &str) {
            self.transport.advertise(id, Some("AirTurn".into()), Some(-50));
            self.pump();
        }

        /// Advertise, connect and interrogate until `Ready`.
        pub fn connect_ready(&mut self, id: &str) {
            self.advertise(id);
            self.engine.connect(id, self.now).unwrap();
            self.pump();
            assert_eq!(
                self.engine.peripheral(id).unwrap().connection_state,
                ConnectionState::Ready
            );
        }

        pub fn drain_events(&mut self) -> Vec<AirTurnEvent> {
            std::iter::from_fn(|| self.events.try_recv()).collect()
        }
    }
}
