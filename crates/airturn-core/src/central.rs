//! The central runtime.
//!
//! [`Central`] owns an [`Engine`] on a background task. Transport events,
//! timer deadlines and API calls are all handled on that one task, so the
//! engine never needs locking and events are published in the order the
//! state changed.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use semver::Version;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use airturn_types::{
    CentralState, ConnectionConfiguration, DebounceTime, FeaturesAvailable, PairingMethod, Port,
    PortState, WriteType, WriteValue,
};

use crate::btle::BtleplugTransport;
use crate::commands::WriteCallback;
use crate::config::CentralConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::events::{EventBus, Subscription};
use crate::firmware::{FirmwareCallback, FirmwareCatalog, check_for_update};
use crate::peripheral::Peripheral;
use crate::transport::{Transport, TransportEventReceiver};

type Command = Box<dyn FnOnce(&mut Engine, Instant) + Send>;

/// Builder for a [`Central`].
#[derive(Default)]
pub struct CentralBuilder {
    config: CentralConfig,
    catalog: Option<Arc<dyn FirmwareCatalog>>,
}

impl std::fmt::Debug for CentralBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralBuilder")
            .field("config", &self.config)
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}

impl CentralBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: CentralConfig) -> Self {
        self.config = config;
        self
    }

    /// Where firmware update checks look up the latest versions.
    #[must_use]
    pub fn firmware_catalog(mut self, catalog: Arc<dyn FirmwareCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Start the runtime on `transport`. Must be called inside a tokio runtime.
    pub fn start(self, transport: impl Transport) -> Result<Central> {
        self.config.validate()?;
        let (engine, transport_events) = Engine::new(transport, self.config);
        let events = engine.events().clone();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(engine, transport_events, command_rx, cancel.clone()));
        info!("Central started");
        Ok(Central {
            commands,
            events,
            catalog: self.catalog,
            cancel,
            task: Some(task),
        })
    }

    /// Start the runtime on the system's first Bluetooth adapter.
    pub async fn start_bluetooth(self) -> Result<Central> {
        let transport = BtleplugTransport::new().await?;
        self.start(transport)
    }
}

/// Handle to a running central.
///
/// # Example
///
/// ```
/// use airturn_core::{Central, CentralConfig, MockTransport};
/// use airturn_core::events::AirTurnEvent;
///
/// #[tokio::main]
/// async fn main() -> airturn_core::Result<()> {
///     let transport = MockTransport::new();
///     let central = Central::new(transport.clone(), CentralConfig::default())?;
///     let mut events = central.subscribe();
///
///     central.scan().await?;
///     transport.advertise("pedal-1", Some("PEDpro".into()), Some(-60));
///
///     while let Some(event) = events.recv().await {
///         if let AirTurnEvent::Discovered { peripheral, .. } = event {
///             assert_eq!(peripheral.id, "pedal-1");
///             break;
///         }
///     }
///     central.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Central {
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus,
    catalog: Option<Arc<dyn FirmwareCatalog>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Central {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Central")
            .field("running", &!self.cancel.is_cancelled())
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl Central {
    /// Start a central on `transport` with no firmware catalog.
    pub fn new(transport: impl Transport, config: CentralConfig) -> Result<Self> {
        CentralBuilder::new().config(config).start(transport)
    }

    pub fn builder() -> CentralBuilder {
        CentralBuilder::new()
    }

    /// Subscribe to events. Every subscriber sees every event.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run `f` on the engine task and return its result.
    async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Engine, Instant) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let command: Command = Box::new(move |engine: &mut Engine, now: Instant| {
            let _ = tx.send(f(engine, now));
        });
        self.commands.send(command).map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    // --- Central ---

    pub async fn scan(&self) -> Result<()> {
        self.call(|engine, _| engine.scan()).await?
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.call(|engine, _| engine.stop_scan()).await?
    }

    pub async fn is_scanning(&self) -> Result<bool> {
        self.call(|engine, _| engine.is_scanning()).await
    }

    pub async fn central_state(&self) -> Result<CentralState> {
        self.call(|engine, _| engine.central_state()).await
    }

    /// Enable or disable the central. A disabled central disconnects
    /// everything and refuses to scan or connect.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.call(move |engine, now| engine.set_enabled(enabled, now))
            .await?
    }

    /// Drop saved identifiers the platform no longer knows. May run once;
    /// returns the identifiers that were dropped.
    pub async fn reconcile(&self, ids: Vec<String>) -> Result<Vec<String>> {
        self.call(move |engine, _| engine.reconcile(ids)).await?
    }

    // --- Peripherals ---

    pub async fn peripheral(&self, id: &str) -> Result<Peripheral> {
        let id = id.to_string();
        self.call(move |engine, _| engine.peripheral(&id)).await?
    }

    pub async fn peripherals(&self) -> Result<Vec<Peripheral>> {
        self.call(|engine, _| engine.peripherals()).await
    }

    /// Peripherals advertising within the lost window.
    pub async fn discovered(&self) -> Result<Vec<Peripheral>> {
        self.call(|engine, _| engine.discovered()).await
    }

    pub async fn connect(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(move |engine, now| engine.connect(&id, now)).await?
    }

    pub async fn disconnect(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(move |engine, now| engine.disconnect(&id, now))
            .await?
    }

    /// Disconnect and remove a peripheral.
    pub async fn forget(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(move |engine, _| engine.forget(&id)).await?
    }

    /// Tell the central the peripheral holds a bond that must be removed
    /// before it can connect.
    pub async fn set_has_bonding(&self, id: &str, has_bonding: bool) -> Result<()> {
        let id = id.to_string();
        self.call(move |engine, _| engine.set_has_bonding(&id, has_bonding))
            .await?
    }

    pub async fn has_features(&self, id: &str, features: FeaturesAvailable) -> Result<bool> {
        let id = id.to_string();
        self.call(move |engine, _| engine.has_features(&id, features))
            .await?
    }

    pub async fn port_state(&self, id: &str, port: Port) -> Result<PortState> {
        let id = id.to_string();
        self.call(move |engine, _| engine.port_state(&id, port))
            .await?
    }

    /// Store a display name, or restore the default with `None`.
    pub async fn store_device_name(&self, id: &str, name: Option<&str>) -> Result<()> {
        let id = id.to_string();
        let name = name.map(str::to_string);
        self.call(move |engine, _| engine.store_device_name(&id, name.as_deref()))
            .await?
    }

    /// Ask the firmware catalog whether a newer firmware exists.
    ///
    /// `None` means either up to date or unknown: no catalog, catalog
    /// unreachable, or firmware version not read yet.
    pub async fn check_for_firmware_update(&self, id: &str) -> Result<Option<Version>> {
        let peripheral = self.peripheral(id).await?;
        Ok(check_for_update(
            self.catalog.as_deref(),
            peripheral.device_type,
            peripheral.firmware_version,
        )
        .await)
    }

    /// Like [`check_for_firmware_update`](Self::check_for_firmware_update),
    /// but returns once the snapshot is taken and reports the result to
    /// `callback` from a spawned task.
    pub async fn check_for_firmware_update_with_callback(
        &self,
        id: &str,
        callback: FirmwareCallback,
    ) -> Result<()> {
        let peripheral = self.peripheral(id).await?;
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let latest = check_for_update(
                catalog.as_deref(),
                peripheral.device_type,
                peripheral.firmware_version,
            )
            .await;
            callback(latest);
        });
        Ok(())
    }

    // --- Writes ---

    /// Write a programmable property.
    ///
    /// Errors returned here mean nothing was sent. The returned ticket
    /// resolves once the peripheral answers; see [`WriteTicket`].
    pub async fn write(&self, id: &str, value: WriteValue) -> Result<WriteTicket> {
        let (tx, rx) = oneshot::channel();
        let callback: WriteCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });
        self.write_with_callback(id, value, callback).await?;
        Ok(WriteTicket {
            write_type: value.write_type(),
            receiver: rx,
        })
    }

    /// Write a programmable property, reporting the outcome to `callback`.
    ///
    /// The callback runs on the central task and must not block. It is
    /// dropped without running if a newer write of the same property
    /// replaces this one.
    pub async fn write_with_callback(
        &self,
        id: &str,
        value: WriteValue,
        callback: WriteCallback,
    ) -> Result<()> {
        let id = id.to_string();
        self.call(move |engine, now| engine.write(&id, value, callback, now))
            .await?
    }

    /// Raw delay-before-repeat multiplier; seconds are `4 * multiplier / 255`.
    pub async fn write_delay_before_repeat(&self, id: &str, multiplier: u8) -> Result<WriteTicket> {
        self.write(id, WriteValue::DelayBeforeRepeat(multiplier)).await
    }

    /// Raw repeat-rate divisor; the interval is `4 / divisor` seconds.
    pub async fn write_repeat_rate(&self, id: &str, divisor: u8) -> Result<WriteTicket> {
        self.write(id, WriteValue::RepeatRate(divisor)).await
    }

    pub async fn write_idle_power_off(&self, id: &str, seconds: u16) -> Result<WriteTicket> {
        self.write(id, WriteValue::IdlePowerOff(seconds)).await
    }

    pub async fn write_connection_configuration(
        &self,
        id: &str,
        configuration: ConnectionConfiguration,
    ) -> Result<WriteTicket> {
        self.write(id, WriteValue::ConnectionConfiguration(configuration))
            .await
    }

    pub async fn write_pairing_method(
        &self,
        id: &str,
        method: PairingMethod,
    ) -> Result<WriteTicket> {
        self.write(id, WriteValue::PairingMethod(method)).await
    }

    pub async fn write_debounce_time(
        &self,
        id: &str,
        millis: DebounceTime,
    ) -> Result<WriteTicket> {
        self.write(id, WriteValue::DebounceTime(millis)).await
    }

    // --- Lifecycle ---

    /// Stop the runtime. Pending writes fail with [`Error::Shutdown`] and
    /// subscriptions end.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Central task ended abnormally");
            }
        }
        info!("Central shut down");
    }
}

impl Drop for Central {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Outcome of a write that was sent.
///
/// Resolves to `Ok(())` when the peripheral acknowledged it, or an error if
/// it failed, timed out, was cancelled by a disconnect, or was superseded
/// by a newer write of the same property.
#[derive(Debug)]
#[must_use = "a write ticket does nothing unless awaited"]
pub struct WriteTicket {
    write_type: WriteType,
    receiver: oneshot::Receiver<Result<()>>,
}

impl WriteTicket {
    pub fn write_type(&self) -> WriteType {
        self.write_type
    }
}

impl Future for WriteTicket {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let write_type = self.write_type;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Superseded(write_type))))
    }
}

async fn run(
    mut engine: Engine,
    mut transport_events: TransportEventReceiver,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(event) = transport_events.recv() => {
                engine.handle_transport_event(event, Instant::now());
            }
            command = commands.recv() => match command {
                Some(command) => command(&mut engine, Instant::now()),
                None => break,
            },
            _ = sleep_until(deadline) => engine.fire_due_timers(Instant::now()),
        }
    }
    debug!("Central task stopping");
    engine.shutdown();
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = CentralConfig::default().event_capacity(0);
        assert!(matches!(
            Central::new(MockTransport::new(), config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_calls_fail_after_shutdown() {
        let central = Central::new(MockTransport::new(), CentralConfig::default()).unwrap();
        let mut events = central.subscribe();
        let commands = central.commands.clone();
        central.shutdown().await;

        // the task is gone, so nothing can be delivered to it
        let noop: Command = Box::new(|_: &mut Engine, _: Instant| {});
        assert!(commands.send(noop).is_err());
        // the bus closes once every sender is dropped
        while events.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_queries_round_trip() {
        let transport = MockTransport::new();
        let central = Central::new(transport.clone(), CentralConfig::default()).unwrap();
        assert_eq!(
            central.central_state().await.unwrap(),
            CentralState::Disconnected
        );
        assert!(!central.is_scanning().await.unwrap());
        central.scan().await.unwrap();
        assert!(central.is_scanning().await.unwrap());
        assert!(matches!(
            central.peripheral("missing").await,
            Err(Error::PeripheralNotFound(_))
        ));
        central.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_ticket_superseded_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        drop(tx);
        let ticket = WriteTicket {
            write_type: WriteType::RepeatRate,
            receiver: rx,
        };
        assert!(matches!(
            ticket.await,
            Err(Error::Superseded(WriteType::RepeatRate))
        ));
    }
}
