//! Mock transport for testing without BLE hardware.
//!
//! [`MockTransport`] implements [`Transport`] against a table of simulated
//! peripherals. Requests are answered synchronously by queueing the matching
//! [`TransportEvent`] on the engine's channel, so a test drives the engine
//! deterministically by draining that channel.
//!
//! # Features
//!
//! - **Simulated peripherals**: Characteristic values built with [`MockPeripheral::builder`]
//! - **Failure injection**: Failed connects, failed reads, rejected writes
//! - **Manual control**: Hold back connect results, write acknowledgements or
//!   read answers and deliver them by hand
//! - **Call recording**: Every request is recorded as a [`TransportCall`]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use airturn_types::uuids;
use airturn_types::{
    CentralState, ChargingState, ConnectionConfiguration, DebounceTime, DeviceType,
    FeaturesAvailable, ModeFeatures, PairingMethod, WriteType,
};

use crate::error::ConnectionFailureReason;
use crate::transport::{Transport, TransportEvent, TransportEventSender, WriteToken};

/// A request the engine made of the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    StartScan(Vec<Uuid>),
    StopScan,
    Connect(String),
    Disconnect(String),
    Read(String, Uuid),
    Write(String, Uuid, Bytes),
    Subscribe(String, Uuid),
}

/// How the mock answers connection requests.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectBehavior {
    /// Report the link as established.
    #[default]
    Succeed,
    /// Report the attempt as failed.
    Fail(ConnectionFailureReason),
    /// Report nothing, as if the peripheral never answered.
    Ignore,
}

/// Characteristic values of a simulated peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct MockPeripheral {
    values: HashMap<Uuid, Bytes>,
}

impl MockPeripheral {
    pub fn builder() -> MockPeripheralBuilder {
        MockPeripheralBuilder::default()
    }

    /// Current value of a characteristic.
    pub fn value(&self, characteristic: Uuid) -> Option<Bytes> {
        self.values.get(&characteristic).cloned()
    }
}

/// Builder for simulated peripherals.
///
/// Defaults to a PEDpro with every feature available.
#[derive(Debug, Clone)]
pub struct MockPeripheralBuilder {
    device_type: DeviceType,
    features: FeaturesAvailable,
    firmware: String,
    hardware: String,
    delay_multiplier: u8,
    rate_divisor: u8,
    idle_power_off: u16,
    connection_configuration: ConnectionConfiguration,
    pairing_method: PairingMethod,
    debounce_time: DebounceTime,
    current_mode: u8,
    modes: Vec<ModeFeatures>,
    battery: u8,
    charging: ChargingState,
    default_name: String,
}

impl Default for MockPeripheralBuilder {
    fn default() -> Self {
        Self {
            device_type: DeviceType::PedPro,
            features: FeaturesAvailable::all(),
            firmware: "1.4.2".to_string(),
            hardware: "2".to_string(),
            delay_multiplier: 64,
            rate_divisor: 16,
            idle_power_off: 3600,
            connection_configuration: ConnectionConfiguration::LowPower,
            pairing_method: PairingMethod::Open,
            debounce_time: 20,
            current_mode: 1,
            modes: vec![ModeFeatures::KEYBOARD],
            battery: 100,
            charging: ChargingState::DisconnectedDischarging,
            default_name: "AirTurn PEDpro".to_string(),
        }
    }
}

impl MockPeripheralBuilder {
    #[must_use]
    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    #[must_use]
    pub fn features(mut self, features: FeaturesAvailable) -> Self {
        self.features = features;
        self
    }

    /// Firmware revision string, as the device reports it.
    #[must_use]
    pub fn firmware(mut self, revision: &str) -> Self {
        self.firmware = revision.to_string();
        self
    }

    #[must_use]
    pub fn hardware(mut self, revision: &str) -> Self {
        self.hardware = revision.to_string();
        self
    }

    /// Raw delay-before-repeat multiplier and repeat-rate divisor.
    #[must_use]
    pub fn registers(mut self, delay_multiplier: u8, rate_divisor: u8) -> Self {
        self.delay_multiplier = delay_multiplier;
        self.rate_divisor = rate_divisor;
        self
    }

    #[must_use]
    pub fn idle_power_off(mut self, seconds: u16) -> Self {
        self.idle_power_off = seconds;
        self
    }

    #[must_use]
    pub fn debounce_time(mut self, millis: DebounceTime) -> Self {
        self.debounce_time = millis;
        self
    }

    /// Current mode number and the output features of modes 1, 2, ...
    #[must_use]
    pub fn modes(mut self, current: u8, modes: &[ModeFeatures]) -> Self {
        self.current_mode = current;
        self.modes = modes.to_vec();
        self
    }

    #[must_use]
    pub fn battery(mut self, level: u8) -> Self {
        self.battery = level;
        self
    }

    #[must_use]
    pub fn charging(mut self, state: ChargingState) -> Self {
        self.charging = state;
        self
    }

    #[must_use]
    pub fn default_name(mut self, name: &str) -> Self {
        self.default_name = name.to_string();
        self
    }

    pub fn build(self) -> MockPeripheral {
        let mut modes = BytesMut::with_capacity(1 + 2 * self.modes.len());
        modes.put_u8(self.current_mode);
        for features in &self.modes {
            modes.put_u16_le(features.bits());
        }

        let values = HashMap::from([
            (uuids::DEVICE_TYPE, byte(self.device_type as i8 as u8)),
            (uuids::FEATURES, le16(self.features.bits())),
            (uuids::FIRMWARE_REVISION, Bytes::from(self.firmware)),
            (uuids::HARDWARE_REVISION, Bytes::from(self.hardware)),
            (uuids::DELAY_BEFORE_REPEAT, byte(self.delay_multiplier)),
            (uuids::REPEAT_RATE, byte(self.rate_divisor)),
            (uuids::IDLE_POWER_OFF, le16(self.idle_power_off)),
            (
                uuids::CONNECTION_CONFIGURATION,
                byte(self.connection_configuration as u8),
            ),
            (uuids::PAIRING_METHOD, byte(self.pairing_method as u8)),
            (uuids::DEBOUNCE_TIME, le16(self.debounce_time)),
            (uuids::MODES, modes.freeze()),
            (uuids::BATTERY_LEVEL, byte(self.battery)),
            (uuids::CHARGING_STATE, byte(self.charging as u8)),
            (uuids::DEFAULT_NAME, Bytes::from(self.default_name)),
        ]);
        MockPeripheral { values }
    }
}

fn byte(value: u8) -> Bytes {
    Bytes::copy_from_slice(&[value])
}

fn le16(value: u16) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

#[derive(Debug)]
struct MockState {
    events: Option<TransportEventSender>,
    peripherals: HashMap<String, MockPeripheral>,
    calls: Vec<TransportCall>,
    radio_state: CentralState,
    connect_behavior: ConnectBehavior,
    confirm_disconnects: bool,
    answer_reads: bool,
    failing_reads: HashSet<Uuid>,
    auto_ack_writes: bool,
    write_failure: Option<String>,
    invalid_identifiers: HashSet<String>,
    /// Writes sent without auto-ack, oldest first.
    unacked: Vec<(String, Uuid, WriteToken)>,
}

impl MockState {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            // the engine going away is not an error for the mock
            let _ = events.send(event);
        }
    }
}

/// A transport backed by simulated peripherals.
///
/// Clones share state, so a test keeps one clone while the engine owns another.
///
/// # Example
///
/// ```
/// use airturn_core::{CentralConfig, Engine, MockTransport};
/// use airturn_core::mock::{MockPeripheral, TransportCall};
/// use tokio::time::Instant;
///
/// let transport = MockTransport::builder()
///     .peripheral("pedal-1", MockPeripheral::builder().build())
///     .build();
/// let (mut engine, mut rx) = Engine::new(transport.clone(), CentralConfig::default());
///
/// transport.advertise("pedal-1", Some("PEDpro".into()), Some(-60));
/// while let Ok(event) = rx.try_recv() {
///     engine.handle_transport_event(event, Instant::now());
/// }
/// engine.connect("pedal-1", Instant::now()).unwrap();
/// assert!(transport.calls().contains(&TransportCall::Connect("pedal-1".into())));
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransportBuilder::default().build()
    }
}

impl MockTransport {
    /// A transport with no peripherals and a usable radio.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// A random identifier in the style `MOCK-1A2B3C`.
    pub fn random_identifier() -> String {
        format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a simulated peripheral.
    pub fn add_peripheral(&self, id: &str, peripheral: MockPeripheral) {
        self.lock().peripherals.insert(id.to_string(), peripheral);
    }

    /// Current value of a simulated characteristic.
    pub fn value(&self, id: &str, characteristic: Uuid) -> Option<Bytes> {
        self.lock()
            .peripherals
            .get(id)
            .and_then(|p| p.value(characteristic))
    }

    /// Queue an arbitrary event for the engine.
    pub fn emit(&self, event: TransportEvent) {
        self.lock().emit(event);
    }

    pub fn advertise(&self, id: &str, name: Option<String>, rssi: Option<i16>) {
        self.emit(TransportEvent::Advertisement {
            id: id.to_string(),
            name,
            rssi,
        });
    }

    pub fn notify(&self, id: &str, characteristic: Uuid, value: Bytes) {
        self.emit(TransportEvent::Notify {
            id: id.to_string(),
            characteristic,
            value,
        });
    }

    /// Acknowledge the oldest unanswered write of a property, for transports
    /// built without auto-ack. Returns false if none is outstanding.
    pub fn complete_write(
        &self,
        id: &str,
        write_type: WriteType,
        result: Result<(), String>,
    ) -> bool {
        self.answer_write(id, write_type, result, false)
    }

    /// Acknowledge the newest unanswered write of a property, ahead of any
    /// older ones.
    pub fn complete_newest_write(
        &self,
        id: &str,
        write_type: WriteType,
        result: Result<(), String>,
    ) -> bool {
        self.answer_write(id, write_type, result, true)
    }

    /// Forget every unanswered write, as if the acknowledgements were lost.
    pub fn lose_unacked_writes(&self) {
        self.lock().unacked.clear();
    }

    fn answer_write(
        &self,
        id: &str,
        write_type: WriteType,
        result: Result<(), String>,
        newest: bool,
    ) -> bool {
        let characteristic = write_type.characteristic();
        let mut state = self.lock();
        let matching = |(peripheral, c, _): &(String, Uuid, WriteToken)| {
            peripheral == id && *c == characteristic
        };
        let position = if newest {
            state.unacked.iter().rposition(matching)
        } else {
            state.unacked.iter().position(matching)
        };
        let Some(position) = position else {
            return false;
        };
        let (_, _, token) = state.unacked.remove(position);
        state.emit(TransportEvent::WriteComplete {
            id: id.to_string(),
            characteristic,
            token,
            result,
        });
        true
    }

    /// Drop the link from the peripheral side.
    pub fn drop_link(&self, id: &str) {
        self.emit(TransportEvent::Disconnected { id: id.to_string() });
    }

    /// Report a link the engine did not ask for.
    pub fn system_reconnect(&self, id: &str) {
        self.emit(TransportEvent::ConnectResult {
            id: id.to_string(),
            result: Ok(()),
        });
    }

    pub fn set_radio_state(&self, state: CentralState) {
        let mut guard = self.lock();
        guard.radio_state = state;
        guard.emit(TransportEvent::RadioStateChanged(state));
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.lock().connect_behavior = behavior;
    }

    pub fn set_auto_ack_writes(&self, auto_ack: bool) {
        self.lock().auto_ack_writes = auto_ack;
    }

    /// Recorded requests, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Recorded writes as `(peripheral, characteristic, value)`.
    pub fn writes(&self) -> Vec<(String, Uuid, Bytes)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write(id, characteristic, value) => {
                    Some((id.clone(), *characteristic, value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// How many times scanning was started.
    pub fn scan_starts(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::StartScan(_)))
            .count()
    }
}

impl Transport for MockTransport {
    fn attach(&mut self, events: TransportEventSender) {
        let mut state = self.lock();
        let radio_state = state.radio_state;
        state.events = Some(events);
        state.emit(TransportEvent::RadioStateChanged(radio_state));
    }

    fn start_scan(&mut self, services: &[Uuid]) {
        self.lock()
            .calls
            .push(TransportCall::StartScan(services.to_vec()));
    }

    fn stop_scan(&mut self) {
        self.lock().calls.push(TransportCall::StopScan);
    }

    fn connect(&mut self, id: &str) {
        let mut state = self.lock();
        state.calls.push(TransportCall::Connect(id.to_string()));
        let result = match state.connect_behavior.clone() {
            ConnectBehavior::Succeed => Ok(()),
            ConnectBehavior::Fail(reason) => Err(reason),
            ConnectBehavior::Ignore => return,
        };
        state.emit(TransportEvent::ConnectResult {
            id: id.to_string(),
            result,
        });
    }

    fn disconnect(&mut self, id: &str) {
        let mut state = self.lock();
        state.calls.push(TransportCall::Disconnect(id.to_string()));
        if state.confirm_disconnects {
            state.emit(TransportEvent::Disconnected { id: id.to_string() });
        }
    }

    fn read_characteristic(&mut self, id: &str, characteristic: Uuid) {
        let mut state = self.lock();
        state
            .calls
            .push(TransportCall::Read(id.to_string(), characteristic));
        if !state.answer_reads {
            return;
        }
        let result = if state.failing_reads.contains(&characteristic) {
            Err("read failed".to_string())
        } else {
            state
                .peripherals
                .get(id)
                .and_then(|p| p.value(characteristic))
                .ok_or_else(|| format!("no characteristic {characteristic}"))
        };
        state.emit(TransportEvent::CharacteristicRead {
            id: id.to_string(),
            characteristic,
            result,
        });
    }

    fn write_characteristic(
        &mut self,
        id: &str,
        characteristic: Uuid,
        value: Bytes,
        token: WriteToken,
    ) {
        let mut state = self.lock();
        state.calls.push(TransportCall::Write(
            id.to_string(),
            characteristic,
            value.clone(),
        ));
        if !state.auto_ack_writes {
            state.unacked.push((id.to_string(), characteristic, token));
            return;
        }
        let result = match state.write_failure.clone() {
            Some(reason) => Err(reason),
            None => {
                if let Some(peripheral) = state.peripherals.get_mut(id) {
                    peripheral.values.insert(characteristic, value);
                }
                Ok(())
            }
        };
        state.emit(TransportEvent::WriteComplete {
            id: id.to_string(),
            characteristic,
            token,
            result,
        });
    }

    fn subscribe(&mut self, id: &str, characteristic: Uuid) {
        self.lock()
            .calls
            .push(TransportCall::Subscribe(id.to_string(), characteristic));
    }

    fn is_identifier_valid(&self, id: &str) -> bool {
        !self.lock().invalid_identifiers.contains(id)
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportBuilder {
    peripherals: HashMap<String, MockPeripheral>,
    radio_state: CentralState,
    connect_behavior: ConnectBehavior,
    confirm_disconnects: bool,
    answer_reads: bool,
    failing_reads: HashSet<Uuid>,
    auto_ack_writes: bool,
    write_failure: Option<String>,
    invalid_identifiers: HashSet<String>,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self {
            peripherals: HashMap::new(),
            radio_state: CentralState::Disconnected,
            connect_behavior: ConnectBehavior::Succeed,
            confirm_disconnects: true,
            answer_reads: true,
            failing_reads: HashSet::new(),
            auto_ack_writes: true,
            write_failure: None,
            invalid_identifiers: HashSet::new(),
        }
    }
}

impl MockTransportBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a simulated peripheral.
    #[must_use]
    pub fn peripheral(mut self, id: &str, peripheral: MockPeripheral) -> Self {
        self.peripherals.insert(id.to_string(), peripheral);
        self
    }

    /// Radio state reported on attach.
    #[must_use]
    pub fn radio_state(mut self, state: CentralState) -> Self {
        self.radio_state = state;
        self
    }

    #[must_use]
    pub fn connect_behavior(mut self, behavior: ConnectBehavior) -> Self {
        self.connect_behavior = behavior;
        self
    }

    /// Whether disconnect requests are answered with a disconnect event.
    #[must_use]
    pub fn confirm_disconnects(mut self, confirm: bool) -> Self {
        self.confirm_disconnects = confirm;
        self
    }

    /// Whether reads are answered at all.
    #[must_use]
    pub fn answer_reads(mut self, answer: bool) -> Self {
        self.answer_reads = answer;
        self
    }

    /// Make every read of `characteristic` fail.
    #[must_use]
    pub fn fail_read(mut self, characteristic: Uuid) -> Self {
        self.failing_reads.insert(characteristic);
        self
    }

    /// Whether writes are acknowledged immediately.
    #[must_use]
    pub fn auto_ack_writes(mut self, auto_ack: bool) -> Self {
        self.auto_ack_writes = auto_ack;
        self
    }

    /// Acknowledge every write with this failure.
    #[must_use]
    pub fn fail_writes(mut self, reason: &str) -> Self {
        self.write_failure = Some(reason.to_string());
        self
    }

    /// An identifier the transport no longer recognises.
    #[must_use]
    pub fn invalid_identifier(mut self, id: &str) -> Self {
        self.invalid_identifiers.insert(id.to_string());
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                events: None,
                peripherals: self.peripherals,
                calls: Vec::new(),
                radio_state: self.radio_state,
                connect_behavior: self.connect_behavior,
                confirm_disconnects: self.confirm_disconnects,
                answer_reads: self.answer_reads,
                failing_reads: self.failing_reads,
                auto_ack_writes: self.auto_ack_writes,
                write_failure: self.write_failure,
                invalid_identifiers: self.invalid_identifiers,
                unacked: Vec::new(),
            })),
        }
    }
}

/// Unit tests for MockTransport and its builders.
///
/// # Test Categories
///
/// ## Request Tests
/// - `test_attach_reports_radio_state`: Radio state is queued on attach
/// - `test_read_answers_from_table`: Reads come from the simulated peripheral
/// - `test_write_ack_updates_table`: Auto-acknowledged writes update the value
///
/// ## Failure Injection Tests
/// - `test_connect_behaviors`: Succeed, fail and ignore
/// - `test_failing_read_and_write`: Injected read and write failures
#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::transport::TransportEventReceiver;

    fn attached(mut transport: MockTransport) -> (MockTransport, TransportEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.attach(tx);
        (transport, rx)
    }

    #[test]
    fn test_attach_reports_radio_state() {
        let transport = MockTransport::builder()
            .radio_state(CentralState::PoweredOff)
            .build();
        let (_, mut rx) = attached(transport);
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::RadioStateChanged(CentralState::PoweredOff)
        );
    }

    #[test]
    fn test_read_answers_from_table() {
        let transport = MockTransport::builder()
            .peripheral("p", MockPeripheral::builder().battery(42).build())
            .build();
        let (mut transport, mut rx) = attached(transport);
        rx.try_recv().unwrap();

        transport.read_characteristic("p", uuids::BATTERY_LEVEL);
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::CharacteristicRead {
                id: "p".into(),
                characteristic: uuids::BATTERY_LEVEL,
                result: Ok(Bytes::from_static(&[42])),
            }
        );

        transport.read_characteristic("nobody", uuids::BATTERY_LEVEL);
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::CharacteristicRead { result: Err(_), .. }
        ));
    }

    #[test]
    fn test_write_ack_updates_table() {
        let transport = MockTransport::builder()
            .peripheral("p", MockPeripheral::builder().build())
            .build();
        let (mut transport, mut rx) = attached(transport);
        rx.try_recv().unwrap();

        transport.write_characteristic(
            "p",
            uuids::REPEAT_RATE,
            Bytes::from_static(&[2]),
            WriteToken(1),
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::WriteComplete {
                token: WriteToken(1),
                result: Ok(()),
                ..
            }
        ));
        assert_eq!(
            transport.value("p", uuids::REPEAT_RATE),
            Some(Bytes::from_static(&[2]))
        );
        assert_eq!(transport.writes().len(), 1);
    }

    #[test]
    fn test_manual_acks_carry_tokens() {
        let transport = MockTransport::builder()
            .peripheral("p", MockPeripheral::builder().build())
            .auto_ack_writes(false)
            .build();
        let (mut transport, mut rx) = attached(transport);
        rx.try_recv().unwrap();

        for token in 1..=3 {
            transport.write_characteristic(
                "p",
                uuids::REPEAT_RATE,
                Bytes::from_static(&[2]),
                WriteToken(token),
            );
        }
        assert!(rx.try_recv().is_err());

        assert!(transport.complete_newest_write("p", WriteType::RepeatRate, Ok(())));
        assert!(transport.complete_write("p", WriteType::RepeatRate, Ok(())));
        let tokens: Vec<WriteToken> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                TransportEvent::WriteComplete { token, .. } => Some(token),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec![WriteToken(3), WriteToken(1)]);

        transport.lose_unacked_writes();
        assert!(!transport.complete_write("p", WriteType::RepeatRate, Ok(())));
    }

    #[test]
    fn test_connect_behaviors() {
        let (mut transport, mut rx) = attached(MockTransport::new());
        rx.try_recv().unwrap();

        transport.connect("p");
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::ConnectResult { result: Ok(()), .. }
        ));

        transport.set_connect_behavior(ConnectBehavior::Fail(ConnectionFailureReason::Timeout));
        transport.connect("p");
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::ConnectResult {
                result: Err(ConnectionFailureReason::Timeout),
                ..
            }
        ));

        transport.set_connect_behavior(ConnectBehavior::Ignore);
        transport.connect("p");
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.call_count(), 3);
    }

    #[test]
    fn test_failing_read_and_write() {
        let transport = MockTransport::builder()
            .peripheral("p", MockPeripheral::builder().build())
            .fail_read(uuids::MODES)
            .fail_writes("rejected")
            .build();
        let (mut transport, mut rx) = attached(transport);
        rx.try_recv().unwrap();

        transport.read_characteristic("p", uuids::MODES);
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::CharacteristicRead { result: Err(_), .. }
        ));

        transport.write_characteristic(
            "p",
            uuids::REPEAT_RATE,
            Bytes::from_static(&[2]),
            WriteToken(1),
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::WriteComplete { result: Err(reason), .. } if reason == "rejected"
        ));
        assert_eq!(
            transport.value("p", uuids::REPEAT_RATE),
            Some(Bytes::from_static(&[16]))
        );
    }

    #[test]
    fn test_random_identifier_format() {
        let id = MockTransport::random_identifier();
        assert!(id.starts_with("MOCK-"));
        assert_eq!(id.len(), 11);
    }
}
