//! Reading a freshly linked peripheral's identity and registers.
//!
//! Reads are issued one at a time. The device type, versions and feature
//! bits come first; the feature bits decide which optional registers are
//! read afterwards. Any failed or malformed read aborts the connection.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use airturn_types::payload::{self, ModeTable};
use airturn_types::uuids::{self, NOTIFY_CHARACTERISTICS};
use airturn_types::{
    ChargingState, ConnectionConfiguration, ConnectionState, FeaturesAvailable, PairingMethod,
};

use crate::engine::Engine;
use crate::error::{ConnectionFailureReason, Result};
use crate::events::AirTurnEvent;
use crate::peripheral::Peripheral;
use crate::timers::TimerKey;

/// Reads every peripheral gets, in order.
const BASE_READS: [Uuid; 4] = [
    uuids::DEVICE_TYPE,
    uuids::FIRMWARE_REVISION,
    uuids::HARDWARE_REVISION,
    uuids::FEATURES,
];

/// Progress of one peripheral's interrogation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Interrogation {
    pending: VecDeque<Uuid>,
    awaiting: Option<Uuid>,
}

impl Interrogation {
    fn new() -> Self {
        Self {
            pending: BASE_READS.into_iter().collect(),
            awaiting: None,
        }
    }

    /// Queue the register reads that depend on `features`.
    fn plan_registers(&mut self, features: FeaturesAvailable) {
        self.pending.extend([
            uuids::DELAY_BEFORE_REPEAT,
            uuids::REPEAT_RATE,
            uuids::IDLE_POWER_OFF,
            uuids::CONNECTION_CONFIGURATION,
        ]);
        if features.contains(FeaturesAvailable::PAIRING_METHOD) {
            self.pending.push_back(uuids::PAIRING_METHOD);
        }
        if features.contains(FeaturesAvailable::DEBOUNCE_TIME) {
            self.pending.push_back(uuids::DEBOUNCE_TIME);
        }
        self.pending.extend([
            uuids::MODES,
            uuids::BATTERY_LEVEL,
            uuids::CHARGING_STATE,
            uuids::DEFAULT_NAME,
        ]);
    }

    fn next(&mut self) -> Option<Uuid> {
        self.awaiting = self.pending.pop_front();
        self.awaiting
    }
}

impl Engine {
    pub(crate) fn begin_interrogation(&mut self, id: &str) {
        debug!(peripheral = %id, "Interrogating");
        self.interrogations
            .insert(id.to_string(), Interrogation::new());
        self.registry
            .transition(id, ConnectionState::Discovering, &self.events);
        self.read_next(id);
    }

    pub(crate) fn on_characteristic_read(
        &mut self,
        id: &str,
        characteristic: Uuid,
        result: std::result::Result<Bytes, String>,
        now: Instant,
    ) {
        let expected = self
            .interrogations
            .get(id)
            .and_then(|interrogation| interrogation.awaiting);
        if expected != Some(characteristic) {
            debug!(peripheral = %id, %characteristic, "Ignoring unexpected read");
            return;
        }

        let outcome = match result {
            Ok(data) => self.apply_read(id, characteristic, &data),
            Err(reason) => Err(crate::Error::InvalidData(reason)),
        };
        if let Err(e) = outcome {
            warn!(peripheral = %id, %characteristic, error = %e, "Interrogation failed");
            self.transport.disconnect(id);
            self.fail_connection(
                id,
                ConnectionFailureReason::InterrogationFailed(e.to_string()),
                now,
            );
            return;
        }
        self.read_next(id);
    }

    fn read_next(&mut self, id: &str) {
        let next = self.interrogations.get_mut(id).and_then(Interrogation::next);
        match next {
            Some(characteristic) => self.transport.read_characteristic(id, characteristic),
            None => self.finish_interrogation(id),
        }
    }

    /// Store one read into the peripheral.
    fn apply_read(&mut self, id: &str, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let Some(peripheral) = self.registry.get_mut(id) else {
            return Ok(());
        };

        if characteristic == uuids::FEATURES {
            let features = payload::parse_features(data)?;
            peripheral.features = features;
            if let Some(interrogation) = self.interrogations.get_mut(id) {
                interrogation.plan_registers(features);
            }
            return Ok(());
        }
        apply_register(peripheral, characteristic, data)
    }

    fn finish_interrogation(&mut self, id: &str) {
        self.interrogations.remove(id);
        self.timers.cancel(&TimerKey::Link(id.to_string()));
        for characteristic in NOTIFY_CHARACTERISTICS {
            self.transport.subscribe(id, characteristic);
        }

        self.registry
            .transition(id, ConnectionState::Ready, &self.events);
        if let Some(peripheral) = self.registry.get(id) {
            info!(
                peripheral = %id,
                device_type = %peripheral.device_type,
                firmware = ?peripheral.firmware_version,
                features = ?peripheral.features,
                "Peripheral ready"
            );
            self.events.send(AirTurnEvent::DidConnect {
                peripheral: peripheral.reference(),
            });
        }
        self.refresh_central_state();
    }
}

fn apply_register(peripheral: &mut Peripheral, characteristic: Uuid, data: &[u8]) -> Result<()> {
    match characteristic {
        uuids::DEVICE_TYPE => {
            let device_type = payload::parse_device_type(data)?;
            if !device_type.is_supported() {
                return Err(crate::Error::InvalidData(format!(
                    "unsupported device type {device_type}"
                )));
            }
            peripheral.device_type = device_type;
        }
        uuids::FIRMWARE_REVISION => {
            peripheral.firmware_version = parse_version_lenient(data, "firmware");
        }
        uuids::HARDWARE_REVISION => {
            peripheral.hardware_version = parse_version_lenient(data, "hardware");
        }
        uuids::DELAY_BEFORE_REPEAT => {
            peripheral.delay_before_repeat_multiplier = payload::parse_u8(data)?;
        }
        uuids::REPEAT_RATE => peripheral.repeat_rate_divisor = payload::parse_u8(data)?,
        uuids::IDLE_POWER_OFF => peripheral.idle_power_off = payload::parse_u16(data)?,
        uuids::CONNECTION_CONFIGURATION => {
            peripheral.connection_configuration =
                ConnectionConfiguration::try_from(payload::parse_u8(data)?)?;
        }
        uuids::PAIRING_METHOD => {
            peripheral.pairing_method = Some(PairingMethod::try_from(payload::parse_u8(data)?)?);
        }
        uuids::DEBOUNCE_TIME => peripheral.debounce_time = Some(payload::parse_u16(data)?),
        uuids::MODES => {
            let table = ModeTable::from_bytes(data)?;
            peripheral.current_mode = table.current;
            peripheral.modes = table.descriptors;
        }
        uuids::BATTERY_LEVEL => {
            peripheral.battery_level = Some(payload::parse_battery_level(data)?);
        }
        uuids::CHARGING_STATE => {
            peripheral.charging_state = ChargingState::try_from(payload::parse_u8(data)?)?;
        }
        uuids::DEFAULT_NAME => {
            let name = payload::parse_string(data)?;
            if !peripheral.has_custom_name {
                peripheral.name = Some(name.clone());
            }
            peripheral.default_name = Some(name);
        }
        other => debug!(characteristic = %other, "No register for characteristic"),
    }
    Ok(())
}

/// Versions are informational, so an unparseable one is dropped rather
/// than failing the connection.
fn parse_version_lenient(data: &[u8], what: &str) -> Option<semver::Version> {
    match payload::parse_version(data) {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable {what} version");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use airturn_types::{DeviceType, Mode, ModeFeatures};
    use bytes::Bytes;

    use super::*;
    use crate::engine::test_support::*;
    use crate::mock::{MockPeripheral, MockTransport, TransportCall};

    fn reads(transport: &MockTransport) -> Vec<Uuid> {
        transport
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Read(_, characteristic) => Some(characteristic),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_interrogation_populates_peripheral() {
        let mock = MockPeripheral::builder()
            .device_type(DeviceType::PedPro)
            .firmware("2.1.0")
            .hardware("v3")
            .registers(32, 8)
            .modes(2, &[ModeFeatures::KEYBOARD, ModeFeatures::MIDI])
            .battery(72)
            .default_name("PEDpro 0001")
            .build();
        let mut h = Harness::new(MockTransport::builder().peripheral(PEDAL, mock).build());
        h.connect_ready(PEDAL);

        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.device_type, DeviceType::PedPro);
        assert_eq!(pedal.firmware_version, Some(semver::Version::new(2, 1, 0)));
        assert_eq!(pedal.hardware_version, Some(semver::Version::new(3, 0, 0)));
        assert_eq!(pedal.delay_before_repeat_multiplier, 32);
        assert_eq!(pedal.repeat_rate_divisor, 8);
        assert_eq!(pedal.current_mode, Mode::new(2).unwrap());
        assert_eq!(pedal.modes.len(), 2);
        assert_eq!(pedal.battery_level, Some(72));
        assert_eq!(pedal.name.as_deref(), Some("PEDpro 0001"));
        assert_eq!(pedal.default_name.as_deref(), Some("PEDpro 0001"));

        let subscribed: Vec<Uuid> = h
            .transport
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Subscribe(_, characteristic) => Some(characteristic),
                _ => None,
            })
            .collect();
        assert_eq!(subscribed, NOTIFY_CHARACTERISTICS.to_vec());
    }

    #[test]
    fn test_optional_registers_follow_features() {
        let mock = MockPeripheral::builder()
            .features(FeaturesAvailable::OS_KEY_REPEAT_CONFIGURATION)
            .build();
        let mut h = Harness::new(MockTransport::builder().peripheral(PEDAL, mock).build());
        h.connect_ready(PEDAL);

        let read = reads(&h.transport);
        assert_eq!(&read[..4], &BASE_READS);
        assert!(!read.contains(&uuids::PAIRING_METHOD));
        assert!(!read.contains(&uuids::DEBOUNCE_TIME));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.pairing_method, None);
        assert_eq!(pedal.debounce_time, None);
    }

    #[test]
    fn test_all_features_reads_every_register() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);

        let read = reads(&h.transport);
        assert!(read.contains(&uuids::PAIRING_METHOD));
        assert!(read.contains(&uuids::DEBOUNCE_TIME));
        assert_eq!(read.last(), Some(&uuids::DEFAULT_NAME));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert!(pedal.pairing_method.is_some());
        assert!(pedal.debounce_time.is_some());
    }

    #[test]
    fn test_failed_read_aborts_connection() {
        let transport = MockTransport::builder()
            .peripheral(PEDAL, MockPeripheral::builder().build())
            .fail_read(uuids::MODES)
            .build();
        let mut h = Harness::new(transport);
        h.advertise(PEDAL);
        h.drain_events();
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();

        let events = h.drain_events();
        assert!(!events.iter().any(|e| matches!(e, AirTurnEvent::DidConnect { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            AirTurnEvent::DidFailToConnect { reason, .. } if reason.starts_with("interrogation failed")
        )));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.connection_state, ConnectionState::Disconnected);
        assert!(pedal.last_connection_failed);
    }

    #[test]
    fn test_unsupported_device_type_aborts() {
        let mock = MockPeripheral::builder()
            .device_type(DeviceType::Invalid)
            .build();
        let mut h = Harness::new(MockTransport::builder().peripheral(PEDAL, mock).build());
        h.advertise(PEDAL);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();

        assert_eq!(
            h.engine.peripheral(PEDAL).unwrap().connection_state,
            ConnectionState::Disconnected
        );
        // nothing past the device type was read
        assert_eq!(reads(&h.transport), vec![uuids::DEVICE_TYPE]);
    }

    #[test]
    fn test_bad_version_is_not_fatal() {
        let mock = MockPeripheral::builder().firmware("banana").build();
        let mut h = Harness::new(MockTransport::builder().peripheral(PEDAL, mock).build());
        h.connect_ready(PEDAL);
        assert_eq!(h.engine.peripheral(PEDAL).unwrap().firmware_version, None);
    }

    #[test]
    fn test_custom_name_survives_interrogation() {
        let mut h = Harness::with_pedal();
        h.advertise(PEDAL);
        h.engine.store_device_name(PEDAL, Some("Left foot")).unwrap();
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();

        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.name.as_deref(), Some("Left foot"));
        assert!(pedal.default_name.is_some());
    }

    #[test]
    fn test_interrogation_timeout() {
        let transport = MockTransport::builder()
            .peripheral(PEDAL, MockPeripheral::builder().build())
            .answer_reads(false)
            .build();
        let mut h = Harness::new(transport);
        h.advertise(PEDAL);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();
        assert_eq!(
            h.engine.peripheral(PEDAL).unwrap().connection_state,
            ConnectionState::Discovering
        );

        h.advance(Duration::from_secs(10));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.connection_state, ConnectionState::Disconnected);
        assert!(pedal.last_connection_failed);
    }

    #[test]
    fn test_out_of_order_read_ignored() {
        let transport = MockTransport::builder()
            .peripheral(PEDAL, MockPeripheral::builder().build())
            .answer_reads(false)
            .build();
        let mut h = Harness::new(transport);
        h.advertise(PEDAL);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();

        h.transport.emit(crate::transport::TransportEvent::CharacteristicRead {
            id: PEDAL.into(),
            characteristic: uuids::FEATURES,
            result: Ok(Bytes::from_static(&[0xFF, 0x00])),
        });
        h.pump();
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.connection_state, ConnectionState::Discovering);
        assert!(pedal.features.is_empty());
    }
}
