//! Notifications from ready peripherals: pedal input and status changes.
//!
//! A held port generates presses: one immediately, then one after the delay
//! before repeat and every repeat interval after that, for as long as the
//! port stays down and key repeat is enabled on the peripheral.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use airturn_types::{AnalogNotification, Notification, Port, PortNotification, PortState};

use crate::engine::Engine;
use crate::events::AirTurnEvent;
use crate::timers::TimerKey;

impl Engine {
    pub(crate) fn on_notify(&mut self, id: &str, characteristic: Uuid, value: &[u8], now: Instant) {
        if !self.registry.get(id).is_some_and(|p| p.is_ready()) {
            trace!(peripheral = %id, %characteristic, "Ignoring notification before ready");
            return;
        }
        let notification = match Notification::parse(characteristic, value) {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                debug!(peripheral = %id, %characteristic, "Notification on unhandled characteristic");
                return;
            }
            Err(e) => {
                warn!(peripheral = %id, %characteristic, error = %e, "Malformed notification");
                return;
            }
        };

        match notification {
            Notification::Port(port) => self.on_port(id, port, now),
            Notification::Analog(analog) => self.on_analog(id, analog),
            status => self.on_status(id, status),
        }
    }

    fn on_port(&mut self, id: &str, notification: PortNotification, now: Instant) {
        let PortNotification {
            port,
            state,
            key_code,
        } = notification;
        let Some(peripheral) = self.registry.get_mut(id) else {
            return;
        };
        let repeat = peripheral.key_repeat();
        let status = peripheral.port_mut(port);
        let previous = status.state;
        if key_code.is_some() {
            status.key_code = key_code;
        }

        match state {
            PortState::Down => {
                if previous == PortState::Down {
                    trace!(peripheral = %id, %port, "Duplicate port down");
                    return;
                }
                status.state = PortState::Down;
                status.repeat_count = 0;
                let reference = peripheral.reference();

                debug!(peripheral = %id, %port, "Pedal down");
                self.events.send(AirTurnEvent::PedalDown {
                    peripheral: reference.clone(),
                    port,
                });
                self.events.send(AirTurnEvent::PedalPress {
                    peripheral: reference,
                    port,
                    repeat_count: 0,
                });
                if repeat.is_enabled() {
                    self.timers.schedule(
                        TimerKey::Repeat(id.to_string(), port),
                        now + Duration::from_secs_f64(repeat.delay_seconds()),
                    );
                }
            }
            PortState::Up => {
                status.state = PortState::Up;
                let repeat_count = status.repeat_count;
                let reference = peripheral.reference();
                self.timers
                    .cancel(&TimerKey::Repeat(id.to_string(), port));
                if previous == PortState::Down {
                    debug!(peripheral = %id, %port, repeat_count, "Pedal up");
                    self.events.send(AirTurnEvent::PedalUp {
                        peripheral: reference,
                        port,
                        repeat_count,
                    });
                }
            }
            PortState::Invalid => {}
        }
    }

    pub(crate) fn on_repeat_tick(&mut self, id: &str, port: Port, now: Instant) {
        let Some(peripheral) = self.registry.get_mut(id) else {
            return;
        };
        let repeat = peripheral.key_repeat();
        let Some(interval) = repeat.rate_seconds() else {
            return;
        };
        if !peripheral.is_ready() || peripheral.port_state(port) != PortState::Down {
            return;
        }
        let status = peripheral.port_mut(port);
        status.repeat_count += 1;
        let repeat_count = status.repeat_count;
        let reference = peripheral.reference();

        trace!(peripheral = %id, %port, repeat_count, "Pedal repeat");
        self.events.send(AirTurnEvent::PedalPress {
            peripheral: reference,
            port,
            repeat_count,
        });
        self.timers.schedule(
            TimerKey::Repeat(id.to_string(), port),
            now + Duration::from_secs_f64(interval),
        );
    }

    pub(crate) fn cancel_repeats(&mut self, id: &str) {
        self.timers
            .cancel_where(|key| matches!(key, TimerKey::Repeat(owner, _) if owner == id));
    }

    fn on_analog(&mut self, id: &str, analog: AnalogNotification) {
        let Some(peripheral) = self.registry.get_mut(id) else {
            return;
        };
        peripheral.port_mut(analog.port).analog_value = Some(analog.value);
        let reference = peripheral.reference();
        self.events.send(AirTurnEvent::AnalogValueChanged {
            peripheral: reference,
            port: analog.port,
            value: analog.value,
        });
    }

    /// Battery, charging, mode and pairing updates. Events fire on change only.
    fn on_status(&mut self, id: &str, notification: Notification) {
        let Some(peripheral) = self.registry.get_mut(id) else {
            return;
        };
        let event = match notification {
            Notification::BatteryLevel(level) => {
                if peripheral.battery_level == Some(level) {
                    return;
                }
                peripheral.battery_level = Some(level);
                if peripheral.is_battery_low() {
                    warn!(peripheral = %id, level, "Battery low");
                }
                AirTurnEvent::BatteryLevelChanged {
                    peripheral: peripheral.reference(),
                    level,
                }
            }
            Notification::ChargingState(state) => {
                if peripheral.charging_state == state {
                    return;
                }
                peripheral.charging_state = state;
                AirTurnEvent::ChargingStateChanged {
                    peripheral: peripheral.reference(),
                    state,
                }
            }
            Notification::Mode(mode) => {
                if peripheral.current_mode == mode {
                    return;
                }
                peripheral.current_mode = mode;
                AirTurnEvent::ModeChanged {
                    peripheral: peripheral.reference(),
                    mode,
                }
            }
            Notification::PairingState(state) => {
                if peripheral.pairing_state == state {
                    return;
                }
                peripheral.pairing_state = state;
                AirTurnEvent::PairingStateChanged {
                    peripheral: peripheral.reference(),
                    state,
                }
            }
            Notification::Port(_) | Notification::Analog(_) => return,
        };
        debug!(peripheral = %id, ?event, "Status changed");
        self.events.send(event);
    }
}

/// Pedal input tests.
///
/// Timers are fired by advancing the harness clock by hand.
#[cfg(test)]
mod tests {
    use airturn_types::{ChargingState, Mode, uuids};
    use bytes::Bytes;

    use super::*;
    use crate::engine::test_support::*;
    use crate::mock::{MockPeripheral, MockTransport};

    fn pedal_events(events: Vec<AirTurnEvent>) -> Vec<AirTurnEvent> {
        events
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    AirTurnEvent::PedalDown { .. }
                        | AirTurnEvent::PedalUp { .. }
                        | AirTurnEvent::PedalPress { .. }
                )
            })
            .collect()
    }

    fn press_counts(events: &[AirTurnEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                AirTurnEvent::PedalPress { repeat_count, .. } => Some(*repeat_count),
                _ => None,
            })
            .collect()
    }

    fn port_down(h: &mut Harness, port: u8) {
        h.transport
            .notify(PEDAL, uuids::PORT_STATE, Bytes::from(vec![port, 1]));
        h.pump();
    }

    fn port_up(h: &mut Harness, port: u8) {
        h.transport
            .notify(PEDAL, uuids::PORT_STATE, Bytes::from(vec![port, 0]));
        h.pump();
    }

    #[test]
    fn test_held_pedal_repeats() {
        // 4 s before the first repeat, then one per second
        let mock = MockPeripheral::builder().registers(255, 4).build();
        let mut h = Harness::new(MockTransport::builder().peripheral(PEDAL, mock).build());
        h.connect_ready(PEDAL);
        h.drain_events();

        port_down(&mut h, 1);
        h.advance(Duration::from_millis(3999));
        assert_eq!(press_counts(&h.drain_events()), vec![0]);

        h.advance(Duration::from_millis(1));
        h.advance(Duration::from_millis(1000));
        h.advance(Duration::from_millis(500));
        port_up(&mut h, 1);

        let port = Port::MIN;
        let events = pedal_events(h.drain_events());
        assert_eq!(press_counts(&events), vec![1, 2]);
        assert!(matches!(
            events.last(),
            Some(AirTurnEvent::PedalUp { port: p, repeat_count: 2, .. }) if *p == port
        ));
        assert_eq!(h.engine.peripheral(PEDAL).unwrap().port(port).repeat_count, 2);

        // no more presses once released
        h.advance(Duration::from_secs(5));
        assert!(pedal_events(h.drain_events()).is_empty());
    }

    #[test]
    fn test_quick_tap() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        port_down(&mut h, 2);
        port_up(&mut h, 2);
        let events = pedal_events(h.drain_events());
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AirTurnEvent::PedalDown { .. }));
        assert!(matches!(events[1], AirTurnEvent::PedalPress { repeat_count: 0, .. }));
        assert!(matches!(events[2], AirTurnEvent::PedalUp { repeat_count: 0, .. }));
        assert_eq!(
            h.engine.port_state(PEDAL, Port::new(2).unwrap()).unwrap(),
            PortState::Up
        );
    }

    #[test]
    fn test_repeat_disabled() {
        let mock = MockPeripheral::builder().registers(0, 0).build();
        let mut h = Harness::new(MockTransport::builder().peripheral(PEDAL, mock).build());
        h.connect_ready(PEDAL);
        h.drain_events();

        port_down(&mut h, 1);
        h.advance(Duration::from_secs(10));
        port_up(&mut h, 1);
        assert_eq!(press_counts(&h.drain_events()), vec![0]);
    }

    #[test]
    fn test_duplicate_down_and_stray_up() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        port_up(&mut h, 3);
        assert!(pedal_events(h.drain_events()).is_empty());

        port_down(&mut h, 3);
        port_down(&mut h, 3);
        assert_eq!(press_counts(&h.drain_events()), vec![0]);
    }

    #[test]
    fn test_disconnect_stops_repeat() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        port_down(&mut h, 1);
        h.engine.disconnect(PEDAL, h.now).unwrap();
        h.pump();
        h.drain_events();

        h.advance(Duration::from_secs(3));
        assert!(pedal_events(h.drain_events()).is_empty());
        assert_eq!(
            h.engine.port_state(PEDAL, Port::MIN).unwrap(),
            PortState::Invalid
        );
    }

    #[test]
    fn test_analog_value() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        let raw = (-1234i16).to_le_bytes();
        h.transport.notify(
            PEDAL,
            uuids::ANALOG_VALUE,
            Bytes::from(vec![4, raw[0], raw[1]]),
        );
        h.pump();

        assert!(matches!(
            h.drain_events().as_slice(),
            [AirTurnEvent::AnalogValueChanged { value: -1234, .. }]
        ));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.port(Port::new(4).unwrap()).analog_value, Some(-1234));
    }

    #[test]
    fn test_status_changes_publish_once() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        h.transport
            .notify(PEDAL, uuids::BATTERY_LEVEL, Bytes::from_static(&[9]));
        h.transport
            .notify(PEDAL, uuids::BATTERY_LEVEL, Bytes::from_static(&[9]));
        h.transport
            .notify(PEDAL, uuids::CHARGING_STATE, Bytes::from_static(&[1]));
        h.transport
            .notify(PEDAL, uuids::CURRENT_MODE, Bytes::from_static(&[3]));
        h.pump();

        let events = h.drain_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AirTurnEvent::BatteryLevelChanged { level: 9, .. }));
        assert!(matches!(
            events[1],
            AirTurnEvent::ChargingStateChanged {
                state: ChargingState::ConnectedCharging,
                ..
            }
        ));
        assert!(matches!(events[2], AirTurnEvent::ModeChanged { mode, .. } if mode == Mode::new(3).unwrap()));
        assert!(h.engine.peripheral(PEDAL).unwrap().is_battery_low());
    }

    #[test]
    fn test_notifications_ignored_until_ready() {
        let mut h = Harness::with_pedal();
        h.advertise(PEDAL);
        h.drain_events();
        port_down(&mut h, 1);
        assert!(h.drain_events().is_empty());
    }

    #[test]
    fn test_malformed_notification_ignored() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();
        h.transport
            .notify(PEDAL, uuids::PORT_STATE, Bytes::from_static(&[9, 1]));
        h.pump();
        assert!(h.drain_events().is_empty());
        assert!(h.engine.peripheral(PEDAL).unwrap().is_ready());
    }
}
