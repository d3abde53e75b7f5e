//! Connection lifecycle of a single peripheral.
//!
//! ```text
//! Disconnected -> Connecting -> SystemConnected -> Discovering -> Ready
//!      ^              |               |                |           |
//!      +--------------+---------------+----------------+-----------+
//!                 (failure / timeout)        Disconnecting <------+
//! ```
//!
//! When the radio goes away every link is forced to `Disconnected` at once,
//! skipping `Disconnecting`.
//!
//! A link that comes up without a connect request (the operating system
//! reconnected a known device) enters at `SystemConnected` and is
//! interrogated like any other.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use airturn_types::ConnectionState;

use crate::engine::Engine;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::AirTurnEvent;
use crate::timers::TimerKey;

impl Engine {
    /// Start connecting to a peripheral.
    ///
    /// Succeeds without doing anything when the peripheral is already
    /// connecting or connected. Completion is reported with
    /// [`AirTurnEvent::DidConnect`] or [`AirTurnEvent::DidFailToConnect`].
    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %id))]
    pub fn connect(&mut self, id: &str, now: Instant) -> Result<()> {
        self.ensure_usable()?;
        let peripheral = self.registry.get_mut(id).ok_or_else(|| Error::not_found(id))?;

        match peripheral.connection_state {
            state if state.is_resting() => {}
            ConnectionState::Disconnecting => {
                return Err(Error::NotReady {
                    state: ConnectionState::Disconnecting,
                });
            }
            state => {
                debug!(?state, "Already connecting or connected");
                return Ok(());
            }
        }

        if peripheral.has_bonding {
            warn!("Peripheral is bonded elsewhere, not connecting");
            peripheral.pairing_failed = true;
            peripheral.last_connection_failed = true;
            let reference = peripheral.reference();
            self.events.send(AirTurnEvent::DidFailToConnect {
                peripheral: reference,
                reason: ConnectionFailureReason::BondingConflict.to_string(),
            });
            return Err(Error::PairingFailed(id.to_string()));
        }

        peripheral.last_connection_failed = false;
        peripheral.pairing_failed = false;
        self.registry
            .transition(id, ConnectionState::Connecting, &self.events);
        if let Some(peripheral) = self.registry.get(id) {
            self.events.send(AirTurnEvent::Connecting {
                peripheral: peripheral.reference(),
            });
        }

        info!("Connecting");
        self.timers.cancel(&TimerKey::Lost(id.to_string()));
        self.timers.schedule(
            TimerKey::Link(id.to_string()),
            now + self.config.connection_timeout,
        );
        self.transport.connect(id);
        Ok(())
    }

    /// Disconnect from a peripheral, or cancel a connection attempt.
    ///
    /// Pending writes are cancelled. Succeeds without doing anything when the
    /// peripheral is already disconnected or disconnecting.
    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %id))]
    pub fn disconnect(&mut self, id: &str, now: Instant) -> Result<()> {
        let state = self
            .registry
            .get(id)
            .map(|p| p.connection_state)
            .ok_or_else(|| Error::not_found(id))?;

        match state {
            ConnectionState::Connecting => {
                info!("Cancelling connection attempt");
                self.transport.disconnect(id);
                self.timers.cancel(&TimerKey::Link(id.to_string()));
                self.registry
                    .transition(id, ConnectionState::Disconnected, &self.events);
                self.arm_lost_timer(id, now);
                self.refresh_central_state();
            }
            state if state.has_link() => {
                info!("Disconnecting");
                self.teardown_link(id);
                self.registry
                    .transition(id, ConnectionState::Disconnecting, &self.events);
                self.timers.schedule(
                    TimerKey::Link(id.to_string()),
                    now + self.config.connection_timeout,
                );
                self.transport.disconnect(id);
                self.refresh_central_state();
            }
            _ => debug!(?state, "Nothing to disconnect"),
        }
        Ok(())
    }

    pub(crate) fn on_connect_result(
        &mut self,
        id: &str,
        result: std::result::Result<(), ConnectionFailureReason>,
        now: Instant,
    ) {
        let Some(state) = self.registry.get(id).map(|p| p.connection_state) else {
            debug!(peripheral = %id, "Connect result for unknown peripheral");
            return;
        };
        match (state, result) {
            (ConnectionState::Connecting, Ok(())) => self.link_established(id, now),
            (state, Ok(())) if state.is_resting() => {
                if !self.enabled_and_usable() {
                    debug!(peripheral = %id, "Ignoring system reconnection while unavailable");
                    return;
                }
                info!(peripheral = %id, "System reconnection");
                self.link_established(id, now);
            }
            (ConnectionState::Connecting, Err(reason)) => {
                warn!(peripheral = %id, %reason, "Connection failed");
                self.fail_connection(id, reason, now);
            }
            (state, result) => {
                debug!(peripheral = %id, ?state, ?result, "Ignoring stale connect result");
            }
        }
    }

    pub(crate) fn on_disconnected(&mut self, id: &str, now: Instant) {
        let Some(state) = self.registry.get(id).map(|p| p.connection_state) else {
            return;
        };
        match state {
            ConnectionState::Disconnecting => self.complete_disconnect(id, now),
            ConnectionState::Connecting => {
                warn!(peripheral = %id, "Link dropped while connecting");
                self.fail_connection(
                    id,
                    ConnectionFailureReason::BleError("disconnected while connecting".into()),
                    now,
                );
            }
            state if state.has_link() => {
                warn!(peripheral = %id, ?state, "Link dropped unexpectedly");
                self.teardown_link(id);
                self.complete_disconnect(id, now);
            }
            _ => debug!(peripheral = %id, ?state, "Disconnect for resting peripheral"),
        }
    }

    pub(crate) fn on_link_timeout(&mut self, id: &str, now: Instant) {
        let Some(state) = self.registry.get(id).map(|p| p.connection_state) else {
            return;
        };
        match state {
            ConnectionState::Connecting => {
                warn!(peripheral = %id, "Connection timed out");
                self.transport.disconnect(id);
                self.fail_connection(id, ConnectionFailureReason::Timeout, now);
            }
            ConnectionState::SystemConnected | ConnectionState::Discovering => {
                warn!(peripheral = %id, "Interrogation timed out");
                self.transport.disconnect(id);
                self.fail_connection(
                    id,
                    ConnectionFailureReason::InterrogationFailed("timed out".into()),
                    now,
                );
            }
            ConnectionState::Disconnecting => {
                warn!(peripheral = %id, "Disconnect not confirmed, assuming link is down");
                self.complete_disconnect(id, now);
            }
            _ => {}
        }
    }

    /// Drop a peripheral's link without waiting for the transport, used when
    /// the radio goes away. Linked peripherals go straight to `Disconnected`
    /// without passing through `Disconnecting`.
    pub(crate) fn force_disconnected(
        &mut self,
        id: &str,
        reason: ConnectionFailureReason,
        now: Instant,
    ) {
        let Some(state) = self.registry.get(id).map(|p| p.connection_state) else {
            return;
        };
        match state {
            ConnectionState::Connecting
            | ConnectionState::SystemConnected
            | ConnectionState::Discovering => self.fail_connection(id, reason, now),
            ConnectionState::Ready | ConnectionState::Disconnecting => {
                self.teardown_link(id);
                self.complete_disconnect(id, now);
            }
            _ => {}
        }
    }

    fn link_established(&mut self, id: &str, now: Instant) {
        self.timers.cancel(&TimerKey::Lost(id.to_string()));
        self.registry
            .transition(id, ConnectionState::SystemConnected, &self.events);
        self.timers.schedule(
            TimerKey::Link(id.to_string()),
            now + self.config.interrogation_timeout,
        );
        self.begin_interrogation(id);
    }

    /// End a connection attempt that never reached `Ready`.
    pub(crate) fn fail_connection(
        &mut self,
        id: &str,
        reason: ConnectionFailureReason,
        now: Instant,
    ) {
        self.timers.cancel(&TimerKey::Link(id.to_string()));
        self.interrogations.remove(id);
        self.cancel_writes(id, || Error::Cancelled);
        self.cancel_repeats(id);

        let Some(peripheral) = self.registry.get_mut(id) else {
            return;
        };
        peripheral.clear_ports();
        peripheral.last_connection_failed = true;
        if reason.is_pairing_failure() {
            peripheral.pairing_failed = true;
        }

        self.registry
            .transition(id, ConnectionState::Disconnected, &self.events);
        if let Some(peripheral) = self.registry.get(id) {
            self.events.send(AirTurnEvent::DidFailToConnect {
                peripheral: peripheral.reference(),
                reason: reason.to_string(),
            });
        }
        self.arm_lost_timer(id, now);
        self.refresh_central_state();
    }

    /// Cancel everything that only makes sense while a link is up.
    fn teardown_link(&mut self, id: &str) {
        self.timers.cancel(&TimerKey::Link(id.to_string()));
        self.interrogations.remove(id);
        self.cancel_writes(id, || Error::Cancelled);
        self.cancel_repeats(id);
        if let Some(peripheral) = self.registry.get_mut(id) {
            peripheral.clear_ports();
        }
    }

    fn complete_disconnect(&mut self, id: &str, now: Instant) {
        self.timers.cancel(&TimerKey::Link(id.to_string()));
        self.registry
            .transition(id, ConnectionState::Disconnected, &self.events);
        if let Some(peripheral) = self.registry.get(id) {
            info!(peripheral = %id, "Disconnected");
            self.events.send(AirTurnEvent::DidDisconnect {
                peripheral: peripheral.reference(),
            });
        }
        self.arm_lost_timer(id, now);
        self.refresh_central_state();
    }

    fn enabled_and_usable(&self) -> bool {
        self.ensure_usable().is_ok()
    }
}

/// Connection state machine tests.
///
/// These drive the engine with a mock transport and a hand-advanced clock:
/// - Connect success, timeout and failure paths
/// - Cancellation while connecting, user disconnect, unexpected link loss
/// - System reconnection
/// - Bonding conflicts
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use airturn_types::CentralState;

    use super::*;
    use crate::engine::test_support::*;
    use crate::mock::{ConnectBehavior, MockPeripheral, MockTransport, TransportCall};

    fn states(events: &[AirTurnEvent]) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|e| match e {
                AirTurnEvent::ConnectionStateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn transport_with(behavior: ConnectBehavior) -> MockTransport {
        MockTransport::builder()
            .peripheral(PEDAL, MockPeripheral::builder().build())
            .connect_behavior(behavior)
            .build()
    }

    #[test]
    fn test_connect_walks_every_state() {
        let mut h = Harness::with_pedal();
        h.advertise(PEDAL);
        h.drain_events();

        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();

        let events = h.drain_events();
        assert_eq!(
            states(&events),
            vec![
                ConnectionState::Connecting,
                ConnectionState::SystemConnected,
                ConnectionState::Discovering,
                ConnectionState::Ready,
            ]
        );
        assert!(matches!(events[1], AirTurnEvent::Connecting { .. }));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, AirTurnEvent::DidConnect { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_connect_when_connected_is_noop() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.transport.clear_calls();

        h.engine.connect(PEDAL, h.now).unwrap();
        assert!(h.transport.calls().is_empty());
    }

    #[test]
    fn test_connect_unknown_peripheral() {
        let mut h = Harness::with_pedal();
        assert!(matches!(
            h.engine.connect("missing", h.now),
            Err(Error::PeripheralNotFound(_))
        ));
    }

    #[test]
    fn test_connect_timeout() {
        let mut h = Harness::new(transport_with(ConnectBehavior::Ignore));
        h.advertise(PEDAL);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();
        h.drain_events();

        h.advance(Duration::from_secs(14));
        assert!(h.drain_events().is_empty());

        h.advance(Duration::from_secs(1));
        let events = h.drain_events();
        assert_eq!(states(&events), vec![ConnectionState::Disconnected]);
        assert!(matches!(
            events.iter().find(|e| matches!(e, AirTurnEvent::DidFailToConnect { .. })),
            Some(AirTurnEvent::DidFailToConnect { reason, .. }) if reason == "connection timed out"
        ));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert!(pedal.last_connection_failed);
        assert!(!pedal.pairing_failed);
        assert!(h.transport.calls().contains(&TransportCall::Disconnect(PEDAL.into())));

        // no advertisements since, so it is lost one window later
        h.advance(Duration::from_secs(10));
        assert!(matches!(
            h.drain_events().as_slice(),
            [AirTurnEvent::Lost { .. }]
        ));
    }

    #[test]
    fn test_pairing_rejected_sets_pairing_failed() {
        let mut h = Harness::new(transport_with(ConnectBehavior::Fail(
            ConnectionFailureReason::PairingRejected,
        )));
        h.advertise(PEDAL);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();

        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert_eq!(pedal.connection_state, ConnectionState::Disconnected);
        assert!(pedal.last_connection_failed);
        assert!(pedal.pairing_failed);

        // a later successful attempt clears both flags
        h.transport.set_connect_behavior(ConnectBehavior::Succeed);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.pump();
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert!(pedal.is_ready());
        assert!(!pedal.last_connection_failed);
        assert!(!pedal.pairing_failed);
    }

    #[test]
    fn test_bonding_hint_fails_without_connecting() {
        let mut h = Harness::with_pedal();
        h.advertise(PEDAL);
        h.engine.set_has_bonding(PEDAL, true).unwrap();
        h.transport.clear_calls();
        h.drain_events();

        assert!(matches!(
            h.engine.connect(PEDAL, h.now),
            Err(Error::PairingFailed(_))
        ));
        assert!(h.transport.calls().is_empty());
        let events = h.drain_events();
        assert!(matches!(
            events.as_slice(),
            [AirTurnEvent::DidFailToConnect { reason, .. }] if reason.contains("bond")
        ));
        let pedal = h.engine.peripheral(PEDAL).unwrap();
        assert!(pedal.pairing_failed);
        assert_eq!(pedal.connection_state, ConnectionState::Disconnected);
    }

    #[test]
    fn test_cancel_while_connecting() {
        let mut h = Harness::new(transport_with(ConnectBehavior::Ignore));
        h.advertise(PEDAL);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.drain_events();

        h.engine.disconnect(PEDAL, h.now).unwrap();
        let events = h.drain_events();
        assert_eq!(states(&events), vec![ConnectionState::Disconnected]);
        assert!(!events.iter().any(|e| matches!(e, AirTurnEvent::DidFailToConnect { .. })));
        assert!(!h.engine.peripheral(PEDAL).unwrap().last_connection_failed);

        // the connect timer is gone
        h.advance(Duration::from_secs(20));
        assert!(!h
            .drain_events()
            .iter()
            .any(|e| matches!(e, AirTurnEvent::DidFailToConnect { .. })));
    }

    #[test]
    fn test_user_disconnect() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        h.engine.disconnect(PEDAL, h.now).unwrap();
        assert_eq!(
            h.engine.peripheral(PEDAL).unwrap().connection_state,
            ConnectionState::Disconnecting
        );
        assert!(matches!(
            h.engine.connect(PEDAL, h.now),
            Err(Error::NotReady {
                state: ConnectionState::Disconnecting
            })
        ));
        h.pump();

        let events = h.drain_events();
        assert_eq!(
            states(&events),
            vec![ConnectionState::Disconnecting, ConnectionState::Disconnected]
        );
        assert!(events.iter().any(|e| matches!(e, AirTurnEvent::DidDisconnect { .. })));
        assert!(!h.engine.peripheral(PEDAL).unwrap().last_connection_failed);

        // disconnecting again is a no-op
        h.engine.disconnect(PEDAL, h.now).unwrap();
        assert!(states(&h.drain_events()).is_empty());
    }

    #[test]
    fn test_disconnect_guard_completes_without_transport() {
        let transport = MockTransport::builder()
            .peripheral(PEDAL, MockPeripheral::builder().build())
            .confirm_disconnects(false)
            .build();
        let mut h = Harness::new(transport);
        h.connect_ready(PEDAL);

        h.engine.disconnect(PEDAL, h.now).unwrap();
        h.pump();
        assert_eq!(
            h.engine.peripheral(PEDAL).unwrap().connection_state,
            ConnectionState::Disconnecting
        );

        h.advance(Duration::from_secs(15));
        assert_eq!(
            h.engine.peripheral(PEDAL).unwrap().connection_state,
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_radio_loss_skips_disconnecting() {
        let transport = MockTransport::builder()
            .peripheral(PEDAL, MockPeripheral::builder().build())
            .auto_ack_writes(false)
            .build();
        let mut h = Harness::new(transport);
        h.connect_ready(PEDAL);
        let outcome = std::sync::Arc::new(std::sync::Mutex::new(None));
        let sink = outcome.clone();
        h.engine
            .write(
                PEDAL,
                airturn_types::WriteValue::RepeatRate(4),
                Box::new(move |result: Result<()>| *sink.lock().unwrap() = Some(result)),
                h.now,
            )
            .unwrap();
        h.drain_events();

        h.transport.set_radio_state(CentralState::PoweredOff);
        h.pump();

        let events = h.drain_events();
        assert_eq!(states(&events), vec![ConnectionState::Disconnected]);
        assert!(events.iter().any(|e| matches!(e, AirTurnEvent::DidDisconnect { .. })));
        assert!(matches!(*outcome.lock().unwrap(), Some(Err(Error::Cancelled))));
    }

    #[test]
    fn test_radio_loss_while_connecting() {
        let mut h = Harness::with_pedal();
        h.advertise(PEDAL);
        h.transport.set_connect_behavior(ConnectBehavior::Ignore);
        h.engine.connect(PEDAL, h.now).unwrap();
        h.drain_events();

        h.transport.set_radio_state(CentralState::PoweredOff);
        h.pump();

        let events = h.drain_events();
        assert_eq!(states(&events), vec![ConnectionState::Disconnected]);
        assert!(events.iter().any(|e| matches!(e, AirTurnEvent::DidFailToConnect { .. })));
        assert!(h.engine.peripheral(PEDAL).unwrap().last_connection_failed);
    }

    #[test]
    fn test_unexpected_link_loss() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        h.transport.drop_link(PEDAL);
        h.pump();

        let events = h.drain_events();
        assert_eq!(
            states(&events),
            vec![ConnectionState::Disconnecting, ConnectionState::Disconnected]
        );
        assert!(events.iter().any(|e| matches!(e, AirTurnEvent::DidDisconnect { .. })));
        assert_eq!(h.engine.central_state(), CentralState::Disconnected);
    }

    #[test]
    fn test_system_reconnection_is_interrogated() {
        let mut h = Harness::with_pedal();
        h.advertise(PEDAL);
        h.drain_events();

        h.transport.system_reconnect(PEDAL);
        h.pump();

        let events = h.drain_events();
        assert_eq!(
            states(&events),
            vec![
                ConnectionState::SystemConnected,
                ConnectionState::Discovering,
                ConnectionState::Ready,
            ]
        );
        assert!(events.iter().any(|e| matches!(e, AirTurnEvent::DidConnect { .. })));
    }

    #[test]
    fn test_stale_connect_result_ignored() {
        let mut h = Harness::with_pedal();
        h.connect_ready(PEDAL);
        h.drain_events();

        h.transport.emit(crate::transport::TransportEvent::ConnectResult {
            id: PEDAL.into(),
            result: Err(ConnectionFailureReason::Timeout),
        });
        h.pump();
        assert!(h.drain_events().is_empty());
        assert!(h.engine.peripheral(PEDAL).unwrap().is_ready());
    }
}
