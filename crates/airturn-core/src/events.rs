//! Peripheral event bus.
//!
//! This module provides the typed event fan-out used to tell applications
//! about discovery, connection lifecycle, pedal input and configuration
//! changes.

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use airturn_types::{
    AnalogValue, CentralState, ChargingState, ConnectionState, DeviceType, Mode, PairingState,
    Port, WriteType,
};

/// Default capacity of the event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Identifies the peripheral an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralRef {
    /// Stable identifier (peripheral ID or MAC address).
    pub id: String,
    /// Display name if known.
    pub name: Option<String>,
    /// Device type as last known.
    pub device_type: DeviceType,
}

/// Events published by the central.
///
/// All events are serializable for logging, persistence, and IPC. Events for
/// one peripheral are published in the order of the transitions that caused
/// them.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AirTurnEvent {
    /// A peripheral was seen for the first time.
    Added { peripheral: PeripheralRef },
    /// A peripheral was forgotten.
    Removed { peripheral: PeripheralRef },
    /// Start-up reconciliation found an identifier the transport no longer knows.
    Invalidated { id: String },
    /// A peripheral entered the discovered set.
    Discovered {
        peripheral: PeripheralRef,
        rssi: Option<i16>,
    },
    /// A peripheral left the discovered set.
    Lost { peripheral: PeripheralRef },
    /// The central state changed.
    CentralStateChanged { state: CentralState },
    /// A connection attempt started.
    Connecting { peripheral: PeripheralRef },
    /// A peripheral's connection state changed.
    ConnectionStateChanged {
        peripheral: PeripheralRef,
        previous: ConnectionState,
        state: ConnectionState,
    },
    /// A peripheral became ready.
    DidConnect { peripheral: PeripheralRef },
    /// A connection attempt failed.
    DidFailToConnect {
        peripheral: PeripheralRef,
        reason: String,
    },
    /// A ready or linked peripheral disconnected.
    DidDisconnect { peripheral: PeripheralRef },
    /// A port went down.
    PedalDown { peripheral: PeripheralRef, port: Port },
    /// A port went up after `repeat_count` repeats.
    PedalUp {
        peripheral: PeripheralRef,
        port: Port,
        repeat_count: u32,
    },
    /// A press, either the initial one (`repeat_count` 0) or a repeat.
    PedalPress {
        peripheral: PeripheralRef,
        port: Port,
        repeat_count: u32,
    },
    /// An analog port reported a new value.
    AnalogValueChanged {
        peripheral: PeripheralRef,
        port: Port,
        value: AnalogValue,
    },
    /// A programmable property write was acknowledged.
    WriteComplete {
        peripheral: PeripheralRef,
        write_type: WriteType,
    },
    /// The active mode changed.
    ModeChanged { peripheral: PeripheralRef, mode: Mode },
    /// The display name changed. `None` when reset with no default name known.
    NameChanged {
        peripheral: PeripheralRef,
        name: Option<String>,
    },
    /// The battery level changed.
    BatteryLevelChanged { peripheral: PeripheralRef, level: u8 },
    /// The charging state changed.
    ChargingStateChanged {
        peripheral: PeripheralRef,
        state: ChargingState,
    },
    /// The pairing state changed.
    PairingStateChanged {
        peripheral: PeripheralRef,
        state: PairingState,
    },
}

impl AirTurnEvent {
    /// The peripheral this event is about, if any.
    pub fn peripheral(&self) -> Option<&PeripheralRef> {
        match self {
            Self::Added { peripheral }
            | Self::Removed { peripheral }
            | Self::Discovered { peripheral, .. }
            | Self::Lost { peripheral }
            | Self::Connecting { peripheral }
            | Self::ConnectionStateChanged { peripheral, .. }
            | Self::DidConnect { peripheral }
            | Self::DidFailToConnect { peripheral, .. }
            | Self::DidDisconnect { peripheral }
            | Self::PedalDown { peripheral, .. }
            | Self::PedalUp { peripheral, .. }
            | Self::PedalPress { peripheral, .. }
            | Self::AnalogValueChanged { peripheral, .. }
            | Self::WriteComplete { peripheral, .. }
            | Self::ModeChanged { peripheral, .. }
            | Self::NameChanged { peripheral, .. }
            | Self::BatteryLevelChanged { peripheral, .. }
            | Self::ChargingStateChanged { peripheral, .. }
            | Self::PairingStateChanged { peripheral, .. } => Some(peripheral),
            Self::Invalidated { .. } | Self::CentralStateChanged { .. } => None,
        }
    }
}

/// Sender for peripheral events.
pub type EventSender = broadcast::Sender<AirTurnEvent>;

/// Event bus fanning events out to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: EventSender,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event.
    pub fn send(&self, event: AirTurnEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscriptions.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// A live subscription to the event bus.
///
/// Dropping the subscription, or calling [`unsubscribe`](Self::unsubscribe),
/// stops delivery.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<AirTurnEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the central has shut down.
    ///
    /// A subscriber that falls more than the bus capacity behind skips the
    /// oldest events; the gap is logged.
    pub async fn recv(&mut self) -> Option<AirTurnEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<AirTurnEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}

    /// Convert into a stream of events that ends when the central shuts down.
    pub fn into_stream(self) -> impl Stream<Item = AirTurnEvent> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn pedal() -> PeripheralRef {
        PeripheralRef {
            id: "AA:BB:CC:DD:EE:FF".into(),
            name: Some("PEDpro".into()),
            device_type: DeviceType::PedPro,
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AirTurnEvent::PedalPress {
            peripheral: pedal(),
            port: Port::new(3).unwrap(),
            repeat_count: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"pedal_press\""));
        assert!(json.contains("\"port\":3"));
        assert!(json.contains("\"repeat_count\":2"));

        let back: AirTurnEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_peripheral_accessor() {
        let event = AirTurnEvent::DidConnect {
            peripheral: pedal(),
        };
        assert_eq!(event.peripheral().map(|p| p.id.as_str()), Some("AA:BB:CC:DD:EE:FF"));

        let event = AirTurnEvent::CentralStateChanged {
            state: CentralState::PoweredOff,
        };
        assert!(event.peripheral().is_none());
    }

    #[tokio::test]
    async fn test_bus_fans_out_to_every_subscriber() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.send(AirTurnEvent::Invalidated { id: "gone".into() });

        assert_eq!(
            first.recv().await,
            Some(AirTurnEvent::Invalidated { id: "gone".into() })
        );
        assert_eq!(
            second.recv().await,
            Some(AirTurnEvent::Invalidated { id: "gone".into() })
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new(8);
        let sub = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.receiver_count(), 0);

        // Sending with no subscribers is not an error
        bus.send(AirTurnEvent::Invalidated { id: "x".into() });
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..4 {
            bus.send(AirTurnEvent::Invalidated { id: i.to_string() });
        }
        assert_eq!(
            sub.try_recv(),
            Some(AirTurnEvent::Invalidated { id: "2".into() })
        );
        assert_eq!(
            sub.try_recv(),
            Some(AirTurnEvent::Invalidated { id: "3".into() })
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_stream_ends_when_bus_dropped() {
        let bus = EventBus::new(4);
        let stream = bus.subscribe().into_stream();
        bus.send(AirTurnEvent::Invalidated { id: "a".into() });
        drop(bus);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![AirTurnEvent::Invalidated { id: "a".into() }]);
    }
}
