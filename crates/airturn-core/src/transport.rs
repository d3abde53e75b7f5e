//! Transport abstraction between the engine and a radio driver.
//!
//! Every request is fire-and-forget. The transport reports what happened by
//! sending [`TransportEvent`]s on the channel handed to it in
//! [`Transport::attach`]; the engine never assumes a write succeeded without
//! an explicit [`TransportEvent::WriteComplete`].

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use airturn_types::CentralState;

use crate::error::ConnectionFailureReason;

/// Identifies one write request. The transport echoes it back in
/// [`TransportEvent::WriteComplete`] so completions match their write even
/// when they arrive out of order or never arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteToken(pub u64);

impl std::fmt::Display for WriteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Low-level events reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An advertisement was received.
    Advertisement {
        id: String,
        name: Option<String>,
        rssi: Option<i16>,
    },
    /// A link came up, or a connection attempt failed.
    ///
    /// An `Ok` for a peripheral the engine did not ask to connect is a
    /// system reconnection.
    ConnectResult {
        id: String,
        result: Result<(), ConnectionFailureReason>,
    },
    /// A link went down, either on request or unexpectedly.
    Disconnected { id: String },
    /// A characteristic read finished.
    CharacteristicRead {
        id: String,
        characteristic: Uuid,
        result: Result<Bytes, String>,
    },
    /// A characteristic write was acknowledged.
    WriteComplete {
        id: String,
        characteristic: Uuid,
        token: WriteToken,
        result: Result<(), String>,
    },
    /// A subscribed characteristic changed.
    Notify {
        id: String,
        characteristic: Uuid,
        value: Bytes,
    },
    /// The radio changed state.
    RadioStateChanged(CentralState),
}

impl TransportEvent {
    /// The peripheral this event is about, if any.
    pub fn peripheral_id(&self) -> Option<&str> {
        match self {
            Self::Advertisement { id, .. }
            | Self::ConnectResult { id, .. }
            | Self::Disconnected { id }
            | Self::CharacteristicRead { id, .. }
            | Self::WriteComplete { id, .. }
            | Self::Notify { id, .. } => Some(id),
            Self::RadioStateChanged(_) => None,
        }
    }
}

/// Channel a transport reports its events on.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving side of the transport event channel.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// A radio driver the engine can drive.
///
/// Implementations must not block: long-running work belongs on a spawned
/// task that reports back through the event channel.
///
/// # Example
///
/// ```
/// use airturn_core::{MockTransport, Transport};
/// use airturn_core::transport::TransportEvent;
///
/// let mut transport = MockTransport::new();
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// transport.attach(tx);
///
/// // the mock reports its radio state as soon as it is attached
/// assert!(matches!(rx.try_recv(), Ok(TransportEvent::RadioStateChanged(_))));
/// ```
pub trait Transport: Send + 'static {
    /// Hand the transport the channel to report events on.
    fn attach(&mut self, events: TransportEventSender);

    /// Start scanning, filtered by service when `services` is not empty.
    fn start_scan(&mut self, services: &[Uuid]);

    /// Stop scanning.
    fn stop_scan(&mut self);

    /// Start connecting to a peripheral.
    fn connect(&mut self, id: &str);

    /// Tear down the link to a peripheral, or abandon a connection attempt.
    fn disconnect(&mut self, id: &str);

    /// Read a characteristic.
    fn read_characteristic(&mut self, id: &str, characteristic: Uuid);

    /// Write a characteristic with response. The completion carries `token`.
    fn write_characteristic(
        &mut self,
        id: &str,
        characteristic: Uuid,
        value: Bytes,
        token: WriteToken,
    );

    /// Enable notifications on a characteristic.
    fn subscribe(&mut self, id: &str, characteristic: Uuid);

    /// True if the identifier still names a peripheral the radio knows.
    fn is_identifier_valid(&self, id: &str) -> bool;
}
