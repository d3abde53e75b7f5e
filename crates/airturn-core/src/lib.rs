//! Connection engine and command protocol for AirTurn foot-pedal peripherals.
//!
//! This crate discovers AirTurn pedals over Bluetooth Low Energy, walks each
//! one through connection and interrogation, turns its notifications into
//! pedal events and writes its programmable properties.
//!
//! # Features
//!
//! - **Discovery**: Advertising peripherals are tracked and dropped after a
//!   quiet window
//! - **Connection lifecycle**: Connect, interrogate and disconnect with
//!   timeouts and structured failure reasons
//! - **Pedal input**: Down, up and press events, with key repeat generated
//!   from the peripheral's own delay and rate registers
//! - **Programmable properties**: Feature-gated writes where the newest write
//!   of a property wins
//! - **Firmware checks**: Compare the running firmware with a pluggable catalog
//! - **Testable**: The [`Engine`] is synchronous and the [`MockTransport`]
//!   simulates peripherals, so everything runs without a radio
//!
//! # Architecture
//!
//! The [`Engine`] holds all state and advances on transport events, timer
//! deadlines and API calls. [`Central`] runs an engine on a tokio task and
//! exposes it through async methods and an event [`Subscription`]. A
//! [`Transport`] connects the engine to a radio: [`BtleplugTransport`] for
//! real hardware, [`MockTransport`] for tests.
//!
//! # Platform Differences
//!
//! Peripheral identifiers are Bluetooth addresses on Linux and Windows. On
//! macOS, where CoreBluetooth hides addresses, they are the UUID the system
//! assigns, which is stable per machine but differs between machines.
//!
//! # Quick Start
//!
//! ```no_run
//! use airturn_core::{Central, CentralConfig};
//! use airturn_core::events::AirTurnEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let central = Central::builder()
//!         .config(CentralConfig::default())
//!         .start_bluetooth()
//!         .await?;
//!     let mut events = central.subscribe();
//!     central.scan().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             AirTurnEvent::Discovered { peripheral, .. } => {
//!                 central.connect(&peripheral.id).await?;
//!             }
//!             AirTurnEvent::PedalPress { port, repeat_count, .. } => {
//!                 println!("port {port} pressed (repeat {repeat_count})");
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod central;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod firmware;
pub mod mock;
pub mod peripheral;
pub mod transport;
pub mod util;

mod connection;
mod input;
mod interrogation;
mod registry;
mod timers;

// Core exports
pub use btle::BtleplugTransport;
pub use central::{Central, CentralBuilder, WriteTicket};
pub use commands::WriteCallback;
pub use config::CentralConfig;
pub use engine::Engine;
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{AirTurnEvent, EventBus, PeripheralRef, Subscription};
pub use firmware::{FirmwareCallback, FirmwareCatalog, StaticCatalog};
pub use mock::{MockPeripheral, MockTransport, MockTransportBuilder};
pub use peripheral::{Peripheral, PortStatus};
pub use transport::{Transport, TransportEvent, WriteToken};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from airturn-types
pub use airturn_types::uuid as uuids;
pub use airturn_types::{
    CentralState, ConnectionState, DeviceType, FeaturesAvailable, Port, PortState, WriteType,
    WriteValue,
};
