//! Writing the programmable properties.
//!
//! Writes are validated and feature-gated before anything goes over the
//! air. At most one write per property is outstanding: a newer write
//! replaces the pending one, whose callback is dropped without being called.
//! Completions are matched to writes by [`WriteToken`], so one that arrives
//! for a replaced or timed-out write is discarded.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use airturn_types::{MAX_DEVICE_NAME_LENGTH, WriteType, WriteValue};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::events::AirTurnEvent;
use crate::peripheral::Peripheral;
use crate::timers::TimerKey;
use crate::transport::WriteToken;

/// Called once with the outcome of a write.
pub type WriteCallback = Box<dyn FnOnce(Result<()>) + Send>;

pub(crate) struct PendingWrite {
    token: WriteToken,
    value: WriteValue,
    callback: WriteCallback,
}

impl PendingWrite {
    pub fn resolve(self, result: Result<()>) {
        (self.callback)(result);
    }
}

type WriteKey = (String, WriteType);

/// Outstanding writes, one per peripheral and property.
#[derive(Default)]
pub(crate) struct PendingWrites {
    current: HashMap<WriteKey, PendingWrite>,
    next_token: u64,
}

impl std::fmt::Debug for PendingWrites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.current.iter().map(|(key, pending)| (key, pending.token)))
            .finish()
    }
}

impl PendingWrites {
    /// Token for the next write request.
    pub fn next_token(&mut self) -> WriteToken {
        self.next_token += 1;
        WriteToken(self.next_token)
    }

    /// Track a new write. Returns true if it replaced an outstanding one.
    pub fn insert(
        &mut self,
        id: &str,
        token: WriteToken,
        value: WriteValue,
        callback: WriteCallback,
    ) -> bool {
        let key = (id.to_string(), value.write_type());
        let pending = PendingWrite {
            token,
            value,
            callback,
        };
        self.current.insert(key, pending).is_some()
    }

    /// Match a completion to its write. Completions for replaced or expired
    /// writes yield `None`.
    pub fn complete(
        &mut self,
        id: &str,
        write_type: WriteType,
        token: WriteToken,
    ) -> Option<PendingWrite> {
        let key = (id.to_string(), write_type);
        if self.current.get(&key)?.token != token {
            return None;
        }
        self.current.remove(&key)
    }

    /// Give up on a write. A completion that still arrives for it is ignored.
    pub fn expire(&mut self, id: &str, write_type: WriteType) -> Option<PendingWrite> {
        self.current.remove(&(id.to_string(), write_type))
    }

    pub fn is_pending(&self, id: &str, write_type: WriteType) -> bool {
        self.current.contains_key(&(id.to_string(), write_type))
    }

    /// Remove every write for a peripheral whose link is gone.
    pub fn drain_peripheral(&mut self, id: &str) -> Vec<(WriteType, PendingWrite)> {
        let keys: Vec<WriteKey> = self
            .current
            .keys()
            .filter(|(peripheral, _)| peripheral == id)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| {
                let write_type = key.1;
                self.current.remove(&key).map(|pending| (write_type, pending))
            })
            .collect()
    }

    pub fn drain_all(&mut self) -> Vec<(String, WriteType, PendingWrite)> {
        self.current
            .drain()
            .map(|((id, write_type), pending)| (id, write_type, pending))
            .collect()
    }
}

impl Engine {
    /// Write one programmable property.
    ///
    /// The peripheral must be ready and have the features the property
    /// requires; otherwise nothing is sent. `callback` runs once when the
    /// peripheral acknowledges, the write fails or times out, or the link
    /// goes away. It is dropped without running if a newer write of the
    /// same property replaces this one first.
    pub fn write(
        &mut self,
        id: &str,
        value: WriteValue,
        callback: WriteCallback,
        now: Instant,
    ) -> Result<()> {
        let write_type = value.write_type();
        let peripheral = self.registry.get(id).ok_or_else(|| Error::not_found(id))?;
        if !peripheral.is_ready() {
            return Err(Error::NotReady {
                state: peripheral.connection_state,
            });
        }
        if !peripheral.has_features(write_type.required_features()) {
            debug!(peripheral = %id, %write_type, features = ?peripheral.features, "Write not supported");
            return Err(Error::unsupported(write_type));
        }
        value
            .validate()
            .map_err(|e| Error::invalid_parameter(e.to_string()))?;

        let token = self.writes.next_token();
        debug!(peripheral = %id, ?value, %token, "Writing");
        self.transport
            .write_characteristic(id, write_type.characteristic(), value.to_bytes(), token);
        if self.writes.insert(id, token, value, callback) {
            debug!(peripheral = %id, %write_type, "Superseded pending write");
        }
        self.timers.schedule(
            TimerKey::Write(id.to_string(), write_type),
            now + self.config.write_timeout,
        );
        Ok(())
    }

    /// Store or clear the application-chosen name of a peripheral.
    ///
    /// The name is kept by the central, not written to the device. `None`
    /// or an empty name restores the factory default.
    pub fn store_device_name(&mut self, id: &str, name: Option<&str>) -> Result<()> {
        let peripheral = self.registry.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        match name.filter(|name| !name.is_empty()) {
            Some(name) => {
                if name.chars().count() > MAX_DEVICE_NAME_LENGTH {
                    return Err(Error::invalid_parameter(format!(
                        "name longer than {MAX_DEVICE_NAME_LENGTH} characters"
                    )));
                }
                peripheral.name = Some(name.to_string());
                peripheral.has_custom_name = true;
            }
            None => {
                peripheral.name = peripheral.default_name.clone();
                peripheral.has_custom_name = false;
            }
        }
        info!(peripheral = %id, name = ?peripheral.name, "Device name stored");
        let reference = peripheral.reference();
        let name = peripheral.name.clone();
        self.events.send(AirTurnEvent::NameChanged {
            peripheral: reference,
            name,
        });
        Ok(())
    }

    pub(crate) fn on_write_complete(
        &mut self,
        id: &str,
        characteristic: Uuid,
        token: WriteToken,
        result: std::result::Result<(), String>,
    ) {
        let Some(write_type) = WriteType::from_characteristic(characteristic) else {
            debug!(peripheral = %id, %characteristic, "Write completion for unknown characteristic");
            return;
        };
        let Some(pending) = self.writes.complete(id, write_type, token) else {
            debug!(peripheral = %id, %write_type, %token, "Discarding stale write completion");
            return;
        };
        self.timers
            .cancel(&TimerKey::Write(id.to_string(), write_type));

        match result {
            Ok(()) => {
                if let Some(peripheral) = self.registry.get_mut(id) {
                    apply_value(peripheral, pending.value);
                    info!(peripheral = %id, %write_type, "Write complete");
                    self.events.send(AirTurnEvent::WriteComplete {
                        peripheral: peripheral.reference(),
                        write_type,
                    });
                }
                pending.resolve(Ok(()));
            }
            Err(reason) => {
                warn!(peripheral = %id, %write_type, %reason, "Write failed");
                pending.resolve(Err(Error::WriteFailed { write_type, reason }));
            }
        }
    }

    pub(crate) fn on_write_timeout(&mut self, id: &str, write_type: WriteType) {
        if let Some(pending) = self.writes.expire(id, write_type) {
            warn!(peripheral = %id, %write_type, "Write timed out");
            pending.resolve(Err(Error::write_timeout(
                write_type,
                self.config.write_timeout,
            )));
        }
    }

    /// Resolve every outstanding write of a peripheral with `error`.
    pub(crate) fn cancel_writes(&mut self, id: &str, error: impl Fn() -> Error) {
        for (write_type, pending) in self.writes.drain_peripheral(id) {
            self.timers
                .cancel(&TimerKey::Write(id.to_string(), write_type));
            debug!(peripheral = %id, %write_type, "Write cancelled");
            pending.resolve(Err(error()));
        }
    }
}

/// Update the cached register once the peripheral acknowledged a write.
fn apply_value(peripheral: &mut Peripheral, value: WriteValue) {
    match value {
        WriteValue::DelayBeforeRepeat(v) => peripheral.delay_before_repeat_multiplier = v,
        WriteValue::RepeatRate(v) => peripheral.repeat_rate_divisor = v,
        WriteValue::IdlePowerOff(v) => peripheral.idle_power_off = v,
        WriteValue::ConnectionConfiguration(v) => peripheral.connection_configuration = v,
        WriteValue::PairingMethod(v) => peripheral.pairing_method = Some(v),
        WriteValue::DebounceTime(v) => peripheral.debounce_time = Some(v),
    }
}
