//! The set of known and discovered peripherals.
//!
//! The registry owns every [`Peripheral`] and is the only place connection
//! state is written, so every transition is logged and published the same way.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use airturn_types::ConnectionState;

use crate::events::{AirTurnEvent, EventBus};
use crate::peripheral::Peripheral;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    peripherals: HashMap<String, Peripheral>,
    discovered: BTreeSet<String>,
}

impl Registry {
    pub fn get(&self, id: &str) -> Option<&Peripheral> {
        self.peripherals.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Peripheral> {
        self.peripherals.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peripherals.contains_key(id)
    }

    /// Insert a new peripheral. Returns false if one with this id exists.
    pub fn insert(&mut self, peripheral: Peripheral) -> bool {
        if self.peripherals.contains_key(&peripheral.id) {
            return false;
        }
        self.peripherals.insert(peripheral.id.clone(), peripheral);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Peripheral> {
        self.discovered.remove(id);
        self.peripherals.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peripheral> {
        self.peripherals.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.peripherals.keys().cloned().collect()
    }

    /// Add to the discovered set. Returns true if it was not already there.
    pub fn mark_discovered(&mut self, id: &str) -> bool {
        self.discovered.insert(id.to_string())
    }

    /// Remove from the discovered set. Returns true if it was there.
    pub fn mark_lost(&mut self, id: &str) -> bool {
        self.discovered.remove(id)
    }

    pub fn is_discovered(&self, id: &str) -> bool {
        self.discovered.contains(id)
    }

    pub fn discovered_ids(&self) -> Vec<String> {
        self.discovered.iter().cloned().collect()
    }

    pub fn ready_count(&self) -> usize {
        self.peripherals.values().filter(|p| p.is_ready()).count()
    }

    /// Move a peripheral to `state`, publishing `ConnectionStateChanged`.
    ///
    /// Returns the previous state, or `None` if the peripheral is unknown or
    /// already in `state`.
    pub fn transition(
        &mut self,
        id: &str,
        state: ConnectionState,
        bus: &EventBus,
    ) -> Option<ConnectionState> {
        let peripheral = self.peripherals.get_mut(id)?;
        let previous = peripheral.connection_state;
        if previous == state {
            return None;
        }
        peripheral.connection_state = state;
        info!(peripheral = %id, ?previous, ?state, "Connection state changed");
        bus.send(AirTurnEvent::ConnectionStateChanged {
            peripheral: peripheral.reference(),
            previous,
            state,
        });
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_unique() {
        let mut registry = Registry::default();
        assert!(registry.insert(Peripheral::new("a")));
        assert!(!registry.insert(Peripheral::new("a")));
        assert_eq!(registry.ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_discovered_set() {
        let mut registry = Registry::default();
        registry.insert(Peripheral::new("a"));
        assert!(registry.mark_discovered("a"));
        assert!(!registry.mark_discovered("a"));
        assert!(registry.is_discovered("a"));
        assert!(registry.mark_lost("a"));
        assert!(!registry.mark_lost("a"));
        // the entity survives being lost
        assert!(registry.contains("a"));
    }

    #[test]
    fn test_remove_clears_discovered() {
        let mut registry = Registry::default();
        registry.insert(Peripheral::new("a"));
        registry.mark_discovered("a");
        assert!(registry.remove("a").is_some());
        assert!(!registry.is_discovered("a"));
    }

    #[tokio::test]
    async fn test_transition_publishes_once() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let mut registry = Registry::default();
        registry.insert(Peripheral::new("a"));

        assert_eq!(
            registry.transition("a", ConnectionState::Connecting, &bus),
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(registry.transition("a", ConnectionState::Connecting, &bus), None);
        assert_eq!(registry.transition("zz", ConnectionState::Connecting, &bus), None);

        match sub.try_recv() {
            Some(AirTurnEvent::ConnectionStateChanged {
                previous, state, ..
            }) => {
                assert_eq!(previous, ConnectionState::Disconnected);
                assert_eq!(state, ConnectionState::Connecting);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }
}
