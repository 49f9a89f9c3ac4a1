//! Typical registry (node, slot) → typical and the gateway registry keyed by last octet.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::config::ConfigError;
use crate::dispatcher::{Confirmation, TypicalStates};
use crate::session::GatewaySession;
use crate::sync::{read, write};
use crate::typical::{Expected, StateUpdate, Typical};

/// Typicals of one gateway. Written by the listener, read by the dispatcher sweep.
#[derive(Debug, Default)]
pub struct TypicalRegistry {
    typicals: RwLock<HashMap<(u8, u8), Typical>>,
}

impl TypicalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, typical: Typical) -> Result<(), ConfigError> {
        let key = (typical.node(), typical.slot());
        let mut map = write(&self.typicals);
        if map.contains_key(&key) {
            return Err(ConfigError::DuplicateTypical {
                node: key.0,
                slot: key.1,
            });
        }
        map.insert(key, typical);
        Ok(())
    }

    pub fn get(&self, node: u8, slot: u8) -> Option<Typical> {
        read(&self.typicals).get(&(node, slot)).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.typicals).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered (node, slot) pairs, sorted.
    pub fn addresses(&self) -> Vec<(u8, u8)> {
        let mut keys: Vec<_> = read(&self.typicals).keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// `1 + max(node)` over the registered typicals; 0 when empty.
    pub fn node_count(&self) -> u8 {
        read(&self.typicals)
            .keys()
            .map(|(node, _)| node.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Deliver raw bytes to the typical at (node, slot). `None` if nothing is registered there.
    pub fn set_raw_state(
        &self,
        node: u8,
        slot: u8,
        bytes: &[u8],
        now: SystemTime,
    ) -> Option<Vec<StateUpdate>> {
        write(&self.typicals)
            .get_mut(&(node, slot))
            .map(|t| t.set_raw_state(bytes, now))
    }

    /// Store the health byte on every typical of `node`; returns the slot of each update.
    pub fn set_health(&self, node: u8, health: u8) -> Vec<(u8, StateUpdate)> {
        let mut map = write(&self.typicals);
        let mut updates: Vec<_> = map
            .values_mut()
            .filter(|t| t.node() == node)
            .map(|t| (t.slot(), t.set_health(health)))
            .collect();
        updates.sort_unstable_by_key(|(slot, _)| *slot);
        updates
    }
}

impl TypicalStates for TypicalRegistry {
    fn confirmation(&self, node: u8, slot: u8, command: u8) -> Confirmation {
        let map = read(&self.typicals);
        let Some(typical) = map.get(&(node, slot)) else {
            return Confirmation::Absent;
        };
        match typical.expected(command) {
            Expected::NotApplicable => Confirmation::Confirmed,
            Expected::State(state) if typical.raw_state() == Some(state) => Confirmation::Confirmed,
            Expected::State(_) => Confirmation::Pending,
        }
    }
}

/// Process-wide gateway table handed to the listener. Holds at most one gateway.
#[derive(Debug, Default)]
pub struct GatewayRegistry {
    gateways: RwLock<HashMap<u8, Arc<GatewaySession>>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Any second gateway is a configuration error.
    pub fn register(&self, session: Arc<GatewaySession>) -> Result<(), ConfigError> {
        let id = session.id();
        let mut map = write(&self.gateways);
        if map.contains_key(&id) {
            return Err(ConfigError::DuplicateGateway(id));
        }
        if let Some(registered) = map.keys().next() {
            return Err(ConfigError::MultipleGateways {
                registered: *registered,
                requested: id,
            });
        }
        map.insert(id, session);
        Ok(())
    }

    pub fn get(&self, id: u8) -> Option<Arc<GatewaySession>> {
        read(&self.gateways).get(&id).cloned()
    }

    pub fn remove(&self, id: u8) -> Option<Arc<GatewaySession>> {
        write(&self.gateways).remove(&id)
    }

    /// Ids of the registered gateways.
    pub fn ids(&self) -> Vec<u8> {
        read(&self.gateways).keys().copied().collect()
    }
}
