//! Device registry
//!
//! Owns every device of a run. Lifecycle events refer to devices by
//! [`DeviceIndex`]; external events name them by [`DeviceId`].

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::devices::DeviceState;
use crate::types::{DeviceId, DeviceIndex};

/// All devices of a run with lookup by index and by id
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    /// Devices in creation order
    devices: Vec<DeviceState>,
    /// Quick lookup map from device id to index
    id_index: HashMap<DeviceId, DeviceIndex>,
}

impl DeviceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next device will get
    pub fn next_index(&self) -> DeviceIndex {
        DeviceIndex(self.devices.len())
    }

    /// Whether a device with this id exists
    pub fn contains_id(&self, id: &DeviceId) -> bool {
        self.id_index.contains_key(id)
    }

    /// Register a device built from `properties`
    ///
    /// Returns `None` if the id is already taken.
    pub fn add(&mut self, id: DeviceId, properties: Map<String, Value>, created_at: f64) -> Option<DeviceIndex> {
        if self.contains_id(&id) {
            return None;
        }
        let index = self.next_index();
        self.id_index.insert(id.clone(), index);
        self.devices.push(DeviceState::new(index, id, properties, created_at));
        Some(index)
    }

    /// Get a device by index
    pub fn get(&self, index: DeviceIndex) -> Option<&DeviceState> {
        self.devices.get(index.0)
    }

    /// Get a mutable device by index
    pub fn get_mut(&mut self, index: DeviceIndex) -> Option<&mut DeviceState> {
        self.devices.get_mut(index.0)
    }

    /// Get a device by id
    pub fn find(&self, id: &DeviceId) -> Option<&DeviceState> {
        self.id_index.get(id).and_then(|index| self.get(*index))
    }

    /// Get a mutable device by id
    pub fn find_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceState> {
        let index = *self.id_index.get(id)?;
        self.get_mut(index)
    }

    /// Iterate over devices in creation order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceState> {
        self.devices.iter()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
