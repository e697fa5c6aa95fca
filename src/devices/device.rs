//! Per-device state
//!
//! A device is a property map plus the bits of state its lifecycle events
//! work on: the battery and the comms flag. Property changes become
//! [`DeviceUpdate`]s; while comms are down they are held back and released in
//! order once comms return.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::simulation::clock::to_millis;
use crate::types::{DeviceId, DeviceIndex};

/// Charge of a fresh battery
pub const FULL_BATTERY: f64 = 100.0;

/// One change to a device, as handed to the output sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceUpdate {
    /// Device the change belongs to
    #[serde(rename = "$id")]
    pub id: DeviceId,
    /// Virtual time of the change in epoch milliseconds
    #[serde(rename = "$ts")]
    pub ts: i64,
    /// Changed properties
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl DeviceUpdate {
    /// Value of one changed property
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Battery of one device
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryState {
    /// Charge, 0 to 100
    pub level: f64,
    /// When the current battery runs out, if modelled
    pub expires_at: Option<f64>,
    /// Whether the battery has run out and was not replaced
    pub depleted: bool,
    /// Number of fresh batteries fitted after the first
    pub replacements: u32,
}

impl Default for BatteryState {
    fn default() -> Self {
        Self { level: FULL_BATTERY, expires_at: None, depleted: false, replacements: 0 }
    }
}

/// State of one simulated device
#[derive(Debug, Clone)]
pub struct DeviceState {
    /// Position in the registry
    pub index: DeviceIndex,
    /// External identifier
    pub id: DeviceId,
    /// Current attributes, without `$id` and `$ts`
    pub properties: Map<String, Value>,
    /// Battery
    pub battery: BatteryState,
    /// Whether the device can currently reach the backend
    pub comms_up: bool,
    /// Time of the last change, epoch seconds
    pub last_update: f64,
    held: Vec<DeviceUpdate>,
}

impl DeviceState {
    /// Create a device from its initial properties
    ///
    /// `$id` and `$ts` keys in `properties` are dropped; the id is given
    /// separately and the timestamp is `created_at`.
    pub fn new(index: DeviceIndex, id: DeviceId, mut properties: Map<String, Value>, created_at: f64) -> Self {
        properties.remove("$id");
        properties.remove("$ts");
        let level = properties
            .get("battery")
            .and_then(Value::as_f64)
            .unwrap_or(FULL_BATTERY);
        Self {
            index,
            id,
            properties,
            battery: BatteryState { level, ..BatteryState::default() },
            comms_up: true,
            last_update: created_at,
            held: Vec::new(),
        }
    }

    /// Full snapshot of the device as an update at its last change time
    pub fn snapshot(&self) -> DeviceUpdate {
        DeviceUpdate {
            id: self.id.clone(),
            ts: to_millis(self.last_update),
            properties: self.properties.clone(),
        }
    }

    /// Look up a property
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Merge `changes` into the properties at time `now`
    ///
    /// Returns the update to post, or `None` when comms are down and the
    /// update is held back instead. `$id` and `$ts` in `changes` are ignored.
    pub fn apply(&mut self, now: f64, mut changes: Map<String, Value>) -> Option<DeviceUpdate> {
        changes.remove("$id");
        changes.remove("$ts");
        if let Some(level) = changes.get("battery").and_then(Value::as_f64) {
            self.battery.level = level;
        }
        for (key, value) in &changes {
            self.properties.insert(key.clone(), value.clone());
        }
        self.last_update = now;

        let update = DeviceUpdate { id: self.id.clone(), ts: to_millis(now), properties: changes };
        if self.comms_up {
            Some(update)
        } else {
            self.held.push(update);
            None
        }
    }

    /// Set one property
    pub fn set(&mut self, now: f64, key: &str, value: Value) -> Option<DeviceUpdate> {
        let mut changes = Map::new();
        changes.insert(key.to_string(), value);
        self.apply(now, changes)
    }

    /// Change the comms state
    ///
    /// Coming back up releases every held update, oldest first.
    pub fn set_comms(&mut self, up: bool) -> Vec<DeviceUpdate> {
        self.comms_up = up;
        if up {
            std::mem::take(&mut self.held)
        } else {
            Vec::new()
        }
    }

    /// Number of updates waiting for comms
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}
