//! Identifier types for the fleet simulator
//!
//! Devices carry two identifiers: the external `$id` the backend knows them
//! by, and the position in the registry that lifecycle events refer to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// External identifier of a device, e.g. a MAC address `01-23-45-67-89-ab`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Build a MAC-style identifier from six bytes
    pub fn from_mac(bytes: [u8; 6]) -> Self {
        let parts: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(parts.join("-"))
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Position of a device in the registry
///
/// Indices are handed out in creation order and never reused, so they stay
/// valid for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIndex(pub usize);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_from_mac() {
        let id = DeviceId::from_mac([0x01, 0x23, 0x45, 0x67, 0x89, 0xab]);
        assert_eq!(id.as_str(), "01-23-45-67-89-ab");
        assert_eq!(id.to_string(), "01-23-45-67-89-ab");
    }

    #[test]
    fn test_device_id_serialization() {
        let id = DeviceId::from("aa-bb-cc-dd-ee-ff");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"aa-bb-cc-dd-ee-ff\"");
        let back: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_device_index_display() {
        assert_eq!(DeviceIndex(7).to_string(), "#7");
        assert!(DeviceIndex(1) < DeviceIndex(2));
    }
}
