//! Device attribute synthesis
//!
//! Builds the initial property map of a freshly installed device: a MAC-style
//! id, a label, an owner's name, firmware, mobile operator and signal
//! strength.

use serde_json::{json, Map, Value};

use crate::devices::device::FULL_BATTERY;
use crate::simulation::RandomSource;
use crate::types::DeviceId;

/// Signal strength of a device with perfect radio conditions (dBm)
pub const GOOD_RSSI: f64 = -50.0;

/// Signal strength of a device with the worst radio conditions (dBm)
pub const BAD_RSSI: f64 = -120.0;

/// Firmware versions weighted by how common they are
pub const FIRMWARE_VERSIONS: [&str; 9] = ["0.51", "0.52", "0.6", "0.6", "0.6", "0.7", "0.7", "0.7", "0.7"];

/// Mobile operators weighted by market share
pub const OPERATORS: [&str; 8] = ["O2", "O2", "O2", "EE", "EE", "EE", "EE", "EE"];

const FIRST_NAMES: [&str; 24] = [
    "Alice", "Bob", "Charlie", "Diana", "Edward", "Fiona", "George", "Hannah", "Ian", "Julia",
    "Kevin", "Laura", "Michael", "Nina", "Oliver", "Priya", "Quentin", "Rachel", "Samuel", "Tara",
    "Umar", "Victoria", "William", "Yasmin",
];

const LAST_NAMES: [&str; 23] = [
    "Smith", "Jones", "Taylor", "Brown", "Williams", "Wilson", "Johnson", "Davies", "Robinson",
    "Wright", "Thompson", "Evans", "Walker", "White", "Roberts", "Green", "Hall", "Wood", "Jackson",
    "Clarke", "Patel", "Khan", "Lewis",
];

/// First name of the owner of device number `n`
///
/// Names depend only on `n`, so the same device number always gets the same
/// owner.
pub fn first_name(n: usize) -> &'static str {
    FIRST_NAMES[n % FIRST_NAMES.len()]
}

/// Last name of the owner of device number `n`
pub fn last_name(n: usize) -> &'static str {
    // Table lengths are coprime so first/last pairs only repeat every 552 devices
    LAST_NAMES[n % LAST_NAMES.len()]
}

/// Signal strength for a radio goodness between 0 (bad) and 1 (good)
pub fn rssi_for(goodness: f64) -> f64 {
    (1.0 - goodness) * (BAD_RSSI - GOOD_RSSI) + GOOD_RSSI
}

/// Generator for the initial attributes of new devices
#[derive(Debug, Clone, Default)]
pub struct DeviceGenerator {
    created: usize,
}

impl DeviceGenerator {
    /// Create a generator numbering devices from 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `existing` devices
    pub fn starting_at(existing: usize) -> Self {
        Self { created: existing }
    }

    /// Number the next device will get
    pub fn next_number(&self) -> usize {
        self.created
    }

    /// A random MAC-style identifier
    pub fn random_id(rng: &mut RandomSource) -> DeviceId {
        let mut bytes = [0u8; 6];
        for b in bytes.iter_mut() {
            *b = rng.byte();
        }
        DeviceId::from_mac(bytes)
    }

    /// Properties for the next device, placed at `location` (`lon`, `lat`)
    pub fn synthesize(&mut self, location: (f64, f64), rng: &mut RandomSource) -> Map<String, Value> {
        let number = self.created;
        self.created += 1;

        let first = first_name(number);
        let last = last_name(number);
        let firmware = rng.choose(&FIRMWARE_VERSIONS).copied().unwrap_or(FIRMWARE_VERSIONS[0]);
        let operator = rng.choose(&OPERATORS).copied().unwrap_or(OPERATORS[0]);
        let goodness = if operator == "O2" { rng.skewed_high() } else { rng.skewed() };

        let mut props = Map::new();
        props.insert("is_demo_device".into(), json!(true));
        props.insert("label".into(), json!(format!("Thing {}", number)));
        props.insert("longitude".into(), json!(location.0));
        props.insert("latitude".into(), json!(location.1));
        props.insert("first_name".into(), json!(first));
        props.insert("last_name".into(), json!(last));
        props.insert("full_name".into(), json!(format!("{} {}", first, last)));
        props.insert("factoryFirmware".into(), json!(firmware));
        props.insert("firmware".into(), json!(firmware));
        props.insert("operator".into(), json!(operator));
        props.insert("rssi".into(), json!(rssi_for(goodness)));
        props.insert("battery".into(), json!(FULL_BATTERY));
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rssi_bounds() {
        assert_eq!(rssi_for(1.0), GOOD_RSSI);
        assert_eq!(rssi_for(0.0), BAD_RSSI);
        assert_eq!(rssi_for(0.5), -85.0);
    }

    #[test]
    fn test_names_are_deterministic() {
        assert_eq!(first_name(0), "Alice");
        assert_eq!(last_name(0), "Smith");
        assert_eq!(first_name(25), first_name(1));
        assert_eq!(last_name(24), last_name(1));
    }

    #[test]
    fn test_synthesized_properties() {
        let mut generator = DeviceGenerator::new();
        let mut rng = RandomSource::new(12345);
        let props = generator.synthesize((-1.5, 53.0), &mut rng);

        assert_eq!(props["label"], json!("Thing 0"));
        assert_eq!(props["full_name"], json!("Alice Smith"));
        assert_eq!(props["is_demo_device"], json!(true));
        assert_eq!(props["battery"], json!(100.0));
        assert_eq!(props["longitude"], json!(-1.5));
        assert_eq!(props["firmware"], props["factoryFirmware"]);

        let firmware = props["firmware"].as_str().unwrap();
        assert!(FIRMWARE_VERSIONS.contains(&firmware));
        let operator = props["operator"].as_str().unwrap();
        assert!(OPERATORS.contains(&operator));
        let rssi = props["rssi"].as_f64().unwrap();
        assert!((BAD_RSSI..=GOOD_RSSI).contains(&rssi));

        assert_eq!(generator.next_number(), 1);
        let second = generator.synthesize((0.0, 0.0), &mut rng);
        assert_eq!(second["label"], json!("Thing 1"));
    }

    #[test]
    fn test_random_id_format() {
        let mut rng = RandomSource::new(1);
        let id = DeviceGenerator::random_id(&mut rng);
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 6);
        assert!(parts.iter().all(|p| p.len() == 2));
    }
}
