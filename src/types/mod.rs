//! Core types and identifiers for the fleet simulator
//!
//! This module contains fundamental types, identifiers, and configuration structures
//! used throughout the simulation system.
//!
//! # Overview
//!
//! - **Identifiers**: device `$id` values and registry positions
//! - **Enums**: time specifications, flush criteria, initial actions and areas
//! - **Configuration**: scenario parameter loading, validation and CLI support
//!
//! # Usage Example
//!
//! ```rust
//! use fleet_synth::types::*;
//!
//! let mut params = ParameterSet::new();
//! params.apply_override("device_count=25").unwrap();
//! params.apply_override("end_time=2017-01-02T00:00:00Z").unwrap();
//!
//! let config = ScenarioConfig::from_params(&params).unwrap();
//! assert_eq!(config.device_count, 25);
//! assert!(!config.is_live());
//!
//! let id = DeviceId::from_mac([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
//! assert_eq!(id.as_str(), "00-1a-2b-3c-4d-5e");
//! ```

pub mod config;
pub mod enums;
pub mod identifiers;

// Re-export all public types for convenience
pub use config::*;
pub use enums::*;
pub use identifiers::*;
