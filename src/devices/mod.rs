//! Device modelling
//!
//! This module holds everything about the simulated devices: their state,
//! how new ones are synthesized and placed, the registry that owns them, and
//! the lifecycle events that change them over time.
//!
//! # Overview
//!
//! - **DeviceState**: properties, battery and comms state of one device
//! - **DeviceRegistry**: all devices, addressable by index or `$id`
//! - **DeviceGenerator** and **PointPicker**: synthesize new devices
//! - **FleetWorld**: the state lifecycle events act on
//! - **lifecycle**: install, battery, comms and external-event actions
//!
//! # Usage Example
//!
//! ```rust
//! use fleet_synth::devices::*;
//! use fleet_synth::simulation::RandomSource;
//!
//! let mut rng = RandomSource::new(7);
//! let times = install_schedule(1000.0, 60.0, 4, &mut rng);
//! assert_eq!(times.len(), 4);
//! assert!(times.windows(2).all(|w| w[0] <= w[1]));
//! ```

pub mod device;
pub mod generator;
pub mod geo;
pub mod lifecycle;
pub mod registry;
pub mod world;

pub use device::*;
pub use generator::*;
pub use geo::*;
pub use lifecycle::*;
pub use registry::*;
pub use world::*;
