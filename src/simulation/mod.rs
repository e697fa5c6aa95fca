//! Discrete-event simulation core
//!
//! This module contains the virtual clock, the event queue, the scheduler
//! that drives events through a world, and the run orchestrator, together
//! with logging setup, statistics and error handling.
//!
//! # Overview
//!
//! - **VirtualClock**: simulated time, readable from any thread
//! - **EventQueue**: time-ordered, thread-safe queue of pending events
//! - **Scheduler**: dispatches events in order, idling in live runs
//! - **FleetOrchestrator**: wires a scenario to a scheduler and a fleet
//! - **RunStatistics**: counters reported at the end of a run
//!
//! # Usage Example
//!
//! ```rust
//! use fleet_synth::simulation::*;
//! use fleet_synth::types::TimeSpec;
//!
//! let mut clock = VirtualClock::new();
//! clock.set_start(TimeSpec::At(1000.0));
//! clock.set_end(Some(TimeSpec::At(2000.0)));
//! assert!(!clock.is_live());
//!
//! let mut rng = RandomSource::new(42);
//! let u = rng.uniform();
//! assert!((0.0..1.0).contains(&u));
//! ```

pub mod clock;
pub mod error;
pub mod event;
pub mod event_queue;
pub mod logging;
pub mod orchestrator;
pub mod random;
pub mod scheduler;
pub mod statistics;

// Re-export all public types for convenience
pub use clock::{ClockReader, ManualClock, SystemClock, VirtualClock, WallClock};
pub use error::*;
pub use event::*;
pub use event_queue::*;
pub use logging::*;
pub use orchestrator::*;
pub use random::*;
pub use scheduler::*;
pub use statistics::*;
