//! Synthetic IoT fleet simulator
//!
//! Generates realistic device telemetry for an IoT backend: a population of
//! devices is installed over time, their batteries run down and their comms
//! drop in and out, and every change is emitted as a timestamped update.
//!
//! # Overview
//!
//! At the core is a small discrete-event engine. Events sit in a time-ordered
//! queue and a scheduler dispatches them one by one against a world, moving a
//! virtual clock forward as it goes. A run is either bounded, racing through
//! simulated time as fast as possible, or live, catching up with the wall
//! clock and then pacing itself against it while external triggers arrive.
//!
//! ## Key Features
//!
//! - **Deterministic**: one seeded random source drives every decision
//! - **Bounded or live**: historical back-fill or real-time operation
//! - **Device lifecycle**: install, battery depletion and replacement, comms outages
//! - **External triggers**: JSON events injected from other threads or over HTTP
//! - **Batched output**: JSON-lines updates flushed under a configurable policy
//!
//! ## Quick Start
//!
//! ```rust
//! use fleet_synth::output::{CollectingSink, FlushPolicy};
//! use fleet_synth::simulation::{FleetOrchestrator, ManualClock};
//! use fleet_synth::types::{ScenarioConfig, TimeSpec};
//! use std::sync::Arc;
//!
//! let config = ScenarioConfig {
//!     device_count: 3,
//!     start_time: TimeSpec::At(1_483_228_800.0),
//!     end_time: Some(TimeSpec::At(1_483_232_400.0)),
//!     ..Default::default()
//! };
//!
//! let sink = CollectingSink::new(FlushPolicy::from_config(&config));
//! let wall = Arc::new(ManualClock::new(0.0));
//! let mut orchestrator = FleetOrchestrator::with_sink(config, Box::new(sink.clone()), wall)?;
//!
//! let stats = orchestrator.run()?;
//! assert_eq!(orchestrator.world().counters().devices_installed, 3);
//! println!("{}", stats.compact_summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: Identifiers, enums and scenario configuration
//! - [`simulation`]: Clock, event queue, scheduler and run orchestration
//! - [`devices`]: Device state, generation, placement and lifecycle events
//! - [`output`]: Sinks that batch and write device updates
//! - [`trigger`]: Entry points for external triggers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │   Types     │    │  Trigger    │    │   Output    │
//! │             │    │             │    │             │
//! │ Identifiers │    │ Handle      │    │ Sinks       │
//! │ Enums       │    │ Listener    │    │ FlushPolicy │
//! │ Config      │    │             │    │             │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!        ▲                  │                  ▲
//!        │                  ▼                  │
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ Simulation  │    │  Scheduler  │    │  Devices    │
//! │             │    │             │    │             │
//! │ Clock       │───►│ EventQueue  │───►│ FleetWorld  │
//! │ Random      │    │ Dispatch    │    │ Lifecycle   │
//! │ Statistics  │    │             │    │ Registry    │
//! └─────────────┘    └─────────────┘    └─────────────┘
//! ```
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

pub mod devices;
pub mod output;
pub mod simulation;
pub mod trigger;
pub mod types;

// Core types and identifiers
pub use types::{
    ConfigError, DeviceId, DeviceIndex, InitialAction, ParameterSet, QueueCriterion,
    ScenarioConfig, TimeSpec,
};

// Simulation engine
pub use simulation::{
    EventQueue, FleetOrchestrator, RandomSource, RunStatistics, Scheduler, SchedulerHandle,
    SchedulerState, SimulationError, VirtualClock, World,
};

// Devices, output and triggers
pub use devices::{DeviceState, FleetPayload, FleetWorld};
pub use output::{FlushPolicy, JsonLinesSink, OutputSink};
pub use trigger::{TriggerHandle, TriggerListener};
