//! Run orchestrator
//!
//! Wires a [`ScenarioConfig`] to a clock, a fleet world, an output sink and a
//! scheduler, seeds the initial events and runs the whole thing.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::devices::{seed_initial_events, CachedGeocoder, FleetWorld, Gazetteer, PointPicker};
use crate::output::{open_sink, OutputSink};
use crate::simulation::clock::{format_time, SystemClock, VirtualClock, WallClock};
use crate::simulation::{RunStatistics, Scheduler, SchedulerHandle, SimulationResult};
use crate::trigger::TriggerHandle;
use crate::types::ScenarioConfig;

/// Main controller for one simulation run
#[derive(Debug)]
pub struct FleetOrchestrator {
    scheduler: Scheduler<FleetWorld>,
    world: FleetWorld,
    seeded: usize,
}

impl FleetOrchestrator {
    /// Set up a run writing to the configured output, against the system clock
    #[instrument(skip(config), fields(instance = %config.instance_name))]
    pub fn from_config(config: ScenarioConfig) -> SimulationResult<Self> {
        let wall: Arc<dyn WallClock> = Arc::new(SystemClock);
        let sink = open_sink(&config, Arc::clone(&wall))?;
        Self::with_sink(config, sink, wall)
    }

    /// Set up a run with an explicit sink and wall clock
    pub fn with_sink(
        config: ScenarioConfig,
        sink: Box<dyn OutputSink>,
        wall: Arc<dyn WallClock>,
    ) -> SimulationResult<Self> {
        config.validate()?;

        let mut clock = VirtualClock::with_wall_clock(wall);
        let start = clock.set_start(config.start_time);
        clock.set_end(config.end_time);

        let mut geocoder = CachedGeocoder::new(Gazetteer::default());
        let picker = PointPicker::from_area(
            config.area_centre.as_ref(),
            config.area_radius.as_ref(),
            &mut geocoder,
        )?;

        let scheduler = Scheduler::new(clock)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        info!(
            instance = %config.instance_name,
            start = %format_time(start),
            end = ?scheduler.clock().end_time().map(format_time),
            seed = config.random_seed,
            "Initializing fleet simulation"
        );

        let mut world = FleetWorld::new(config, picker, sink);
        let seeded = seed_initial_events(&mut world, &scheduler)?;

        Ok(Self { scheduler, world, seeded })
    }

    /// Events queued before the run started
    pub fn seeded(&self) -> usize {
        self.seeded
    }

    /// The fleet
    pub fn world(&self) -> &FleetWorld {
        &self.world
    }

    /// The scheduler
    pub fn scheduler(&self) -> &Scheduler<FleetWorld> {
        &self.scheduler
    }

    /// Handle for stopping the run from another thread
    pub fn handle(&self) -> SchedulerHandle<FleetWorld> {
        self.scheduler.handle()
    }

    /// Entry point for external triggers
    pub fn trigger(&self) -> TriggerHandle {
        TriggerHandle::new(self.scheduler.handle())
    }

    /// Run to completion and tell the sink the run is over
    #[instrument(skip_all, fields(instance = %self.world.config().instance_name))]
    pub fn run(&mut self) -> SimulationResult<RunStatistics> {
        let outcome = self.scheduler.run(&mut self.world);
        if let Err(e) = self.world.finish() {
            warn!(error = %e, "Could not finalize output");
        }
        let statistics = outcome?;
        info!(
            installed = self.world.counters().devices_installed,
            depleted = self.world.counters().batteries_depleted,
            external = self.world.counters().external_events,
            "Fleet simulation finished"
        );
        Ok(statistics)
    }

    /// Give up the orchestrator and keep the fleet
    pub fn into_world(self) -> FleetWorld {
        self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{CollectingSink, FlushPolicy};
    use crate::simulation::clock::ManualClock;
    use crate::types::{ConfigError, InitialAction, Place, TimeSpec};
    use crate::simulation::SimulationError;

    fn bounded(devices: usize) -> ScenarioConfig {
        ScenarioConfig {
            device_count: devices,
            start_time: TimeSpec::At(1_483_228_800.0),
            end_time: Some(TimeSpec::At(1_483_228_800.0 + 3600.0)),
            ..ScenarioConfig::default()
        }
    }

    fn orchestrator(config: ScenarioConfig) -> SimulationResult<(FleetOrchestrator, CollectingSink)> {
        let sink = CollectingSink::new(FlushPolicy::from_config(&config));
        let wall = Arc::new(ManualClock::new(0.0));
        FleetOrchestrator::with_sink(config, Box::new(sink.clone()), wall).map(|o| (o, sink))
    }

    #[test]
    fn test_orchestrator_runs_bounded_scenario() {
        let (mut orchestrator, sink) = orchestrator(bounded(5)).unwrap();
        assert_eq!(orchestrator.seeded(), 5);

        let stats = orchestrator.run().unwrap();
        assert_eq!(orchestrator.world().counters().devices_installed, 5);
        // Five installs then five battery depletions within the hour
        assert!(stats.events_processed >= 5);
        assert!(sink.updates().len() >= 5);
        assert!(!sink.is_interactive());
    }

    #[test]
    fn test_orchestrator_rejects_invalid_config() {
        let config = ScenarioConfig { comms_reliability: 1.5, ..bounded(1) };
        let error = orchestrator(config).unwrap_err();
        assert!(matches!(error, SimulationError::Config(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn test_orchestrator_requires_both_area_options() {
        let config = ScenarioConfig { area_centre: Some(Place::Coordinates([0.0, 51.5])), ..bounded(1) };
        assert!(orchestrator(config).is_err());
    }

    #[test]
    fn test_load_existing_queues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, r#"[{"$id": "00-00-00-00-00-01", "label": "Old"}]"#).unwrap();

        let config = ScenarioConfig {
            initial_action: InitialAction::LoadExisting,
            existing_devices: Some(path.to_string_lossy().into_owned()),
            ..bounded(3)
        };
        let (mut orchestrator, _) = orchestrator(config).unwrap();
        assert_eq!(orchestrator.seeded(), 0);
        assert_eq!(orchestrator.world().registry().len(), 1);

        let stats = orchestrator.run().unwrap();
        assert_eq!(stats.events_processed, 0);
    }

    #[test]
    fn test_zero_length_run_creates_nothing() {
        let config = ScenarioConfig { end_time: Some(TimeSpec::At(1_483_228_800.0)), ..bounded(10) };
        let (mut orchestrator, sink) = orchestrator(config).unwrap();
        assert_eq!(orchestrator.seeded(), 0);

        let stats = orchestrator.run().unwrap();
        assert_eq!(stats.events_processed, 0);
        assert!(orchestrator.into_world().registry().is_empty());
        assert!(sink.updates().is_empty());
    }
}
