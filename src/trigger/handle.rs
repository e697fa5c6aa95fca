//! In-process trigger entry point

use serde_json::Value;
use tracing::debug;

use crate::devices::{external_trigger, FleetPayload, FleetWorld};
use crate::simulation::{SchedulerHandle, SchedulerState};

/// Queues external triggers on a running scheduler
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    scheduler: SchedulerHandle<FleetWorld>,
}

impl TriggerHandle {
    /// Wrap a scheduler handle
    pub fn new(scheduler: SchedulerHandle<FleetWorld>) -> Self {
        Self { scheduler }
    }

    /// Queue an external payload to be handled as soon as possible
    ///
    /// Returns `false` once the scheduler has terminated.
    pub fn on_external_event(&self, payload: Value) -> bool {
        let queued = self
            .scheduler
            .inject_now(external_trigger, FleetPayload::ExternalTrigger(payload));
        debug!(queued, now = self.scheduler.now(), "External trigger received");
        queued
    }

    /// Whether triggers are still accepted
    pub fn is_open(&self) -> bool {
        self.scheduler.state() != SchedulerState::Terminated
    }

    /// Stop the scheduler this handle feeds
    pub fn stop(&self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::PointPicker;
    use crate::output::{CollectingSink, FlushPolicy};
    use crate::simulation::{ManualClock, Scheduler, VirtualClock};
    use crate::types::{ScenarioConfig, TimeSpec};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_trigger_refused_after_run() {
        let mut clock = VirtualClock::with_wall_clock(Arc::new(ManualClock::new(0.0)));
        clock.set_start(TimeSpec::At(100.0));
        clock.set_end(Some(TimeSpec::At(200.0)));
        let mut scheduler: Scheduler<FleetWorld> = Scheduler::new(clock);
        let trigger = TriggerHandle::new(scheduler.handle());

        assert!(trigger.is_open());
        assert!(trigger.on_external_event(json!({"action": "event"})));
        assert_eq!(scheduler.pending(), 1);

        let config = ScenarioConfig { device_count: 0, ..ScenarioConfig::default() };
        let sink = CollectingSink::new(FlushPolicy::interactive());
        let mut world = FleetWorld::new(config, PointPicker::uk(), Box::new(sink));
        scheduler.run(&mut world).unwrap();

        assert_eq!(world.counters().triggers_ignored, 1);
        assert!(!trigger.is_open());
        assert!(!trigger.on_external_event(json!({"action": "event"})));
    }
}
