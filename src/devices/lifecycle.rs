//! Device lifecycle events
//!
//! Each device runs up to two self-rescheduling chains: battery depletion and
//! comms up/down sampling. External triggers arrive through the scheduler
//! handle and are filtered, delayed and finally applied to one device.

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::devices::device::FULL_BATTERY;
use crate::devices::{FleetPayload, FleetWorld};
use crate::simulation::{Dispatch, EventPayload, HandlerError, RandomSource, Scheduler, SimulationResult};
use crate::types::{ConfigError, DeviceId, DeviceIndex, InitialAction};

type FleetDispatch<'a> = Dispatch<'a, FleetWorld>;

/// Sorted install times for `count` devices spread over `timespan` seconds
/// from `start`
pub fn install_schedule(start: f64, timespan: f64, count: usize, rng: &mut RandomSource) -> Vec<f64> {
    let mut times: Vec<f64> = (0..count).map(|_| start + rng.uniform() * timespan).collect();
    times.sort_by(f64::total_cmp);
    times
}

/// Queue the events that populate the fleet
///
/// A fresh fleet gets one install event per device. `loadExisting` registers
/// the exported devices straight away and queues nothing. Returns the number
/// of events queued.
#[instrument(skip_all, fields(action = ?world.config().initial_action))]
pub fn seed_initial_events(world: &mut FleetWorld, scheduler: &Scheduler<FleetWorld>) -> SimulationResult<usize> {
    let now = scheduler.clock().now();
    match world.config().initial_action {
        InitialAction::CreateFresh => {
            let count = world.config().device_count;
            let timespan = world.config().install_timespan;
            let times = install_schedule(now, timespan, count, world.rng());
            let mut queued = 0;
            for t in times {
                if scheduler.schedule_at(t, install_device, FleetPayload::Install)? {
                    queued += 1;
                }
            }
            info!(queued, devices = count, timespan, "Scheduled device installs");
            Ok(queued)
        }
        InitialAction::LoadExisting => {
            let path = world
                .config()
                .existing_devices
                .clone()
                .ok_or_else(|| ConfigError::missing("existing_devices"))?;
            world.load_existing_file(&path, now)?;
            Ok(0)
        }
    }
}

/// Install one device and start its lifecycle chains
pub fn install_device(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, payload: FleetPayload) -> Result<(), HandlerError> {
    if payload != FleetPayload::Install {
        return Err(HandlerError::malformed(format!("install got {}", payload.kind())));
    }
    let now = ctx.now();
    let index = world.install_device(now)?;
    start_battery(world, ctx, index)?;
    start_comms(world, ctx, index)?;
    Ok(())
}

fn start_battery(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, index: DeviceIndex) -> Result<(), HandlerError> {
    let expires = ctx.now() + world.sample_battery_life();
    world.device_mut(index)?.battery.expires_at = Some(expires);
    ctx.schedule_at(expires, battery_depleted, FleetPayload::BatteryDepleted(index))?;
    Ok(())
}

fn start_comms(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, index: DeviceIndex) -> Result<(), HandlerError> {
    if world.config().comms_reliability >= 1.0 {
        return Ok(());
    }
    let period = world.config().comms_up_down_period;
    ctx.schedule_in(period, comms_check, FleetPayload::CommsCheck(index))?;
    Ok(())
}

/// A battery runs out; fit a fresh one if auto-replace is on
pub fn battery_depleted(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, payload: FleetPayload) -> Result<(), HandlerError> {
    let index = match payload {
        FleetPayload::BatteryDepleted(index) => index,
        other => return Err(HandlerError::malformed(format!("battery event got {}", other.kind()))),
    };
    let now = ctx.now();
    let autoreplace = world.config().battery_autoreplace;

    let device = world.device_mut(index)?;
    let update = device.set(now, "battery", Value::from(0));
    device.battery.depleted = true;
    device.battery.expires_at = None;
    world.post(update);
    world.counters_mut().batteries_depleted += 1;
    debug!(device = %index, "Battery depleted");

    if autoreplace {
        let device = world.device_mut(index)?;
        let update = device.set(now, "battery", Value::from(FULL_BATTERY));
        device.battery.depleted = false;
        device.battery.replacements += 1;
        world.post(update);
        world.counters_mut().batteries_replaced += 1;
        start_battery(world, ctx, index)?;
    }
    Ok(())
}

/// Sample whether a device is reachable for the next period
pub fn comms_check(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, payload: FleetPayload) -> Result<(), HandlerError> {
    let index = match payload {
        FleetPayload::CommsCheck(index) => index,
        other => return Err(HandlerError::malformed(format!("comms event got {}", other.kind()))),
    };
    let reliability = world.config().comms_reliability;
    if reliability >= 1.0 {
        return Ok(());
    }

    let up = world.rng().chance(reliability);
    let released = world.device_mut(index)?.set_comms(up);
    if !released.is_empty() {
        debug!(device = %index, released = released.len(), "Comms restored, releasing held updates");
    }
    world.post_all(released);

    let counters = world.counters_mut();
    counters.comms_checks += 1;
    if !up {
        counters.comms_outages += 1;
    }

    let period = world.config().comms_up_down_period;
    ctx.schedule_in(period, comms_check, FleetPayload::CommsCheck(index))?;
    Ok(())
}

/// Whether an external payload is meant for this instance
pub fn accepts_trigger(payload: &Value, instance_name: &str) -> bool {
    payload.get("action").and_then(Value::as_str) == Some("event")
        && payload.pointer("/headers/Instancename").and_then(Value::as_str) == Some(instance_name)
}

/// Delay before a triggered event takes effect, drawn from `[min, max)`
///
/// Collapses to exactly `min` when `max <= min`.
pub fn response_delay(min: f64, max: f64, rng: &mut RandomSource) -> f64 {
    let u = rng.uniform();
    if max <= min {
        return min;
    }
    min + u * (max - min)
}

/// Filter an external trigger and schedule its effect after a random delay
pub fn external_trigger(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, payload: FleetPayload) -> Result<(), HandlerError> {
    let body = match payload {
        FleetPayload::ExternalTrigger(body) => body,
        other => return Err(HandlerError::malformed(format!("trigger got {}", other.kind()))),
    };
    if !accepts_trigger(&body, &world.config().instance_name) {
        world.counters_mut().triggers_ignored += 1;
        debug!("Ignoring external trigger for another instance");
        return Ok(());
    }

    let (min, max) = (world.config().web_response_min, world.config().web_response_max);
    let delay = response_delay(min, max, world.rng());
    world.counters_mut().triggers_accepted += 1;
    debug!(delay, "Accepted external trigger");
    ctx.schedule_in(delay, external_event, FleetPayload::ExternalEvent(body))?;
    Ok(())
}

/// Apply an accepted external event to the device it names
///
/// The device is named by `$id` and the changes by `properties`, either at
/// the top level of the payload or inside its `body`.
pub fn external_event(world: &mut FleetWorld, ctx: &mut FleetDispatch<'_>, payload: FleetPayload) -> Result<(), HandlerError> {
    let message = match payload {
        FleetPayload::ExternalEvent(message) => message,
        other => return Err(HandlerError::malformed(format!("external event got {}", other.kind()))),
    };
    let target = match message.get("body") {
        Some(body) if body.is_object() => body,
        _ => &message,
    };
    let id = target
        .get("$id")
        .and_then(Value::as_str)
        .map(DeviceId::from)
        .ok_or_else(|| HandlerError::malformed("external event has no $id"))?;
    let properties = match target.get("properties") {
        None => Default::default(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => return Err(HandlerError::malformed(format!("properties must be an object, got {}", other))),
    };

    let now = ctx.now();
    let update = world.device_by_id_mut(&id)?.apply(now, properties);
    world.post(update);
    world.counters_mut().external_events += 1;
    info!(device = %id, "Applied external event");
    Ok(())
}
