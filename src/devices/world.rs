//! The fleet world
//!
//! [`FleetWorld`] is the state the scheduler's events act on: the device
//! registry, the random source, the deployment area and the output sink.

use serde_json::Value;
use std::fs;
use tracing::{debug, info, warn};

use crate::devices::{DeviceGenerator, DeviceRegistry, DeviceState, DeviceUpdate, PointPicker};
use crate::output::OutputSink;
use crate::simulation::{EventPayload, FlushError, HandlerError, RandomSource, World};
use crate::types::{ConfigError, DeviceId, DeviceIndex, ScenarioConfig};

/// Attempts at drawing an unused device id
const MAX_ID_ATTEMPTS: usize = 16;

/// What a fleet event carries
#[derive(Debug, Clone, PartialEq)]
pub enum FleetPayload {
    /// Install one new device
    Install,
    /// A device's battery runs out
    BatteryDepleted(DeviceIndex),
    /// Re-sample a device's comms state for the next period
    CommsCheck(DeviceIndex),
    /// An external trigger as received, not yet filtered
    ExternalTrigger(Value),
    /// An accepted external event, due now
    ExternalEvent(Value),
}

impl EventPayload for FleetPayload {
    fn kind(&self) -> &'static str {
        match self {
            FleetPayload::Install => "install",
            FleetPayload::BatteryDepleted(_) => "battery_depleted",
            FleetPayload::CommsCheck(_) => "comms_check",
            FleetPayload::ExternalTrigger(_) => "external_trigger",
            FleetPayload::ExternalEvent(_) => "external_event",
        }
    }

    fn chain(&self) -> Option<u64> {
        // Two chains per device: battery on even ids, comms on odd ones
        match self {
            FleetPayload::BatteryDepleted(index) => Some(index.0 as u64 * 2),
            FleetPayload::CommsCheck(index) => Some(index.0 as u64 * 2 + 1),
            _ => None,
        }
    }
}

/// Counters kept by the fleet world
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetCounters {
    /// Devices created during the run
    pub devices_installed: usize,
    /// Devices loaded from an export
    pub devices_loaded: usize,
    /// Batteries that ran out
    pub batteries_depleted: usize,
    /// Fresh batteries fitted
    pub batteries_replaced: usize,
    /// Comms periods sampled
    pub comms_checks: usize,
    /// Comms periods a device spent down
    pub comms_outages: usize,
    /// External triggers accepted
    pub triggers_accepted: usize,
    /// External triggers filtered out
    pub triggers_ignored: usize,
    /// External events applied to a device
    pub external_events: usize,
}

/// Simulated fleet acted on by lifecycle events
#[derive(Debug)]
pub struct FleetWorld {
    config: ScenarioConfig,
    rng: RandomSource,
    registry: DeviceRegistry,
    generator: DeviceGenerator,
    picker: PointPicker,
    sink: Box<dyn OutputSink>,
    counters: FleetCounters,
}

impl FleetWorld {
    /// Create an empty fleet
    pub fn new(config: ScenarioConfig, picker: PointPicker, sink: Box<dyn OutputSink>) -> Self {
        let rng = RandomSource::new(config.random_seed);
        Self {
            config,
            rng,
            registry: DeviceRegistry::new(),
            generator: DeviceGenerator::new(),
            picker,
            sink,
            counters: FleetCounters::default(),
        }
    }

    /// Scenario configuration
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// All devices
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The random source
    pub fn rng(&mut self) -> &mut RandomSource {
        &mut self.rng
    }

    /// Counters gathered so far
    pub fn counters(&self) -> &FleetCounters {
        &self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut FleetCounters {
        &mut self.counters
    }

    /// The output sink
    pub fn sink(&self) -> &dyn OutputSink {
        self.sink.as_ref()
    }

    /// A device by index, for actions
    pub fn device_mut(&mut self, index: DeviceIndex) -> Result<&mut DeviceState, HandlerError> {
        self.registry.get_mut(index).ok_or(HandlerError::UnknownDevice(index.0))
    }

    /// A device by id, for actions
    pub fn device_by_id_mut(&mut self, id: &DeviceId) -> Result<&mut DeviceState, HandlerError> {
        self.registry
            .find_mut(id)
            .ok_or_else(|| HandlerError::DeviceNotFound(id.to_string()))
    }

    /// Hand an update to the sink, if there is one
    pub fn post(&mut self, update: Option<DeviceUpdate>) {
        if let Some(update) = update {
            self.sink.post(update);
        }
    }

    /// Hand several updates to the sink in order
    pub fn post_all(&mut self, updates: Vec<DeviceUpdate>) {
        for update in updates {
            self.sink.post(update);
        }
    }

    /// Sample a battery life in seconds, never negative
    pub fn sample_battery_life(&mut self) -> f64 {
        self.rng
            .normal(self.config.battery_life_mu, self.config.battery_life_sigma)
            .max(0.0)
    }

    /// Create a new device at time `now` and post its initial state
    pub fn install_device(&mut self, now: f64) -> Result<DeviceIndex, HandlerError> {
        let location = self.picker.pick(&mut self.rng);
        let properties = self.generator.synthesize(location, &mut self.rng);

        let id = self.unused_id()?;
        let index = self
            .registry
            .add(id.clone(), properties, now)
            .ok_or_else(|| HandlerError::failed(format!("device id {} already registered", id)))?;
        let snapshot = self.registry.get(index).map(DeviceState::snapshot);
        self.post(snapshot);
        self.counters.devices_installed += 1;
        debug!(id = %id, index = %index, "Installed device");
        Ok(index)
    }

    fn unused_id(&mut self) -> Result<DeviceId, HandlerError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = DeviceGenerator::random_id(&mut self.rng);
            if !self.registry.contains_id(&id) {
                return Ok(id);
            }
            debug!(id = %id, "Device id already taken, drawing another");
        }
        Err(HandlerError::failed("could not draw an unused device id"))
    }

    /// Register previously exported devices
    ///
    /// Each entry must be an object with a string `$id`. Loaded devices are
    /// not posted and get no lifecycle events, but external events reach them.
    pub fn load_existing(&mut self, devices: Vec<Value>, now: f64) -> Result<usize, ConfigError> {
        let mut loaded = 0;
        for (position, entry) in devices.into_iter().enumerate() {
            let properties = match entry {
                Value::Object(map) => map,
                other => {
                    return Err(ConfigError::invalid(
                        "existing_devices",
                        format!("entry {} is not an object: {}", position, other),
                    ))
                }
            };
            let id = properties
                .get("$id")
                .and_then(Value::as_str)
                .map(DeviceId::from)
                .ok_or_else(|| {
                    ConfigError::invalid("existing_devices", format!("entry {} has no string $id", position))
                })?;
            if self.registry.add(id.clone(), properties, now).is_none() {
                warn!(id = %id, "Skipping duplicate device in export");
                continue;
            }
            loaded += 1;
        }
        self.generator = DeviceGenerator::starting_at(self.registry.len());
        self.counters.devices_loaded += loaded;
        info!(loaded, "Loaded existing devices");
        Ok(loaded)
    }

    /// Register devices from a JSON file holding an array of property maps
    pub fn load_existing_file(&mut self, path: &str, now: f64) -> Result<usize, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadError { path: path.to_string(), source })?;
        let devices: Vec<Value> = serde_json::from_str(&content)
            .map_err(|source| ConfigError::JsonError { path: path.to_string(), source })?;
        self.load_existing(devices, now)
    }

    /// Tell the sink the run is over
    pub fn finish(&mut self) -> Result<(), FlushError> {
        self.sink.recalc_historical()
    }
}

impl World for FleetWorld {
    type Payload = FleetPayload;

    fn flush_if_ready(&mut self, _now: f64) -> Result<usize, FlushError> {
        self.sink.flush_if_ready()
    }

    fn flush_now(&mut self, _now: f64) -> Result<usize, FlushError> {
        self.sink.flush_now()
    }

    fn enter_interactive(&mut self) {
        if let Err(e) = self.sink.enter_interactive() {
            warn!(error = %e, "Sink failed to enter interactive mode");
        }
    }
}
