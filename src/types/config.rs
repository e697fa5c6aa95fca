//! Configuration structures for the fleet simulator
//!
//! Scenario parameters arrive as a flat mapping merged from JSON scenario files
//! and `key=value` overrides. This module loads that mapping, turns it into a
//! typed [`ScenarioConfig`] and validates it before the simulation starts.

use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::{AreaRadius, InitialAction, Place, QueueCriterion, TimeSpec};

/// Directory searched for scenario files that are not found as given
pub const SCENARIO_DIR: &str = "scenarios";

/// Smallest mean battery life, in seconds, accepted with auto-replace on
pub const MIN_REPLACED_BATTERY_LIFE: f64 = 1.0;

/// Option names understood by [`ScenarioConfig::from_params`]
pub const KNOWN_OPTIONS: &[&str] = &[
    "instance_name",
    "initial_action",
    "existing_devices",
    "device_count",
    "start_time",
    "end_time",
    "install_timespan",
    "battery_life_mu",
    "battery_life_sigma",
    "battery_autoreplace",
    "comms_reliability",
    "comms_up_down_period",
    "queue_criterion",
    "queue_limit",
    "web_response_min",
    "web_response_max",
    "web_listen",
    "area_centre",
    "area_radius",
    "random_seed",
    "output",
    "poll_interval_ms",
];

/// Command line arguments structure
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fleet-synth",
    version,
    about = "Fleet Synth - Generates synthetic IoT device fleets and streams their state",
    long_about = "Generates a population of virtual IoT devices, evolves their battery, connectivity and attributes over a virtual timeline, and streams the resulting updates as JSON lines.

EXAMPLES:
    # Run the default scenario (10 devices, live)
    fleet-synth

    # Layer scenario files, later files override earlier ones
    fleet-synth base.json demo.json

    # Override individual options
    fleet-synth demo.json device_count=50 end_time=2017-01-02T00:00:00Z

    # Print the default scenario as a template
    fleet-synth --print-config > my-scenario.json

    # Validate a scenario without running it
    fleet-synth my-scenario.json --dry-run

PARAMETERS:
    Each positional argument is either a JSON scenario file or a key=value
    override. Files are merged first, in order, then overrides are applied.
    Files are looked up as given and then under scenarios/. Lines may carry
    # comments."
)]
pub struct CliArgs {
    /// Scenario files and key=value overrides
    #[arg(value_name = "PARAM", help = "Scenario JSON file or key=value override")]
    pub params: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, help = "Enable debug logging")]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, value_name = "DIR", help = "Write logs to daily rolling files in DIR")]
    pub log_dir: Option<String>,

    /// Dry run mode - validate configuration without running simulation
    #[arg(long, help = "Validate the scenario without running the simulation")]
    pub dry_run: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print the default scenario in JSON format and exit")]
    pub print_config: bool,
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Scenario file not found
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),

    /// Scenario file read error
    #[error("Failed to read scenario file '{path}': {source}")]
    ReadError {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("Failed to parse scenario file '{path}': {source}")]
    JsonError {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Scenario file holds something other than an object
    #[error("Scenario file '{0}' must contain a JSON object")]
    NotAnObject(String),

    /// A `key=value` argument without a key
    #[error("Malformed override '{0}' (expected key=value)")]
    MalformedOverride(String),

    /// An option has an unusable value
    #[error("Invalid value for option '{key}': {reason}")]
    InvalidOption {
        /// Offending option
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required option is absent
    #[error("Missing required option '{0}'")]
    MissingOption(String),
}

impl ConfigError {
    /// Create an invalid option error
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption { key: key.into(), reason: reason.into() }
    }

    /// Create a missing option error
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingOption(key.into())
    }

    /// The option this error is about, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidOption { key, .. } => Some(key),
            ConfigError::MissingOption(key) => Some(key),
            _ => None,
        }
    }
}

/// Remove `#` comments that run to the end of a line
///
/// A `#` inside a JSON string literal is kept.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;

    for c in text.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                out.push(c);
            }
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '#' => in_comment = true,
            '"' => {
                in_string = true;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Flat mapping of scenario parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    values: Map<String, Value>,
}

impl ParameterSet {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Load parameters from command line arguments
    ///
    /// Arguments containing `=` are overrides, everything else names a
    /// scenario file. Files are merged in order, overrides are applied after
    /// all files.
    pub fn load(args: &[String]) -> Result<Self, ConfigError> {
        let mut params = Self::new();
        let (overrides, files): (Vec<&String>, Vec<&String>) =
            args.iter().partition(|arg| arg.contains('='));

        for file in files {
            let path = resolve_scenario_file(file)?;
            params.merge_file(&path)?;
        }
        for arg in overrides {
            params.apply_override(arg)?;
        }
        Ok(params)
    }

    /// Merge a scenario file, its keys replacing existing ones
    pub fn merge_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadError { path: display.clone(), source })?;
        self.merge_json(&content, &display)
    }

    /// Merge scenario text; `origin` names it in errors
    pub fn merge_json(&mut self, content: &str, origin: &str) -> Result<(), ConfigError> {
        let stripped = strip_comments(content);
        let value: Value = serde_json::from_str(&stripped)
            .map_err(|source| ConfigError::JsonError { path: origin.to_string(), source })?;
        match value {
            Value::Object(map) => {
                self.values.extend(map);
                Ok(())
            }
            _ => Err(ConfigError::NotAnObject(origin.to_string())),
        }
    }

    /// Apply a `key=value` override
    ///
    /// Only the first `=` splits, so `a=b=c` sets `a` to `b=c`. The value is
    /// read as JSON when it parses, otherwise kept as a string.
    pub fn apply_override(&mut self, arg: &str) -> Result<(), ConfigError> {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedOverride(arg.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::MalformedOverride(arg.to_string()));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Set a single parameter
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Parameters sorted by key
    pub fn sorted(&self) -> Vec<(&String, &Value)> {
        let mut entries: Vec<_> = self.values.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Keys that no option recognizes
    pub fn unknown_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .values
            .keys()
            .map(String::as_str)
            .filter(|key| !KNOWN_OPTIONS.contains(key))
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameter is set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ConfigError::invalid(key, e.to_string())),
        }
    }

    fn present(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }
}

/// Find a scenario file as given, then under [`SCENARIO_DIR`]
pub fn resolve_scenario_file(name: &str) -> Result<PathBuf, ConfigError> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }
    let fallback = Path::new(SCENARIO_DIR).join(name);
    if fallback.is_file() {
        return Ok(fallback);
    }
    Err(ConfigError::FileNotFound(name.to_string()))
}

/// Configuration for a fleet simulation run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioConfig {
    /// Name of this run, used for log files and to filter external triggers
    pub instance_name: String,

    /// How the fleet is populated
    pub initial_action: InitialAction,

    /// JSON file of device property maps loaded by `loadExisting`
    pub existing_devices: Option<String>,

    /// Number of devices to install
    pub device_count: usize,

    /// Start of the virtual timeline
    pub start_time: TimeSpec,

    /// End of the virtual timeline; `None` runs live
    pub end_time: Option<TimeSpec>,

    /// Window (seconds) over which devices are installed
    pub install_timespan: f64,

    /// Mean battery life (seconds)
    pub battery_life_mu: f64,

    /// Battery life standard deviation (seconds)
    pub battery_life_sigma: f64,

    /// Fit a fresh battery when one runs out
    pub battery_autoreplace: bool,

    /// Probability a device is reachable in any comms period (0.0-1.0)
    pub comms_reliability: f64,

    /// Length (seconds) of one comms period
    pub comms_up_down_period: f64,

    /// Flush criterion handed to the output sink
    pub queue_criterion: QueueCriterion,

    /// Threshold for the flush criterion
    pub queue_limit: f64,

    /// Minimum delay (seconds) before an external trigger takes effect
    pub web_response_min: f64,

    /// Maximum delay (seconds) before an external trigger takes effect
    pub web_response_max: f64,

    /// Address for the external trigger listener, e.g. `127.0.0.1:5555`
    pub web_listen: Option<String>,

    /// Centre of the deployment area
    pub area_centre: Option<Place>,

    /// Radius of the deployment area
    pub area_radius: Option<AreaRadius>,

    /// Seed for the random source
    pub random_seed: u64,

    /// File receiving device updates; stdout when absent
    pub output: Option<String>,

    /// Longest the scheduler blocks while idle (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            instance_name: "default".to_string(),
            initial_action: InitialAction::CreateFresh,
            existing_devices: None,
            device_count: 10,
            start_time: TimeSpec::Now,
            end_time: None,
            install_timespan: 60.0,
            battery_life_mu: 300.0,
            battery_life_sigma: 60.0,
            battery_autoreplace: false,
            comms_reliability: 1.0,
            comms_up_down_period: 43_200.0,
            queue_criterion: QueueCriterion::Interactive,
            queue_limit: 1.0,
            web_response_min: 3.0,
            web_response_max: 10.0,
            web_listen: None,
            area_centre: None,
            area_radius: None,
            random_seed: 12345,
            output: None,
            poll_interval_ms: 250,
        }
    }
}

impl ScenarioConfig {
    /// Build a configuration from command line arguments
    pub fn from_cli_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let params = ParameterSet::load(&args.params)?;
        Self::from_params(&params)
    }

    /// Build a configuration from merged parameters, starting from defaults
    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let initial_action = InitialAction::parse(
            "initial_action",
            params.typed::<String>("initial_action")?.as_deref(),
        )?;

        let start_time = match params.present("start_time") {
            Some(value) => TimeSpec::parse("start_time", value)?,
            None => defaults.start_time,
        };
        let end_time = match params.present("end_time") {
            Some(value) => Some(TimeSpec::parse("end_time", value)?),
            None => defaults.end_time,
        };

        let comms_reliability = match params.present("comms_reliability") {
            Some(value) => parse_comms_reliability("comms_reliability", value)?,
            None => defaults.comms_reliability,
        };

        let queue_criterion = match params.typed::<String>("queue_criterion")? {
            Some(text) => text
                .parse::<QueueCriterion>()
                .map_err(|reason| ConfigError::invalid("queue_criterion", reason))?,
            None => defaults.queue_criterion,
        };

        let area_centre = match params.present("area_centre") {
            Some(value) => Some(Place::parse("area_centre", value)?),
            None => defaults.area_centre,
        };
        let area_radius = match params.present("area_radius") {
            Some(value) => Some(AreaRadius::parse("area_radius", value)?),
            None => defaults.area_radius,
        };

        Ok(Self {
            instance_name: params.typed("instance_name")?.unwrap_or(defaults.instance_name),
            initial_action,
            existing_devices: params.typed("existing_devices")?.or(defaults.existing_devices),
            device_count: params.typed("device_count")?.unwrap_or(defaults.device_count),
            start_time,
            end_time,
            install_timespan: params.typed("install_timespan")?.unwrap_or(defaults.install_timespan),
            battery_life_mu: params.typed("battery_life_mu")?.unwrap_or(defaults.battery_life_mu),
            battery_life_sigma: params
                .typed("battery_life_sigma")?
                .unwrap_or(defaults.battery_life_sigma),
            battery_autoreplace: params
                .typed("battery_autoreplace")?
                .unwrap_or(defaults.battery_autoreplace),
            comms_reliability,
            comms_up_down_period: params
                .typed("comms_up_down_period")?
                .unwrap_or(defaults.comms_up_down_period),
            queue_criterion,
            queue_limit: params.typed("queue_limit")?.unwrap_or(defaults.queue_limit),
            web_response_min: params.typed("web_response_min")?.unwrap_or(defaults.web_response_min),
            web_response_max: params.typed("web_response_max")?.unwrap_or(defaults.web_response_max),
            web_listen: params.typed("web_listen")?.or(defaults.web_listen),
            area_centre,
            area_radius,
            random_seed: params.typed("random_seed")?.unwrap_or(defaults.random_seed),
            output: params.typed("output")?.or(defaults.output),
            poll_interval_ms: params.typed("poll_interval_ms")?.unwrap_or(defaults.poll_interval_ms),
        })
    }

    /// Print configuration as JSON
    pub fn print_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid("<scenario>", e.to_string()))
    }

    /// Whether the run has no end time and idles for external triggers
    pub fn is_live(&self) -> bool {
        self.end_time.is_none()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_name.trim().is_empty() {
            return Err(ConfigError::invalid("instance_name", "must not be empty"));
        }

        self.validate_non_negative("install_timespan", self.install_timespan)?;
        self.validate_non_negative("battery_life_mu", self.battery_life_mu)?;
        self.validate_non_negative("battery_life_sigma", self.battery_life_sigma)?;
        if self.battery_autoreplace && self.battery_life_mu < MIN_REPLACED_BATTERY_LIFE {
            return Err(ConfigError::invalid(
                "battery_life_mu",
                format!(
                    "must be at least {} second when battery_autoreplace is on, got {}",
                    MIN_REPLACED_BATTERY_LIFE, self.battery_life_mu
                ),
            ));
        }
        self.validate_fraction("comms_reliability", self.comms_reliability)?;

        if !(self.comms_up_down_period.is_finite() && self.comms_up_down_period > 0.0) {
            return Err(ConfigError::invalid(
                "comms_up_down_period",
                format!("must be a positive number of seconds, got {}", self.comms_up_down_period),
            ));
        }

        self.validate_non_negative("queue_limit", self.queue_limit)?;
        if self.queue_criterion == QueueCriterion::Messages && self.queue_limit < 1.0 {
            return Err(ConfigError::invalid(
                "queue_limit",
                "must be at least 1 when queue_criterion is messages",
            ));
        }

        self.validate_non_negative("web_response_min", self.web_response_min)?;
        self.validate_non_negative("web_response_max", self.web_response_max)?;
        if self.web_response_max < self.web_response_min {
            return Err(ConfigError::invalid(
                "web_response_max",
                format!(
                    "must not be below web_response_min ({} < {})",
                    self.web_response_max, self.web_response_min
                ),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be greater than 0"));
        }

        if let (TimeSpec::At(start), Some(TimeSpec::At(end))) = (self.start_time, self.end_time) {
            if end < start {
                return Err(ConfigError::invalid(
                    "end_time",
                    format!("end ({}) is before start ({})", end, start),
                ));
            }
        }

        if self.initial_action == InitialAction::LoadExisting && self.existing_devices.is_none() {
            return Err(ConfigError::missing("existing_devices"));
        }

        Ok(())
    }

    fn validate_non_negative(&self, field: &str, value: f64) -> Result<(), ConfigError> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::invalid(
                field,
                format!("must be a non-negative number, got {}", value),
            ));
        }
        Ok(())
    }

    fn validate_fraction(&self, field: &str, value: f64) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::invalid(
                field,
                format!("{} is not between 0.0 and 1.0", value),
            ));
        }
        Ok(())
    }
}

/// Parse `comms_reliability`
///
/// A number (or numeric string) is the per-period probability of being up.
/// Named policy strings are reserved and rejected.
pub fn parse_comms_reliability(key: &str, value: &Value) -> Result<f64, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ConfigError::invalid(key, format!("{} is not a usable fraction", n))),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            ConfigError::invalid(key, format!("unrecognised reliability specification '{}'", s))
        }),
        other => Err(ConfigError::invalid(
            key,
            format!("expected a fraction or a specification string, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    fn params(pairs: &[(&str, Value)]) -> ParameterSet {
        let mut set = ParameterSet::new();
        for (key, value) in pairs {
            set.set(*key, value.clone());
        }
        set
    }

    #[test]
    fn test_scenario_config_default() {
        let config = ScenarioConfig::default();

        assert_eq!(config.instance_name, "default");
        assert_eq!(config.initial_action, InitialAction::CreateFresh);
        assert_eq!(config.device_count, 10);
        assert_eq!(config.start_time, TimeSpec::Now);
        assert!(config.end_time.is_none());
        assert!(config.is_live());
        assert_eq!(config.install_timespan, 60.0);
        assert_eq!(config.battery_life_mu, 300.0);
        assert_eq!(config.battery_life_sigma, 60.0);
        assert_eq!(config.comms_reliability, 1.0);
        assert_eq!(config.queue_criterion, QueueCriterion::Interactive);
        assert_eq!(config.queue_limit, 1.0);
        assert_eq!(config.web_response_min, 3.0);
        assert_eq!(config.web_response_max, 10.0);
        assert_eq!(config.random_seed, 12345);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_params_overrides_defaults() {
        let set = params(&[
            ("device_count", json!(5)),
            ("start_time", json!(1000)),
            ("end_time", json!("2000")),
            ("comms_reliability", json!("0.75")),
            ("queue_criterion", json!("messages")),
            ("queue_limit", json!(20)),
        ]);
        let config = ScenarioConfig::from_params(&set).unwrap();

        assert_eq!(config.device_count, 5);
        assert_eq!(config.start_time, TimeSpec::At(1000.0));
        assert_eq!(config.end_time, Some(TimeSpec::At(2000.0)));
        assert!(!config.is_live());
        assert_eq!(config.comms_reliability, 0.75);
        assert_eq!(config.queue_criterion, QueueCriterion::Messages);
        assert_eq!(config.queue_limit, 20.0);
        // Untouched options keep their defaults
        assert_eq!(config.battery_life_mu, 300.0);
    }

    #[test]
    fn test_null_end_time_means_live() {
        let set = params(&[("end_time", Value::Null)]);
        let config = ScenarioConfig::from_params(&set).unwrap();
        assert!(config.is_live());
    }

    #[test]
    fn test_invalid_option_names_key() {
        let set = params(&[("device_count", json!("lots"))]);
        let error = ScenarioConfig::from_params(&set).unwrap_err();
        assert_eq!(error.key(), Some("device_count"));
        assert!(error.to_string().contains("device_count"));
    }

    #[test]
    fn test_comms_reliability_spec_string_rejected() {
        let set = params(&[("comms_reliability", json!("weekday-outages"))]);
        let error = ScenarioConfig::from_params(&set).unwrap_err();
        assert_eq!(error.key(), Some("comms_reliability"));
    }

    #[test]
    fn test_apply_override_parses_json_values() {
        let mut set = ParameterSet::new();
        set.apply_override("device_count=7").unwrap();
        set.apply_override("start_time=now").unwrap();
        set.apply_override("instance_name=a=b").unwrap();
        set.apply_override("battery_autoreplace=true").unwrap();

        assert_eq!(set.get("device_count"), Some(&json!(7)));
        assert_eq!(set.get("start_time"), Some(&json!("now")));
        assert_eq!(set.get("instance_name"), Some(&json!("a=b")));
        assert_eq!(set.get("battery_autoreplace"), Some(&json!(true)));
        assert!(set.apply_override("=5").is_err());
    }

    #[test]
    fn test_strip_comments() {
        let text = "{\n  \"a\": 1, # one\n  \"b\": \"#not-a-comment\" # two\n}\n# trailing";
        let stripped = strip_comments(text);
        let value: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["a"], json!(1));
        assert_eq!(value["b"], json!("#not-a-comment"));
    }

    #[test]
    fn test_scenario_file_loading_and_layering() {
        let mut base = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            base,
            "{{\n  # base scenario\n  \"device_count\": 3,\n  \"instance_name\": \"base\"\n}}"
        )
        .unwrap();
        base.flush().unwrap();

        let mut extra = Builder::new().suffix(".json").tempfile().unwrap();
        write!(extra, "{{ \"device_count\": 8, \"end_time\": 5000 }}").unwrap();
        extra.flush().unwrap();

        let args = vec![
            "device_count=12".to_string(),
            base.path().display().to_string(),
            extra.path().display().to_string(),
        ];
        let set = ParameterSet::load(&args).unwrap();
        let config = ScenarioConfig::from_params(&set).unwrap();

        // Overrides win over every file, later files win over earlier ones
        assert_eq!(config.device_count, 12);
        assert_eq!(config.instance_name, "base");
        assert_eq!(config.end_time, Some(TimeSpec::At(5000.0)));
    }

    #[test]
    fn test_missing_scenario_file() {
        let args = vec!["definitely-not-here.json".to_string()];
        match ParameterSet::load(&args) {
            Err(ConfigError::FileNotFound(name)) => assert_eq!(name, "definitely-not-here.json"),
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_scenario_file_must_be_object() {
        let mut set = ParameterSet::new();
        assert!(matches!(set.merge_json("[1, 2]", "list.json"), Err(ConfigError::NotAnObject(_))));
    }

    #[test]
    fn test_unknown_keys_reported() {
        let set = params(&[("device_count", json!(1)), ("devicepilot_key", json!("abc"))]);
        assert_eq!(set.unknown_keys(), vec!["devicepilot_key"]);
    }

    #[test]
    fn test_validation_end_before_start() {
        let config = ScenarioConfig {
            start_time: TimeSpec::At(100.0),
            end_time: Some(TimeSpec::At(50.0)),
            ..ScenarioConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert_eq!(error.key(), Some("end_time"));
    }

    #[test]
    fn test_validation_reliability_range() {
        let config = ScenarioConfig { comms_reliability: 1.5, ..ScenarioConfig::default() };
        assert_eq!(config.validate().unwrap_err().key(), Some("comms_reliability"));
    }

    #[test]
    fn test_validation_web_response_range() {
        let config = ScenarioConfig {
            web_response_min: 10.0,
            web_response_max: 3.0,
            ..ScenarioConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().key(), Some("web_response_max"));
    }

    #[test]
    fn test_validation_zero_battery_life_with_autoreplace() {
        let config = ScenarioConfig {
            battery_life_mu: 0.0,
            battery_life_sigma: 0.0,
            battery_autoreplace: true,
            ..ScenarioConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert_eq!(error.key(), Some("battery_life_mu"));

        let tiny = ScenarioConfig { battery_life_mu: 1e-9, ..config.clone() };
        assert_eq!(tiny.validate().unwrap_err().key(), Some("battery_life_mu"));

        // Without replacement a dead-on-arrival battery fires once and is done
        let once = ScenarioConfig { battery_autoreplace: false, ..config };
        assert!(once.validate().is_ok());
    }

    #[test]
    fn test_validation_load_existing_needs_file() {
        let config = ScenarioConfig {
            initial_action: InitialAction::LoadExisting,
            ..ScenarioConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingOption(_))));
    }

    #[test]
    fn test_print_json_round_trips_through_params() {
        let json = ScenarioConfig::default().print_json().unwrap();
        let mut set = ParameterSet::new();
        set.merge_json(&json, "defaults").unwrap();
        let config = ScenarioConfig::from_params(&set).unwrap();
        assert_eq!(config.device_count, 10);
        assert_eq!(config.start_time, TimeSpec::Now);
        assert!(config.is_live());
    }

    #[test]
    fn test_cli_parsing() {
        let args = CliArgs::try_parse_from(["fleet-synth", "demo.json", "device_count=5", "--verbose"])
            .unwrap();
        assert_eq!(args.params, vec!["demo.json".to_string(), "device_count=5".to_string()]);
        assert!(args.verbose);
        assert!(!args.debug);
        assert!(!args.dry_run);

        let args = CliArgs::try_parse_from(["fleet-synth", "--print-config"]).unwrap();
        assert!(args.params.is_empty());
        assert!(args.print_config);
    }
}
