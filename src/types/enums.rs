//! Enumeration types for the fleet simulator
//!
//! This module contains the small typed vocabularies parsed out of scenario
//! parameters: time specifications, flush criteria, initial actions and area
//! descriptions.

use chrono::DateTime;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::ConfigError;

/// A point on the virtual timeline as written in a scenario
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    /// Current wall-clock time
    Now,
    /// Seconds since the Unix epoch
    At(f64),
}

impl TimeSpec {
    /// Parse a time specification for the option `key`
    ///
    /// Accepts the literal `"now"`, a number of epoch seconds (as a number or a
    /// numeric string) or an RFC 3339 timestamp.
    pub fn parse(key: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|t| t.is_finite())
                .map(TimeSpec::At)
                .ok_or_else(|| ConfigError::invalid(key, format!("{} is not a usable timestamp", n))),
            Value::String(s) => Self::parse_str(key, s),
            other => Err(ConfigError::invalid(
                key,
                format!("expected \"now\", epoch seconds or an RFC 3339 timestamp, got {}", other),
            )),
        }
    }

    /// Parse a time specification from text
    pub fn parse_str(key: &str, text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("now") {
            return Ok(TimeSpec::Now);
        }
        if let Ok(seconds) = text.parse::<f64>() {
            if seconds.is_finite() {
                return Ok(TimeSpec::At(seconds));
            }
        }
        DateTime::parse_from_rfc3339(text)
            .map(|dt| {
                TimeSpec::At(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9)
            })
            .map_err(|_| {
                ConfigError::invalid(
                    key,
                    format!("'{}' is neither \"now\", epoch seconds nor an RFC 3339 timestamp", text),
                )
            })
    }
}

impl Serialize for TimeSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TimeSpec::Now => serializer.serialize_str("now"),
            TimeSpec::At(t) => serializer.serialize_f64(*t),
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Now => write!(f, "now"),
            TimeSpec::At(t) => write!(f, "{}", t),
        }
    }
}

/// When queued device updates are handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueCriterion {
    /// Flush after every update
    Interactive,
    /// Flush once `queue_limit` updates are queued
    Messages,
    /// Flush once `queue_limit` wall-clock seconds have passed
    Time,
}

impl FromStr for QueueCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(QueueCriterion::Interactive),
            "messages" => Ok(QueueCriterion::Messages),
            "time" => Ok(QueueCriterion::Time),
            _ => Err(format!(
                "unknown queue criterion '{}' (expected interactive, messages or time)",
                s
            )),
        }
    }
}

impl fmt::Display for QueueCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueCriterion::Interactive => "interactive",
            QueueCriterion::Messages => "messages",
            QueueCriterion::Time => "time",
        };
        write!(f, "{}", name)
    }
}

/// How the fleet is populated before the simulation starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialAction {
    /// Install a fresh population over the install timespan
    #[default]
    CreateFresh,
    /// Load previously exported device properties and create nothing new
    LoadExisting,
}

impl InitialAction {
    /// Parse the `initial_action` option; an absent value creates a fresh fleet
    pub fn parse(key: &str, value: Option<&str>) -> Result<Self, ConfigError> {
        match value {
            None | Some("create") => Ok(InitialAction::CreateFresh),
            Some("loadExisting") => Ok(InitialAction::LoadExisting),
            Some(other @ ("deleteExisting" | "deleteDemo")) => Err(ConfigError::invalid(
                key,
                format!("'{}' needs backend deletion, which this build does not provide", other),
            )),
            Some(other) => Err(ConfigError::invalid(
                key,
                format!("unknown initial action '{}' (expected loadExisting or none)", other),
            )),
        }
    }
}

impl Serialize for InitialAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            InitialAction::CreateFresh => serializer.serialize_none(),
            InitialAction::LoadExisting => serializer.serialize_str("loadExisting"),
        }
    }
}

/// A place given either by name or by coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Place {
    /// Free-form address resolved through a geocoder
    Address(String),
    /// Longitude and latitude in degrees
    Coordinates([f64; 2]),
}

impl Place {
    /// Parse a place for the option `key`
    pub fn parse(key: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Place::Address(s.trim().to_string())),
            Value::Array(items) if items.len() == 2 => {
                let lon = items[0].as_f64();
                let lat = items[1].as_f64();
                match (lon, lat) {
                    (Some(lon), Some(lat)) if (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat) => {
                        Ok(Place::Coordinates([lon, lat]))
                    }
                    _ => Err(ConfigError::invalid(key, "coordinates must be [longitude, latitude] in degrees")),
                }
            }
            other => Err(ConfigError::invalid(
                key,
                format!("expected an address or [longitude, latitude], got {}", other),
            )),
        }
    }
}

/// Radius of the area devices are spread over
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AreaRadius {
    /// Radius in degrees
    Degrees(f64),
    /// Distance from the centre to another place
    ToPlace(Place),
}

impl AreaRadius {
    /// Parse the `area_radius` option
    pub fn parse(key: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(r) if r.is_finite() && r > 0.0 => Ok(AreaRadius::Degrees(r)),
                _ => Err(ConfigError::invalid(key, "radius must be a positive number of degrees")),
            },
            other => Place::parse(key, other).map(AreaRadius::ToPlace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_time_spec_now() {
        assert_eq!(TimeSpec::parse("start_time", &json!("now")).unwrap(), TimeSpec::Now);
        assert_eq!(TimeSpec::parse("start_time", &json!("NOW")).unwrap(), TimeSpec::Now);
    }

    #[test]
    fn test_time_spec_numbers() {
        assert_eq!(TimeSpec::parse("start_time", &json!(1000)).unwrap(), TimeSpec::At(1000.0));
        assert_eq!(TimeSpec::parse("start_time", &json!("1500.5")).unwrap(), TimeSpec::At(1500.5));
    }

    #[test]
    fn test_time_spec_rfc3339() {
        let spec = TimeSpec::parse("start_time", &json!("2017-01-01T00:00:00Z")).unwrap();
        assert_eq!(spec, TimeSpec::At(1_483_228_800.0));
    }

    #[test]
    fn test_time_spec_rejects_garbage() {
        let error = TimeSpec::parse("start_time", &json!("yesterday")).unwrap_err();
        assert!(error.to_string().contains("start_time"));
        assert!(TimeSpec::parse("end_time", &json!(true)).is_err());
    }

    #[test]
    fn test_queue_criterion_parsing() {
        assert_eq!("interactive".parse::<QueueCriterion>().unwrap(), QueueCriterion::Interactive);
        assert_eq!("Messages".parse::<QueueCriterion>().unwrap(), QueueCriterion::Messages);
        assert_eq!("time".parse::<QueueCriterion>().unwrap(), QueueCriterion::Time);
        assert!("sometimes".parse::<QueueCriterion>().is_err());
    }

    #[test]
    fn test_initial_action_parsing() {
        assert_eq!(InitialAction::parse("initial_action", None).unwrap(), InitialAction::CreateFresh);
        assert_eq!(
            InitialAction::parse("initial_action", Some("loadExisting")).unwrap(),
            InitialAction::LoadExisting
        );
        assert!(InitialAction::parse("initial_action", Some("deleteDemo")).is_err());
        assert!(InitialAction::parse("initial_action", Some("explode")).is_err());
    }

    #[test]
    fn test_place_parsing() {
        assert_eq!(
            Place::parse("area_centre", &json!("Cambridge, UK")).unwrap(),
            Place::Address("Cambridge, UK".to_string())
        );
        assert_eq!(
            Place::parse("area_centre", &json!([0.12, 52.2])).unwrap(),
            Place::Coordinates([0.12, 52.2])
        );
        assert!(Place::parse("area_centre", &json!([500.0, 52.2])).is_err());
        assert!(Place::parse("area_centre", &json!(7)).is_err());
    }

    #[test]
    fn test_area_radius_parsing() {
        assert_eq!(AreaRadius::parse("area_radius", &json!(2.5)).unwrap(), AreaRadius::Degrees(2.5));
        assert_eq!(
            AreaRadius::parse("area_radius", &json!("Hamburg, Germany")).unwrap(),
            AreaRadius::ToPlace(Place::Address("Hamburg, Germany".to_string()))
        );
        assert!(AreaRadius::parse("area_radius", &json!(-1)).is_err());
    }
}
