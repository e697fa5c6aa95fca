//! Geography: address lookup and device placement
//!
//! Devices are scattered uniformly over a disc around a centre point. The
//! centre and the radius may be given as coordinates or as addresses, which
//! are resolved through a [`Geocoder`].

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;
use tracing::{debug, info};

use crate::simulation::RandomSource;
use crate::types::{AreaRadius, ConfigError, Place};

/// Default centre when no area is configured: roughly the middle of the UK
pub const DEFAULT_CENTRE: (f64, f64) = (-2.0, 54.0);

/// Default radius in degrees
pub const DEFAULT_RADIUS: f64 = 3.5;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two `(lon, lat)` points
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = a;
    let (lon2, lat2) = b;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Resolves addresses to `(lon, lat)`
pub trait Geocoder: fmt::Debug {
    /// Look up an address
    fn locate(&mut self, address: &str) -> Option<(f64, f64)>;
}

/// Offline geocoder backed by a fixed table of places
#[derive(Debug, Clone)]
pub struct Gazetteer {
    places: HashMap<String, (f64, f64)>,
}

impl Gazetteer {
    /// An empty gazetteer
    pub fn empty() -> Self {
        Self { places: HashMap::new() }
    }

    /// Add or replace a place; lookups ignore case and surrounding space
    pub fn with_place(mut self, name: &str, lon: f64, lat: f64) -> Self {
        self.places.insert(normalize(name), (lon, lat));
        self
    }

    /// Number of known places
    pub fn len(&self) -> usize {
        self.places.len()
    }

    /// Whether no place is known
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::empty()
            .with_place("UK", -2.0, 54.0)
            .with_place("United Kingdom", -2.0, 54.0)
            .with_place("London, UK", -0.1276, 51.5072)
            .with_place("Cambridge, UK", 0.1218, 52.2053)
            .with_place("Oxford, UK", -1.2577, 51.752)
            .with_place("Manchester, UK", -2.2426, 53.4808)
            .with_place("Edinburgh, UK", -3.1883, 55.9533)
            .with_place("Cardiff, UK", -3.1791, 51.4816)
            .with_place("Belfast, UK", -5.9301, 54.5973)
            .with_place("Berlin, Germany", 13.405, 52.52)
            .with_place("Hamburg, Germany", 9.9937, 53.5511)
            .with_place("Munich, Germany", 11.582, 48.1351)
            .with_place("Paris, France", 2.3522, 48.8566)
            .with_place("Amsterdam, Netherlands", 4.9041, 52.3676)
            .with_place("Madrid, Spain", -3.7038, 40.4168)
            .with_place("New York, USA", -74.006, 40.7128)
            .with_place("San Francisco, USA", -122.4194, 37.7749)
            .with_place("Seattle, USA", -122.3321, 47.6062)
    }
}

impl Geocoder for Gazetteer {
    fn locate(&mut self, address: &str) -> Option<(f64, f64)> {
        self.places.get(&normalize(address)).copied()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Remembers every answer of the wrapped geocoder, misses included
#[derive(Debug)]
pub struct CachedGeocoder<G> {
    inner: G,
    cache: HashMap<String, Option<(f64, f64)>>,
    lookups: usize,
}

impl<G: Geocoder> CachedGeocoder<G> {
    /// Wrap a geocoder
    pub fn new(inner: G) -> Self {
        Self { inner, cache: HashMap::new(), lookups: 0 }
    }

    /// Number of lookups that reached the wrapped geocoder
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    fn locate(&mut self, address: &str) -> Option<(f64, f64)> {
        if let Some(hit) = self.cache.get(address) {
            return *hit;
        }
        self.lookups += 1;
        debug!(address, "Looking up address");
        let found = self.inner.locate(address);
        self.cache.insert(address.to_string(), found);
        found
    }
}

/// Picks device locations uniformly within a disc
#[derive(Debug, Clone, PartialEq)]
pub struct PointPicker {
    centre: (f64, f64),
    radius: f64,
}

impl PointPicker {
    /// Disc around `centre` (`lon`, `lat`) with `radius` in degrees
    pub fn new(centre: (f64, f64), radius: f64) -> Self {
        Self { centre, radius: radius.abs() }
    }

    /// The default area
    pub fn uk() -> Self {
        Self::new(DEFAULT_CENTRE, DEFAULT_RADIUS)
    }

    /// Build from the `area_centre` and `area_radius` options
    ///
    /// Both or neither must be given. Addresses go through `geocoder`; one it
    /// cannot resolve is a configuration error.
    pub fn from_area(
        centre: Option<&Place>,
        radius: Option<&AreaRadius>,
        geocoder: &mut dyn Geocoder,
    ) -> Result<Self, ConfigError> {
        let (centre, radius) = match (centre, radius) {
            (None, None) => return Ok(Self::uk()),
            (Some(_), None) => return Err(ConfigError::missing("area_radius")),
            (None, Some(_)) => return Err(ConfigError::missing("area_centre")),
            (Some(centre), Some(radius)) => (centre, radius),
        };

        let centre = resolve(centre, "area_centre", geocoder)?;
        let radius = match radius {
            AreaRadius::Degrees(r) => *r,
            AreaRadius::ToPlace(place) => {
                let edge = resolve(place, "area_radius", geocoder)?;
                ((edge.0 - centre.0).powi(2) + (edge.1 - centre.1).powi(2)).sqrt()
            }
        };

        let picker = Self::new(centre, radius);
        info!(
            centre = ?picker.centre,
            radius_deg = picker.radius,
            radius_km = picker.radius_km(),
            "Deployment area set"
        );
        Ok(picker)
    }

    /// Centre as `(lon, lat)`
    pub fn centre(&self) -> (f64, f64) {
        self.centre
    }

    /// Radius in degrees
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Approximate radius in kilometres, measured northward
    pub fn radius_km(&self) -> f64 {
        haversine_km(self.centre, (self.centre.0, (self.centre.1 + self.radius).min(90.0)))
    }

    /// A random `(lon, lat)` inside the disc
    pub fn pick(&self, rng: &mut RandomSource) -> (f64, f64) {
        let distance = self.radius * rng.uniform().sqrt();
        let angle = 2.0 * PI * rng.uniform();
        let lon = self.centre.0 + distance * angle.cos();
        let lat = (self.centre.1 + distance * angle.sin()).clamp(-90.0, 90.0);
        (lon, lat)
    }
}

impl Default for PointPicker {
    fn default() -> Self {
        Self::uk()
    }
}

fn resolve(place: &Place, key: &str, geocoder: &mut dyn Geocoder) -> Result<(f64, f64), ConfigError> {
    match place {
        Place::Coordinates([lon, lat]) => Ok((*lon, *lat)),
        Place::Address(address) => geocoder
            .locate(address)
            .ok_or_else(|| ConfigError::invalid(key, format!("cannot locate address '{}'", address))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CountingGeocoder {
        calls: usize,
    }

    impl Geocoder for CountingGeocoder {
        fn locate(&mut self, address: &str) -> Option<(f64, f64)> {
            self.calls += 1;
            (address == "Somewhere").then_some((1.0, 2.0))
        }
    }

    #[test]
    fn test_gazetteer_lookup_ignores_case() {
        let mut gazetteer = Gazetteer::default();
        assert_eq!(gazetteer.locate("cambridge, uk"), Some((0.1218, 52.2053)));
        assert_eq!(gazetteer.locate("  Berlin, Germany "), Some((13.405, 52.52)));
        assert_eq!(gazetteer.locate("Atlantis"), None);
    }

    #[test]
    fn test_cached_geocoder_hits_inner_once() {
        let mut geocoder = CachedGeocoder::new(CountingGeocoder::default());
        assert_eq!(geocoder.locate("Somewhere"), Some((1.0, 2.0)));
        assert_eq!(geocoder.locate("Somewhere"), Some((1.0, 2.0)));
        assert_eq!(geocoder.locate("Nowhere"), None);
        assert_eq!(geocoder.locate("Nowhere"), None);
        assert_eq!(geocoder.lookups(), 2);
        assert_eq!(geocoder.inner.calls, 2);
    }

    #[test]
    fn test_default_area_is_uk() {
        let mut geocoder = Gazetteer::default();
        let picker = PointPicker::from_area(None, None, &mut geocoder).unwrap();
        assert_eq!(picker, PointPicker::uk());
    }

    #[test]
    fn test_area_from_addresses() {
        let mut geocoder = CachedGeocoder::new(Gazetteer::default());
        let centre = Place::Address("Berlin, Germany".into());
        let radius = AreaRadius::ToPlace(Place::Address("Hamburg, Germany".into()));
        let picker = PointPicker::from_area(Some(&centre), Some(&radius), &mut geocoder).unwrap();

        assert_eq!(picker.centre(), (13.405, 52.52));
        let expected = ((9.9937f64 - 13.405).powi(2) + (53.5511f64 - 52.52).powi(2)).sqrt();
        assert!((picker.radius() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_area_needs_both_parts() {
        let mut geocoder = Gazetteer::default();
        let centre = Place::Coordinates([0.0, 51.0]);
        let error = PointPicker::from_area(Some(&centre), None, &mut geocoder).unwrap_err();
        assert_eq!(error.key(), Some("area_radius"));
    }

    #[test]
    fn test_unknown_address_is_config_error() {
        let mut geocoder = Gazetteer::default();
        let centre = Place::Address("Atlantis".into());
        let radius = AreaRadius::Degrees(1.0);
        let error = PointPicker::from_area(Some(&centre), Some(&radius), &mut geocoder).unwrap_err();
        assert_eq!(error.key(), Some("area_centre"));
    }

    #[test]
    fn test_points_fall_inside_disc() {
        let picker = PointPicker::new((10.0, 50.0), 2.0);
        let mut rng = RandomSource::new(42);
        for _ in 0..500 {
            let (lon, lat) = picker.pick(&mut rng);
            let d = ((lon - 10.0).powi(2) + (lat - 50.0).powi(2)).sqrt();
            assert!(d <= 2.0 + 1e-9);
        }
    }

    #[test]
    fn test_haversine() {
        // One degree of latitude is about 111 km
        let d = haversine_km((0.0, 0.0), (0.0, 1.0));
        assert!((d - 111.19).abs() < 0.1);
        assert!(PointPicker::uk().radius_km() > 350.0);
    }
}
