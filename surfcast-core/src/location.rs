use serde::{Deserialize, Deserializer, Serialize};

/// A named geographic point used to select and query model output.
///
/// Longitude is always stored in degrees east, 0..360, which is the
/// convention of the upstream model grids. Fields are only set through
/// [`Location::new`] or deserialization, both of which normalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    name: String,
    latitude: f64,
    #[serde(deserialize_with = "deserialize_longitude")]
    longitude: f64,
    /// Elevation in meters. For a wave point this is the water depth at
    /// the grid point; zero means unknown.
    #[serde(default)]
    elevation: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude: normalize_longitude(longitude),
            elevation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees east, 0..360.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    /// Longitude in the signed -180..180 convention, for display.
    pub fn signed_longitude(&self) -> f64 {
        if self.longitude > 180.0 {
            self.longitude - 360.0
        } else {
            self.longitude
        }
    }

    /// Water depth in meters, if known.
    pub fn depth(&self) -> Option<f64> {
        let depth = self.elevation.abs();
        (depth > 0.0).then_some(depth)
    }
}

/// Map any longitude in degrees onto 0..360 east.
pub fn normalize_longitude(longitude: f64) -> f64 {
    longitude.rem_euclid(360.0)
}

fn deserialize_longitude<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(deserializer).map(normalize_longitude)
}

/// The three points a surf forecast is built from.
///
/// Waves are sampled offshore where the wave model resolves the swell, wind
/// is sampled at the coast, and the forecast is labelled with the break
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Site {
    pub forecast: Location,
    pub wave: Location,
    pub wind: Location,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            forecast: Location::new("Narragansett", 41.395, -71.453, 0.0),
            wave: Location::new("Block Island Sound", 41.323, 360.0 - 71.396, 30.0),
            wind: Location::new("Narragansett Pier", 41.6, 360.0 - 71.5, 10.0),
        }
    }
}

impl Site {
    pub fn locations(&self) -> [(&'static str, &Location); 3] {
        [
            ("forecast", &self.forecast),
            ("wave", &self.wave),
            ("wind", &self.wind),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longitudes_are_normalized_to_east() {
        assert!((normalize_longitude(-71.453) - 288.547).abs() < 1e-9);
        assert_eq!(normalize_longitude(360.0), 0.0);
        assert_eq!(normalize_longitude(45.0), 45.0);

        let loc = Location::new("x", 10.0, -10.0, 0.0);
        assert_eq!(loc.longitude(), 350.0);
        assert_eq!(loc.signed_longitude(), -10.0);
    }

    #[test]
    fn deserialized_longitude_is_normalized() {
        let loc: Location =
            toml::from_str("name = \"Point Judith\"\nlatitude = 41.36\nlongitude = -71.48\n")
                .expect("valid location");

        assert!((loc.longitude() - 288.52).abs() < 1e-9);
        assert_eq!(loc.elevation(), 0.0);
        assert_eq!(loc.depth(), None);
    }

    #[test]
    fn site_points_from_toml_are_normalized() {
        let site: Site = toml::from_str(
            "[wave]\nname = \"Block Island Sound\"\nlatitude = 41.323\nlongitude = -71.396\nelevation = 30.0\n",
        )
        .expect("valid site");

        assert!((site.wave.longitude() - 288.604).abs() < 1e-9);
        assert!((site.wave.signed_longitude() + 71.396).abs() < 1e-9);
        assert_eq!(site.wind, Site::default().wind);
    }

    #[test]
    fn default_site_uses_known_points() {
        let site = Site::default();
        assert_eq!(site.wave.depth(), Some(30.0));
        assert_eq!(site.wind.name(), "Narragansett Pier");
        assert!(site.locations().iter().all(|(_, l)| l.longitude() >= 0.0));
    }
}
