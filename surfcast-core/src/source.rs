//! Upstream model sources and request construction.
//!
//! Every source is a NOAA NOMADS OPeNDAP product queried through the GrADS
//! data server's ASCII interface, which lets a single request select a time
//! window at one grid point.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

use crate::{error::ForecastError, location::Location, model::Variable};

pub const NOMADS_BASE_URL: &str = "https://nomads.ncep.noaa.gov/dods";

/// Hours between model cycles (00z, 06z, 12z, 18z).
const CYCLE_HOURS: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Wave,
    Wind,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Wave => "wave",
            ModelFamily::Wind => "wind",
        }
    }

    pub const fn all() -> &'static [ModelFamily] {
        &[ModelFamily::Wave, ModelFamily::Wind]
    }

    /// Variables a sample must carry to be usable.
    pub fn required_variables(&self) -> &'static [Variable] {
        match self {
            ModelFamily::Wave => &[
                Variable::WaveHeight,
                Variable::WavePeriod,
                Variable::WaveDirection,
            ],
            ModelFamily::Wind => &[Variable::WindU, Variable::WindV],
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl TryFrom<&str> for ModelFamily {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "wave" => Ok(ModelFamily::Wave),
            "wind" => Ok(ModelFamily::Wind),
            _ => Err(anyhow::anyhow!(
                "Unknown model family '{value}'. Supported families: wave, wind."
            )),
        }
    }
}

/// Regular latitude/longitude grid, longitudes in degrees east.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_step: f64,
    pub lon_step: f64,
}

impl Grid {
    fn lon_count(&self) -> usize {
        ((self.lon_max - self.lon_min) / self.lon_step).round() as usize + 1
    }

    fn wraps(&self) -> bool {
        self.lon_max + self.lon_step >= self.lon_min + 360.0
    }

    pub fn contains(&self, location: &Location) -> bool {
        let lat_ok = (self.lat_min..=self.lat_max).contains(&location.latitude());
        let lon_ok = self.wraps() || (self.lon_min..=self.lon_max).contains(&location.longitude());
        lat_ok && lon_ok
    }

    /// Indices of the grid point nearest to `location`, as (lat, lon).
    pub fn nearest_index(&self, location: &Location) -> (usize, usize) {
        let lat = ((location.latitude() - self.lat_min) / self.lat_step)
            .round()
            .max(0.0) as usize;
        let lon = ((location.longitude() - self.lon_min) / self.lon_step)
            .round()
            .max(0.0) as usize;

        if self.wraps() {
            (lat, lon % self.lon_count())
        } else {
            (lat, lon.min(self.lon_count() - 1))
        }
    }
}

/// One upstream numerical model product.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSource {
    pub name: &'static str,
    pub family: ModelFamily,
    pub description: &'static str,
    /// Dataset path below the server root, e.g. `wave/gfswave`.
    pub dataset: &'static str,
    /// Prefix of the dated run directory, e.g. `gfs` in `gfs20240901`.
    pub run_dir_prefix: &'static str,
    pub grid: Grid,
    pub time_step_hours: u32,
    /// Hours after a cycle's nominal time before its output is published.
    pub publish_delay_hours: u32,
    /// Server-side variable names and what they hold.
    pub variables: &'static [(&'static str, Variable)],
}

impl ModelSource {
    /// Newest cycle whose output should be available at `now`.
    pub fn latest_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ready = now - Duration::hours(i64::from(self.publish_delay_hours));
        let secs = ready.timestamp();
        let cycle_secs = secs - secs.rem_euclid(CYCLE_HOURS * 3600);

        DateTime::from_timestamp(cycle_secs, 0).unwrap_or(ready)
    }

    /// Build the ASCII OPeNDAP request for hours `start_hour..=end_hour` of
    /// `run` at the grid point nearest to `location`.
    pub fn create_url(
        &self,
        location: &Location,
        start_hour: u32,
        end_hour: u32,
        run: DateTime<Utc>,
    ) -> String {
        let step = self.time_step_hours.max(1);
        let (t0, t1) = (start_hour / step, end_hour / step);
        let (lat, lon) = self.grid.nearest_index(location);

        let mut query = format!("time[{t0}:{t1}]");
        for (name, _) in self.variables {
            query.push_str(&format!(",{name}[{t0}:{t1}][{lat}][{lon}]"));
        }

        format!(
            "{}/{}/{}{}/{}_{}z.ascii?{}",
            NOMADS_BASE_URL,
            self.dataset,
            self.run_dir_prefix,
            run.format("%Y%m%d"),
            self.name,
            run.format("%H"),
            query,
        )
    }

    pub fn variable_for(&self, server_name: &str) -> Option<Variable> {
        self.variables
            .iter()
            .find(|(name, _)| *name == server_name)
            .map(|(_, v)| *v)
    }
}

const WAVE_VARIABLES: &[(&str, Variable)] = &[
    ("htsgwsfc", Variable::WaveHeight),
    ("perpwsfc", Variable::WavePeriod),
    ("dirpwsfc", Variable::WaveDirection),
];

const WIND_VARIABLES: &[(&str, Variable)] = &[
    ("ugrd10m", Variable::WindU),
    ("vgrd10m", Variable::WindV),
];

const GLOBAL_QUARTER_DEGREE: Grid = Grid {
    lat_min: -90.0,
    lat_max: 90.0,
    lon_min: 0.0,
    lon_max: 359.75,
    lat_step: 0.25,
    lon_step: 0.25,
};

/// Sources in resolution order: the first one of a family whose grid
/// contains a location serves it.
pub fn default_sources() -> Vec<ModelSource> {
    vec![
        ModelSource {
            name: "gfswave.atlocn.0p16",
            family: ModelFamily::Wave,
            description: "GFS-Wave western North Atlantic, 1/6 degree",
            dataset: "wave/gfswave",
            run_dir_prefix: "",
            grid: Grid {
                lat_min: 0.0,
                lat_max: 55.0,
                lon_min: 260.0,
                lon_max: 310.0,
                lat_step: 1.0 / 6.0,
                lon_step: 1.0 / 6.0,
            },
            time_step_hours: 1,
            publish_delay_hours: 5,
            variables: WAVE_VARIABLES,
        },
        ModelSource {
            name: "gfswave.global.0p25",
            family: ModelFamily::Wave,
            description: "GFS-Wave global, 1/4 degree",
            dataset: "wave/gfswave",
            run_dir_prefix: "",
            grid: GLOBAL_QUARTER_DEGREE,
            time_step_hours: 1,
            publish_delay_hours: 5,
            variables: WAVE_VARIABLES,
        },
        ModelSource {
            name: "gfs_0p25_1hr",
            family: ModelFamily::Wind,
            description: "GFS atmospheric, 1/4 degree, hourly",
            dataset: "gfs_0p25_1hr",
            run_dir_prefix: "gfs",
            grid: GLOBAL_QUARTER_DEGREE,
            time_step_hours: 1,
            publish_delay_hours: 5,
            variables: WIND_VARIABLES,
        },
    ]
}

/// Lookup table from location to the source serving each model family.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    sources: Vec<ModelSource>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(default_sources())
    }
}

impl ModelRegistry {
    pub fn new(sources: Vec<ModelSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[ModelSource] {
        &self.sources
    }

    /// Pick the source serving `family` at `location`.
    ///
    /// Only fails for a location no registered source covers, which is a
    /// configuration defect to surface at startup.
    pub fn resolve(
        &self,
        location: &Location,
        family: ModelFamily,
    ) -> Result<&ModelSource, ForecastError> {
        self.sources
            .iter()
            .find(|s| s.family == family && s.grid.contains(location))
            .ok_or_else(|| {
                ForecastError::Config(format!(
                    "no {family} model covers '{}' ({}, {})",
                    location.name(),
                    location.latitude(),
                    location.longitude()
                ))
            })
    }
}
