use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, convert::TryFrom, fmt};

use crate::{location::Location, source::ModelFamily, units::UnitSystem};

/// Category of stored forecast; each kind owns one snapshot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastKind {
    /// Wave and wind combined, with breaking heights.
    Surf,
    /// Wave model output only.
    Wave,
}

impl ForecastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastKind::Surf => "surf",
            ForecastKind::Wave => "wave",
        }
    }

    pub const fn all() -> &'static [ForecastKind] {
        &[ForecastKind::Surf, ForecastKind::Wave]
    }

    /// Model families that must contribute to this kind.
    pub fn families(&self) -> &'static [ModelFamily] {
        match self {
            ForecastKind::Surf => &[ModelFamily::Wave, ModelFamily::Wind],
            ForecastKind::Wave => &[ModelFamily::Wave],
        }
    }

    pub fn needs_wind(&self) -> bool {
        self.families().contains(&ModelFamily::Wind)
    }
}

impl fmt::Display for ForecastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl TryFrom<&str> for ForecastKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "surf" => Ok(ForecastKind::Surf),
            "wave" => Ok(ForecastKind::Wave),
            _ => Err(anyhow::anyhow!(
                "Unknown forecast kind '{value}'. Supported kinds: surf, wave."
            )),
        }
    }
}

/// A model variable the parser knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    /// Significant height of combined wind waves and swell (m).
    WaveHeight,
    /// Primary wave mean period (s).
    WavePeriod,
    /// Primary wave direction, degrees the waves come from.
    WaveDirection,
    /// Eastward wind component at 10 m (m/s).
    WindU,
    /// Northward wind component at 10 m (m/s).
    WindV,
}

/// One timestamped set of values from a model fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub time: DateTime<Utc>,
    pub values: BTreeMap<Variable, f64>,
}

impl RawSample {
    pub fn get(&self, variable: Variable) -> Option<f64> {
        self.values.get(&variable).copied()
    }
}

/// Time series produced by parsing one model fetch, ordered by time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub family: ModelFamily,
    pub model: String,
    pub location: Location,
    pub samples: Vec<RawSample>,
}

impl RawSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One forecast hour of the assembled forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub date: DateTime<Utc>,
    pub forecast_hour: u32,
    pub wave_height: f64,
    pub wave_period: f64,
    pub wave_direction: f64,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub min_breaking_height: f64,
    pub max_breaking_height: f64,
}

/// The stored forecast snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub kind: ForecastKind,
    pub location: Location,
    pub generated_at: DateTime<Utc>,
    pub model_run: DateTime<Utc>,
    pub wave_model: String,
    pub wind_model: Option<String>,
    pub units: UnitSystem,
    pub records: Vec<ForecastRecord>,
}

impl Forecast {
    /// Convert every record into `target`.
    ///
    /// Returns `false` without touching any value when the forecast is
    /// already expressed in `target`, so repeating a conversion is harmless.
    pub fn change_units(&mut self, target: UnitSystem) -> bool {
        if self.units == target {
            return false;
        }

        let from = self.units;
        for record in &mut self.records {
            record.wave_height = from.convert_height(record.wave_height, target);
            record.min_breaking_height = from.convert_height(record.min_breaking_height, target);
            record.max_breaking_height = from.convert_height(record.max_breaking_height, target);
            record.wind_speed = record.wind_speed.map(|s| from.convert_speed(s, target));
        }
        self.units = target;

        true
    }
}
