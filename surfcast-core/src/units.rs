use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

const FEET_PER_METER: f64 = 3.280_839_895;
const MPH_PER_METER_PER_SECOND: f64 = 2.236_936_292;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Meters and meters per second, as the models publish.
    Metric,
    /// Feet and miles per hour.
    #[default]
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub const fn all() -> &'static [UnitSystem] {
        &[UnitSystem::Metric, UnitSystem::Imperial]
    }

    pub fn height_label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "m",
            UnitSystem::Imperial => "ft",
        }
    }

    pub fn speed_label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "m/s",
            UnitSystem::Imperial => "mph",
        }
    }

    /// Convert a height from `self` into `target`.
    pub fn convert_height(&self, value: f64, target: UnitSystem) -> f64 {
        match (self, target) {
            (UnitSystem::Metric, UnitSystem::Imperial) => value * FEET_PER_METER,
            (UnitSystem::Imperial, UnitSystem::Metric) => value / FEET_PER_METER,
            _ => value,
        }
    }

    /// Convert a speed from `self` into `target`.
    pub fn convert_speed(&self, value: f64, target: UnitSystem) -> f64 {
        match (self, target) {
            (UnitSystem::Metric, UnitSystem::Imperial) => value * MPH_PER_METER_PER_SECOND,
            (UnitSystem::Imperial, UnitSystem::Metric) => value / MPH_PER_METER_PER_SECOND,
            _ => value,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl TryFrom<&str> for UnitSystem {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" | "english" => Ok(UnitSystem::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: metric, imperial."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_and_speeds_convert_both_ways() {
        let ft = UnitSystem::Metric.convert_height(1.0, UnitSystem::Imperial);
        assert!((ft - 3.2808).abs() < 1e-4);

        let m = UnitSystem::Imperial.convert_height(ft, UnitSystem::Metric);
        assert!((m - 1.0).abs() < 1e-12);

        let mph = UnitSystem::Metric.convert_speed(10.0, UnitSystem::Imperial);
        assert!((mph - 22.369).abs() < 1e-3);
    }

    #[test]
    fn same_system_is_identity() {
        assert_eq!(UnitSystem::Metric.convert_height(2.5, UnitSystem::Metric), 2.5);
        assert_eq!(UnitSystem::Imperial.convert_speed(7.0, UnitSystem::Imperial), 7.0);
    }

    #[test]
    fn parses_names() {
        for units in UnitSystem::all() {
            assert_eq!(UnitSystem::try_from(units.as_str()).unwrap(), *units);
        }
        assert_eq!(UnitSystem::try_from("English").unwrap(), UnitSystem::Imperial);
        assert!(UnitSystem::try_from("furlongs").is_err());
    }
}
