//! Merging parsed model series into a forecast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{
    error::AssemblyError,
    location::Location,
    model::{Forecast, ForecastKind, ForecastRecord, RawSample, RawSeries, Variable},
    units::UnitSystem,
};

const GRAVITY: f64 = 9.81;

/// Beach geometry and scaling used for the breaking wave estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakingParams {
    /// Compass bearing the beach faces, degrees.
    pub beach_angle: f64,
    /// Bottom slope approaching the break (rise over run).
    pub beach_slope: f64,
    /// Scale applied to the breaker height for refraction and sheltering.
    pub refraction_factor: f64,
    /// Ratio between the maximum and minimum breaking heights.
    pub min_max_ratio: f64,
}

impl Default for BreakingParams {
    fn default() -> Self {
        Self {
            beach_angle: 145.0,
            beach_slope: 0.02,
            refraction_factor: 0.8,
            min_max_ratio: 1.4,
        }
    }
}

impl BreakingParams {
    /// Breaking height range (min, max) in meters for a deep water swell.
    ///
    /// `depth` is the water depth at the model point; when known the
    /// breaker height cannot exceed what the slope's breaker index allows
    /// at that depth.
    pub fn breaking_heights(
        &self,
        height: f64,
        period: f64,
        direction: f64,
        depth: Option<f64>,
    ) -> (f64, f64) {
        let incidence = angle_between(direction, self.beach_angle);
        if incidence >= 90.0 || height <= 0.0 || period <= 0.0 {
            return (0.0, 0.0);
        }

        // Komar and Gaughan, with the obliquity term of the energy flux.
        let obliquity = incidence.to_radians().cos();
        let mut breaker = 0.39 * GRAVITY.powf(0.2) * (period * height.powi(2) * obliquity).powf(0.4);

        if let Some(depth) = depth {
            let index = breaker_index(breaker, period, self.beach_slope);
            breaker = breaker.min(index * depth);
        }

        let max = breaker * self.refraction_factor;
        (max / self.min_max_ratio, max)
    }
}

/// Weggel's slope dependent breaker index, breaking height over depth.
fn breaker_index(height: f64, period: f64, slope: f64) -> f64 {
    let a = 43.8 * (1.0 - (-19.0 * slope).exp());
    let b = 1.56 / (1.0 + (-19.5 * slope).exp());
    b - a * height / (GRAVITY * period.powi(2))
}

/// Smallest absolute angle between two bearings, 0..=180.
fn angle_between(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Wind speed and meteorological direction (where it blows from) from
/// eastward/northward components.
pub fn wind_from_components(u: f64, v: f64) -> (f64, f64) {
    let speed = u.hypot(v);
    let direction = (270.0 - v.atan2(u).to_degrees()).rem_euclid(360.0);
    (speed, direction)
}

/// Hours present in every series, ascending.
pub fn aligned_hours(series: &[&RawSeries]) -> Vec<DateTime<Utc>> {
    let mut sets = series
        .iter()
        .map(|s| s.samples.iter().map(|x| x.time).collect::<BTreeSet<_>>());

    let Some(first) = sets.next() else {
        return Vec::new();
    };
    sets.fold(first, |acc, set| acc.intersection(&set).copied().collect())
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Assembler {
    pub breaking: BreakingParams,
}

impl Assembler {
    pub fn new(breaking: BreakingParams) -> Self {
        Self { breaking }
    }

    /// Build a forecast for `location` from a wave series and, for a surf
    /// forecast, a wind series.
    ///
    /// Only hours present in every series are kept. Values are computed in
    /// metric and converted once to `units`.
    pub fn assemble(
        &self,
        kind: ForecastKind,
        location: Location,
        model_run: DateTime<Utc>,
        wave: RawSeries,
        wind: Option<RawSeries>,
        units: UnitSystem,
    ) -> Result<Forecast, AssemblyError> {
        let contributing: Vec<&RawSeries> = std::iter::once(&wave).chain(wind.as_ref()).collect();
        let hours = aligned_hours(&contributing);
        if hours.is_empty() {
            return Err(AssemblyError::NoAlignedHours {
                wave: wave.len(),
                wind: wind.as_ref().map_or(0, RawSeries::len),
            });
        }

        let depth = wave.location.depth();
        let origin = wave.samples.first().map_or(hours[0], |s| s.time);
        let wave_by_time = by_time(&wave);
        let wind_by_time = wind.as_ref().map(by_time);

        let mut records = Vec::with_capacity(hours.len());
        for time in &hours {
            let Some(w) = wave_by_time.get(time) else {
                continue;
            };
            let height = w.get(Variable::WaveHeight).unwrap_or_default();
            let period = w.get(Variable::WavePeriod).unwrap_or_default();
            let direction = w.get(Variable::WaveDirection).unwrap_or_default();

            let (wind_speed, wind_direction) = wind_by_time
                .as_ref()
                .and_then(|m| m.get(time))
                .and_then(|s| Some(wind_from_components(s.get(Variable::WindU)?, s.get(Variable::WindV)?)))
                .unzip();

            let (min_breaking_height, max_breaking_height) =
                self.breaking.breaking_heights(height, period, direction, depth);

            records.push(ForecastRecord {
                date: *time,
                forecast_hour: (*time - origin).num_hours().max(0) as u32,
                wave_height: height,
                wave_period: period,
                wave_direction: direction,
                wind_speed,
                wind_direction,
                min_breaking_height,
                max_breaking_height,
            });
        }

        debug!(
            kind = %kind,
            wave_samples = wave.len(),
            aligned = records.len(),
            "assembled forecast records"
        );

        let mut forecast = Forecast {
            kind,
            location,
            generated_at: Utc::now(),
            model_run,
            wave_model: wave.model,
            wind_model: wind.map(|w| w.model),
            units: UnitSystem::Metric,
            records,
        };
        forecast.change_units(units);

        Ok(forecast)
    }
}

fn by_time(series: &RawSeries) -> BTreeMap<DateTime<Utc>, &RawSample> {
    series.samples.iter().map(|s| (s.time, s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ModelFamily;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 6, 0, 0).unwrap()
    }

    fn series(family: ModelFamily, hours: impl IntoIterator<Item = i64>) -> RawSeries {
        let samples = hours
            .into_iter()
            .map(|h| {
                let values = match family {
                    ModelFamily::Wave => BTreeMap::from([
                        (Variable::WaveHeight, 1.5),
                        (Variable::WavePeriod, 10.0),
                        (Variable::WaveDirection, 150.0),
                    ]),
                    ModelFamily::Wind => {
                        BTreeMap::from([(Variable::WindU, 0.0), (Variable::WindV, -5.0)])
                    }
                };
                RawSample {
                    time: t0() + Duration::hours(h),
                    values,
                }
            })
            .collect();

        RawSeries {
            family,
            model: format!("{family}-model"),
            location: Location::new("Block Island Sound", 41.323, -71.396, 30.0),
            samples,
        }
    }

    fn forecast_location() -> Location {
        Location::new("Narragansett", 41.395, -71.453, 0.0)
    }

    #[test]
    fn full_overlap_keeps_every_hour() {
        let forecast = Assembler::default()
            .assemble(
                ForecastKind::Surf,
                forecast_location(),
                t0(),
                series(ModelFamily::Wave, 0..=60),
                Some(series(ModelFamily::Wind, 0..=60)),
                UnitSystem::Imperial,
            )
            .expect("aligned series");

        assert_eq!(forecast.records.len(), 61);
        assert_eq!(forecast.units, UnitSystem::Imperial);
        assert_eq!(forecast.wind_model.as_deref(), Some("wind-model"));
        assert!(
            forecast
                .records
                .windows(2)
                .all(|w| w[0].forecast_hour < w[1].forecast_hour)
        );
        assert_eq!(forecast.records[60].forecast_hour, 60);
    }

    #[test]
    fn disjoint_series_fail() {
        let err = Assembler::default()
            .assemble(
                ForecastKind::Surf,
                forecast_location(),
                t0(),
                series(ModelFamily::Wave, 0..10),
                Some(series(ModelFamily::Wind, 100..110)),
                UnitSystem::Metric,
            )
            .unwrap_err();

        assert_eq!(err, AssemblyError::NoAlignedHours { wave: 10, wind: 10 });
    }

    #[test]
    fn hours_missing_from_wind_are_dropped() {
        let forecast = Assembler::default()
            .assemble(
                ForecastKind::Surf,
                forecast_location(),
                t0(),
                series(ModelFamily::Wave, 0..=6),
                Some(series(ModelFamily::Wind, [0, 3, 6])),
                UnitSystem::Metric,
            )
            .unwrap();

        let hours: Vec<u32> = forecast.records.iter().map(|r| r.forecast_hour).collect();
        assert_eq!(hours, vec![0, 3, 6]);
        assert!(forecast.records.iter().all(|r| r.wind_speed.is_some()));
    }

    #[test]
    fn wave_only_forecast_has_no_wind() {
        let forecast = Assembler::default()
            .assemble(
                ForecastKind::Wave,
                forecast_location(),
                t0(),
                series(ModelFamily::Wave, 0..=2),
                None,
                UnitSystem::Metric,
            )
            .unwrap();

        assert_eq!(forecast.records.len(), 3);
        assert!(forecast.records.iter().all(|r| r.wind_speed.is_none()));
        assert_eq!(forecast.wind_model, None);
    }

    #[test]
    fn wind_components_become_speed_and_bearing() {
        // Blowing toward the south means a north wind.
        let (speed, dir) = wind_from_components(0.0, -5.0);
        assert!((speed - 5.0).abs() < 1e-9);
        assert!(dir.abs() < 1e-9 || (dir - 360.0).abs() < 1e-9);

        let (_, dir) = wind_from_components(3.0, 0.0);
        assert!((dir - 270.0).abs() < 1e-9);

        let (speed, _) = wind_from_components(3.0, 4.0);
        assert!((speed - 5.0).abs() < 1e-9);
    }

    #[test]
    fn breaking_heights_follow_swell_direction() {
        let params = BreakingParams::default();

        let (min, max) = params.breaking_heights(1.5, 10.0, 145.0, Some(30.0));
        assert!(max > 1.0 && max < 3.0, "max = {max}");
        assert!((max / min - 1.4).abs() < 1e-9);

        let (_, oblique) = params.breaking_heights(1.5, 10.0, 205.0, Some(30.0));
        assert!(oblique < max);

        // Swell heading away from the beach never breaks on it.
        assert_eq!(params.breaking_heights(1.5, 10.0, 325.0, Some(30.0)), (0.0, 0.0));
        assert_eq!(params.breaking_heights(0.0, 10.0, 145.0, None), (0.0, 0.0));
    }

    #[test]
    fn shallow_depth_caps_breaking_height() {
        let params = BreakingParams::default();
        let (_, deep) = params.breaking_heights(3.0, 12.0, 145.0, None);
        let (_, shallow) = params.breaking_heights(3.0, 12.0, 145.0, Some(1.0));
        assert!(shallow < deep);
    }

    #[test]
    fn angle_between_wraps() {
        assert_eq!(angle_between(10.0, 350.0), 20.0);
        assert_eq!(angle_between(145.0, 145.0), 0.0);
        assert_eq!(angle_between(325.0, 145.0), 180.0);
    }
}
