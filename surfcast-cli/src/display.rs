//! Terminal rendering of a stored forecast.

use chrono::{DateTime, Local, TimeZone, Utc};

use surfcast_core::Forecast;

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Sixteen-point compass name for a bearing in degrees.
pub fn degree_to_direction(degrees: f64) -> &'static str {
    let index = (degrees.rem_euclid(360.0) / 22.5).round() as usize % COMPASS.len();
    COMPASS[index]
}

/// Hour of day as "3 PM" in the given zone.
pub fn twelve_hour<Tz: TimeZone>(time: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let local = time.with_timezone(tz);
    let hour = local.format("%I").to_string();
    format!("{} {}", hour.trim_start_matches('0'), local.format("%p"))
}

/// Round `num` to `precision` decimal places.
pub fn to_fixed_point(num: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (num * scale).round() / scale
}

pub fn render_table(forecast: &Forecast, hours: Option<usize>) -> String {
    render_table_in(forecast, hours, &Local)
}

fn render_table_in<Tz: TimeZone>(forecast: &Forecast, hours: Option<usize>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let height = forecast.units.height_label();
    let speed = forecast.units.speed_label();
    let mut lines = vec![
        format!(
            "{} forecast for {} ({} run, {})",
            forecast.kind,
            forecast.location.name(),
            forecast.model_run.format("%Y-%m-%d %Hz"),
            forecast.wave_model,
        ),
        format!(
            "{:<10} {:>6} {:>12} {:>8} {:>6} {:>5} {:>12}",
            "Day",
            "Time",
            format!("Surf ({height})"),
            format!("Wave ({height})"),
            "Period",
            "Dir",
            format!("Wind ({speed})"),
        ),
    ];

    let mut last_day = String::new();
    let limit = hours.unwrap_or(forecast.records.len());
    for record in forecast.records.iter().take(limit) {
        let day = record.date.with_timezone(tz).format("%a %d").to_string();
        let day_column = if day == last_day { String::new() } else { day.clone() };
        last_day = day;

        let surf = format!(
            "{}-{}",
            to_fixed_point(record.min_breaking_height, 0),
            to_fixed_point(record.max_breaking_height, 0),
        );
        let wind = match (record.wind_speed, record.wind_direction) {
            (Some(s), Some(d)) => format!("{} {}", to_fixed_point(s, 0), degree_to_direction(d)),
            _ => "-".to_string(),
        };

        lines.push(format!(
            "{:<10} {:>6} {:>12} {:>8} {:>5}s {:>5} {:>12}",
            day_column,
            twelve_hour(&record.date, tz),
            surf,
            to_fixed_point(record.wave_height, 1),
            to_fixed_point(record.wave_period, 0),
            degree_to_direction(record.wave_direction),
            wind,
        ));
    }

    lines.iter().map(|line| format!("{line}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use surfcast_core::{ForecastKind, ForecastRecord, Location, UnitSystem};

    fn forecast(records: usize) -> Forecast {
        let t0 = Utc.with_ymd_and_hms(2024, 9, 1, 13, 0, 0).unwrap();
        Forecast {
            kind: ForecastKind::Surf,
            location: Location::new("Narragansett", 41.395, -71.453, 0.0),
            generated_at: t0,
            model_run: Utc.with_ymd_and_hms(2024, 9, 1, 6, 0, 0).unwrap(),
            wave_model: "gfswave.atlocn.0p16".into(),
            wind_model: Some("gfs_0p25_1hr".into()),
            units: UnitSystem::Imperial,
            records: (0..records)
                .map(|i| ForecastRecord {
                    date: t0 + Duration::hours(i as i64),
                    forecast_hour: i as u32,
                    wave_height: 3.28,
                    wave_period: 9.0,
                    wave_direction: 160.0,
                    wind_speed: Some(11.2),
                    wind_direction: Some(225.0),
                    min_breaking_height: 2.1,
                    max_breaking_height: 2.9,
                })
                .collect(),
        }
    }

    #[test]
    fn compass_points() {
        assert_eq!(degree_to_direction(0.0), "N");
        assert_eq!(degree_to_direction(11.0), "N");
        assert_eq!(degree_to_direction(12.0), "NNE");
        assert_eq!(degree_to_direction(225.0), "SW");
        assert_eq!(degree_to_direction(350.0), "N");
        assert_eq!(degree_to_direction(-90.0), "W");
    }

    #[test]
    fn twelve_hour_clock() {
        let t = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(twelve_hour(&t, &Utc), "12 AM");
        assert_eq!(twelve_hour(&(t + Duration::hours(9)), &Utc), "9 AM");
        assert_eq!(twelve_hour(&(t + Duration::hours(15)), &Utc), "3 PM");
    }

    #[test]
    fn fixed_point_rounding() {
        assert_eq!(to_fixed_point(3.14159, 2), 3.14);
        assert_eq!(to_fixed_point(2.5, 0), 3.0);
        assert_eq!(to_fixed_point(-1.25, 1), -1.3);
    }

    #[test]
    fn table_uses_unit_labels_and_limit() {
        let table = render_table_in(&forecast(5), Some(2), &Utc);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(table.ends_with("\n"));
        assert!(lines[0].starts_with("surf forecast for Narragansett (2024-09-01 06z run"));
        assert!(lines[1].contains("Surf (ft)"));
        assert!(lines[1].contains("Wind (mph)"));
        assert!(lines[2].contains("Sun 01"));
        assert!(lines[2].contains("1 PM"));
        assert!(lines[2].contains("2-3"));
        assert!(lines[2].contains("11 SW"));
        assert!(!lines[3].contains("Sun 01"));
    }

    #[test]
    fn wave_only_forecast_has_no_wind_column_values() {
        let mut f = forecast(1);
        f.kind = ForecastKind::Wave;
        f.records[0].wind_speed = None;
        f.records[0].wind_direction = None;

        let table = render_table_in(&f, None, &Utc);
        assert!(table.lines().nth(2).unwrap().trim_end().ends_with('-'));
    }
}
