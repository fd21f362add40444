//! Raw model payload parsing.
//!
//! The GrADS data server answers an `.ascii` request with one block per
//! requested array:
//!
//! ```text
//! htsgwsfc, [3][1][1]
//! [0][0], 1.02
//! [1][0], 1.05
//! [2][0], 9.999E20
//!
//! time, [3]
//! 738765.25, 738765.2916666666, 738765.3333333334
//! ```
//!
//! Gridded variables list one row per leading (time) index; coordinate
//! arrays are comma separated. Times are days since 0001-01-01 on the
//! GrADS calendar.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::{
    error::ParseError,
    location::Location,
    model::{RawSample, RawSeries},
    source::ModelSource,
};

/// GrADS day number of 1970-01-01T00:00Z.
const GRADS_UNIX_EPOCH_DAYS: f64 = 719_164.0;

/// Values at or above this magnitude are the server's fill value.
const FILL_THRESHOLD: f64 = 9.9e20;

/// Turns a raw payload into a time series for one model source.
pub trait RawParser: Send + Sync + std::fmt::Debug {
    fn parse(
        &self,
        raw: &[u8],
        location: &Location,
        source: &ModelSource,
    ) -> Result<RawSeries, ParseError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DodsAsciiParser;

#[derive(Debug, Default)]
struct Blocks {
    /// Gridded variables: (time index, value) rows in payload order.
    grids: HashMap<String, Vec<(usize, f64)>>,
    /// First occurrence of each one dimensional array.
    coords: HashMap<String, Vec<f64>>,
}

impl RawParser for DodsAsciiParser {
    fn parse(
        &self,
        raw: &[u8],
        location: &Location,
        source: &ModelSource,
    ) -> Result<RawSeries, ParseError> {
        let text = std::str::from_utf8(raw).map_err(|e| ParseError::Malformed {
            line: 0,
            reason: format!("payload is not utf-8: {e}"),
        })?;

        let head = text.trim_start();
        if head.starts_with("error") || head.starts_with('<') || head.starts_with("Error") {
            let first = head.lines().next().unwrap_or_default();
            return Err(ParseError::Upstream(first.chars().take(200).collect()));
        }

        let blocks = read_blocks(text)?;
        let times = blocks
            .coords
            .get("time")
            .ok_or_else(|| ParseError::MissingVariable("time".into()))?;

        let mut columns = Vec::with_capacity(source.variables.len());
        for (name, variable) in source.variables {
            let rows = blocks
                .grids
                .get(*name)
                .ok_or_else(|| ParseError::MissingVariable((*name).to_string()))?;
            if rows.len() != times.len() {
                return Err(ParseError::Truncated {
                    variable: (*name).to_string(),
                    expected: times.len(),
                    found: rows.len(),
                });
            }
            let by_index: HashMap<usize, f64> = rows.iter().copied().collect();
            columns.push((*variable, by_index));
        }

        let required = source.family.required_variables();
        let mut samples: BTreeMap<DateTime<Utc>, RawSample> = BTreeMap::new();
        for (idx, days) in times.iter().enumerate() {
            let Some(time) = grads_time(*days) else {
                continue;
            };

            let values: BTreeMap<_, _> = columns
                .iter()
                .filter_map(|(variable, by_index)| {
                    by_index
                        .get(&idx)
                        .copied()
                        .filter(|v| is_usable(*v))
                        .map(|v| (*variable, v))
                })
                .collect();

            if required.iter().all(|v| values.contains_key(v)) {
                samples.insert(time, RawSample { time, values });
            }
        }

        if samples.is_empty() {
            return Err(ParseError::Empty);
        }

        Ok(RawSeries {
            family: source.family,
            model: source.name.to_string(),
            location: location.clone(),
            samples: samples.into_values().collect(),
        })
    }
}

fn read_blocks(text: &str) -> Result<Blocks, ParseError> {
    let mut blocks = Blocks::default();
    // (name, dimension count, whether its values are kept) of the open block
    let mut current: Option<(String, usize, bool)> = None;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if !line.starts_with('[') && line.contains(", [") {
            let (name, dims) = parse_header(line).ok_or_else(|| ParseError::Malformed {
                line: line_no + 1,
                reason: format!("bad block header '{line}'"),
            })?;
            let keep = if dims > 1 {
                blocks.grids.entry(name.clone()).or_default();
                true
            } else if blocks.coords.contains_key(&name) {
                false
            } else {
                blocks.coords.insert(name.clone(), Vec::new());
                true
            };
            current = Some((name, dims, keep));
            continue;
        }

        let Some((name, dims, keep)) = current.as_ref() else {
            return Err(ParseError::Malformed {
                line: line_no + 1,
                reason: "data before any block header".into(),
            });
        };

        let malformed = |reason: String| ParseError::Malformed {
            line: line_no + 1,
            reason,
        };

        if *dims > 1 {
            let (index, rest) = line
                .split_once(',')
                .ok_or_else(|| malformed(format!("bad data row '{line}'")))?;
            let t = leading_index(index)
                .ok_or_else(|| malformed(format!("bad row index '{index}'")))?;
            let value = rest
                .split(',')
                .next()
                .map(str::trim)
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| malformed(format!("bad value in '{line}'")))?;

            if let Some(rows) = blocks.grids.get_mut(name) {
                rows.push((t, value));
            }
        } else if *keep {
            let values = line
                .split(',')
                .map(|v| v.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| malformed(format!("bad coordinate value: {e}")))?;
            blocks.coords.entry(name.clone()).or_default().extend(values);
        }
    }

    Ok(blocks)
}

fn parse_header(line: &str) -> Option<(String, usize)> {
    let (name, dims) = line.split_once(", ")?;
    let dims = dims.trim();
    if !dims.starts_with('[') || !dims.ends_with(']') {
        return None;
    }
    let count = dims
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split("][")
        .map(|d| d.parse::<usize>().ok())
        .collect::<Option<Vec<_>>>()?
        .len();

    Some((name.trim().to_string(), count))
}

fn leading_index(index: &str) -> Option<usize> {
    index
        .strip_prefix('[')?
        .split(']')
        .next()?
        .parse()
        .ok()
}

fn is_usable(value: f64) -> bool {
    value.is_finite() && value.abs() < FILL_THRESHOLD
}

/// Convert a GrADS day number to UTC, rounded to the minute.
pub fn grads_time(days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() {
        return None;
    }
    let minutes = ((days - GRADS_UNIX_EPOCH_DAYS) * 1440.0).round() as i64;
    DateTime::from_timestamp(minutes * 60, 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::{ModelFamily, default_sources};
    use chrono::{Duration, TimeZone};

    pub(crate) fn grads_days(time: DateTime<Utc>) -> f64 {
        time.timestamp() as f64 / 86_400.0 + GRADS_UNIX_EPOCH_DAYS
    }

    /// Render a GrADS ASCII response with one row per hour offset from
    /// `start` for each `(name, values)` column.
    pub(crate) fn dods_ascii(
        start: DateTime<Utc>,
        hours: &[i64],
        columns: &[(&str, Vec<f64>)],
    ) -> Vec<u8> {
        let mut out = String::new();
        for (name, values) in columns {
            out.push_str(&format!("{name}, [{}][1][1]\n", values.len()));
            for (i, v) in values.iter().enumerate() {
                out.push_str(&format!("[{i}][0], {v}\n"));
            }
            out.push_str("\n\n");
        }

        let times: Vec<String> = hours
            .iter()
            .map(|h| format!("{}", grads_days(start + Duration::hours(*h))))
            .collect();
        out.push_str(&format!("time, [{}]\n{}\n", hours.len(), times.join(", ")));
        out.push_str("lat, [1]\n41.33333\nlon, [1]\n288.66666\n");
        out.into_bytes()
    }

    pub(crate) fn wave_payload(start: DateTime<Utc>, hours: &[i64]) -> Vec<u8> {
        let n = hours.len();
        dods_ascii(
            start,
            hours,
            &[
                ("htsgwsfc", (0..n).map(|i| 1.0 + i as f64 * 0.01).collect()),
                ("perpwsfc", vec![9.0; n]),
                ("dirpwsfc", vec![160.0; n]),
            ],
        )
    }

    pub(crate) fn wind_payload(start: DateTime<Utc>, hours: &[i64]) -> Vec<u8> {
        let n = hours.len();
        dods_ascii(
            start,
            hours,
            &[("ugrd10m", vec![3.0; n]), ("vgrd10m", vec![4.0; n])],
        )
    }

    fn source(family: ModelFamily) -> ModelSource {
        default_sources()
            .into_iter()
            .find(|s| s.family == family)
            .unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 6, 0, 0).unwrap()
    }

    #[test]
    fn grads_time_matches_known_epoch() {
        assert_eq!(grads_time(719_164.0).unwrap(), Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(grads_time(grads_days(start())).unwrap(), start());
        // Hourly steps printed with limited precision still land on the hour.
        assert_eq!(
            grads_time(grads_days(start()) + 0.0416666).unwrap(),
            start() + Duration::hours(1)
        );
    }

    #[test]
    fn parses_wave_series() {
        let hours: Vec<i64> = (0..=60).collect();
        let raw = wave_payload(start(), &hours);
        let loc = Location::new("Block Island Sound", 41.323, -71.396, 30.0);

        let series = DodsAsciiParser
            .parse(&raw, &loc, &source(ModelFamily::Wave))
            .expect("valid payload");

        assert_eq!(series.len(), 61);
        assert_eq!(series.family, ModelFamily::Wave);
        assert_eq!(series.model, "gfswave.atlocn.0p16");
        assert_eq!(series.samples[0].time, start());
        assert_eq!(series.samples[60].time, start() + Duration::hours(60));
        assert_eq!(series.samples[2].get(crate::model::Variable::WaveHeight), Some(1.02));
    }

    #[test]
    fn fill_values_drop_samples() {
        let raw = dods_ascii(
            start(),
            &[0, 1, 2],
            &[("ugrd10m", vec![1.0, 9.999e20, 2.0]), ("vgrd10m", vec![1.0, 1.0, 2.0])],
        );
        let loc = Location::new("Pier", 41.6, -71.5, 10.0);

        let series = DodsAsciiParser
            .parse(&raw, &loc, &source(ModelFamily::Wind))
            .unwrap();

        let hours: Vec<_> = series.samples.iter().map(|s| s.time).collect();
        assert_eq!(hours, vec![start(), start() + Duration::hours(2)]);
    }

    #[test]
    fn all_fill_values_is_empty() {
        let raw = dods_ascii(
            start(),
            &[0, 1],
            &[("ugrd10m", vec![9.999e20; 2]), ("vgrd10m", vec![9.999e20; 2])],
        );
        let loc = Location::new("Pier", 41.6, -71.5, 10.0);

        let err = DodsAsciiParser
            .parse(&raw, &loc, &source(ModelFamily::Wind))
            .unwrap_err();
        assert_eq!(err, ParseError::Empty);
    }

    #[test]
    fn short_variable_is_truncated() {
        let raw = dods_ascii(
            start(),
            &[0, 1, 2],
            &[("ugrd10m", vec![1.0, 2.0]), ("vgrd10m", vec![1.0, 2.0, 3.0])],
        );
        let loc = Location::new("Pier", 41.6, -71.5, 10.0);

        let err = DodsAsciiParser
            .parse(&raw, &loc, &source(ModelFamily::Wind))
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::Truncated {
                variable: "ugrd10m".into(),
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn missing_variable_and_upstream_errors() {
        let loc = Location::new("Pier", 41.6, -71.5, 10.0);
        let wind = source(ModelFamily::Wind);

        let raw = dods_ascii(start(), &[0], &[("ugrd10m", vec![1.0])]);
        assert_eq!(
            DodsAsciiParser.parse(&raw, &loc, &wind).unwrap_err(),
            ParseError::MissingVariable("vgrd10m".into())
        );

        let raw = b"error {\n    code = 0;\n    message = \"data set not available\";\n};";
        assert!(matches!(
            DodsAsciiParser.parse(raw, &loc, &wind).unwrap_err(),
            ParseError::Upstream(_)
        ));

        assert!(matches!(
            DodsAsciiParser.parse(b"", &loc, &wind).unwrap_err(),
            ParseError::MissingVariable(_)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let loc = Location::new("Pier", 41.6, -71.5, 10.0);
        let raw = b"ugrd10m, [2][1][1]\n[0][0], abc\n";

        let err = DodsAsciiParser
            .parse(raw, &loc, &source(ModelFamily::Wind))
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 2, .. }));
    }
}
