//! Normalization of raw forecast rows.
//!
//! Turns the rows of an `api_*` table into rows ready for assembly: time
//! columns are encoded as ISO 8601 strings, the fine particulate columns get
//! their display name, columns are restricted to the dataset schema and rows
//! are ordered by primary key.

use chrono::{NaiveDateTime, TimeDelta};
use serde_json::{Map, Value};
use shared::datasets::{DatasetKind, DatasetSpec, DATE_TIME_FORECAST_ISO, FORECAST_RANGE_ISO};
use std::cmp::Ordering;

use crate::error::TransformError;
use crate::models::{NormalizedRecord, RawRecord};

/// Microseconds and a literal `Z`: timestamps are UTC by contract.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const FINE_PARTICULATE: &str = "pm25";
const FINE_PARTICULATE_DISPLAY: &str = "pm2.5";

pub fn transform(
    raw_rows: Vec<RawRecord>,
    kind: DatasetKind,
    interval_hours: u32,
) -> Result<Vec<NormalizedRecord>, TransformError> {
    let spec = kind.spec();

    let mut rows = raw_rows
        .into_iter()
        .map(|raw| normalize(raw, spec, interval_hours))
        .collect::<Result<Vec<_>, _>>()?;

    // Stable: rows sharing a key keep their incoming order.
    rows.sort_by(|a, b| compare_column(a.get(spec.key_column), b.get(spec.key_column)));

    Ok(rows)
}

fn normalize(
    raw: RawRecord,
    spec: &DatasetSpec,
    interval_hours: u32,
) -> Result<NormalizedRecord, TransformError> {
    let horizon = forecast_horizon(
        &raw.first_pred_date_time,
        &raw.last_pred_date_time,
        interval_hours,
    )?;
    let range = repeating_interval(horizon, &raw.first_pred_date_time, interval_hours);

    let mut columns: Map<String, Value> = raw
        .columns
        .into_iter()
        .map(|(name, value)| (display_name(name), value))
        .collect();
    columns.insert(
        DATE_TIME_FORECAST_ISO.to_string(),
        Value::String(iso8601(&raw.date_time_forecast)),
    );
    columns.insert(FORECAST_RANGE_ISO.to_string(), Value::String(range));

    let mut selected = Map::new();
    for column in spec.output_columns() {
        let value = columns
            .remove(column)
            .ok_or_else(|| TransformError::MissingColumn {
                column: column.to_string(),
            })?;
        selected.insert(column.to_string(), value);
    }

    for column in spec.pollutant_columns() {
        let found = match selected.get(*column) {
            Some(Value::Array(values)) => values.len(),
            _ => {
                return Err(TransformError::NotASequence {
                    column: column.to_string(),
                })
            }
        };
        if found != horizon {
            return Err(TransformError::ForecastHorizonMismatch {
                column: column.to_string(),
                expected: horizon,
                found,
            });
        }
    }

    Ok(NormalizedRecord(selected))
}

pub fn iso8601(time: &NaiveDateTime) -> String {
    time.format(ISO_FORMAT).to_string()
}

/// Number of forecast values between `first` and `last`, both included.
pub fn forecast_horizon(
    first: &NaiveDateTime,
    last: &NaiveDateTime,
    interval_hours: u32,
) -> Result<usize, TransformError> {
    if interval_hours == 0 {
        return Err(TransformError::InvalidInterval);
    }
    if last < first {
        return Err(TransformError::InvalidForecastWindow {
            first: *first,
            last: *last,
        });
    }

    let period = TimeDelta::hours(interval_hours.into()).num_seconds();
    let span = (*last - *first).num_seconds();
    Ok((span / period) as usize + 1)
}

/// Repeating interval `R{n}/{first}/PT{h}H` describing the forecast window.
pub fn forecast_range(
    first: &NaiveDateTime,
    last: &NaiveDateTime,
    interval_hours: u32,
) -> Result<String, TransformError> {
    let horizon = forecast_horizon(first, last, interval_hours)?;
    Ok(repeating_interval(horizon, first, interval_hours))
}

fn repeating_interval(repetitions: usize, start: &NaiveDateTime, interval_hours: u32) -> String {
    format!("R{}/{}/PT{}H", repetitions, iso8601(start), interval_hours)
}

/// `pm25` becomes `pm2.5`, `pm25_40` becomes `pm2.5_40`.
fn display_name(column: String) -> String {
    match column.strip_prefix(FINE_PARTICULATE) {
        Some("") => FINE_PARTICULATE_DISPLAY.to_string(),
        Some(offset) if offset.starts_with('_') => format!("{}{}", FINE_PARTICULATE_DISPLAY, offset),
        _ => column,
    }
}

/// Orders key values: numbers numerically, strings lexicographically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            },
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn compare_column(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
