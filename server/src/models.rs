use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of an `api_*` table, as returned by the analytical store.
///
/// Only the three time columns are typed; key, geometry (or `x`/`y`) and the
/// pollutant sequences stay native JSON values so they reach the feature
/// properties without coercion.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(with = "clickhouse_datetime")]
    pub date_time_forecast: NaiveDateTime,
    #[serde(with = "clickhouse_datetime")]
    pub first_pred_date_time: NaiveDateTime,
    #[serde(with = "clickhouse_datetime")]
    pub last_pred_date_time: NaiveDateTime,
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

/// A row restricted to the canonical columns of its dataset, in output order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedRecord(pub Map<String, Value>);

impl NormalizedRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// ClickHouse renders `DateTime` as `2022-10-24 13:00:00`.
pub mod clickhouse_datetime {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const FORMAT_T: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(de::Error::custom)
    }

    pub fn parse(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT).or_else(|_| NaiveDateTime::parse_from_str(s, FORMAT_T))
    }
}
