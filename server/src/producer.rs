//! Offline snapshot production.
//!
//! For each dataset: fetch raw rows, transform, assemble and write the
//! snapshot. Datasets are independent: a failure aborts only its own update,
//! leaving its previous snapshot in place, and the next scheduled run is the
//! retry.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use shared::DatasetKind;
use std::cmp::Ordering;

use crate::assemble::assemble;
use crate::clickhouse::RowSource;
use crate::snapshot::SnapshotStore;
use crate::stopwatch::Stopwatch;
use crate::transform::{compare_values, transform};

/// Expected age of a snapshot before the next run replaces it. Informative:
/// the server polls modification times and does not look at this value.
pub const CACHE_INVALIDATION_SECS: u64 = 3600;

#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Updated kinds with their feature count.
    pub updated: Vec<(DatasetKind, usize)>,
    /// Failed kinds with the error chain.
    pub failed: Vec<(DatasetKind, String)>,
}

impl UpdateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Producer<S> {
    source: S,
    store: SnapshotStore,
}

impl<S: RowSource> Producer<S> {
    pub fn new(source: S, store: SnapshotStore) -> Self {
        Self { source, store }
    }

    pub async fn update_all(&self) -> UpdateReport {
        self.update(&DatasetKind::ALL).await
    }

    /// Update `kinds` one after the other.
    pub async fn update(&self, kinds: &[DatasetKind]) -> UpdateReport {
        let mut report = UpdateReport::default();

        for &kind in kinds {
            log::info!("Updating {}", kind);
            match self.update_kind(kind).await {
                Ok(count) => {
                    log::info!("Updated {}: {} features", kind, count);
                    report.updated.push((kind, count));
                }
                Err(e) => {
                    log::error!("Failed to update {}: {:#}", kind, e);
                    report.failed.push((kind, format!("{:#}", e)));
                }
            }
        }

        report
    }

    /// Run the full pipeline of one dataset. Returns the number of features written.
    pub async fn update_kind(&self, kind: DatasetKind) -> Result<usize> {
        let _stopwatch = Stopwatch::start(format!("update {}", kind));
        let spec = kind.spec();

        let mut raw_rows = self
            .source
            .fetch(kind)
            .await
            .with_context(|| format!("Failed to fetch {} rows", kind))?;

        if let Some(columns) = presort_columns(kind) {
            raw_rows.sort_by(|a, b| {
                a.date_time_forecast.cmp(&b.date_time_forecast).then_with(|| {
                    columns.iter().fold(Ordering::Equal, |ordering, column| {
                        ordering.then_with(|| {
                            match (a.columns.get(*column), b.columns.get(*column)) {
                                (Some(a), Some(b)) => compare_values(a, b),
                                (a, b) => a.is_some().cmp(&b.is_some()),
                            }
                        })
                    })
                })
            });
        }

        let rows = transform(raw_rows, kind, spec.cadence_hours)
            .with_context(|| format!("Failed to transform {} rows", kind))?;
        let collection = assemble(&rows, spec.property_columns, spec.geometry)
            .with_context(|| format!("Failed to assemble {} features", kind))?;
        let count = collection.len();

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.write(kind, &collection))
            .await
            .context("Snapshot writer panicked")?
            .with_context(|| format!("Failed to write {} snapshot", kind))?;

        Ok(count)
    }

    /// Update every hour at `minute`, forever.
    pub async fn run_hourly(&self, minute: u32) {
        loop {
            let now = Utc::now();
            let next = next_run(now, minute);
            log::info!("Next update at {}", next.to_rfc3339());
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            let report = self.update_all().await;
            if !report.is_success() {
                log::warn!(
                    "{} of {} datasets failed, retrying at the next run",
                    report.failed.len(),
                    DatasetKind::ALL.len()
                );
            }
        }
    }
}

const GRID_PRESORT: &[&str] = &["x", "y"];

/// Columns ordering raw rows of the same forecast time before transformation.
/// Stations rows keep the order of the store.
fn presort_columns(kind: DatasetKind) -> Option<&'static [&'static str]> {
    match kind {
        DatasetKind::Stations => None,
        DatasetKind::Grid => Some(GRID_PRESORT),
        DatasetKind::Streets | DatasetKind::Lor | DatasetKind::Simulation => {
            Some(std::slice::from_ref(&kind.spec().key_column))
        }
    }
}

/// First instant strictly after `now` whose minute-of-hour is `minute`.
pub fn next_run(now: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    let minute = minute.min(59);
    let into_hour = TimeDelta::minutes(now.minute().into())
        + TimeDelta::seconds(now.second().into())
        + TimeDelta::nanoseconds(now.nanosecond().into());
    let candidate = now - into_hour + TimeDelta::minutes(minute.into());

    if candidate > now {
        candidate
    } else {
        candidate + TimeDelta::hours(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::{json, Map, Value};
    use shared::GeometryType;
    use std::collections::HashMap;

    struct FakeSource {
        rows: HashMap<DatasetKind, Result<Vec<RawRecord>, String>>,
    }

    #[async_trait]
    impl RowSource for FakeSource {
        async fn fetch(&self, kind: DatasetKind) -> Result<Vec<RawRecord>> {
            match self.rows.get(&kind) {
                Some(Ok(rows)) => Ok(rows.clone()),
                Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
                None => Ok(vec![]),
            }
        }
    }

    /// A valid raw row of `kind` with a two-value horizon.
    fn raw_row(kind: DatasetKind, key: Value, hour: u32) -> RawRecord {
        let spec = kind.spec();
        let day = NaiveDate::from_ymd_opt(2022, 10, 24).unwrap();
        let first = day.and_hms_opt(0, 0, 0).unwrap();
        let last = first + TimeDelta::hours(spec.cadence_hours.into());

        let mut columns = Map::new();
        columns.insert(spec.key_column.to_string(), key);
        match spec.geometry {
            GeometryType::Point => {
                columns.insert("x".to_string(), json!(396182));
                columns.insert("y".to_string(), json!(5819313));
            }
            geometry => {
                let coordinates = match geometry {
                    GeometryType::MultiPolygon => json!([[[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]]),
                    _ => json!([[392123.4, 5807250.7], [392143.3, 5807248.6]]),
                };
                let text = json!({"type": geometry.as_str(), "coordinates": coordinates});
                columns.insert("geometry".to_string(), json!(text.to_string()));
            }
        }
        for column in spec.pollutant_columns() {
            columns.insert(column.replace("pm2.5", "pm25"), json!([1.5, 2.5]));
        }

        RawRecord {
            date_time_forecast: day.and_hms_opt(hour, 0, 0).unwrap(),
            first_pred_date_time: first,
            last_pred_date_time: last,
            columns,
        }
    }

    fn all_rows() -> HashMap<DatasetKind, Result<Vec<RawRecord>, String>> {
        DatasetKind::ALL
            .into_iter()
            .map(|kind| {
                let rows = vec![raw_row(kind, json!("2"), 1), raw_row(kind, json!("1"), 2)];
                (kind, Ok(rows))
            })
            .collect()
    }

    // =========================================================================
    // update_all
    // =========================================================================

    #[tokio::test]
    async fn test_update_all_writes_every_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let producer = Producer::new(FakeSource { rows: all_rows() }, store.clone());

        let report = producer.update_all().await;

        assert!(report.is_success());
        assert_eq!(report.updated.len(), 5);
        for kind in DatasetKind::ALL {
            let collection = store.read(kind).unwrap();
            assert_eq!(collection.len(), 2);
            assert_eq!(collection.features[0].geometry.kind, kind.spec().geometry);
            assert_eq!(
                collection.features[0].properties[kind.spec().key_column],
                json!("1")
            );
        }
    }

    #[tokio::test]
    async fn test_update_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let mut rows = all_rows();
        rows.insert(DatasetKind::Grid, Err("connection refused".to_string()));
        let mut broken_street = raw_row(DatasetKind::Streets, json!("3"), 1);
        broken_street
            .columns
            .insert("geometry".to_string(), json!(r#"{"type":"MultiPolygon","coordinates":[]}"#));
        rows.insert(DatasetKind::Streets, Ok(vec![broken_street]));

        let producer = Producer::new(FakeSource { rows }, store.clone());
        let report = producer.update_all().await;

        let failed: Vec<_> = report.failed.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(failed, vec![DatasetKind::Grid, DatasetKind::Streets]);
        assert!(report.failed[0].1.contains("connection refused"));
        assert!(report.failed[1].1.contains("MultiPolygon"));

        assert!(store.read(DatasetKind::Grid).is_err());
        assert!(store.read(DatasetKind::Streets).is_err());
        for kind in [DatasetKind::Stations, DatasetKind::Lor, DatasetKind::Simulation] {
            assert_eq!(store.read(kind).unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        Producer::new(FakeSource { rows: all_rows() }, store.clone())
            .update_all()
            .await;
        let before = store.read(DatasetKind::Lor).unwrap();

        let mut rows = HashMap::new();
        let mut bad = raw_row(DatasetKind::Lor, json!("9"), 1);
        bad.columns.insert("no2".to_string(), json!([1.0, 2.0, 3.0]));
        rows.insert(DatasetKind::Lor, Ok(vec![bad]));
        let report = Producer::new(FakeSource { rows }, store.clone())
            .update(&[DatasetKind::Lor])
            .await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.read(DatasetKind::Lor).unwrap(), before);
    }

    #[tokio::test]
    async fn test_presort_by_forecast_time_then_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut rows = HashMap::new();
        rows.insert(
            DatasetKind::Streets,
            Ok(vec![
                raw_row(DatasetKind::Streets, json!("b"), 3),
                raw_row(DatasetKind::Streets, json!("a"), 5),
                raw_row(DatasetKind::Streets, json!("a"), 1),
            ]),
        );

        Producer::new(FakeSource { rows }, store.clone())
            .update(&[DatasetKind::Streets])
            .await;

        let collection = store.read(DatasetKind::Streets).unwrap();
        let times: Vec<_> = collection
            .features
            .iter()
            .map(|f| {
                (
                    f.properties["element_nr"].clone(),
                    f.properties["date_time_forecast_iso8601"].clone(),
                )
            })
            .collect();
        assert_eq!(
            times,
            vec![
                (json!("a"), json!("2022-10-24T01:00:00.000000Z")),
                (json!("a"), json!("2022-10-24T05:00:00.000000Z")),
                (json!("b"), json!("2022-10-24T03:00:00.000000Z")),
            ]
        );
    }

    #[tokio::test]
    async fn test_grid_presort_by_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let at = |id: u64, x: u64, y: u64| {
            let mut row = raw_row(DatasetKind::Grid, json!(id), 1);
            row.columns.insert("x".to_string(), json!(x));
            row.columns.insert("y".to_string(), json!(y));
            row
        };
        let mut rows = HashMap::new();
        rows.insert(
            DatasetKind::Grid,
            Ok(vec![at(1, 415775, 5810275), at(1, 415725, 5810325), at(1, 415725, 5810275)]),
        );

        Producer::new(FakeSource { rows }, store.clone())
            .update(&[DatasetKind::Grid])
            .await;

        let coordinates: Vec<_> = store
            .read(DatasetKind::Grid)
            .unwrap()
            .features
            .iter()
            .map(|f| f.geometry.coordinates.clone())
            .collect();
        assert_eq!(
            coordinates,
            vec![
                json!([415725, 5810275]),
                json!([415725, 5810325]),
                json!([415775, 5810275]),
            ]
        );
    }

    // =========================================================================
    // next_run
    // =========================================================================

    #[test]
    fn test_next_run_later_this_hour() {
        let now = Utc.with_ymd_and_hms(2022, 10, 24, 13, 10, 30).unwrap();
        assert_eq!(
            next_run(now, 45),
            Utc.with_ymd_and_hms(2022, 10, 24, 13, 45, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_next_hour() {
        let now = Utc.with_ymd_and_hms(2022, 10, 24, 13, 45, 0).unwrap();
        assert_eq!(
            next_run(now, 45),
            Utc.with_ymd_and_hms(2022, 10, 24, 14, 45, 0).unwrap()
        );

        let now = Utc.with_ymd_and_hms(2022, 10, 24, 23, 50, 0).unwrap();
        assert_eq!(
            next_run(now, 45),
            Utc.with_ymd_and_hms(2022, 10, 25, 0, 45, 0).unwrap()
        );
    }
}
