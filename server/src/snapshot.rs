//! Durable per-dataset snapshots shared by the producer and the server.
//!
//! One MessagePack file per dataset kind. Writes go to a temporary file in the
//! same directory which is then renamed over the target, so a reader sees
//! either the previous snapshot or the new one. The file modification time is
//! the snapshot version.

use chrono::{DateTime, Utc};
use shared::{DatasetKind, FeatureCollection};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::SnapshotError;

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path: `{dir}/{kind}.msgpack`
    pub fn path(&self, kind: DatasetKind) -> PathBuf {
        self.dir.join(kind.spec().snapshot_file_name())
    }

    /// Replace the snapshot of `kind` with `collection`.
    pub fn write(
        &self,
        kind: DatasetKind,
        collection: &FeatureCollection,
    ) -> Result<(), SnapshotError> {
        let path = self.path(kind);
        let bytes = rmp_serde::to_vec_named(collection)?;

        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SnapshotError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| SnapshotError::io(&path, e.error))?;

        log::debug!(
            "Wrote {} snapshot: {} features, {} KB",
            kind,
            collection.len(),
            bytes.len() / 1024
        );
        Ok(())
    }

    pub fn read(&self, kind: DatasetKind) -> Result<FeatureCollection, SnapshotError> {
        let path = self.path(kind);
        let bytes = fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        rmp_serde::from_slice(&bytes).map_err(|source| SnapshotError::Decode { path, source })
    }

    /// Version of the current snapshot of `kind`.
    pub fn modified(&self, kind: DatasetKind) -> Result<DateTime<Utc>, SnapshotError> {
        let path = self.path(kind);
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|e| SnapshotError::io(&path, e))?;
        Ok(modified.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::{Feature, Geometry, GeometryType, Properties};

    fn street(element_nr: &str) -> Feature {
        let mut properties = Properties::new();
        properties.insert("element_nr".to_string(), json!(element_nr));
        properties.insert(
            "forecast_range_iso8601".to_string(),
            json!("R3/2022-10-30T14:00:00.000000Z/PT1H"),
        );
        properties.insert("no2".to_string(), json!([44.6, 45.2, 46.1]));
        properties.insert("pm2.5".to_string(), json!([31.8, -0.0, 1e-7]));
        Feature::new(
            Geometry::new(
                GeometryType::LineString,
                json!([[392123.4, 5807250.7], [392143.3, 5807248.6]]),
            ),
            properties,
        )
    }

    #[test]
    fn test_path() {
        let store = SnapshotStore::new("/var/cache/aqcast");
        assert_eq!(
            store.path(DatasetKind::Lor),
            PathBuf::from("/var/cache/aqcast/lor.msgpack")
        );
    }

    #[test]
    fn test_write_then_read_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let collection = FeatureCollection::new(vec![street("a"), street("b")]);

        store.write(DatasetKind::Streets, &collection).unwrap();
        let read = store.read(DatasetKind::Streets).unwrap();

        assert_eq!(read, collection);
        assert_eq!(
            serde_json::to_string(&read).unwrap(),
            serde_json::to_string(&collection).unwrap()
        );
    }

    #[test]
    fn test_write_replaces_whole_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested"));

        store
            .write(DatasetKind::Streets, &FeatureCollection::new(vec![street("a"), street("b")]))
            .unwrap();
        store
            .write(DatasetKind::Streets, &FeatureCollection::new(vec![street("c")]))
            .unwrap();

        let read = store.read(DatasetKind::Streets).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.features[0].properties["element_nr"], json!("c"));

        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_modified_tracks_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let before = Utc::now() - chrono::TimeDelta::seconds(5);

        store
            .write(DatasetKind::Grid, &FeatureCollection::default())
            .unwrap();

        assert!(store.modified(DatasetKind::Grid).unwrap() > before);
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        assert!(matches!(store.read(DatasetKind::Lor), Err(SnapshotError::Io { .. })));
        assert!(matches!(store.modified(DatasetKind::Lor), Err(SnapshotError::Io { .. })));
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        fs::write(store.path(DatasetKind::Stations), b"not msgpack").unwrap();

        assert!(matches!(
            store.read(DatasetKind::Stations),
            Err(SnapshotError::Decode { .. })
        ));
    }
}
