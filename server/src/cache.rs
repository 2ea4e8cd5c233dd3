//! In-memory feature collections, kept in sync with the snapshot files.
//!
//! Every dataset has its own slot holding an `Arc` of the current collection.
//! Reloads read and decode a snapshot outside of any lock, then swap the `Arc`
//! under a short write lock: readers get either the previous or the new
//! collection, never a mix of both.
//!
//! A single watermark, shared by all datasets, records when snapshots were
//! last checked. A snapshot is reloaded when its modification time is newer
//! than the watermark.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use shared::models::CollectionTag;
use shared::{DatasetKind, Feature, FeatureCollection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::snapshot::SnapshotStore;
use crate::stopwatch::Stopwatch;

/// Delay between two snapshot polls.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(60);

type Slot = RwLock<Option<Arc<FeatureCollection>>>;

#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

struct Inner {
    store: SnapshotStore,
    /// Indexed by `DatasetKind as usize`.
    slots: [Slot; 5],
    last_loaded_at: RwLock<DateTime<Utc>>,
    /// Set once every slot holds a collection. Slots are never emptied again.
    ready: AtomicBool,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub reloaded: Vec<DatasetKind>,
    pub unchanged: Vec<DatasetKind>,
    pub failed: Vec<(DatasetKind, String)>,
}

impl Cache {
    /// An empty cache: nothing is loaded until [`Cache::load_all`] runs.
    pub fn new(store: SnapshotStore) -> Self {
        Cache {
            inner: Arc::new(Inner {
                store,
                slots: DatasetKind::ALL.map(|_| RwLock::new(None)),
                last_loaded_at: RwLock::new(DateTime::UNIX_EPOCH),
                ready: AtomicBool::new(false),
            }),
        }
    }

    fn slot(&self, kind: DatasetKind) -> &Slot {
        &self.inner.slots[kind as usize]
    }

    pub async fn last_loaded_at(&self) -> DateTime<Utc> {
        *self.inner.last_loaded_at.read().await
    }

    /// Reload every dataset whose snapshot changed since the last call.
    ///
    /// The watermark moves to "now" once all datasets have been checked, even
    /// for datasets that failed to reload: those keep serving their previous
    /// collection until their snapshot changes again.
    pub async fn load_all(&self) -> LoadReport {
        let _stopwatch = Stopwatch::start("load snapshots");
        let watermark = self.last_loaded_at().await;
        let mut report = LoadReport::default();

        for kind in DatasetKind::ALL {
            match self.reload_if_modified(kind, watermark).await {
                Ok(true) => report.reloaded.push(kind),
                Ok(false) => {
                    log::debug!("No update needed for {}", kind);
                    report.unchanged.push(kind);
                }
                Err(e) => {
                    log::warn!("Could not reload {}: {:#}", kind, e);
                    report.failed.push((kind, format!("{:#}", e)));
                }
            }
        }

        if !self.is_ready() && self.all_loaded().await {
            log::info!("Every dataset loaded, ready to serve");
            self.inner.ready.store(true, Ordering::Release);
        }

        *self.inner.last_loaded_at.write().await = Utc::now();
        report
    }

    async fn reload_if_modified(&self, kind: DatasetKind, watermark: DateTime<Utc>) -> Result<bool> {
        let store = self.inner.store.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            if store.modified(kind)? <= watermark {
                return Ok(None);
            }
            let _stopwatch = Stopwatch::start(format!("load {}", kind));
            store.read(kind).map(Some)
        })
        .await
        .context("Snapshot reader panicked")??;

        match loaded {
            Some(collection) => {
                let count = collection.len();
                *self.slot(kind).write().await = Some(Arc::new(collection));
                log::info!("Reloaded {}: {} features", kind, count);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// True once every dataset has been loaded at least once.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    async fn all_loaded(&self) -> bool {
        for slot in self.inner.slots.iter() {
            if slot.read().await.is_none() {
                return false;
            }
        }
        true
    }

    /// The collection currently installed for `kind`.
    pub async fn current(&self, kind: DatasetKind) -> Option<Arc<FeatureCollection>> {
        self.slot(kind).read().await.clone()
    }

    /// Features `[skip, skip + limit)` of `kind`. Stations always come in full.
    ///
    /// Nothing is served before every dataset has been loaded once.
    pub async fn get(&self, kind: DatasetKind, skip: usize, limit: usize) -> Option<FeaturePage> {
        if !self.is_ready() {
            return None;
        }
        let collection = self.current(kind).await?;
        let (skip, limit) = if kind.is_paginated() {
            (skip, limit)
        } else {
            (0, usize::MAX)
        };
        Some(FeaturePage {
            collection,
            skip,
            limit,
        })
    }

    /// Poll snapshots every `period` until the runtime shuts down.
    ///
    /// A failing or panicking poll is logged and the next tick tries again.
    pub async fn refresh_loop(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let cache = self.clone();
            match tokio::spawn(async move { cache.load_all().await }).await {
                Ok(report) if report.failed.is_empty() => {
                    log::debug!(
                        "Snapshots checked: {} reloaded, {} unchanged",
                        report.reloaded.len(),
                        report.unchanged.len()
                    );
                }
                Ok(report) => {
                    log::warn!(
                        "Snapshots checked with {} failure(s), serving previous data for them",
                        report.failed.len()
                    );
                }
                Err(e) => {
                    log::error!("Something went wrong when loading snapshots: {}", e);
                    log::info!("Retrying ...");
                }
            }
        }
    }

    pub fn spawn_refresh(&self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(self.clone().refresh_loop(period))
    }
}

/// A slice of a collection, serialized as a FeatureCollection of its own.
#[derive(Clone, Debug)]
pub struct FeaturePage {
    collection: Arc<FeatureCollection>,
    skip: usize,
    limit: usize,
}

impl FeaturePage {
    pub fn features(&self) -> &[Feature] {
        self.collection.page(self.skip, self.limit)
    }
}

impl Serialize for FeaturePage {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("FeatureCollection", 2)?;
        state.serialize_field("type", &CollectionTag::FeatureCollection)?;
        state.serialize_field("features", self.features())?;
        state.end()
    }
}
