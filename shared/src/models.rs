use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::datasets::GeometryType;

/// Coordinate reference system of every served geometry (ETRS89 / UTM 33N).
pub const CRS: &str = "EPSG:25833";

pub type Properties = Map<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FeatureTag {
    #[default]
    Feature,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum CollectionTag {
    #[default]
    FeatureCollection,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryType,
    /// Kept as parsed: a position for points, nested arrays otherwise.
    pub coordinates: Value,
    pub crs: String,
}

impl Geometry {
    pub fn new(kind: GeometryType, coordinates: Value) -> Self {
        Geometry {
            kind,
            coordinates,
            crs: CRS.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub tag: FeatureTag,
    pub geometry: Geometry,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Properties) -> Self {
        Feature {
            tag: FeatureTag::Feature,
            geometry,
            properties,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub tag: CollectionTag,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureCollection {
            tag: CollectionTag::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features `[skip, skip + limit)`, clamped to the collection bounds.
    pub fn page(&self, skip: usize, limit: usize) -> &[Feature] {
        let start = skip.min(self.features.len());
        let end = start.saturating_add(limit).min(self.features.len());
        &self.features[start..end]
    }
}
