pub mod datasets;
pub mod models;

pub use datasets::{DatasetKind, DatasetSpec, GeometryType};
pub use models::{Feature, FeatureCollection, Geometry, Properties, CRS};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Incorrect dataset kind '{name}'. Possible kinds are 'stations', 'grid', 'streets', 'lor', 'simulation'")]
    InvalidDatasetKind { name: String },

    #[error("Unsupported geometry type '{name}'. Possible types are 'Point', 'LineString', 'MultiPolygon'")]
    UnsupportedGeometryType { name: String },
}
