//! The five forecast datasets and their schema.
//!
//! This table is the single source of truth for key columns, geometry types,
//! property columns and cadence. Transformation, assembly and the HTTP layer
//! all read from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SchemaError;

pub const DATE_TIME_FORECAST_ISO: &str = "date_time_forecast_iso8601";
pub const FORECAST_RANGE_ISO: &str = "forecast_range_iso8601";

/// Offsets (in percent) of the traffic simulation variants.
pub const SIMULATION_OFFSETS: [u32; 11] = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

const POINT_COLUMNS: [&str; 2] = ["x", "y"];
const GEOMETRY_COLUMNS: [&str; 1] = ["geometry"];

const STATIONS_PROPERTIES: [&str; 6] = [
    "station_id",
    DATE_TIME_FORECAST_ISO,
    FORECAST_RANGE_ISO,
    "no2",
    "pm10",
    "pm2.5",
];

const GRID_PROPERTIES: [&str; 6] = [
    "id",
    DATE_TIME_FORECAST_ISO,
    FORECAST_RANGE_ISO,
    "no2",
    "pm10",
    "pm2.5",
];

const STREETS_PROPERTIES: [&str; 6] = [
    "element_nr",
    DATE_TIME_FORECAST_ISO,
    FORECAST_RANGE_ISO,
    "no2",
    "pm10",
    "pm2.5",
];

const LOR_PROPERTIES: [&str; 6] = [
    "PLR_ID",
    DATE_TIME_FORECAST_ISO,
    FORECAST_RANGE_ISO,
    "no2",
    "pm10",
    "pm2.5",
];

const SIMULATION_PROPERTIES: [&str; 36] = [
    "element_nr",
    DATE_TIME_FORECAST_ISO,
    FORECAST_RANGE_ISO,
    "no2_0",
    "no2_10",
    "no2_20",
    "no2_30",
    "no2_40",
    "no2_50",
    "no2_60",
    "no2_70",
    "no2_80",
    "no2_90",
    "no2_100",
    "pm10_0",
    "pm10_10",
    "pm10_20",
    "pm10_30",
    "pm10_40",
    "pm10_50",
    "pm10_60",
    "pm10_70",
    "pm10_80",
    "pm10_90",
    "pm10_100",
    "pm2.5_0",
    "pm2.5_10",
    "pm2.5_20",
    "pm2.5_30",
    "pm2.5_40",
    "pm2.5_50",
    "pm2.5_60",
    "pm2.5_70",
    "pm2.5_80",
    "pm2.5_90",
    "pm2.5_100",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Stations,
    Grid,
    Streets,
    Lor,
    Simulation,
}

impl DatasetKind {
    /// All kinds, in the order the producer updates them.
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Stations,
        DatasetKind::Grid,
        DatasetKind::Streets,
        DatasetKind::Lor,
        DatasetKind::Simulation,
    ];

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn spec(&self) -> &'static DatasetSpec {
        match self {
            DatasetKind::Stations => &STATIONS,
            DatasetKind::Grid => &GRID,
            DatasetKind::Streets => &STREETS,
            DatasetKind::Lor => &LOR,
            DatasetKind::Simulation => &SIMULATION,
        }
    }

    /// Stations are small enough to always be served in full.
    pub fn is_paginated(&self) -> bool {
        !matches!(self, DatasetKind::Stations)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SchemaError::InvalidDatasetKind {
                name: s.to_string(),
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum GeometryType {
    Point,
    LineString,
    MultiPolygon,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::MultiPolygon => "MultiPolygon",
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Point" => Ok(GeometryType::Point),
            "LineString" => Ok(GeometryType::LineString),
            "MultiPolygon" => Ok(GeometryType::MultiPolygon),
            other => Err(SchemaError::UnsupportedGeometryType {
                name: other.to_string(),
            }),
        }
    }
}

/// Static description of one dataset.
#[derive(Debug)]
pub struct DatasetSpec {
    pub kind: DatasetKind,
    pub name: &'static str,
    /// Primary key, also the sort key of a collection.
    pub key_column: &'static str,
    pub geometry: GeometryType,
    /// Feature properties, in output order. Starts with the key and the two
    /// time columns, followed by the pollutant sequences.
    pub property_columns: &'static [&'static str],
    /// Hours between two consecutive forecast values.
    pub cadence_hours: u32,
    /// Source table in the analytical store.
    pub table: &'static str,
}

impl DatasetSpec {
    /// Columns carrying the geometry of a normalized row.
    pub fn geometry_columns(&self) -> &'static [&'static str] {
        match self.geometry {
            GeometryType::Point => &POINT_COLUMNS,
            GeometryType::LineString | GeometryType::MultiPolygon => &GEOMETRY_COLUMNS,
        }
    }

    /// Every column of a normalized row, geometry first.
    pub fn output_columns(&self) -> impl Iterator<Item = &'static str> {
        self.geometry_columns()
            .iter()
            .chain(self.property_columns.iter())
            .copied()
    }

    /// Properties holding per-hour (or per-day) forecast sequences.
    pub fn pollutant_columns(&self) -> &'static [&'static str] {
        &self.property_columns[3..]
    }

    pub fn snapshot_file_name(&self) -> String {
        format!("{}.msgpack", self.name)
    }
}

static STATIONS: DatasetSpec = DatasetSpec {
    kind: DatasetKind::Stations,
    name: "stations",
    key_column: "station_id",
    geometry: GeometryType::Point,
    property_columns: &STATIONS_PROPERTIES,
    cadence_hours: 1,
    table: "api_stations",
};

static GRID: DatasetSpec = DatasetSpec {
    kind: DatasetKind::Grid,
    name: "grid",
    key_column: "id",
    geometry: GeometryType::Point,
    property_columns: &GRID_PROPERTIES,
    cadence_hours: 1,
    table: "api_grid",
};

static STREETS: DatasetSpec = DatasetSpec {
    kind: DatasetKind::Streets,
    name: "streets",
    key_column: "element_nr",
    geometry: GeometryType::LineString,
    property_columns: &STREETS_PROPERTIES,
    cadence_hours: 1,
    table: "api_streets",
};

static LOR: DatasetSpec = DatasetSpec {
    kind: DatasetKind::Lor,
    name: "lor",
    key_column: "PLR_ID",
    geometry: GeometryType::MultiPolygon,
    property_columns: &LOR_PROPERTIES,
    cadence_hours: 24,
    table: "api_lor",
};

static SIMULATION: DatasetSpec = DatasetSpec {
    kind: DatasetKind::Simulation,
    name: "simulation",
    key_column: "element_nr",
    geometry: GeometryType::LineString,
    property_columns: &SIMULATION_PROPERTIES,
    cadence_hours: 24,
    table: "api_simulation",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.name().parse::<DatasetKind>().unwrap(), kind);
            assert_eq!(kind.spec().kind, kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "roads".parse::<DatasetKind>().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDatasetKind { ref name } if name == "roads"));
    }

    #[test]
    fn test_geometry_types() {
        assert_eq!(DatasetKind::Stations.spec().geometry, GeometryType::Point);
        assert_eq!(DatasetKind::Grid.spec().geometry, GeometryType::Point);
        assert_eq!(DatasetKind::Streets.spec().geometry, GeometryType::LineString);
        assert_eq!(DatasetKind::Lor.spec().geometry, GeometryType::MultiPolygon);
        assert_eq!(DatasetKind::Simulation.spec().geometry, GeometryType::LineString);
        assert!("Polygon".parse::<GeometryType>().is_err());
    }

    #[test]
    fn test_key_column_leads_properties() {
        for kind in DatasetKind::ALL {
            let spec = kind.spec();
            assert_eq!(spec.property_columns[0], spec.key_column);
            assert_eq!(spec.property_columns[1], DATE_TIME_FORECAST_ISO);
            assert_eq!(spec.property_columns[2], FORECAST_RANGE_ISO);
        }
    }

    #[test]
    fn test_simulation_columns_cover_all_offsets() {
        let pollutants = DatasetKind::Simulation.spec().pollutant_columns();
        assert_eq!(pollutants.len(), 3 * SIMULATION_OFFSETS.len());
        for pollutant in ["no2", "pm10", "pm2.5"] {
            for offset in SIMULATION_OFFSETS {
                let column = format!("{}_{}", pollutant, offset);
                assert!(pollutants.contains(&column.as_str()), "missing {}", column);
            }
        }
    }

    #[test]
    fn test_output_columns() {
        let stations: Vec<_> = DatasetKind::Stations.spec().output_columns().collect();
        assert_eq!(
            stations,
            vec![
                "x",
                "y",
                "station_id",
                DATE_TIME_FORECAST_ISO,
                FORECAST_RANGE_ISO,
                "no2",
                "pm10",
                "pm2.5"
            ]
        );

        let lor: Vec<_> = DatasetKind::Lor.spec().output_columns().collect();
        assert_eq!(lor[0], "geometry");
        assert_eq!(lor[1], "PLR_ID");
    }

    #[test]
    fn test_cadence() {
        assert_eq!(DatasetKind::Stations.spec().cadence_hours, 1);
        assert_eq!(DatasetKind::Lor.spec().cadence_hours, 24);
        assert_eq!(DatasetKind::Simulation.spec().cadence_hours, 24);
    }

    #[test]
    fn test_only_stations_unpaginated() {
        assert!(!DatasetKind::Stations.is_paginated());
        assert!(DatasetKind::Streets.is_paginated());
    }
}
