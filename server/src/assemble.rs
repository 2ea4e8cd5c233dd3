//! Feature collection assembly from normalized rows.

use serde::Deserialize;
use serde_json::Value;
use shared::{Feature, FeatureCollection, Geometry, GeometryType, Properties};

use crate::error::AssembleError;
use crate::models::NormalizedRecord;

/// Geometry as stored in the analytical store, e.g.
/// `{"type":"LineString","coordinates":[[392123.4,5807250.7],...]}`.
#[derive(Debug, Deserialize)]
struct GeometryText {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Value,
}

/// Builds one feature per row, in row order.
///
/// Any invalid row fails the whole collection: callers never get a partial
/// result.
pub fn assemble(
    rows: &[NormalizedRecord],
    property_columns: &[&str],
    geometry_type: GeometryType,
) -> Result<FeatureCollection, AssembleError> {
    let features = rows
        .iter()
        .map(|row| -> Result<Feature, AssembleError> {
            let geometry = match geometry_type {
                GeometryType::Point => point_geometry(row)?,
                GeometryType::LineString | GeometryType::MultiPolygon => {
                    parsed_geometry(row, geometry_type)?
                }
            };
            Ok(Feature::new(geometry, properties(row, property_columns)?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeatureCollection::new(features))
}

fn point_geometry(row: &NormalizedRecord) -> Result<Geometry, AssembleError> {
    match (row.get("x"), row.get("y")) {
        (Some(x), Some(y)) => Ok(Geometry::new(
            GeometryType::Point,
            Value::Array(vec![x.clone(), y.clone()]),
        )),
        _ => Err(AssembleError::MissingGeometryFields),
    }
}

fn parsed_geometry(
    row: &NormalizedRecord,
    expected: GeometryType,
) -> Result<Geometry, AssembleError> {
    let parsed: GeometryText = match row.get("geometry") {
        Some(Value::String(text)) => serde_json::from_str(text),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone()),
        Some(other) => {
            return Err(AssembleError::InvalidGeometry {
                message: format!("expected geometry text, found {}", other),
            })
        }
        None => return Err(AssembleError::MissingGeometryFields),
    }
    .map_err(|e| AssembleError::InvalidGeometry {
        message: e.to_string(),
    })?;

    let found: GeometryType = parsed.kind.parse()?;
    if found != expected {
        return Err(AssembleError::GeometryTypeMismatch {
            expected,
            found: parsed.kind,
        });
    }

    Ok(Geometry::new(expected, parsed.coordinates))
}

fn properties(
    row: &NormalizedRecord,
    property_columns: &[&str],
) -> Result<Properties, AssembleError> {
    property_columns
        .iter()
        .map(|column| {
            row.get(column)
                .map(|value| (column.to_string(), value.clone()))
                .ok_or_else(|| AssembleError::MissingProperty {
                    column: column.to_string(),
                })
        })
        .collect()
}
