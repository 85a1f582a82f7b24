//! GeoJSON input for coverage layers.
//!
//! Accepts `Polygon`, `MultiPolygon`, `Feature` and `FeatureCollection`
//! documents. Features with a null geometry are skipped; any other geometry
//! type is rejected. Coordinates are taken as-is in the mask's spatial
//! reference (only `x` and `y` are read).

use serde_json::Value;
use std::path::Path;

use super::{CoverageLayer, Polygon, Ring};
use crate::error::{GeometryError, RasterProcessorError, Result};

/// Parse a GeoJSON document into a coverage layer.
pub fn layer_from_str(text: &str) -> std::result::Result<CoverageLayer, GeometryError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| GeometryError::Unsupported(format!("invalid GeoJSON: {}", e)))?;
    let mut polygons = Vec::new();
    collect(&value, &mut polygons)?;
    Ok(CoverageLayer::new(polygons))
}

/// Read a GeoJSON file into a coverage layer.
pub fn read_layer(path: &Path) -> Result<CoverageLayer> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| RasterProcessorError::io(format!("{}: {}", path.display(), e)))?;
    Ok(layer_from_str(&text)?)
}

fn collect(value: &Value, out: &mut Vec<Polygon>) -> std::result::Result<(), GeometryError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeometryError::Unsupported("object without a 'type'".to_string()))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| GeometryError::Unsupported("FeatureCollection without features".to_string()))?;
            for feature in features {
                collect(feature, out)?;
            }
        }
        "Feature" => match value.get("geometry") {
            None | Some(Value::Null) => {}
            Some(geometry) => collect(geometry, out)?,
        },
        "Polygon" => out.push(polygon(coordinates(value)?)?),
        "MultiPolygon" => {
            let parts = coordinates(value)?
                .as_array()
                .ok_or_else(|| GeometryError::Unsupported("MultiPolygon coordinates must be an array".to_string()))?;
            for part in parts {
                out.push(polygon(part)?);
            }
        }
        other => {
            return Err(GeometryError::Unsupported(format!(
                "geometry type '{}' cannot be used as a mask",
                other
            )))
        }
    }
    Ok(())
}

fn coordinates(value: &Value) -> std::result::Result<&Value, GeometryError> {
    value
        .get("coordinates")
        .ok_or_else(|| GeometryError::Unsupported("geometry without coordinates".to_string()))
}

fn polygon(value: &Value) -> std::result::Result<Polygon, GeometryError> {
    let rings = value
        .as_array()
        .ok_or_else(|| GeometryError::Unsupported("polygon must be an array of rings".to_string()))?;
    let mut rings = rings.iter().map(ring);
    let exterior = rings
        .next()
        .ok_or_else(|| GeometryError::Unsupported("polygon without an exterior ring".to_string()))??;
    let holes = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, holes))
}

fn ring(value: &Value) -> std::result::Result<Ring, GeometryError> {
    let positions = value
        .as_array()
        .ok_or_else(|| GeometryError::Unsupported("ring must be an array of positions".to_string()))?;
    positions
        .iter()
        .map(|p| {
            let xy = p.as_array().filter(|a| a.len() >= 2).ok_or_else(|| {
                GeometryError::Unsupported("position must have at least two numbers".to_string())
            })?;
            // Non-numbers become NaN and are rejected during healing.
            let x = xy[0].as_f64().unwrap_or(f64::NAN);
            let y = xy[1].as_f64().unwrap_or(f64::NAN);
            Ok([x, y])
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"cycle": 1},
                 "geometry": {"type": "Polygon", "coordinates": [
                    [[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]],
                    [[1, 1], [1, 2], [2, 2], [2, 1], [1, 1]]
                 ]}},
                {"type": "Feature", "properties": {}, "geometry": null},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[10, 10], [11, 10], [11, 11], [10, 10]]],
                    [[[20, 20], [21, 20], [21, 21], [20, 20]]]
                 ]}}
            ]
        }"#;
        let layer = layer_from_str(text).unwrap();
        assert_eq!(layer.polygons.len(), 3);
        assert_eq!(layer.polygons[0].holes.len(), 1);
        assert_eq!(layer.polygons[0].exterior.0[2], [4.0, 4.0]);
    }

    #[test]
    fn test_rejects_lines() {
        let text = r#"{"type": "LineString", "coordinates": [[0, 0], [1, 1]]}"#;
        assert!(matches!(layer_from_str(text), Err(GeometryError::Unsupported(_))));
    }

    #[test]
    fn test_three_dimensional_positions() {
        let text = r#"{"type": "Polygon", "coordinates": [[[0, 0, 5], [1, 0, 5], [1, 1, 5], [0, 0, 5]]]}"#;
        let layer = layer_from_str(text).unwrap();
        assert_eq!(layer.polygons[0].exterior.0[1], [1.0, 0.0]);
    }
}
