//! Seven-parameter Helmert similarity transform on geocentric coordinates.

use super::Transform;
use crate::{Coord, ProjectionError, Result};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Arc-seconds per radian.
const ARCSEC_PER_RAD: f64 = 206_264.806_247_096_36;

/// Sign convention of the rotation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelmertConvention {
    /// EPSG 1033, rotations of the position vector.
    PositionVector,
    /// EPSG 1032, rotations of the coordinate frame.
    CoordinateFrame,
}

impl FromStr for HelmertConvention {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "position_vector" => Ok(Self::PositionVector),
            "coordinate_frame" => Ok(Self::CoordinateFrame),
            other => Err(ProjectionError::invalid(
                "helmert",
                format!("unknown convention '{}'", other),
            )),
        }
    }
}

impl HelmertConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PositionVector => "position_vector",
            Self::CoordinateFrame => "coordinate_frame",
        }
    }
}

/// Helmert transform: `X' = T + (1 + s) * R * X`.
#[derive(Debug, Clone, PartialEq)]
pub struct Helmert {
    /// Translations (meters)
    pub translation: [f64; 3],
    /// Rotations (arc-seconds)
    pub rotation: [f64; 3],
    /// Scale difference (parts per million)
    pub scale_ppm: f64,
    pub convention: Option<HelmertConvention>,
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Helmert {
    /// Build a transform. A convention is required whenever a rotation is
    /// non-zero.
    pub fn new(
        translation: [f64; 3],
        rotation: [f64; 3],
        scale_ppm: f64,
        convention: Option<HelmertConvention>,
    ) -> Result<Self> {
        if translation
            .iter()
            .chain(rotation.iter())
            .chain(std::iter::once(&scale_ppm))
            .any(|v| !v.is_finite())
        {
            return Err(ProjectionError::invalid(
                "helmert",
                "parameters must be finite",
            ));
        }

        let has_rotation = rotation.iter().any(|r| *r != 0.0);
        let sign = match (convention, has_rotation) {
            (None, true) => {
                return Err(ProjectionError::invalid(
                    "helmert",
                    "rotations require +convention=position_vector or coordinate_frame",
                ))
            }
            (Some(HelmertConvention::CoordinateFrame), _) => -1.0,
            _ => 1.0,
        };

        let [rx, ry, rz] = rotation.map(|r| sign * r / ARCSEC_PER_RAD);
        let scale = 1.0 + scale_ppm * 1e-6;
        #[rustfmt::skip]
        let matrix = Matrix3::new(
            1.0, -rz,  ry,
             rz, 1.0, -rx,
            -ry,  rx, 1.0,
        ) * scale;

        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| ProjectionError::NonInvertible("helmert".to_string()))?;

        Ok(Self {
            translation,
            rotation,
            scale_ppm,
            convention,
            matrix,
            inverse,
        })
    }

    /// Translation-only transform.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Result<Self> {
        Self::new([dx, dy, dz], [0.0; 3], 0.0, None)
    }
}

impl Transform for Helmert {
    fn name(&self) -> &'static str {
        "helmert"
    }

    fn forward(&self, c: Coord) -> Coord {
        let t = Vector3::from(self.translation);
        let out = self.matrix * Vector3::new(c.x, c.y, c.z) + t;
        Coord::new(out.x, out.y, out.z)
    }

    fn inverse(&self, c: Coord) -> Coord {
        let t = Vector3::from(self.translation);
        let out = self.inverse * (Vector3::new(c.x, c.y, c.z) - t);
        Coord::new(out.x, out.y, out.z)
    }

    fn proj_params(&self) -> Vec<String> {
        let mut params = Vec::new();
        for (key, v) in ["x", "y", "z"].iter().zip(self.translation) {
            params.push(format!("{}={}", key, v));
        }
        for (key, v) in ["rx", "ry", "rz"].iter().zip(self.rotation) {
            if v != 0.0 {
                params.push(format!("{}={}", key, v));
            }
        }
        if self.scale_ppm != 0.0 {
            params.push(format!("s={}", self.scale_ppm));
        }
        if let Some(convention) = self.convention {
            params.push(format!("convention={}", convention.as_str()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wgs72_to_wgs84_position_vector() {
        // EPSG Guidance Note 7-2, example for method 9606
        let h = Helmert::new(
            [0.0, 0.0, 4.5],
            [0.0, 0.0, 0.554],
            0.219,
            Some(HelmertConvention::PositionVector),
        )
        .unwrap();
        let out = h.forward(Coord::new(3_657_660.66, 255_768.55, 5_201_382.11));
        assert!((out.x - 3_657_660.78).abs() < 0.01, "x = {}", out.x);
        assert!((out.y - 255_778.43).abs() < 0.01, "y = {}", out.y);
        assert!((out.z - 5_201_387.75).abs() < 0.01, "z = {}", out.z);
    }

    #[test]
    fn test_conventions_are_opposite() {
        let c = Coord::new(4_000_000.0, 1_000_000.0, 4_800_000.0);
        let pv = Helmert::new(
            [0.0; 3],
            [1.0, -2.0, 3.0],
            0.0,
            Some(HelmertConvention::PositionVector),
        )
        .unwrap();
        let cf = Helmert::new(
            [0.0; 3],
            [-1.0, 2.0, -3.0],
            0.0,
            Some(HelmertConvention::CoordinateFrame),
        )
        .unwrap();
        let a = pv.forward(c);
        let b = cf.forward(c);
        assert!((a.x - b.x).abs() < 1e-9);
        assert!((a.y - b.y).abs() < 1e-9);
        assert!((a.z - b.z).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let h = Helmert::new(
            [570.8, 85.7, 462.8],
            [4.998, 1.587, 5.261],
            3.56,
            Some(HelmertConvention::CoordinateFrame),
        )
        .unwrap();
        let c = Coord::new(3_980_000.0, 1_210_000.0, 4_830_000.0);
        let back = h.inverse(h.forward(c));
        assert!((back.x - c.x).abs() < 1e-6);
        assert!((back.y - c.y).abs() < 1e-6);
        assert!((back.z - c.z).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_requires_convention() {
        assert!(Helmert::new([0.0; 3], [0.0, 0.0, 1.0], 0.0, None).is_err());
        assert!(Helmert::translation(1.0, 2.0, 3.0).is_ok());
    }

    #[test]
    fn test_degenerate_scale() {
        let err = Helmert::new([0.0; 3], [0.0; 3], -1e6, None).unwrap_err();
        assert!(matches!(err, ProjectionError::NonInvertible(_)));
    }
}
