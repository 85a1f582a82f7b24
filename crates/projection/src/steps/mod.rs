//! Individual pipeline steps.
//!
//! Every step implements [`Transform`]; a [`Step`] wraps one together with
//! its direction so that `+inv` steps can be stored uniformly.

pub mod geocentric;
pub mod gridshift;
pub mod helmert;
pub mod krovak;
pub mod lambert;
pub mod mercator;
pub mod tmerc;

pub use geocentric::Geocentric;
pub use gridshift::GridShift;
pub use helmert::{Helmert, HelmertConvention};
pub use krovak::Krovak;
pub use lambert::LambertConformal;
pub use mercator::WebMercator;
pub use tmerc::TransverseMercator;

use crate::Coord;
use std::fmt;

/// A coordinate operation with an independent inverse.
pub trait Transform: fmt::Debug + Send + Sync {
    /// PROJ operation name, e.g. `tmerc`.
    fn name(&self) -> &'static str;

    fn forward(&self, c: Coord) -> Coord;

    fn inverse(&self, c: Coord) -> Coord;

    /// Parameters in PROJ `key=value` form, excluding `proj=`.
    fn proj_params(&self) -> Vec<String>;
}

/// The concrete operation performed by a [`Step`].
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Leaves coordinates unchanged (`+proj=longlat`, `+proj=noop`).
    Identity,
    WebMercator(WebMercator),
    TransverseMercator(TransverseMercator),
    LambertConformal(LambertConformal),
    Krovak(Krovak),
    Geocentric(Geocentric),
    Helmert(Helmert),
    GridShift(GridShift),
}

impl StepKind {
    fn transform(&self) -> Option<&dyn Transform> {
        match self {
            StepKind::Identity => None,
            StepKind::WebMercator(t) => Some(t),
            StepKind::TransverseMercator(t) => Some(t),
            StepKind::LambertConformal(t) => Some(t),
            StepKind::Krovak(t) => Some(t),
            StepKind::Geocentric(t) => Some(t),
            StepKind::Helmert(t) => Some(t),
            StepKind::GridShift(t) => Some(t),
        }
    }
}

/// One step of a coordinate pipeline: an operation plus its direction.
#[derive(Debug, Clone)]
pub struct Step {
    kind: StepKind,
    inverted: bool,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            inverted: false,
        }
    }

    /// The same operation applied in the opposite direction.
    pub fn inverted(self) -> Self {
        Self {
            inverted: !self.inverted,
            ..self
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.transform().map_or("noop", |t| t.name())
    }

    /// Apply the step in its configured direction.
    pub fn forward(&self, c: Coord) -> Coord {
        self.apply(c, self.inverted)
    }

    /// Apply the step against its configured direction.
    pub fn inverse(&self, c: Coord) -> Coord {
        self.apply(c, !self.inverted)
    }

    fn apply(&self, c: Coord, backwards: bool) -> Coord {
        if !c.is_valid() {
            return Coord::invalid();
        }
        match self.kind.transform() {
            None => c,
            Some(t) if backwards => t.inverse(c).or_invalid(),
            Some(t) => t.forward(c).or_invalid(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+step")?;
        if self.inverted {
            write!(f, " +inv")?;
        }
        write!(f, " +proj={}", self.name())?;
        if let Some(t) = self.kind.transform() {
            for param in t.proj_params() {
                write!(f, " +{}", param)?;
            }
        }
        Ok(())
    }
}

/// Normalize a longitude difference (radians) into `[-PI, PI]`.
pub(crate) fn wrap_pi(mut dlon: f64) -> f64 {
    use std::f64::consts::PI;
    if !dlon.is_finite() {
        return dlon;
    }
    while dlon > PI {
        dlon -= 2.0 * PI;
    }
    while dlon < -PI {
        dlon += 2.0 * PI;
    }
    dlon
}

/// Format an ellipsoid as PROJ parameters.
pub(crate) fn ellps_params(e: &crate::Ellipsoid) -> Vec<String> {
    if e.f == 0.0 {
        vec![format!("R={}", e.a)]
    } else {
        vec![format!("a={}", e.a), format!("rf={}", 1.0 / e.f)]
    }
}
