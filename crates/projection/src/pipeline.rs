//! Ordered coordinate pipelines and the PROJ-style string parser.
//!
//! Accepted syntax is a subset of PROJ pipeline strings:
//!
//! ```text
//! +proj=pipeline +ellps=bessel
//!   +step +inv +proj=krovak
//!   +step +proj=cart
//!   +step +proj=helmert +x=570.8 +y=85.7 +z=462.8 +convention=position_vector
//!   +step +inv +proj=cart +ellps=WGS84
//!   +step +proj=webmerc
//! ```
//!
//! Parameters given before the first `+step` are global and apply to every
//! step unless the step overrides them. A string without `+proj=pipeline`
//! describes a single step.

use crate::ellipsoid::Ellipsoid;
use crate::error::{ProjectionError, Result};
use crate::steps::{
    krovak, Geocentric, GridShift, Helmert, HelmertConvention, Krovak, LambertConformal, Step,
    StepKind, TransverseMercator, WebMercator,
};
use crate::{Coord, GridResolver};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// An ordered list of invertible steps.
#[derive(Debug, Clone, Default)]
pub struct CoordinatePipeline {
    steps: Vec<Step>,
}

impl CoordinatePipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Pipeline that leaves coordinates unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Parse a PROJ-style pipeline string, resolving grids through `grids`.
    pub fn parse(definition: &str, grids: &dyn GridResolver) -> Result<Self> {
        let tokens = tokenize(definition)?;
        if tokens.is_empty() {
            return Err(ProjectionError::Parse("empty pipeline definition".into()));
        }

        let is_pipeline = tokens
            .iter()
            .any(|t| t.key == "proj" && t.value.as_deref() == Some("pipeline"));

        let steps = if is_pipeline {
            let mut globals = Vec::new();
            let mut groups: Vec<Vec<Token>> = Vec::new();
            for token in tokens {
                if token.key == "step" {
                    groups.push(Vec::new());
                } else if token.key == "proj" && token.value.as_deref() == Some("pipeline") {
                    continue;
                } else if let Some(group) = groups.last_mut() {
                    group.push(token);
                } else {
                    globals.push(token);
                }
            }
            if groups.is_empty() {
                return Err(ProjectionError::Parse(
                    "pipeline has no +step entries".into(),
                ));
            }
            groups
                .into_iter()
                .map(|group| build_step(&globals, group, grids))
                .collect::<Result<Vec<_>>>()?
        } else {
            if tokens.iter().any(|t| t.key == "step") {
                return Err(ProjectionError::Parse(
                    "+step requires +proj=pipeline".into(),
                ));
            }
            vec![build_step(&[], tokens, grids)?]
        };

        debug!(
            steps = steps.len(),
            names = ?steps.iter().map(Step::name).collect::<Vec<_>>(),
            "Parsed coordinate pipeline"
        );
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_identity(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.kind(), StepKind::Identity))
    }

    /// Apply all steps left to right.
    pub fn forward(&self, c: Coord) -> Coord {
        self.steps.iter().fold(c, |c, step| step.forward(c))
    }

    /// Apply the inverse of every step, right to left.
    pub fn inverse(&self, c: Coord) -> Coord {
        self.steps.iter().rev().fold(c, |c, step| step.inverse(c))
    }

    /// Pipeline running in the opposite direction.
    pub fn inverted(&self) -> Self {
        Self {
            steps: self.steps.iter().rev().cloned().map(Step::inverted).collect(),
        }
    }
}

impl fmt::Display for CoordinatePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+proj=pipeline")?;
        for step in &self.steps {
            write!(f, " {}", step)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Token {
    key: String,
    value: Option<String>,
}

fn tokenize(definition: &str) -> Result<Vec<Token>> {
    definition
        .split_whitespace()
        .map(|raw| {
            let body = raw.strip_prefix('+').unwrap_or(raw);
            if body.is_empty() {
                return Err(ProjectionError::Parse(format!("empty token '{}'", raw)));
            }
            Ok(match body.split_once('=') {
                Some((key, _)) if key.is_empty() => {
                    return Err(ProjectionError::Parse(format!("missing key in '{}'", raw)))
                }
                Some((key, value)) => Token {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                },
                None => Token {
                    key: body.to_string(),
                    value: None,
                },
            })
        })
        .collect()
}

/// Parameters of one step: step-local values override globals.
struct Params<'a> {
    step: String,
    values: HashMap<&'a str, Option<&'a str>>,
}

impl<'a> Params<'a> {
    fn new(globals: &'a [Token], local: &'a [Token]) -> Self {
        let mut values = HashMap::new();
        for token in globals.iter().chain(local.iter()) {
            values.insert(token.key.as_str(), token.value.as_deref());
        }
        let step = values
            .get("proj")
            .copied()
            .flatten()
            .unwrap_or("")
            .to_string();
        Self { step, values }
    }

    fn flag(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn string(&self, key: &str) -> Option<&'a str> {
        self.values.get(key).copied().flatten()
    }

    fn number(&self, key: &str) -> Result<Option<f64>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(None) => Err(ProjectionError::invalid(
                &self.step,
                format!("+{} needs a value", key),
            )),
            Some(Some(raw)) => {
                let v: f64 = raw.parse().map_err(|_| {
                    ProjectionError::invalid(&self.step, format!("+{}={} is not a number", key, raw))
                })?;
                if !v.is_finite() {
                    return Err(ProjectionError::invalid(
                        &self.step,
                        format!("+{} must be finite", key),
                    ));
                }
                Ok(Some(v))
            }
        }
    }

    fn number_or(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.number(key)?.unwrap_or(default))
    }

    fn ellipsoid(&self) -> Result<Ellipsoid> {
        self.ellipsoid_or(Ellipsoid::WGS84)
    }

    /// The ellipsoid named by the parameters, or `default` when none is.
    fn ellipsoid_or(&self, default: Ellipsoid) -> Result<Ellipsoid> {
        if let Some(r) = self.number("R")? {
            return Ellipsoid::sphere(r);
        }
        if let Some(a) = self.number("a")? {
            if let Some(rf) = self.number("rf")? {
                return Ellipsoid::from_inverse_flattening(a, rf);
            }
            if let Some(b) = self.number("b")? {
                return Ellipsoid::from_axes(a, b);
            }
            return Ellipsoid::sphere(a);
        }
        match self.string("ellps") {
            Some(name) => Ellipsoid::from_name(name),
            None => Ok(default),
        }
    }
}

fn build_step(globals: &[Token], local: Vec<Token>, grids: &dyn GridResolver) -> Result<Step> {
    let params = Params::new(globals, &local);
    let kind = match params.step.as_str() {
        "" => return Err(ProjectionError::Parse("step is missing +proj".into())),
        "longlat" | "latlong" | "lonlat" | "latlon" | "noop" => StepKind::Identity,
        "webmerc" => {
            let radius = params.ellipsoid()?.a;
            StepKind::WebMercator(WebMercator::new(
                radius,
                params.number_or("lon_0", 0.0)?,
                params.number_or("x_0", 0.0)?,
                params.number_or("y_0", 0.0)?,
            )?)
        }
        "tmerc" => StepKind::TransverseMercator(TransverseMercator::new(
            params.ellipsoid()?,
            params.number_or("lat_0", 0.0)?,
            params.number_or("lon_0", 0.0)?,
            match params.number("k_0")? {
                Some(k) => k,
                None => params.number_or("k", 1.0)?,
            },
            params.number_or("x_0", 0.0)?,
            params.number_or("y_0", 0.0)?,
        )?),
        "utm" => {
            let zone = params
                .number("zone")?
                .ok_or_else(|| ProjectionError::invalid("utm", "+zone is required"))?;
            if zone.fract() != 0.0 || !(1.0..=60.0).contains(&zone) {
                return Err(ProjectionError::invalid(
                    "utm",
                    format!("zone must be an integer in 1..=60, got {}", zone),
                ));
            }
            let lon_0 = (zone - 1.0) * 6.0 - 177.0;
            let y_0 = if params.flag("south") { 10_000_000.0 } else { 0.0 };
            StepKind::TransverseMercator(TransverseMercator::new(
                params.ellipsoid()?,
                0.0,
                lon_0,
                0.9996,
                500_000.0,
                y_0,
            )?)
        }
        "lcc" => {
            let lat_1 = params
                .number("lat_1")?
                .ok_or_else(|| ProjectionError::invalid("lcc", "+lat_1 is required"))?;
            StepKind::LambertConformal(LambertConformal::new(
                params.ellipsoid()?,
                params.number_or("lat_0", lat_1)?,
                params.number_or("lon_0", 0.0)?,
                lat_1,
                params.number_or("lat_2", lat_1)?,
                match params.number("k_0")? {
                    Some(k) => k,
                    None => params.number_or("k", 1.0)?,
                },
                params.number_or("x_0", 0.0)?,
                params.number_or("y_0", 0.0)?,
            )?)
        }
        "krovak" => StepKind::Krovak(Krovak::new(
            params.ellipsoid_or(Ellipsoid::BESSEL)?,
            params.number_or("lat_0", krovak::DEFAULT_LAT_0)?,
            params.number_or("lon_0", krovak::DEFAULT_LON_0)?,
            params.number_or("alpha", krovak::DEFAULT_ALPHA)?,
            match params.number("k_0")? {
                Some(k) => k,
                None => params.number_or("k", krovak::DEFAULT_K_0)?,
            },
            params.number_or("x_0", 0.0)?,
            params.number_or("y_0", 0.0)?,
            params.flag("czech"),
        )?),
        "cart" => StepKind::Geocentric(Geocentric::new(params.ellipsoid()?)),
        "helmert" => {
            let convention = params
                .string("convention")
                .map(str::parse::<HelmertConvention>)
                .transpose()?;
            StepKind::Helmert(Helmert::new(
                [
                    params.number_or("x", 0.0)?,
                    params.number_or("y", 0.0)?,
                    params.number_or("z", 0.0)?,
                ],
                [
                    params.number_or("rx", 0.0)?,
                    params.number_or("ry", 0.0)?,
                    params.number_or("rz", 0.0)?,
                ],
                params.number_or("s", 0.0)?,
                convention,
            )?)
        }
        "hgridshift" => {
            let list = params
                .string("grids")
                .ok_or_else(|| ProjectionError::invalid("hgridshift", "+grids is required"))?;
            StepKind::GridShift(GridShift::from_names(list, grids)?)
        }
        other => return Err(ProjectionError::UnknownStep(other.to_string())),
    };

    let step = Step::new(kind);
    Ok(if params.flag("inv") {
        step.inverted()
    } else {
        step
    })
}
