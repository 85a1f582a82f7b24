//! Spatial reference identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SrsCode {
    /// An EPSG registry code.
    Epsg(u32),
    /// Any other authority/code pair, kept verbatim (e.g. "ESRI:102067").
    Custom(String),
}

impl SrsCode {
    /// WGS84 geographic.
    pub const WGS84: SrsCode = SrsCode::Epsg(4326);
    /// Web Mercator.
    pub const WEB_MERCATOR: SrsCode = SrsCode::Epsg(3857);

    /// Check if this is a geographic (lon/lat) reference we know of.
    pub fn is_geographic(&self) -> bool {
        matches!(self, SrsCode::Epsg(4326 | 4258 | 4269 | 4156))
    }
}

impl FromStr for SrsCode {
    type Err = SrsParseError;

    /// Accepts "EPSG:3857", "epsg:5514", "EPSG:900913" and "AUTH:CODE" forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (authority, code) = trimmed
            .split_once(':')
            .ok_or_else(|| SrsParseError::InvalidFormat(s.to_string()))?;

        if authority.is_empty() || code.is_empty() {
            return Err(SrsParseError::InvalidFormat(s.to_string()));
        }

        if authority.eq_ignore_ascii_case("EPSG") {
            let code: u32 = code
                .parse()
                .map_err(|_| SrsParseError::InvalidCode(s.to_string()))?;
            // Legacy alias for Web Mercator.
            if code == 900913 {
                return Ok(SrsCode::WEB_MERCATOR);
            }
            return Ok(SrsCode::Epsg(code));
        }

        Ok(SrsCode::Custom(format!(
            "{}:{}",
            authority.to_uppercase(),
            code
        )))
    }
}

impl fmt::Display for SrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrsCode::Epsg(code) => write!(f, "EPSG:{}", code),
            SrsCode::Custom(code) => write!(f, "{}", code),
        }
    }
}

impl From<SrsCode> for String {
    fn from(code: SrsCode) -> Self {
        code.to_string()
    }
}

impl TryFrom<String> for SrsCode {
    type Error = SrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A spatial reference: an identifier plus the datum grid-shift files it
/// depends on, if any.
///
/// Immutable once built; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialRef {
    code: SrsCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    grids: Vec<String>,
}

impl SpatialRef {
    pub fn new(code: SrsCode) -> Self {
        Self {
            code,
            grids: Vec::new(),
        }
    }

    /// A reference that needs auxiliary grid-shift data.
    pub fn with_grids(code: SrsCode, grids: Vec<String>) -> Self {
        Self { code, grids }
    }

    pub fn epsg(code: u32) -> Self {
        Self::new(SrsCode::Epsg(code))
    }

    pub fn code(&self) -> &SrsCode {
        &self.code
    }

    pub fn grids(&self) -> &[String] {
        &self.grids
    }
}

impl FromStr for SpatialRef {
    type Err = SrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.parse()?))
    }
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.grids.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} (+grids={})", self.code, self.grids.join(","))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SrsParseError {
    #[error("Invalid spatial reference '{0}', expected 'AUTHORITY:CODE'")]
    InvalidFormat(String),

    #[error("Invalid EPSG code in '{0}'")]
    InvalidCode(String),
}
