//! Parametric variogram models
//!
//! A model is an ordered sum of basic structures, each contributing a
//! partial sill `c` and a practical range `a`:
//! ```text
//! γ(h) = Σ cₖ · gₖ(h / aₖ),      C(h) = sill − γ(h),      sill = Σ cₖ
//! ```
//! with unit shapes gₖ(0) = 0 and gₖ(∞) = 1. Ranges are practical ranges:
//! exponential and Gaussian structures reach ~95% of their partial sill at
//! `h = a`.
//!
//! Reference:
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.
//! Chilès, J.-P. & Delfiner, P. (2012). Geostatistics. Wiley, §2.5.

use std::f64::consts::PI;

use geostat_core::{Error, Result};
use serde::{Deserialize, Serialize};

use super::fit::{ParamRole, Parametric};

/// Basic structure family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    /// Pure discontinuity at the origin: γ(h) = c for h > 0
    Nugget,
    /// γ(h) = c·[1 − exp(−3h/a)]
    Exponential,
    /// γ(h) = c·[1.5(h/a) − 0.5(h/a)³] for h ≤ a; c beyond
    Spherical,
    /// γ(h) = c·[1 − exp(−3h²/a²)]
    Gaussian,
    /// γ(h) = c·(2/π)·[r·√(1−r²) + asin r], r = h/a ≤ 1; c beyond
    Circular,
    /// γ(h) = c·[15/8 r − 5/4 r³ + 3/8 r⁵], r = h/a ≤ 1; c beyond
    Pentaspherical,
}

impl StructureKind {
    /// Unit variogram shape at distance `h` for range `a`.
    pub fn unit_gamma(self, h: f64, a: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        if self == StructureKind::Nugget || a <= 0.0 {
            return 1.0;
        }
        let r = h / a;
        match self {
            StructureKind::Nugget => 1.0,
            StructureKind::Exponential => 1.0 - (-3.0 * r).exp(),
            StructureKind::Gaussian => 1.0 - (-3.0 * r * r).exp(),
            StructureKind::Spherical => {
                if r >= 1.0 {
                    1.0
                } else {
                    1.5 * r - 0.5 * r * r * r
                }
            }
            StructureKind::Circular => {
                if r >= 1.0 {
                    1.0
                } else {
                    2.0 / PI * (r * (1.0 - r * r).sqrt() + r.asin())
                }
            }
            StructureKind::Pentaspherical => {
                if r >= 1.0 {
                    1.0
                } else {
                    let r3 = r * r * r;
                    15.0 / 8.0 * r - 5.0 / 4.0 * r3 + 3.0 / 8.0 * r3 * r * r
                }
            }
        }
    }

    /// Short code used on the command line and in logs.
    pub fn code(self) -> &'static str {
        match self {
            StructureKind::Nugget => "nug",
            StructureKind::Exponential => "exp",
            StructureKind::Spherical => "sph",
            StructureKind::Gaussian => "gau",
            StructureKind::Circular => "cir",
            StructureKind::Pentaspherical => "pen",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "nug" | "nugget" => Some(StructureKind::Nugget),
            "exp" | "exponential" => Some(StructureKind::Exponential),
            "sph" | "spherical" => Some(StructureKind::Spherical),
            "gau" | "gaussian" => Some(StructureKind::Gaussian),
            "cir" | "circular" => Some(StructureKind::Circular),
            "pen" | "pentaspherical" => Some(StructureKind::Pentaspherical),
            _ => None,
        }
    }
}

/// One term of a nested model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub kind: StructureKind,
    pub partial_sill: f64,
    /// Practical range; ignored for the nugget
    pub range: f64,
}

impl Structure {
    pub fn new(kind: StructureKind, partial_sill: f64, range: f64) -> Self {
        Self {
            kind,
            partial_sill,
            range,
        }
    }

    pub fn nugget(partial_sill: f64) -> Self {
        Self::new(StructureKind::Nugget, partial_sill, 0.0)
    }

    #[inline]
    pub fn gamma(&self, h: f64) -> f64 {
        self.partial_sill * self.kind.unit_gamma(h, self.range)
    }
}

/// Nested variogram model. Construct through [`VariogramModel::new`] so the
/// structure list is validated.
#[derive(Debug, Clone, PartialEq)]
pub struct VariogramModel {
    structures: Vec<Structure>,
}

impl VariogramModel {
    /// Validate and wrap a structure list.
    ///
    /// # Errors
    /// [`Error::InvalidModel`] for an empty list, more than one nugget, or a
    /// negative / non-finite sill or range.
    pub fn new(structures: Vec<Structure>) -> Result<Self> {
        if structures.is_empty() {
            return Err(Error::InvalidModel("model has no structures".into()));
        }
        let nuggets = structures
            .iter()
            .filter(|s| s.kind == StructureKind::Nugget)
            .count();
        if nuggets > 1 {
            return Err(Error::InvalidModel(format!(
                "at most one nugget structure allowed, got {nuggets}"
            )));
        }
        for (i, s) in structures.iter().enumerate() {
            if !s.partial_sill.is_finite() || s.partial_sill < 0.0 {
                return Err(Error::InvalidModel(format!(
                    "structure {i} ({}) has invalid partial sill {}",
                    s.kind.code(),
                    s.partial_sill
                )));
            }
            if !s.range.is_finite() || s.range < 0.0 {
                return Err(Error::InvalidModel(format!(
                    "structure {i} ({}) has invalid range {}",
                    s.kind.code(),
                    s.range
                )));
            }
        }
        Ok(Self { structures })
    }

    /// Single structure, optionally with a nugget.
    pub fn simple(kind: StructureKind, nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        let mut structures = Vec::with_capacity(2);
        if nugget > 0.0 {
            structures.push(Structure::nugget(nugget));
        }
        structures.push(Structure::new(kind, partial_sill, range));
        Self::new(structures)
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// Nugget partial sill (0 when the model has no nugget).
    pub fn nugget(&self) -> f64 {
        self.structures
            .iter()
            .filter(|s| s.kind == StructureKind::Nugget)
            .map(|s| s.partial_sill)
            .sum()
    }

    /// Total sill, nugget included.
    pub fn sill(&self) -> f64 {
        self.structures.iter().map(|s| s.partial_sill).sum()
    }

    /// Semivariance at distance `h`; γ(0) = 0.
    pub fn gamma(&self, h: f64) -> f64 {
        self.structures.iter().map(|s| s.gamma(h)).sum()
    }

    /// Covariance at distance `h`; C(0) equals the total sill.
    pub fn covariance(&self, h: f64) -> f64 {
        self.sill() - self.gamma(h)
    }

    /// Largest range among the non-nugget structures.
    pub fn max_range(&self) -> f64 {
        self.structures
            .iter()
            .filter(|s| s.kind != StructureKind::Nugget)
            .map(|s| s.range)
            .fold(0.0, f64::max)
    }

    /// Serializable parameter record.
    pub fn to_record(&self) -> ModelRecord {
        ModelRecord {
            structures: self
                .structures
                .iter()
                .filter(|s| s.kind != StructureKind::Nugget)
                .map(|s| StructureRecord {
                    kind: s.kind,
                    partial_sill: s.partial_sill,
                    range: s.range,
                })
                .collect(),
            nugget: self.nugget(),
            sill: self.sill(),
        }
    }

    pub fn from_record(record: &ModelRecord) -> Result<Self> {
        let mut structures = Vec::with_capacity(record.structures.len() + 1);
        if record.nugget > 0.0 {
            structures.push(Structure::nugget(record.nugget));
        }
        for s in &record.structures {
            if s.kind == StructureKind::Nugget {
                return Err(Error::InvalidModel(
                    "nugget belongs in the record's nugget field".into(),
                ));
            }
            structures.push(Structure::new(s.kind, s.partial_sill, s.range));
        }
        Self::new(structures)
    }
}

impl std::fmt::Display for VariogramModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, s) in self.structures.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            if s.kind == StructureKind::Nugget {
                write!(f, "{:.6} nug", s.partial_sill)?;
            } else {
                write!(f, "{:.6} {}({:.6})", s.partial_sill, s.kind.code(), s.range)?;
            }
        }
        Ok(())
    }
}

impl Parametric for VariogramModel {
    type Lag = f64;

    fn parameters(&self) -> Vec<f64> {
        let mut p = Vec::with_capacity(self.structures.len() * 2);
        for s in &self.structures {
            p.push(s.partial_sill);
            if s.kind != StructureKind::Nugget {
                p.push(s.range);
            }
        }
        p
    }

    fn roles(&self) -> Vec<ParamRole> {
        let mut roles = Vec::with_capacity(self.structures.len() * 2);
        for s in &self.structures {
            if s.kind == StructureKind::Nugget {
                roles.push(ParamRole::Nugget);
            } else {
                roles.push(ParamRole::Sill);
                roles.push(ParamRole::Range);
            }
        }
        roles
    }

    fn upper_bounds(&self) -> Vec<f64> {
        vec![f64::INFINITY; self.parameters().len()]
    }

    fn with_parameters(&self, params: &[f64]) -> Self {
        let mut structures = self.structures.clone();
        let mut it = params.iter().copied();
        for s in &mut structures {
            s.partial_sill = it.next().unwrap_or(s.partial_sill);
            if s.kind != StructureKind::Nugget {
                s.range = it.next().unwrap_or(s.range);
            }
        }
        Self { structures }
    }

    fn gamma_at(&self, lag: f64) -> f64 {
        self.gamma(lag)
    }
}

/// One non-nugget structure in a [`ModelRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub kind: StructureKind,
    pub partial_sill: f64,
    pub range: f64,
}

/// Field set handed to reporting collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub structures: Vec<StructureRecord>,
    pub nugget: f64,
    pub sill: f64,
}
