//! Empirical (experimental) variogram
//!
//! The semivariance γ(h) measures spatial dissimilarity as a function of
//! separation distance h:
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) − z(xⱼ)]²   over pairs with |xᵢ − xⱼ| ∈ [hₖ, hₖ₊₁)
//! ```
//! Every unordered pair is visited once, so the estimator is O(n²) in time.
//! Rows of the pair matrix are accumulated in parallel and reduced in row
//! order, so results do not depend on the thread count.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. & Hawkins, D.M. (1980). Robust estimation of the variogram.
//! Mathematical Geology, 12(2).

use geostat_core::{
    CancelToken, Error, GeometryProvider, Observation, Result, check_cancelled,
    validate_locations, validate_observations,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kriging::{Trend, fit_trend};
use crate::maybe_rayon::*;

/// Default cutoff as a fraction of the bounding-box diagonal
pub const DEFAULT_CUTOFF_FRACTION: f64 = 1.0 / 3.0;
/// Default number of equal-width bins below the cutoff
pub const DEFAULT_BIN_COUNT: usize = 15;

/// Semivariance estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimator {
    /// Method of moments: mean of ½(zᵢ − zⱼ)²
    #[default]
    Matheron,
    /// Cressie–Hawkins: ½ (mean |zᵢ − zⱼ|^½)⁴ / (0.457 + 0.494/N)
    Cressie,
}

/// Parameters for [`empirical_variogram`]
#[derive(Debug, Clone)]
pub struct VariogramParams<L> {
    /// Maximum pair distance. Default: bounding diagonal / 3.
    pub cutoff: Option<f64>,
    /// Bin width. Default: cutoff / 15.
    pub width: Option<f64>,
    /// Explicit, strictly increasing bin edges. Overrides cutoff and width;
    /// the last edge becomes the cutoff.
    pub boundaries: Option<Vec<f64>>,
    pub estimator: Estimator,
    /// Mean model removed before pairing. `None` or an intercept-only trend
    /// uses the raw values.
    pub trend: Option<Trend<L>>,
    pub cancel: Option<CancelToken>,
}

impl<L> Default for VariogramParams<L> {
    fn default() -> Self {
        Self {
            cutoff: None,
            width: None,
            boundaries: None,
            estimator: Estimator::default(),
            trend: None,
            cancel: None,
        }
    }
}

/// One non-empty distance class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceBin {
    pub lag_lower: f64,
    pub lag_upper: f64,
    /// Mean of the distances that fell into the bin
    pub mean_lag: f64,
    pub pair_count: usize,
    /// Mean squared half-difference (or the robust estimate)
    pub semivariance: f64,
}

/// Non-empty bins in increasing lag order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalVariogram {
    pub bins: Vec<DistanceBin>,
    pub cutoff: f64,
}

impl EmpiricalVariogram {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn total_pairs(&self) -> usize {
        self.bins.iter().map(|b| b.pair_count).sum()
    }
}

/// A single pair of the variogram cloud
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudPair {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
    /// ½(zᵢ − zⱼ)²
    pub half_squared_difference: f64,
}

/// Bin edges resolved from the parameters.
#[derive(Debug, Clone)]
pub(crate) enum Edges {
    Regular { width: f64, count: usize },
    Explicit(Vec<f64>),
}

impl Edges {
    pub(crate) fn resolve(
        cutoff: Option<f64>,
        width: Option<f64>,
        boundaries: Option<&[f64]>,
        diagonal: f64,
    ) -> Result<(Self, f64)> {
        if let Some(b) = boundaries {
            if b.len() < 2 {
                return Err(Error::InvalidParameter {
                    name: "boundaries",
                    value: format!("{b:?}"),
                    reason: "need at least two edges".into(),
                });
            }
            if b[0] < 0.0 || b.iter().any(|v| !v.is_finite()) || b.windows(2).any(|w| w[1] <= w[0]) {
                return Err(Error::InvalidParameter {
                    name: "boundaries",
                    value: format!("{b:?}"),
                    reason: "must be finite, non-negative and strictly increasing".into(),
                });
            }
            let cutoff = b[b.len() - 1];
            return Ok((Edges::Explicit(b.to_vec()), cutoff));
        }

        let cutoff = cutoff.unwrap_or(diagonal * DEFAULT_CUTOFF_FRACTION);
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(Error::InvalidParameter {
                name: "cutoff",
                value: cutoff.to_string(),
                reason: "must be positive (are all locations identical?)".into(),
            });
        }
        let width = width.unwrap_or(cutoff / DEFAULT_BIN_COUNT as f64);
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::InvalidParameter {
                name: "width",
                value: width.to_string(),
                reason: "must be positive".into(),
            });
        }
        let count = ((cutoff / width) - 1e-9).ceil().max(1.0) as usize;
        Ok((Edges::Regular { width, count }, cutoff))
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Edges::Regular { count, .. } => *count,
            Edges::Explicit(b) => b.len() - 1,
        }
    }

    pub(crate) fn bounds(&self, k: usize) -> (f64, f64) {
        match self {
            Edges::Regular { width, .. } => (k as f64 * width, (k + 1) as f64 * width),
            Edges::Explicit(b) => (b[k], b[k + 1]),
        }
    }

    /// Bin holding distance `d`, using half-open `[lower, upper)` classes.
    #[inline]
    pub(crate) fn locate(&self, d: f64) -> Option<usize> {
        match self {
            Edges::Regular { width, count } => {
                let k = (d / width).floor();
                (k >= 0.0 && (k as usize) < *count).then_some(k as usize)
            }
            Edges::Explicit(b) => {
                if d < b[0] || d >= b[b.len() - 1] {
                    return None;
                }
                Some(b.partition_point(|&e| e <= d) - 1)
            }
        }
    }
}

/// Running sums for one bin.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BinSums {
    pub count: usize,
    pub sum_distance: f64,
    pub sum_half_sq: f64,
    pub sum_sqrt_abs: f64,
}

impl BinSums {
    #[inline]
    pub(crate) fn add(&mut self, distance: f64, diff: f64) {
        self.count += 1;
        self.sum_distance += distance;
        self.sum_half_sq += 0.5 * diff * diff;
        self.sum_sqrt_abs += diff.abs().sqrt();
    }

    pub(crate) fn merge(&mut self, other: &BinSums) {
        self.count += other.count;
        self.sum_distance += other.sum_distance;
        self.sum_half_sq += other.sum_half_sq;
        self.sum_sqrt_abs += other.sum_sqrt_abs;
    }

    pub(crate) fn estimate(&self, estimator: Estimator) -> f64 {
        let n = self.count as f64;
        match estimator {
            Estimator::Matheron => self.sum_half_sq / n,
            Estimator::Cressie => {
                let m = self.sum_sqrt_abs / n;
                0.5 * m.powi(4) / (0.457 + 0.494 / n)
            }
        }
    }
}

/// Values entering the pair differences: raw, or trend residuals.
pub(crate) fn working_values<L>(
    observations: &[Observation<L>],
    trend: Option<&Trend<L>>,
) -> Result<Vec<f64>> {
    match trend {
        Some(t) if !t.is_intercept_only() && !t.is_empty() => {
            Ok(fit_trend(t, observations)?.residuals)
        }
        _ => Ok(observations.iter().map(|o| o.value).collect()),
    }
}

/// Compute the empirical variogram of a set of observations.
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer than two observations
/// - [`Error::InvalidObservation`] for non-finite values or covariates
/// - [`Error::InvalidParameter`] for a non-positive cutoff or width, or
///   malformed boundaries
/// - [`Error::Cancelled`] when the token fires between rows
pub fn empirical_variogram<G: GeometryProvider>(
    geometry: &G,
    observations: &[Observation<G::Location>],
    params: &VariogramParams<G::Location>,
) -> Result<EmpiricalVariogram> {
    validate_observations(observations)?;
    validate_locations(geometry, observations)?;
    let n = observations.len();
    if n < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: n,
            context: "empirical variogram".into(),
        });
    }

    let locations: Vec<G::Location> = observations.iter().map(|o| o.location.clone()).collect();
    let diagonal = geometry.bounding_diagonal(&locations);
    let (edges, cutoff) = Edges::resolve(
        params.cutoff,
        params.width,
        params.boundaries.as_deref(),
        diagonal,
    )?;
    let values = working_values(observations, params.trend.as_ref())?;
    let n_bins = edges.len();

    let rows: Vec<Vec<BinSums>> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<Vec<BinSums>> {
            check_cancelled(params.cancel.as_ref(), "empirical variogram")?;
            let mut sums = vec![BinSums::default(); n_bins];
            for j in (i + 1)..n {
                let d = geometry.distance(&locations[i], &locations[j]);
                if d > cutoff {
                    continue;
                }
                if let Some(k) = edges.locate(d) {
                    sums[k].add(d, values[i] - values[j]);
                }
            }
            Ok(sums)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut totals = vec![BinSums::default(); n_bins];
    for row in &rows {
        for (t, s) in totals.iter_mut().zip(row) {
            t.merge(s);
        }
    }

    let bins: Vec<DistanceBin> = totals
        .iter()
        .enumerate()
        .filter(|(_, s)| s.count > 0)
        .map(|(k, s)| {
            let (lag_lower, lag_upper) = edges.bounds(k);
            DistanceBin {
                lag_lower,
                lag_upper,
                mean_lag: s.sum_distance / s.count as f64,
                pair_count: s.count,
                semivariance: s.estimate(params.estimator),
            }
        })
        .collect();

    debug!(
        observations = n,
        cutoff,
        bins = bins.len(),
        "empirical variogram computed"
    );
    Ok(EmpiricalVariogram { bins, cutoff })
}

/// Every pair within the cutoff with its half squared difference, ordered
/// by `(i, j)`. Default cutoff as in [`empirical_variogram`]; bin settings
/// are ignored.
pub fn variogram_cloud<G: GeometryProvider>(
    geometry: &G,
    observations: &[Observation<G::Location>],
    params: &VariogramParams<G::Location>,
) -> Result<Vec<CloudPair>> {
    validate_observations(observations)?;
    validate_locations(geometry, observations)?;
    let locations: Vec<G::Location> = observations.iter().map(|o| o.location.clone()).collect();
    let cutoff = params
        .cutoff
        .unwrap_or(geometry.bounding_diagonal(&locations) * DEFAULT_CUTOFF_FRACTION);
    let values = working_values(observations, params.trend.as_ref())?;

    let mut cloud = Vec::new();
    for i in 0..observations.len() {
        check_cancelled(params.cancel.as_ref(), "variogram cloud")?;
        for j in (i + 1)..observations.len() {
            let distance = geometry.distance(&locations[i], &locations[j]);
            if distance <= cutoff {
                let dz = values[i] - values[j];
                cloud.push(CloudPair {
                    i,
                    j,
                    distance,
                    half_squared_difference: 0.5 * dz * dz,
                });
            }
        }
    }
    Ok(cloud)
}
