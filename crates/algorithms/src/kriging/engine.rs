//! Kriging predictor
//!
//! Best linear unbiased prediction at a point or block target from the
//! nearest conditioning observations. With `n` neighbours and `p` trend
//! terms the system is
//! ```text
//! ┌ K   F ┐ ┌ λ ┐   ┌ k₀ ┐        Z*(x₀) = Σ λᵢ z(xᵢ)
//! └ Fᵀ  0 ┘ └ μ ┘ = └ f₀ ┘        σ²(x₀) = C₀ − λᵀk₀ − μᵀf₀
//! ```
//! K is the neighbour covariance matrix, F the trend design, k₀ the
//! neighbour-to-target covariances and f₀ the trend at the target. Block
//! targets average k₀, f₀ and C₀ over the block discretization. A known mean
//! (simple kriging) drops F and μ.
//!
//! Reference:
//! Journel, A.G. & Huijbregts, C.J. (1978). Mining Geostatistics. §V.
//! Webster, R. & Oliver, M.A. (2007). Geostatistics for Environmental Scientists.

use geostat_core::{CancelToken, Error, GeometryProvider, Observation, Result, check_cancelled};
use ndarray::{Array1, Array2};
use tracing::{debug, warn};

use super::covariance::CovarianceFunction;
use super::trend::Trend;
use crate::index::{Neighbor, SpatialIndex};
use crate::linalg;
use crate::maybe_rayon::*;

/// Prediction support
#[derive(Debug, Clone, PartialEq)]
pub enum Target<L, R> {
    Point { location: L, covariates: Vec<f64> },
    /// Region average, discretized by the geometry provider
    Block { region: R, covariates: Vec<f64> },
}

impl<L, R> Target<L, R> {
    pub fn point(location: L) -> Self {
        Target::Point {
            location,
            covariates: Vec::new(),
        }
    }

    pub fn block(region: R) -> Self {
        Target::Block {
            region,
            covariates: Vec::new(),
        }
    }

    /// Attach the covariates used by external-drift trend terms.
    pub fn with_covariates(self, covariates: Vec<f64>) -> Self {
        match self {
            Target::Point { location, .. } => Target::Point {
                location,
                covariates,
            },
            Target::Block { region, .. } => Target::Block { region, covariates },
        }
    }

    pub fn covariates(&self) -> &[f64] {
        match self {
            Target::Point { covariates, .. } | Target::Block { covariates, .. } => covariates,
        }
    }
}

/// Kriging estimate at one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub predicted_value: f64,
    /// Kriging variance, clipped at zero
    pub prediction_variance: f64,
    /// Distinct conditioning locations used
    pub neighbors: usize,
}

/// Parameters for the kriging engine
#[derive(Debug, Clone)]
pub struct KrigingOptions {
    /// Maximum number of neighbours (all observations when `None`)
    pub nmax: Option<usize>,
    /// Only use neighbours within this distance of the target
    pub max_radius: Option<f64>,
    /// Known mean: switches to simple kriging and ignores the trend
    pub mean: Option<f64>,
    /// Diagonal jitter added to the neighbour covariance matrix
    pub ridge: f64,
    /// Negative variances below `−variance_tolerance × C(0)` are reported
    /// with a warning before clipping
    pub variance_tolerance: f64,
    /// Checked once per target in batch prediction
    pub cancel: Option<CancelToken>,
}

impl Default for KrigingOptions {
    fn default() -> Self {
        Self {
            nmax: None,
            max_radius: None,
            mean: None,
            ridge: 0.0,
            variance_tolerance: 1e-6,
            cancel: None,
        }
    }
}

impl KrigingOptions {
    fn validate(&self) -> Result<()> {
        if self.nmax == Some(0) {
            return Err(Error::InvalidParameter {
                name: "nmax",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if let Some(r) = self.max_radius
            && !(r.is_finite() && r > 0.0)
        {
            return Err(Error::InvalidParameter {
                name: "max_radius",
                value: r.to_string(),
                reason: "must be positive".into(),
            });
        }
        if let Some(m) = self.mean
            && !m.is_finite()
        {
            return Err(Error::InvalidParameter {
                name: "mean",
                value: m.to_string(),
                reason: "must be finite".into(),
            });
        }
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "ridge",
                value: self.ridge.to_string(),
                reason: "must be non-negative".into(),
            });
        }
        if !(self.variance_tolerance >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "variance_tolerance",
                value: self.variance_tolerance.to_string(),
                reason: "must be non-negative".into(),
            });
        }
        Ok(())
    }
}

/// A conditioning location after merging coincident neighbours.
struct Conditioning<L> {
    location: L,
    value: f64,
    covariates: Vec<f64>,
    merged: usize,
}

/// Point and block kriging against a [`SpatialIndex`].
///
/// The engine holds only immutable state: one instance can serve any number
/// of threads predicting against a shared index.
#[derive(Debug, Clone)]
pub struct KrigingEngine<G: GeometryProvider, C> {
    geometry: G,
    covariance: C,
    trend: Trend<G::Location>,
    options: KrigingOptions,
}

impl<G, C> KrigingEngine<G, C>
where
    G: GeometryProvider,
    C: CovarianceFunction<G::Location>,
{
    /// # Errors
    /// [`Error::InvalidParameter`] for invalid options, or an empty trend
    /// without a known mean.
    pub fn new(
        geometry: G,
        covariance: C,
        trend: Trend<G::Location>,
        options: KrigingOptions,
    ) -> Result<Self> {
        options.validate()?;
        if options.mean.is_none() && trend.is_empty() {
            return Err(Error::InvalidParameter {
                name: "trend",
                value: "[]".into(),
                reason: "an unknown mean needs at least one trend term".into(),
            });
        }
        Ok(Self {
            geometry,
            covariance,
            trend,
            options,
        })
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn options(&self) -> &KrigingOptions {
        &self.options
    }

    pub fn trend(&self) -> &Trend<G::Location> {
        &self.trend
    }

    /// Number of Lagrange constraints in the system.
    fn n_constraints(&self) -> usize {
        if self.options.mean.is_some() {
            0
        } else {
            self.trend.len()
        }
    }

    /// Support points of a target and the centre its neighbourhood is
    /// searched around (the medoid of the discretization for blocks).
    fn support(
        &self,
        target: &Target<G::Location, G::Region>,
    ) -> Result<(Vec<G::Location>, G::Location)> {
        match target {
            Target::Point { location, .. } => Ok((vec![location.clone()], location.clone())),
            Target::Block { region, .. } => {
                let points = self.geometry.block_discretization(region)?;
                if points.is_empty() {
                    return Err(Error::Geometry("block discretization is empty".into()));
                }
                let medoid = (0..points.len())
                    .map(|i| {
                        let total: f64 = points
                            .iter()
                            .map(|q| self.geometry.distance(&points[i], q))
                            .sum();
                        (i, total)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
                    .map_or(0, |(i, _)| i);
                let centre = points[medoid].clone();
                Ok((points, centre))
            }
        }
    }

    /// Collapse neighbours at identical locations into one averaged datum.
    fn merge_duplicates(&self, neighbors: &[Neighbor<'_, G::Location>]) -> Vec<Conditioning<G::Location>> {
        let mut merged: Vec<Conditioning<G::Location>> = Vec::with_capacity(neighbors.len());
        for nb in neighbors {
            let obs: &Observation<G::Location> = nb.observation;
            let existing = merged
                .iter_mut()
                .find(|c| self.geometry.distance(&c.location, &obs.location) == 0.0);
            match existing {
                Some(c) => {
                    c.value += obs.value;
                    let len = c.covariates.len().min(obs.covariates.len());
                    c.covariates.truncate(len);
                    for (a, b) in c.covariates.iter_mut().zip(&obs.covariates) {
                        *a += b;
                    }
                    c.merged += 1;
                }
                None => merged.push(Conditioning {
                    location: obs.location.clone(),
                    value: obs.value,
                    covariates: obs.covariates.clone(),
                    merged: 1,
                }),
            }
        }

        let mut collapsed = 0;
        for c in merged.iter_mut().filter(|c| c.merged > 1) {
            let k = c.merged as f64;
            c.value /= k;
            for v in &mut c.covariates {
                *v /= k;
            }
            collapsed += c.merged - 1;
        }
        if collapsed > 0 {
            warn!(
                collapsed,
                "merged conditioning observations at identical locations"
            );
        }
        merged
    }

    /// Trend values, rejecting non-finite entries.
    fn trend_row(&self, location: &G::Location, covariates: &[f64], what: &'static str) -> Result<Vec<f64>> {
        let row = self.trend.values(location, covariates);
        if let Some((j, v)) = row.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: what,
                value: v.to_string(),
                reason: format!("trend term '{}' is not finite", self.trend.terms()[j].name()),
            });
        }
        Ok(row)
    }

    /// Predict at one target.
    ///
    /// # Errors
    /// - [`Error::InsufficientNeighbors`] with fewer distinct neighbours than
    ///   trend terms + 1
    /// - [`Error::SingularSystem`] when the system cannot be solved
    /// - [`Error::Geometry`] from block discretization
    /// - [`Error::InvalidParameter`] for non-finite trend values
    pub fn predict<I>(&self, index: &I, target: &Target<G::Location, G::Region>) -> Result<PredictionResult>
    where
        I: SpatialIndex<G::Location>,
    {
        let (support, centre) = self.support(target)?;
        let k = self.options.nmax.unwrap_or(index.len());
        let neighbors = index.k_nearest(&centre, k, self.options.max_radius);
        let data = self.merge_duplicates(&neighbors);

        let n = data.len();
        let p = self.n_constraints();
        if n < p + 1 {
            return Err(Error::InsufficientNeighbors {
                required: p + 1,
                available: n,
            });
        }

        let size = n + p;
        let mut a = Array2::<f64>::zeros((size, size));
        let mut b = Array1::<f64>::zeros(size);
        let m = support.len() as f64;

        for i in 0..n {
            for j in i..n {
                let mut c = self.covariance.covariance(&data[i].location, &data[j].location);
                if i == j {
                    c += self.options.ridge;
                }
                a[[i, j]] = c;
                a[[j, i]] = c;
            }
            b[i] = support
                .iter()
                .map(|s| self.covariance.covariance(&data[i].location, s))
                .sum::<f64>()
                / m;
        }

        if p > 0 {
            for (i, d) in data.iter().enumerate() {
                let row = self.trend_row(&d.location, &d.covariates, "neighbour covariates")?;
                for (t, f) in row.into_iter().enumerate() {
                    a[[i, n + t]] = f;
                    a[[n + t, i]] = f;
                }
            }
            let covariates = target.covariates();
            for s in &support {
                let row = self.trend_row(s, covariates, "target covariates")?;
                for (t, f) in row.into_iter().enumerate() {
                    b[n + t] += f / m;
                }
            }
        }

        let rhs = b.clone();
        let x = linalg::solve(a, b)?;

        let predicted_value = match self.options.mean {
            Some(mean) => mean + (0..n).map(|i| x[i] * (data[i].value - mean)).sum::<f64>(),
            None => (0..n).map(|i| x[i] * data[i].value).sum(),
        };

        let c00 = if support.len() == 1 {
            self.covariance.covariance(&support[0], &support[0])
        } else {
            let mut total = 0.0;
            for s in &support {
                for q in &support {
                    total += self.covariance.covariance(s, q);
                }
            }
            total / (m * m)
        };
        let mut variance = c00 - x.dot(&rhs);

        if variance < 0.0 {
            let limit = self.options.variance_tolerance * self.covariance.sill().abs();
            if variance < -limit {
                warn!(variance, "negative kriging variance clipped to zero");
            } else {
                debug!(variance, "round-off negative kriging variance clipped to zero");
            }
            variance = 0.0;
        }

        Ok(PredictionResult {
            predicted_value,
            prediction_variance: variance,
            neighbors: n,
        })
    }

    /// Predict every target in parallel; each failure is reported at its
    /// position as [`Error::Target`] without affecting the others.
    pub fn predict_batch<I>(
        &self,
        index: &I,
        targets: &[Target<G::Location, G::Region>],
    ) -> Vec<Result<PredictionResult>>
    where
        I: SpatialIndex<G::Location> + Sync,
    {
        let results: Vec<Result<PredictionResult>> = (0..targets.len())
            .into_par_iter()
            .map(|i| self.predict_checked(index, targets, i))
            .collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(targets = targets.len(), failed, "batch prediction finished");
        results
    }

    /// Fail-fast variant of [`predict_batch`](Self::predict_batch): the
    /// batch stops at the first failing target and returns its error.
    pub fn predict_all<I>(
        &self,
        index: &I,
        targets: &[Target<G::Location, G::Region>],
    ) -> Result<Vec<PredictionResult>>
    where
        I: SpatialIndex<G::Location> + Sync,
    {
        (0..targets.len())
            .into_par_iter()
            .map(|i| self.predict_checked(index, targets, i))
            .collect()
    }

    fn predict_checked<I>(
        &self,
        index: &I,
        targets: &[Target<G::Location, G::Region>],
        i: usize,
    ) -> Result<PredictionResult>
    where
        I: SpatialIndex<G::Location>,
    {
        check_cancelled(self.options.cancel.as_ref(), "kriging")
            .and_then(|_| self.predict(index, &targets[i]))
            .map_err(|e| e.at_target(i))
    }
}
