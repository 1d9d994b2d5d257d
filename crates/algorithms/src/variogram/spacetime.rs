//! Spatiotemporal variograms
//!
//! The empirical estimator bins pairs on a (space lag, time lag) grid. Three
//! model families combine spatial, temporal and joint structures:
//! ```text
//! product-sum:  γ(h,u) = γs(h) + γt(u) − k·γs(h)·γt(u)
//! metric:       γ(h,u) = γj(√(h² + (κu)²))
//! sum-metric:   γ(h,u) = γs(h) + γt(u) + γj(√(h² + (κu)²))
//! ```
//! κ is the anisotropy ratio in space units per time unit. It is fixed
//! (given, estimated from the marginals, or read from the model) before the
//! remaining parameters are fitted.
//!
//! Reference:
//! De Iaco, S., Myers, D.E. & Posa, D. (2001). Space-time analysis using a
//! general product-sum model. Statistics & Probability Letters, 52(1).
//! Gräler, B., Pebesma, E. & Heuvelink, G. (2016). Spatio-temporal
//! interpolation using gstat. The R Journal, 8(1).

use geostat_core::{
    CancelToken, Error, GeometryProvider, Observation, Result, SpaceTime, check_cancelled,
    validate_observations,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::empirical::{BinSums, Edges, Estimator};
use super::fit::{FitParams, ParamRole, Parametric, Sample, levenberg_marquardt};
use super::model::{ModelRecord, VariogramModel};
use crate::maybe_rayon::*;

/// Largest default time lag
pub const MAX_DEFAULT_TIME_LAG: usize = 15;

/// Parameters for [`empirical_st_variogram`]
#[derive(Debug, Clone)]
pub struct StVariogramParams {
    /// Spatial cutoff. Default: spatial bounding diagonal / 3.
    pub cutoff: Option<f64>,
    /// Spatial bin width. Default: cutoff / 15.
    pub width: Option<f64>,
    /// Nominal time lags. Default: 0, 1, ..., T with T the largest whole
    /// time separation, capped at 15.
    pub time_lags: Option<Vec<f64>>,
    /// A pair joins the nearest time lag within this distance (default 0.5).
    pub time_tolerance: f64,
    pub estimator: Estimator,
    pub cancel: Option<CancelToken>,
}

impl Default for StVariogramParams {
    fn default() -> Self {
        Self {
            cutoff: None,
            width: None,
            time_lags: None,
            time_tolerance: 0.5,
            estimator: Estimator::default(),
            cancel: None,
        }
    }
}

/// One non-empty (space lag, time lag) cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StBin {
    pub lag_lower: f64,
    pub lag_upper: f64,
    pub mean_lag: f64,
    /// Nominal time lag of the class
    pub time_lag: f64,
    pub time_lag_lower: f64,
    pub time_lag_upper: f64,
    pub mean_time_lag: f64,
    pub pair_count: usize,
    pub semivariance: f64,
}

/// Non-empty bins ordered by time lag, then space lag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StEmpiricalVariogram {
    pub bins: Vec<StBin>,
    pub cutoff: f64,
    pub time_lags: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct StSums {
    space: BinSums,
    sum_time: f64,
}

fn nearest_time_lag(dt: f64, lags: &[f64], tolerance: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (k, &u) in lags.iter().enumerate() {
        let off = (dt - u).abs();
        if off <= tolerance && best.is_none_or(|(_, b)| off < b) {
            best = Some((k, off));
        }
    }
    best.map(|(k, _)| k)
}

/// Empirical space-time variogram.
///
/// # Errors
/// As [`super::empirical_variogram`], plus [`Error::InvalidParameter`] for a
/// negative time tolerance or an empty / non-finite time-lag list.
pub fn empirical_st_variogram<G: GeometryProvider>(
    geometry: &G,
    observations: &[Observation<SpaceTime<G::Location>>],
    params: &StVariogramParams,
) -> Result<StEmpiricalVariogram> {
    validate_observations(observations)?;
    let n = observations.len();
    if n < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: n,
            context: "space-time variogram".into(),
        });
    }
    if !(params.time_tolerance >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "time_tolerance",
            value: params.time_tolerance.to_string(),
            reason: "must be non-negative".into(),
        });
    }
    if let Some((index, obs)) = observations
        .iter()
        .enumerate()
        .find(|(_, o)| {
            !o.location.time.is_finite() || !geometry.is_valid_location(&o.location.space)
        })
    {
        return Err(Error::InvalidObservation {
            index,
            reason: format!("non-finite location {:?}", obs.location),
        });
    }

    let spaces: Vec<G::Location> = observations.iter().map(|o| o.location.space.clone()).collect();
    let times: Vec<f64> = observations.iter().map(|o| o.location.time).collect();

    let (edges, cutoff) = Edges::resolve(
        params.cutoff,
        params.width,
        None,
        geometry.bounding_diagonal(&spaces),
    )?;

    let time_lags = match &params.time_lags {
        Some(lags) => {
            if lags.is_empty() || lags.iter().any(|u| !u.is_finite() || *u < 0.0) {
                return Err(Error::InvalidParameter {
                    name: "time_lags",
                    value: format!("{lags:?}"),
                    reason: "need at least one finite, non-negative lag".into(),
                });
            }
            lags.clone()
        }
        None => {
            let (lo, hi) = times
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
            let t_max = ((hi - lo).floor() as usize).min(MAX_DEFAULT_TIME_LAG);
            (0..=t_max).map(|u| u as f64).collect()
        }
    };

    let n_space = edges.len();
    let n_cells = n_space * time_lags.len();

    let rows: Vec<Vec<StSums>> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<Vec<StSums>> {
            check_cancelled(params.cancel.as_ref(), "space-time variogram")?;
            let mut sums = vec![StSums::default(); n_cells];
            for j in (i + 1)..n {
                let ds = geometry.distance(&spaces[i], &spaces[j]);
                if ds > cutoff {
                    continue;
                }
                let dt = (times[i] - times[j]).abs();
                let (Some(ks), Some(kt)) = (
                    edges.locate(ds),
                    nearest_time_lag(dt, &time_lags, params.time_tolerance),
                ) else {
                    continue;
                };
                let cell = &mut sums[kt * n_space + ks];
                cell.space.add(ds, observations[i].value - observations[j].value);
                cell.sum_time += dt;
            }
            Ok(sums)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut totals = vec![StSums::default(); n_cells];
    for row in &rows {
        for (t, s) in totals.iter_mut().zip(row) {
            t.space.merge(&s.space);
            t.sum_time += s.sum_time;
        }
    }

    let mut bins = Vec::new();
    for (kt, &u) in time_lags.iter().enumerate() {
        for ks in 0..n_space {
            let s = &totals[kt * n_space + ks];
            if s.space.count == 0 {
                continue;
            }
            let (lag_lower, lag_upper) = edges.bounds(ks);
            let count = s.space.count as f64;
            bins.push(StBin {
                lag_lower,
                lag_upper,
                mean_lag: s.space.sum_distance / count,
                time_lag: u,
                time_lag_lower: (u - params.time_tolerance).max(0.0),
                time_lag_upper: u + params.time_tolerance,
                mean_time_lag: s.sum_time / count,
                pair_count: s.space.count,
                semivariance: s.space.estimate(params.estimator),
            });
        }
    }

    debug!(
        observations = n,
        cutoff,
        time_lags = time_lags.len(),
        bins = bins.len(),
        "space-time variogram computed"
    );
    Ok(StEmpiricalVariogram {
        bins,
        cutoff,
        time_lags,
    })
}

/// Spatiotemporal variogram model
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceTimeModel {
    ProductSum {
        space: VariogramModel,
        time: VariogramModel,
        /// Coupling, 0 ≤ k ≤ 1 / max(sill_s, sill_t)
        k: f64,
    },
    Metric {
        joint: VariogramModel,
        anisotropy: f64,
    },
    SumMetric {
        space: VariogramModel,
        time: VariogramModel,
        joint: VariogramModel,
        anisotropy: f64,
    },
}

fn k_upper(space: &VariogramModel, time: &VariogramModel) -> f64 {
    let m = space.sill().max(time.sill());
    if m > 0.0 { 1.0 / m } else { f64::INFINITY }
}

impl SpaceTimeModel {
    pub fn product_sum(space: VariogramModel, time: VariogramModel, k: f64) -> Result<Self> {
        Self::ProductSum { space, time, k }.validated()
    }

    pub fn metric(joint: VariogramModel, anisotropy: f64) -> Result<Self> {
        Self::Metric { joint, anisotropy }.validated()
    }

    pub fn sum_metric(
        space: VariogramModel,
        time: VariogramModel,
        joint: VariogramModel,
        anisotropy: f64,
    ) -> Result<Self> {
        Self::SumMetric {
            space,
            time,
            joint,
            anisotropy,
        }
        .validated()
    }

    fn validated(self) -> Result<Self> {
        match &self {
            SpaceTimeModel::ProductSum { space, time, k } => {
                let ub = k_upper(space, time);
                if !(k.is_finite() && *k >= 0.0 && *k <= ub * (1.0 + 1e-12)) {
                    return Err(Error::InvalidModel(format!(
                        "product-sum coupling k = {k} outside [0, {ub}]"
                    )));
                }
            }
            SpaceTimeModel::Metric { anisotropy, .. }
            | SpaceTimeModel::SumMetric { anisotropy, .. } => {
                if !(anisotropy.is_finite() && *anisotropy > 0.0) {
                    return Err(Error::InvalidModel(format!(
                        "anisotropy ratio must be positive, got {anisotropy}"
                    )));
                }
            }
        }
        Ok(self)
    }

    /// Semivariance at spatial lag `h` and time lag `u`.
    pub fn gamma(&self, h: f64, u: f64) -> f64 {
        match self {
            SpaceTimeModel::ProductSum { space, time, k } => {
                let gs = space.gamma(h);
                let gt = time.gamma(u);
                gs + gt - k * gs * gt
            }
            SpaceTimeModel::Metric { joint, anisotropy } => joint.gamma(h.hypot(anisotropy * u)),
            SpaceTimeModel::SumMetric {
                space,
                time,
                joint,
                anisotropy,
            } => space.gamma(h) + time.gamma(u) + joint.gamma(h.hypot(anisotropy * u)),
        }
    }

    pub fn sill(&self) -> f64 {
        match self {
            SpaceTimeModel::ProductSum { space, time, k } => {
                let (ss, st) = (space.sill(), time.sill());
                ss + st - k * ss * st
            }
            SpaceTimeModel::Metric { joint, .. } => joint.sill(),
            SpaceTimeModel::SumMetric {
                space, time, joint, ..
            } => space.sill() + time.sill() + joint.sill(),
        }
    }

    pub fn covariance(&self, h: f64, u: f64) -> f64 {
        self.sill() - self.gamma(h, u)
    }

    /// κ carried by the metric families.
    pub fn anisotropy(&self) -> Option<f64> {
        match self {
            SpaceTimeModel::ProductSum { .. } => None,
            SpaceTimeModel::Metric { anisotropy, .. }
            | SpaceTimeModel::SumMetric { anisotropy, .. } => Some(*anisotropy),
        }
    }

    /// Same model with κ replaced (no-op for product-sum).
    pub fn with_anisotropy(mut self, kappa: f64) -> Self {
        match &mut self {
            SpaceTimeModel::ProductSum { .. } => {}
            SpaceTimeModel::Metric { anisotropy, .. }
            | SpaceTimeModel::SumMetric { anisotropy, .. } => *anisotropy = kappa,
        }
        self
    }

    fn components(&self) -> Vec<&VariogramModel> {
        match self {
            SpaceTimeModel::ProductSum { space, time, .. } => vec![space, time],
            SpaceTimeModel::Metric { joint, .. } => vec![joint],
            SpaceTimeModel::SumMetric {
                space, time, joint, ..
            } => vec![space, time, joint],
        }
    }

    /// Structures across all components.
    pub fn structure_count(&self) -> usize {
        self.components().iter().map(|m| m.structures().len()).sum()
    }

    pub fn to_record(&self) -> SpaceTimeRecord {
        let (kind, space, time, joint, k) = match self {
            SpaceTimeModel::ProductSum { space, time, k } => (
                SpaceTimeKind::ProductSum,
                Some(space.to_record()),
                Some(time.to_record()),
                None,
                Some(*k),
            ),
            SpaceTimeModel::Metric { joint, .. } => {
                (SpaceTimeKind::Metric, None, None, Some(joint.to_record()), None)
            }
            SpaceTimeModel::SumMetric {
                space, time, joint, ..
            } => (
                SpaceTimeKind::SumMetric,
                Some(space.to_record()),
                Some(time.to_record()),
                Some(joint.to_record()),
                None,
            ),
        };
        SpaceTimeRecord {
            kind,
            space,
            time,
            joint,
            k,
            anisotropy_ratio: self.anisotropy(),
            sill: self.sill(),
        }
    }
}

impl Parametric for SpaceTimeModel {
    type Lag = (f64, f64);

    fn parameters(&self) -> Vec<f64> {
        let mut p: Vec<f64> = self
            .components()
            .iter()
            .flat_map(|m| m.parameters())
            .collect();
        if let SpaceTimeModel::ProductSum { k, .. } = self {
            p.push(*k);
        }
        p
    }

    fn roles(&self) -> Vec<ParamRole> {
        let temporal = |m: &VariogramModel| {
            m.roles()
                .into_iter()
                .map(|r| if r == ParamRole::Range { ParamRole::TimeRange } else { r })
                .collect::<Vec<_>>()
        };
        let mut r: Vec<ParamRole> = match self {
            SpaceTimeModel::ProductSum { space, time, .. } => {
                let mut r = space.roles();
                r.extend(temporal(time));
                r
            }
            SpaceTimeModel::Metric { joint, .. } => joint.roles(),
            SpaceTimeModel::SumMetric {
                space, time, joint, ..
            } => {
                let mut r = space.roles();
                r.extend(temporal(time));
                r.extend(joint.roles());
                r
            }
        };
        if matches!(self, SpaceTimeModel::ProductSum { .. }) {
            r.push(ParamRole::Coupling);
        }
        r
    }

    fn upper_bounds(&self) -> Vec<f64> {
        let mut b: Vec<f64> = self
            .components()
            .iter()
            .flat_map(|m| m.upper_bounds())
            .collect();
        if let SpaceTimeModel::ProductSum { space, time, .. } = self {
            b.push(k_upper(space, time));
        }
        b
    }

    fn with_parameters(&self, params: &[f64]) -> Self {
        let mut offset = 0;
        let mut take = |m: &VariogramModel| {
            let n = m.parameters().len();
            let end = (offset + n).min(params.len());
            let next = m.with_parameters(&params[offset.min(end)..end]);
            offset += n;
            next
        };
        match self {
            SpaceTimeModel::ProductSum { space, time, k } => {
                let space = take(space);
                let time = take(time);
                let k = params.get(offset).copied().unwrap_or(*k);
                SpaceTimeModel::ProductSum { space, time, k }
            }
            SpaceTimeModel::Metric { joint, anisotropy } => SpaceTimeModel::Metric {
                joint: take(joint),
                anisotropy: *anisotropy,
            },
            SpaceTimeModel::SumMetric {
                space,
                time,
                joint,
                anisotropy,
            } => SpaceTimeModel::SumMetric {
                space: take(space),
                time: take(time),
                joint: take(joint),
                anisotropy: *anisotropy,
            },
        }
    }

    fn gamma_at(&self, lag: (f64, f64)) -> f64 {
        self.gamma(lag.0, lag.1)
    }
}

/// Family tag in a [`SpaceTimeRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceTimeKind {
    ProductSum,
    Metric,
    SumMetric,
}

/// Serializable parameter record of a space-time model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceTimeRecord {
    pub kind: SpaceTimeKind,
    pub space: Option<ModelRecord>,
    pub time: Option<ModelRecord>,
    pub joint: Option<ModelRecord>,
    pub k: Option<f64>,
    pub anisotropy_ratio: Option<f64>,
    pub sill: f64,
}

/// Where the anisotropy ratio comes from when fitting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnisotropySource {
    Fixed(f64),
    /// Ratio of the marginal slopes, see [`estimate_anisotropy`]
    Estimate,
    /// Keep the ratio stored in the initial (metric) model
    FromModel,
}

/// Result of [`fit_space_time`]
#[derive(Debug, Clone)]
pub struct FittedSpaceTime {
    pub model: SpaceTimeModel,
    /// Ratio used for fitting weights (and by metric families)
    pub anisotropy: f64,
    pub rss: f64,
    pub iterations: usize,
}

impl FittedSpaceTime {
    pub fn to_record(&self) -> SpaceTimeRecord {
        SpaceTimeRecord {
            anisotropy_ratio: Some(self.anisotropy),
            ..self.model.to_record()
        }
    }
}

/// Pair-count weighted slope of `y` on `x`.
fn weighted_slope(points: &[(f64, f64, f64)]) -> Option<f64> {
    let sw: f64 = points.iter().map(|p| p.2).sum();
    if points.len() < 2 || sw <= 0.0 {
        return None;
    }
    let mx = points.iter().map(|p| p.2 * p.0).sum::<f64>() / sw;
    let my = points.iter().map(|p| p.2 * p.1).sum::<f64>() / sw;
    let sxx: f64 = points.iter().map(|p| p.2 * (p.0 - mx).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| p.2 * (p.0 - mx) * (p.1 - my)).sum();
    (sxx > 0.0).then(|| sxy / sxx)
}

/// Anisotropy ratio from the linear slopes of the two marginals: the spatial
/// marginal is the smallest time-lag class, the temporal marginal the
/// smallest spatial class. κ = slope_time / slope_space.
///
/// # Errors
/// [`Error::InsufficientData`] when a marginal has fewer than two distinct
/// lags; [`Error::FitDivergence`] when a slope is not positive.
pub fn estimate_anisotropy(empirical: &StEmpiricalVariogram) -> Result<f64> {
    let min_time = empirical
        .bins
        .iter()
        .map(|b| b.time_lag)
        .fold(f64::INFINITY, f64::min);
    let min_space = empirical
        .bins
        .iter()
        .map(|b| b.lag_lower)
        .fold(f64::INFINITY, f64::min);

    let spatial: Vec<(f64, f64, f64)> = empirical
        .bins
        .iter()
        .filter(|b| b.time_lag == min_time)
        .map(|b| (b.mean_lag, b.semivariance, b.pair_count as f64))
        .collect();
    let temporal: Vec<(f64, f64, f64)> = empirical
        .bins
        .iter()
        .filter(|b| b.lag_lower == min_space)
        .map(|b| (b.mean_time_lag, b.semivariance, b.pair_count as f64))
        .collect();

    let slope_s = weighted_slope(&spatial).ok_or_else(|| Error::InsufficientData {
        required: 2,
        available: spatial.len(),
        context: "spatial marginal for anisotropy".into(),
    })?;
    let slope_t = weighted_slope(&temporal).ok_or_else(|| Error::InsufficientData {
        required: 2,
        available: temporal.len(),
        context: "temporal marginal for anisotropy".into(),
    })?;

    if !(slope_s > 0.0 && slope_t > 0.0) {
        return Err(Error::FitDivergence {
            iterations: 0,
            reason: format!(
                "marginal slopes must be positive (space {slope_s:.4e}, time {slope_t:.4e})"
            ),
        });
    }
    let kappa = slope_t / slope_s;
    debug!(slope_s, slope_t, kappa, "estimated space-time anisotropy");
    Ok(kappa)
}

/// Fit a space-time model with κ fixed beforehand.
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer bins than twice the number of
///   structures over all components
/// - [`Error::InvalidParameter`] for a non-positive ratio or `FromModel` on a
///   product-sum model
/// - anything [`estimate_anisotropy`] or the optimizer raise
pub fn fit_space_time(
    initial: &SpaceTimeModel,
    empirical: &StEmpiricalVariogram,
    params: &FitParams,
    anisotropy: AnisotropySource,
) -> Result<FittedSpaceTime> {
    let required = initial.structure_count() * 2;
    if empirical.bins.len() < required {
        return Err(Error::InsufficientData {
            required,
            available: empirical.bins.len(),
            context: "space-time fit (non-empty bins)".into(),
        });
    }

    let kappa = match anisotropy {
        AnisotropySource::Fixed(k) => k,
        AnisotropySource::Estimate => estimate_anisotropy(empirical)?,
        AnisotropySource::FromModel => {
            initial.anisotropy().ok_or_else(|| Error::InvalidParameter {
                name: "anisotropy",
                value: "from model".into(),
                reason: "product-sum models carry no anisotropy ratio".into(),
            })?
        }
    };
    if !(kappa.is_finite() && kappa > 0.0) {
        return Err(Error::InvalidParameter {
            name: "anisotropy",
            value: kappa.to_string(),
            reason: "must be positive and finite".into(),
        });
    }

    let start = initial.clone().with_anisotropy(kappa);
    let samples: Vec<Sample<(f64, f64)>> = empirical
        .bins
        .iter()
        .map(|b| Sample {
            lag: (b.mean_lag, b.mean_time_lag),
            distance: b.mean_lag.hypot(kappa * b.mean_time_lag),
            time_lag: b.mean_time_lag,
            count: b.pair_count,
            gamma: b.semivariance,
        })
        .collect();

    let solution = levenberg_marquardt(&start, &samples, params)?;
    let model = solution.model.validated()?;
    debug!(kappa, rss = solution.rss, "fitted space-time model");
    Ok(FittedSpaceTime {
        model,
        anisotropy: kappa,
        rss: solution.rss,
        iterations: solution.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variogram::model::StructureKind;
    use approx::assert_relative_eq;
    use geo::Point;
    use geostat_core::PlanarGeometry;

    fn exp(sill: f64, range: f64) -> VariogramModel {
        VariogramModel::simple(StructureKind::Exponential, 0.0, sill, range).unwrap()
    }

    fn station_series(stations: usize, steps: usize) -> Vec<Observation<SpaceTime<Point<f64>>>> {
        let mut out = Vec::new();
        for s in 0..stations {
            let x = (s % 5) as f64 * 10.0;
            let y = (s / 5) as f64 * 10.0;
            for t in 0..steps {
                let v = (x / 15.0).sin() + (y / 20.0).cos() + 0.5 * (t as f64 / 3.0).sin();
                out.push(Observation::new(SpaceTime::new(Point::new(x, y), t as f64), v));
            }
        }
        out
    }

    #[test]
    fn test_default_time_lags() {
        let obs = station_series(10, 5);
        let result =
            empirical_st_variogram(&PlanarGeometry::default(), &obs, &StVariogramParams::default())
                .unwrap();
        assert_eq!(result.time_lags, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        // Same station, different times: zero spatial lag
        assert!(result.bins.iter().any(|b| b.lag_lower == 0.0 && b.time_lag == 2.0));
        for w in result.bins.windows(2) {
            assert!(w[0].time_lag <= w[1].time_lag);
        }
        for b in &result.bins {
            assert!((b.mean_time_lag - b.time_lag).abs() <= 0.5);
        }
    }

    #[test]
    fn test_time_lag_cap() {
        let obs = station_series(2, 40);
        let result =
            empirical_st_variogram(&PlanarGeometry::default(), &obs, &StVariogramParams::default())
                .unwrap();
        assert_eq!(result.time_lags.len(), MAX_DEFAULT_TIME_LAG + 1);
    }

    #[test]
    fn test_product_sum_evaluation() {
        let model = SpaceTimeModel::product_sum(exp(2.0, 30.0), exp(1.0, 5.0), 0.25).unwrap();
        assert_eq!(model.gamma(0.0, 0.0), 0.0);
        assert_relative_eq!(model.sill(), 2.0 + 1.0 - 0.25 * 2.0);
        assert_relative_eq!(model.gamma(1e9, 1e9), model.sill(), epsilon = 1e-9);
        // Pure time lag reduces to the temporal marginal
        assert_relative_eq!(model.gamma(0.0, 3.0), exp(1.0, 5.0).gamma(3.0));
        assert!(SpaceTimeModel::product_sum(exp(2.0, 30.0), exp(1.0, 5.0), 0.9).is_err());
    }

    #[test]
    fn test_metric_uses_anisotropy() {
        let model = SpaceTimeModel::metric(exp(1.0, 20.0), 4.0).unwrap();
        assert_relative_eq!(model.gamma(3.0, 1.0), exp(1.0, 20.0).gamma(5.0));
        assert!(SpaceTimeModel::metric(exp(1.0, 20.0), 0.0).is_err());
    }

    /// Bins sampled from a model; `offset` places the mean lag inside each
    /// spatial class (0 = lower edge).
    fn synthetic_st(model: &SpaceTimeModel, offset: f64) -> StEmpiricalVariogram {
        let mut bins = Vec::new();
        for t in 0..6 {
            for s in 0..10 {
                let h = (s as f64 + offset) * 5.0;
                let u = t as f64;
                bins.push(StBin {
                    lag_lower: s as f64 * 5.0,
                    lag_upper: (s + 1) as f64 * 5.0,
                    mean_lag: h,
                    time_lag: u,
                    time_lag_lower: (u - 0.5).max(0.0),
                    time_lag_upper: u + 0.5,
                    mean_time_lag: u,
                    pair_count: 50,
                    semivariance: model.gamma(h, u),
                });
            }
        }
        StEmpiricalVariogram {
            bins,
            cutoff: 50.0,
            time_lags: (0..6).map(|u| u as f64).collect(),
        }
    }

    #[test]
    fn test_fit_product_sum_recovers_sills() {
        let truth = SpaceTimeModel::product_sum(exp(2.0, 30.0), exp(1.0, 4.0), 0.2).unwrap();
        let emp = synthetic_st(&truth, 0.5);
        let start = SpaceTimeModel::product_sum(exp(1.5, 20.0), exp(0.8, 3.0), 0.1).unwrap();
        let fitted = fit_space_time(
            &start,
            &emp,
            &FitParams::default(),
            AnisotropySource::Fixed(5.0),
        )
        .unwrap();
        assert!((fitted.model.sill() - truth.sill()).abs() / truth.sill() < 1e-3);
        for (h, u) in [(7.5, 1.0), (27.5, 3.0), (47.5, 5.0)] {
            assert_relative_eq!(fitted.model.gamma(h, u), truth.gamma(h, u), epsilon = 1e-3);
        }
        let record = fitted.to_record();
        assert_eq!(record.kind, SpaceTimeKind::ProductSum);
        assert_eq!(record.anisotropy_ratio, Some(5.0));
    }

    #[test]
    fn test_temporal_ranges_have_their_own_role() {
        let model = SpaceTimeModel::product_sum(exp(2.0, 30.0), exp(1.0, 4.0), 0.2).unwrap();
        assert_eq!(
            model.roles(),
            vec![
                ParamRole::Sill,
                ParamRole::Range,
                ParamRole::Sill,
                ParamRole::TimeRange,
                ParamRole::Coupling,
            ]
        );
        let metric = SpaceTimeModel::metric(exp(1.0, 20.0), 4.0).unwrap();
        assert_eq!(metric.roles(), vec![ParamRole::Sill, ParamRole::Range]);
    }

    #[test]
    fn test_estimate_anisotropy_from_metric() {
        // Linear joint structure well inside the range: κ is the slope ratio
        let truth = SpaceTimeModel::metric(
            VariogramModel::simple(StructureKind::Spherical, 0.0, 1.0, 10_000.0).unwrap(),
            3.0,
        )
        .unwrap();
        let emp = synthetic_st(&truth, 0.0);
        let kappa = estimate_anisotropy(&emp).unwrap();
        assert!((kappa - 3.0).abs() < 0.1, "kappa {kappa}");
    }

    #[test]
    fn test_from_model_on_product_sum_fails() {
        let model = SpaceTimeModel::product_sum(exp(2.0, 30.0), exp(1.0, 4.0), 0.2).unwrap();
        let emp = synthetic_st(&model, 0.5);
        let err = fit_space_time(&model, &emp, &FitParams::default(), AnisotropySource::FromModel)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "anisotropy", .. }));
    }
}
