//! Variogram model fitting
//!
//! Weighted least squares on the empirical bins, minimized with a bounded
//! Levenberg–Marquardt iteration:
//! ```text
//! min Σ wᵢ [γ_model(hᵢ; θ) − γ̂(hᵢ)]²     subject to θ ≥ 0
//! ```
//! The Jacobian is taken by forward finite differences. After each step the
//! parameters are projected back onto their bounds; a parameter sitting on a
//! bound whose gradient points outside is frozen for the rest of the fit.
//!
//! Default weights are N(h)/h² (more pairs and shorter lags count more).
//! `NumPairsOverModelSquared` gives Cressie's (1985) N(h)/γ_model(h)², with
//! the weights refreshed from the current model at every iteration.
//!
//! Reference:
//! Cressie, N. (1985). Fitting variogram models by weighted least squares.
//! Mathematical Geology, 17(5).
//! Marquardt, D.W. (1963). An algorithm for least-squares estimation of
//! nonlinear parameters. SIAM J. Appl. Math., 11(2).

use geostat_core::{CancelToken, Error, Result, check_cancelled};
use ndarray::{Array1, Array2};
use tracing::{debug, warn};

use super::empirical::EmpiricalVariogram;
use super::model::{Structure, StructureKind, VariogramModel};
use crate::linalg;
use crate::maybe_rayon::*;

const LAMBDA_INITIAL: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
/// Relative forward-difference step
const FD_STEP: f64 = 1e-6;
/// Ranges are capped at this multiple of the largest sample separation.
/// Past it the model is linear over the data and only the sill/range ratio
/// is identifiable.
pub const RANGE_CAP: f64 = 10.0;

/// What a fitted parameter controls; decides whether it is free or held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    Nugget,
    Sill,
    Range,
    /// Range of a temporal component, in time units
    TimeRange,
    /// Product-sum coupling coefficient
    Coupling,
}

/// A model whose parameters can be flattened for least-squares fitting.
pub trait Parametric: Clone {
    /// Separation the model is evaluated at: a distance, or a
    /// (distance, time lag) pair.
    type Lag: Copy;

    fn parameters(&self) -> Vec<f64>;

    fn roles(&self) -> Vec<ParamRole>;

    /// Upper bound per parameter; the lower bound is always zero.
    fn upper_bounds(&self) -> Vec<f64>;

    /// Copy of the model with every parameter replaced, in the order given
    /// by [`Parametric::parameters`].
    fn with_parameters(&self, params: &[f64]) -> Self;

    fn gamma_at(&self, lag: Self::Lag) -> f64;
}

/// Weighting of the squared residual at each bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightScheme {
    /// N(h) / h²
    #[default]
    NumPairsOverDistanceSquared,
    Uniform,
    /// N(h)
    NumPairs,
    /// N(h) / γ_model(h)², re-evaluated every iteration
    NumPairsOverModelSquared,
}

/// Parameters for variogram fitting
#[derive(Debug, Clone)]
pub struct FitParams {
    pub weights: WeightScheme,
    /// Estimate the nugget (otherwise held at its initial value)
    pub fit_nugget: bool,
    /// Estimate partial sills and product-sum coupling
    pub fit_sills: bool,
    pub fit_ranges: bool,
    /// Iteration cap (default 200); exceeding it is a fit divergence
    pub max_iterations: usize,
    /// Relative objective decrease below which the fit has converged
    pub tolerance: f64,
    pub cancel: Option<CancelToken>,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            weights: WeightScheme::default(),
            fit_nugget: true,
            fit_sills: true,
            fit_ranges: true,
            max_iterations: 200,
            tolerance: 1e-8,
            cancel: None,
        }
    }
}

impl FitParams {
    fn is_free(&self, role: ParamRole) -> bool {
        match role {
            ParamRole::Nugget => self.fit_nugget,
            ParamRole::Sill | ParamRole::Coupling => self.fit_sills,
            ParamRole::Range | ParamRole::TimeRange => self.fit_ranges,
        }
    }
}

/// Result of [`fit_variogram`]
#[derive(Debug, Clone)]
pub struct FittedVariogram {
    pub model: VariogramModel,
    /// Weighted residual sum of squares at the solution (lower = better)
    pub rss: f64,
    pub iterations: usize,
}

/// One empirical point seen by the optimizer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample<Lag> {
    pub lag: Lag,
    /// Separation used by distance-based weights
    pub distance: f64,
    /// Time lag, zero for purely spatial samples
    pub time_lag: f64,
    pub count: usize,
    pub gamma: f64,
}

pub(crate) struct Solution<M> {
    pub model: M,
    pub rss: f64,
    pub iterations: usize,
}

fn weights<M: Parametric>(scheme: WeightScheme, samples: &[Sample<M::Lag>], model: &M) -> Vec<f64> {
    let max_distance = samples.iter().map(|s| s.distance).fold(0.0_f64, f64::max);
    let distance_floor = (max_distance * 1e-9).max(f64::MIN_POSITIVE);
    let gamma_floor = samples
        .iter()
        .map(|s| s.gamma.abs())
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1e-12;

    samples
        .iter()
        .map(|s| {
            let n = s.count as f64;
            match scheme {
                WeightScheme::Uniform => 1.0,
                WeightScheme::NumPairs => n,
                WeightScheme::NumPairsOverDistanceSquared => {
                    let h = s.distance.max(distance_floor);
                    n / (h * h)
                }
                WeightScheme::NumPairsOverModelSquared => {
                    let g = model.gamma_at(s.lag).max(gamma_floor);
                    n / (g * g)
                }
            }
        })
        .collect()
}

fn residuals<M: Parametric>(model: &M, samples: &[Sample<M::Lag>], weights: &[f64]) -> Array1<f64> {
    samples
        .iter()
        .zip(weights)
        .map(|(s, w)| w.sqrt() * (model.gamma_at(s.lag) - s.gamma))
        .collect()
}

/// Model bounds tightened by the data-derived caps.
fn upper_bounds<M: Parametric>(model: &M, caps: &[f64]) -> Vec<f64> {
    model
        .upper_bounds()
        .into_iter()
        .zip(caps)
        .map(|(ub, cap)| ub.min(*cap).max(0.0))
        .collect()
}

/// Clamp every parameter to `[0, upper]`. Bounds can depend on other
/// parameters (product-sum coupling), so they are re-read after the first
/// pass.
fn project<M: Parametric>(template: &M, theta: &mut [f64], caps: &[f64]) {
    for _ in 0..2 {
        let upper = upper_bounds(&template.with_parameters(theta), caps);
        for (t, ub) in theta.iter_mut().zip(upper) {
            *t = t.clamp(0.0, ub);
        }
    }
}

/// Bounded Levenberg–Marquardt on an arbitrary [`Parametric`] model.
pub(crate) fn levenberg_marquardt<M: Parametric>(
    initial: &M,
    samples: &[Sample<M::Lag>],
    params: &FitParams,
) -> Result<Solution<M>> {
    let roles = initial.roles();
    let mut theta = initial.parameters();

    let gamma_scale = samples
        .iter()
        .map(|s| s.gamma.abs())
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let lag_scale = samples
        .iter()
        .map(|s| s.distance)
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let time_scale = samples.iter().map(|s| s.time_lag).fold(0.0_f64, f64::max);
    let time_scale = if time_scale > 0.0 { time_scale } else { lag_scale };
    let typical: Vec<f64> = roles
        .iter()
        .map(|role| match role {
            ParamRole::Nugget | ParamRole::Sill => gamma_scale,
            ParamRole::Range => lag_scale,
            ParamRole::TimeRange => time_scale,
            ParamRole::Coupling => 1.0 / gamma_scale,
        })
        .collect();
    let caps: Vec<f64> = roles
        .iter()
        .zip(&typical)
        .map(|(role, scale)| match role {
            ParamRole::Range | ParamRole::TimeRange if params.is_free(*role) => RANGE_CAP * scale,
            _ => f64::INFINITY,
        })
        .collect();
    project(initial, &mut theta, &caps);
    // A damping blow-up only counts as convergence once a step has landed
    let mut accepted = false;

    let mut frozen: Vec<bool> = roles.iter().map(|r| !params.is_free(*r)).collect();
    let mut lambda = LAMBDA_INITIAL;

    let finish = |theta: &[f64], iterations: usize| {
        let model = initial.with_parameters(theta);
        let w = weights(params.weights, samples, &model);
        let r = residuals(&model, samples, &w);
        let rss = r.dot(&r);
        debug!(iterations, rss, "variogram fit converged");
        Solution {
            model,
            rss,
            iterations,
        }
    };

    for iteration in 1..=params.max_iterations {
        check_cancelled(params.cancel.as_ref(), "variogram fitting")?;

        let model = initial.with_parameters(&theta);
        let w = weights(params.weights, samples, &model);
        let r = residuals(&model, samples, &w);
        let sse = r.dot(&r);
        if !sse.is_finite() {
            return Err(Error::FitDivergence {
                iterations: iteration - 1,
                reason: "objective became non-finite".into(),
            });
        }
        if sse == 0.0 {
            return Ok(finish(&theta, iteration - 1));
        }
        let baseline: f64 = samples
            .iter()
            .zip(&w)
            .map(|(s, wi)| wi * s.gamma * s.gamma)
            .sum();

        let free: Vec<usize> = (0..theta.len()).filter(|&j| !frozen[j]).collect();
        if free.is_empty() {
            return Ok(finish(&theta, iteration - 1));
        }
        let upper = upper_bounds(&model, &caps);

        let mut jac = Array2::<f64>::zeros((samples.len(), free.len()));
        for (c, &j) in free.iter().enumerate() {
            let h = FD_STEP * (theta[j].abs() + 1e-3 * typical[j]);
            let mut shifted = theta.clone();
            let sign = if theta[j] + h <= upper[j] {
                shifted[j] += h;
                1.0
            } else {
                shifted[j] -= h;
                -1.0
            };
            let shifted_model = initial.with_parameters(&shifted);
            let r_shifted = residuals(&shifted_model, samples, &w);
            for i in 0..samples.len() {
                jac[[i, c]] = sign * (r_shifted[i] - r[i]) / h;
            }
        }

        let jt = jac.t();
        let normal = jt.dot(&jac);
        let gradient = jt.dot(&r);

        // Parameters pinned at a bound with the descent direction pointing out
        let mut pinned = false;
        for (c, &j) in free.iter().enumerate() {
            if (theta[j] <= 0.0 && gradient[c] > 0.0) || (theta[j] >= upper[j] && gradient[c] < 0.0) {
                frozen[j] = true;
                pinned = true;
            }
        }
        if pinned {
            continue;
        }

        let max_diag = normal.diag().iter().fold(0.0_f64, |m, v| m.max(*v));
        let diag_floor = (max_diag * 1e-12).max(f64::MIN_POSITIVE);

        loop {
            let mut damped = normal.clone();
            for c in 0..free.len() {
                damped[[c, c]] += lambda * normal[[c, c]].max(diag_floor);
            }

            if let Ok(step) = linalg::solve(damped, -&gradient) {
                let mut trial = theta.clone();
                for (c, &j) in free.iter().enumerate() {
                    trial[j] += step[c];
                }
                project(initial, &mut trial, &caps);

                let trial_model = initial.with_parameters(&trial);
                let tr = residuals(&trial_model, samples, &w);
                let trial_sse = tr.dot(&tr);
                if trial_sse.is_finite() && trial_sse < sse {
                    let decrease = (sse - trial_sse) / sse;
                    theta = trial;
                    accepted = true;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    if decrease <= params.tolerance {
                        return Ok(finish(&theta, iteration));
                    }
                    break;
                }
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                if accepted || sse <= params.tolerance * baseline {
                    // No descent step left: stationary point
                    return Ok(finish(&theta, iteration));
                }
                warn!(iteration, sse, "variogram fit made no progress");
                return Err(Error::FitDivergence {
                    iterations: iteration,
                    reason: "residual sum failed to decrease".into(),
                });
            }
        }
    }

    warn!(
        max_iterations = params.max_iterations,
        "variogram fit hit its iteration cap"
    );
    Err(Error::FitDivergence {
        iterations: params.max_iterations,
        reason: format!("no convergence within {} iterations", params.max_iterations),
    })
}

/// Fit a nested variogram model to an empirical variogram.
///
/// The structure list and kinds of `initial` are kept; its sills and ranges
/// are the starting point (see [`initial_model`] for a heuristic one).
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer non-empty bins than twice the
///   number of structures
/// - [`Error::FitDivergence`] when the iteration cap is hit or the objective
///   becomes non-finite
pub fn fit_variogram(
    initial: &VariogramModel,
    empirical: &EmpiricalVariogram,
    params: &FitParams,
) -> Result<FittedVariogram> {
    let required = initial.structures().len() * 2;
    if empirical.bins.len() < required {
        return Err(Error::InsufficientData {
            required,
            available: empirical.bins.len(),
            context: "variogram fit (non-empty bins)".into(),
        });
    }

    let samples: Vec<Sample<f64>> = empirical
        .bins
        .iter()
        .map(|b| Sample {
            lag: b.mean_lag,
            distance: b.mean_lag,
            time_lag: 0.0,
            count: b.pair_count,
            gamma: b.semivariance,
        })
        .collect();

    let solution = levenberg_marquardt(initial, &samples, params)?;
    debug!(model = %solution.model, rss = solution.rss, "fitted variogram");
    Ok(FittedVariogram {
        model: solution.model,
        rss: solution.rss,
        iterations: solution.iterations,
    })
}

/// Starting model read off the empirical variogram: sill from the mean of
/// the last three bins, nugget from the first bin (capped at half the sill),
/// practical range at half the largest lag.
pub fn initial_model(
    kind: StructureKind,
    empirical: &EmpiricalVariogram,
    with_nugget: bool,
) -> Result<VariogramModel> {
    let bins = &empirical.bins;
    if bins.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            available: 0,
            context: "initial variogram model (non-empty bins)".into(),
        });
    }

    let tail = &bins[bins.len().saturating_sub(3)..];
    let sill = (tail.iter().map(|b| b.semivariance).sum::<f64>() / tail.len() as f64)
        .max(f64::EPSILON);
    if kind == StructureKind::Nugget {
        return VariogramModel::new(vec![Structure::nugget(sill)]);
    }

    let max_lag = bins.iter().map(|b| b.mean_lag).fold(0.0_f64, f64::max);
    let range = (max_lag * 0.5).max(f64::EPSILON);

    let mut structures = Vec::with_capacity(2);
    let mut partial_sill = sill;
    if with_nugget {
        let nugget = bins[0].semivariance.clamp(0.0, 0.5 * sill);
        partial_sill = sill - nugget;
        structures.push(Structure::nugget(nugget));
    }
    structures.push(Structure::new(kind, partial_sill, range));
    VariogramModel::new(structures)
}

/// Fit each candidate kind (with a nugget when `params.fit_nugget`) and keep
/// the one with the lowest weighted RSS. Candidates are fitted in parallel;
/// ties go to the earlier kind.
pub fn fit_best_variogram(
    empirical: &EmpiricalVariogram,
    kinds: &[StructureKind],
    params: &FitParams,
) -> Result<FittedVariogram> {
    if kinds.is_empty() {
        return Err(Error::InvalidParameter {
            name: "kinds",
            value: "[]".into(),
            reason: "need at least one candidate structure".into(),
        });
    }

    let fits: Vec<Result<FittedVariogram>> = (0..kinds.len())
        .into_par_iter()
        .map(|i| {
            let start = initial_model(kinds[i], empirical, params.fit_nugget)?;
            fit_variogram(&start, empirical, params)
        })
        .collect();

    let mut best: Option<FittedVariogram> = None;
    let mut first_error = None;
    for (kind, fit) in kinds.iter().zip(fits) {
        match fit {
            Ok(fitted) => {
                if best.as_ref().is_none_or(|b| fitted.rss < b.rss) {
                    best = Some(fitted);
                }
            }
            Err(e) => {
                debug!(kind = kind.code(), error = %e, "candidate fit failed");
                first_error.get_or_insert(e);
            }
        }
    }

    best.ok_or_else(|| {
        first_error.unwrap_or_else(|| Error::InvalidModel("no candidate could be fitted".into()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variogram::empirical::DistanceBin;

    /// Bins sampled exactly from a model at lags 3, 9, 15, ...
    fn synthetic(model: &VariogramModel, n_bins: usize) -> EmpiricalVariogram {
        let width = 6.0;
        let bins = (0..n_bins)
            .map(|i| {
                let lag = (i as f64 + 0.5) * width;
                DistanceBin {
                    lag_lower: i as f64 * width,
                    lag_upper: (i + 1) as f64 * width,
                    mean_lag: lag,
                    pair_count: 100 + 10 * i,
                    semivariance: model.gamma(lag),
                }
            })
            .collect();
        EmpiricalVariogram {
            bins,
            cutoff: n_bins as f64 * width,
        }
    }

    fn rel(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs().max(1e-12)
    }

    #[test]
    fn test_recovers_spherical() {
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.5, 2.0, 40.0).unwrap();
        let emp = synthetic(&truth, 15);
        let start = initial_model(StructureKind::Spherical, &emp, true).unwrap();
        let fitted = fit_variogram(&start, &emp, &FitParams::default()).unwrap();

        assert!(rel(fitted.model.nugget(), 0.5) < 1e-3, "nugget {}", fitted.model);
        assert!(rel(fitted.model.sill(), 2.5) < 1e-3, "sill {}", fitted.model);
        assert!(rel(fitted.model.max_range(), 40.0) < 1e-3, "range {}", fitted.model);
        assert!(fitted.rss < 1e-8, "rss {}", fitted.rss);
    }

    #[test]
    fn test_recovers_exponential_cressie_weights() {
        let truth = VariogramModel::simple(StructureKind::Exponential, 0.2, 3.0, 50.0).unwrap();
        let emp = synthetic(&truth, 15);
        let start = initial_model(StructureKind::Exponential, &emp, true).unwrap();
        let params = FitParams {
            weights: WeightScheme::NumPairsOverModelSquared,
            ..Default::default()
        };
        let fitted = fit_variogram(&start, &emp, &params).unwrap();

        assert!(rel(fitted.model.sill(), 3.2) < 1e-3, "{}", fitted.model);
        assert!(rel(fitted.model.max_range(), 50.0) < 1e-3, "{}", fitted.model);
    }

    #[test]
    fn test_nugget_stays_non_negative() {
        // Gaussian data has a parabolic origin, an exponential fit wants a
        // negative nugget
        let truth = VariogramModel::simple(StructureKind::Gaussian, 0.0, 1.0, 30.0).unwrap();
        let emp = synthetic(&truth, 12);
        let start = VariogramModel::simple(StructureKind::Exponential, 0.1, 1.0, 30.0).unwrap();
        let fitted = fit_variogram(&start, &emp, &FitParams::default()).unwrap();

        for s in fitted.model.structures() {
            assert!(s.partial_sill >= 0.0, "{}", fitted.model);
            assert!(s.range >= 0.0, "{}", fitted.model);
        }
    }

    #[test]
    fn test_held_range() {
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.0, 2.0, 40.0).unwrap();
        let emp = synthetic(&truth, 12);
        let start = VariogramModel::simple(StructureKind::Spherical, 0.0, 1.0, 25.0).unwrap();
        let params = FitParams {
            fit_ranges: false,
            fit_nugget: false,
            ..Default::default()
        };
        let fitted = fit_variogram(&start, &emp, &params).unwrap();
        assert_eq!(fitted.model.max_range(), 25.0);
        assert!(fitted.model.sill() > 1.0);
    }

    #[test]
    fn test_stalled_fit_is_divergence() {
        // A zero range is flat past the origin, so moving it changes nothing
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.0, 2.0, 40.0).unwrap();
        let emp = synthetic(&truth, 12);
        let start = VariogramModel::simple(StructureKind::Spherical, 0.0, 2.0, 0.0).unwrap();
        let params = FitParams {
            fit_nugget: false,
            fit_sills: false,
            ..Default::default()
        };
        let err = fit_variogram(&start, &emp, &params).unwrap_err();
        assert!(
            matches!(&err, Error::FitDivergence { reason, .. } if reason.contains("failed to decrease")),
            "{err:?}"
        );
    }

    #[test]
    fn test_range_capped_on_linear_data() {
        // Over lags up to 87 this is a straight line
        let truth = VariogramModel::simple(StructureKind::Exponential, 0.0, 1000.0, 50_000.0).unwrap();
        let emp = synthetic(&truth, 15);
        let start = initial_model(StructureKind::Exponential, &emp, false).unwrap();
        let params = FitParams {
            fit_nugget: false,
            ..Default::default()
        };
        let fitted = fit_variogram(&start, &emp, &params).unwrap();

        let max_lag = emp.bins.iter().map(|b| b.mean_lag).fold(0.0, f64::max);
        let max_gamma = emp.bins.iter().map(|b| b.semivariance).fold(0.0, f64::max);
        assert!(fitted.model.max_range() <= RANGE_CAP * max_lag * (1.0 + 1e-9), "{}", fitted.model);
        assert!(fitted.model.sill() < 10.0 * max_gamma, "{}", fitted.model);
    }

    #[test]
    fn test_insufficient_bins() {
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.5, 2.0, 40.0).unwrap();
        let emp = synthetic(&truth, 3);
        let err = fit_variogram(&truth, &emp, &FitParams::default()).unwrap_err();
        assert!(
            matches!(err, Error::InsufficientData { required: 4, available: 3, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_iteration_cap_is_divergence() {
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.5, 2.0, 40.0).unwrap();
        let emp = synthetic(&truth, 15);
        let start = VariogramModel::simple(StructureKind::Spherical, 0.8, 1.0, 10.0).unwrap();
        let params = FitParams {
            max_iterations: 1,
            ..Default::default()
        };
        let err = fit_variogram(&start, &emp, &params).unwrap_err();
        assert!(matches!(err, Error::FitDivergence { iterations: 1, .. }), "{err:?}");
    }

    #[test]
    fn test_fit_is_deterministic() {
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.3, 2.0, 35.0).unwrap();
        let mut emp = synthetic(&truth, 14);
        // Perturb so the optimum is not exact
        for (i, b) in emp.bins.iter_mut().enumerate() {
            b.semivariance *= 1.0 + 0.03 * ((i * 7 % 5) as f64 - 2.0);
        }
        let start = initial_model(StructureKind::Spherical, &emp, true).unwrap();
        let a = fit_variogram(&start, &emp, &FitParams::default()).unwrap();
        let b = fit_variogram(&start, &emp, &FitParams::default()).unwrap();
        assert_eq!(a.model, b.model);
        assert_eq!(a.rss, b.rss);
    }

    #[test]
    fn test_fit_best_prefers_true_kind() {
        let truth = VariogramModel::simple(StructureKind::Gaussian, 0.1, 2.0, 45.0).unwrap();
        let emp = synthetic(&truth, 15);
        let best = fit_best_variogram(
            &emp,
            &[
                StructureKind::Spherical,
                StructureKind::Exponential,
                StructureKind::Gaussian,
            ],
            &FitParams::default(),
        )
        .unwrap();
        let kinds: Vec<StructureKind> = best.model.structures().iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&StructureKind::Gaussian), "{}", best.model);
    }

    #[test]
    fn test_cancelled_fit() {
        let truth = VariogramModel::simple(StructureKind::Spherical, 0.5, 2.0, 40.0).unwrap();
        let emp = synthetic(&truth, 15);
        let token = CancelToken::new();
        token.cancel();
        let params = FitParams {
            cancel: Some(token),
            ..Default::default()
        };
        let err = fit_variogram(&truth, &emp, &params).unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
