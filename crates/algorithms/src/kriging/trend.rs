//! Mean (drift) models for ordinary and universal kriging
//!
//! A [`Trend`] is an ordered list of named basis functions fⱼ(location,
//! covariates). The kriging system carries one Lagrange multiplier per term
//! so the weights reproduce every term exactly:
//! ```text
//! Σ λᵢ fⱼ(xᵢ) = fⱼ(x₀)   for every j
//! ```
//! A single constant term gives ordinary kriging; planar polynomials give
//! universal kriging with drift; covariate terms give kriging with external
//! drift.

use std::fmt;
use std::sync::Arc;

use geostat_core::{Error, Observation, Planar, Result};
use ndarray::{Array1, Array2};

use crate::linalg;

type TermFn<L> = dyn Fn(&L, &[f64]) -> f64 + Send + Sync;

/// Polynomial drift order for planar locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftOrder {
    /// f = {1, x, y}
    Linear,
    /// f = {1, x, y, x², xy, y²}
    Quadratic,
}

/// One named basis function of a trend
pub struct TrendTerm<L> {
    name: String,
    eval: Arc<TermFn<L>>,
}

impl<L> Clone for TrendTerm<L> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            eval: Arc::clone(&self.eval),
        }
    }
}

impl<L> TrendTerm<L> {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn evaluate(&self, location: &L, covariates: &[f64]) -> f64 {
        (self.eval)(location, covariates)
    }
}

/// Ordered list of drift basis functions
pub struct Trend<L> {
    terms: Vec<TrendTerm<L>>,
}

impl<L> Clone for Trend<L> {
    fn clone(&self) -> Self {
        Self {
            terms: self.terms.clone(),
        }
    }
}

impl<L> fmt::Debug for Trend<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.terms.iter().map(|t| t.name.as_str()))
            .finish()
    }
}

impl<L> Default for Trend<L> {
    fn default() -> Self {
        Self::intercept()
    }
}

impl<L> Trend<L> {
    /// No terms at all (only meaningful with a known mean).
    pub fn empty() -> Self {
        Self { terms: Vec::new() }
    }

    /// Constant unknown mean: ordinary kriging.
    pub fn intercept() -> Self {
        Self::empty().with_term("1", |_, _| 1.0)
    }

    /// Intercept plus the first `k` covariates (external drift). A missing
    /// covariate evaluates to NaN and is rejected when the system is built.
    pub fn covariates(k: usize) -> Self {
        (0..k).fold(Self::intercept(), |trend, j| {
            trend.with_term(format!("cov{j}"), move |_, cov| {
                cov.get(j).copied().unwrap_or(f64::NAN)
            })
        })
    }

    /// Append a term.
    pub fn with_term<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&L, &[f64]) -> f64 + Send + Sync + 'static,
    {
        self.terms.push(TrendTerm {
            name: name.into(),
            eval: Arc::new(f),
        });
        self
    }

    pub fn terms(&self) -> &[TrendTerm<L>] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// True when the only term is the constant, where detrending is a no-op
    /// for pairwise differences.
    pub fn is_intercept_only(&self) -> bool {
        self.terms.len() == 1 && self.terms[0].name == "1"
    }

    /// Term values at one location.
    pub fn values(&self, location: &L, covariates: &[f64]) -> Vec<f64> {
        self.terms
            .iter()
            .map(|t| t.evaluate(location, covariates))
            .collect()
    }

    /// n × p design matrix; every entry must be finite.
    pub fn design_matrix(&self, observations: &[Observation<L>]) -> Result<Array2<f64>> {
        let mut design = Array2::<f64>::zeros((observations.len(), self.terms.len()));
        for (i, obs) in observations.iter().enumerate() {
            for (j, term) in self.terms.iter().enumerate() {
                let v = term.evaluate(&obs.location, &obs.covariates);
                if !v.is_finite() {
                    return Err(Error::InvalidObservation {
                        index: i,
                        reason: format!("trend term '{}' evaluates to {v}", term.name),
                    });
                }
                design[[i, j]] = v;
            }
        }
        Ok(design)
    }
}

impl<L: Planar> Trend<L> {
    /// Polynomial drift in the planar coordinates.
    pub fn polynomial(order: DriftOrder) -> Self {
        let linear = Self::intercept()
            .with_term("x", |p: &L, _| p.xy().0)
            .with_term("y", |p: &L, _| p.xy().1);
        match order {
            DriftOrder::Linear => linear,
            DriftOrder::Quadratic => linear
                .with_term("x2", |p: &L, _| p.xy().0 * p.xy().0)
                .with_term("xy", |p: &L, _| p.xy().0 * p.xy().1)
                .with_term("y2", |p: &L, _| p.xy().1 * p.xy().1),
        }
    }
}

/// Least-squares trend fit
#[derive(Debug, Clone)]
pub struct TrendFit {
    /// One coefficient per trend term, in term order
    pub coefficients: Vec<f64>,
    /// `zᵢ − Σ βⱼ fⱼ(xᵢ)` in observation order
    pub residuals: Vec<f64>,
}

/// Fit the trend to the observations by ordinary least squares.
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer observations than terms
/// - [`Error::SingularSystem`] for collinear terms (e.g. all points on a line
///   with a planar drift)
pub fn fit_trend<L>(trend: &Trend<L>, observations: &[Observation<L>]) -> Result<TrendFit> {
    let p = trend.len();
    if observations.len() < p {
        return Err(Error::InsufficientData {
            required: p,
            available: observations.len(),
            context: "trend fit".into(),
        });
    }
    if p == 0 {
        return Ok(TrendFit {
            coefficients: Vec::new(),
            residuals: observations.iter().map(|o| o.value).collect(),
        });
    }

    let design = trend.design_matrix(observations)?;
    let z: Array1<f64> = observations.iter().map(|o| o.value).collect();
    let beta = linalg::least_squares(&design, &z)?;
    let fitted = design.dot(&beta);

    Ok(TrendFit {
        coefficients: beta.to_vec(),
        residuals: (&z - &fitted).to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Point;

    fn plane_points() -> Vec<Observation<Point<f64>>> {
        // z = 10 + 2x - 3y + small periodic residual
        let mut pts = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let x = i as f64 * 10.0;
                let y = j as f64 * 10.0;
                let r = if (i + j) % 2 == 0 { 0.5 } else { -0.5 };
                pts.push(Observation::new(Point::new(x, y), 10.0 + 2.0 * x - 3.0 * y + r));
            }
        }
        pts
    }

    #[test]
    fn test_linear_trend_fit() {
        let pts = plane_points();
        let fit = fit_trend(&Trend::polynomial(DriftOrder::Linear), &pts).unwrap();
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 0.01);
        assert_relative_eq!(fit.coefficients[2], -3.0, epsilon = 0.01);
        let mean_resid: f64 = fit.residuals.iter().sum::<f64>() / fit.residuals.len() as f64;
        assert!(mean_resid.abs() < 1e-8, "OLS residuals should have zero mean");
    }

    #[test]
    fn test_intercept_only_flags() {
        let t: Trend<Point<f64>> = Trend::intercept();
        assert!(t.is_intercept_only());
        assert!(!Trend::<Point<f64>>::polynomial(DriftOrder::Linear).is_intercept_only());
        assert_eq!(Trend::<Point<f64>>::polynomial(DriftOrder::Quadratic).len(), 6);
        assert_eq!(Trend::<Point<f64>>::covariates(2).len(), 3);
    }

    #[test]
    fn test_missing_covariate_rejected() {
        let pts = vec![
            Observation::with_covariates(Point::new(0.0, 0.0), 1.0, vec![3.0]),
            Observation::new(Point::new(1.0, 0.0), 2.0),
        ];
        let err = fit_trend(&Trend::covariates(1), &pts).unwrap_err();
        assert!(matches!(err, Error::InvalidObservation { index: 1, .. }), "{err:?}");
    }

    #[test]
    fn test_collinear_drift_is_singular() {
        let pts: Vec<_> = (0..5)
            .map(|i| Observation::new(Point::new(i as f64, 0.0), i as f64))
            .collect();
        let err = fit_trend(&Trend::polynomial(DriftOrder::Linear), &pts).unwrap_err();
        assert!(matches!(err, Error::SingularSystem { .. }), "{err:?}");
    }

    #[test]
    fn test_custom_term() {
        let trend: Trend<Point<f64>> =
            Trend::intercept().with_term("dist", |p: &Point<f64>, _| p.x().hypot(p.y()));
        assert_eq!(trend.values(&Point::new(3.0, 4.0), &[]), vec![1.0, 5.0]);
        assert_eq!(format!("{trend:?}"), r#"["1", "dist"]"#);
    }
}
