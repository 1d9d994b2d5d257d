//! Kriging
//!
//! - [`KrigingEngine`]: point / block prediction with ordinary, universal
//!   (trend) and simple kriging against any [`SpatialIndex`]
//! - [`Trend`]: drift basis functions and their least-squares fit
//! - [`CovarianceFunction`]: spatial and space-time covariances
//! - [`krige_grid`]: whole-grid prediction for planar data
//!
//! [`SpatialIndex`]: crate::index::SpatialIndex

mod covariance;
mod engine;
mod grid;
mod trend;

pub use covariance::{CovarianceFunction, SpaceTimeCovariance, SpatialCovariance};
pub use engine::{KrigingEngine, KrigingOptions, PredictionResult, Target};
pub use grid::{GridKrigingParams, GridPrediction, krige_grid};
pub use trend::{DriftOrder, Trend, TrendFit, TrendTerm, fit_trend};

use geostat_core::{GeometryProvider, Observation, Result, validate_locations, validate_observations};

use crate::index::BruteForceIndex;
use crate::variogram::VariogramModel;

/// One-shot kriging: validate the observations, index them by brute force
/// and predict every target. Per-target failures are returned in place.
pub fn krige<G>(
    geometry: &G,
    model: &VariogramModel,
    observations: &[Observation<G::Location>],
    targets: &[Target<G::Location, G::Region>],
    trend: Trend<G::Location>,
    options: KrigingOptions,
) -> Result<Vec<Result<PredictionResult>>>
where
    G: GeometryProvider + Clone,
{
    validate_observations(observations)?;
    validate_locations(geometry, observations)?;
    let index = BruteForceIndex::build(geometry.clone(), observations);
    let covariance = SpatialCovariance::new(model.clone(), geometry.clone());
    let engine = KrigingEngine::new(geometry.clone(), covariance, trend, options)?;
    Ok(engine.predict_batch(&index, targets))
}
