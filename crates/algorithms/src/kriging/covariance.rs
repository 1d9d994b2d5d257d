//! Covariance between two locations, as seen by the kriging engine.

use geostat_core::{GeometryProvider, SpaceTime};

use crate::variogram::{SpaceTimeModel, VariogramModel};

/// Stationary covariance between two locations.
pub trait CovarianceFunction<L>: Sync {
    fn covariance(&self, a: &L, b: &L) -> f64;

    /// C(0), the point variance.
    fn sill(&self) -> f64;
}

/// Isotropic spatial covariance: `C(h) = sill − γ(h)` with `h` from the
/// geometry provider.
#[derive(Debug, Clone)]
pub struct SpatialCovariance<G> {
    pub model: VariogramModel,
    pub geometry: G,
}

impl<G> SpatialCovariance<G> {
    pub fn new(model: VariogramModel, geometry: G) -> Self {
        Self { model, geometry }
    }
}

impl<G: GeometryProvider> CovarianceFunction<G::Location> for SpatialCovariance<G> {
    #[inline]
    fn covariance(&self, a: &G::Location, b: &G::Location) -> f64 {
        self.model.covariance(self.geometry.distance(a, b))
    }

    fn sill(&self) -> f64 {
        self.model.sill()
    }
}

/// Space-time covariance over a spatial provider; the time lag is `|t₁ − t₂|`.
#[derive(Debug, Clone)]
pub struct SpaceTimeCovariance<G> {
    pub model: SpaceTimeModel,
    pub geometry: G,
}

impl<G> SpaceTimeCovariance<G> {
    pub fn new(model: SpaceTimeModel, geometry: G) -> Self {
        Self { model, geometry }
    }
}

impl<G: GeometryProvider> CovarianceFunction<SpaceTime<G::Location>> for SpaceTimeCovariance<G> {
    #[inline]
    fn covariance(&self, a: &SpaceTime<G::Location>, b: &SpaceTime<G::Location>) -> f64 {
        let h = self.geometry.distance(&a.space, &b.space);
        self.model.covariance(h, (a.time - b.time).abs())
    }

    fn sill(&self) -> f64 {
        self.model.sill()
    }
}
