//! Space-time locations
//!
//! A [`SpaceTime`] pairs a spatial handle with a scalar time. The
//! [`SpaceTimeGeometry`] wrapper turns any spatial provider into a
//! space-time one with the anisotropic metric
//! ```text
//! d((s₁,t₁),(s₂,t₂)) = √( d_s(s₁,s₂)² + (κ·|t₁ − t₂|)² )
//! ```
//! where κ (space units per time unit) is the anisotropy ratio.

use crate::error::{Error, Result};
use crate::geometry::GeometryProvider;

/// Spatial handle plus time coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTime<L> {
    pub space: L,
    pub time: f64,
}

impl<L> SpaceTime<L> {
    pub fn new(space: L, time: f64) -> Self {
        Self { space, time }
    }
}

/// Spatial region at one time instant
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceTimeRegion<R> {
    pub region: R,
    pub time: f64,
}

impl<R> SpaceTimeRegion<R> {
    pub fn new(region: R, time: f64) -> Self {
        Self { region, time }
    }
}

/// Space-time provider over a spatial one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTimeGeometry<G> {
    pub inner: G,
    /// κ: space units per time unit
    pub anisotropy: f64,
}

impl<G: GeometryProvider> SpaceTimeGeometry<G> {
    pub fn new(inner: G, anisotropy: f64) -> Result<Self> {
        if !(anisotropy.is_finite() && anisotropy > 0.0) {
            return Err(Error::InvalidParameter {
                name: "anisotropy",
                value: anisotropy.to_string(),
                reason: "must be positive and finite".into(),
            });
        }
        Ok(Self { inner, anisotropy })
    }

    /// Spatial separation and absolute time lag, unscaled.
    pub fn separation(&self, a: &SpaceTime<G::Location>, b: &SpaceTime<G::Location>) -> (f64, f64) {
        (self.inner.distance(&a.space, &b.space), (a.time - b.time).abs())
    }
}

impl<G: GeometryProvider> GeometryProvider for SpaceTimeGeometry<G> {
    type Location = SpaceTime<G::Location>;
    type Region = SpaceTimeRegion<G::Region>;

    fn distance(&self, a: &Self::Location, b: &Self::Location) -> f64 {
        let (ds, dt) = self.separation(a, b);
        ds.hypot(self.anisotropy * dt)
    }

    fn is_valid_location(&self, location: &Self::Location) -> bool {
        location.time.is_finite() && self.inner.is_valid_location(&location.space)
    }

    fn bounding_diagonal(&self, locations: &[Self::Location]) -> f64 {
        if locations.is_empty() {
            return 0.0;
        }
        let spaces: Vec<G::Location> = locations.iter().map(|l| l.space.clone()).collect();
        let (t_min, t_max) = locations
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), l| {
                (lo.min(l.time), hi.max(l.time))
            });
        self.inner
            .bounding_diagonal(&spaces)
            .hypot(self.anisotropy * (t_max - t_min))
    }

    fn block_discretization(&self, region: &Self::Region) -> Result<Vec<Self::Location>> {
        Ok(self
            .inner
            .block_discretization(&region.region)?
            .into_iter()
            .map(|space| SpaceTime::new(space, region.time))
            .collect())
    }

    /// Points fall in a region when they share its time instant and lie in
    /// its spatial part.
    fn incidence(&self, points: &[Self::Location], regions: &[Self::Region]) -> Vec<Vec<usize>> {
        let spaces: Vec<G::Location> = points.iter().map(|p| p.space.clone()).collect();
        regions
            .iter()
            .map(|r| {
                self.inner
                    .incidence(&spaces, std::slice::from_ref(&r.region))
                    .into_iter()
                    .flatten()
                    .filter(|&i| points[i].time == r.time)
                    .collect()
            })
            .collect()
    }
}
