//! Geometry collaborator interface
//!
//! The engine never touches coordinates directly: distances, block
//! discretizations and point-in-region incidence all come from a
//! [`GeometryProvider`]. [`PlanarGeometry`] is the Euclidean provider used
//! for projected coordinates.

use geo::{BoundingRect, Centroid, Intersects, Point, Polygon};

use crate::error::{Error, Result};
use crate::observation::Observation;

/// Distances, areal sampling and incidence for one location type.
pub trait GeometryProvider: Sync {
    /// Opaque point handle.
    type Location: Clone + std::fmt::Debug + Send + Sync;
    /// Areal support (polygon, raster cell, ...).
    type Region: Sync;

    /// Non-negative, symmetric separation between two locations.
    fn distance(&self, a: &Self::Location, b: &Self::Location) -> f64;

    /// Whether distances involving `location` are well defined. The default
    /// asks for a finite self-distance, which catches NaN and infinite
    /// coordinates for any metric built on differences.
    fn is_valid_location(&self, location: &Self::Location) -> bool {
        self.distance(location, location).is_finite()
    }

    /// Diagonal of the bounding box of a set of locations.
    fn bounding_diagonal(&self, locations: &[Self::Location]) -> f64;

    /// Sample points representing a region, used for block averaging.
    fn block_discretization(&self, region: &Self::Region) -> Result<Vec<Self::Location>>;

    /// For every region, the indices of `points` lying inside it.
    fn incidence(&self, points: &[Self::Location], regions: &[Self::Region]) -> Vec<Vec<usize>>;
}

/// Reject the first observation whose location the provider cannot measure.
pub fn validate_locations<G: GeometryProvider>(
    geometry: &G,
    observations: &[Observation<G::Location>],
) -> Result<()> {
    match observations
        .iter()
        .position(|o| !geometry.is_valid_location(&o.location))
    {
        Some(index) => Err(Error::InvalidObservation {
            index,
            reason: format!("non-finite location {:?}", observations[index].location),
        }),
        None => Ok(()),
    }
}

/// Locations with planar `(x, y)` coordinates.
///
/// Needed by the k-d tree and by polynomial drift terms; opaque location
/// types simply do not implement it.
pub trait Planar {
    fn xy(&self) -> (f64, f64);
}

impl Planar for Point<f64> {
    #[inline]
    fn xy(&self) -> (f64, f64) {
        (self.x(), self.y())
    }
}

/// Euclidean geometry on projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarGeometry {
    /// Lattice resolution per axis when discretizing a polygon (default 4,
    /// i.e. 16 candidate points).
    pub block_resolution: usize,
}

impl Default for PlanarGeometry {
    fn default() -> Self {
        Self { block_resolution: 4 }
    }
}

impl PlanarGeometry {
    pub fn new(block_resolution: usize) -> Self {
        Self { block_resolution }
    }
}

impl GeometryProvider for PlanarGeometry {
    type Location = Point<f64>;
    type Region = Polygon<f64>;

    #[inline]
    fn distance(&self, a: &Point<f64>, b: &Point<f64>) -> f64 {
        let dx = a.x() - b.x();
        let dy = a.y() - b.y();
        (dx * dx + dy * dy).sqrt()
    }

    fn is_valid_location(&self, location: &Point<f64>) -> bool {
        location.x().is_finite() && location.y().is_finite()
    }

    fn bounding_diagonal(&self, locations: &[Point<f64>]) -> f64 {
        if locations.is_empty() {
            return 0.0;
        }
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in locations {
            min_x = min_x.min(p.x());
            min_y = min_y.min(p.y());
            max_x = max_x.max(p.x());
            max_y = max_y.max(p.y());
        }
        let dx = max_x - min_x;
        let dy = max_y - min_y;
        (dx * dx + dy * dy).sqrt()
    }

    fn block_discretization(&self, region: &Polygon<f64>) -> Result<Vec<Point<f64>>> {
        if self.block_resolution == 0 {
            return Err(Error::InvalidParameter {
                name: "block_resolution",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let rect = region
            .bounding_rect()
            .ok_or_else(|| Error::Geometry("cannot discretize an empty polygon".into()))?;

        let n = self.block_resolution;
        let dx = rect.width() / n as f64;
        let dy = rect.height() / n as f64;
        let mut points = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                let p = Point::new(
                    rect.min().x + (col as f64 + 0.5) * dx,
                    rect.min().y + (row as f64 + 0.5) * dy,
                );
                if region.intersects(&p) {
                    points.push(p);
                }
            }
        }

        // Thin or oddly shaped polygons can slip between lattice points.
        if points.is_empty() {
            let c = region
                .centroid()
                .ok_or_else(|| Error::Geometry("polygon has no centroid".into()))?;
            points.push(c);
        }

        Ok(points)
    }

    fn incidence(&self, points: &[Point<f64>], regions: &[Polygon<f64>]) -> Vec<Vec<usize>> {
        regions
            .iter()
            .map(|region| {
                points
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| region.intersects(*p))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect()
    }
}
